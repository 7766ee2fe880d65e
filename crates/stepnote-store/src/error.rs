//! Store error types.
//!
//! `StoreError` carries the detail; `ErrorKind` is the flat category the
//! API layer maps onto response codes.

use thiserror::Error;

use stepnote_tree::TreeError;

/// Name of the unique index that keeps sibling ranks distinct.
pub(crate) const SIBLING_RANK_INDEX: &str = "idx_blocks_sibling_rank";

/// Errors surfaced by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Workspace, user, document, block, or sibling does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The acting user holds no membership (or not the needed role) in the
    /// workspace that owns the resource.
    #[error("permission denied: {user} in workspace {workspace}")]
    PermissionDenied { user: String, workspace: String },

    /// Reparenting would create a cycle, cross a document or workspace
    /// boundary, or target a parent that does not exist.
    #[error("invalid move: {0}")]
    InvalidMove(String),

    /// No rank fits even after rebalancing. Indicates a misconfigured
    /// ceiling, not a normal condition.
    #[error("rank space exhausted at {max_len} characters after rebalance")]
    RankExhausted { max_len: usize },

    /// Rank collisions or lock contention outlasted the retry budget.
    /// Safe to retry.
    #[error("concurrent modification conflict after {attempts} attempts")]
    ConcurrencyConflict { attempts: u32 },

    /// Unique record (user id, email, membership) already present.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Malformed input the store refuses to persist.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Stored data breaks a tree invariant (looping parents, bad rank).
    #[error("corrupt store: {0}")]
    Corrupt(String),

    /// Configuration could not be loaded or is out of range.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Response category for a [`StoreError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    InvalidMove,
    RankExhausted,
    ConcurrencyConflict,
    AlreadyExists,
    InvalidInput,
    Config,
    Storage,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            StoreError::InvalidMove(_) => ErrorKind::InvalidMove,
            StoreError::RankExhausted { .. } => ErrorKind::RankExhausted,
            StoreError::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            StoreError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            StoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            StoreError::Config(_) => ErrorKind::Config,
            StoreError::Corrupt(_) | StoreError::Sqlite(_) | StoreError::Json(_) => {
                ErrorKind::Storage
            }
        }
    }

    /// Whether the caller may simply try again.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }

    /// Whether the guard should roll back and rerun the transaction.
    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            StoreError::Sqlite(e) => is_rank_collision(e) || is_busy(e),
            _ => false,
        }
    }

    pub(crate) fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        StoreError::NotFound(format!("{what} {id}"))
    }

    pub(crate) fn denied(user: impl std::fmt::Display, workspace: impl std::fmt::Display) -> Self {
        StoreError::PermissionDenied {
            user: user.to_string(),
            workspace: workspace.to_string(),
        }
    }
}

impl From<TreeError> for StoreError {
    fn from(e: TreeError) -> Self {
        match e {
            TreeError::AnchorNotFound(id) => StoreError::not_found("sibling block", id),
            TreeError::Cycle => {
                StoreError::InvalidMove("target is the node itself or one of its descendants".into())
            }
            TreeError::Exhausted { max_len } => StoreError::RankExhausted { max_len },
            e @ (TreeError::InvalidKey(_)
            | TreeError::OutOfOrder { .. }
            | TreeError::DepthExceeded { .. }) => StoreError::Corrupt(e.to_string()),
        }
    }
}

/// Unique-constraint failure on the sibling rank index.
pub(crate) fn is_rank_collision(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, msg) => {
            err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                && msg.as_deref().is_some_and(|m| m.contains(SIBLING_RANK_INDEX))
        }
        _ => false,
    }
}

/// Unique or primary-key failure on any other table.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => matches!(
            err.extended_code,
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ),
        _ => false,
    }
}

pub(crate) fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
