//! Error types for rank and placement operations.

use thiserror::Error;

use stepnote_types::BlockId;

/// Errors from rank generation, sibling placement, and lineage walks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// A boundary is not a valid rank key (empty, foreign characters, or a
    /// trailing `'0'`).
    #[error("invalid rank key: {0:?}")]
    InvalidKey(String),

    /// Lower bound does not sort strictly before the upper bound.
    #[error("rank bounds out of order: {lower:?} >= {upper:?}")]
    OutOfOrder { lower: String, upper: String },

    /// No key fits between the bounds within the length ceiling.
    /// The sibling set has to be rebalanced.
    #[error("no rank fits within {max_len} characters; rebalance required")]
    Exhausted { max_len: usize },

    /// The sibling a position refers to is not among the target's children.
    #[error("anchor block not found among siblings: {0:?}")]
    AnchorNotFound(BlockId),

    /// Reparenting would make a node its own ancestor.
    #[error("move would create a cycle")]
    Cycle,

    /// A parent walk ran past the number of nodes that exist, so the stored
    /// links already loop.
    #[error("parent chain longer than {limit} nodes; stored tree is cyclic")]
    DepthExceeded { limit: usize },
}

impl TreeError {
    /// Whether this is the rebalance signal.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, TreeError::Exhausted { .. })
    }
}

/// Result type for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;
