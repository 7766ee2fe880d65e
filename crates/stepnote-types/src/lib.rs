//! Shared identity, document, and block types for StepNote.
//!
//! This crate is the relational foundation: typed IDs, workspaces, users,
//! memberships, documents, and blocks. It has **no internal stepnote
//! dependencies**: a pure leaf crate that the tree and store crates build on.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Workspace (WorkspaceId)
//!     └── has Membership (UserId, role) ── User (UserId, issued externally)
//!     └── owns Document (DocumentId)
//!             └── parent_id forms the document tree
//!             └── owns Block (BlockId)
//!                     └── parent_block_id forms the block tree
//!                     └── rank orders siblings
//! ```

pub mod block;
pub mod document;
pub mod ids;
pub mod workspace;

pub use block::{Block, BlockPatch, BlockPayload, BlockType, Position};
pub use document::{DEFAULT_TITLE, Document, DocumentNode, DocumentPatch, build_document_tree};
pub use ids::{BlockId, DocumentId, UserId, WorkspaceId};
pub use workspace::{MemberRole, Membership, User, Workspace};

/// Current time as Unix milliseconds. Used by constructors throughout the workspace.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
