//! SQLite-backed storage for StepNote workspaces, documents, and blocks.
//!
//! [`Notebook`] is the entry point: it owns one connection, checks the acting
//! user's workspace membership, and runs every mutation through the
//! [`ConsistencyGuard`]. The stores underneath borrow a connection that is
//! already inside a transaction:
//!
//! - [`BlockTree`]: placement, moves, subtree deletes, rebalancing
//! - [`DocumentStore`]: document hierarchy and cascading deletes
//! - [`Directory`]: users, workspaces, memberships
//!
//! ```no_run
//! use stepnote_store::{Notebook, StoreConfig};
//! use stepnote_types::{BlockPayload, BlockType, Position, User};
//!
//! # fn main() -> stepnote_store::Result<()> {
//! let notebook = Notebook::open(&StoreConfig::at_path("stepnote.db"))?;
//! let me = notebook.create_user(&User::new("user_1", "me@example.com"))?.id;
//! let ws = notebook.create_workspace(&me, "Personal")?;
//! let doc = notebook.create_document(&me, ws.id, None, "Ideas")?;
//! notebook.insert_block(&me, doc.id, None, Position::End, &BlockPayload::text(BlockType::Paragraph, "hi"))?;
//! # Ok(())
//! # }
//! ```

pub mod block_tree;
pub mod config;
pub mod db;
pub mod directory;
pub mod document_store;
mod error;
pub mod guard;
pub mod notebook;

pub use block_tree::BlockTree;
pub use config::StoreConfig;
pub use directory::Directory;
pub use document_store::{DeletedDocuments, DocumentStore};
pub use error::{ErrorKind, Result, StoreError};
pub use guard::ConsistencyGuard;
pub use notebook::Notebook;
