//! Rank keys and sibling placement for StepNote's block tree.
//!
//! Pure algorithms, no I/O. The store crate feeds these with sibling sets
//! and parent lookups read inside a transaction.
//!
//! # Ordering model
//!
//! Siblings are ordered by a **rank**: a short base-62 string compared
//! byte-wise. Inserting between two siblings computes a key strictly
//! between their ranks ([`RankGenerator::key_between`]); nobody else is
//! renumbered. When a gap can no longer be split within the length ceiling
//! the generator signals [`TreeError::Exhausted`] and the caller spreads
//! fresh, evenly spaced keys over the whole sibling set
//! ([`RankGenerator::spread`]).
//!
//! # Modules
//!
//! - [`rank`]: key generation and validation
//! - [`position`]: `Start`/`End`/`After`/`Before` → neighbour bounds
//! - [`lineage`]: bounded cycle checks over parent links

mod error;
pub mod lineage;
pub mod position;
pub mod rank;

pub use error::{Result, TreeError};
pub use lineage::check_reparent;
pub use position::{Bounds, Ranked, rank_for, resolve_bounds};
pub use rank::{
    BASE62, DEFAULT_MAX_LEN, MIDPOINT_KEY, MIN_MAX_LEN, RankGenerator, is_valid_key, key_between,
};
