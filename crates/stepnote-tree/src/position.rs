//! Resolving a [`Position`] against an ordered sibling set.

use stepnote_types::{BlockId, Position};

use crate::rank::RankGenerator;
use crate::{Result, TreeError};

/// Anything that sits in a sibling list: an id and its rank.
pub trait Ranked {
    fn id(&self) -> BlockId;
    fn rank(&self) -> &str;
}

impl Ranked for (BlockId, String) {
    fn id(&self) -> BlockId {
        self.0
    }

    fn rank(&self) -> &str {
        &self.1
    }
}

/// The two neighbours a new key has to fit between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds<'a> {
    pub lower: Option<&'a str>,
    pub upper: Option<&'a str>,
}

impl Bounds<'_> {
    /// Whether `rank` already sits strictly inside these bounds.
    pub fn contains(&self, rank: &str) -> bool {
        self.lower.is_none_or(|l| l < rank) && self.upper.is_none_or(|u| rank < u)
    }
}

/// Find the neighbours for `position` in `siblings`, which must be sorted by
/// rank.
///
/// Fails with [`TreeError::AnchorNotFound`] when an `After`/`Before` anchor is
/// not in the list.
pub fn resolve_bounds<S: Ranked>(siblings: &[S], position: Position) -> Result<Bounds<'_>> {
    let rank_at = |i: usize| siblings.get(i).map(Ranked::rank);
    let index_of = |anchor: BlockId| {
        siblings
            .iter()
            .position(|s| s.id() == anchor)
            .ok_or(TreeError::AnchorNotFound(anchor))
    };

    let bounds = match position {
        Position::Start => Bounds {
            lower: None,
            upper: rank_at(0),
        },
        Position::End => Bounds {
            lower: siblings.last().map(Ranked::rank),
            upper: None,
        },
        Position::After(anchor) => {
            let i = index_of(anchor)?;
            Bounds {
                lower: rank_at(i),
                upper: rank_at(i + 1),
            }
        }
        Position::Before(anchor) => {
            let i = index_of(anchor)?;
            Bounds {
                lower: i.checked_sub(1).and_then(rank_at),
                upper: rank_at(i),
            }
        }
    };
    Ok(bounds)
}

/// Rank for a new entry at `position` among `siblings`.
pub fn rank_for<S: Ranked>(rank: &RankGenerator, siblings: &[S], position: Position) -> Result<String> {
    let bounds = resolve_bounds(siblings, position)?;
    tracing::trace!(?position, lower = ?bounds.lower, upper = ?bounds.upper, "resolved sibling bounds");
    rank.key_between(bounds.lower, bounds.upper)
}
