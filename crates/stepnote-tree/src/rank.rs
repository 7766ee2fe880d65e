//! Rank keys: fractional indexes that order siblings as plain strings.
//!
//! A key is a base-62 digit string read as the fraction `0.d1d2d3...`.
//! The alphabet is ASCII-ordered, so comparing two keys byte-wise compares
//! their fractional values. Inserting between two neighbours only ever
//! produces a new key; nothing else is renumbered.
//!
//! Keys never end in `'0'`. A key `k` and `k0` would have no key between
//! them, and `"k0"` has the same value as `"k"`.
//!
//! When the gap between two neighbours can only be split by growing the key
//! past the configured ceiling, [`RankGenerator::key_between`] returns
//! [`TreeError::Exhausted`]. The caller rebalances the sibling set with
//! [`RankGenerator::spread`] and tries again.

use rand::Rng;

use crate::{Result, TreeError};

/// Base-62 charset (0-9, A-Z, a-z).
/// Lexicographically ordered: '0' < '9' < 'A' < 'Z' < 'a' < 'z'.
pub const BASE62: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const BASE: usize = 62;

/// The key for the first child of an empty sibling set.
pub const MIDPOINT_KEY: &str = "V";

/// Default key-length ceiling before a rebalance is requested.
pub const DEFAULT_MAX_LEN: usize = 32;

/// Smallest ceiling that still leaves room to rebalance a sibling set.
pub const MIN_MAX_LEN: usize = 4;

fn digit(c: u8) -> Option<usize> {
    match c {
        b'0'..=b'9' => Some((c - b'0') as usize),
        b'A'..=b'Z' => Some((c - b'A') as usize + 10),
        b'a'..=b'z' => Some((c - b'a') as usize + 36),
        _ => None,
    }
}

/// Whether `key` can be stored as a rank.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && !key.ends_with('0') && key.bytes().all(|c| digit(c).is_some())
}

fn validate(key: &str) -> Result<()> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(TreeError::InvalidKey(key.to_string()))
    }
}

/// Digits strictly between `lower` and `upper`.
///
/// `lower` is padded with `'0'`; `upper == None` stands for 1.0. `pick(lo, hi)`
/// chooses a digit in `lo + 1 .. hi` whenever `hi - lo > 1`.
fn midpoint(mut lower: &str, mut upper: Option<&str>, mut pick: impl FnMut(usize, usize) -> usize) -> String {
    let mut out = String::new();

    loop {
        if let Some(up) = upper {
            let n = up
                .bytes()
                .enumerate()
                .take_while(|&(i, c)| lower.as_bytes().get(i).copied().unwrap_or(b'0') == c)
                .count();
            if n == up.len() {
                // Only reachable for lower >= upper, which callers rule out.
                upper = None;
            } else {
                out.push_str(&up[..n]);
                lower = lower.get(n..).unwrap_or("");
                upper = Some(&up[n..]);
            }
        }

        let lo = lower.bytes().next().and_then(digit).unwrap_or(0);
        let hi = match upper {
            Some(up) => up.bytes().next().and_then(digit).unwrap_or(BASE),
            None => BASE,
        };

        if hi - lo > 1 {
            out.push(BASE62[pick(lo, hi)] as char);
            return out;
        }

        // Consecutive digits: no room at this length.
        match upper {
            Some(up) if up.len() > 1 => {
                out.push_str(&up[..1]);
                return out;
            }
            _ => {
                out.push(BASE62[lo] as char);
                lower = lower.get(1..).unwrap_or("");
                upper = None;
            }
        }
    }
}

/// Pick from the middle half of the gap so repeated jittered picks do not
/// drift towards either bound.
fn jittered(rng: &mut impl Rng, lo: usize, hi: usize) -> usize {
    let quarter = (hi - lo) / 4;
    let from = lo + quarter.max(1);
    let to = hi - quarter.max(1);
    if from >= to {
        (lo + hi) / 2
    } else {
        rng.gen_range(from..=to)
    }
}

fn encode(mut value: u128, len: usize) -> String {
    let mut digits = vec![b'0'; len];
    for slot in digits.iter_mut().rev() {
        *slot = BASE62[(value % BASE as u128) as usize];
        value /= BASE as u128;
    }
    while digits.last() == Some(&b'0') {
        digits.pop();
    }
    digits.into_iter().map(char::from).collect()
}

/// Generates rank keys under a length ceiling.
#[derive(Clone, Debug)]
pub struct RankGenerator {
    max_len: usize,
    jitter: bool,
}

impl Default for RankGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LEN)
    }
}

impl RankGenerator {
    /// Deterministic generator: always splits gaps down the middle.
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            jitter: false,
        }
    }

    /// Randomize the chosen digit within the middle half of each gap.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// A key strictly between `lower` and `upper`.
    ///
    /// `None` for `lower` means "before every key", `None` for `upper` means
    /// "after every key". With both absent the result is [`MIDPOINT_KEY`].
    pub fn key_between(&self, lower: Option<&str>, upper: Option<&str>) -> Result<String> {
        if let Some(l) = lower {
            validate(l)?;
        }
        if let Some(u) = upper {
            validate(u)?;
        }
        if let (Some(l), Some(u)) = (lower, upper)
            && l >= u
        {
            return Err(TreeError::OutOfOrder {
                lower: l.to_string(),
                upper: u.to_string(),
            });
        }

        if lower.is_none() && upper.is_none() {
            return Ok(MIDPOINT_KEY.to_string());
        }

        let lower = lower.unwrap_or("");
        let key = if self.jitter {
            let mut rng = rand::thread_rng();
            midpoint(lower, upper, |lo, hi| jittered(&mut rng, lo, hi))
        } else {
            midpoint(lower, upper, |lo, hi| (lo + hi) / 2)
        };

        if key.len() > self.max_len {
            return Err(TreeError::Exhausted {
                max_len: self.max_len,
            });
        }
        Ok(key)
    }

    /// `n` evenly spaced, strictly increasing keys of the shortest length
    /// that fits them.
    pub fn spread(&self, n: usize) -> Result<Vec<String>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let slots = n as u128 + 1;
        let mut len = 1;
        let mut space = BASE as u128;
        while space < slots {
            len += 1;
            space *= BASE as u128;
        }
        if len > self.max_len {
            return Err(TreeError::Exhausted {
                max_len: self.max_len,
            });
        }
        Ok((1..=n as u128).map(|i| encode(i * space / slots, len)).collect())
    }
}

/// [`RankGenerator::key_between`] with the default, deterministic generator.
pub fn key_between(lower: Option<&str>, upper: Option<&str>) -> Result<String> {
    RankGenerator::default().key_between(lower, upper)
}
