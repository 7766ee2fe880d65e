//! Store configuration.
//!
//! Loaded from a RON file, then overridden from `STEPNOTE_*` environment
//! variables. Every field has a default, so an empty file `()` is valid.
//!
//! ```ron
//! (
//!     database_path: Some("stepnote.db"),
//!     max_retries: 5,
//!     rank_jitter: false,
//! )
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stepnote_tree::{DEFAULT_MAX_LEN, MIN_MAX_LEN, RankGenerator};

use crate::error::{Result, StoreError};

pub const ENV_DATABASE_PATH: &str = "STEPNOTE_DATABASE_PATH";
pub const ENV_MAX_RETRIES: &str = "STEPNOTE_MAX_RETRIES";
pub const ENV_MAX_RANK_LEN: &str = "STEPNOTE_MAX_RANK_LEN";
pub const ENV_BUSY_TIMEOUT_MS: &str = "STEPNOTE_BUSY_TIMEOUT_MS";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file. `None` opens a private in-memory database.
    pub database_path: Option<PathBuf>,
    /// How long a connection waits on another writer's lock.
    pub busy_timeout_ms: u64,
    /// Reruns after a rank collision or lock timeout before giving up.
    pub max_retries: u32,
    /// Base backoff between reruns, multiplied by the attempt number.
    pub retry_backoff_ms: u64,
    /// Longest rank key before a sibling set is rebalanced.
    pub max_rank_len: usize,
    /// Randomize generated keys within the gap.
    pub rank_jitter: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: 5_000,
            max_retries: 3,
            retry_backoff_ms: 10,
            max_rank_len: DEFAULT_MAX_LEN,
            rank_jitter: true,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn from_ron_str(s: &str) -> Result<Self> {
        ron::from_str(s).map_err(|e| StoreError::Config(format!("invalid store config: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("reading {}: {e}", path.display())))?;
        let config = Self::from_ron_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded store config");
        Ok(config)
    }

    /// Apply `STEPNOTE_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment, a test map).
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            self.database_path = if path.is_empty() || path == ":memory:" {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        if let Some(v) = lookup(ENV_MAX_RETRIES) {
            self.max_retries = parse_var(ENV_MAX_RETRIES, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_RANK_LEN) {
            self.max_rank_len = parse_var(ENV_MAX_RANK_LEN, &v)?;
        }
        if let Some(v) = lookup(ENV_BUSY_TIMEOUT_MS) {
            self.busy_timeout_ms = parse_var(ENV_BUSY_TIMEOUT_MS, &v)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_rank_len < MIN_MAX_LEN {
            return Err(StoreError::Config(format!(
                "max_rank_len must be at least {MIN_MAX_LEN}, got {}",
                self.max_rank_len
            )));
        }
        if self.max_retries == 0 {
            return Err(StoreError::Config("max_retries must be at least 1".into()));
        }
        Ok(())
    }

    pub fn rank_generator(&self) -> RankGenerator {
        RankGenerator::new(self.max_rank_len).with_jitter(self.rank_jitter)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| StoreError::Config(format!("{key}={value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.database_path, None);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_rank_len, 32);
        assert!(config.rank_jitter);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_ron() {
        let config = StoreConfig::from_ron_str(
            r#"(database_path: Some("/tmp/notes.db"), max_retries: 7, rank_jitter: false)"#,
        )
        .unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/notes.db")));
        assert_eq!(config.max_retries, 7);
        assert!(!config.rank_jitter);
        assert_eq!(config.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_empty_ron_is_default() {
        assert_eq!(StoreConfig::from_ron_str("()").unwrap(), StoreConfig::default());
    }

    #[test]
    fn test_bad_ron() {
        let err = StoreConfig::from_ron_str("(max_retries: \"lots\")").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.ron");
        std::fs::write(&path, "(max_rank_len: 12)").unwrap();
        assert_eq!(StoreConfig::load(&path).unwrap().max_rank_len, 12);

        let missing = StoreConfig::load(dir.path().join("nope.ron")).unwrap_err();
        assert!(matches!(missing, StoreError::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let vars = HashMap::from([
            (ENV_DATABASE_PATH, "/var/lib/stepnote.db"),
            (ENV_MAX_RETRIES, "9"),
            (ENV_MAX_RANK_LEN, " 16 "),
        ]);
        let config = StoreConfig::default()
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/var/lib/stepnote.db")));
        assert_eq!(config.max_retries, 9);
        assert_eq!(config.max_rank_len, 16);
        assert_eq!(config.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_memory_override_clears_path() {
        let config = StoreConfig::at_path("x.db")
            .apply_overrides(|k| (k == ENV_DATABASE_PATH).then(|| ":memory:".to_string()))
            .unwrap();
        assert_eq!(config.database_path, None);
    }

    #[test]
    fn test_bad_override() {
        let err = StoreConfig::default()
            .apply_overrides(|k| (k == ENV_MAX_RETRIES).then(|| "-1".to_string()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_validate_bounds() {
        let tiny = StoreConfig {
            max_rank_len: 3,
            ..StoreConfig::default()
        };
        assert!(tiny.validate().is_err());

        let no_retries = StoreConfig {
            max_retries: 0,
            ..StoreConfig::default()
        };
        assert!(no_retries.validate().is_err());
    }
}
