//! Transaction wrapper that serializes writers and retries lost races.
//!
//! Every mutation runs in an IMMEDIATE transaction: SQLite takes the write
//! lock at `BEGIN`, so the sibling reads a rank is computed from cannot go
//! stale before the insert lands. Two handles racing on one file still meet
//! at the lock (busy) or, if a writer bypasses the guard, at the sibling rank
//! index (unique violation). Both roll back and rerun the closure with fresh
//! reads.

use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsistencyGuard {
    max_retries: u32,
    backoff: Duration,
}

impl Default for ConsistencyGuard {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}

impl ConsistencyGuard {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.max_retries, config.retry_backoff())
    }

    /// Run `op` in an immediate transaction and commit.
    ///
    /// The closure may run more than once; it must derive everything it
    /// writes from what it reads through `tx`. Errors other than rank
    /// collisions and lock contention roll back and return as-is.
    #[tracing::instrument(level = "debug", skip(self, conn, op))]
    pub fn run<T, F>(&self, conn: &mut Connection, label: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut(&Transaction<'_>) -> Result<T>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match attempt_once(conn, &mut op) {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "committed after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    if attempt > self.max_retries {
                        tracing::warn!(attempts = attempt, error = %e, "giving up after repeated conflicts");
                        return Err(StoreError::ConcurrencyConflict { attempts: attempt });
                    }
                    tracing::debug!(attempt, error = %e, "conflict, retrying with fresh reads");
                    std::thread::sleep(self.backoff * attempt);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run `op` in a deferred transaction for a consistent read. No retries.
    pub fn read<T, F>(&self, conn: &mut Connection, op: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let value = op(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

fn attempt_once<T, F>(conn: &mut Connection, op: &mut F) -> Result<T>
where
    F: FnMut(&Transaction<'_>) -> Result<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = op(&tx)?;
    tx.commit()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::error::ErrorKind;
    use rusqlite::params;
    use stepnote_types::{BlockId, DocumentId, WorkspaceId};

    /// A document with one top-level block ranked "V".
    fn fixture() -> (Connection, DocumentId) {
        let conn = db::open_in_memory().unwrap();
        let ws = WorkspaceId::new();
        let doc = DocumentId::new();
        conn.execute(
            "INSERT INTO workspaces (id, name, created_at) VALUES (?1, 'w', 0)",
            params![ws.to_column()],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO documents (id, workspace_id, title, created_at, updated_at)
             VALUES (?1, ?2, 'd', 0, 0)",
            params![doc.to_column(), ws.to_column()],
        )
        .unwrap();
        insert_ranked(&conn, doc, "V").unwrap();
        (conn, doc)
    }

    fn insert_ranked(conn: &Connection, doc: DocumentId, rank: &str) -> Result<usize> {
        Ok(conn.execute(
            "INSERT INTO blocks (id, document_id, block_type, rank, created_at, updated_at)
             VALUES (?1, ?2, 'paragraph', ?3, 0, 0)",
            params![BlockId::new().to_column(), doc.to_column(), rank],
        )?)
    }

    fn block_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM blocks", [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn test_commits_on_success() {
        let (mut conn, doc) = fixture();
        let guard = ConsistencyGuard::default();
        guard.run(&mut conn, "insert", |tx| insert_ranked(tx, doc, "k")).unwrap();
        assert_eq!(block_count(&conn), 2);
    }

    #[test]
    fn test_collision_retried_with_fresh_attempt() {
        let (mut conn, doc) = fixture();
        let guard = ConsistencyGuard::new(3, Duration::ZERO);
        let mut calls = 0;
        // First two attempts reuse the taken rank, the third picks a free one.
        let written = guard
            .run(&mut conn, "insert", |tx| {
                calls += 1;
                let rank = if calls < 3 { "V" } else { "k" };
                insert_ranked(tx, doc, rank)
            })
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(calls, 3);
        assert_eq!(block_count(&conn), 2);
    }

    #[test]
    fn test_retry_budget_exhausted() {
        let (mut conn, doc) = fixture();
        let guard = ConsistencyGuard::new(2, Duration::ZERO);
        let mut calls = 0;
        let err = guard
            .run(&mut conn, "insert", |tx| {
                calls += 1;
                insert_ranked(tx, doc, "V")
            })
            .unwrap_err();
        assert_eq!(calls, 3);
        assert!(matches!(err, StoreError::ConcurrencyConflict { attempts: 3 }));
        assert!(err.is_transient());
        assert_eq!(block_count(&conn), 1);
    }

    #[test]
    fn test_other_errors_roll_back_without_retry() {
        let (mut conn, doc) = fixture();
        let guard = ConsistencyGuard::default();
        let mut calls = 0;
        let err = guard
            .run(&mut conn, "insert", |tx| -> Result<()> {
                calls += 1;
                insert_ranked(tx, doc, "k")?;
                Err(StoreError::InvalidMove("nope".into()))
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMove);
        assert_eq!(calls, 1);
        assert_eq!(block_count(&conn), 1);
    }

    #[test]
    fn test_read_sees_committed_state() {
        let (mut conn, _) = fixture();
        let guard = ConsistencyGuard::default();
        let n: i64 = guard
            .read(&mut conn, |tx| Ok(tx.query_row("SELECT COUNT(*) FROM blocks", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(n, 1);
    }
}
