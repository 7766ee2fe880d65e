//! SQLite schema, connection setup, and row conversion.
//!
//! Ids are stored as hyphenated UUID text, timestamps as Unix millis,
//! `properties`/`content` as JSON text the store never inspects.

use rusqlite::{Connection, OptionalExtension, Row, params};
use stepnote_types::{
    Block, BlockId, BlockType, Document, DocumentId, MemberRole, Membership, User, UserId,
    Workspace, WorkspaceId,
};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

const SCHEMA: &str = r#"
-- Tenants
CREATE TABLE IF NOT EXISTS workspaces (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Users (ids issued by the auth provider)
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    display_name TEXT,
    avatar_url TEXT,
    last_active_workspace_id TEXT REFERENCES workspaces(id) ON DELETE SET NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS workspace_members (
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    joined_at INTEGER NOT NULL,
    PRIMARY KEY (workspace_id, user_id)
);
CREATE INDEX IF NOT EXISTS idx_members_user ON workspace_members(user_id);

-- Documents nest through parent_id within one workspace
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    created_by TEXT REFERENCES users(id) ON DELETE SET NULL,
    parent_id TEXT REFERENCES documents(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    is_archived INTEGER NOT NULL DEFAULT 0,
    is_public INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_workspace ON documents(workspace_id);
CREATE INDEX IF NOT EXISTS idx_documents_parent ON documents(parent_id);

-- Blocks nest through parent_block_id within one document
CREATE TABLE IF NOT EXISTS blocks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    parent_block_id TEXT REFERENCES blocks(id) ON DELETE CASCADE,
    block_type TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    content TEXT NOT NULL DEFAULT '{}',
    rank TEXT NOT NULL,
    created_by TEXT REFERENCES users(id) ON DELETE SET NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
-- Sibling ranks are unique; top-level blocks share the '' parent
CREATE UNIQUE INDEX IF NOT EXISTS idx_blocks_sibling_rank
    ON blocks(document_id, COALESCE(parent_block_id, ''), rank);
CREATE INDEX IF NOT EXISTS idx_blocks_parent ON blocks(parent_block_id);
"#;

/// Open the database described by `config` and install the schema.
pub fn open(config: &StoreConfig) -> Result<Connection> {
    let conn = match &config.database_path {
        Some(path) => {
            let conn = Connection::open(path)?;
            conn.busy_timeout(config.busy_timeout())?;
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            tracing::debug!(path = %path.display(), %mode, "opened database");
            conn
        }
        None => Connection::open_in_memory()?,
    };
    prepare(&conn)?;
    Ok(conn)
}

/// Private in-memory database with the schema installed.
pub fn open_in_memory() -> Result<Connection> {
    open(&StoreConfig::in_memory())
}

fn prepare(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

// =============================================================================
// Row types
// =============================================================================

pub(crate) const BLOCK_COLUMNS: &str = "id, document_id, parent_block_id, block_type, \
     properties, content, rank, created_by, created_at, updated_at";

pub(crate) const DOCUMENT_COLUMNS: &str = "id, workspace_id, created_by, parent_id, title, \
     is_archived, is_public, created_at, updated_at";

pub(crate) const USER_COLUMNS: &str =
    "id, email, display_name, avatar_url, last_active_workspace_id, created_at";

/// Raw `blocks` row, before id and JSON parsing.
#[derive(Debug)]
pub(crate) struct BlockRow {
    id: String,
    document_id: String,
    parent_block_id: Option<String>,
    block_type: String,
    properties: String,
    content: String,
    rank: String,
    created_by: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl BlockRow {
    /// Read a row selected with [`BLOCK_COLUMNS`].
    pub(crate) fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            document_id: row.get(1)?,
            parent_block_id: row.get(2)?,
            block_type: row.get(3)?,
            properties: row.get(4)?,
            content: row.get(5)?,
            rank: row.get(6)?,
            created_by: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    pub(crate) fn into_block(self) -> Result<Block> {
        let block_type = BlockType::from_str(&self.block_type)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown block type {:?}", self.block_type)))?;
        Ok(Block {
            id: parse_id(&self.id)?,
            document_id: parse_id(&self.document_id)?,
            parent_block_id: self.parent_block_id.as_deref().map(parse_id).transpose()?,
            block_type,
            properties: serde_json::from_str(&self.properties)?,
            content: serde_json::from_str(&self.content)?,
            rank: self.rank,
            created_by: self.created_by.map(UserId::new),
            created_at: self.created_at as u64,
            updated_at: self.updated_at as u64,
        })
    }
}

/// Raw `documents` row.
#[derive(Debug)]
pub(crate) struct DocumentRow {
    id: String,
    workspace_id: String,
    created_by: Option<String>,
    parent_id: Option<String>,
    title: String,
    is_archived: bool,
    is_public: bool,
    created_at: i64,
    updated_at: i64,
}

impl DocumentRow {
    /// Read a row selected with [`DOCUMENT_COLUMNS`].
    pub(crate) fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            created_by: row.get(2)?,
            parent_id: row.get(3)?,
            title: row.get(4)?,
            is_archived: row.get::<_, i32>(5)? != 0,
            is_public: row.get::<_, i32>(6)? != 0,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    pub(crate) fn into_document(self) -> Result<Document> {
        Ok(Document {
            id: parse_id(&self.id)?,
            workspace_id: parse_id(&self.workspace_id)?,
            created_by: self.created_by.map(UserId::new),
            parent_id: self.parent_id.as_deref().map(parse_id).transpose()?,
            title: self.title,
            is_archived: self.is_archived,
            is_public: self.is_public,
            created_at: self.created_at as u64,
            updated_at: self.updated_at as u64,
        })
    }
}

/// Raw `users` row.
#[derive(Debug)]
pub(crate) struct UserRow {
    id: String,
    email: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
    last_active_workspace_id: Option<String>,
    created_at: i64,
}

impl UserRow {
    /// Read a row selected with [`USER_COLUMNS`].
    pub(crate) fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            display_name: row.get(2)?,
            avatar_url: row.get(3)?,
            last_active_workspace_id: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    pub(crate) fn into_user(self) -> Result<User> {
        Ok(User {
            id: UserId::new(self.id),
            email: self.email,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            last_active_workspace: self.last_active_workspace_id.as_deref().map(parse_id).transpose()?,
            created_at: self.created_at as u64,
        })
    }
}

/// Raw `workspace_members` row: workspace, user, role, joined_at.
pub(crate) fn read_membership(row: &Row<'_>) -> rusqlite::Result<(String, String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

pub(crate) fn membership_from_parts(
    (workspace_id, user_id, role, joined_at): (String, String, String, i64),
) -> Result<Membership> {
    let role = MemberRole::from_str(&role)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown member role {role:?}")))?;
    Ok(Membership {
        workspace_id: parse_id(&workspace_id)?,
        user_id: UserId::new(user_id),
        role,
        joined_at: joined_at as u64,
    })
}

/// Raw `workspaces` row: id, name, created_at.
pub(crate) fn read_workspace(row: &Row<'_>) -> rusqlite::Result<(String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

pub(crate) fn workspace_from_parts((id, name, created_at): (String, String, i64)) -> Result<Workspace> {
    Ok(Workspace {
        id: parse_id::<WorkspaceId>(&id)?,
        name,
        created_at: created_at as u64,
    })
}

pub(crate) fn parse_id<T: std::str::FromStr>(s: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    s.parse()
        .map_err(|e| StoreError::Corrupt(format!("malformed id {s:?}: {e}")))
}

// =============================================================================
// Shared lookups
// =============================================================================

pub(crate) fn find_block(conn: &Connection, id: BlockId) -> Result<Option<Block>> {
    let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE id = ?1");
    conn.query_row(&sql, params![id.to_column()], BlockRow::read)
        .optional()?
        .map(BlockRow::into_block)
        .transpose()
}

pub(crate) fn find_document(conn: &Connection, id: DocumentId) -> Result<Option<Document>> {
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1");
    conn.query_row(&sql, params![id.to_column()], DocumentRow::read)
        .optional()?
        .map(DocumentRow::into_document)
        .transpose()
}

pub(crate) fn workspace_exists(conn: &Connection, id: WorkspaceId) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM workspaces WHERE id = ?1",
            params![id.to_column()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap()
    }

    #[test]
    fn test_schema_installed() {
        let conn = open_in_memory().unwrap();
        assert_eq!(
            table_names(&conn),
            vec!["blocks", "documents", "users", "workspace_members", "workspaces"]
        );
        let fk: i32 = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0)).unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        prepare(&conn).unwrap();
    }

    #[test]
    fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open(&StoreConfig::at_path(dir.path().join("notes.db"))).unwrap();
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0)).unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_corrupt_block_row() {
        let conn = open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = OFF;
             INSERT INTO blocks (id, document_id, block_type, rank, created_at, updated_at)
             VALUES ('not-a-uuid', 'also-not', 'paragraph', 'V', 0, 0);",
        )
        .unwrap();
        let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks");
        let row = conn.query_row(&sql, [], BlockRow::read).unwrap();
        assert!(matches!(row.into_block(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_missing_lookups() {
        let conn = open_in_memory().unwrap();
        assert!(find_block(&conn, BlockId::new()).unwrap().is_none());
        assert!(find_document(&conn, DocumentId::new()).unwrap().is_none());
        assert!(!workspace_exists(&conn, WorkspaceId::new()).unwrap());
    }
}
