//! Documents and their parent/child hierarchy within a workspace.

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use stepnote_tree::check_reparent;
use stepnote_types::{
    DEFAULT_TITLE, Document, DocumentId, DocumentNode, DocumentPatch, UserId, WorkspaceId,
    build_document_tree, now_millis,
};

use crate::db::{self, DOCUMENT_COLUMNS, DocumentRow};
use crate::error::{Result, StoreError};

/// What a document delete removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedDocuments {
    pub documents: usize,
    pub blocks: usize,
}

impl std::ops::AddAssign for DeletedDocuments {
    fn add_assign(&mut self, other: Self) {
        self.documents += other.documents;
        self.blocks += other.blocks;
    }
}

pub struct DocumentStore<'a> {
    conn: &'a Connection,
}

impl<'a> DocumentStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, id: DocumentId) -> Result<Document> {
        db::find_document(self.conn, id)?.ok_or_else(|| StoreError::not_found("document", id))
    }

    /// All documents of a workspace, flat, oldest first.
    pub fn list(&self, workspace_id: WorkspaceId) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE workspace_id = ?1
             ORDER BY created_at, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![workspace_id.to_column()], DocumentRow::read)?;
        let documents = rows.map(|row| row?.into_document()).collect::<Result<Vec<_>>>()?;
        Ok(documents)
    }

    pub fn list_tree(&self, workspace_id: WorkspaceId) -> Result<Vec<DocumentNode>> {
        Ok(build_document_tree(self.list(workspace_id)?))
    }

    pub fn create(
        &self,
        workspace_id: WorkspaceId,
        created_by: Option<&UserId>,
        parent_id: Option<DocumentId>,
        title: &str,
    ) -> Result<Document> {
        if !db::workspace_exists(self.conn, workspace_id)? {
            return Err(StoreError::not_found("workspace", workspace_id));
        }
        if let Some(parent) = parent_id {
            self.require_parent(workspace_id, parent)?;
        }

        let title = title.trim();
        let now = now_millis();
        let document = Document {
            id: DocumentId::new(),
            workspace_id,
            created_by: created_by.cloned(),
            parent_id,
            title: if title.is_empty() { DEFAULT_TITLE.to_string() } else { title.to_string() },
            is_archived: false,
            is_public: false,
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO documents (id, workspace_id, created_by, parent_id, title,
                                    is_archived, is_public, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6, ?7)",
            params![
                document.id.to_column(),
                workspace_id.to_column(),
                document.created_by.as_ref().map(|u| u.as_str()),
                parent_id.map(|p| p.to_column()),
                &document.title,
                now as i64,
                now as i64,
            ],
        )?;
        tracing::debug!(document = %document.id.short(), title = %document.title, "created document");
        Ok(document)
    }

    pub fn update(&self, id: DocumentId, patch: &DocumentPatch) -> Result<Document> {
        let mut document = self.get(id)?;
        if let Some(title) = &patch.title {
            let title = title.trim();
            document.title = if title.is_empty() { DEFAULT_TITLE.to_string() } else { title.to_string() };
        }
        if let Some(archived) = patch.is_archived {
            document.is_archived = archived;
        }
        if let Some(public) = patch.is_public {
            document.is_public = public;
        }
        document.updated_at = now_millis();

        self.conn.execute(
            "UPDATE documents SET title = ?1, is_archived = ?2, is_public = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                &document.title,
                document.is_archived,
                document.is_public,
                document.updated_at as i64,
                id.to_column(),
            ],
        )?;
        Ok(document)
    }

    /// Reparent a document within its workspace. `None` makes it a root.
    pub fn move_document(&self, id: DocumentId, new_parent: Option<DocumentId>) -> Result<Document> {
        let mut document = self.get(id)?;
        if new_parent == document.parent_id {
            return Ok(document);
        }
        if let Some(parent) = new_parent {
            if parent == id {
                return Err(StoreError::InvalidMove(format!("document {id} cannot be its own parent")));
            }
            self.require_parent(document.workspace_id, parent)?;
            let limit = self.count_in_workspace(document.workspace_id)?;
            check_reparent(id, parent, limit, |d| self.parent_of(d))?;
        }

        document.parent_id = new_parent;
        document.updated_at = now_millis();
        self.conn.execute(
            "UPDATE documents SET parent_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![new_parent.map(|p| p.to_column()), document.updated_at as i64, id.to_column()],
        )?;
        tracing::debug!(document = %id.short(), parent = ?new_parent.map(|p| p.short()), "moved document");
        Ok(document)
    }

    /// Delete a document, its child documents, and every block they own.
    pub fn delete(&self, id: DocumentId) -> Result<DeletedDocuments> {
        let document = self.get(id)?;
        let ids = self.subtree_ids(id)?;

        let mut deleted = DeletedDocuments::default();
        for doc_id in &ids {
            deleted.blocks += self.delete_blocks(*doc_id)?;
        }
        self.conn.execute(
            "WITH RECURSIVE subtree(id) AS (
                 SELECT id FROM documents WHERE id = ?1
                 UNION
                 SELECT d.id FROM documents d JOIN subtree s ON d.parent_id = s.id
             )
             DELETE FROM documents WHERE id IN (SELECT id FROM subtree)",
            params![id.to_column()],
        )?;
        deleted.documents = ids.len();

        tracing::info!(
            document = %id.short(),
            workspace = %document.workspace_id.short(),
            documents = deleted.documents,
            blocks = deleted.blocks,
            "deleted document subtree"
        );
        Ok(deleted)
    }

    /// Delete every document of a workspace.
    pub fn delete_all_in_workspace(&self, workspace_id: WorkspaceId) -> Result<DeletedDocuments> {
        let mut deleted = DeletedDocuments::default();
        for document in self.list(workspace_id)?.iter().filter(|d| d.is_root()) {
            deleted += self.delete(document.id)?;
        }
        // Documents whose parent chain never reaches a root.
        while let Some(document) = self.list(workspace_id)?.into_iter().next() {
            deleted += self.delete(document.id)?;
        }
        Ok(deleted)
    }

    pub fn count_in_workspace(&self, workspace_id: WorkspaceId) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE workspace_id = ?1",
            params![workspace_id.to_column()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    fn subtree_ids(&self, id: DocumentId) -> Result<Vec<DocumentId>> {
        let mut stmt = self.conn.prepare(
            "WITH RECURSIVE subtree(id) AS (
                 SELECT id FROM documents WHERE id = ?1
                 UNION
                 SELECT d.id FROM documents d JOIN subtree s ON d.parent_id = s.id
             )
             SELECT id FROM subtree",
        )?;
        let raw = stmt
            .query_map(params![id.to_column()], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.iter()
            .map(|s| {
                s.parse()
                    .map_err(|e| StoreError::Corrupt(format!("malformed document id {s:?}: {e}")))
            })
            .collect()
    }

    /// Remove every block of one document. Counts first, since rows removed
    /// by the parent cascade do not show up in `changes()`.
    fn delete_blocks(&self, document_id: DocumentId) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM blocks WHERE document_id = ?1",
            params![document_id.to_column()],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "DELETE FROM blocks WHERE document_id = ?1",
            params![document_id.to_column()],
        )?;
        Ok(count as usize)
    }

    fn parent_of(&self, id: DocumentId) -> Result<Option<DocumentId>> {
        Ok(db::find_document(self.conn, id)?.and_then(|d| d.parent_id))
    }

    /// A parent must exist and live in the same workspace.
    fn require_parent(&self, workspace_id: WorkspaceId, parent: DocumentId) -> Result<Document> {
        let document = db::find_document(self.conn, parent)?
            .ok_or_else(|| StoreError::InvalidMove(format!("parent document {parent} does not exist")))?;
        if document.workspace_id != workspace_id {
            return Err(StoreError::InvalidMove(format!(
                "parent document {parent} belongs to another workspace"
            )));
        }
        Ok(document)
    }
}
