//! The public entry point: one connection, scoped by workspace membership.
//!
//! Every call names the acting user. Document and block calls resolve the
//! owning workspace and check membership inside the same transaction as
//! the work itself. Membership management is reserved for owners.

use parking_lot::Mutex;
use rusqlite::Connection;
use stepnote_tree::RankGenerator;
use stepnote_types::{
    Block, BlockId, BlockPatch, BlockPayload, Document, DocumentId, DocumentNode, DocumentPatch,
    MemberRole, Membership, Position, User, UserId, Workspace, WorkspaceId,
};

use crate::block_tree::BlockTree;
use crate::config::StoreConfig;
use crate::db;
use crate::directory::Directory;
use crate::document_store::{DeletedDocuments, DocumentStore};
use crate::error::{Result, StoreError};
use crate::guard::ConsistencyGuard;

pub struct Notebook {
    conn: Mutex<Connection>,
    rank: RankGenerator,
    guard: ConsistencyGuard,
}

/// Stores bound to one open transaction.
struct Scope<'a> {
    conn: &'a Connection,
    rank: &'a RankGenerator,
}

impl<'a> Scope<'a> {
    fn blocks(&self) -> BlockTree<'a> {
        BlockTree::new(self.conn, self.rank)
    }

    fn documents(&self) -> DocumentStore<'a> {
        DocumentStore::new(self.conn)
    }

    fn directory(&self) -> Directory<'a> {
        Directory::new(self.conn)
    }

    fn require_member(&self, actor: &UserId, workspace_id: WorkspaceId) -> Result<Membership> {
        if !db::workspace_exists(self.conn, workspace_id)? {
            return Err(StoreError::not_found("workspace", workspace_id));
        }
        self.directory()
            .membership(workspace_id, actor)?
            .ok_or_else(|| StoreError::denied(actor, workspace_id))
    }

    fn require_owner(&self, actor: &UserId, workspace_id: WorkspaceId) -> Result<()> {
        match self.require_member(actor, workspace_id)?.role {
            MemberRole::Owner => Ok(()),
            MemberRole::Member => Err(StoreError::denied(actor, workspace_id)),
        }
    }

    fn document_for(&self, actor: &UserId, id: DocumentId) -> Result<Document> {
        let document = self.documents().get(id)?;
        self.require_member(actor, document.workspace_id)?;
        Ok(document)
    }

    fn block_for(&self, actor: &UserId, id: BlockId) -> Result<Block> {
        let block = self.blocks().get(id)?;
        self.document_for(actor, block.document_id)?;
        Ok(block)
    }
}

impl Notebook {
    /// Open the database described by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let conn = db::open(config)?;
        tracing::info!(
            database = ?config.database_path,
            max_rank_len = config.max_rank_len,
            max_retries = config.max_retries,
            "opened notebook"
        );
        Ok(Self {
            conn: Mutex::new(conn),
            rank: config.rank_generator(),
            guard: ConsistencyGuard::from_config(config),
        })
    }

    /// Private in-memory notebook with default settings.
    pub fn in_memory() -> Result<Self> {
        Self::open(&StoreConfig::in_memory())
    }

    pub fn rank_generator(&self) -> &RankGenerator {
        &self.rank
    }

    fn write<T>(&self, label: &'static str, mut op: impl FnMut(&Scope<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let rank = &self.rank;
        self.guard.run(&mut conn, label, |tx| op(&Scope { conn: tx, rank }))
    }

    fn read<T>(&self, op: impl FnOnce(&Scope<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let rank = &self.rank;
        self.guard.read(&mut conn, |tx| op(&Scope { conn: tx, rank }))
    }

    // =========================================================================
    // Directory
    // =========================================================================

    /// Register a user. Identity comes from the auth provider, so there is
    /// no acting user yet.
    pub fn create_user(&self, user: &User) -> Result<User> {
        self.write("create_user", |s| s.directory().create_user(user))
    }

    pub fn get_user(&self, id: &UserId) -> Result<User> {
        self.read(|s| s.directory().get_user(id))
    }

    pub fn delete_user(&self, id: &UserId) -> Result<()> {
        self.write("delete_user", |s| s.directory().delete_user(id))
    }

    pub fn create_workspace(&self, actor: &UserId, name: &str) -> Result<Workspace> {
        self.write("create_workspace", |s| s.directory().create_workspace(name, actor))
    }

    pub fn delete_workspace(&self, actor: &UserId, workspace_id: WorkspaceId) -> Result<DeletedDocuments> {
        self.write("delete_workspace", |s| {
            s.require_owner(actor, workspace_id)?;
            s.directory().delete_workspace(workspace_id)
        })
    }

    pub fn add_member(
        &self,
        actor: &UserId,
        workspace_id: WorkspaceId,
        user: &UserId,
        role: MemberRole,
    ) -> Result<Membership> {
        self.write("add_member", |s| {
            s.require_owner(actor, workspace_id)?;
            s.directory().add_member(workspace_id, user, role)
        })
    }

    /// Owners may remove anyone; members may remove themselves.
    pub fn remove_member(&self, actor: &UserId, workspace_id: WorkspaceId, user: &UserId) -> Result<()> {
        self.write("remove_member", |s| {
            if actor == user {
                s.require_member(actor, workspace_id)?;
            } else {
                s.require_owner(actor, workspace_id)?;
            }
            s.directory().remove_member(workspace_id, user)
        })
    }

    pub fn members(&self, actor: &UserId, workspace_id: WorkspaceId) -> Result<Vec<Membership>> {
        self.read(|s| {
            s.require_member(actor, workspace_id)?;
            s.directory().members(workspace_id)
        })
    }

    pub fn list_workspaces(&self, actor: &UserId) -> Result<Vec<Workspace>> {
        self.read(|s| s.directory().list_workspaces_for(actor))
    }

    pub fn set_last_active_workspace(&self, actor: &UserId, workspace_id: WorkspaceId) -> Result<User> {
        self.write("set_last_active_workspace", |s| {
            s.directory().set_last_active_workspace(actor, workspace_id)
        })
    }

    // =========================================================================
    // Documents
    // =========================================================================

    pub fn create_document(
        &self,
        actor: &UserId,
        workspace_id: WorkspaceId,
        parent_id: Option<DocumentId>,
        title: &str,
    ) -> Result<Document> {
        self.write("create_document", |s| {
            s.require_member(actor, workspace_id)?;
            s.documents().create(workspace_id, Some(actor), parent_id, title)
        })
    }

    pub fn get_document(&self, actor: &UserId, id: DocumentId) -> Result<Document> {
        self.read(|s| s.document_for(actor, id))
    }

    pub fn update_document(&self, actor: &UserId, id: DocumentId, patch: &DocumentPatch) -> Result<Document> {
        self.write("update_document", |s| {
            s.document_for(actor, id)?;
            s.documents().update(id, patch)
        })
    }

    pub fn move_document(
        &self,
        actor: &UserId,
        id: DocumentId,
        new_parent: Option<DocumentId>,
    ) -> Result<Document> {
        self.write("move_document", |s| {
            s.document_for(actor, id)?;
            s.documents().move_document(id, new_parent)
        })
    }

    pub fn delete_document(&self, actor: &UserId, id: DocumentId) -> Result<DeletedDocuments> {
        self.write("delete_document", |s| {
            s.document_for(actor, id)?;
            s.documents().delete(id)
        })
    }

    pub fn list_document_tree(&self, actor: &UserId, workspace_id: WorkspaceId) -> Result<Vec<DocumentNode>> {
        self.read(|s| {
            s.require_member(actor, workspace_id)?;
            s.documents().list_tree(workspace_id)
        })
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    pub fn insert_block(
        &self,
        actor: &UserId,
        document_id: DocumentId,
        parent: Option<BlockId>,
        position: Position,
        payload: &BlockPayload,
    ) -> Result<Block> {
        self.write("insert_block", |s| {
            s.document_for(actor, document_id)?;
            s.blocks().insert(document_id, parent, position, payload, Some(actor))
        })
    }

    pub fn get_block(&self, actor: &UserId, id: BlockId) -> Result<Block> {
        self.read(|s| s.block_for(actor, id))
    }

    pub fn update_block(&self, actor: &UserId, id: BlockId, patch: &BlockPatch) -> Result<Block> {
        self.write("update_block", |s| {
            s.block_for(actor, id)?;
            s.blocks().update_payload(id, patch)
        })
    }

    pub fn move_block(
        &self,
        actor: &UserId,
        id: BlockId,
        new_parent: Option<BlockId>,
        position: Position,
    ) -> Result<Block> {
        self.write("move_block", |s| {
            s.block_for(actor, id)?;
            s.blocks().move_block(id, new_parent, position)
        })
    }

    /// Delete a block and its subtree. Returns how many blocks went.
    pub fn delete_block(&self, actor: &UserId, id: BlockId) -> Result<usize> {
        self.write("delete_block", |s| {
            s.block_for(actor, id)?;
            s.blocks().delete(id)
        })
    }

    pub fn list_children(
        &self,
        actor: &UserId,
        document_id: DocumentId,
        parent: Option<BlockId>,
    ) -> Result<Vec<Block>> {
        self.read(|s| {
            s.document_for(actor, document_id)?;
            s.blocks().list_children(document_id, parent)
        })
    }

    pub fn block_subtree(&self, actor: &UserId, id: BlockId) -> Result<Vec<Block>> {
        self.read(|s| {
            s.block_for(actor, id)?;
            s.blocks().subtree(id)
        })
    }

    pub fn rebalance_children(
        &self,
        actor: &UserId,
        document_id: DocumentId,
        parent: Option<BlockId>,
    ) -> Result<usize> {
        self.write("rebalance_children", |s| {
            s.document_for(actor, document_id)?;
            s.blocks().rebalance_children(document_id, parent)
        })
    }
}
