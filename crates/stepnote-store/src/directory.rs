//! Users, workspaces, and memberships.

use rusqlite::{Connection, OptionalExtension, params};
use stepnote_types::{MemberRole, Membership, User, UserId, Workspace, WorkspaceId, now_millis};

use crate::db::{self, USER_COLUMNS, UserRow};
use crate::document_store::{DeletedDocuments, DocumentStore};
use crate::error::{Result, StoreError, is_unique_violation};

pub struct Directory<'a> {
    conn: &'a Connection,
}

impl<'a> Directory<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub fn create_user(&self, user: &User) -> Result<User> {
        if user.id.as_str().is_empty() {
            return Err(StoreError::InvalidInput("user id must not be empty".into()));
        }
        if !user.email.contains('@') {
            return Err(StoreError::InvalidInput(format!("invalid email {:?}", user.email)));
        }
        if let Some(ws) = user.last_active_workspace {
            return Err(StoreError::InvalidInput(format!(
                "new user cannot start with last active workspace {ws}"
            )));
        }
        self.conn
            .execute(
                "INSERT INTO users (id, email, display_name, avatar_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.id.as_str(),
                    &user.email,
                    &user.display_name,
                    &user.avatar_url,
                    user.created_at as i64,
                ],
            )
            .map_err(|e| match e {
                e if is_unique_violation(&e) => {
                    StoreError::AlreadyExists(format!("user {} or email {}", user.id, user.email))
                }
                e => e.into(),
            })?;
        tracing::debug!(user = %user.id, "created user");
        Ok(user.clone())
    }

    pub fn get_user(&self, id: &UserId) -> Result<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        self.conn
            .query_row(&sql, params![id.as_str()], UserRow::read)
            .optional()?
            .ok_or_else(|| StoreError::not_found("user", id))?
            .into_user()
    }

    /// Remove a user. Memberships go with it; authored documents and blocks
    /// stay, with `created_by` cleared. Refused while the user is the only
    /// owner of a workspace.
    pub fn delete_user(&self, id: &UserId) -> Result<()> {
        self.get_user(id)?;
        if let Some(workspace_id) = self.solely_owned_by(id)?.first() {
            return Err(StoreError::InvalidInput(format!(
                "{id} is the only owner of workspace {workspace_id}"
            )));
        }
        self.conn.execute(
            "DELETE FROM workspace_members WHERE user_id = ?1",
            params![id.as_str()],
        )?;
        self.conn.execute(
            "UPDATE documents SET created_by = NULL WHERE created_by = ?1",
            params![id.as_str()],
        )?;
        self.conn.execute(
            "UPDATE blocks SET created_by = NULL WHERE created_by = ?1",
            params![id.as_str()],
        )?;
        self.conn.execute("DELETE FROM users WHERE id = ?1", params![id.as_str()])?;
        tracing::info!(user = %id, "deleted user");
        Ok(())
    }

    // =========================================================================
    // Workspaces
    // =========================================================================

    /// Create a workspace with `owner` as its first member.
    pub fn create_workspace(&self, name: &str, owner: &UserId) -> Result<Workspace> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidInput("workspace name must not be empty".into()));
        }
        self.get_user(owner)?;

        let workspace = Workspace {
            id: WorkspaceId::new(),
            name: name.to_string(),
            created_at: now_millis(),
        };
        self.conn.execute(
            "INSERT INTO workspaces (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![workspace.id.to_column(), &workspace.name, workspace.created_at as i64],
        )?;
        self.add_member(workspace.id, owner, MemberRole::Owner)?;
        tracing::debug!(workspace = %workspace.id.short(), name = %workspace.name, "created workspace");
        Ok(workspace)
    }

    pub fn get_workspace(&self, id: WorkspaceId) -> Result<Workspace> {
        self.conn
            .query_row(
                "SELECT id, name, created_at FROM workspaces WHERE id = ?1",
                params![id.to_column()],
                db::read_workspace,
            )
            .optional()?
            .map(db::workspace_from_parts)
            .transpose()?
            .ok_or_else(|| StoreError::not_found("workspace", id))
    }

    /// Delete a workspace with its documents, blocks, and memberships.
    pub fn delete_workspace(&self, id: WorkspaceId) -> Result<DeletedDocuments> {
        self.get_workspace(id)?;
        let deleted = DocumentStore::new(self.conn).delete_all_in_workspace(id)?;
        self.conn.execute(
            "DELETE FROM workspace_members WHERE workspace_id = ?1",
            params![id.to_column()],
        )?;
        self.conn.execute(
            "UPDATE users SET last_active_workspace_id = NULL WHERE last_active_workspace_id = ?1",
            params![id.to_column()],
        )?;
        self.conn.execute("DELETE FROM workspaces WHERE id = ?1", params![id.to_column()])?;
        tracing::info!(
            workspace = %id.short(),
            documents = deleted.documents,
            blocks = deleted.blocks,
            "deleted workspace"
        );
        Ok(deleted)
    }

    /// Workspaces `user` belongs to, oldest first.
    pub fn list_workspaces_for(&self, user: &UserId) -> Result<Vec<Workspace>> {
        let mut stmt = self.conn.prepare(
            "SELECT w.id, w.name, w.created_at FROM workspaces w
             JOIN workspace_members m ON m.workspace_id = w.id
             WHERE m.user_id = ?1
             ORDER BY w.created_at, w.id",
        )?;
        let rows = stmt.query_map(params![user.as_str()], db::read_workspace)?;
        let workspaces = rows
            .map(|row| db::workspace_from_parts(row?))
            .collect::<Result<Vec<_>>>()?;
        Ok(workspaces)
    }

    // =========================================================================
    // Memberships
    // =========================================================================

    pub fn add_member(&self, workspace_id: WorkspaceId, user: &UserId, role: MemberRole) -> Result<Membership> {
        self.get_workspace(workspace_id)?;
        self.get_user(user)?;
        let membership = Membership {
            workspace_id,
            user_id: user.clone(),
            role,
            joined_at: now_millis(),
        };
        self.conn
            .execute(
                "INSERT INTO workspace_members (workspace_id, user_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    workspace_id.to_column(),
                    user.as_str(),
                    role.as_str(),
                    membership.joined_at as i64,
                ],
            )
            .map_err(|e| match e {
                e if is_unique_violation(&e) => {
                    StoreError::AlreadyExists(format!("{user} is already a member of {workspace_id}"))
                }
                e => e.into(),
            })?;
        Ok(membership)
    }

    /// A workspace always keeps at least one owner.
    pub fn remove_member(&self, workspace_id: WorkspaceId, user: &UserId) -> Result<()> {
        if self.solely_owned_by(user)?.contains(&workspace_id) {
            return Err(StoreError::InvalidInput(format!(
                "{user} is the only owner of workspace {workspace_id}"
            )));
        }
        let removed = self.conn.execute(
            "DELETE FROM workspace_members WHERE workspace_id = ?1 AND user_id = ?2",
            params![workspace_id.to_column(), user.as_str()],
        )?;
        if removed == 0 {
            return Err(StoreError::NotFound(format!(
                "membership of {user} in workspace {workspace_id}"
            )));
        }
        self.conn.execute(
            "UPDATE users SET last_active_workspace_id = NULL
             WHERE id = ?1 AND last_active_workspace_id = ?2",
            params![user.as_str(), workspace_id.to_column()],
        )?;
        Ok(())
    }

    /// Workspaces where `user` is the one and only owner.
    fn solely_owned_by(&self, user: &UserId) -> Result<Vec<WorkspaceId>> {
        let mut stmt = self.conn.prepare(
            "SELECT m.workspace_id FROM workspace_members m
             WHERE m.user_id = ?1 AND m.role = ?2
               AND (SELECT COUNT(*) FROM workspace_members o
                    WHERE o.workspace_id = m.workspace_id AND o.role = ?2) = 1",
        )?;
        let ids = stmt
            .query_map(params![user.as_str(), MemberRole::Owner.as_str()], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        ids.iter().map(|id| db::parse_id(id)).collect()
    }

    pub fn membership(&self, workspace_id: WorkspaceId, user: &UserId) -> Result<Option<Membership>> {
        self.conn
            .query_row(
                "SELECT workspace_id, user_id, role, joined_at FROM workspace_members
                 WHERE workspace_id = ?1 AND user_id = ?2",
                params![workspace_id.to_column(), user.as_str()],
                db::read_membership,
            )
            .optional()?
            .map(db::membership_from_parts)
            .transpose()
    }

    pub fn members(&self, workspace_id: WorkspaceId) -> Result<Vec<Membership>> {
        let mut stmt = self.conn.prepare(
            "SELECT workspace_id, user_id, role, joined_at FROM workspace_members
             WHERE workspace_id = ?1
             ORDER BY joined_at, user_id",
        )?;
        let rows = stmt.query_map(params![workspace_id.to_column()], db::read_membership)?;
        let members = rows
            .map(|row| db::membership_from_parts(row?))
            .collect::<Result<Vec<_>>>()?;
        Ok(members)
    }

    /// Remember which workspace the user last opened. They must be a member.
    pub fn set_last_active_workspace(&self, user: &UserId, workspace_id: WorkspaceId) -> Result<User> {
        let mut record = self.get_user(user)?;
        self.get_workspace(workspace_id)?;
        if self.membership(workspace_id, user)?.is_none() {
            return Err(StoreError::denied(user, workspace_id));
        }
        self.conn.execute(
            "UPDATE users SET last_active_workspace_id = ?1 WHERE id = ?2",
            params![workspace_id.to_column(), user.as_str()],
        )?;
        record.last_active_workspace = Some(workspace_id);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_tree::BlockTree;
    use stepnote_tree::RankGenerator;
    use crate::error::ErrorKind;
    use stepnote_types::{BlockPayload, BlockType, Position};

    struct Fixture {
        conn: Connection,
        rank: RankGenerator,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                conn: db::open_in_memory().unwrap(),
                rank: RankGenerator::default(),
            }
        }

        fn dir(&self) -> Directory<'_> {
            Directory::new(&self.conn)
        }

        fn user(&self, id: &str) -> UserId {
            let user = User::new(id, format!("{id}@example.com"));
            self.dir().create_user(&user).unwrap().id
        }
    }

    #[test]
    fn test_user_round_trip() {
        let f = Fixture::new();
        let user = User::new("user_1", "a@example.com")
            .with_display_name("Ada")
            .with_avatar_url("https://example.com/a.png");
        f.dir().create_user(&user).unwrap();
        assert_eq!(f.dir().get_user(&user.id).unwrap(), user);
        assert_eq!(
            f.dir().get_user(&UserId::new("nobody")).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_duplicate_user_or_email() {
        let f = Fixture::new();
        f.user("u1");
        let same_id = User::new("u1", "other@example.com");
        assert_eq!(f.dir().create_user(&same_id).unwrap_err().kind(), ErrorKind::AlreadyExists);
        let same_email = User::new("u2", "u1@example.com");
        assert_eq!(f.dir().create_user(&same_email).unwrap_err().kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_rejects_bad_email() {
        let f = Fixture::new();
        let err = f.dir().create_user(&User::new("u1", "nope")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_creator_becomes_owner() {
        let f = Fixture::new();
        let owner = f.user("owner");
        let ws = f.dir().create_workspace("Team", &owner).unwrap();
        let membership = f.dir().membership(ws.id, &owner).unwrap().unwrap();
        assert_eq!(membership.role, MemberRole::Owner);
        assert_eq!(f.dir().list_workspaces_for(&owner).unwrap(), vec![ws]);
    }

    #[test]
    fn test_membership_lifecycle() {
        let f = Fixture::new();
        let owner = f.user("owner");
        let guest = f.user("guest");
        let ws = f.dir().create_workspace("Team", &owner).unwrap();

        f.dir().add_member(ws.id, &guest, MemberRole::Member).unwrap();
        let err = f.dir().add_member(ws.id, &guest, MemberRole::Member).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(f.dir().members(ws.id).unwrap().len(), 2);

        f.dir().set_last_active_workspace(&guest, ws.id).unwrap();
        f.dir().remove_member(ws.id, &guest).unwrap();
        assert!(f.dir().membership(ws.id, &guest).unwrap().is_none());
        assert_eq!(f.dir().get_user(&guest).unwrap().last_active_workspace, None);
        assert_eq!(f.dir().remove_member(ws.id, &guest).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_last_owner_cannot_leave() {
        let f = Fixture::new();
        let owner = f.user("owner");
        let ws = f.dir().create_workspace("Team", &owner).unwrap();

        let err = f.dir().remove_member(ws.id, &owner).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = f.dir().delete_user(&owner).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(f.dir().membership(ws.id, &owner).unwrap().is_some());

        // A second owner frees the first.
        let heir = f.user("heir");
        f.dir().add_member(ws.id, &heir, MemberRole::Owner).unwrap();
        f.dir().remove_member(ws.id, &owner).unwrap();
        let err = f.dir().delete_user(&heir).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        f.dir().delete_user(&owner).unwrap();
    }

    #[test]
    fn test_last_active_requires_membership() {
        let f = Fixture::new();
        let owner = f.user("owner");
        let outsider = f.user("outsider");
        let ws = f.dir().create_workspace("Team", &owner).unwrap();

        let err = f.dir().set_last_active_workspace(&outsider, ws.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        let user = f.dir().set_last_active_workspace(&owner, ws.id).unwrap();
        assert_eq!(user.last_active_workspace, Some(ws.id));
        assert_eq!(f.dir().get_user(&owner).unwrap().last_active_workspace, Some(ws.id));
    }

    #[test]
    fn test_delete_user_keeps_authored_content() {
        let f = Fixture::new();
        let owner = f.user("owner");
        let author = f.user("author");
        let ws = f.dir().create_workspace("Team", &owner).unwrap();
        f.dir().add_member(ws.id, &author, MemberRole::Member).unwrap();
        let doc = DocumentStore::new(&f.conn)
            .create(ws.id, Some(&author), None, "Notes")
            .unwrap();
        let block = BlockTree::new(&f.conn, &f.rank)
            .insert(doc.id, None, Position::End, &BlockPayload::text(BlockType::Paragraph, "hi"), Some(&author))
            .unwrap();

        f.dir().delete_user(&author).unwrap();
        assert!(f.dir().membership(ws.id, &author).unwrap().is_none());
        assert_eq!(DocumentStore::new(&f.conn).get(doc.id).unwrap().created_by, None);
        assert_eq!(BlockTree::new(&f.conn, &f.rank).get(block.id).unwrap().created_by, None);
    }

    #[test]
    fn test_delete_workspace_cascades() {
        let f = Fixture::new();
        let owner = f.user("owner");
        let ws = f.dir().create_workspace("Team", &owner).unwrap();
        f.dir().set_last_active_workspace(&owner, ws.id).unwrap();
        let docs = DocumentStore::new(&f.conn);
        let root = docs.create(ws.id, Some(&owner), None, "root").unwrap();
        docs.create(ws.id, Some(&owner), Some(root.id), "child").unwrap();
        BlockTree::new(&f.conn, &f.rank)
            .insert(root.id, None, Position::End, &BlockPayload::text(BlockType::Paragraph, "x"), None)
            .unwrap();

        let deleted = f.dir().delete_workspace(ws.id).unwrap();
        assert_eq!(deleted, DeletedDocuments { documents: 2, blocks: 1 });
        assert_eq!(f.dir().get_workspace(ws.id).unwrap_err().kind(), ErrorKind::NotFound);
        assert!(f.dir().list_workspaces_for(&owner).unwrap().is_empty());
        assert_eq!(f.dir().get_user(&owner).unwrap().last_active_workspace, None);
    }
}
