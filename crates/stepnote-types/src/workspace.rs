//! Workspaces, users, and memberships.
//!
//! These are created by onboarding flows and read by the engine to scope
//! every document and block operation to the workspaces a user belongs to.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{UserId, WorkspaceId};

/// A tenant. Owns documents and has members.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    /// Unix millis.
    pub created_at: u64,
}

/// A user as known to the engine. The id is issued by the auth provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Unique across users.
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Weak reference: nulled if the workspace goes away.
    pub last_active_workspace: Option<WorkspaceId>,
    /// Unix millis.
    pub created_at: u64,
}

impl User {
    pub fn new(id: impl Into<UserId>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            display_name: None,
            avatar_url: None,
            last_active_workspace: None,
            created_at: crate::now_millis(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }
}

/// A member's standing in a workspace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum MemberRole {
    Owner,
    #[default]
    Member,
}

impl MemberRole {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Member => "member",
        }
    }
}

impl std::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (workspace, user) link. Unique per pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub workspace_id: WorkspaceId,
    pub user_id: UserId,
    pub role: MemberRole,
    /// Unix millis.
    pub joined_at: u64,
}
