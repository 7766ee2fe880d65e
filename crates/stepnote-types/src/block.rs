//! Block records and the closed block-type discriminator.
//!
//! A block is one node of a document's content tree. Its `properties` and
//! `content` are opaque JSON: validated by whoever accepts them from the
//! outside, stored and returned untouched here.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{BlockId, DocumentId, UserId};

/// What a block *is*. Decides how `content` is interpreted by the editor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum BlockType {
    /// Plain text paragraph.
    #[default]
    Paragraph,
    Heading,
    /// Collapsible container; its children hide behind it.
    Toggle,
    #[strum(serialize = "bullet", serialize = "bulleted_list")]
    Bullet,
    #[strum(serialize = "numbered", serialize = "numbered_list")]
    Numbered,
    #[strum(serialize = "todo", serialize = "to_do")]
    Todo,
    Quote,
    Code,
    Divider,
    Image,
}

impl BlockType {
    /// Parse from string (case-insensitive, accepts list aliases).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to the stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Paragraph => "paragraph",
            BlockType::Heading => "heading",
            BlockType::Toggle => "toggle",
            BlockType::Bullet => "bullet",
            BlockType::Numbered => "numbered",
            BlockType::Todo => "todo",
            BlockType::Quote => "quote",
            BlockType::Code => "code",
            BlockType::Divider => "divider",
            BlockType::Image => "image",
        }
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    /// Owning document. Every block belongs to exactly one.
    pub document_id: DocumentId,
    /// Parent block in the same document. `None` for top-level blocks.
    pub parent_block_id: Option<BlockId>,
    pub block_type: BlockType,
    pub properties: serde_json::Value,
    pub content: serde_json::Value,
    /// Order key among siblings sharing `(document_id, parent_block_id)`.
    pub rank: String,
    /// Author; nulled when the user is deleted.
    pub created_by: Option<UserId>,
    /// Unix millis.
    pub created_at: u64,
    /// Unix millis.
    pub updated_at: u64,
}

/// What a caller supplies when creating a block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockPayload {
    pub block_type: BlockType,
    #[serde(default = "empty_object")]
    pub properties: serde_json::Value,
    #[serde(default = "empty_object")]
    pub content: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl BlockPayload {
    pub fn new(block_type: BlockType, content: serde_json::Value) -> Self {
        Self {
            block_type,
            properties: empty_object(),
            content,
        }
    }

    /// Paragraph with `{"text": ...}` content.
    pub fn text(block_type: BlockType, text: impl Into<String>) -> Self {
        Self::new(block_type, serde_json::json!({ "text": text.into() }))
    }

    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }
}

/// Partial update of a block's payload. Placement (rank, parent) is never
/// patchable; it only changes through moves.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<BlockType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

impl BlockPatch {
    pub fn is_empty(&self) -> bool {
        self.block_type.is_none() && self.properties.is_none() && self.content.is_none()
    }
}

/// Where to place a block relative to the target parent's children.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "at", content = "block", rename_all = "snake_case")]
pub enum Position {
    /// Before the first child.
    Start,
    /// After the last child.
    End,
    /// Immediately after the given sibling.
    After(BlockId),
    /// Immediately before the given sibling.
    Before(BlockId),
}

impl Position {
    /// The sibling this position is anchored on, if any.
    pub fn anchor(&self) -> Option<BlockId> {
        match self {
            Position::Start | Position::End => None,
            Position::After(id) | Position::Before(id) => Some(*id),
        }
    }
}
