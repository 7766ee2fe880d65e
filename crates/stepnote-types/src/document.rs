//! Document metadata and the document tree.
//!
//! Documents nest through `parent_id`. Unlike blocks they carry no order
//! key: siblings are shown by creation time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{DocumentId, UserId, WorkspaceId};

/// Title given to documents created without one.
pub const DEFAULT_TITLE: &str = "Untitled";

/// A stored document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Author; nulled when the user is deleted.
    pub created_by: Option<UserId>,
    /// Parent document in the same workspace. `None` for roots.
    pub parent_id: Option<DocumentId>,
    pub title: String,
    pub is_archived: bool,
    pub is_public: bool,
    /// Unix millis.
    pub created_at: u64,
    /// Unix millis.
    pub updated_at: u64,
}

impl Document {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Partial update of document metadata. Reparenting goes through a move.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

/// A document with its child documents, recursively.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub document: Document,
    pub children: Vec<DocumentNode>,
}

impl DocumentNode {
    /// Number of documents in this subtree, including this one.
    pub fn subtree_size(&self) -> usize {
        1 + self.children.iter().map(DocumentNode::subtree_size).sum::<usize>()
    }
}

/// Group a flat list of documents into a forest by `parent_id`.
///
/// Siblings are ordered by `(created_at, id)`. A document whose parent is not
/// in `documents` is treated as a root. Documents caught in a parent cycle
/// are unreachable from any root and are dropped.
pub fn build_document_tree(documents: Vec<Document>) -> Vec<DocumentNode> {
    let present: std::collections::HashSet<DocumentId> =
        documents.iter().map(|d| d.id).collect();

    let mut roots = Vec::new();
    let mut by_parent: HashMap<DocumentId, Vec<Document>> = HashMap::new();
    for doc in documents {
        match doc.parent_id {
            Some(pid) if present.contains(&pid) => by_parent.entry(pid).or_default().push(doc),
            _ => roots.push(doc),
        }
    }

    fn sort(docs: &mut [Document]) {
        docs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    }

    fn attach(doc: Document, by_parent: &mut HashMap<DocumentId, Vec<Document>>) -> DocumentNode {
        let mut kids = by_parent.remove(&doc.id).unwrap_or_default();
        sort(&mut kids);
        let children = kids.into_iter().map(|k| attach(k, by_parent)).collect();
        DocumentNode { document: doc, children }
    }

    sort(&mut roots);
    roots
        .into_iter()
        .map(|doc| attach(doc, &mut by_parent))
        .collect()
}
