//! Block placement: the only code that writes `rank` or `parent_block_id`.
//!
//! A `BlockTree` borrows a connection that is already inside a guard
//! transaction. Reads of the sibling set and the write that depends on
//! them therefore commit or roll back together.

use rusqlite::{Connection, OptionalExtension, params};
use stepnote_tree::{RankGenerator, TreeError, check_reparent, rank_for, resolve_bounds};
use stepnote_types::{Block, BlockId, BlockPatch, BlockPayload, DocumentId, Position, UserId, now_millis};

use crate::db::{self, BLOCK_COLUMNS, BlockRow};
use crate::error::{Result, StoreError};

/// Prefix for parking ranks during a rebalance. Sorts after every base-62
/// digit and never collides with a real key.
const PARKED_PREFIX: &str = "~";

pub struct BlockTree<'a> {
    conn: &'a Connection,
    rank: &'a RankGenerator,
}

impl<'a> BlockTree<'a> {
    pub fn new(conn: &'a Connection, rank: &'a RankGenerator) -> Self {
        Self { conn, rank }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get(&self, id: BlockId) -> Result<Block> {
        db::find_block(self.conn, id)?.ok_or_else(|| StoreError::not_found("block", id))
    }

    /// Children of `parent` (or the top level when `None`), ascending by rank.
    ///
    /// A parent that is missing or sits in another document is `NotFound`,
    /// so an empty result always means a real leaf.
    pub fn list_children(&self, document_id: DocumentId, parent: Option<BlockId>) -> Result<Vec<Block>> {
        self.require_sibling_set(document_id, parent)?;
        self.children(document_id, parent)
    }

    fn children(&self, document_id: DocumentId, parent: Option<BlockId>) -> Result<Vec<Block>> {
        let sql = format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks
             WHERE document_id = ?1 AND parent_block_id IS ?2
             ORDER BY rank"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![document_id.to_column(), parent.map(|p| p.to_column())],
            BlockRow::read,
        )?;
        let blocks = rows.map(|row| row?.into_block()).collect::<Result<Vec<_>>>()?;
        Ok(blocks)
    }

    /// `block_id` and all its descendants, pre-order, children by rank.
    pub fn subtree(&self, block_id: BlockId) -> Result<Vec<Block>> {
        let root = self.get(block_id)?;
        let document_id = root.document_id;
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(block) = stack.pop() {
            let children = self.children(document_id, Some(block.id))?;
            out.push(block);
            stack.extend(children.into_iter().rev());
        }
        Ok(out)
    }

    pub fn count_in_document(&self, document_id: DocumentId) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM blocks WHERE document_id = ?1",
            params![document_id.to_column()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    fn sibling_ranks(
        &self,
        document_id: DocumentId,
        parent: Option<BlockId>,
        excluding: Option<BlockId>,
    ) -> Result<Vec<(BlockId, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, rank FROM blocks
             WHERE document_id = ?1 AND parent_block_id IS ?2
             ORDER BY rank",
        )?;
        let rows = stmt.query_map(
            params![document_id.to_column(), parent.map(|p| p.to_column())],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?;
        let mut siblings = Vec::new();
        for row in rows {
            let (id, rank) = row?;
            let id: BlockId = id
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("malformed block id {id:?}: {e}")))?;
            if Some(id) != excluding {
                siblings.push((id, rank));
            }
        }
        Ok(siblings)
    }

    fn parent_of(&self, id: BlockId) -> Result<Option<BlockId>> {
        let parent: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT parent_block_id FROM blocks WHERE id = ?1",
                params![id.to_column()],
                |row| row.get(0),
            )
            .optional()?;
        parent
            .flatten()
            .map(|p| {
                p.parse()
                    .map_err(|e| StoreError::Corrupt(format!("malformed block id {p:?}: {e}")))
            })
            .transpose()
    }

    fn require_document(&self, document_id: DocumentId) -> Result<()> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM documents WHERE id = ?1",
                params![document_id.to_column()],
                |_| Ok(()),
            )
            .optional()?;
        found.ok_or_else(|| StoreError::not_found("document", document_id))
    }

    fn require_sibling_set(&self, document_id: DocumentId, parent: Option<BlockId>) -> Result<()> {
        self.require_document(document_id)?;
        let Some(parent) = parent else {
            return Ok(());
        };
        let block = self.get(parent)?;
        if block.document_id != document_id {
            return Err(StoreError::NotFound(format!(
                "block {parent} in document {document_id}"
            )));
        }
        Ok(())
    }

    /// A parent must exist and live in the same document.
    fn require_parent(&self, document_id: DocumentId, parent: BlockId) -> Result<Block> {
        let block = db::find_block(self.conn, parent)?
            .ok_or_else(|| StoreError::InvalidMove(format!("parent block {parent} does not exist")))?;
        if block.document_id != document_id {
            return Err(StoreError::InvalidMove(format!(
                "parent block {parent} belongs to document {}, not {document_id}",
                block.document_id
            )));
        }
        Ok(block)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub fn insert(
        &self,
        document_id: DocumentId,
        parent: Option<BlockId>,
        position: Position,
        payload: &BlockPayload,
        created_by: Option<&UserId>,
    ) -> Result<Block> {
        self.require_document(document_id)?;
        if let Some(parent) = parent {
            self.require_parent(document_id, parent)?;
        }

        let rank = self.place(document_id, parent, position, None)?;
        let now = now_millis();
        let block = Block {
            id: BlockId::new(),
            document_id,
            parent_block_id: parent,
            block_type: payload.block_type,
            properties: payload.properties.clone(),
            content: payload.content.clone(),
            rank,
            created_by: created_by.cloned(),
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO blocks (id, document_id, parent_block_id, block_type, properties, content,
                                 rank, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                block.id.to_column(),
                document_id.to_column(),
                parent.map(|p| p.to_column()),
                block.block_type.as_str(),
                serde_json::to_string(&block.properties)?,
                serde_json::to_string(&block.content)?,
                &block.rank,
                block.created_by.as_ref().map(|u| u.as_str()),
                now as i64,
                now as i64,
            ],
        )?;
        tracing::debug!(block = %block.id.short(), rank = %block.rank, "inserted block");
        Ok(block)
    }

    pub fn move_block(
        &self,
        block_id: BlockId,
        new_parent: Option<BlockId>,
        position: Position,
    ) -> Result<Block> {
        let mut block = self.get(block_id)?;
        let document_id = block.document_id;

        if let Some(parent) = new_parent {
            if parent == block_id {
                return Err(StoreError::InvalidMove(format!("block {block_id} cannot be its own parent")));
            }
            self.require_parent(document_id, parent)?;
            let limit = self.count_in_document(document_id)?;
            check_reparent(block_id, parent, limit, |id| self.parent_of(id))?;
        }

        if new_parent == block.parent_block_id {
            if position.anchor() == Some(block_id) {
                return Ok(block);
            }
            let siblings = self.sibling_ranks(document_id, new_parent, Some(block_id))?;
            if resolve_bounds(&siblings, position)?.contains(&block.rank) {
                tracing::debug!(block = %block_id.short(), "move to current position, keeping rank");
                return Ok(block);
            }
        } else if position.anchor() == Some(block_id) {
            return Err(StoreError::InvalidMove(format!(
                "block {block_id} cannot be placed relative to itself under a new parent"
            )));
        }

        let rank = self.place(document_id, new_parent, position, Some(block_id))?;
        let now = now_millis();
        self.conn.execute(
            "UPDATE blocks SET parent_block_id = ?1, rank = ?2, updated_at = ?3 WHERE id = ?4",
            params![new_parent.map(|p| p.to_column()), &rank, now as i64, block_id.to_column()],
        )?;
        tracing::debug!(block = %block_id.short(), %rank, "moved block");

        block.parent_block_id = new_parent;
        block.rank = rank;
        block.updated_at = now;
        Ok(block)
    }

    /// Delete `block_id` and its whole subtree. Returns the number of blocks
    /// removed (descendants + 1).
    pub fn delete(&self, block_id: BlockId) -> Result<usize> {
        let block = self.get(block_id)?;
        let ids = self.subtree_ids(block_id)?;
        self.conn.execute(
            "WITH RECURSIVE subtree(id) AS (
                 SELECT id FROM blocks WHERE id = ?1
                 UNION
                 SELECT b.id FROM blocks b JOIN subtree s ON b.parent_block_id = s.id
             )
             DELETE FROM blocks WHERE id IN (SELECT id FROM subtree)",
            params![block_id.to_column()],
        )?;
        tracing::info!(
            block = %block_id.short(),
            document = %block.document_id.short(),
            deleted = ids.len(),
            "deleted block subtree"
        );
        Ok(ids.len())
    }

    /// Delete every block of a document. Returns how many there were.
    fn subtree_ids(&self, block_id: BlockId) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "WITH RECURSIVE subtree(id) AS (
                 SELECT id FROM blocks WHERE id = ?1
                 UNION
                 SELECT b.id FROM blocks b JOIN subtree s ON b.parent_block_id = s.id
             )
             SELECT id FROM subtree",
        )?;
        let ids = stmt
            .query_map(params![block_id.to_column()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Replace type, properties, and/or content. Placement is untouched.
    pub fn update_payload(&self, block_id: BlockId, patch: &BlockPatch) -> Result<Block> {
        let mut block = self.get(block_id)?;
        if patch.is_empty() {
            return Ok(block);
        }
        if let Some(block_type) = patch.block_type {
            block.block_type = block_type;
        }
        if let Some(properties) = &patch.properties {
            block.properties = properties.clone();
        }
        if let Some(content) = &patch.content {
            block.content = content.clone();
        }
        block.updated_at = now_millis();

        self.conn.execute(
            "UPDATE blocks SET block_type = ?1, properties = ?2, content = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                block.block_type.as_str(),
                serde_json::to_string(&block.properties)?,
                serde_json::to_string(&block.content)?,
                block.updated_at as i64,
                block_id.to_column(),
            ],
        )?;
        Ok(block)
    }

    /// Give the children of `parent` fresh, evenly spaced ranks in their
    /// current order. Returns the number of children rewritten.
    pub fn rebalance_children(&self, document_id: DocumentId, parent: Option<BlockId>) -> Result<usize> {
        self.require_sibling_set(document_id, parent)?;
        self.respace(document_id, parent)
    }

    fn respace(&self, document_id: DocumentId, parent: Option<BlockId>) -> Result<usize> {
        let siblings = self.sibling_ranks(document_id, parent, None)?;
        let keys = self.rank.spread(siblings.len())?;

        // Park first so no intermediate state repeats a final key.
        for (id, _) in &siblings {
            let id = id.to_column();
            self.conn.execute(
                "UPDATE blocks SET rank = ?1 WHERE id = ?2",
                params![format!("{PARKED_PREFIX}{id}"), &id],
            )?;
        }
        for ((id, _), key) in siblings.iter().zip(&keys) {
            self.conn.execute(
                "UPDATE blocks SET rank = ?1 WHERE id = ?2",
                params![key, id.to_column()],
            )?;
        }

        tracing::info!(
            document = %document_id.short(),
            parent = ?parent.map(|p| p.short()),
            children = siblings.len(),
            "rebalanced sibling ranks"
        );
        Ok(siblings.len())
    }

    /// Rank for `position` among the children of `parent`, skipping the block
    /// being moved. An exhausted gap triggers one rebalance and a retry.
    fn place(
        &self,
        document_id: DocumentId,
        parent: Option<BlockId>,
        position: Position,
        moving: Option<BlockId>,
    ) -> Result<String> {
        let siblings = self.sibling_ranks(document_id, parent, moving)?;
        match rank_for(self.rank, &siblings, position) {
            Err(TreeError::Exhausted { max_len }) => {
                tracing::info!(max_len, "rank gap exhausted, rebalancing siblings");
                self.respace(document_id, parent)?;
                let siblings = self.sibling_ranks(document_id, parent, moving)?;
                Ok(rank_for(self.rank, &siblings, position)?)
            }
            other => Ok(other?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;
    use stepnote_types::{BlockType, WorkspaceId};

    struct Fixture {
        conn: Connection,
        rank: RankGenerator,
        doc: DocumentId,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_rank(RankGenerator::default())
        }

        fn with_rank(rank: RankGenerator) -> Self {
            let conn = db::open_in_memory().unwrap();
            let ws = WorkspaceId::new();
            conn.execute(
                "INSERT INTO workspaces (id, name, created_at) VALUES (?1, 'w', 0)",
                params![ws.to_column()],
            )
            .unwrap();
            let doc = add_document(&conn, ws);
            Self { conn, rank, doc }
        }

        fn tree(&self) -> BlockTree<'_> {
            BlockTree::new(&self.conn, &self.rank)
        }

        fn add(&self, parent: Option<BlockId>, position: Position, text: &str) -> Block {
            self.tree()
                .insert(self.doc, parent, position, &BlockPayload::text(BlockType::Paragraph, text), None)
                .unwrap()
        }

        fn order(&self, parent: Option<BlockId>) -> Vec<BlockId> {
            self.tree()
                .list_children(self.doc, parent)
                .unwrap()
                .iter()
                .map(|b| b.id)
                .collect()
        }
    }

    fn add_document(conn: &Connection, ws: WorkspaceId) -> DocumentId {
        let doc = DocumentId::new();
        conn.execute(
            "INSERT INTO documents (id, workspace_id, title, created_at, updated_at)
             VALUES (?1, ?2, 'd', 0, 0)",
            params![doc.to_column(), ws.to_column()],
        )
        .unwrap();
        doc
    }

    #[test]
    fn test_first_block_gets_midpoint() {
        let f = Fixture::new();
        let a = f.add(None, Position::End, "a");
        assert_eq!(a.rank, "V");
        assert_eq!(f.tree().get(a.id).unwrap(), a);
    }

    #[test]
    fn test_insert_positions() {
        let f = Fixture::new();
        let a = f.add(None, Position::End, "a");
        let b = f.add(None, Position::After(a.id), "b");
        let c = f.add(None, Position::Before(b.id), "c");
        let z = f.add(None, Position::Start, "z");
        assert!(a.rank < c.rank && c.rank < b.rank);
        assert_eq!(f.order(None), vec![z.id, a.id, c.id, b.id]);
    }

    #[test]
    fn test_insert_stores_payload() {
        let f = Fixture::new();
        let payload = BlockPayload::new(BlockType::Todo, json!({"text": "ship it"}))
            .with_properties(json!({"checked": true}));
        let user = UserId::new("u1");
        f.conn
            .execute(
                "INSERT INTO users (id, email, created_at) VALUES ('u1', 'u1@example.com', 0)",
                [],
            )
            .unwrap();
        let block = f.tree().insert(f.doc, None, Position::End, &payload, Some(&user)).unwrap();
        let stored = f.tree().get(block.id).unwrap();
        assert_eq!(stored.block_type, BlockType::Todo);
        assert_eq!(stored.properties, json!({"checked": true}));
        assert_eq!(stored.content, json!({"text": "ship it"}));
        assert_eq!(stored.created_by, Some(user));
    }

    #[test]
    fn test_insert_into_missing_document() {
        let f = Fixture::new();
        let err = f
            .tree()
            .insert(DocumentId::new(), None, Position::End, &BlockPayload::text(BlockType::Paragraph, ""), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_insert_under_foreign_or_missing_parent() {
        let f = Fixture::new();
        let ws: String = f
            .conn
            .query_row("SELECT id FROM workspaces", [], |r| r.get(0))
            .unwrap();
        let other_doc = add_document(&f.conn, ws.parse().unwrap());
        let foreign = f
            .tree()
            .insert(other_doc, None, Position::End, &BlockPayload::text(BlockType::Paragraph, "x"), None)
            .unwrap();

        let payload = BlockPayload::text(BlockType::Paragraph, "y");
        let err = f.tree().insert(f.doc, Some(foreign.id), Position::End, &payload, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMove);

        let err = f.tree().insert(f.doc, Some(BlockId::new()), Position::End, &payload, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMove);
    }

    #[test]
    fn test_anchor_outside_sibling_set() {
        let f = Fixture::new();
        let p = f.add(None, Position::End, "p");
        let child = f.add(Some(p.id), Position::End, "child");
        let payload = BlockPayload::text(BlockType::Paragraph, "x");
        let err = f
            .tree()
            .insert(f.doc, None, Position::After(child.id), &payload, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_repeated_inserts_after_same_anchor() {
        let f = Fixture::new();
        let a = f.add(None, Position::End, "a");
        let tail = f.add(None, Position::End, "tail");
        for i in 0..30 {
            f.add(None, Position::After(a.id), &i.to_string());
        }
        let children = f.tree().list_children(f.doc, None).unwrap();
        assert_eq!(children.len(), 32);
        assert_eq!(children.first().unwrap().id, a.id);
        assert_eq!(children.last().unwrap().id, tail.id);
        assert_eq!(f.tree().get(a.id).unwrap().rank, a.rank);
        assert_eq!(f.tree().get(tail.id).unwrap().rank, tail.rank);
        assert!(children.windows(2).all(|w| w[0].rank < w[1].rank));
    }

    #[test]
    fn test_move_reorders_and_reparents() {
        let f = Fixture::new();
        let a = f.add(None, Position::End, "a");
        let b = f.add(None, Position::End, "b");
        let c = f.add(None, Position::End, "c");

        let moved = f.tree().move_block(c.id, None, Position::Start).unwrap();
        assert!(moved.rank < a.rank);
        assert_eq!(f.order(None), vec![c.id, a.id, b.id]);

        let moved = f.tree().move_block(b.id, Some(a.id), Position::End).unwrap();
        assert_eq!(moved.parent_block_id, Some(a.id));
        assert_eq!(f.order(None), vec![c.id, a.id]);
        assert_eq!(f.order(Some(a.id)), vec![b.id]);
        assert_eq!(f.tree().get(b.id).unwrap(), moved);
    }

    #[test]
    fn test_move_to_current_position_keeps_rank() {
        let f = Fixture::new();
        let a = f.add(None, Position::End, "a");
        let b = f.add(None, Position::End, "b");
        let c = f.add(None, Position::End, "c");

        for position in [Position::After(a.id), Position::Before(c.id), Position::After(b.id)] {
            let moved = f.tree().move_block(b.id, None, position).unwrap();
            assert_eq!(moved.rank, b.rank);
        }
        assert_eq!(f.tree().move_block(a.id, None, Position::Start).unwrap().rank, a.rank);
        assert_eq!(f.tree().move_block(c.id, None, Position::End).unwrap().rank, c.rank);
    }

    #[test]
    fn test_move_under_self_or_descendant() {
        let f = Fixture::new();
        let p = f.add(None, Position::End, "p");
        let child = f.add(Some(p.id), Position::End, "child");
        let grandchild = f.add(Some(child.id), Position::End, "grandchild");

        for target in [p.id, child.id, grandchild.id] {
            let err = f.tree().move_block(p.id, Some(target), Position::End).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidMove, "target {target}");
        }
        assert_eq!(f.tree().get(p.id).unwrap().parent_block_id, None);
    }

    #[test]
    fn test_list_children_rejects_unknown_parent() {
        let f = Fixture::new();
        let ws: String = f
            .conn
            .query_row("SELECT id FROM workspaces", [], |r| r.get(0))
            .unwrap();
        let other_doc = add_document(&f.conn, ws.parse().unwrap());
        let foreign = f
            .tree()
            .insert(other_doc, None, Position::End, &BlockPayload::text(BlockType::Paragraph, "x"), None)
            .unwrap();
        let p = f.add(None, Position::End, "p");
        let leaf = f.add(Some(p.id), Position::End, "leaf");

        assert!(f.tree().list_children(f.doc, Some(leaf.id)).unwrap().is_empty());

        let missing = BlockId::new();
        for parent in [missing, foreign.id] {
            let err = f.tree().list_children(f.doc, Some(parent)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound, "parent {parent}");
            let err = f.tree().rebalance_children(f.doc, Some(parent)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound, "parent {parent}");
        }

        f.tree().delete(p.id).unwrap();
        let err = f.tree().list_children(f.doc, Some(p.id)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = f.tree().list_children(DocumentId::new(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_move_anchored_on_self_elsewhere() {
        let f = Fixture::new();
        let p = f.add(None, Position::End, "p");
        let b = f.add(None, Position::End, "b");
        let err = f.tree().move_block(b.id, Some(p.id), Position::After(b.id)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMove);
    }

    #[test]
    fn test_delete_counts_subtree() {
        let f = Fixture::new();
        let p = f.add(None, Position::End, "p");
        let c1 = f.add(Some(p.id), Position::End, "c1");
        f.add(Some(p.id), Position::End, "c2");
        f.add(Some(c1.id), Position::End, "gc");
        let keep = f.add(None, Position::End, "keep");

        assert_eq!(f.tree().delete(p.id).unwrap(), 4);
        assert_eq!(f.tree().count_in_document(f.doc).unwrap(), 1);
        assert_eq!(f.order(None), vec![keep.id]);
        assert_eq!(f.tree().get(c1.id).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(f.tree().delete(p.id).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_subtree_preorder() {
        let f = Fixture::new();
        let p = f.add(None, Position::End, "p");
        let c2 = f.add(Some(p.id), Position::End, "c2");
        let c1 = f.add(Some(p.id), Position::Start, "c1");
        let gc = f.add(Some(c1.id), Position::End, "gc");
        let ids: Vec<BlockId> = f.tree().subtree(p.id).unwrap().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![p.id, c1.id, gc.id, c2.id]);
    }

    #[test]
    fn test_update_payload_leaves_placement() {
        let f = Fixture::new();
        let a = f.add(None, Position::End, "a");
        let patch = BlockPatch {
            block_type: Some(BlockType::Heading),
            content: Some(json!({"text": "Title", "level": 1})),
            ..BlockPatch::default()
        };
        let updated = f.tree().update_payload(a.id, &patch).unwrap();
        assert_eq!(updated.block_type, BlockType::Heading);
        assert_eq!(updated.rank, a.rank);
        assert_eq!(updated.parent_block_id, None);
        assert_eq!(f.tree().get(a.id).unwrap().content["level"], 1);
    }

    #[test]
    fn test_rebalance_keeps_order() {
        let f = Fixture::new();
        let a = f.add(None, Position::End, "a");
        for i in 0..10 {
            f.add(None, Position::After(a.id), &i.to_string());
        }
        let before = f.order(None);
        assert_eq!(f.tree().rebalance_children(f.doc, None).unwrap(), 11);
        assert_eq!(f.order(None), before);
        let ranks: Vec<String> = f
            .tree()
            .list_children(f.doc, None)
            .unwrap()
            .into_iter()
            .map(|b| b.rank)
            .collect();
        assert!(ranks.iter().all(|r| r.len() == 1));
    }

    #[test]
    fn test_exhaustion_triggers_rebalance() {
        let f = Fixture::with_rank(RankGenerator::new(stepnote_tree::MIN_MAX_LEN));
        let a = f.add(None, Position::End, "a");
        let b = f.add(None, Position::End, "b");
        let mut expected = vec![a.id];
        // Always squeeze right after `a`; keys grow until the ceiling forces a rebalance.
        for i in 0..200 {
            let block = f.add(None, Position::After(a.id), &i.to_string());
            expected.insert(1, block.id);
        }
        expected.push(b.id);
        assert_eq!(f.order(None), expected);
        let children = f.tree().list_children(f.doc, None).unwrap();
        assert!(children.iter().all(|c| c.rank.len() <= stepnote_tree::MIN_MAX_LEN));
    }
}
