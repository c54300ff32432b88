//! B-tree secondary index over collection documents (spec §4.7).
//!
//! A disk-resident B+tree: interior nodes route by separator key, leaves
//! hold `(key, locator)` pairs in sorted order and chain to their right
//! sibling for ordered range scans. The tree has no parent pointers;
//! insert and delete instead carry an explicit path stack from the root
//! down to the target leaf, consulted on the way back up if a node needs
//! to split.
//!
//! Deletion removes the entry from its leaf but does not rebalance or
//! merge underfull siblings - a documented simplification (see
//! `DESIGN.md`). A leaf may shrink to zero entries and stay allocated
//! until the whole index is dropped; lookups and scans are unaffected,
//! only disk-space reclamation is deferred.

mod cursor;
mod node;

pub use cursor::BTreeCursor;
pub use node::{make_key, BTreeNode};

use std::sync::Arc;

use crate::codec::Document;
use crate::common::{Error, PageId, Result};
use crate::storage::page::PageType;
use crate::storage::PageManager;

/// Static description of one secondary index (spec §4.7, §4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub collection: String,
    /// Document field names making up the (possibly composite) key, in
    /// order.
    pub fields: Vec<String>,
    pub unique: bool,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>, collection: impl Into<String>, fields: Vec<String>, unique: bool) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            fields,
            unique,
        }
    }
}

/// A disk-resident B+tree index. Holds the current root page id; callers
/// (the catalog) persist this across the definition it backs since it
/// changes whenever the root splits.
pub struct BTreeIndex {
    page_manager: Arc<PageManager>,
    root: PageId,
    unique: bool,
}

/// Result of descending from the root: the leaf that should hold `key`,
/// and the `(page_id, chosen_child_index)` at every internal level above
/// it, innermost first when popped.
struct Descent {
    leaf: PageId,
    path: Vec<(PageId, usize)>,
}

impl BTreeIndex {
    /// Create a brand-new, empty index with a single empty leaf as its
    /// root.
    pub fn create(page_manager: Arc<PageManager>, unique: bool, now_ticks: u64) -> Result<Self> {
        let mut guard = page_manager.new_page(PageType::Index, now_ticks)?;
        let root = guard.page_id();
        BTreeNode::new_leaf().write_to(guard.payload_mut())?;
        guard.update_checksum();
        drop(guard);
        Ok(Self { page_manager, root, unique })
    }

    /// Re-open an index whose root page id was previously persisted by
    /// the catalog.
    pub fn open(page_manager: Arc<PageManager>, root: PageId, unique: bool) -> Self {
        Self { page_manager, root, unique }
    }

    pub fn root_page_id(&self) -> PageId {
        self.root
    }

    fn read_node(&self, page_id: PageId) -> Result<BTreeNode> {
        let guard = self.page_manager.buffer_pool().fetch_page_read(page_id)?;
        BTreeNode::read_from(guard.payload())
    }

    fn write_node(&self, page_id: PageId, node: &BTreeNode) -> Result<()> {
        let mut guard = self.page_manager.buffer_pool().fetch_page_write(page_id)?;
        node.write_to(guard.payload_mut())?;
        guard.update_checksum();
        Ok(())
    }

    /// Descend from the root to the leaf that should contain `key`,
    /// recording `(page_id, chosen_child_index)` at every internal level
    /// so a split can be propagated back up without parent pointers.
    fn descend(&self, key: &Document) -> Result<Descent> {
        let mut current = self.root;
        let mut path = Vec::new();
        loop {
            let node = self.read_node(current)?;
            match node {
                BTreeNode::Leaf { .. } => return Ok(Descent { leaf: current, path }),
                BTreeNode::Internal { keys, children } => {
                    let idx = keys.partition_point(|k| k <= key);
                    path.push((current, idx));
                    current = children[idx];
                }
            }
        }
    }

    /// Insert `(key, locator)`. Enforces uniqueness if this index is
    /// unique. Splits nodes bottom-up as needed, possibly growing the
    /// tree's height.
    pub fn insert(&mut self, key: Document, locator: PageId, now_ticks: u64) -> Result<()> {
        let Descent { leaf, path } = self.descend(&key)?;
        let BTreeNode::Leaf { mut entries } = self.read_node(leaf)? else {
            return Err(Error::corrupt("descend landed on a non-leaf page"));
        };

        let pos = entries.partition_point(|(k, _)| k < &key);
        if self.unique {
            if let Some((existing_key, existing_locator)) = entries.get(pos) {
                if existing_key == &key && *existing_locator != locator {
                    return Err(Error::DuplicateKey {
                        index: format!("page {}", self.root.0),
                        key: format!("{key:?}"),
                    });
                }
            }
        }
        entries.insert(pos, (key, locator));

        let leaf_node = BTreeNode::Leaf { entries };
        let capacity = self.page_payload_capacity(leaf)?;

        if leaf_node.encoded_size() <= capacity {
            self.write_node(leaf, &leaf_node)?;
            return Ok(());
        }

        // Split the overflowing leaf and propagate the new separator
        // upward, allocating new internal nodes (and possibly a new root)
        // as needed.
        let BTreeNode::Leaf { entries } = leaf_node else { unreachable!() };
        let mid = entries.len() / 2;
        let right_entries = entries[mid..].to_vec();
        let left_entries = entries[..mid].to_vec();
        let separator = right_entries[0].0.clone();

        let old_next = self.leaf_next(leaf)?;

        let mut right_guard = self.page_manager.new_page(PageType::Index, now_ticks)?;
        let right_id = right_guard.page_id();
        BTreeNode::Leaf { entries: right_entries }.write_to(right_guard.payload_mut())?;
        let mut right_header = right_guard.header();
        right_header.next_page_id = old_next;
        right_header.prev_page_id = leaf;
        right_guard.set_header(&right_header);
        right_guard.update_checksum();
        drop(right_guard);

        if old_next.is_valid() {
            let mut old_next_guard = self.page_manager.buffer_pool().fetch_page_write(old_next)?;
            let mut h = old_next_guard.header();
            h.prev_page_id = right_id;
            old_next_guard.set_header(&h);
            old_next_guard.update_checksum();
        }

        {
            let mut left_guard = self.page_manager.buffer_pool().fetch_page_write(leaf)?;
            BTreeNode::Leaf { entries: left_entries }.write_to(left_guard.payload_mut())?;
            let mut h = left_guard.header();
            h.next_page_id = right_id;
            left_guard.set_header(&h);
            left_guard.update_checksum();
        }

        self.propagate_split(path, separator, right_id, now_ticks)
    }

    fn leaf_next(&self, leaf: PageId) -> Result<PageId> {
        let guard = self.page_manager.buffer_pool().fetch_page_read(leaf)?;
        Ok(guard.header().next_page_id)
    }

    fn page_payload_capacity(&self, page_id: PageId) -> Result<usize> {
        let guard = self.page_manager.buffer_pool().fetch_page_read(page_id)?;
        Ok(guard.payload_capacity())
    }

    /// Walk the recorded descent path bottom-up, inserting `separator`
    /// (routing to `new_right_child`) into each parent, splitting that
    /// parent in turn if it overflows. When the path is exhausted, the
    /// split reached the root and a fresh root is created.
    fn propagate_split(
        &mut self,
        mut path: Vec<(PageId, usize)>,
        mut separator: Document,
        mut new_right_child: PageId,
        now_ticks: u64,
    ) -> Result<()> {
        loop {
            let Some((parent_id, child_idx)) = path.pop() else {
                let mut root_guard = self.page_manager.new_page(PageType::Index, now_ticks)?;
                let new_root_id = root_guard.page_id();
                BTreeNode::Internal {
                    keys: vec![separator],
                    children: vec![self.root, new_right_child],
                }
                .write_to(root_guard.payload_mut())?;
                root_guard.update_checksum();
                drop(root_guard);
                self.root = new_root_id;
                return Ok(());
            };

            let BTreeNode::Internal { mut keys, mut children } = self.read_node(parent_id)? else {
                return Err(Error::corrupt("expected internal node on descent path"));
            };
            keys.insert(child_idx, separator);
            children.insert(child_idx + 1, new_right_child);

            let node = BTreeNode::Internal { keys, children };
            let capacity = self.page_payload_capacity(parent_id)?;
            if node.encoded_size() <= capacity {
                self.write_node(parent_id, &node)?;
                return Ok(());
            }

            let BTreeNode::Internal { keys, children } = node else { unreachable!() };
            let mid = keys.len() / 2;
            let up_separator = keys[mid].clone();
            let left_keys = keys[..mid].to_vec();
            let right_keys = keys[mid + 1..].to_vec();
            let left_children = children[..=mid].to_vec();
            let right_children = children[mid + 1..].to_vec();

            self.write_node(parent_id, &BTreeNode::Internal { keys: left_keys, children: left_children })?;

            let mut right_guard = self.page_manager.new_page(PageType::Index, now_ticks)?;
            let right_id = right_guard.page_id();
            BTreeNode::Internal { keys: right_keys, children: right_children }.write_to(right_guard.payload_mut())?;
            right_guard.update_checksum();
            drop(right_guard);

            separator = up_separator;
            new_right_child = right_id;
            // continue loop to insert `separator` into the grandparent
        }
    }

    /// Exact-match lookup.
    pub fn find_exact(&self, key: &Document) -> Result<Option<PageId>> {
        let Descent { leaf, .. } = self.descend(key)?;
        let BTreeNode::Leaf { entries } = self.read_node(leaf)? else {
            return Err(Error::corrupt("descend landed on a non-leaf page"));
        };
        Ok(entries.iter().find(|(k, _)| k == key).map(|(_, loc)| *loc))
    }

    /// Remove the `(key, locator)` pair. Leaves no trace if the pair is
    /// absent. Does not merge the leaf with a sibling even if it becomes
    /// empty (see module docs).
    pub fn delete(&mut self, key: &Document, locator: PageId) -> Result<()> {
        let Descent { leaf, .. } = self.descend(key)?;
        let BTreeNode::Leaf { mut entries } = self.read_node(leaf)? else {
            return Err(Error::corrupt("descend landed on a non-leaf page"));
        };
        entries.retain(|(k, loc)| !(k == key && *loc == locator));
        self.write_node(leaf, &BTreeNode::Leaf { entries })
    }

    /// Replace a key's locator in place (used when an update changes a
    /// document's location, e.g. it grows out of its page - spec §4.8).
    pub fn update_locator(&mut self, key: &Document, old_locator: PageId, new_locator: PageId) -> Result<()> {
        let Descent { leaf, .. } = self.descend(key)?;
        let BTreeNode::Leaf { mut entries } = self.read_node(leaf)? else {
            return Err(Error::corrupt("descend landed on a non-leaf page"));
        };
        for (k, loc) in entries.iter_mut() {
            if k == key && *loc == old_locator {
                *loc = new_locator;
            }
        }
        self.write_node(leaf, &BTreeNode::Leaf { entries })
    }

    /// Open a cursor positioned at the first leaf entry `>= key`. Pass
    /// `Document::new()` (the empty key, which sorts before everything)
    /// to scan the whole index.
    pub fn scan_from(&self, key: &Document) -> Result<BTreeCursor<'_>> {
        let Descent { leaf, .. } = self.descend(key)?;
        BTreeCursor::new(self, leaf, key.clone())
    }

    pub(crate) fn page_manager(&self) -> &PageManager {
        &self.page_manager
    }
}
