//! Ordered range-scan cursor over a B+tree's leaf chain (spec §4.7).

use crate::codec::Document;
use crate::common::{PageId, Result};

use super::node::BTreeNode;
use super::BTreeIndex;

/// Walks leaf entries in ascending key order starting from wherever
/// [`BTreeIndex::scan_from`] descended to, following `next_page_id`
/// sibling links once the current leaf is exhausted.
pub struct BTreeCursor<'a> {
    index: &'a BTreeIndex,
    entries: std::vec::IntoIter<(Document, PageId)>,
    next_leaf: PageId,
    start_key: Document,
    skipped_to_start: bool,
}

impl<'a> BTreeCursor<'a> {
    pub(super) fn new(index: &'a BTreeIndex, leaf: PageId, start_key: Document) -> Result<Self> {
        let BTreeNode::Leaf { entries } = index.read_node(leaf)? else {
            return Err(crate::common::Error::corrupt("cursor started on a non-leaf page"));
        };
        let guard = index.page_manager().buffer_pool().fetch_page_read(leaf)?;
        let next_leaf = guard.header().next_page_id;
        drop(guard);
        Ok(Self {
            index,
            entries: entries.into_iter(),
            next_leaf,
            start_key,
            skipped_to_start: false,
        })
    }

    /// Advance to the next entry in ascending key order, or `None` once
    /// the index is exhausted.
    pub fn next(&mut self) -> Result<Option<(Document, PageId)>> {
        loop {
            match self.entries.next() {
                Some((key, locator)) => {
                    if !self.skipped_to_start && key < self.start_key {
                        continue;
                    }
                    self.skipped_to_start = true;
                    return Ok(Some((key, locator)));
                }
                None => {
                    if !self.next_leaf.is_valid() {
                        return Ok(None);
                    }
                    let BTreeNode::Leaf { entries } = self.index.read_node(self.next_leaf)? else {
                        return Err(crate::common::Error::corrupt("leaf sibling link points to a non-leaf page"));
                    };
                    let guard = self.index.page_manager().buffer_pool().fetch_page_read(self.next_leaf)?;
                    self.next_leaf = guard.header().next_page_id;
                    drop(guard);
                    self.entries = entries.into_iter();
                    self.skipped_to_start = true;
                }
            }
        }
    }

    /// Collect every remaining entry whose key satisfies `within_range`,
    /// stopping at the first key that does not (entries are visited in
    /// ascending order, so this implements a half-open range scan without
    /// buffering the whole index).
    pub fn take_while_range(&mut self, mut within_range: impl FnMut(&Document) -> bool) -> Result<Vec<(Document, PageId)>> {
        let mut out = Vec::new();
        while let Some((key, locator)) = self.next()? {
            if !within_range(&key) {
                break;
            }
            out.push((key, locator));
        }
        Ok(out)
    }
}
