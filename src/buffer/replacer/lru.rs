//! LRU (Least-Recently-Used) page replacement policy.
//!
//! Evicts the evictable frame that has gone the longest without being
//! accessed. Unlike [`FifoReplacer`](super::FifoReplacer), re-accessing a
//! frame moves it to the back of the order, so a hot frame that keeps
//! getting touched is never the next victim.

use std::collections::{HashSet, VecDeque};

use crate::common::FrameId;

/// LRU replacement policy.
///
/// Maintains frames in access order (front = least-recently-used). Every
/// `record_access` call moves the frame to the back, whether it's already
/// tracked or new.
pub struct LruReplacer {
    /// Frame IDs in access order (front = least recently used).
    order: VecDeque<FrameId>,

    /// Set of frame IDs currently tracked (for O(1) membership check).
    tracked: HashSet<FrameId>,

    /// Set of frame IDs that are evictable (pin_count == 0).
    evictable: HashSet<FrameId>,
}

impl LruReplacer {
    /// Create a new LRU replacer.
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
            tracked: HashSet::new(),
            evictable: HashSet::new(),
        }
    }

    /// Record that a frame was accessed, moving it to the most-recently-used
    /// end of the order regardless of whether it was already tracked.
    pub fn record_access(&mut self, frame_id: FrameId) {
        if self.tracked.contains(&frame_id) {
            self.order.retain(|&fid| fid != frame_id);
        } else {
            self.tracked.insert(frame_id);
        }
        self.order.push_back(frame_id);
    }

    /// Set whether a frame is evictable.
    ///
    /// A frame is evictable when its pin_count reaches 0.
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if evictable {
            self.evictable.insert(frame_id);
        } else {
            self.evictable.remove(&frame_id);
        }
    }

    /// Evict the least-recently-used evictable frame.
    ///
    /// Returns the frame ID of the evicted frame, or None if no frames are
    /// evictable.
    pub fn evict(&mut self) -> Option<FrameId> {
        let position = self
            .order
            .iter()
            .position(|&fid| self.evictable.contains(&fid))?;

        let frame_id = self.order.remove(position)?;
        self.tracked.remove(&frame_id);
        self.evictable.remove(&frame_id);

        Some(frame_id)
    }

    /// Remove a frame from the replacer entirely.
    ///
    /// Called when a page is deleted from the buffer pool.
    pub fn remove(&mut self, frame_id: FrameId) {
        self.evictable.remove(&frame_id);

        if self.tracked.remove(&frame_id) {
            self.order.retain(|&fid| fid != frame_id);
        }
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.evictable.len()
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}
