//! LRU-K replacement policy.
//!
//! LRU-K ranks frames by *backward K-distance*: the age of a frame's
//! Kth-most-recent access. Frames with fewer than K recorded accesses
//! have infinite distance and are evicted first, oldest first access
//! first; among frames with a full history, the one whose Kth-most-recent
//! access is oldest goes first. Compared to plain LRU this resists
//! scan pollution: one burst of touches doesn't make a page look hot.

use std::collections::{HashMap, VecDeque};

use crate::common::{Error, FrameId, Result};

/// Per-frame bookkeeping.
///
/// `history` holds the last up-to-K access timestamps, oldest at the
/// front. While the frame has fewer than K accesses the front is its
/// first access; once the history is full the front is exactly the
/// Kth-most-recent access. Eviction only ever needs the front.
struct LruKNode {
    history: VecDeque<u64>,
    is_evictable: bool,
}

impl LruKNode {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }
}

/// LRU-K eviction policy over a fixed pool of frames.
///
/// # Usage
/// The buffer pool drives the replacer:
/// - `record_access` on every admission and cache hit
/// - `set_evictable(.., false)` when a frame's pin count leaves 0,
///   `set_evictable(.., true)` when it returns to 0
/// - `evict` when no free frame exists
/// - `remove` when a page is deleted from the pool
///
/// # Thread Safety
/// Methods take `&mut self`; the buffer pool wraps the replacer in a
/// `Mutex`, which serializes all operations.
pub struct LruKReplacer {
    /// Metadata for every tracked frame.
    node_store: HashMap<FrameId, LruKNode>,

    /// Logical clock, bumped on every recorded access.
    current_timestamp: u64,

    /// Number of tracked frames currently evictable.
    curr_size: usize,

    /// Frame ids must fall in `[0, replacer_size)`.
    replacer_size: usize,

    /// How many historical accesses to retain per frame.
    k: usize,
}

impl LruKReplacer {
    /// Create a replacer for a pool of `num_frames` frames, retaining
    /// `k` accesses of history per frame.
    ///
    /// # Panics
    /// Panics if `k` is 0.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "k must be > 0");
        Self {
            node_store: HashMap::with_capacity(num_frames),
            current_timestamp: 0,
            curr_size: 0,
            replacer_size: num_frames,
            k,
        }
    }

    /// Record an access to `frame_id` at the current logical timestamp.
    ///
    /// Unknown frames are created with empty history and
    /// `evictable = false`. At most `k` timestamps are retained; older
    /// ones are trimmed from the front.
    ///
    /// # Errors
    /// `Error::FrameOutOfRange` if `frame_id >= pool size`.
    pub fn record_access(&mut self, frame_id: FrameId) -> Result<()> {
        self.check_frame(frame_id)?;

        self.current_timestamp += 1;

        let node = self
            .node_store
            .entry(frame_id)
            .or_insert_with(LruKNode::new);

        node.history.push_back(self.current_timestamp);
        if node.history.len() > self.k {
            node.history.pop_front();
        }

        Ok(())
    }

    /// Toggle whether `frame_id` may be chosen as an eviction victim.
    ///
    /// # Errors
    /// - `Error::FrameOutOfRange` if `frame_id >= pool size`
    /// - `Error::FrameNotTracked` if the frame has no recorded access
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) -> Result<()> {
        self.check_frame(frame_id)?;

        let node = self
            .node_store
            .get_mut(&frame_id)
            .ok_or(Error::FrameNotTracked(frame_id.0))?;

        if node.is_evictable != evictable {
            node.is_evictable = evictable;
            if evictable {
                self.curr_size += 1;
            } else {
                self.curr_size -= 1;
            }
        }

        Ok(())
    }

    /// Drop all metadata for `frame_id`.
    ///
    /// The caller must ensure the frame is not pinned. No-op for frames
    /// the replacer has never seen.
    ///
    /// # Errors
    /// `Error::FrameOutOfRange` if `frame_id >= pool size`.
    pub fn remove(&mut self, frame_id: FrameId) -> Result<()> {
        self.check_frame(frame_id)?;

        if let Some(node) = self.node_store.remove(&frame_id) {
            if node.is_evictable {
                self.curr_size -= 1;
            }
        }

        Ok(())
    }

    /// Choose, remove, and return the eviction victim, or `None` when no
    /// tracked frame is evictable.
    ///
    /// Among evictable frames the victim has the largest backward
    /// K-distance. Any frame with fewer than K accesses beats every frame
    /// with a full history; ties in both groups fall to the oldest
    /// retained timestamp (first access for the young group, Kth-most-
    /// recent access for the full group). Timestamps are unique, so the
    /// choice is deterministic.
    pub fn evict(&mut self) -> Option<FrameId> {
        let mut victim: Option<(FrameId, bool, u64)> = None;

        for (&frame_id, node) in &self.node_store {
            if !node.is_evictable {
                continue;
            }

            let full = node.history.len() >= self.k;
            let front = *node.history.front().expect("tracked frame has history");

            let better = match victim {
                None => true,
                // Young frames (infinite distance) beat full ones; within
                // a group, older front timestamp wins.
                Some((_, v_full, v_front)) => (full, front) < (v_full, v_front),
            };
            if better {
                victim = Some((frame_id, full, front));
            }
        }

        let (frame_id, _, _) = victim?;
        self.node_store.remove(&frame_id);
        self.curr_size -= 1;
        Some(frame_id)
    }

    /// Number of tracked frames currently marked evictable.
    pub fn size(&self) -> usize {
        self.curr_size
    }

    fn check_frame(&self, frame_id: FrameId) -> Result<()> {
        if frame_id.0 >= self.replacer_size {
            return Err(Error::FrameOutOfRange {
                frame_id: frame_id.0,
                pool_size: self.replacer_size,
            });
        }
        Ok(())
    }
}
