//! Buffer Pool Manager - the core page caching layer.
//!
//! The [`BufferPoolManager`] sits between disk and everything above it:
//! - caches pages in a fixed pool of frames
//! - enforces pin-based reference counting
//! - writes dirty pages back before their frames are reused
//! - drives the LRU-K replacer

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::buffer::page_guard::{BasicPageGuard, PageReadGuard, PageWriteGuard};
use crate::buffer::replacer::LruKReplacer;
use crate::buffer::{Frame, PoolStats};
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::DiskManager;

/// Bookkeeping that must change atomically: the page table, the free
/// list, and the replacer. One mutex over all three keeps the frame
/// lifecycle invariant simple - a frame is always in exactly one of
/// {free list, page table, evicted-and-being-reused}.
struct PoolState {
    /// Maps resident pages to their frames.
    page_table: HashMap<PageId, FrameId>,

    /// Frames not currently holding a page (LIFO for cache locality).
    free_list: Vec<FrameId>,

    /// Eviction policy over the tracked frames.
    replacer: LruKReplacer,
}

/// Caches disk pages in a fixed pool of frames.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────┐
/// │                    BufferPoolManager                     │
/// │  ┌──────────────────────────┐  ┌──────────────────────┐  │
/// │  │ state: Mutex<PoolState>  │  │  frames: Vec<Frame>  │  │
/// │  │  page_table  PageId→Fid ─┼─▶│ [F0] [F1] [F2] ...   │  │
/// │  │  free_list   Vec<FrameId>│  │  (per-frame RwLock)  │  │
/// │  │  replacer    LruK        │  └──────────────────────┘  │
/// │  └──────────────────────────┘  ┌──────────────────────┐  │
/// │  next_page_id: AtomicU32       │ disk: Mutex<DiskMgr> │  │
/// │  stats: PoolStats              └──────────────────────┘  │
/// └──────────────────────────────────────────────────────────┘
/// ```
///
/// # Locking
/// - `state`: held for every metadata transition; admission and eviction
///   perform their disk I/O under it, which keeps those operations
///   linearizable at the cost of serializing misses.
/// - per-frame latches: acquired by guards *after* the pin is taken and
///   released *before* the unpin.
/// - `disk`: leaf lock, only ever taken while no latch acquisition can
///   be waiting on the holder. Explicit flushes pin their target and do
///   the I/O outside `state` so a latch holder's unpin can always
///   proceed.
///
/// # Usage
/// ```ignore
/// let dm = DiskManager::create("chalk.db")?;
/// let bpm = BufferPoolManager::new(16, dm, 2);
///
/// let mut guard = bpm.new_page()?;
/// guard.as_mut_slice()[0] = 0xAB;
/// drop(guard); // unpinned, marked dirty
///
/// let guard = bpm.fetch_page_read(PageId::new(0))?;
/// assert_eq!(guard.as_slice()[0], 0xAB);
/// ```
pub struct BufferPoolManager {
    /// Fixed pool of frames allocated at startup.
    frames: Vec<Frame>,

    /// Page table + free list + replacer.
    state: Mutex<PoolState>,

    /// Handles all disk I/O.
    disk_manager: Mutex<DiskManager>,

    /// Monotonic page id allocator. Ids are never reused.
    next_page_id: AtomicU32,

    /// Performance counters.
    stats: PoolStats,

    /// Number of frames (immutable after construction).
    pool_size: usize,
}

impl BufferPoolManager {
    /// Create a buffer pool of `pool_size` frames over `disk_manager`,
    /// with an LRU-K replacer retaining `replacer_k` accesses of history.
    ///
    /// Page id allocation resumes from the number of pages already in
    /// the file, so reopening a database continues where it left off.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize, disk_manager: DiskManager, replacer_k: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let frames: Vec<Frame> = (0..pool_size).map(|_| Frame::new()).collect();
        let free_list: Vec<FrameId> = (0..pool_size).rev().map(FrameId::new).collect();
        let next_page_id = AtomicU32::new(disk_manager.page_count());

        Self {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                replacer: LruKReplacer::new(pool_size, replacer_k),
            }),
            disk_manager: Mutex::new(disk_manager),
            next_page_id,
            stats: PoolStats::new(),
            pool_size,
        }
    }

    // ========================================================================
    // Page allocation
    // ========================================================================

    /// Hand out the next page id. Ids are monotonic and never reused;
    /// the page gets disk blocks on its first flush.
    pub fn allocate_page_id(&self) -> PageId {
        PageId::new(self.next_page_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate a fresh page and install it in the pool, returning a
    /// write guard over its (zeroed) contents.
    ///
    /// # Errors
    /// `Error::PoolExhausted` if every frame is pinned.
    pub fn new_page(&self) -> Result<PageWriteGuard<'_>> {
        let mut state = self.state.lock();

        let frame_id = self.acquire_frame(&mut state)?;
        let page_id = self.allocate_page_id();

        // acquire_frame hands back an empty, zeroed frame.
        let frame = &self.frames[frame_id.0];
        frame.set_page_id(Some(page_id));
        frame.pin();

        state.page_table.insert(page_id, frame_id);
        self.record_and_pin(&mut state, frame_id);
        drop(state);

        let lock = frame.page_mut();
        Ok(PageWriteGuard::new(self, frame_id, page_id, lock))
    }

    // ========================================================================
    // Fetching
    // ========================================================================

    /// Fetch a page and pin it without latching.
    ///
    /// # Errors
    /// `Error::PoolExhausted` if the page is not resident and every
    /// frame is pinned; `Error::Io` on disk failure.
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<BasicPageGuard<'_>> {
        let frame_id = self.fetch_frame(page_id)?;
        Ok(BasicPageGuard::new(self, frame_id, page_id))
    }

    /// Fetch a page for reading (shared latch).
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame_id = self.fetch_frame(page_id)?;
        let lock = self.frames[frame_id.0].page();
        Ok(PageReadGuard::new(self, frame_id, page_id, lock))
    }

    /// Fetch a page for writing (exclusive latch).
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.fetch_frame(page_id)?;
        let lock = self.frames[frame_id.0].page_mut();
        Ok(PageWriteGuard::new(self, frame_id, page_id, lock))
    }

    /// Like [`fetch_page_read`](Self::fetch_page_read), but reports an
    /// exhausted pool as `None` instead of an error.
    ///
    /// # Panics
    /// Panics on disk failure, which this layer treats as fatal.
    pub fn checked_read_page(&self, page_id: PageId) -> Option<PageReadGuard<'_>> {
        match self.fetch_page_read(page_id) {
            Ok(guard) => Some(guard),
            Err(Error::PoolExhausted) => None,
            Err(e) => panic!("disk I/O failure: {}", e),
        }
    }

    /// Like [`fetch_page_write`](Self::fetch_page_write), but reports an
    /// exhausted pool as `None` instead of an error.
    ///
    /// # Panics
    /// Panics on disk failure, which this layer treats as fatal.
    pub fn checked_write_page(&self, page_id: PageId) -> Option<PageWriteGuard<'_>> {
        match self.fetch_page_write(page_id) {
            Ok(guard) => Some(guard),
            Err(Error::PoolExhausted) => None,
            Err(e) => panic!("disk I/O failure: {}", e),
        }
    }

    // ========================================================================
    // Unpinning
    // ========================================================================

    /// Release one pin on `page_id`.
    ///
    /// Returns `false` if the page is not resident or its pin count is
    /// already 0. `is_dirty = true` latches the dirty flag on; passing
    /// `false` never clears it.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };

        let frame = &self.frames[frame_id.0];
        if frame.pin_count() == 0 {
            return false;
        }

        if is_dirty {
            frame.mark_dirty();
        }
        if frame.unpin() == 0 {
            state
                .replacer
                .set_evictable(frame_id, true)
                .expect("resident frame is tracked");
        }

        true
    }

    /// Guard-side unpin by frame id. Guards release their latch before
    /// calling this.
    pub(crate) fn unpin_frame(&self, frame_id: FrameId, is_dirty: bool) {
        let mut state = self.state.lock();

        let frame = &self.frames[frame_id.0];
        if is_dirty {
            frame.mark_dirty();
        }
        if frame.unpin() == 0 {
            state
                .replacer
                .set_evictable(frame_id, true)
                .expect("pinned frame is tracked");
        }
    }

    // ========================================================================
    // Flushing
    // ========================================================================

    /// Write `page_id`'s frame to disk and clear its dirty flag.
    ///
    /// The write is unconditional; flushing a clean page is a (correct)
    /// no-op on the data. Pin count and evictability are unaffected.
    /// Returns `Ok(false)` if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        // Pin the page so it cannot be evicted or remapped while we do
        // I/O outside the state mutex.
        let frame_id = {
            let mut state = self.state.lock();
            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return Ok(false);
            };
            if self.frames[frame_id.0].pin() == 1 {
                state
                    .replacer
                    .set_evictable(frame_id, false)
                    .expect("resident frame is tracked");
            }
            frame_id
        };

        let frame = &self.frames[frame_id.0];
        let result = {
            let page = frame.page();
            self.disk_manager.lock().write_page(page_id, &page)
        };

        if result.is_ok() {
            frame.clear_dirty();
            self.stats.disk_writes.fetch_add(1, Ordering::Relaxed);
        }

        self.unpin_frame(frame_id, false);
        result.map(|()| true)
    }

    /// Flush every resident page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let page_ids: Vec<PageId> = {
            let state = self.state.lock();
            state.page_table.keys().copied().collect()
        };

        for page_id in page_ids {
            self.flush_page(page_id)?;
        }

        Ok(())
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Remove `page_id` from the pool and return its frame to the free
    /// list.
    ///
    /// Returns `true` if the page was not resident (nothing to do) or
    /// was successfully removed; `false` if it is pinned. The page id is
    /// not reused; deallocation is a no-op in this layer.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return true;
        };

        let frame = &self.frames[frame_id.0];
        if frame.is_pinned() {
            return false;
        }

        state.page_table.remove(&page_id);
        state
            .replacer
            .remove(frame_id)
            .expect("frame id within pool");
        frame.reset();
        state.free_list.push(frame_id);

        true
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Pin count of `page_id`, or `None` if it is not resident.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(self.frames[frame_id.0].pin_count())
    }

    /// Whether `page_id` is currently resident.
    pub fn contains_page(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of frames on the free list.
    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Number of resident pages.
    pub fn page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Performance counters.
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    pub(crate) fn frame(&self, frame_id: FrameId) -> &Frame {
        &self.frames[frame_id.0]
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Make `page_id` resident and pinned, returning its frame.
    fn fetch_frame(&self, page_id: PageId) -> Result<FrameId> {
        let mut state = self.state.lock();

        // Fast path: already resident.
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.frames[frame_id.0].pin();
            self.record_and_pin(&mut state, frame_id);
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(frame_id);
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.0];

        match self.disk_manager.lock().read_page(page_id) {
            Ok(page) => *frame.page_mut() = page,
            Err(e) => {
                // Hand the frame back rather than leaking it.
                state.free_list.push(frame_id);
                return Err(e);
            }
        }
        self.stats.disk_reads.fetch_add(1, Ordering::Relaxed);

        frame.set_page_id(Some(page_id));
        frame.pin();
        state.page_table.insert(page_id, frame_id);
        self.record_and_pin(&mut state, frame_id);

        Ok(frame_id)
    }

    /// Get an empty, zeroed, unpinned frame: free list first, then
    /// eviction.
    ///
    /// The ordering contract for eviction: the victim's dirty contents
    /// are flushed before its mapping is removed, and the mapping is
    /// removed before the caller loads anything new into the frame.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            return Ok(frame_id);
        }

        let frame_id = state.replacer.evict().ok_or(Error::PoolExhausted)?;
        let frame = &self.frames[frame_id.0];
        let old_page_id = frame.page_id().expect("victim frame holds a page");

        if frame.is_dirty() {
            // The victim has pin count 0, so its latch is uncontended.
            let write_result = {
                let page = frame.page();
                self.disk_manager.lock().write_page(old_page_id, &page)
            };
            if let Err(e) = write_result {
                // Put the victim back under the policy so the pool stays
                // consistent; its access history is lost.
                state
                    .replacer
                    .record_access(frame_id)
                    .expect("frame id within pool");
                state
                    .replacer
                    .set_evictable(frame_id, true)
                    .expect("frame was just re-tracked");
                return Err(e);
            }
            self.stats.disk_writes.fetch_add(1, Ordering::Relaxed);
        }

        state.page_table.remove(&old_page_id);
        frame.reset();
        self.stats.evictions.fetch_add(1, Ordering::Relaxed);

        Ok(frame_id)
    }

    /// Record an access for `frame_id` and mark it non-evictable.
    fn record_and_pin(&self, state: &mut PoolState, frame_id: FrameId) {
        state
            .replacer
            .record_access(frame_id)
            .expect("frame id within pool");
        state
            .replacer
            .set_evictable(frame_id, false)
            .expect("frame was just recorded");
    }
}
