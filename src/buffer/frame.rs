//! Frame - a slot in the buffer pool.
//!
//! A [`Frame`] holds one page's bytes plus the metadata the buffer pool
//! needs: which page is loaded, how many callers hold it pinned, and
//! whether it was modified since loading.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;
use crate::storage::page::Page;

/// A buffer pool slot.
///
/// # Thread Safety
/// All fields use interior mutability:
/// - `page`: `RwLock` - the per-frame read/write latch guarding the bytes
/// - `page_id`: `Mutex` - which page is loaded, if any
/// - `pin_count` / `is_dirty`: atomics
///
/// Metadata transitions (pin, unpin, load, clear) are performed while the
/// buffer pool holds its state mutex, which keeps them consistent with
/// the page table and the replacer. The atomics let inspection helpers
/// read without taking that mutex.
pub struct Frame {
    /// The page bytes, behind the frame's latch.
    page: RwLock<Page>,

    /// The page currently loaded, or `None` for a free frame.
    page_id: Mutex<Option<PageId>>,

    /// Number of active references. A pinned frame is never evicted.
    pin_count: AtomicU32,

    /// Set when the page is modified; cleared by a flush.
    is_dirty: AtomicBool,
}

impl Frame {
    /// Create a new empty frame.
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::new()),
            page_id: Mutex::new(None),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    /// Acquire the frame's read latch.
    #[inline]
    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    /// Acquire the frame's write latch.
    #[inline]
    pub fn page_mut(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write()
    }

    /// The page loaded in this frame, if any.
    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        *self.page_id.lock()
    }

    #[inline]
    pub(crate) fn set_page_id(&self, page_id: Option<PageId>) {
        *self.page_id.lock() = page_id;
    }

    /// Increment the pin count; returns the new value.
    #[inline]
    pub(crate) fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrement the pin count; returns the new value.
    ///
    /// # Panics
    /// Panics if the pin count is already 0.
    #[inline]
    pub(crate) fn unpin(&self) -> u32 {
        let old = self.pin_count.fetch_sub(1, Ordering::Relaxed);
        assert!(old > 0, "pin count underflow");
        old - 1
    }

    /// Current pin count.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Relaxed)
    }

    /// Whether any caller currently holds this frame pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    #[inline]
    pub(crate) fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Relaxed);
    }

    /// Whether the page was modified since it was loaded or last flushed.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Relaxed)
    }

    /// Whether the frame currently holds a page.
    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.page_id().is_some()
    }

    /// Return the frame to the empty state: zeroed page, no page id,
    /// pin count 0, clean.
    pub(crate) fn reset(&self) {
        self.page_mut().reset();
        self.set_page_id(None);
        self.pin_count.store(0, Ordering::Relaxed);
        self.is_dirty.store(false, Ordering::Relaxed);
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}
