//! RAII guards for page access.
//!
//! Guards own a pin on a buffer pool frame and release it automatically:
//! - [`BasicPageGuard`] - pin only, upgradeable to a latched guard
//! - [`PageReadGuard`] - pin + shared latch
//! - [`PageWriteGuard`] - pin + exclusive latch (unpins dirty)
//!
//! All three are move-only and idempotently releasable via `drop_guard`.
//! Release order matters and the guards encapsulate it: the latch is
//! dropped first, then the pin.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId};
use crate::storage::page::Page;

use super::buffer_pool_manager::BufferPoolManager;

/// A pinned page without a latch.
///
/// Useful when the caller only needs to keep a page resident, or wants
/// to decide later whether to read or write it. `upgrade_read` /
/// `upgrade_write` acquire the corresponding latch without re-pinning.
pub struct BasicPageGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    is_dirty: bool,
    active: bool,
}

impl<'a> BasicPageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, frame_id: FrameId, page_id: PageId) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
            is_dirty: false,
            active: true,
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Record that the caller modified (or will modify) the page, so the
    /// unpin latches the frame's dirty flag on.
    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    /// Acquire the frame's read latch, consuming this guard. The pin is
    /// transferred, not re-taken.
    pub fn upgrade_read(mut self) -> PageReadGuard<'a> {
        assert!(self.active, "cannot upgrade a released guard");
        self.active = false;

        let lock = self.bpm.frame(self.frame_id).page();
        PageReadGuard {
            bpm: self.bpm,
            frame_id: self.frame_id,
            page_id: self.page_id,
            is_dirty: self.is_dirty,
            lock: Some(lock),
        }
    }

    /// Acquire the frame's write latch, consuming this guard. The pin is
    /// transferred, not re-taken.
    pub fn upgrade_write(mut self) -> PageWriteGuard<'a> {
        assert!(self.active, "cannot upgrade a released guard");
        self.active = false;

        let lock = self.bpm.frame(self.frame_id).page_mut();
        PageWriteGuard {
            bpm: self.bpm,
            frame_id: self.frame_id,
            page_id: self.page_id,
            lock: Some(lock),
        }
    }

    /// Release the pin now. Safe to call more than once.
    pub fn drop_guard(&mut self) {
        if self.active {
            self.active = false;
            self.bpm.unpin_frame(self.frame_id, self.is_dirty);
        }
    }
}

impl Drop for BasicPageGuard<'_> {
    fn drop(&mut self) {
        self.drop_guard();
    }
}

/// Shared read access to a pinned page.
///
/// Multiple read guards may exist for the same page. Dropping the guard
/// releases the latch, then the pin.
pub struct PageReadGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    /// Carried over from an upgraded basic guard that was marked dirty.
    is_dirty: bool,
    lock: Option<RwLockReadGuard<'a, Page>>,
}

impl<'a> PageReadGuard<'a> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockReadGuard<'a, Page>,
    ) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
            is_dirty: false,
            lock: Some(lock),
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Release the latch and the pin now. Safe to call more than once.
    /// The page contents must not be accessed afterwards.
    pub fn drop_guard(&mut self) {
        if let Some(lock) = self.lock.take() {
            drop(lock);
            self.bpm.unpin_frame(self.frame_id, self.is_dirty);
        }
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        self.lock.as_deref().expect("page guard used after release")
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        self.drop_guard();
    }
}

/// Exclusive write access to a pinned page.
///
/// At most one write guard exists per page. The unpin always marks the
/// frame dirty; handing out mutable page bytes and then deciding nothing
/// changed is not worth tracking.
pub struct PageWriteGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    lock: Option<RwLockWriteGuard<'a, Page>>,
}

impl<'a> PageWriteGuard<'a> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockWriteGuard<'a, Page>,
    ) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
            lock: Some(lock),
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Release the latch and the pin now. Safe to call more than once.
    /// The page contents must not be accessed afterwards.
    pub fn drop_guard(&mut self) {
        if let Some(lock) = self.lock.take() {
            drop(lock);
            self.bpm.unpin_frame(self.frame_id, true);
        }
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        self.lock.as_deref().expect("page guard used after release")
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        self.lock
            .as_deref_mut()
            .expect("page guard used after release")
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.drop_guard();
    }
}
