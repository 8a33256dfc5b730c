//! Disk Manager - low-level file I/O for database pages.
//!
//! The [`DiskManager`] owns the database file and performs block-level
//! reads and writes. It knows nothing about what pages contain; the
//! buffer pool decides *when* I/O happens and the index layers decide
//! what the bytes mean.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::config::PAGE_SIZE;
use crate::common::{PageId, Result};
use crate::storage::page::Page;

/// Manages disk I/O for a single database file.
///
/// # File Layout
/// The database file is a flat array of equally-sized pages; page `n`
/// lives at byte offset `n * PAGE_SIZE`.
///
/// # Allocation
/// Page ids are assigned by the buffer pool's counter, not by the disk
/// manager. The file grows on the first write of a page; reading a page
/// the file does not cover yet yields a zeroed page, since an
/// allocated-but-never-flushed page has all-zero contents by definition.
///
/// # Thread Safety
/// `DiskManager` is single-threaded; the buffer pool serializes access
/// to it behind a mutex.
///
/// # Durability
/// Every write is followed by `fsync()`. Conservative, but this layer
/// has no write-ahead log to lean on.
pub struct DiskManager {
    file: File,
    /// Number of pages the file currently covers.
    page_count: u32,
}

impl DiskManager {
    /// Create a new database file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            page_count: 0,
        })
    }

    /// Open an existing database file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let file_size = file.metadata()?.len();
        let page_count = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self { file, page_count })
    }

    /// Open an existing database file, or create one if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Read a page from disk.
    ///
    /// Pages beyond the current end of the file come back zeroed; they
    /// have been allocated but never flushed.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        let mut page = Page::new();

        if page_id.0 >= self.page_count {
            return Ok(page);
        }

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(page.as_mut_slice())?;

        Ok(page)
    }

    /// Write a page to disk, extending the file if needed.
    ///
    /// # Durability
    /// Calls `fsync()` after writing.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.as_slice())?;
        self.file.sync_all()?;

        if page_id.0 >= self.page_count {
            self.page_count = page_id.0 + 1;
        }

        Ok(())
    }

    /// Number of pages the file currently covers.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Total size of the database file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        (self.page_count as u64) * (PAGE_SIZE as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_new_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let dm = DiskManager::create(&path).unwrap();
        assert_eq!(dm.page_count(), 0);
        assert_eq!(dm.file_size(), 0);
    }

    #[test]
    fn test_create_existing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        DiskManager::create(&path).unwrap();
        assert!(DiskManager::create(&path).is_err());
    }

    #[test]
    fn test_open_nonexistent_fails() {
        let dir = tempdir().unwrap();
        assert!(DiskManager::open(dir.path().join("missing.db")).is_err());
    }

    #[test]
    fn test_write_and_read_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut dm = DiskManager::create(&path).unwrap();

        let mut page = Page::new();
        page.as_mut_slice()[0] = 0xAB;
        page.as_mut_slice()[PAGE_SIZE - 1] = 0xEF;

        dm.write_page(PageId::new(0), &page).unwrap();
        assert_eq!(dm.page_count(), 1);

        let read_back = dm.read_page(PageId::new(0)).unwrap();
        assert_eq!(read_back.as_slice()[0], 0xAB);
        assert_eq!(read_back.as_slice()[PAGE_SIZE - 1], 0xEF);
    }

    #[test]
    fn test_read_unwritten_page_is_zeroed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut dm = DiskManager::create(&path).unwrap();

        let page = dm.read_page(PageId::new(5)).unwrap();
        assert!(page.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sparse_write_extends_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut dm = DiskManager::create(&path).unwrap();

        let mut page = Page::new();
        page.as_mut_slice()[0] = 0x42;
        dm.write_page(PageId::new(3), &page).unwrap();

        assert_eq!(dm.page_count(), 4);
        // The skipped pages read as zeros.
        let hole = dm.read_page(PageId::new(1)).unwrap();
        assert!(hole.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut dm = DiskManager::create(&path).unwrap();
            let mut page = Page::new();
            page.as_mut_slice()[0] = 0x42;
            dm.write_page(PageId::new(0), &page).unwrap();
        }

        {
            let mut dm = DiskManager::open(&path).unwrap();
            assert_eq!(dm.page_count(), 1);

            let page = dm.read_page(PageId::new(0)).unwrap();
            assert_eq!(page.as_slice()[0], 0x42);
        }
    }

    #[test]
    fn test_multiple_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut dm = DiskManager::create(&path).unwrap();

        for i in 0..10u32 {
            let mut page = Page::new();
            page.as_mut_slice()[0] = i as u8;
            dm.write_page(PageId::new(i), &page).unwrap();
        }

        assert_eq!(dm.page_count(), 10);
        assert_eq!(dm.file_size(), 10 * PAGE_SIZE as u64);

        for i in 0..10u32 {
            let page = dm.read_page(PageId::new(i)).unwrap();
            assert_eq!(page.as_slice()[0], i as u8);
        }
    }
}
