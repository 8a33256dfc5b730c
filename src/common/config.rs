//! Configuration constants for ChalkDB.

/// Size of a page in bytes (4KB).
///
/// Chosen to match the OS page size on most systems and the sector size
/// required for aligned Direct I/O. Every on-disk structure in ChalkDB
/// (B+ tree nodes, the tree header page) is laid out to fit in exactly
/// one page.
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of pages addressable with a u32 page id.
pub const MAX_PAGES: u64 = (u32::MAX as u64) + 1;

/// Maximum theoretical database size in bytes (16TB).
pub const MAX_DB_SIZE_BYTES: u64 = MAX_PAGES * PAGE_SIZE as u64;
