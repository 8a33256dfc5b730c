//! ChalkDB - an embedded teaching-database storage core.
//!
//! # Architecture
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                         ChalkDB                           │
//! ├───────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────┐   ┌───────────────────────┐  │
//! │  │   Index Layer (index/)  │   │  Primer (trie/)       │  │
//! │  │   B+ tree over pages    │   │  COW trie + TrieStore │  │
//! │  └─────────────────────────┘   └───────────────────────┘  │
//! │                ↓                                          │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │             Buffer Pool (buffer/)                   │  │
//! │  │   BufferPoolManager + Frames + LRU-K replacer       │  │
//! │  │   RAII page guards (pin + latch)                    │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! │                ↓                                          │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │             Storage Layer (storage/)                │  │
//! │  │   DiskManager + 4KB pages                           │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - shared primitives (PageId, FrameId, Rid, Error, config)
//! - [`storage`] - disk I/O and the raw page type
//! - [`buffer`] - buffer pool management and eviction
//! - [`index`] - the B+ tree index
//! - [`trie`] - persistent copy-on-write trie and its concurrent store
//!
//! # Quick Start
//! ```no_run
//! use chalkdb::storage::DiskManager;
//! use chalkdb::buffer::BufferPoolManager;
//!
//! let dm = DiskManager::create("chalk.db").unwrap();
//! let bpm = BufferPoolManager::new(64, dm, 2);
//!
//! let mut guard = bpm.new_page().unwrap();
//! guard.as_mut_slice()[0] = 0xAB;
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;
pub mod trie;

// Re-export the most commonly used items at the crate root.
pub use common::config::PAGE_SIZE;
pub use common::{Error, FrameId, PageId, Result, Rid};

pub use buffer::{
    BasicPageGuard, BufferPoolManager, Frame, PageReadGuard, PageWriteGuard, PoolStats,
    StatsSnapshot,
};
pub use index::{BPlusTree, IndexKey, TreeIterator};
pub use storage::page::Page;
pub use storage::DiskManager;
pub use trie::store::{TrieStore, ValueGuard};
pub use trie::Trie;
