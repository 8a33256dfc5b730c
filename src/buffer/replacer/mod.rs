//! Eviction policy for the buffer pool.
//!
//! The replacer tracks which frames are evictable (unpinned) and selects
//! victims when the pool needs to admit a page and no free frame exists.

mod lru_k;

pub use lru_k::LruKReplacer;
