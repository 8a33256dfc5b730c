//! Buffer pool integration tests: cross-component behavior that the
//! unit tests don't cover.

use chalkdb::{BufferPoolManager, DiskManager, PageId};
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn create_bpm(pool_size: usize) -> (BufferPoolManager, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let dm = DiskManager::create(dir.path().join("test.db")).unwrap();
    (BufferPoolManager::new(pool_size, dm, 2), dir)
}

/// Data survives repeated eviction cycles through a tiny pool.
#[test]
fn test_data_persistence_across_evictions() {
    let (bpm, _dir) = create_bpm(2);

    let mut page_ids = vec![];
    for i in 0u8..5 {
        let mut guard = bpm.new_page().unwrap();
        guard.as_mut_slice()[0] = i;
        guard.as_mut_slice()[1] = i.wrapping_mul(3);
        page_ids.push(guard.page_id());
    }

    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(guard.as_slice()[0], i as u8);
        assert_eq!(guard.as_slice()[1], (i as u8).wrapping_mul(3));
    }
}

/// Flush everything, tear the pool down, and reopen the database file
/// with a fresh pool.
#[test]
fn test_flush_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let data = b"persistent!";

    let pid;

    {
        let dm = DiskManager::create(&path).unwrap();
        let bpm = BufferPoolManager::new(10, dm, 2);

        let mut guard = bpm.new_page().unwrap();
        pid = guard.page_id();
        guard.as_mut_slice()[..data.len()].copy_from_slice(data);
        drop(guard);

        bpm.flush_all_pages().unwrap();
    }

    {
        let dm = DiskManager::open(&path).unwrap();
        let bpm = BufferPoolManager::new(10, dm, 2);

        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(&guard.as_slice()[..data.len()], data);

        // Allocation resumes past the pages already in the file.
        assert!(bpm.allocate_page_id() > pid);
    }
}

/// Concurrent writers on disjoint pages; last write per page wins.
#[test]
fn test_concurrent_writers() {
    let (bpm, _dir) = create_bpm(10);
    let bpm = Arc::new(bpm);

    let page_ids: Vec<PageId> = (0..5).map(|_| bpm.new_page().unwrap().page_id()).collect();

    let mut handles = vec![];
    for (i, pid) in page_ids.iter().enumerate() {
        let bpm = Arc::clone(&bpm);
        let pid = *pid;

        handles.push(thread::spawn(move || {
            for j in 0..50 {
                let mut guard = bpm.fetch_page_write(pid).unwrap();
                guard.as_mut_slice()[0] = ((i * 50 + j) % 256) as u8;
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(guard.as_slice()[0], ((i * 50 + 49) % 256) as u8);
    }
}

/// Many threads hammering a pool smaller than the page set.
#[test]
fn test_concurrent_churn_small_pool() {
    let (bpm, _dir) = create_bpm(4);
    let bpm = Arc::new(bpm);

    let page_ids: Vec<PageId> = (0..8u8)
        .map(|i| {
            let mut guard = bpm.new_page().unwrap();
            guard.as_mut_slice()[0] = i;
            guard.page_id()
        })
        .collect();

    let mut handles = vec![];
    for t in 0..4usize {
        let bpm = Arc::clone(&bpm);
        let page_ids = page_ids.clone();

        handles.push(thread::spawn(move || {
            for round in 0..100 {
                let pid = page_ids[(t + round) % page_ids.len()];
                let expected = pid.0 as u8;
                // The pool may be transiently full of pinned pages.
                if let Some(guard) = bpm.checked_read_page(pid) {
                    assert_eq!(guard.as_slice()[0], expected);
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn test_stats_accuracy() {
    let (bpm, _dir) = create_bpm(2);

    let pid = bpm.new_page().unwrap().page_id();

    for _ in 0..5 {
        let _ = bpm.fetch_page_read(pid).unwrap();
    }
    let stats = bpm.stats().snapshot();
    assert!(stats.hits >= 5);

    // Force evictions.
    let _ = bpm.new_page().unwrap();
    let _ = bpm.new_page().unwrap();

    let stats = bpm.stats().snapshot();
    assert!(stats.evictions >= 1);
    assert!(stats.hit_rate() > 0.0);
}

/// The LRU-K policy prefers a cold page over a recently re-used one.
#[test]
fn test_eviction_prefers_cold_page() {
    let (bpm, _dir) = create_bpm(2);

    let hot = bpm.new_page().unwrap().page_id();
    let cold = bpm.new_page().unwrap().page_id();

    // Touch the hot page a few more times.
    for _ in 0..3 {
        let _ = bpm.fetch_page_read(hot).unwrap();
    }

    // Admitting a third page must evict the cold one.
    let _p2 = bpm.new_page().unwrap();
    assert!(bpm.contains_page(hot));
    assert!(!bpm.contains_page(cold));
}
