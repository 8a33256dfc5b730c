//! B+ tree integration tests.

use std::cmp::Ordering;
use std::sync::Arc;

use chalkdb::{BPlusTree, BufferPoolManager, DiskManager, PageId, Rid};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::tempdir;

type U64Tree = BPlusTree<u64, fn(&u64, &u64) -> Ordering>;

fn create_tree(
    pool_size: usize,
    leaf_max: usize,
    internal_max: usize,
) -> (U64Tree, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let dm = DiskManager::create(dir.path().join("index.db")).unwrap();
    let bpm = Arc::new(BufferPoolManager::new(pool_size, dm, 2));

    // Page 0 is the tree's header page.
    let header = bpm.new_page().unwrap().page_id();
    assert_eq!(header, PageId::new(0));

    let tree = BPlusTree::new(
        "test_index",
        header,
        bpm,
        u64::cmp as fn(&u64, &u64) -> Ordering,
        leaf_max,
        internal_max,
    )
    .unwrap();
    (tree, dir)
}

fn rid(n: u64) -> Rid {
    Rid::new(PageId::new((n / 10) as u32), (n % 10) as u32)
}

fn keys_of(tree: &U64Tree) -> Vec<u64> {
    tree.begin().unwrap().map(|(k, _)| k).collect()
}

/// Smallest interesting shape: leaf_max = internal_max = 3, four keys.
/// Ends as two leaves [1,4] and [5,9] under the root [_, 5].
#[test]
fn test_root_leaf_split() {
    let (tree, _dir) = create_tree(10, 3, 3);

    for key in [5u64, 9, 1, 4] {
        assert!(tree.insert(&key, rid(key)).unwrap());
    }

    assert_eq!(keys_of(&tree), vec![1, 4, 5, 9]);
    for key in [1u64, 4, 5, 9] {
        assert_eq!(tree.get_value(&key).unwrap(), Some(rid(key)));
    }
    assert_eq!(tree.get_value(&3).unwrap(), None);

    // The root is no longer the leaf that started the tree.
    let root = tree.root_page_id().unwrap();
    assert!(root.is_valid());
    assert_ne!(root, PageId::new(1));
}

#[test]
fn test_sequential_inserts_multilevel() {
    let (tree, _dir) = create_tree(32, 3, 3);

    // Small fan-out forces several levels of internal splits.
    for key in 0..200u64 {
        assert!(tree.insert(&key, rid(key)).unwrap(), "insert {}", key);
    }

    for key in 0..200u64 {
        assert_eq!(tree.get_value(&key).unwrap(), Some(rid(key)), "get {}", key);
    }
    assert_eq!(tree.get_value(&200).unwrap(), None);

    let keys = keys_of(&tree);
    assert_eq!(keys, (0..200).collect::<Vec<_>>());
}

#[test]
fn test_reverse_inserts() {
    let (tree, _dir) = create_tree(32, 4, 4);

    for key in (0..100u64).rev() {
        assert!(tree.insert(&key, rid(key)).unwrap());
    }

    assert_eq!(keys_of(&tree), (0..100).collect::<Vec<_>>());
}

#[test]
fn test_random_inserts_and_lookups() {
    let (tree, _dir) = create_tree(64, 5, 5);

    let mut keys: Vec<u64> = (0..500).map(|i| i * 7 + 3).collect();
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    keys.shuffle(&mut rng);

    for &key in &keys {
        assert!(tree.insert(&key, rid(key)).unwrap());
    }

    keys.sort_unstable();
    assert_eq!(keys_of(&tree), keys);

    for &key in &keys {
        assert_eq!(tree.get_value(&key).unwrap(), Some(rid(key)));
    }
    // Keys between the inserted ones miss.
    assert_eq!(tree.get_value(&4).unwrap(), None);
    assert_eq!(tree.get_value(&11).unwrap(), None);
}

#[test]
fn test_duplicate_inserts_rejected() {
    let (tree, _dir) = create_tree(16, 3, 3);

    for key in [5u64, 9, 1, 4] {
        assert!(tree.insert(&key, rid(key)).unwrap());
    }
    for key in [5u64, 9, 1, 4] {
        assert!(!tree.insert(&key, rid(key + 100)).unwrap());
        assert_eq!(tree.get_value(&key).unwrap(), Some(rid(key)));
    }

    assert_eq!(keys_of(&tree), vec![1, 4, 5, 9]);
}

#[test]
fn test_remove_and_iterate() {
    let (tree, _dir) = create_tree(32, 3, 3);

    for key in 0..50u64 {
        tree.insert(&key, rid(key)).unwrap();
    }

    // Remove the odd keys.
    for key in (1..50u64).step_by(2) {
        tree.remove(&key).unwrap();
    }

    for key in 0..50u64 {
        let expected = (key % 2 == 0).then(|| rid(key));
        assert_eq!(tree.get_value(&key).unwrap(), expected, "key {}", key);
    }

    assert_eq!(keys_of(&tree), (0..50).step_by(2).collect::<Vec<_>>());
}

/// Empty out a whole leaf; iteration must skip over it.
#[test]
fn test_remove_entire_leaf_range() {
    let (tree, _dir) = create_tree(32, 3, 3);

    for key in 0..30u64 {
        tree.insert(&key, rid(key)).unwrap();
    }
    for key in 10..20u64 {
        tree.remove(&key).unwrap();
    }

    let expected: Vec<u64> = (0..10).chain(20..30).collect();
    assert_eq!(keys_of(&tree), expected);
}

#[test]
fn test_begin_at() {
    let (tree, _dir) = create_tree(32, 3, 3);

    for key in (0..100u64).step_by(10) {
        tree.insert(&key, rid(key)).unwrap();
    }

    // Exact hit.
    let from_40: Vec<u64> = tree.begin_at(&40).unwrap().map(|(k, _)| k).collect();
    assert_eq!(from_40, vec![40, 50, 60, 70, 80, 90]);

    // Between keys: starts at the next larger one.
    let from_41: Vec<u64> = tree.begin_at(&41).unwrap().map(|(k, _)| k).collect();
    assert_eq!(from_41, vec![50, 60, 70, 80, 90]);

    // Before everything.
    let from_0: Vec<u64> = tree.begin_at(&0).unwrap().map(|(k, _)| k).collect();
    assert_eq!(from_0.len(), 10);

    // Past everything.
    let mut past = tree.begin_at(&1000).unwrap();
    assert_eq!(past.next(), None);
    assert!(tree.begin_at(&1000).unwrap() == tree.end());
}

#[test]
fn test_iterator_values_match() {
    let (tree, _dir) = create_tree(32, 4, 4);

    for key in 0..64u64 {
        tree.insert(&key, rid(key)).unwrap();
    }

    for (i, (key, value)) in tree.begin().unwrap().enumerate() {
        assert_eq!(key, i as u64);
        assert_eq!(value, rid(key));
    }
}

/// The tree pins at most one root-to-leaf path (plus split scratch), so
/// it works through a pool far smaller than the page count.
#[test]
fn test_small_pool_pressure() {
    let (tree, _dir) = create_tree(16, 3, 3);

    for key in 0..100u64 {
        assert!(tree.insert(&key, rid(key)).unwrap(), "insert {}", key);
    }
    for key in 0..100u64 {
        assert_eq!(tree.get_value(&key).unwrap(), Some(rid(key)));
    }
    assert_eq!(keys_of(&tree).len(), 100);
}

/// Interleaved inserts and removes with a model map as oracle.
#[test]
fn test_randomized_against_model() {
    use std::collections::BTreeMap;

    let (tree, _dir) = create_tree(64, 4, 4);
    let mut model: BTreeMap<u64, Rid> = BTreeMap::new();
    let mut rng = StdRng::seed_from_u64(42);

    let mut ops: Vec<u64> = (0..300).collect();
    ops.shuffle(&mut rng);

    for (step, op) in ops.iter().enumerate() {
        let key = op % 120;
        if step % 3 == 2 {
            tree.remove(&key).unwrap();
            model.remove(&key);
        } else {
            let inserted = tree.insert(&key, rid(key)).unwrap();
            assert_eq!(inserted, !model.contains_key(&key));
            model.entry(key).or_insert_with(|| rid(key));
        }
    }

    let tree_entries: Vec<(u64, Rid)> = tree.begin().unwrap().collect();
    let model_entries: Vec<(u64, Rid)> = model.into_iter().collect();
    assert_eq!(tree_entries, model_entries);
}

#[test]
fn test_concurrent_readers() {
    use std::thread;

    let dir = tempdir().unwrap();
    let dm = DiskManager::create(dir.path().join("index.db")).unwrap();
    let bpm = Arc::new(BufferPoolManager::new(64, dm, 2));
    let header = bpm.new_page().unwrap().page_id();
    let tree: Arc<U64Tree> = Arc::new(
        BPlusTree::new(
            "readers",
            header,
            bpm,
            u64::cmp as fn(&u64, &u64) -> Ordering,
            4,
            4,
        )
        .unwrap(),
    );

    for key in 0..200u64 {
        tree.insert(&key, rid(key)).unwrap();
    }

    let handles: Vec<_> = (0..4u64)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for key in 0..200u64 {
                    let key = (key + t * 37) % 200;
                    assert_eq!(tree.get_value(&key).unwrap(), Some(rid(key)));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
