//! Concurrent B+Tree workloads exercising the latch-crabbing paths

use std::sync::Arc;
use std::thread;

use karst::buffer::BufferPoolManager;
use karst::common::RecordId;
use karst::index::{BPlusTree, GenericComparator, GenericKey};
use karst::storage::disk::DiskManager;

use tempfile::NamedTempFile;

type Key = GenericKey<8>;
type Tree = BPlusTree<Key, RecordId, GenericComparator<8>>;

fn key(v: u64) -> Key {
    Key::from_u64(v)
}

fn rid(v: u64) -> RecordId {
    RecordId::from(v)
}

fn create_tree(pool_size: usize, leaf_max: usize, internal_max: usize) -> (Arc<Tree>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let disk_manager = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, 2, disk_manager));

    let header_page_id = bpm.new_page().unwrap().unwrap();
    bpm.unpin_page(header_page_id, false);

    let tree = Tree::new(
        "concurrent_index",
        header_page_id,
        bpm,
        GenericComparator,
        leaf_max,
        internal_max,
    )
    .unwrap();
    (Arc::new(tree), temp_file)
}

#[test]
fn test_concurrent_disjoint_inserts() {
    let (tree, _temp) = create_tree(128, 4, 4);

    let threads = 8u64;
    let per_thread = 125u64;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for i in 0..per_thread {
                    let v = t * per_thread + i;
                    assert!(tree.insert(&key(v), &rid(v)).unwrap());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for v in 0..threads * per_thread {
        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)), "key {}", v);
    }

    // One ordered pass over everything.
    let scanned: Vec<u64> = tree
        .begin()
        .unwrap()
        .map(|item| item.unwrap().0.to_u64())
        .collect();
    assert_eq!(scanned, (0..threads * per_thread).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_interleaved_inserts() {
    let (tree, _temp) = create_tree(128, 4, 4);

    // Every thread inserts keys congruent to its id, so splits interleave
    // across the whole key space.
    let threads = 4u64;
    let total = 800u64;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let mut v = t;
                while v < total {
                    assert!(tree.insert(&key(v), &rid(v)).unwrap());
                    v += threads;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for v in 0..total {
        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)), "key {}", v);
    }
}

#[test]
fn test_readers_race_writers() {
    let (tree, _temp) = create_tree(128, 4, 4);

    for v in 0..500u64 {
        tree.insert(&key(v), &rid(v)).unwrap();
    }

    let writer = {
        let tree = Arc::clone(&tree);
        thread::spawn(move || {
            for v in 500..1000u64 {
                assert!(tree.insert(&key(v), &rid(v)).unwrap());
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                // The first 500 keys are stable and must always be
                // visible while the writer grows the tree.
                for round in 0..10 {
                    for v in (round * 50)..(round * 50 + 50) {
                        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)));
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    for v in 0..1000u64 {
        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)), "key {}", v);
    }
}

#[test]
fn test_concurrent_disjoint_removes() {
    let (tree, _temp) = create_tree(128, 4, 4);

    let total = 400u64;
    for v in 0..total {
        tree.insert(&key(v), &rid(v)).unwrap();
    }

    let threads = 4u64;
    let per_thread = total / threads;
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for i in 0..per_thread {
                    tree.remove(&key(t * per_thread + i)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(tree.is_empty().unwrap());
}

#[test]
fn test_concurrent_mixed_workload() {
    let (tree, _temp) = create_tree(128, 4, 4);

    // Stable keys stay put; churn keys are inserted and removed while
    // readers verify the stable half.
    for v in 0..200u64 {
        tree.insert(&key(v), &rid(v)).unwrap();
    }

    let churners: Vec<_> = (0..2u64)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let base = 1000 + t * 1000;
                for round in 0..5 {
                    for i in 0..50 {
                        let v = base + round * 50 + i;
                        assert!(tree.insert(&key(v), &rid(v)).unwrap());
                    }
                    for i in 0..50 {
                        let v = base + round * 50 + i;
                        tree.remove(&key(v)).unwrap();
                    }
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for _ in 0..20 {
                    for v in 0..200u64 {
                        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)));
                    }
                }
            })
        })
        .collect();

    for handle in churners {
        handle.join().unwrap();
    }
    for handle in readers {
        handle.join().unwrap();
    }

    let scanned: Vec<u64> = tree
        .begin()
        .unwrap()
        .map(|item| item.unwrap().0.to_u64())
        .collect();
    assert_eq!(scanned, (0..200u64).collect::<Vec<_>>());
}
