use std::sync::Arc;

use karst::buffer::BufferPoolManager;
use karst::common::RecordId;
use karst::index::{BPlusTree, GenericComparator, GenericKey};
use karst::storage::disk::DiskManager;

type Key = GenericKey<8>;

fn main() {
    println!("Karst - a disk-oriented storage engine core");
    println!("===========================================\n");

    let db_path = "demo.db";

    let disk_manager = Arc::new(DiskManager::new(db_path).expect("Failed to create disk manager"));
    println!("Created disk manager for: {}", db_path);

    let bpm = Arc::new(BufferPoolManager::new(16, 2, disk_manager));
    println!("Created buffer pool manager with 16 frames\n");

    let header_page_id = bpm
        .new_page()
        .expect("Failed to allocate header page")
        .expect("Buffer pool full");
    bpm.unpin_page(header_page_id, false);

    let tree: BPlusTree<Key, RecordId, GenericComparator<8>> =
        BPlusTree::new("demo_index", header_page_id, bpm.clone(), GenericComparator, 4, 4)
            .expect("Failed to create index");

    for v in [13u64, 5, 21, 1, 8, 34, 2, 3, 55, 89, 144, 233] {
        tree.insert(&Key::from_u64(v), &RecordId::from(v))
            .expect("Insert failed");
    }
    println!("Inserted 12 keys; tree structure:\n");
    println!("{}", tree.draw_tree().expect("Failed to render tree"));

    print!("Forward scan from 8: ");
    let iter = tree
        .begin_from(&Key::from_u64(8))
        .expect("Failed to position iterator");
    for item in iter {
        let (key, _) = item.expect("Scan failed");
        print!("{:?} ", key);
    }
    println!("\n");

    for v in [13u64, 21, 34, 55] {
        tree.remove(&Key::from_u64(v)).expect("Remove failed");
    }
    println!("Removed 4 keys; tree structure:\n");
    println!("{}", tree.draw_tree().expect("Failed to render tree"));

    bpm.flush_all_pages().expect("Failed to flush pages");
    println!("Flushed all pages to disk");

    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}
