//! Karst - the core of a disk-oriented storage engine
//!
//! This crate provides the two tightly coupled subsystems at the heart of
//! a disk-oriented database: a buffer pool that caches fixed-size pages
//! in memory, and a concurrent B+Tree index built on top of it.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): Disk I/O
//!   - `DiskManager`: Reads and writes pages against a single database file
//!   - `DiskScheduler`: Background worker thread for disk requests
//!
//! - **Buffer Pool** (`buffer`): Memory management for database pages
//!   - `BufferPoolManager`: Caches pages in a fixed set of frames
//!   - `LruKReplacer`: LRU-K page replacement policy
//!   - `FrameHeader`: Per-frame metadata, pin count, and page latch
//!   - `BasicPageGuard`/`ReadPageGuard`/`WritePageGuard`: RAII guards
//!     pairing a pin with an optionally held latch
//!
//! - **Index** (`index`): B+Tree index
//!   - `BPlusTree`: Latch-crabbing search, insert, remove, and range scans
//!   - `BTreeIterator`: Forward cursor over the sibling-linked leaves
//!   - `GenericKey`/`GenericComparator`: Fixed-width keys with a supplied
//!     total order
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use karst::buffer::BufferPoolManager;
//! use karst::common::RecordId;
//! use karst::index::{BPlusTree, GenericComparator, GenericKey};
//! use karst::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
//!
//! // The header page persists the tree's root page id.
//! let header_page_id = bpm.new_page().unwrap().unwrap();
//! bpm.unpin_page(header_page_id, false);
//!
//! let tree: BPlusTree<GenericKey<8>, RecordId, GenericComparator<8>> =
//!     BPlusTree::new("demo", header_page_id, bpm, GenericComparator, 32, 32).unwrap();
//!
//! tree.insert(&GenericKey::from_u64(42), &RecordId::from(42)).unwrap();
//! assert!(tree.get_value(&GenericKey::from_u64(42)).unwrap().is_some());
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{KarstError, PageId, RecordId, Result, SlotId};
