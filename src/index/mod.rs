pub mod btree_index;
pub mod btree_iterator;
pub mod btree_page;
pub mod key;

pub use btree_index::BPlusTree;
pub use btree_iterator::BTreeIterator;
pub use btree_page::{
    page_type, BTreePageType, HeaderPage, HeaderPageRef, InternalPage, InternalPageRef, LeafPage,
    LeafPageRef, MergeOutcome,
};
pub use key::{GenericComparator, GenericKey, KeyComparator, Storable};
