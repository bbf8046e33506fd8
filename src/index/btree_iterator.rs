use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{KarstError, PageId, Result, INVALID_PAGE_ID};

use super::btree_page::LeafPageRef;
use super::key::Storable;

/// Forward cursor over the sibling-linked leaves of a B+Tree.
///
/// The iterator snapshots `(page_id, index, item)` and re-latches the
/// current leaf briefly on each step; it never holds a latch across user
/// code, so the tree may mutate between steps.
pub struct BTreeIterator<K, V> {
    bpm: Arc<BufferPoolManager>,
    page_id: PageId,
    index: usize,
    item: Option<(K, V)>,
}

impl<K: Storable, V: Storable> BTreeIterator<K, V> {
    /// Positions a cursor at the given slot of a leaf page.
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, page_id: PageId, index: usize) -> Result<Self> {
        let item = if page_id == INVALID_PAGE_ID {
            None
        } else {
            let guard = bpm
                .fetch_page_read(page_id)?
                .ok_or(KarstError::PageNotFound(page_id))?;
            let leaf = LeafPageRef::<K, V>::new(guard.data());
            Some(leaf.item_at(index))
        };

        Ok(Self {
            bpm,
            page_id,
            index,
            item,
        })
    }

    /// The past-the-end cursor.
    pub(crate) fn end(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            page_id: INVALID_PAGE_ID,
            index: 0,
            item: None,
        }
    }

    /// Returns true once the cursor has run off the last leaf.
    pub fn is_end(&self) -> bool {
        self.page_id == INVALID_PAGE_ID
    }

    /// The entry under the cursor, if any.
    pub fn item(&self) -> Option<&(K, V)> {
        self.item.as_ref()
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Steps to the next entry, following the sibling link when the
    /// current leaf is exhausted.
    pub fn advance(&mut self) -> Result<()> {
        if self.page_id == INVALID_PAGE_ID {
            return Ok(());
        }

        let next_page_id = {
            let guard = self
                .bpm
                .fetch_page_read(self.page_id)?
                .ok_or(KarstError::PageNotFound(self.page_id))?;
            let leaf = LeafPageRef::<K, V>::new(guard.data());

            if self.index + 1 < leaf.size() {
                self.index += 1;
                self.item = Some(leaf.item_at(self.index));
                return Ok(());
            }
            leaf.next_page_id()
        };

        self.index = 0;
        self.page_id = next_page_id;
        self.item = if next_page_id == INVALID_PAGE_ID {
            None
        } else {
            let guard = self
                .bpm
                .fetch_page_read(next_page_id)?
                .ok_or(KarstError::PageNotFound(next_page_id))?;
            let leaf = LeafPageRef::<K, V>::new(guard.data());
            Some(leaf.item_at(0))
        };

        Ok(())
    }
}

impl<K: Storable, V: Storable> Iterator for BTreeIterator<K, V> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_end() {
            return None;
        }
        let current = self.item?;
        match self.advance() {
            Ok(()) => Some(Ok(current)),
            Err(e) => Some(Err(e)),
        }
    }
}
