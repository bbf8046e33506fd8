use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::common::{KarstError, PageId, Result, INVALID_PAGE_ID};

use super::btree_iterator::BTreeIterator;
use super::btree_page::{
    page_type, BTreePageType, HeaderPage, HeaderPageRef, InternalPage, InternalPageRef, LeafPage,
    LeafPageRef, MergeOutcome,
};
use super::key::{KeyComparator, Storable};

#[derive(Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Insert,
    Remove,
}

/// Sibling recorded for each internal node routed through during a
/// removal descent: the neighbor a rebalance would use (right neighbor
/// when one exists, else the left), and the node's slot in its parent.
#[derive(Clone, Copy)]
struct SiblingHint {
    sibling: PageId,
    index: usize,
    is_right: bool,
}

impl SiblingHint {
    const NONE: SiblingHint = SiblingHint {
        sibling: INVALID_PAGE_ID,
        index: 0,
        is_right: false,
    };
}

/// Guards held during a write descent. `path` is ordered root-to-leaf;
/// the front-most guard is always the furthest ancestor still latched.
struct WriteContext {
    header: Option<WritePageGuard>,
    path: VecDeque<WritePageGuard>,
    hints: Vec<SiblingHint>,
    /// Pages emptied during rebalancing, deleted once all guards drop
    freed: Vec<PageId>,
}

impl WriteContext {
    fn new(header: WritePageGuard) -> Self {
        Self {
            header: Some(header),
            path: VecDeque::new(),
            hints: vec![SiblingHint::NONE],
            freed: Vec::new(),
        }
    }

    /// Releases the header and every ancestor above the current node.
    /// Called once the current node is known to absorb the operation.
    fn release_ancestors(&mut self) {
        self.header = None;
        while self.path.len() > 1 {
            self.path.pop_front();
        }
    }
}

/// A concurrent B+Tree index over the buffer pool, generic over a
/// fixed-width key type, a fixed-width value type, and a total-order
/// comparator. The root page id lives in a dedicated header page.
///
/// Readers descend with shared latches, coupling parent to child.
/// Writers descend with exclusive latches and release ancestors as soon
/// as the current node can absorb the operation without restructuring.
pub struct BPlusTree<K, V, C> {
    index_name: String,
    header_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: usize,
    internal_max_size: usize,
    _marker: std::marker::PhantomData<(K, V)>,
}

impl<K, V, C> BPlusTree<K, V, C>
where
    K: Storable,
    V: Storable,
    C: KeyComparator<K>,
{
    /// Creates an index over the given header page, resetting its root.
    pub fn new(
        name: impl Into<String>,
        header_page_id: PageId,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let index_name = name.into();
        log::debug!(
            "creating index {} (leaf_max={}, internal_max={})",
            index_name,
            leaf_max_size,
            internal_max_size
        );

        {
            let mut guard = bpm
                .fetch_page_write(header_page_id)?
                .ok_or(KarstError::PageNotFound(header_page_id))?;
            HeaderPage::init(guard.data_mut());
        }

        Ok(Self {
            index_name,
            header_page_id,
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            _marker: std::marker::PhantomData,
        })
    }

    /// Attaches to an existing index without resetting its header page.
    pub fn open(
        name: impl Into<String>,
        header_page_id: PageId,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        {
            let guard = bpm
                .fetch_page_read(header_page_id)?
                .ok_or(KarstError::PageNotFound(header_page_id))?;
            if page_type(guard.data()) != BTreePageType::Header {
                return Err(KarstError::IndexCorrupted(format!(
                    "page {} is not an index header page",
                    header_page_id
                )));
            }
        }

        Ok(Self {
            index_name: name.into(),
            header_page_id,
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            _marker: std::marker::PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.index_name
    }

    /// Returns the page id of the current root, or `INVALID_PAGE_ID` for
    /// an empty tree.
    pub fn get_root_page_id(&self) -> Result<PageId> {
        let guard = self
            .bpm
            .fetch_page_read(self.header_page_id)?
            .ok_or(KarstError::PageNotFound(self.header_page_id))?;
        Ok(HeaderPageRef::new(guard.data()).root_page_id())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.get_root_page_id()? == INVALID_PAGE_ID)
    }

    /// Point lookup. Descends with shared latches, holding at most the
    /// current node and its parent.
    pub fn get_value(&self, key: &K) -> Result<Option<V>> {
        let Some(guard) = self.find_leaf(key)? else {
            return Ok(None);
        };
        let leaf = LeafPageRef::<K, V>::new(guard.data());
        Ok(leaf.get_value(key, &self.comparator))
    }

    /// Inserts a key/value pair. Returns false on a duplicate key,
    /// leaving the tree unchanged.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool> {
        // Lazily create the root leaf under the header's exclusive latch.
        {
            let mut header_guard = self
                .bpm
                .fetch_page_write(self.header_page_id)?
                .ok_or(KarstError::PageNotFound(self.header_page_id))?;
            if HeaderPageRef::new(header_guard.data()).root_page_id() == INVALID_PAGE_ID {
                let leaf_id = self.new_leaf_page()?;
                HeaderPage::new(header_guard.data_mut()).set_root_page_id(leaf_id);
            }
        }

        let mut ctx = self.find_leaf_mut(key, WriteMode::Insert)?;

        let inserted = {
            let guard = ctx
                .path
                .back_mut()
                .ok_or_else(|| KarstError::IndexCorrupted("insert descent found no leaf".into()))?;
            let mut leaf = LeafPage::<K, V>::new(guard.data_mut());
            leaf.insert(key, value, &self.comparator)
        };
        if !inserted {
            return Ok(false);
        }

        self.split_if_needed(&mut ctx)?;
        Ok(true)
    }

    /// Removes a key. Absent keys are a no-op.
    pub fn remove(&self, key: &K) -> Result<()> {
        if self.get_value(key)?.is_none() {
            return Ok(());
        }

        let mut ctx = self.find_leaf_mut(key, WriteMode::Remove)?;

        {
            let guard = ctx
                .path
                .back_mut()
                .ok_or_else(|| KarstError::IndexCorrupted("remove descent found no leaf".into()))?;
            let mut leaf = LeafPage::<K, V>::new(guard.data_mut());
            leaf.remove(key, &self.comparator);
        }

        self.rebalance(&mut ctx)?;

        let freed = std::mem::take(&mut ctx.freed);
        drop(ctx);
        for page_id in freed {
            self.bpm.delete_page(page_id)?;
        }
        Ok(())
    }

    /// Iterator positioned at the first entry of the tree.
    pub fn begin(&self) -> Result<BTreeIterator<K, V>> {
        let Some(guard) = self.find_leftmost_leaf()? else {
            return Ok(self.end());
        };
        let page_id = guard.page_id();
        drop(guard);
        BTreeIterator::new(Arc::clone(&self.bpm), page_id, 0)
    }

    /// Iterator positioned at `key`, or the end iterator when the key is
    /// absent.
    pub fn begin_from(&self, key: &K) -> Result<BTreeIterator<K, V>> {
        let (page_id, index) = {
            let Some(guard) = self.find_leaf(key)? else {
                return Ok(self.end());
            };
            let leaf = LeafPageRef::<K, V>::new(guard.data());
            match leaf.get_index_by_key(key, &self.comparator) {
                Some(index) => (guard.page_id(), index),
                None => return Ok(self.end()),
            }
        };
        BTreeIterator::new(Arc::clone(&self.bpm), page_id, index)
    }

    /// The past-the-end iterator.
    pub fn end(&self) -> BTreeIterator<K, V> {
        BTreeIterator::end(Arc::clone(&self.bpm))
    }

    /// Shared-latch descent to the leaf that may contain `key`.
    /// Returns None for an empty tree.
    fn find_leaf(&self, key: &K) -> Result<Option<ReadPageGuard>> {
        let header_guard = self
            .bpm
            .fetch_page_read(self.header_page_id)?
            .ok_or(KarstError::PageNotFound(self.header_page_id))?;
        let mut page_id = HeaderPageRef::new(header_guard.data()).root_page_id();
        if page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let mut read_set: VecDeque<ReadPageGuard> = VecDeque::new();
        read_set.push_back(header_guard);

        loop {
            let guard = self
                .bpm
                .fetch_page_read(page_id)?
                .ok_or(KarstError::PageNotFound(page_id))?;
            read_set.push_back(guard);
            read_set.pop_front();

            let guard = read_set.back().ok_or_else(|| {
                KarstError::IndexCorrupted("read descent lost its latches".into())
            })?;
            match page_type(guard.data()) {
                BTreePageType::Leaf => return Ok(read_set.pop_back()),
                BTreePageType::Internal => {
                    let node = InternalPageRef::<K>::new(guard.data());
                    let (_, child) = node.lookup(key, &self.comparator);
                    page_id = child;
                }
                other => {
                    return Err(KarstError::IndexCorrupted(format!(
                        "unexpected page type {:?} at page {}",
                        other, page_id
                    )))
                }
            }
        }
    }

    /// Shared-latch descent along the leftmost spine.
    fn find_leftmost_leaf(&self) -> Result<Option<ReadPageGuard>> {
        let header_guard = self
            .bpm
            .fetch_page_read(self.header_page_id)?
            .ok_or(KarstError::PageNotFound(self.header_page_id))?;
        let mut page_id = HeaderPageRef::new(header_guard.data()).root_page_id();
        if page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let mut read_set: VecDeque<ReadPageGuard> = VecDeque::new();
        read_set.push_back(header_guard);

        loop {
            let guard = self
                .bpm
                .fetch_page_read(page_id)?
                .ok_or(KarstError::PageNotFound(page_id))?;
            read_set.push_back(guard);
            read_set.pop_front();

            let guard = read_set.back().ok_or_else(|| {
                KarstError::IndexCorrupted("read descent lost its latches".into())
            })?;
            match page_type(guard.data()) {
                BTreePageType::Leaf => return Ok(read_set.pop_back()),
                BTreePageType::Internal => {
                    let node = InternalPageRef::<K>::new(guard.data());
                    page_id = node.child_at(0);
                }
                other => {
                    return Err(KarstError::IndexCorrupted(format!(
                        "unexpected page type {:?} at page {}",
                        other, page_id
                    )))
                }
            }
        }
    }

    /// Exclusive-latch descent to the leaf for `key`. Ancestors (header
    /// included) are released as soon as the node being routed through is
    /// safe for the operation: an insert-safe node absorbs one more entry
    /// without splitting, a remove-safe node loses one without
    /// underflowing. In remove mode a sibling hint is recorded per level.
    fn find_leaf_mut(&self, key: &K, mode: WriteMode) -> Result<WriteContext> {
        let header_guard = self
            .bpm
            .fetch_page_write(self.header_page_id)?
            .ok_or(KarstError::PageNotFound(self.header_page_id))?;
        let mut page_id = HeaderPageRef::new(header_guard.data()).root_page_id();
        let mut ctx = WriteContext::new(header_guard);

        while page_id != INVALID_PAGE_ID {
            let guard = self
                .bpm
                .fetch_page_write(page_id)?
                .ok_or(KarstError::PageNotFound(page_id))?;
            let kind = page_type(guard.data());
            ctx.path.push_back(guard);

            match kind {
                BTreePageType::Leaf => break,
                BTreePageType::Internal => {}
                other => {
                    return Err(KarstError::IndexCorrupted(format!(
                        "unexpected page type {:?} at page {}",
                        other, page_id
                    )))
                }
            }

            let (is_safe, child, hint) = {
                let guard = ctx.path.back_mut().ok_or_else(|| {
                    KarstError::IndexCorrupted("write descent lost its latches".into())
                })?;
                let mut node = InternalPage::<K>::new(guard.data_mut());
                let size = node.size();

                let is_safe = match mode {
                    WriteMode::Remove => size > node.min_size(),
                    WriteMode::Insert => {
                        // Keep entry 0 tracking the minimum key of the
                        // leftmost subtree as smaller keys descend.
                        if self.comparator.compare(&node.key_at(0), key)
                            == std::cmp::Ordering::Greater
                        {
                            node.set_key_at(0, key);
                        }
                        size + 1 < node.max_size()
                    }
                };

                let (id, child) = node.lookup(key, &self.comparator);
                let hint = if mode == WriteMode::Remove {
                    Some(if id == size - 1 {
                        SiblingHint {
                            sibling: if id == 0 {
                                INVALID_PAGE_ID
                            } else {
                                node.child_at(id - 1)
                            },
                            index: id,
                            is_right: false,
                        }
                    } else {
                        SiblingHint {
                            sibling: node.child_at(id + 1),
                            index: id,
                            is_right: true,
                        }
                    })
                } else {
                    None
                };

                (is_safe, child, hint)
            };

            if is_safe {
                ctx.release_ancestors();
            }
            if let Some(hint) = hint {
                ctx.hints.push(hint);
            }
            page_id = child;
        }

        Ok(ctx)
    }

    /// Allocates and formats a fresh leaf page, returning it unpinned.
    fn new_leaf_page(&self) -> Result<PageId> {
        let page_id = self.bpm.new_page()?.ok_or(KarstError::BufferPoolFull)?;
        {
            let mut guard = self
                .bpm
                .fetch_page_write(page_id)?
                .ok_or(KarstError::PageNotFound(page_id))?;
            LeafPage::<K, V>::init(guard.data_mut(), self.leaf_max_size);
        }
        self.bpm.unpin_page(page_id, true);
        Ok(page_id)
    }

    /// Allocates and formats a fresh internal page, returning it
    /// unpinned. Internal pages get one slot of headroom so a full node
    /// can accept the child published by a split before splitting itself.
    fn new_internal_page(&self) -> Result<PageId> {
        let page_id = self.bpm.new_page()?.ok_or(KarstError::BufferPoolFull)?;
        {
            let mut guard = self
                .bpm
                .fetch_page_write(page_id)?
                .ok_or(KarstError::PageNotFound(page_id))?;
            InternalPage::<K>::init(guard.data_mut(), self.internal_max_size + 1);
        }
        self.bpm.unpin_page(page_id, true);
        Ok(page_id)
    }

    /// Splits the leaf at the bottom of the descent if the insertion
    /// filled it, then propagates `(split_key, split_page)` pairs up the
    /// retained ancestors, growing a new root when the old one splits.
    fn split_if_needed(&self, ctx: &mut WriteContext) -> Result<()> {
        let mut split_key;
        let mut split_pid;
        let mut last_pid;
        let mut last_key;

        {
            let guard = ctx
                .path
                .back_mut()
                .ok_or_else(|| KarstError::IndexCorrupted("split reached an empty path".into()))?;
            let leaf_pid = guard.page_id();
            let mut leaf = LeafPage::<K, V>::new(guard.data_mut());
            if leaf.size() < leaf.max_size() {
                return Ok(());
            }

            let right_pid = self.new_leaf_page()?;
            let mut right_guard = self
                .bpm
                .fetch_page_write(right_pid)?
                .ok_or(KarstError::PageNotFound(right_pid))?;
            let mut right = LeafPage::<K, V>::new(right_guard.data_mut());

            split_key = leaf.split_into(&mut right);
            right.set_next_page_id(leaf.next_page_id());
            leaf.set_next_page_id(right_pid);

            split_pid = right_pid;
            last_pid = leaf_pid;
            last_key = leaf.key_at(0);
        }
        ctx.path.pop_back();

        while !ctx.path.is_empty() {
            let done = {
                let guard = ctx.path.back_mut().ok_or_else(|| {
                    KarstError::IndexCorrupted("split walked past its ancestors".into())
                })?;
                let node_pid = guard.page_id();
                let mut node = InternalPage::<K>::new(guard.data_mut());
                node.insert(&split_key, split_pid, &self.comparator);

                last_pid = node_pid;
                last_key = node.key_at(0);

                if node.size() < node.max_size() {
                    true
                } else {
                    let right_pid = self.new_internal_page()?;
                    let mut right_guard = self
                        .bpm
                        .fetch_page_write(right_pid)?
                        .ok_or(KarstError::PageNotFound(right_pid))?;
                    let mut right = InternalPage::<K>::new(right_guard.data_mut());

                    split_key = node.split_into(&mut right);
                    split_pid = right_pid;
                    false
                }
            };
            if done {
                return Ok(());
            }
            ctx.path.pop_back();
        }

        // The old root split: grow the tree by one level.
        let root_pid = self.new_internal_page()?;
        {
            let header_guard = ctx.header.as_mut().ok_or_else(|| {
                KarstError::IndexCorrupted("root split without the header latched".into())
            })?;
            HeaderPage::new(header_guard.data_mut()).set_root_page_id(root_pid);
        }

        let mut root_guard = self
            .bpm
            .fetch_page_write(root_pid)?
            .ok_or(KarstError::PageNotFound(root_pid))?;
        let mut root = InternalPage::<K>::new(root_guard.data_mut());
        root.insert(&last_key, last_pid, &self.comparator);
        root.insert(&split_key, split_pid, &self.comparator);

        Ok(())
    }

    /// Restores size invariants bottom-up after a removal. Each level
    /// applies the child level's separator deletions and re-insertions,
    /// then rebalances with the sibling recorded during descent. Sibling
    /// latches are only taken while the parent is still exclusively
    /// latched, so two rebalances can never contend for the same pair.
    fn rebalance(&self, ctx: &mut WriteContext) -> Result<()> {
        let mut deletes: Vec<usize> = Vec::new();
        let mut inserts: Vec<(K, PageId)> = Vec::new();

        // Leaf level.
        {
            let hint = ctx.hints.last().copied().unwrap_or(SiblingHint::NONE);
            let guard = ctx.path.back_mut().ok_or_else(|| {
                KarstError::IndexCorrupted("rebalance reached an empty path".into())
            })?;
            let leaf_pid = guard.page_id();
            let mut leaf = LeafPage::<K, V>::new(guard.data_mut());
            if leaf.size() >= leaf.min_size() {
                return Ok(());
            }

            if hint.sibling != INVALID_PAGE_ID {
                let mut sibling_guard = self
                    .bpm
                    .fetch_page_write(hint.sibling)?
                    .ok_or(KarstError::PageNotFound(hint.sibling))?;
                let mut sibling = LeafPage::<K, V>::new(sibling_guard.data_mut());

                let (l_index, r_index, l_pid, r_pid, outcome) = if hint.is_right {
                    let outcome = leaf.merge_with(&mut sibling, &self.comparator);
                    (hint.index, hint.index + 1, leaf_pid, hint.sibling, outcome)
                } else {
                    let outcome = sibling.merge_with(&mut leaf, &self.comparator);
                    (hint.index - 1, hint.index, hint.sibling, leaf_pid, outcome)
                };

                // Separator indices must be deleted right-to-left.
                deletes.push(r_index);
                deletes.push(l_index);
                match outcome {
                    MergeOutcome::Borrowed { left_key, right_key } => {
                        inserts.push((left_key, l_pid));
                        inserts.push((right_key, r_pid));
                    }
                    MergeOutcome::Merged { left_key } => {
                        inserts.push((left_key, l_pid));
                        ctx.freed.push(r_pid);
                    }
                }
            } else {
                // The leaf is the root.
                deletes.push(0);
                if leaf.size() == 0 {
                    inserts.clear();
                    ctx.freed.push(leaf_pid);
                } else {
                    inserts.clear();
                    inserts.push((leaf.key_at(0), leaf_pid));
                }
            }
        }
        ctx.path.pop_back();
        ctx.hints.pop();

        // Internal levels.
        while !ctx.path.is_empty() {
            let hint = ctx.hints.last().copied().unwrap_or(SiblingHint::NONE);
            let done = {
                let guard = ctx.path.back_mut().ok_or_else(|| {
                    KarstError::IndexCorrupted("rebalance walked past its ancestors".into())
                })?;
                let node_pid = guard.page_id();
                let mut node = InternalPage::<K>::new(guard.data_mut());

                for &index in &deletes {
                    node.remove(index);
                }
                for (key, page_id) in &inserts {
                    node.insert(key, *page_id, &self.comparator);
                }

                if node.size() >= node.min_size() {
                    true
                } else if hint.sibling != INVALID_PAGE_ID {
                    let mut sibling_guard = self
                        .bpm
                        .fetch_page_write(hint.sibling)?
                        .ok_or(KarstError::PageNotFound(hint.sibling))?;
                    let mut sibling = InternalPage::<K>::new(sibling_guard.data_mut());

                    deletes.clear();
                    inserts.clear();

                    let (l_index, r_index, l_pid, r_pid, outcome) = if hint.is_right {
                        let outcome = node.merge_with(&mut sibling, &self.comparator);
                        (hint.index, hint.index + 1, node_pid, hint.sibling, outcome)
                    } else {
                        let outcome = sibling.merge_with(&mut node, &self.comparator);
                        (hint.index - 1, hint.index, hint.sibling, node_pid, outcome)
                    };

                    deletes.push(r_index);
                    deletes.push(l_index);
                    match outcome {
                        MergeOutcome::Borrowed { left_key, right_key } => {
                            inserts.push((left_key, l_pid));
                            inserts.push((right_key, r_pid));
                        }
                        MergeOutcome::Merged { left_key } => {
                            inserts.push((left_key, l_pid));
                            ctx.freed.push(r_pid);
                        }
                    }
                    false
                } else {
                    // The node is the root.
                    deletes.push(0);
                    match node.size() {
                        0 => {
                            inserts.clear();
                            ctx.freed.push(node_pid);
                        }
                        1 => {
                            // A root with a single child hands the tree
                            // over to that child; `inserts` already names
                            // it from the merge below.
                            ctx.freed.push(node_pid);
                        }
                        _ => {
                            inserts.clear();
                            inserts.push((node.key_at(0), node_pid));
                        }
                    }
                    false
                }
            };
            if done {
                return Ok(());
            }
            ctx.path.pop_back();
            ctx.hints.pop();
        }

        // The walk consumed the root: publish its replacement.
        let header_guard = ctx.header.as_mut().ok_or_else(|| {
            KarstError::IndexCorrupted("root changed without the header latched".into())
        })?;
        let mut header = HeaderPage::new(header_guard.data_mut());
        if let Some((_, page_id)) = inserts.first() {
            header.set_root_page_id(*page_id);
        } else if !deletes.is_empty() {
            header.set_root_page_id(INVALID_PAGE_ID);
        }

        Ok(())
    }
}

impl<K, V, C> BPlusTree<K, V, C>
where
    K: Storable + fmt::Debug,
    V: Storable,
    C: KeyComparator<K>,
{
    /// Dumps the tree structure to stdout.
    pub fn print(&self) -> Result<()> {
        let root = self.get_root_page_id()?;
        if root == INVALID_PAGE_ID {
            println!("(empty tree)");
            return Ok(());
        }
        self.print_subtree(root, 0)
    }

    fn print_subtree(&self, page_id: PageId, depth: usize) -> Result<()> {
        let guard = self
            .bpm
            .fetch_page_read(page_id)?
            .ok_or(KarstError::PageNotFound(page_id))?;
        let indent = "    ".repeat(depth);

        match page_type(guard.data()) {
            BTreePageType::Leaf => {
                let leaf = LeafPageRef::<K, V>::new(guard.data());
                let keys: Vec<String> = (0..leaf.size())
                    .map(|i| format!("{:?}", leaf.key_at(i)))
                    .collect();
                println!(
                    "{}Leaf {} next={} [{}]",
                    indent,
                    page_id,
                    leaf.next_page_id(),
                    keys.join(", ")
                );
                Ok(())
            }
            BTreePageType::Internal => {
                let node = InternalPageRef::<K>::new(guard.data());
                let keys: Vec<String> = (0..node.size())
                    .map(|i| {
                        if i == 0 {
                            "_".to_string()
                        } else {
                            format!("{:?}", node.key_at(i))
                        }
                    })
                    .collect();
                println!("{}Internal {} [{}]", indent, page_id, keys.join(", "));
                let children: Vec<PageId> = (0..node.size()).map(|i| node.child_at(i)).collect();
                drop(guard);
                for child in children {
                    self.print_subtree(child, depth + 1)?;
                }
                Ok(())
            }
            other => Err(KarstError::IndexCorrupted(format!(
                "unexpected page type {:?} at page {}",
                other, page_id
            ))),
        }
    }

    /// Writes the tree as a GraphViz digraph to the given path.
    pub fn draw(&self, out_path: &Path) -> Result<()> {
        let root = self.get_root_page_id()?;
        if root == INVALID_PAGE_ID {
            log::warn!("drawing an empty tree");
            return Ok(());
        }

        let mut out = File::create(out_path)?;
        writeln!(out, "digraph G {{")?;
        writeln!(out, "  node [shape=record];")?;
        self.draw_subtree(root, &mut out)?;
        writeln!(out, "}}")?;
        Ok(())
    }

    fn draw_subtree(&self, page_id: PageId, out: &mut File) -> Result<()> {
        let guard = self
            .bpm
            .fetch_page_read(page_id)?
            .ok_or(KarstError::PageNotFound(page_id))?;

        match page_type(guard.data()) {
            BTreePageType::Leaf => {
                let leaf = LeafPageRef::<K, V>::new(guard.data());
                let keys: Vec<String> = (0..leaf.size())
                    .map(|i| format!("{:?}", leaf.key_at(i)))
                    .collect();
                writeln!(
                    out,
                    "  leaf_{} [label=\"P{}|{}\" color=green];",
                    page_id.as_u32(),
                    page_id.as_u32(),
                    keys.join("|")
                )?;
                if leaf.next_page_id() != INVALID_PAGE_ID {
                    writeln!(
                        out,
                        "  leaf_{} -> leaf_{};",
                        page_id.as_u32(),
                        leaf.next_page_id().as_u32()
                    )?;
                }
                Ok(())
            }
            BTreePageType::Internal => {
                let node = InternalPageRef::<K>::new(guard.data());
                let keys: Vec<String> = (0..node.size())
                    .map(|i| {
                        if i == 0 {
                            "_".to_string()
                        } else {
                            format!("{:?}", node.key_at(i))
                        }
                    })
                    .collect();
                writeln!(
                    out,
                    "  int_{} [label=\"P{}|{}\" color=pink];",
                    page_id.as_u32(),
                    page_id.as_u32(),
                    keys.join("|")
                )?;
                let children: Vec<PageId> = (0..node.size()).map(|i| node.child_at(i)).collect();
                drop(guard);
                for child in children {
                    let child_guard = self
                        .bpm
                        .fetch_page_read(child)?
                        .ok_or(KarstError::PageNotFound(child))?;
                    let prefix = if page_type(child_guard.data()) == BTreePageType::Leaf {
                        "leaf"
                    } else {
                        "int"
                    };
                    drop(child_guard);
                    writeln!(
                        out,
                        "  int_{} -> {}_{};",
                        page_id.as_u32(),
                        prefix,
                        child.as_u32()
                    )?;
                    self.draw_subtree(child, out)?;
                }
                Ok(())
            }
            other => Err(KarstError::IndexCorrupted(format!(
                "unexpected page type {:?} at page {}",
                other, page_id
            ))),
        }
    }

    /// Renders the tree as an indented string; `"()"` for an empty tree.
    pub fn draw_tree(&self) -> Result<String> {
        let root = self.get_root_page_id()?;
        if root == INVALID_PAGE_ID {
            return Ok("()".to_string());
        }
        let mut out = String::new();
        self.draw_tree_subtree(root, 0, &mut out)?;
        Ok(out)
    }

    fn draw_tree_subtree(&self, page_id: PageId, depth: usize, out: &mut String) -> Result<()> {
        use std::fmt::Write as _;

        let guard = self
            .bpm
            .fetch_page_read(page_id)?
            .ok_or(KarstError::PageNotFound(page_id))?;
        let indent = "  ".repeat(depth);

        match page_type(guard.data()) {
            BTreePageType::Leaf => {
                let leaf = LeafPageRef::<K, V>::new(guard.data());
                let keys: Vec<String> = (0..leaf.size())
                    .map(|i| format!("{:?}", leaf.key_at(i)))
                    .collect();
                let _ = writeln!(out, "{}({})", indent, keys.join(","));
                Ok(())
            }
            BTreePageType::Internal => {
                let node = InternalPageRef::<K>::new(guard.data());
                let keys: Vec<String> = (1..node.size())
                    .map(|i| format!("{:?}", node.key_at(i)))
                    .collect();
                let _ = writeln!(out, "{}[{}]", indent, keys.join(","));
                let children: Vec<PageId> = (0..node.size()).map(|i| node.child_at(i)).collect();
                drop(guard);
                for child in children {
                    self.draw_tree_subtree(child, depth + 1, out)?;
                }
                Ok(())
            }
            other => Err(KarstError::IndexCorrupted(format!(
                "unexpected page type {:?} at page {}",
                other, page_id
            ))),
        }
    }
}

impl<K, V, C> BPlusTree<K, V, C>
where
    K: Storable + From<u64>,
    V: Storable + From<u64>,
    C: KeyComparator<K>,
{
    /// Test fixture: inserts one key per line read from a file.
    pub fn insert_from_file(&self, file_name: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(file_name)?;
        for token in contents.split_whitespace() {
            if let Ok(key) = token.parse::<u64>() {
                self.insert(&K::from(key), &V::from(key))?;
            }
        }
        Ok(())
    }

    /// Test fixture: removes one key per line read from a file.
    pub fn remove_from_file(&self, file_name: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(file_name)?;
        for token in contents.split_whitespace() {
            if let Ok(key) = token.parse::<u64>() {
                self.remove(&K::from(key))?;
            }
        }
        Ok(())
    }

    /// Test fixture: applies `i <key>` / `d <key>` lines from a file.
    pub fn batch_ops_from_file(&self, file_name: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(file_name)?;
        let mut tokens = contents.split_whitespace();
        while let (Some(op), Some(key)) = (tokens.next(), tokens.next()) {
            let Ok(key) = key.parse::<u64>() else {
                continue;
            };
            match op {
                "i" => {
                    self.insert(&K::from(key), &V::from(key))?;
                }
                "d" => {
                    self.remove(&K::from(key))?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}
