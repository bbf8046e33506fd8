use std::collections::{HashMap, LinkedList};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, INVALID_PAGE_ID};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::page_guard::ReleaseCallback;
use super::{BasicPageGuard, FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Bookkeeping protected by the pool's single mutex.
struct PoolTables {
    /// Maps page IDs to the frames holding them
    page_table: HashMap<PageId, FrameId>,
    /// Frames that are not currently holding any page
    free_list: LinkedList<FrameId>,
    /// Monotonic page id allocator
    next_page_id: u32,
}

/// State shared with guard release callbacks.
struct PoolState {
    /// The buffer pool frames
    frames: Vec<Arc<FrameHeader>>,
    tables: Mutex<PoolTables>,
    /// LRU-K replacer for eviction decisions; it has its own mutex but is
    /// only entered while the pool's mutex is held
    replacer: LruKReplacer,
}

impl PoolState {
    /// Unpin path shared by `unpin_page` and guard release callbacks.
    fn unpin(&self, page_id: PageId, is_dirty: bool) -> bool {
        if page_id == INVALID_PAGE_ID {
            return false;
        }
        let tables = self.tables.lock();
        let Some(&frame_id) = tables.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];
        match frame.unpin(is_dirty) {
            None => false,
            Some(remaining) => {
                if remaining == 0 {
                    self.replacer.set_evictable(frame_id, true);
                }
                true
            }
        }
    }
}

/// BufferPoolManager caches disk-resident pages in a fixed set of frames.
/// Pages are pinned while in use; unpinned pages become candidates for
/// LRU-K eviction, with dirty pages written back before their frame is
/// reused.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// Shared state
    state: Arc<PoolState>,
    /// Disk scheduler for page I/O
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size, k value
    /// for LRU-K, and disk manager. Page id allocation continues from the
    /// disk manager's current page count.
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = LinkedList::new();

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let next_page_id = disk_manager.num_pages();

        let state = Arc::new(PoolState {
            frames,
            tables: Mutex::new(PoolTables {
                page_table: HashMap::new(),
                free_list,
                next_page_id,
            }),
            replacer: LruKReplacer::new(k, pool_size),
        });

        Self {
            pool_size,
            state,
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a fresh zeroed page and pins it (`pin_count = 1`).
    /// Returns `Ok(None)` when every frame is pinned. The caller owns the
    /// pin and must release it with `unpin_page` (or wrap the page in a
    /// guard via `new_page_guarded`).
    pub fn new_page(&self) -> Result<Option<PageId>> {
        let mut tables = self.state.tables.lock();
        let Some(frame_id) = self.acquire_frame(&mut tables)? else {
            return Ok(None);
        };

        let page_id = PageId::new(tables.next_page_id);
        tables.next_page_id += 1;

        let frame = &self.state.frames[frame_id.as_usize()];
        frame.set_page_id(page_id);
        frame.pin();

        tables.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(Some(page_id))
    }

    /// Allocates a fresh page and wraps its pin in a guard.
    pub fn new_page_guarded(&self) -> Result<Option<BasicPageGuard>> {
        let Some(page_id) = self.new_page()? else {
            return Ok(None);
        };
        let frame_id = {
            let tables = self.state.tables.lock();
            tables.page_table[&page_id]
        };
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(Some(BasicPageGuard::new(
            page_id,
            frame,
            self.release_callback(),
        )))
    }

    /// Fetches a page, pinning it, without acquiring its latch.
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<Option<BasicPageGuard>> {
        let Some(frame_id) = self.fetch_frame(page_id)? else {
            return Ok(None);
        };
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(Some(BasicPageGuard::new(
            page_id,
            frame,
            self.release_callback(),
        )))
    }

    /// Fetches a page for shared access. The returned guard holds the
    /// page latch in read mode until dropped.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<Option<ReadPageGuard>> {
        let Some(frame_id) = self.fetch_frame(page_id)? else {
            return Ok(None);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        Ok(Some(ReadPageGuard::new(
            page_id,
            frame,
            self.release_callback(),
        )))
    }

    /// Fetches a page for exclusive access. The returned guard holds the
    /// page latch in write mode until dropped.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<Option<WritePageGuard>> {
        let Some(frame_id) = self.fetch_frame(page_id)? else {
            return Ok(None);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        Ok(Some(WritePageGuard::new(
            page_id,
            frame,
            self.release_callback(),
        )))
    }

    /// Releases one pin on a page, OR-ing in the dirty flag. Returns
    /// false if the page is not resident or its pin count is already 0.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.state.unpin(page_id, is_dirty)
    }

    /// Writes a page to disk and clears its dirty flag. An explicit flush
    /// writes even when the page is clean. Returns false for
    /// non-resident pages.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let tables = self.state.tables.lock();
        let Some(&frame_id) = tables.page_table.get(&page_id) else {
            return Ok(false);
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        self.disk_scheduler
            .schedule_write_sync(page_id, frame.snapshot())?;
        frame.set_dirty(false);

        Ok(true)
    }

    /// Flushes every resident page to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let tables = self.state.tables.lock();

        for (&page_id, &frame_id) in tables.page_table.iter() {
            let frame = &self.state.frames[frame_id.as_usize()];
            self.disk_scheduler
                .schedule_write_sync(page_id, frame.snapshot())?;
            frame.set_dirty(false);
        }

        Ok(())
    }

    /// Deletes a page from the buffer pool and deallocates it on disk.
    /// A page that is not resident counts as already deleted. Returns
    /// false if the page is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let mut tables = self.state.tables.lock();
        let Some(&frame_id) = tables.page_table.get(&page_id) else {
            return Ok(true);
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Ok(false);
        }

        if frame.is_dirty() {
            self.disk_scheduler
                .schedule_write_sync(page_id, frame.snapshot())?;
        }

        self.state.replacer.remove(frame_id);
        tables.page_table.remove(&page_id);
        frame.reset();
        tables.free_list.push_back(frame_id);

        self.disk_scheduler.disk_manager().deallocate_page(page_id);

        Ok(true)
    }

    /// Returns the pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let tables = self.state.tables.lock();
        tables
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    /// Returns the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.state.tables.lock().free_list.len()
    }

    fn release_callback(&self) -> ReleaseCallback {
        let state = Arc::clone(&self.state);
        Box::new(move |page_id, is_dirty| {
            state.unpin(page_id, is_dirty);
        })
    }

    /// Brings a page into the pool and pins it, reading it from disk if
    /// it is not resident. Returns `Ok(None)` for the invalid page id or
    /// when no frame can be freed.
    fn fetch_frame(&self, page_id: PageId) -> Result<Option<FrameId>> {
        if page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let mut tables = self.state.tables.lock();

        if let Some(&frame_id) = tables.page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.pin();
            self.state.replacer.record_access(frame_id);
            self.state.replacer.set_evictable(frame_id, false);
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.acquire_frame(&mut tables)? else {
            return Ok(None);
        };

        let data = self.disk_scheduler.schedule_read_sync(page_id)?;
        let frame = &self.state.frames[frame_id.as_usize()];
        frame.load_image(&data[..]);
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();

        tables.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(Some(frame_id))
    }

    /// Obtains a reusable frame from the free list, or by evicting an
    /// unpinned page (writing it back first if dirty). Returns `Ok(None)`
    /// when every frame is pinned.
    fn acquire_frame(&self, tables: &mut PoolTables) -> Result<Option<FrameId>> {
        if let Some(frame_id) = tables.free_list.pop_front() {
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.state.replacer.evict() else {
            return Ok(None);
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            log::debug!("evicting dirty page {} from frame {}", old_page_id, frame_id);
            self.disk_scheduler
                .schedule_write_sync(old_page_id, frame.snapshot())?;
        }

        tables.page_table.remove(&old_page_id);
        frame.reset();

        Ok(Some(frame_id))
    }
}
