use std::sync::Arc;

use lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawRwLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// In-memory image of one disk page.
pub type PageImage = Box<[u8; PAGE_SIZE]>;

/// Owned guards on a frame's page image. Owning the lock handle (rather
/// than borrowing the frame) lets page guards carry a held latch around
/// without tying their lifetime to a frame reference.
pub(crate) type SharedImage = ArcRwLockReadGuard<RawRwLock, PageImage>;
pub(crate) type ExclusiveImage = ArcRwLockWriteGuard<RawRwLock, PageImage>;

/// Bookkeeping the pool consults when deciding whether a frame may be
/// reused. Only ever touched under the pool's latch protocol, so one
/// small mutex covers all three fields.
#[derive(Debug)]
struct FrameMeta {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

/// One slot of the buffer pool: a page image behind the frame's
/// reader-writer latch, plus the metadata that governs eviction.
///
/// Pins and the latch are independent: the pin count keeps the frame
/// resident, the latch orders access to the image bytes.
pub struct FrameHeader {
    /// The frame ID (index in the buffer pool)
    frame_id: FrameId,
    meta: Mutex<FrameMeta>,
    image: Arc<RwLock<PageImage>>,
}

impl FrameHeader {
    /// Creates an empty frame slot.
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            meta: Mutex::new(FrameMeta {
                page_id: INVALID_PAGE_ID,
                pin_count: 0,
                is_dirty: false,
            }),
            image: Arc::new(RwLock::new(Box::new([0u8; PAGE_SIZE]))),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the page currently held, or `INVALID_PAGE_ID`.
    pub fn page_id(&self) -> PageId {
        self.meta.lock().page_id
    }

    pub fn set_page_id(&self, page_id: PageId) {
        self.meta.lock().page_id = page_id;
    }

    pub fn pin_count(&self) -> u32 {
        self.meta.lock().pin_count
    }

    /// Takes one pin and returns the new count.
    pub fn pin(&self) -> u32 {
        let mut meta = self.meta.lock();
        meta.pin_count += 1;
        meta.pin_count
    }

    /// Returns one pin, OR-ing `dirty` into the frame's dirty flag.
    /// Yields the remaining count, or None when there was no pin to
    /// return (and the dirty flag stays untouched).
    pub fn unpin(&self, dirty: bool) -> Option<u32> {
        let mut meta = self.meta.lock();
        if meta.pin_count == 0 {
            return None;
        }
        meta.pin_count -= 1;
        meta.is_dirty |= dirty;
        Some(meta.pin_count)
    }

    pub fn is_dirty(&self) -> bool {
        self.meta.lock().is_dirty
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.meta.lock().is_dirty = dirty;
    }

    /// Takes the frame latch shared, as an owned guard.
    pub(crate) fn latch_shared(&self) -> SharedImage {
        self.image.read_arc()
    }

    /// Takes the frame latch exclusive, as an owned guard.
    pub(crate) fn latch_exclusive(&self) -> ExclusiveImage {
        self.image.write_arc()
    }

    /// Briefly latches the image shared for in-place reads.
    pub fn read_data(&self) -> RwLockReadGuard<'_, PageImage> {
        self.image.read()
    }

    /// Briefly latches the image exclusive for in-place writes.
    pub fn write_data(&self) -> RwLockWriteGuard<'_, PageImage> {
        self.image.write()
    }

    /// Overwrites the image with bytes read from disk.
    pub fn load_image(&self, bytes: &[u8]) {
        assert_eq!(bytes.len(), PAGE_SIZE);
        self.image.write().copy_from_slice(bytes);
    }

    /// Returns an owned copy of the image, e.g. for write-back.
    pub fn snapshot(&self) -> PageImage {
        (*self.image.read()).clone()
    }

    /// Returns the slot to its empty state.
    pub fn reset(&self) {
        let mut meta = self.meta.lock();
        meta.page_id = INVALID_PAGE_ID;
        meta.pin_count = 0;
        meta.is_dirty = false;
        drop(meta);
        self.image.write().fill(0);
    }
}
