use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;

use super::frame_header::{ExclusiveImage, FrameHeader, PageImage, SharedImage};

/// Callback used by guards to hand their pin back to the pool.
pub(crate) type ReleaseCallback = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// A pin held on behalf of a guard. Reports itself back to the pool
/// exactly once, on drop, together with whether the holder wrote to the
/// page.
struct PagePin {
    page_id: PageId,
    wrote: bool,
    on_release: Option<ReleaseCallback>,
}

impl PagePin {
    fn new(page_id: PageId, on_release: ReleaseCallback) -> Self {
        Self {
            page_id,
            wrote: false,
            on_release: Some(on_release),
        }
    }
}

impl Drop for PagePin {
    fn drop(&mut self) {
        if let Some(release) = self.on_release.take() {
            release(self.page_id, self.wrote);
        }
    }
}

/// RAII guard holding a pin on a page without any latch.
/// Useful for operations that manage page access themselves;
/// the pin alone keeps the frame from being evicted.
pub struct BasicPageGuard {
    frame: Arc<FrameHeader>,
    pin: PagePin,
}

impl BasicPageGuard {
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        on_release: ReleaseCallback,
    ) -> Self {
        Self {
            frame,
            pin: PagePin::new(page_id, on_release),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    /// Briefly latches the page shared and returns a guard on its bytes.
    pub fn read(&self) -> RwLockReadGuard<'_, PageImage> {
        self.frame.read_data()
    }

    /// Briefly latches the page exclusive and returns a mutable guard on
    /// its bytes. Marks the page dirty.
    pub fn write(&mut self) -> RwLockWriteGuard<'_, PageImage> {
        self.pin.wrote = true;
        self.frame.write_data()
    }

    /// Drops this guard, releasing the pin.
    pub fn drop_guard(self) {
        drop(self);
    }
}

/// RAII guard for shared access to a page. The read latch is taken when
/// the guard is built and held until it goes away, so readers can rely
/// on the bytes staying put for the guard's whole lifetime.
pub struct ReadPageGuard {
    // Field order is load-bearing: the latch must come back before the
    // pin does, so the frame only becomes evictable once no reader is
    // left on it.
    image: SharedImage,
    pin: PagePin,
}

impl ReadPageGuard {
    pub(crate) fn new(page_id: PageId, frame: &FrameHeader, on_release: ReleaseCallback) -> Self {
        Self {
            image: frame.latch_shared(),
            pin: PagePin::new(page_id, on_release),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        &self.image[..]
    }

    /// Drops this guard, releasing the latch and the pin.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

/// RAII guard for exclusive access to a page. Holds the write latch for
/// its whole lifetime and remembers whether the page bytes were touched,
/// reporting that to the pool when the pin is returned.
pub struct WritePageGuard {
    // Same ordering constraint as ReadPageGuard.
    image: ExclusiveImage,
    pin: PagePin,
}

impl WritePageGuard {
    pub(crate) fn new(page_id: PageId, frame: &FrameHeader, on_release: ReleaseCallback) -> Self {
        Self {
            image: frame.latch_exclusive(),
            pin: PagePin::new(page_id, on_release),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        &self.image[..]
    }

    /// Returns a mutable reference to the page data and marks it dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.pin.wrote = true;
        &mut self.image[..]
    }

    /// Drops this guard, releasing the latch and the pin.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{FrameId, PAGE_SIZE};
    use parking_lot::Mutex;

    /// Returns a callback that records the (page_id, wrote) pair it was
    /// invoked with, plus a handle to read the recording back.
    fn recording_callback() -> (ReleaseCallback, Arc<Mutex<Option<(PageId, bool)>>>) {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let callback: ReleaseCallback = Box::new(move |page_id, wrote| {
            *sink.lock() = Some((page_id, wrote));
        });
        (callback, seen)
    }

    #[test]
    fn test_read_guard_releases_clean() {
        let frame = FrameHeader::new(FrameId::new(0));
        frame.write_data()[0] = 7;

        let (callback, seen) = recording_callback();
        let guard = ReadPageGuard::new(PageId::new(4), &frame, callback);

        assert_eq!(guard.page_id(), PageId::new(4));
        assert_eq!(guard.data()[0], 7);
        assert!(seen.lock().is_none());

        drop(guard);
        assert_eq!(*seen.lock(), Some((PageId::new(4), false)));
    }

    #[test]
    fn test_write_guard_reports_written_pages() {
        let frame = FrameHeader::new(FrameId::new(0));

        let (callback, seen) = recording_callback();
        let mut guard = WritePageGuard::new(PageId::new(9), &frame, callback);
        guard.data_mut()[100] = 42;
        drop(guard);

        assert_eq!(*seen.lock(), Some((PageId::new(9), true)));
        assert_eq!(frame.snapshot()[100], 42);
    }

    #[test]
    fn test_write_guard_untouched_stays_clean() {
        let frame = FrameHeader::new(FrameId::new(0));

        let (callback, seen) = recording_callback();
        let guard = WritePageGuard::new(PageId::new(2), &frame, callback);
        assert_eq!(guard.data().len(), PAGE_SIZE);
        drop(guard);

        assert_eq!(*seen.lock(), Some((PageId::new(2), false)));
    }

    #[test]
    fn test_guards_return_the_latch() {
        let frame = FrameHeader::new(FrameId::new(0));

        let (callback, _seen) = recording_callback();
        let mut guard = WritePageGuard::new(PageId::new(1), &frame, callback);
        guard.data_mut()[0] = 1;
        drop(guard);

        // The write latch must be free again, or these would block.
        let (callback, _seen) = recording_callback();
        let reader = ReadPageGuard::new(PageId::new(1), &frame, callback);
        assert_eq!(reader[0], 1);
        drop(reader);
        frame.write_data()[0] = 2;
    }

    #[test]
    fn test_basic_guard_pins_without_latching() {
        let frame = Arc::new(FrameHeader::new(FrameId::new(0)));

        let (callback, seen) = recording_callback();
        let mut guard = BasicPageGuard::new(PageId::new(7), Arc::clone(&frame), callback);

        guard.write()[10] = 9;
        assert_eq!(guard.read()[10], 9);

        guard.drop_guard();
        assert_eq!(*seen.lock(), Some((PageId::new(7), true)));
    }
}
