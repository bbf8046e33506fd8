use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{KarstError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

type PageBuf = Box<[u8; PAGE_SIZE]>;

/// A disk I/O request processed by the scheduler's worker thread.
/// Requests own their page buffers; completion is reported through the
/// bundled reply channel.
enum DiskRequest {
    Read {
        page_id: PageId,
        reply: Sender<Result<PageBuf>>,
    },
    Write {
        page_id: PageId,
        data: PageBuf,
        reply: Sender<Result<()>>,
    },
}

/// DiskScheduler runs a background worker thread that drains a bounded
/// queue of disk I/O requests. The buffer pool uses the synchronous
/// wrappers, which enqueue a request and block on its reply.
pub struct DiskScheduler {
    /// The disk manager for actual I/O operations
    disk_manager: Arc<DiskManager>,
    /// Channel sender for queuing requests
    request_sender: Sender<DiskRequest>,
    /// Flag to signal shutdown
    shutdown: Arc<AtomicBool>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm_clone = Arc::clone(&disk_manager);
        let shutdown_clone = Arc::clone(&shutdown);

        let worker_handle = thread::spawn(move || {
            Self::worker_loop(dm_clone, receiver, shutdown_clone);
        });

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Schedules a read and waits for the page image.
    pub fn schedule_read_sync(&self, page_id: PageId) -> Result<PageBuf> {
        let (tx, rx) = bounded(1);
        self.request_sender
            .send(DiskRequest::Read { page_id, reply: tx })
            .map_err(|e| KarstError::DiskScheduler(format!("failed to schedule read: {}", e)))?;

        rx.recv()
            .map_err(|e| KarstError::DiskScheduler(format!("read reply lost: {}", e)))?
    }

    /// Schedules a write of the given page image and waits for completion.
    pub fn schedule_write_sync(&self, page_id: PageId, data: PageBuf) -> Result<()> {
        let (tx, rx) = bounded(1);
        self.request_sender
            .send(DiskRequest::Write {
                page_id,
                data,
                reply: tx,
            })
            .map_err(|e| KarstError::DiskScheduler(format!("failed to schedule write: {}", e)))?;

        rx.recv()
            .map_err(|e| KarstError::DiskScheduler(format!("write reply lost: {}", e)))?
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Worker thread body: processes requests until shutdown, draining
    /// anything still queued.
    fn worker_loop(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                while let Ok(request) = receiver.try_recv() {
                    Self::process_request(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(request) => {
                    Self::process_request(&disk_manager, request);
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    // Re-check the shutdown flag
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    break;
                }
            }
        }
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        match request {
            DiskRequest::Read { page_id, reply } => {
                let mut data: PageBuf = Box::new([0u8; PAGE_SIZE]);
                let result = disk_manager.read_page(page_id, &mut data[..]).map(|_| data);
                let _ = reply.send(result);
            }
            DiskRequest::Write {
                page_id,
                data,
                reply,
            } => {
                let _ = reply.send(disk_manager.write_page(page_id, &data[..]));
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_scheduler_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id = PageId::new(0);

        let mut write_data: PageBuf = Box::new([0u8; PAGE_SIZE]);
        write_data[0] = 42;
        write_data[100] = 255;
        scheduler.schedule_write_sync(page_id, write_data).unwrap();

        let read_data = scheduler.schedule_read_sync(page_id).unwrap();
        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
    }

    #[test]
    fn test_disk_scheduler_multiple_requests() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id1 = PageId::new(0);
        let page_id2 = PageId::new(1);

        scheduler
            .schedule_write_sync(page_id1, Box::new([1u8; PAGE_SIZE]))
            .unwrap();
        scheduler
            .schedule_write_sync(page_id2, Box::new([2u8; PAGE_SIZE]))
            .unwrap();

        let read1 = scheduler.schedule_read_sync(page_id1).unwrap();
        let read2 = scheduler.schedule_read_sync(page_id2).unwrap();

        assert_eq!(read1[0], 1);
        assert_eq!(read2[0], 2);
    }
}
