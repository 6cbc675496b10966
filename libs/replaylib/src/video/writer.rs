//! Disk-writer worker
//!
//! Evictions from the memory tier are handed to a dedicated thread through
//! a bounded channel so the producer never blocks on file I/O. The queue
//! drops the newest eviction when full: losing one frame is always
//! preferable to stalling the capture cadence. Write failures are logged
//! and the frame dropped; the memory tier stays authoritative for recent
//! content.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;

use crate::video::disk::DiskTier;

/// Evictions buffered ahead of the writer before drop-newest kicks in.
const QUEUE_SLOTS: usize = 256;

/// One frame evicted from the memory tier, ownership moved to the writer.
pub(crate) struct EvictedFrame {
    pub ticks: i64,
    pub original_index: i32,
    pub blob: Vec<u8>,
}

enum WriterMsg {
    Evicted(EvictedFrame),
    /// Drain marker: acked once every message queued before it has been
    /// applied to the disk tier.
    Flush(Sender<()>),
}

/// Handle to the disk-writer thread. Dropping it drains the queue and joins
/// the worker.
pub(crate) struct DiskWriter {
    tx: Option<Sender<WriterMsg>>,
    handle: Option<JoinHandle<()>>,
}

impl DiskWriter {
    pub fn spawn(disk: Arc<Mutex<DiskTier>>) -> Self {
        let (tx, rx) = bounded::<WriterMsg>(QUEUE_SLOTS);

        let handle = std::thread::Builder::new()
            .name("replay-disk-writer".into())
            .spawn(move || {
                for msg in rx {
                    match msg {
                        WriterMsg::Evicted(frame) => {
                            let mut tier = disk.lock();
                            if let Err(e) =
                                tier.write(frame.ticks, frame.original_index, &frame.blob)
                            {
                                tracing::warn!(
                                    error = %e,
                                    ticks = frame.ticks,
                                    "disk tier write failed, frame dropped"
                                );
                            }
                        }
                        WriterMsg::Flush(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
            })
            .expect("failed to spawn disk writer thread");

        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Queue an evicted frame without blocking; drops it when the writer is
    /// too far behind.
    pub fn enqueue(&self, frame: EvictedFrame) {
        let tx = self.tx.as_ref().expect("writer already shut down");
        if let Err(TrySendError::Full(_)) = tx.try_send(WriterMsg::Evicted(frame)) {
            tracing::warn!("disk writer queue full, dropping evicted frame");
        }
    }

    /// Block until every previously queued eviction has reached the disk
    /// tier.
    pub fn flush(&self) {
        let tx = self.tx.as_ref().expect("writer already shut down");
        let (ack_tx, ack_rx) = bounded(1);
        // The queue is FIFO, so the ack implies everything ahead of it
        // landed. A full queue makes this send block until the writer
        // catches up, which is exactly the semantics flush wants.
        if tx.send(WriterMsg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for DiskWriter {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop after the backlog.
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::disk::METADATA_BYTES;

    fn tier(capacity: usize) -> (tempfile::TempDir, Arc<Mutex<DiskTier>>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool.bin");
        let tier = DiskTier::create(&path, capacity, METADATA_BYTES + 64).unwrap();
        (dir, Arc::new(Mutex::new(tier)))
    }

    #[test]
    fn test_enqueue_then_flush_lands_frames() {
        let (_dir, disk) = tier(8);
        let writer = DiskWriter::spawn(Arc::clone(&disk));

        for i in 0..5i64 {
            writer.enqueue(EvictedFrame {
                ticks: i,
                original_index: i as i32,
                blob: vec![i as u8; 16],
            });
        }
        writer.flush();

        let tier = disk.lock();
        assert_eq!(tier.count(), 5);
        let ticks: Vec<_> = tier.oldest_first().map(|(m, _)| m.ticks).collect();
        assert_eq!(ticks, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_drop_drains_backlog() {
        let (_dir, disk) = tier(4);
        {
            let writer = DiskWriter::spawn(Arc::clone(&disk));
            writer.enqueue(EvictedFrame {
                ticks: 7,
                original_index: 0,
                blob: vec![1, 2, 3],
            });
        }
        assert_eq!(disk.lock().count(), 1);
    }

    #[test]
    fn test_oversized_blob_is_dropped_not_fatal() {
        let (_dir, disk) = tier(2);
        let writer = DiskWriter::spawn(Arc::clone(&disk));

        writer.enqueue(EvictedFrame {
            ticks: 1,
            original_index: 0,
            blob: vec![0u8; 1024], // exceeds the 64-byte payload
        });
        writer.enqueue(EvictedFrame {
            ticks: 2,
            original_index: 1,
            blob: vec![0u8; 8],
        });
        writer.flush();

        let tier = disk.lock();
        assert_eq!(tier.count(), 1);
        assert_eq!(tier.oldest_first().next().unwrap().0.ticks, 2);
    }
}
