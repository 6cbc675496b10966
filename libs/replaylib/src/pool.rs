//! Pool of raw-frame byte buffers
//!
//! The capture path copies one uncompressed frame per producer call; at
//! 60 FPS of BGRA pixels that is tens of megabytes per second of scratch
//! space. Renting buffers from a capped free-list keeps the hot path free
//! of per-frame heap allocations after warmup.

use parking_lot::Mutex;

/// Fixed-size pool of raw-frame buffers.
///
/// Buffers are exactly `frame_size` bytes. `rent` never blocks on an
/// allocation while the free-list lock is held; when the pool is empty the
/// lock is released first and the allocation happens outside it.
pub struct FramePool {
    frame_size: usize,
    max_pooled: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl FramePool {
    /// Create an empty pool for buffers of `frame_size` bytes, retaining at
    /// most `max_pooled` buffers.
    pub fn new(frame_size: usize, max_pooled: usize) -> Self {
        tracing::debug!(
            frame_size,
            max_pooled,
            cap_mb = (frame_size * max_pooled) as f64 / (1024.0 * 1024.0),
            "creating frame pool"
        );
        Self {
            frame_size,
            max_pooled,
            free: Mutex::new(Vec::with_capacity(max_pooled)),
        }
    }

    /// Take a buffer of exactly `frame_size` bytes, reusing a pooled one
    /// when available.
    pub fn rent(&self) -> Vec<u8> {
        let pooled = self.free.lock().pop();
        match pooled {
            Some(buf) => buf,
            // Allocate outside the lock so producers never wait on it.
            None => vec![0u8; self.frame_size],
        }
    }

    /// Return a buffer to the pool. Wrong-sized buffers and overflow beyond
    /// `max_pooled` are simply dropped.
    pub fn release(&self, buf: Vec<u8>) {
        if buf.len() != self.frame_size {
            tracing::trace!(len = buf.len(), "dropping wrong-sized pool buffer");
            return;
        }
        let mut free = self.free.lock();
        if free.len() < self.max_pooled {
            free.push(buf);
        }
    }

    /// Pre-allocate up to `min(n, max_pooled)` buffers.
    pub fn prewarm(&self, n: usize) {
        let target = n.min(self.max_pooled);
        let missing = target.saturating_sub(self.free.lock().len());
        // Allocate outside the lock, publish afterwards.
        let mut fresh: Vec<Vec<u8>> = (0..missing).map(|_| vec![0u8; self.frame_size]).collect();
        let mut free = self.free.lock();
        while free.len() < target {
            match fresh.pop() {
                Some(buf) => free.push(buf),
                None => break,
            }
        }
    }

    /// Buffer size this pool vends.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Number of buffers currently pooled.
    pub fn pooled(&self) -> usize {
        self.free.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_rent_allocates_exact_size() {
        let pool = FramePool::new(1024, 4);
        let buf = pool.rent();
        assert_eq!(buf.len(), 1024);
        assert_eq!(pool.pooled(), 0);
    }

    #[test]
    fn test_release_and_reuse() {
        let pool = FramePool::new(64, 2);
        let buf = pool.rent();
        pool.release(buf);
        assert_eq!(pool.pooled(), 1);

        let again = pool.rent();
        assert_eq!(again.len(), 64);
        assert_eq!(pool.pooled(), 0);
    }

    #[test]
    fn test_release_caps_at_max() {
        let pool = FramePool::new(16, 2);
        for _ in 0..5 {
            pool.release(vec![0u8; 16]);
        }
        assert_eq!(pool.pooled(), 2);
    }

    #[test]
    fn test_release_drops_wrong_size() {
        let pool = FramePool::new(16, 4);
        pool.release(vec![0u8; 15]);
        pool.release(vec![0u8; 17]);
        assert_eq!(pool.pooled(), 0);
    }

    #[test]
    fn test_prewarm_respects_cap() {
        let pool = FramePool::new(32, 3);
        pool.prewarm(10);
        assert_eq!(pool.pooled(), 3);
    }

    #[test]
    fn test_concurrent_rent_release() {
        let pool = Arc::new(FramePool::new(256, 8));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    let buf = pool.rent();
                    assert_eq!(buf.len(), 256);
                    pool.release(buf);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
        assert!(pool.pooled() <= 8);
    }
}
