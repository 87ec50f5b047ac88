use std::{
    collections::VecDeque,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;

/// Bounded queue of encoded blocks filled by one encoder and drained by one consumer.
pub struct OutputStream {
    block_size: usize,
    capacity: usize,
    blocks: Mutex<VecDeque<Bytes>>,
    dropped: AtomicU64,
}

impl OutputStream {
    pub fn new(block_size: usize, capacity: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            capacity,
            blocks: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn block_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.block_count() == 0
    }

    /// Blocks refused because the queue was full.
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Encoder side. Splits `data` into blocks of at most `block_size` bytes and
    /// queues them all, or none of them when the queue lacks room.
    /// Returns the number of blocks queued.
    pub fn write(&self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }
        let count = data.len().div_ceil(self.block_size);
        let mut blocks = self.lock();
        if blocks.len() + count > self.capacity {
            self.dropped.fetch_add(count as u64, Ordering::Relaxed);
            log::trace!("output stream full, dropped {} blocks", count);
            return 0;
        }
        for chunk in data.chunks(self.block_size) {
            blocks.push_back(Bytes::copy_from_slice(chunk));
        }
        count
    }

    /// Takes one block, if any.
    pub fn pull(&self) -> Option<Bytes> {
        self.lock().pop_front()
    }

    /// Copies one block into `buf` and returns its length, 0 when the queue is
    /// empty. A block longer than `buf` stays queued and 0 is returned.
    pub fn pull_into(&self, buf: &mut [u8]) -> usize {
        let mut blocks = self.lock();
        let Some(front) = blocks.front() else {
            return 0;
        };
        if front.len() > buf.len() {
            log::warn!(
                "pull buffer too small: block {} bytes, buffer {} bytes",
                front.len(),
                buf.len()
            );
            return 0;
        }
        let n = front.len();
        buf[..n].copy_from_slice(front);
        blocks.pop_front();
        n
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Bytes>> {
        self.blocks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_from_empty_stream_returns_zero() {
        let stream = OutputStream::new(16, 4);
        let mut buf = [0u8; 16];
        assert_eq!(stream.pull_into(&mut buf), 0);
        assert!(stream.pull().is_none());
    }

    #[test]
    fn test_pull_takes_one_block_at_a_time() {
        let stream = OutputStream::new(4, 8);
        assert_eq!(stream.write(b"abcdefghij"), 3);
        assert_eq!(stream.block_count(), 3);

        let mut buf = [0u8; 4];
        assert_eq!(stream.pull_into(&mut buf), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(stream.block_count(), 2);
        assert_eq!(stream.pull().as_deref(), Some(&b"efgh"[..]));
        assert_eq!(stream.pull().as_deref(), Some(&b"ij"[..]));
        assert!(stream.is_empty());
    }

    #[test]
    fn test_write_that_overruns_is_dropped_whole() {
        let stream = OutputStream::new(4, 2);
        assert_eq!(stream.write(b"abcd"), 1);
        assert_eq!(stream.write(b"efghijkl"), 0);
        assert_eq!(stream.block_count(), 1);
        assert_eq!(stream.dropped_blocks(), 2);
        assert_eq!(stream.write(b"mn"), 1);
        assert_eq!(stream.block_count(), 2);
    }

    #[test]
    fn test_short_buffer_leaves_block_queued() {
        let stream = OutputStream::new(8, 2);
        stream.write(b"12345678");
        let mut small = [0u8; 4];
        assert_eq!(stream.pull_into(&mut small), 0);
        assert_eq!(stream.block_count(), 1);
    }
}
