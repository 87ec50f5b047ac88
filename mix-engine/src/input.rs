use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::{
    codec::CodecType,
    error::{MixError, Result},
};

/// Size of the length prefix written ahead of VP8 units.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Bounded byte ring feeding one decoder.
///
/// Producers push whole units with [`InputChannel::push`]; the decoder side drains
/// with [`InputChannel::read`] or [`InputChannel::read_unit`]. A push that does not
/// fit is rejected as a whole, the channel never grows and never blocks.
pub struct InputChannel {
    codec: CodecType,
    ring: Mutex<Ring>,
}

impl InputChannel {
    pub fn new(codec: CodecType, capacity: usize) -> Self {
        Self {
            codec,
            ring: Mutex::new(Ring::new(capacity)),
        }
    }

    pub fn codec(&self) -> CodecType {
        self.codec
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn free_space(&self) -> usize {
        self.lock().free()
    }

    pub fn len(&self) -> usize {
        self.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes one unit and advances the write position.
    /// Returns the number of bytes consumed from the ring, prefix included.
    pub fn push(&self, data: &[u8]) -> Result<usize> {
        let prefix = if self.codec.is_length_prefixed() {
            LENGTH_PREFIX_SIZE
        } else {
            0
        };
        let needed = data.len() + prefix;

        let mut ring = self.lock();
        let free = ring.free();
        if needed > free {
            return Err(MixError::BufferFull { needed, free });
        }
        if needed == 0 {
            return Ok(0);
        }

        if prefix > 0 {
            let len = u32::try_from(data.len()).map_err(|_| MixError::BufferFull { needed, free })?;
            ring.write(&len.to_le_bytes());
        }
        ring.write(data);
        Ok(needed)
    }

    /// Raw drain of up to `out.len()` bytes, prefixes included.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let mut ring = self.lock();
        let n = ring.peek(out);
        ring.advance(n);
        n
    }

    /// Takes the next decodable unit. Length-prefixed codecs yield exactly one
    /// pushed payload; other codecs yield everything buffered so far.
    pub fn read_unit(&self) -> Option<Bytes> {
        let mut ring = self.lock();
        if ring.len == 0 {
            return None;
        }

        if !self.codec.is_length_prefixed() {
            let mut unit = vec![0u8; ring.len];
            let n = ring.peek(&mut unit);
            ring.advance(n);
            return Some(Bytes::from(unit));
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        if ring.peek(&mut prefix) < LENGTH_PREFIX_SIZE {
            return None;
        }
        let unit_len = u32::from_le_bytes(prefix) as usize;
        if ring.len < LENGTH_PREFIX_SIZE + unit_len {
            return None;
        }
        ring.advance(LENGTH_PREFIX_SIZE);
        let mut unit = vec![0u8; unit_len];
        let n = ring.peek(&mut unit);
        ring.advance(n);
        Some(Bytes::from(unit))
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Ring {
    buf: Box<[u8]>,
    read: usize,
    len: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            read: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn free(&self) -> usize {
        self.capacity() - self.len
    }

    // caller checks free space
    fn write(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let cap = self.capacity();
        let start = (self.read + self.len) % cap;
        let first = data.len().min(cap - start);
        self.buf[start..start + first].copy_from_slice(&data[..first]);
        self.buf[..data.len() - first].copy_from_slice(&data[first..]);
        self.len += data.len();
    }

    fn peek(&self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len);
        if n == 0 {
            return 0;
        }
        let cap = self.capacity();
        let first = n.min(cap - self.read);
        out[..first].copy_from_slice(&self.buf[self.read..self.read + first]);
        out[first..n].copy_from_slice(&self.buf[..n - first]);
        n
    }

    fn advance(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.read = (self.read + n) % self.capacity();
        self.len -= n;
    }
}
