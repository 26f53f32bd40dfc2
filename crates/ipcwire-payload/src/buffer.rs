use bytes::BytesMut;

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Append-only byte storage for an outgoing message body.
///
/// Bytes are only ever added at the end; nothing already written is moved
/// or overwritten by later writes.
#[derive(Debug, Default)]
pub struct ByteBuffer {
    buf: BytesMut,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Commit `size` zeroed bytes at the end and return them for writing.
    ///
    /// Capacity at least doubles whenever it has to grow, so a run of small
    /// reserves reallocates a logarithmic number of times.
    pub fn reserve(&mut self, size: usize) -> &mut [u8] {
        let start = self.buf.len();
        if self.buf.capacity() - start < size {
            self.buf.reserve(size.max(self.buf.capacity()));
        }
        self.buf.resize(start + size, 0);
        &mut self.buf[start..]
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len()).copy_from_slice(bytes);
    }

    /// Everything written so far.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }
}
