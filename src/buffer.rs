//! Append-and-consume byte store with a read cursor.
//!
//! One `ByteBuffer` backs request body ingress and another backs response
//! egress; each is owned by exactly one connection, so there is no internal
//! synchronisation.

/// A contiguous, growable byte store with separate append and read positions.
///
/// Bytes enter at the tail via [`append`](ByteBuffer::append) and leave in
/// FIFO order via [`fill_into`](ByteBuffer::fill_into) /
/// [`fill_into_vec`](ByteBuffer::fill_into_vec), which advance an internal
/// read cursor. [`reset`](ByteBuffer::reset) discards everything;
/// [`rewind`](ByteBuffer::rewind) moves the cursor back to the start while
/// keeping the content.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
    read_pos: usize,
}

impl ByteBuffer {
    #[inline]
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            read_pos: 0,
        }
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Total number of bytes currently stored, read or not.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// True when every stored byte has been consumed.
    #[inline]
    pub fn is_drained(&self) -> bool {
        self.read_pos >= self.data.len()
    }

    /// Copies `bytes` to the tail. Amortised O(1); growth never disturbs
    /// unread content.
    #[inline]
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Copies up to `dst.len()` unread bytes into `dst`, advances the read
    /// cursor by the copied amount and returns it. Returns 0 iff drained.
    pub fn fill_into(&mut self, dst: &mut [u8]) -> usize {
        let available = &self.data[self.read_pos..];
        let n = available.len().min(dst.len());
        dst[..n].copy_from_slice(&available[..n]);
        self.read_pos += n;
        n
    }

    /// Appends every unread byte to `dst`, advances the cursor past them and
    /// returns how many were copied.
    pub fn fill_into_vec(&mut self, dst: &mut Vec<u8>) -> usize {
        let available = &self.data[self.read_pos..];
        let n = available.len();
        dst.extend_from_slice(available);
        self.read_pos = self.data.len();
        n
    }

    /// Clears all content and returns the cursor to the start.
    #[inline]
    pub fn reset(&mut self) {
        self.data.clear();
        self.read_pos = 0;
    }

    /// Returns the cursor to the start without touching the content.
    #[inline]
    pub fn rewind(&mut self) {
        self.read_pos = 0;
    }

    /// The unread tail as a contiguous slice.
    #[inline]
    pub(crate) fn unread(&self) -> &[u8] {
        &self.data[self.read_pos..]
    }

    /// Marks `n` unread bytes as consumed without copying them out.
    #[inline]
    pub(crate) fn advance(&mut self, n: usize) {
        debug_assert!(self.read_pos + n <= self.data.len());
        self.read_pos = (self.read_pos + n).min(self.data.len());
    }

    /// Drops the consumed prefix so long-lived buffers do not grow without
    /// bound across keep-alive requests.
    pub(crate) fn compact(&mut self) {
        if self.read_pos > 0 {
            self.data.drain(..self.read_pos);
            self.read_pos = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut buf = ByteBuffer::new();
        buf.append(b"hello ");
        buf.append(b"world");
        assert_eq!(buf.count(), 11);

        let mut dst = [0u8; 4];
        assert_eq!(buf.fill_into(&mut dst), 4);
        assert_eq!(&dst, b"hell");

        let mut rest = Vec::new();
        assert_eq!(buf.fill_into_vec(&mut rest), 7);
        assert_eq!(rest, b"o world");
        assert!(buf.is_drained());
        assert_eq!(buf.fill_into(&mut dst), 0);
    }

    #[test]
    fn fill_outputs_are_prefix_of_appends() {
        // Interleave appends and fills with varying chunk sizes and check
        // the concatenated output is always a prefix of the appended input.
        let input: Vec<u8> = (0u8..=255).cycle().take(1000).collect();
        let mut buf = ByteBuffer::new();
        let mut appended = Vec::new();
        let mut drained = Vec::new();

        let mut offset = 0;
        for (i, chunk) in input.chunks(37).enumerate() {
            buf.append(chunk);
            appended.extend_from_slice(chunk);

            let mut dst = vec![0u8; 11 + (i % 5)];
            let n = buf.fill_into(&mut dst);
            drained.extend_from_slice(&dst[..n]);
            offset += n;
        }
        buf.fill_into_vec(&mut drained);

        assert!(offset <= appended.len());
        assert_eq!(drained, appended);
    }

    #[test]
    fn reset_clears_everything() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.append(b"data");
        let mut dst = [0u8; 2];
        buf.fill_into(&mut dst);

        buf.reset();
        assert_eq!(buf.count(), 0);
        assert!(buf.is_drained());
        assert_eq!(buf.fill_into(&mut dst), 0);
    }

    #[test]
    fn rewind_preserves_content() {
        let mut buf = ByteBuffer::new();
        buf.append(b"again");

        let mut first = Vec::new();
        buf.fill_into_vec(&mut first);
        assert!(buf.is_drained());

        buf.rewind();
        let mut second = Vec::new();
        buf.fill_into_vec(&mut second);
        assert_eq!(first, second);
        assert_eq!(second, b"again");
    }

    #[test]
    fn zero_length_operations() {
        let mut buf = ByteBuffer::new();
        buf.append(b"");
        assert_eq!(buf.count(), 0);

        let mut dst = [0u8; 0];
        assert_eq!(buf.fill_into(&mut dst), 0);

        buf.append(b"x");
        assert_eq!(buf.fill_into(&mut dst), 0);
        assert_eq!(buf.count(), 1);
    }

    #[test]
    fn advance_and_compact() {
        let mut buf = ByteBuffer::new();
        buf.append(b"abcdef");
        assert_eq!(buf.unread(), b"abcdef");

        buf.advance(4);
        assert_eq!(buf.unread(), b"ef");

        buf.compact();
        assert_eq!(buf.count(), 2);
        assert_eq!(buf.unread(), b"ef");

        let mut out = Vec::new();
        buf.fill_into_vec(&mut out);
        assert_eq!(out, b"ef");
    }
}
