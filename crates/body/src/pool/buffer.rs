use crate::utils::round2;
use bytes::{BufMut, BytesMut};
use std::io;
use std::ops::Deref;

/// A growable byte buffer that owns a materialized message body.
///
/// Capacity always grows to the next power of two, so repeated appends
/// amortize and a recycled buffer keeps a predictable size class.
#[derive(Debug, Default)]
pub struct BodyBuf {
    inner: BytesMut,
}

impl BodyBuf {
    pub fn new() -> Self {
        Self { inner: BytesMut::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { inner: BytesMut::with_capacity(round2(capacity)) }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Makes room for at least `additional` more bytes.
    pub fn reserve(&mut self, additional: usize) {
        let needed = self.inner.len().saturating_add(additional);
        self.grow(needed);
    }

    /// Grows the total capacity to at least `capacity`, rounded up to a power of two.
    pub fn grow(&mut self, capacity: usize) {
        if capacity <= self.inner.capacity() {
            return;
        }
        let target = round2(capacity);
        self.inner.reserve(target - self.inner.len());
    }

    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.reserve(data.len());
        self.inner.put_slice(data);
    }

    /// Replaces the contents with `data`, keeping the allocation.
    pub fn set(&mut self, data: &[u8]) {
        self.inner.clear();
        self.extend_from_slice(data);
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn truncate(&mut self, len: usize) {
        self.inner.truncate(len);
    }

    /// Swaps the underlying bytes with `bytes`, returning the previous contents.
    pub fn replace(&mut self, bytes: BytesMut) -> BytesMut {
        std::mem::replace(&mut self.inner, bytes)
    }

    pub fn into_inner(self) -> BytesMut {
        self.inner
    }
}

impl Deref for BodyBuf {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl AsRef<[u8]> for BodyBuf {
    fn as_ref(&self) -> &[u8] {
        &self.inner
    }
}

impl From<BytesMut> for BodyBuf {
    fn from(inner: BytesMut) -> Self {
        Self { inner }
    }
}

impl From<&[u8]> for BodyBuf {
    fn from(data: &[u8]) -> Self {
        let mut buf = Self::with_capacity(data.len());
        buf.extend_from_slice(data);
        buf
    }
}

impl io::Write for BodyBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reserve_rounds_up() {
        let mut buf = BodyBuf::new();
        buf.reserve(1000);
        assert!(buf.capacity() >= 1024);

        let cap = buf.capacity();
        buf.extend_from_slice(&[b'a'; 512]);
        buf.reserve(100);
        assert_eq!(buf.capacity(), cap);
    }

    #[test]
    fn test_set_keeps_allocation() {
        let mut buf = BodyBuf::with_capacity(64);
        buf.extend_from_slice(b"hello world");
        let cap = buf.capacity();

        buf.set(b"bye");
        assert_eq!(buf.as_slice(), b"bye");
        assert_eq!(buf.capacity(), cap);
    }

    #[test]
    fn test_io_write() {
        let mut buf = BodyBuf::new();
        write!(buf, "{:x}\r\n", 255).unwrap();
        assert_eq!(&buf[..], b"ff\r\n");
    }

    #[test]
    fn test_replace() {
        let mut buf = BodyBuf::from(&b"old"[..]);
        let old = buf.replace(BytesMut::from(&b"new"[..]));
        assert_eq!(&old[..], b"old");
        assert_eq!(buf.as_slice(), b"new");
    }
}
