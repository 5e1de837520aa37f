//! Fixed-size scratch buffers for stream copies.
//!
//! Copying a stream into a sink needs a small intermediate buffer. Rather than
//! allocating one per copy, copies borrow a [`ScratchBuf`] through a guard that
//! hands it back to the pool when dropped.

use super::{Pool, Recycle};
use once_cell::sync::Lazy;
use std::ops::{Deref, DerefMut};

/// The size of every scratch buffer.
pub const COPY_BUF_SIZE: usize = 4096;

#[derive(Debug)]
pub struct ScratchBuf(Box<[u8]>);

impl Default for ScratchBuf {
    fn default() -> Self {
        Self(vec![0; COPY_BUF_SIZE].into_boxed_slice())
    }
}

impl Recycle for ScratchBuf {
    fn recycle(&mut self) {}
}

static SCRATCH_POOL: Lazy<Pool<ScratchBuf>> = Lazy::new(|| Pool::new("scratch"));

/// A borrowed scratch buffer, returned to the pool on drop.
#[derive(Debug)]
pub struct ScratchGuard {
    buf: Option<ScratchBuf>,
}

/// Borrows a scratch buffer of [`COPY_BUF_SIZE`] bytes.
pub fn acquire() -> ScratchGuard {
    ScratchGuard { buf: Some(SCRATCH_POOL.acquire()) }
}

impl Deref for ScratchGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match &self.buf {
            Some(buf) => &buf.0,
            None => &[],
        }
    }
}

impl DerefMut for ScratchGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.buf {
            Some(buf) => &mut buf.0,
            None => &mut [],
        }
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            SCRATCH_POOL.release(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_size() {
        let mut scratch = acquire();
        assert_eq!(scratch.len(), COPY_BUF_SIZE);
        scratch[0] = 42;
        assert_eq!(scratch[0], 42);
    }

    #[test]
    fn test_scratch_returns_to_pool() {
        let before = SCRATCH_POOL.stats().recycled;
        drop(acquire());
        assert!(SCRATCH_POOL.stats().recycled > before);
    }
}
