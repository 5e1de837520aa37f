//! Dispatch over the three ways a message body can be framed.
//!
//! [`read_body`] reads a whole body into a buffer. [`prefetch_body`] reads only
//! what a streaming reader needs up front and reports how the rest of the body
//! continues on the transport.

use std::cmp;

use tokio::io::AsyncBufRead;

use super::{read_chunked, read_fixed, read_until_end};
use crate::pool::BodyBuf;
use crate::protocol::{BodyError, TransferLength};

/// The most bytes of a fixed-size body read before it is handed over as a stream.
pub const STREAM_PREFETCH_LIMIT: usize = 8 * 1024;

/// What [`prefetch_body`] left for the stream to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefetch {
    /// The whole body is in the buffer
    Complete,
    /// A prefix is in the buffer, the rest is still on the transport
    Partial,
    /// The declared length exceeds the size limit; a prefix is in the buffer
    TooLarge,
    /// Nothing was read; the chunked framing is decoded by the stream
    Chunked,
}

/// Reads a complete body framed by `transfer` into `dst`.
///
/// A non-zero `max_size` bounds the body. A declared length above the limit is
/// rejected before any byte is read.
pub async fn read_body<R>(
    src: &mut R,
    transfer: TransferLength,
    max_size: usize,
    dst: &mut BodyBuf,
) -> Result<(), BodyError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    match transfer {
        TransferLength::Fixed(len) => {
            if max_size > 0 && len > max_size as u64 {
                return Err(BodyError::BodyTooLarge);
            }
            read_fixed(src, dst, len).await
        }
        TransferLength::Chunked => read_chunked(src, dst, max_size).await,
        TransferLength::Identity => read_until_end(src, dst, max_size).await,
    }
}

/// Reads the part of a body that precedes streaming.
///
/// For a fixed-size body this is at most `min(max_size, len, STREAM_PREFETCH_LIMIT)`
/// bytes. A body larger than `max_size` is not an error here: the caller hands
/// it over as a stream instead of buffering it.
pub async fn prefetch_body<R>(
    src: &mut R,
    transfer: TransferLength,
    max_size: usize,
    dst: &mut BodyBuf,
) -> Result<Prefetch, BodyError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    match transfer {
        TransferLength::Chunked => Ok(Prefetch::Chunked),
        TransferLength::Identity => {
            read_until_end(src, dst, max_size).await?;
            Ok(Prefetch::Complete)
        }
        TransferLength::Fixed(len) => {
            let mut prefix = cmp::min(len, STREAM_PREFETCH_LIMIT as u64);
            if max_size > 0 {
                prefix = cmp::min(prefix, max_size as u64);
            }
            read_fixed(src, dst, prefix).await?;

            if max_size > 0 && len > max_size as u64 {
                Ok(Prefetch::TooLarge)
            } else if prefix == len {
                Ok(Prefetch::Complete)
            } else {
                Ok(Prefetch::Partial)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_body_dispatch() {
        let mut src: &[u8] = b"hello";
        let mut dst = BodyBuf::new();
        read_body(&mut src, TransferLength::Fixed(5), 0, &mut dst).await.unwrap();
        assert_eq!(&dst[..], b"hello");

        let mut src: &[u8] = b"5\r\nhello\r\n0\r\n\r\n";
        let mut dst = BodyBuf::new();
        read_body(&mut src, TransferLength::Chunked, 0, &mut dst).await.unwrap();
        assert_eq!(&dst[..], b"hello");
        assert_eq!(src, b"\r\n");

        let mut src: &[u8] = b"until close";
        let mut dst = BodyBuf::new();
        read_body(&mut src, TransferLength::Identity, 0, &mut dst).await.unwrap();
        assert_eq!(&dst[..], b"until close");
    }

    #[tokio::test]
    async fn test_read_body_rejects_declared_length() {
        let mut src: &[u8] = b"hello";
        let mut dst = BodyBuf::new();

        let result = read_body(&mut src, TransferLength::Fixed(5), 4, &mut dst).await;

        assert!(matches!(result, Err(BodyError::BodyTooLarge)));
        assert_eq!(src, b"hello");
    }

    #[tokio::test]
    async fn test_prefetch_fixed() {
        let data = vec![b'p'; 20_000];

        let mut src = &data[..];
        let mut dst = BodyBuf::new();
        let prefetch = prefetch_body(&mut src, TransferLength::Fixed(20_000), 0, &mut dst).await.unwrap();
        assert_eq!(prefetch, Prefetch::Partial);
        assert_eq!(dst.len(), STREAM_PREFETCH_LIMIT);

        let mut src = &data[..];
        let mut dst = BodyBuf::new();
        let prefetch = prefetch_body(&mut src, TransferLength::Fixed(20_000), 100, &mut dst).await.unwrap();
        assert_eq!(prefetch, Prefetch::TooLarge);
        assert_eq!(dst.len(), 100);

        let mut src = &data[..];
        let mut dst = BodyBuf::new();
        let prefetch = prefetch_body(&mut src, TransferLength::Fixed(300), 1000, &mut dst).await.unwrap();
        assert_eq!(prefetch, Prefetch::Complete);
        assert_eq!(dst.len(), 300);
    }

    #[tokio::test]
    async fn test_prefetch_chunked_reads_nothing() {
        let mut src: &[u8] = b"5\r\nhello\r\n0\r\n\r\n";
        let mut dst = BodyBuf::new();

        let prefetch = prefetch_body(&mut src, TransferLength::Chunked, 0, &mut dst).await.unwrap();

        assert_eq!(prefetch, Prefetch::Chunked);
        assert!(dst.is_empty());
        assert_eq!(src.len(), 15);
    }
}
