//! Reader for HTTP bodies delimited by connection close.
//!
//! Without Content-Length or chunked framing, a response body runs until the
//! peer closes the connection ([RFC 7230 Section 3.3.3](https://tools.ietf.org/html/rfc7230#section-3.3.3)).

use std::cmp;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::trace;

use crate::pool::BodyBuf;
use crate::protocol::BodyError;

/// The capacity reserved before the first read of a close-delimited body.
pub const IDENTITY_INITIAL_CAPACITY: usize = 1024;

/// Appends everything `src` yields until end of input to `dst`.
///
/// The buffer grows geometrically. With a non-zero `max_size` growth is capped
/// at `max_size + 1` bytes, so reading past the limit is detected without
/// buffering the rest of the stream. The overshooting bytes stay in `dst` and
/// are discarded by the caller.
pub async fn read_until_end<R>(src: &mut R, dst: &mut BodyBuf, max_size: usize) -> Result<(), BodyError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let limit = match max_size {
        0 => usize::MAX,
        max => max.saturating_add(1),
    };

    if max_size > 0 && dst.len() > max_size {
        return Err(BodyError::BodyTooLarge);
    }
    dst.reserve(cmp::min(IDENTITY_INITIAL_CAPACITY, limit));

    loop {
        let available = src.fill_buf().await?;
        if available.is_empty() {
            trace!(size = dst.len(), "read body until end of input");
            return Ok(());
        }

        let len = cmp::min(available.len(), limit.saturating_sub(dst.len()));
        if dst.len() + len > dst.capacity() {
            let doubled = cmp::max(dst.capacity().saturating_mul(2), dst.len() + len);
            dst.grow(cmp::min(doubled, limit));
        }
        dst.extend_from_slice(&available[..len]);
        src.consume(len);

        if max_size > 0 && dst.len() > max_size {
            return Err(BodyError::BodyTooLarge);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_reads_to_end() {
        let data = vec![b'a'; 5000];
        let mut src = BufReader::with_capacity(512, &data[..]);
        let mut dst = BodyBuf::new();

        read_until_end(&mut src, &mut dst, 0).await.unwrap();

        assert_eq!(dst.len(), 5000);
        assert!(dst.capacity() >= 5000);
    }

    #[tokio::test]
    async fn test_empty() {
        let mut src: &[u8] = b"";
        let mut dst = BodyBuf::new();

        read_until_end(&mut src, &mut dst, 0).await.unwrap();

        assert!(dst.is_empty());
    }

    #[tokio::test]
    async fn test_limit_boundary() {
        let data = vec![b'a'; 2048];

        let mut src = &data[..];
        let mut dst = BodyBuf::new();
        read_until_end(&mut src, &mut dst, 2048).await.unwrap();
        assert_eq!(dst.len(), 2048);

        let mut src = &data[..];
        let mut dst = BodyBuf::new();
        let result = read_until_end(&mut src, &mut dst, 2047).await;
        assert!(matches!(result, Err(BodyError::BodyTooLarge)));
        assert_eq!(dst.len(), 2048);
    }

    #[tokio::test]
    async fn test_stops_at_limit() {
        let data = vec![b'a'; 1 << 20];
        let mut src = &data[..];
        let mut dst = BodyBuf::new();

        let result = read_until_end(&mut src, &mut dst, 100).await;

        assert!(matches!(result, Err(BodyError::BodyTooLarge)));
        assert_eq!(dst.len(), 101);
        assert_eq!(src.len(), (1 << 20) - 101);
    }
}
