//! Copies between body streams and sinks through pooled scratch buffers.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::pool::{BodyBuf, scratch};
use crate::protocol::BodyError;
use crate::utils::clamp_len;

/// Copies exactly `size` bytes of `source` to `sink`, for a body with a Content-Length.
///
/// A source that ends early fails with [`BodyError::StreamSizeMismatch`]; the
/// peer would otherwise wait for bytes that never come.
pub async fn write_fixed<R, W>(sink: &mut W, source: &mut R, size: u64) -> Result<(), BodyError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = scratch::acquire();
    let mut copied = 0u64;

    while copied < size {
        let want = clamp_len(size - copied).min(buf.len());
        let n = source.read(&mut buf[..want]).await?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n]).await?;
        copied += n as u64;
    }

    if copied != size {
        return Err(BodyError::stream_size_mismatch(copied, size));
    }
    trace!(size, "wrote fixed size body stream");
    Ok(())
}

/// Copies all of `source` into `sink`, returning the number of bytes copied.
pub async fn copy_stream<R, W>(source: &mut R, sink: &mut W) -> Result<u64, BodyError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = scratch::acquire();
    let mut copied = 0u64;

    loop {
        let n = source.read(&mut buf[..]).await?;
        if n == 0 {
            return Ok(copied);
        }
        sink.write_all(&buf[..n]).await?;
        copied += n as u64;
    }
}

/// Drains `source` into `dst`.
///
/// Bytes read before a failure stay in `dst`.
pub async fn read_stream<R>(source: &mut R, dst: &mut BodyBuf) -> Result<u64, BodyError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = scratch::acquire();
    let mut copied = 0u64;

    loop {
        let n = source.read(&mut buf[..]).await?;
        if n == 0 {
            return Ok(copied);
        }
        dst.extend_from_slice(&buf[..n]);
        copied += n as u64;
    }
}
