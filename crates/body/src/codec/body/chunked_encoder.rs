//! Writer for HTTP chunked transfer encoding.
//!
//! Each chunk is framed as `<hex size>\r\n<data>\r\n` and flushed immediately, so
//! a streaming producer's output reaches the peer chunk by chunk. The last chunk
//! is written as `0\r\n`; the trailer section and its terminating CRLF are
//! written separately by the message writer.

use std::io::Write;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::pool::scratch;
use crate::protocol::BodyError;

/// Large enough for the hex form of `usize::MAX` plus CRLF.
const CHUNK_HEAD_LEN: usize = 20;

/// Writes one chunk and flushes the sink.
///
/// An empty `data` writes the last-chunk line `0\r\n`.
pub async fn write_chunk<W>(sink: &mut W, data: &[u8]) -> Result<(), BodyError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut head = [0u8; CHUNK_HEAD_LEN];
    let head_len = {
        let mut cursor = &mut head[..];
        write!(cursor, "{:x}\r\n", data.len())?;
        CHUNK_HEAD_LEN - cursor.len()
    };

    sink.write_all(&head[..head_len]).await?;
    if !data.is_empty() {
        sink.write_all(data).await?;
        sink.write_all(b"\r\n").await?;
    }
    sink.flush().await?;
    Ok(())
}

/// Copies `source` into `sink` as a chunked body, ending with the last-chunk line.
///
/// Every read from `source` becomes one chunk of at most the scratch buffer size.
pub async fn write_chunked<R, W>(sink: &mut W, source: &mut R) -> Result<u64, BodyError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = scratch::acquire();
    let mut written = 0u64;

    loop {
        let n = source.read(&mut buf[..]).await?;
        if n == 0 {
            write_chunk(sink, &[]).await?;
            trace!(size = written, "wrote chunked body");
            return Ok(written);
        }
        write_chunk(sink, &buf[..n]).await?;
        written += n as u64;
    }
}
