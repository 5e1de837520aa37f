//! Body compression and decompression.
//!
//! A materialized body is compressed in one go with [`compress_into`]. A
//! streamed body is wrapped with [`compress_stream`], which runs the source
//! through the compressor on a producer task and flushes after every read, so
//! a slow source still reaches the peer piece by piece.

mod decoder;
mod encoder;

pub use decoder::{decompress, gunzip, inflate, unbrotli};
pub use encoder::{CompressionLevel, ContentCoding};
pub(crate) use encoder::{Encoder, Writer};

use mime::Mime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::trace;

use crate::pool::{BodyBuf, scratch};
use crate::protocol::body::{BodyStream, BodyWriter, StreamWriterBridge};
use crate::protocol::BodyError;

/// Bodies shorter than this are sent uncompressed.
pub const MIN_COMPRESS_LEN: usize = 200;

/// Returns true for content types that usually shrink when compressed.
///
/// Text, application, font and multipart types qualify, as do SVG images and icons.
pub fn is_compressible(content_type: &str) -> bool {
    let Ok(mime) = content_type.trim().parse::<Mime>() else {
        return false;
    };

    let kind = mime.type_();
    if kind == mime::TEXT || kind == mime::APPLICATION || kind == mime::FONT || kind == mime::MULTIPART {
        return true;
    }
    let subtype = mime.subtype().as_str();
    kind == mime::IMAGE && (subtype.starts_with("svg") || subtype == "x-icon")
}

/// Appends `src` compressed with `coding` to `dst`.
pub fn compress_into(
    src: &[u8],
    dst: &mut BodyBuf,
    coding: ContentCoding,
    level: CompressionLevel,
) -> Result<(), BodyError> {
    let mut encoder = Encoder::new(dst, coding, level);
    encoder.write(src)?;
    encoder.finish()?;
    Ok(())
}

/// Wraps `source` into a stream yielding its bytes compressed with `coding`.
///
/// The source is closed once it has been read to the end or the consumer
/// went away.
pub fn compress_stream(source: BodyStream, coding: ContentCoding, level: CompressionLevel) -> BodyStream {
    let bridge = StreamWriterBridge::new(move |writer| async move {
        let mut source = source;
        let result = pump(&mut source, writer, coding, level).await;
        source.close();
        result
    });
    BodyStream::bridge(bridge)
}

async fn pump(
    source: &mut BodyStream,
    mut writer: BodyWriter,
    coding: ContentCoding,
    level: CompressionLevel,
) -> std::io::Result<()> {
    let mut encoder = Encoder::new(Writer::new(), coding, level);
    let mut scratch = scratch::acquire();
    let mut total = 0u64;

    loop {
        let n = source.read(&mut scratch).await?;
        if n == 0 {
            break;
        }
        total += n as u64;

        encoder.write(&scratch[..n])?;
        encoder.flush()?;
        let compressed = encoder.get_mut().take();
        if !compressed.is_empty() {
            writer.write_all(&compressed).await?;
            writer.flush().await?;
        }
    }

    let tail = encoder.finish()?.take();
    writer.write_all(&tail).await?;
    writer.flush().await?;
    trace!(%coding, total, "compressed body stream");
    Ok(())
}
