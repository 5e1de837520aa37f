//! Whole HTTP messages: a head plus a [`MessageBody`].
//!
//! [`Request`] and [`Response`] read their bodies from a buffered transport
//! once the head has been parsed by the caller, and write complete messages,
//! head included, to a sink. Bodies are either materialized into pooled
//! buffers or streamed, and both forms behave the same to callers.
//!
//! Reading a body in full takes the transport by reference. Reading it as a
//! stream takes the transport by value and hands it back through a
//! [`Reclaim`](crate::protocol::body::Reclaim) once the body has been consumed.

mod request;
mod response;

pub use request::{BodyReadStatus, Request};
pub use response::Response;

use bytes::{Bytes, BytesMut};
use futures::FutureExt;
use http::HeaderValue;
use std::panic::AssertUnwindSafe;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{error, trace};

use crate::codec::body::{write_chunked, write_fixed};
use crate::codec::header::{encode_request_head, encode_response_head, encode_trailer};
use crate::compress::decompress;
use crate::pool::BodyBuf;
use crate::protocol::body::{BodyStream, MessageBody};
use crate::protocol::{BodyError, BodyHeader, RequestHeader, ResponseHeader, TransferLength};
use crate::utils::panic_message;

/// A message head that can be serialized in front of its body.
pub(crate) trait EncodeHead: BodyHeader {
    fn encode_head(&self, dst: &mut BytesMut) -> Result<(), BodyError>;
}

impl EncodeHead for RequestHeader {
    fn encode_head(&self, dst: &mut BytesMut) -> Result<(), BodyError> {
        encode_request_head(self, dst)
    }
}

impl EncodeHead for ResponseHeader {
    fn encode_head(&self, dst: &mut BytesMut) -> Result<(), BodyError> {
        encode_response_head(self, dst)
    }
}

async fn write_head<H, W>(header: &H, sink: &mut W) -> Result<(), BodyError>
where
    H: EncodeHead,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut head = BytesMut::new();
    header.encode_head(&mut head)?;
    sink.write_all(&head).await?;
    Ok(())
}

/// Writes a head framed for `body`, then `body` itself when `send_body` is set.
async fn write_buffered<H, W>(header: &mut H, body: &[u8], sink: &mut W, send_body: bool) -> Result<(), BodyError>
where
    H: EncodeHead,
    W: AsyncWrite + Unpin + ?Sized,
{
    if send_body || !body.is_empty() {
        header.set_transfer_length(TransferLength::Fixed(body.len() as u64));
    }
    write_head(header, sink).await?;
    if send_body {
        sink.write_all(body).await?;
    }
    Ok(())
}

/// Writes a head and a streamed body, then closes the stream.
///
/// The body is sent with a Content-Length when the head or the stream knows
/// its size, and chunked otherwise. A panic while reading the stream is
/// reported as [`BodyError::StreamWritePanic`].
async fn write_streamed<H, W>(
    header: &mut H,
    mut stream: BodyStream,
    sink: &mut W,
    send_body: bool,
    flush_head: bool,
) -> Result<(), BodyError>
where
    H: EncodeHead,
    W: AsyncWrite + Unpin + ?Sized,
{
    let outcome =
        AssertUnwindSafe(write_stream_framed(header, &mut stream, sink, send_body, flush_head)).catch_unwind().await;
    stream.close();

    match outcome {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(&*panic);
            error!(%message, "panic while writing body stream");
            Err(BodyError::stream_write_panic(message))
        }
    }
}

async fn write_stream_framed<H, W>(
    header: &mut H,
    stream: &mut BodyStream,
    sink: &mut W,
    send_body: bool,
    flush_head: bool,
) -> Result<(), BodyError>
where
    H: EncodeHead,
    W: AsyncWrite + Unpin + ?Sized,
{
    let transfer = match header.transfer_length()? {
        TransferLength::Fixed(len) => TransferLength::Fixed(len),
        TransferLength::Chunked | TransferLength::Identity => {
            stream.size_hint().map_or(TransferLength::Chunked, TransferLength::Fixed)
        }
    };
    header.set_transfer_length(transfer);

    write_head(header, sink).await?;
    if flush_head {
        sink.flush().await?;
    }
    if !send_body {
        return Ok(());
    }

    match transfer {
        TransferLength::Fixed(len) => write_fixed(sink, stream, len).await,
        TransferLength::Chunked | TransferLength::Identity => {
            let written = write_chunked(sink, stream).await?;
            let mut trailer = BytesMut::new();
            encode_trailer(header.trailer(), &mut trailer);
            sink.write_all(&trailer).await?;
            trace!(written, trailer = header.trailer().len(), "wrote chunked body stream");
            Ok(())
        }
    }
}

/// Decodes the body according to `encoding`, reading an attached stream first.
async fn decode_body(body: &mut MessageBody, encoding: &str) -> Result<Bytes, BodyError> {
    let src = body.try_body().await?;
    let mut dst = BodyBuf::new();
    decompress(encoding, src, &mut dst)?;
    Ok(dst.into_inner().freeze())
}

fn encoding_str(value: Option<&HeaderValue>) -> Result<&str, BodyError> {
    match value {
        Some(value) => value.to_str().map_err(BodyError::invalid_header),
        None => Ok(""),
    }
}
