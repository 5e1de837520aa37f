use std::future::Future;
use std::io;
use std::io::Cursor;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::StatusCode;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite};
use tracing::debug;

use super::{decode_body, encoding_str, write_buffered, write_streamed};
use crate::codec::body::read_body;
use crate::codec::header::read_trailer;
use crate::compress::{CompressionLevel, ContentCoding, MIN_COMPRESS_LEN, compress_into, compress_stream};
use crate::pool::{BodyBuf, BufferPool, response_body_pool};
use crate::protocol::body::{
    BodyStream, BodyWriter, MessageBody, Reclaim, StreamWriterBridge, StreamingBodyReader, Transport,
};
use crate::protocol::{BodyError, BodyHeader, ResponseHeader, TransferLength};

/// An HTTP response with its body.
#[derive(Debug)]
pub struct Response {
    header: ResponseHeader,
    body: MessageBody,
    skip_body: bool,
    immediate_header_flush: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// Creates an empty `200 OK` response backed by the process-wide response pool.
    pub fn new() -> Self {
        Self::with_pool(response_body_pool())
    }

    pub fn with_pool(pool: Arc<BufferPool>) -> Self {
        Self {
            header: ResponseHeader::new(StatusCode::OK),
            body: MessageBody::new(pool),
            skip_body: false,
            immediate_header_flush: false,
        }
    }

    /// Creates a response with a parsed head and no body yet.
    pub fn with_header(header: ResponseHeader) -> Self {
        let mut response = Self::new();
        response.header = header;
        response
    }

    pub fn header(&self) -> &ResponseHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut ResponseHeader {
        &mut self.header
    }

    pub fn message_body(&self) -> &MessageBody {
        &self.body
    }

    pub fn message_body_mut(&mut self) -> &mut MessageBody {
        &mut self.body
    }

    /// Neither reads nor writes a body, as for the response to a HEAD request.
    pub fn set_skip_body(&mut self, skip_body: bool) {
        self.skip_body = skip_body;
    }

    pub fn skip_body(&self) -> bool {
        self.skip_body
    }

    /// Flushes the head before a streamed body is written.
    pub fn set_immediate_header_flush(&mut self, flush: bool) {
        self.immediate_header_flush = flush;
    }

    /// Returns true when no body is read or written, by status or by request.
    pub fn must_skip_body(&self) -> bool {
        self.skip_body || self.header.must_skip_body()
    }

    /// Reads the body described by the head from `src`.
    ///
    /// The body is skipped when [`must_skip_body`](Self::must_skip_body) holds.
    /// A connection reset while reading counts as the end of the body, since
    /// some servers close right after the last byte. A fixed-size body cut short
    /// this way gets the Content-Length of the bytes actually read.
    pub async fn read_limit_body<R>(&mut self, src: &mut R, max_body_size: usize) -> Result<(), BodyError>
    where
        R: AsyncBufRead + Unpin + ?Sized,
    {
        if self.must_skip_body() {
            return Ok(());
        }

        if let Err(e) = self.read_body(src, max_body_size).await {
            if e.is_connection_reset() {
                debug!(cause = %e, "connection reset while reading response body");
                if let TransferLength::Fixed(_) = self.header.transfer_length()? {
                    let len = self.body.bytes().len() as u64;
                    self.header.set_transfer_length(TransferLength::Fixed(len));
                }
                return Ok(());
            }
            debug!(cause = %e, "failed to read response body");
            self.body.reset();
            return Err(e);
        }

        if self.header.transfer_length()?.is_chunked() {
            match read_trailer(src).await {
                Ok(trailer) => self.header.set_trailer(trailer),
                Err(e) if e.is_connection_reset() => {
                    debug!(cause = %e, "connection reset while reading response trailer");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Reads the body framed by the head into the response.
    ///
    /// A body delimited by connection close is given the Content-Length it
    /// turned out to have, even when the read stopped early.
    pub async fn read_body<R>(&mut self, src: &mut R, max_body_size: usize) -> Result<(), BodyError>
    where
        R: AsyncBufRead + Unpin + ?Sized,
    {
        let transfer = self.header.transfer_length()?;
        let buf = self.body.buffer_mut();
        buf.clear();
        let result = read_body(src, transfer, max_body_size, buf).await;

        if transfer.is_identity() {
            let len = self.body.bytes().len() as u64;
            self.header.set_transfer_length(TransferLength::Fixed(len));
        }
        result
    }

    /// Attaches the body as a stream, skipping it when [`must_skip_body`](Self::must_skip_body) holds.
    pub async fn read_limit_body_stream(
        &mut self,
        transport: Transport,
        max_body_size: usize,
    ) -> Result<Reclaim, BodyError> {
        if self.must_skip_body() {
            return Ok(Reclaim::ready(transport));
        }
        self.read_body_stream(transport, max_body_size).await
    }

    /// Attaches the body as a stream.
    ///
    /// A fixed-size body within `max_body_size` and a body delimited by
    /// connection close are read right away and served from memory. A chunked
    /// body or one above `max_body_size` is read from `transport` as the stream
    /// is consumed, and the transport comes back through the returned handle
    /// together with the trailer.
    pub async fn read_body_stream(&mut self, mut transport: Transport, max_body_size: usize) -> Result<Reclaim, BodyError> {
        let transfer = self.header.transfer_length()?;
        let too_large = matches!(transfer, TransferLength::Fixed(len) if max_body_size > 0 && len > max_body_size as u64);

        if transfer.is_chunked() || too_large {
            let pool = Arc::clone(self.body.pool());
            let (reader, reclaim) = StreamingBodyReader::new(BodyBuf::new(), pool, transport, transfer);
            self.body.set_stream(BodyStream::streaming(reader));
            return Ok(reclaim);
        }

        let mut buf = self.body.pool().acquire();
        if let Err(e) = read_body(&mut transport, transfer, max_body_size, &mut buf).await {
            self.body.pool().release(buf);
            return Err(e);
        }

        let len = buf.len() as u64;
        if transfer.is_identity() {
            self.header.set_transfer_length(TransferLength::Fixed(len));
        }
        self.body.set_stream(BodyStream::with_size(Cursor::new(buf.into_inner()), len));
        Ok(Reclaim::ready(transport))
    }

    /// Writes the head and body to `sink`.
    ///
    /// The body is left out when [`must_skip_body`](Self::must_skip_body)
    /// holds. The sink is not flushed, except between the chunks of a
    /// streamed body and after the head when immediate header flush is set.
    pub async fn write<W>(&mut self, sink: &mut W) -> Result<(), BodyError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let send_body = !self.must_skip_body();
        if let Some(stream) = self.body.take_stream() {
            return write_streamed(&mut self.header, stream, sink, send_body, self.immediate_header_flush).await;
        }
        write_buffered(&mut self.header, self.body.bytes(), sink, send_body).await
    }

    /// Writes only the body to `sink`, draining and closing an attached stream.
    pub async fn body_write_to<W>(&mut self, sink: &mut W) -> Result<(), BodyError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.body.write_to(sink).await
    }

    /// Compresses the body with `coding` and sets Content-Encoding.
    ///
    /// Leaves the body alone when it already has a Content-Encoding, when its
    /// content type is not compressible, or when a materialized body is shorter
    /// than [`MIN_COMPRESS_LEN`]. A streamed body is compressed as it is read
    /// and sent chunked.
    pub fn compress_body(&mut self, coding: ContentCoding, level: CompressionLevel) -> Result<(), BodyError> {
        if self.header.content_encoding().is_some() || !self.header.is_compressible_content_type() {
            return Ok(());
        }

        if let Some(stream) = self.body.take_stream() {
            self.header.set_transfer_length(TransferLength::Chunked);
            self.body.set_stream(compress_stream(stream, coding, level));
        } else {
            let body = self.body.bytes();
            if body.len() < MIN_COMPRESS_LEN {
                return Ok(());
            }

            let mut compressed = self.body.pool().acquire();
            if let Err(e) = compress_into(body, &mut compressed, coding, level) {
                self.body.pool().release(compressed);
                return Err(e);
            }
            debug!(%coding, from = body.len(), to = compressed.len(), "compressed response body");
            self.body.replace_buffer(compressed);
        }

        self.header.set_content_encoding(coding.name());
        Ok(())
    }

    pub fn gzip_body(&mut self, level: CompressionLevel) -> Result<(), BodyError> {
        self.compress_body(ContentCoding::Gzip, level)
    }

    pub fn deflate_body(&mut self, level: CompressionLevel) -> Result<(), BodyError> {
        self.compress_body(ContentCoding::Deflate, level)
    }

    pub fn brotli_body(&mut self, level: CompressionLevel) -> Result<(), BodyError> {
        self.compress_body(ContentCoding::Br, level)
    }

    /// Gzips the body at the default level, then writes the response.
    pub async fn write_gzip<W>(&mut self, sink: &mut W) -> Result<(), BodyError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.write_gzip_level(sink, CompressionLevel::Default).await
    }

    pub async fn write_gzip_level<W>(&mut self, sink: &mut W, level: CompressionLevel) -> Result<(), BodyError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.gzip_body(level)?;
        self.write(sink).await
    }

    /// Deflates the body at the default level, then writes the response.
    pub async fn write_deflate<W>(&mut self, sink: &mut W) -> Result<(), BodyError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.write_deflate_level(sink, CompressionLevel::Default).await
    }

    pub async fn write_deflate_level<W>(&mut self, sink: &mut W, level: CompressionLevel) -> Result<(), BodyError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.deflate_body(level)?;
        self.write(sink).await
    }

    /// Brotli-compresses the body at the default level, then writes the response.
    pub async fn write_brotli<W>(&mut self, sink: &mut W) -> Result<(), BodyError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.write_brotli_level(sink, CompressionLevel::Default).await
    }

    pub async fn write_brotli_level<W>(&mut self, sink: &mut W, level: CompressionLevel) -> Result<(), BodyError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.brotli_body(level)?;
        self.write(sink).await
    }

    /// Returns the body, reading an attached stream first.
    ///
    /// Errors are substituted into the body, see [`MessageBody::body`].
    pub async fn body(&mut self) -> &[u8] {
        self.body.body().await
    }

    /// Returns the body, reading an attached stream first.
    pub async fn try_body(&mut self) -> Result<&[u8], BodyError> {
        self.body.try_body().await
    }

    pub fn set_body(&mut self, body: &[u8]) {
        self.body.set(body);
    }

    /// Uses `body` without copying it.
    pub fn set_body_raw(&mut self, body: Bytes) {
        self.body.set_raw(body);
    }

    pub fn append_body(&mut self, data: &[u8]) {
        self.body.append(data);
    }

    /// The body buffer, for writing the body in place.
    pub fn body_writer(&mut self) -> &mut BodyBuf {
        self.body.buffer_mut()
    }

    /// Sends the bytes of `reader` as the body.
    ///
    /// With a known `size` the body is sent with a Content-Length, otherwise chunked.
    pub fn set_body_stream<R>(&mut self, reader: R, size: Option<u64>)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let stream = match size {
            Some(size) => BodyStream::with_size(reader, size),
            None => BodyStream::new(reader),
        };
        self.header.set_transfer_length(size.map_or(TransferLength::Chunked, TransferLength::Fixed));
        self.body.set_stream(stream);
    }

    /// Sends what `producer` writes as a chunked body.
    ///
    /// The producer runs on its own task once the body is first read. A
    /// panicking producer fails the write with [`BodyError::StreamWritePanic`].
    pub fn set_body_stream_writer<F, Fut>(&mut self, producer: F)
    where
        F: FnOnce(BodyWriter) -> Fut + Send + 'static,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        self.header.set_transfer_length(TransferLength::Chunked);
        self.body.set_stream(BodyStream::bridge(StreamWriterBridge::new(producer)));
    }

    pub fn is_body_stream(&self) -> bool {
        self.body.is_stream()
    }

    /// Closes an attached stream, handing a connection transport back.
    pub fn close_body_stream(&mut self) {
        self.body.close_stream();
    }

    /// Replaces the body with `body` and returns the previous bytes.
    pub async fn swap_body(&mut self, body: BytesMut) -> BytesMut {
        self.body.swap(body).await
    }

    pub fn swap_body_with(&mut self, other: &mut Response) {
        self.body.swap_with(&mut other.body);
    }

    /// Drops the body buffer if its capacity exceeds `size`, see [`MessageBody::release`].
    pub fn release_body(&mut self, size: usize) {
        self.body.release(size);
    }

    /// Copies the head, the flags and the materialized body into `dst`.
    pub fn copy_to(&self, dst: &mut Response) {
        dst.reset();
        self.header.copy_to(&mut dst.header);
        self.body.copy_to(&mut dst.body);
        dst.skip_body = self.skip_body;
        dst.immediate_header_flush = self.immediate_header_flush;
    }

    pub async fn body_gunzip(&mut self) -> Result<Bytes, BodyError> {
        decode_body(&mut self.body, "gzip").await
    }

    pub async fn body_inflate(&mut self) -> Result<Bytes, BodyError> {
        decode_body(&mut self.body, "deflate").await
    }

    pub async fn body_unbrotli(&mut self) -> Result<Bytes, BodyError> {
        decode_body(&mut self.body, "br").await
    }

    /// Decodes the body according to its Content-Encoding.
    pub async fn body_uncompressed(&mut self) -> Result<Bytes, BodyError> {
        let encoding = encoding_str(self.header.content_encoding())?.to_owned();
        decode_body(&mut self.body, &encoding).await
    }

    /// Clears head, body and flags, returning the body buffer to its pool.
    pub fn reset(&mut self) {
        self.header = ResponseHeader::new(StatusCode::OK);
        self.body.reset();
        self.skip_body = false;
        self.immediate_header_flush = false;
    }
}

impl From<ResponseHeader> for Response {
    fn from(header: ResponseHeader) -> Self {
        Self::with_header(header)
    }
}
