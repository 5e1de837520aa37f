use std::borrow::Cow;
use std::future::Future;
use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::{decode_body, encoding_str, write_buffered, write_streamed};
use crate::codec::body::{Prefetch, prefetch_body, read_body};
use crate::codec::header::read_trailer;
use crate::pool::{BodyBuf, BufferPool, request_body_pool};
use crate::protocol::body::{
    BodyStream, BodyWriter, MessageBody, Reclaim, StreamWriterBridge, StreamingBodyReader, Transport,
};
use crate::protocol::{BodyError, BodyHeader, MultipartForm, RequestHeader, TransferLength};

/// What [`Request::read_limit_body`] did with the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyReadStatus {
    /// The body has been read
    Complete,
    /// The request carries `Expect: 100-continue`; nothing was read.
    ///
    /// The caller either sends `100 Continue` and calls
    /// [`Request::continue_read_body`], or rejects the request.
    ExpectContinue,
}

/// An HTTP request with its body.
#[derive(Debug)]
pub struct Request {
    header: RequestHeader,
    body: MessageBody,
    multipart_form: Option<Box<dyn MultipartForm>>,
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    /// Creates an empty request backed by the process-wide request pool.
    pub fn new() -> Self {
        Self::with_pool(request_body_pool())
    }

    pub fn with_pool(pool: Arc<BufferPool>) -> Self {
        Self { header: RequestHeader::default(), body: MessageBody::new(pool), multipart_form: None }
    }

    /// Creates a request with a parsed head and no body yet.
    pub fn with_header(header: RequestHeader) -> Self {
        let mut request = Self::new();
        request.header = header;
        request
    }

    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut RequestHeader {
        &mut self.header
    }

    pub fn message_body(&self) -> &MessageBody {
        &self.body
    }

    pub fn message_body_mut(&mut self) -> &mut MessageBody {
        &mut self.body
    }

    /// Reads the body described by the head from `src`.
    ///
    /// Nothing is read from a request expecting `100 Continue`. A non-zero
    /// `max_body_size` bounds the body.
    pub async fn read_limit_body<R>(&mut self, src: &mut R, max_body_size: usize) -> Result<BodyReadStatus, BodyError>
    where
        R: AsyncBufRead + Unpin + ?Sized,
    {
        if self.header.may_continue() {
            debug!("request expects 100-continue, body left unread");
            return Ok(BodyReadStatus::ExpectContinue);
        }
        self.continue_read_body(src, max_body_size).await?;
        Ok(BodyReadStatus::Complete)
    }

    /// Reads the body after the caller has answered `100 Continue`.
    ///
    /// A request without Content-Length or Transfer-Encoding has no body. A
    /// declared length above `max_body_size` fails before anything is read.
    pub async fn continue_read_body<R>(&mut self, src: &mut R, max_body_size: usize) -> Result<(), BodyError>
    where
        R: AsyncBufRead + Unpin + ?Sized,
    {
        let transfer = self.header.transfer_length()?;
        match transfer {
            TransferLength::Fixed(len) if max_body_size > 0 && len > max_body_size as u64 => {
                return Err(BodyError::BodyTooLarge);
            }
            TransferLength::Identity => {
                self.frame_empty_body();
                return Ok(());
            }
            _ => {}
        }

        self.read_body(src, transfer, max_body_size).await?;

        if transfer.is_chunked() {
            let trailer = read_trailer(src).await?;
            self.header.set_trailer(trailer);
        }
        Ok(())
    }

    /// Reads a body framed by `transfer` into the request.
    ///
    /// On failure the whole request is reset.
    pub async fn read_body<R>(&mut self, src: &mut R, transfer: TransferLength, max_body_size: usize) -> Result<(), BodyError>
    where
        R: AsyncBufRead + Unpin + ?Sized,
    {
        let buf = self.body.buffer_mut();
        buf.clear();

        if let Err(e) = read_body(src, transfer, max_body_size, buf).await {
            debug!(cause = %e, "failed to read request body");
            self.reset();
            return Err(e);
        }

        let len = self.body.bytes().len() as u64;
        match transfer {
            TransferLength::Chunked if len == 0 => self.header.set_transfer_length(TransferLength::Fixed(0)),
            TransferLength::Identity => self.header.set_transfer_length(TransferLength::Fixed(len)),
            _ => {}
        }
        Ok(())
    }

    /// Attaches the body as a stream reading from `transport`.
    ///
    /// A small fixed-size body is read right away and the transport handed back
    /// at once. Otherwise up to [`STREAM_PREFETCH_LIMIT`](crate::codec::body::STREAM_PREFETCH_LIMIT)
    /// bytes are prefetched and the rest is read as the stream is consumed; a
    /// body above `max_body_size` is streamed instead of rejected. The trailer of
    /// a chunked body arrives with the reclaimed transport.
    ///
    /// On failure the request is reset and the transport dropped.
    pub async fn continue_read_body_stream(
        &mut self,
        mut transport: Transport,
        max_body_size: usize,
    ) -> Result<Reclaim, BodyError> {
        let transfer = match self.header.transfer_length() {
            Ok(TransferLength::Identity) => {
                self.frame_empty_body();
                return Ok(Reclaim::ready(transport));
            }
            Ok(transfer) => transfer,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };

        let pool = Arc::clone(self.body.pool());
        let mut prefix = pool.acquire();
        let prefetched = match prefetch_body(&mut transport, transfer, max_body_size, &mut prefix).await {
            Ok(prefetched) => prefetched,
            Err(e) => {
                pool.release(prefix);
                self.reset();
                return Err(e);
            }
        };

        if prefetched == Prefetch::Complete {
            self.body.replace_buffer(prefix);
            return Ok(Reclaim::ready(transport));
        }

        let (reader, reclaim) = StreamingBodyReader::new(prefix, pool, transport, transfer);
        self.body.set_stream(BodyStream::streaming(reader));
        Ok(reclaim)
    }

    /// Writes the head and body to `sink`.
    ///
    /// A form-only request sends its marshalled multipart form. The sink is not
    /// flushed, except between the chunks of a streamed body.
    pub async fn write<W>(&mut self, sink: &mut W) -> Result<(), BodyError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if let Some(stream) = self.body.take_stream() {
            return write_streamed(&mut self.header, stream, sink, true, false).await;
        }

        let form = self.marshal_form_only()?;
        let body = match &form {
            Some(form) => &form[..],
            None => self.body.bytes(),
        };
        let send_body = !body.is_empty() || !self.header.ignore_body();
        write_buffered(&mut self.header, body, sink, send_body).await
    }

    /// Writes only the body to `sink`, draining and closing an attached stream.
    pub async fn body_write_to<W>(&mut self, sink: &mut W) -> Result<(), BodyError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if let Some(form) = self.marshal_form_only()? {
            sink.write_all(&form).await?;
            return Ok(());
        }
        self.body.write_to(sink).await
    }

    /// Returns the body, reading an attached stream first.
    ///
    /// A form-only request returns its marshalled multipart form. Errors are
    /// substituted into the body, see [`MessageBody::body`].
    pub async fn body(&mut self) -> Cow<'_, [u8]> {
        match self.marshal_form_only() {
            Ok(Some(form)) => return Cow::Owned(form.to_vec()),
            Ok(None) => {}
            Err(e) => {
                warn!(cause = %e, "failed to marshal multipart form, substituting error text");
                return Cow::Owned(e.to_string().into_bytes());
            }
        }
        Cow::Borrowed(self.body.body().await)
    }

    /// Returns the body, reading an attached stream first.
    pub async fn try_body(&mut self) -> Result<Cow<'_, [u8]>, BodyError> {
        if let Some(form) = self.marshal_form_only()? {
            return Ok(Cow::Owned(form.to_vec()));
        }
        Ok(Cow::Borrowed(self.body.try_body().await?))
    }

    /// Replaces the body with a copy of `body`.
    pub fn set_body(&mut self, body: &[u8]) {
        self.remove_multipart_form_files();
        self.body.set(body);
    }

    /// Uses `body` without copying it.
    pub fn set_body_raw(&mut self, body: Bytes) {
        self.remove_multipart_form_files();
        self.body.set_raw(body);
    }

    pub fn append_body(&mut self, data: &[u8]) {
        self.remove_multipart_form_files();
        self.body.append(data);
    }

    /// The body buffer, for writing the body in place.
    pub fn body_writer(&mut self) -> &mut BodyBuf {
        self.remove_multipart_form_files();
        self.body.buffer_mut()
    }

    /// Sends the bytes of `reader` as the body.
    ///
    /// With a known `size` the body is sent with a Content-Length, otherwise chunked.
    pub fn set_body_stream<R>(&mut self, reader: R, size: Option<u64>)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.remove_multipart_form_files();
        let stream = match size {
            Some(size) => BodyStream::with_size(reader, size),
            None => BodyStream::new(reader),
        };
        self.header.set_transfer_length(size.map_or(TransferLength::Chunked, TransferLength::Fixed));
        self.body.set_stream(stream);
    }

    /// Sends what `producer` writes as a chunked body.
    ///
    /// The producer runs on its own task once the body is first read.
    pub fn set_body_stream_writer<F, Fut>(&mut self, producer: F)
    where
        F: FnOnce(BodyWriter) -> Fut + Send + 'static,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        self.remove_multipart_form_files();
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

    pub fn swap_body_with(&mut self, other: &mut Request) {
        self.body.swap_with(&mut other.body);
        std::mem::swap(&mut self.multipart_form, &mut other.multipart_form);
    }

    /// Drops the body buffer if its capacity exceeds `size`, see [`MessageBody::release`].
    pub fn release_body(&mut self, size: usize) {
        self.body.release(size);
    }

    /// Copies the head and the materialized body into `dst`.
    pub fn copy_to(&self, dst: &mut Request) {
        dst.reset();
        self.header.copy_to(&mut dst.header);
        self.body.copy_to(&mut dst.body);
    }

    /// Attaches a multipart form, sent when the request has no other body.
    pub fn set_multipart_form(&mut self, form: Box<dyn MultipartForm>) {
        self.remove_multipart_form_files();
        self.multipart_form = Some(form);
    }

    pub fn multipart_form(&self) -> Option<&dyn MultipartForm> {
        self.multipart_form.as_deref()
    }

    /// Drops the multipart form and the temporary files behind it.
    pub fn remove_multipart_form_files(&mut self) {
        if let Some(mut form) = self.multipart_form.take() {
            form.remove_files();
        }
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

    /// Clears head, body and form, returning the body buffer to its pool.
    pub fn reset(&mut self) {
        self.header = RequestHeader::default();
        self.body.reset();
        self.remove_multipart_form_files();
    }

    fn frame_empty_body(&mut self) {
        if !self.header.ignore_body() {
            self.header.set_transfer_length(TransferLength::Fixed(0));
        }
    }

    /// Marshals the multipart form when it is the only body, and sets the matching Content-Type.
    fn marshal_form_only(&mut self) -> Result<Option<Bytes>, BodyError> {
        let Some(form) = &self.multipart_form else {
            return Ok(None);
        };
        if !self.body.bytes().is_empty() || self.body.is_stream() {
            return Ok(None);
        }

        let content_type = format!("multipart/form-data; boundary={}", form.boundary());
        let content_type = HeaderValue::from_str(&content_type).map_err(BodyError::invalid_header)?;
        let marshalled = form.marshal()?;
        self.header.headers_mut().insert(CONTENT_TYPE, content_type);
        Ok(Some(marshalled))
    }
}

impl From<RequestHeader> for Request {
    fn from(header: RequestHeader) -> Self {
        Self::with_header(header)
    }
}
