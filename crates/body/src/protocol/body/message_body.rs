use std::fmt;
use std::mem;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;

use super::stream::BodyStream;
use crate::codec::body::{copy_stream, read_stream};
use crate::pool::{BodyBuf, BufferPool};
use crate::protocol::BodyError;

/// Where the bytes of a message body currently live.
///
/// The variants are mutually exclusive: setting one kind of body discards
/// the previous one, returning pooled buffers and closing streams.
#[derive(Debug, Default)]
pub enum BodyState {
    /// No body has been set
    #[default]
    Absent,
    /// Bytes owned by a pooled buffer
    Materialized(BodyBuf),
    /// Caller-provided bytes that are never modified in place
    Immutable(Bytes),
    /// A body that has not been read yet
    Stream(BodyStream),
}

/// The body of a request or response.
///
/// Owns the [`BodyState`] and the pool its buffers come from. Dropping or
/// resetting the body returns its buffer to that pool.
pub struct MessageBody {
    state: BodyState,
    pool: Arc<BufferPool>,
}

impl MessageBody {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self { state: BodyState::Absent, pool }
    }

    pub fn state(&self) -> &BodyState {
        &self.state
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.state, BodyState::Stream(_))
    }

    /// The bytes of a materialized or immutable body.
    ///
    /// Empty for an absent body and for a stream that has not been read.
    pub fn bytes(&self) -> &[u8] {
        match &self.state {
            BodyState::Materialized(buf) => buf,
            BodyState::Immutable(raw) => raw,
            BodyState::Absent | BodyState::Stream(_) => &[],
        }
    }

    /// Reads an attached stream to its end into a pooled buffer.
    ///
    /// The stream is closed either way. Bytes read before a failure stay in the body.
    pub async fn materialize(&mut self) -> Result<(), BodyError> {
        let mut stream = match mem::take(&mut self.state) {
            BodyState::Stream(stream) => stream,
            other => {
                self.state = other;
                return Ok(());
            }
        };

        let mut buf = self.pool.acquire();
        let result = read_stream(&mut stream, &mut buf).await;
        stream.close();
        self.state = BodyState::Materialized(buf);
        result.map(|_| ())
    }

    /// Returns the body bytes, reading an attached stream first.
    pub async fn try_body(&mut self) -> Result<&[u8], BodyError> {
        self.materialize().await?;
        Ok(self.bytes())
    }

    /// Returns the body bytes, reading an attached stream first.
    ///
    /// If the stream fails, the body is replaced by the text of the error.
    /// Use [`try_body`](Self::try_body) to observe the failure instead.
    pub async fn body(&mut self) -> &[u8] {
        if let Err(e) = self.materialize().await {
            warn!(cause = %e, "failed to read body stream, substituting error text");
            self.buffer_mut().set(e.to_string().as_bytes());
        }
        self.bytes()
    }

    /// Returns the body buffer for in-place writes.
    ///
    /// Closes an attached stream and drops an immutable body first.
    pub fn buffer_mut(&mut self) -> &mut BodyBuf {
        if !matches!(self.state, BodyState::Materialized(_)) {
            self.reset();
            self.state = BodyState::Materialized(self.pool.acquire());
        }
        match &mut self.state {
            BodyState::Materialized(buf) => buf,
            _ => unreachable!("body was materialized above"),
        }
    }

    /// Replaces the body with a copy of `data`.
    pub fn set(&mut self, data: &[u8]) {
        self.buffer_mut().set(data);
    }

    /// Appends `data` to the materialized body.
    pub fn append(&mut self, data: &[u8]) {
        self.buffer_mut().extend_from_slice(data);
    }

    /// Uses `raw` as the body without copying it.
    pub fn set_raw(&mut self, raw: Bytes) {
        self.reset();
        self.state = BodyState::Immutable(raw);
    }

    pub fn set_stream(&mut self, stream: BodyStream) {
        self.reset();
        self.state = BodyState::Stream(stream);
    }

    /// Detaches the stream, leaving the body absent.
    pub fn take_stream(&mut self) -> Option<BodyStream> {
        match mem::take(&mut self.state) {
            BodyState::Stream(stream) => Some(stream),
            other => {
                self.state = other;
                None
            }
        }
    }

    pub fn stream_mut(&mut self) -> Option<&mut BodyStream> {
        match &mut self.state {
            BodyState::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    /// Closes an attached stream, leaving the body absent.
    pub fn close_stream(&mut self) {
        if let Some(stream) = self.take_stream() {
            stream.close();
        }
    }

    /// Replaces the materialized bytes with `body` and returns the previous ones.
    ///
    /// An attached stream is read into the body first, with errors substituted as
    /// in [`body`](Self::body).
    pub async fn swap(&mut self, body: BytesMut) -> BytesMut {
        if self.is_stream() {
            self.body().await;
        }
        if let BodyState::Immutable(raw) = &self.state {
            let raw = raw.clone();
            self.set(&raw);
        }
        self.buffer_mut().replace(body)
    }

    /// Uses `buf` as the materialized body, returning the previous buffer to the pool.
    pub(crate) fn replace_buffer(&mut self, buf: BodyBuf) {
        self.reset();
        self.state = BodyState::Materialized(buf);
    }

    /// Drops the body, returning its buffer to the pool and closing its stream.
    pub fn reset(&mut self) {
        match mem::take(&mut self.state) {
            BodyState::Materialized(buf) => self.pool.release(buf),
            BodyState::Stream(stream) => stream.close(),
            BodyState::Immutable(_) | BodyState::Absent => {}
        }
    }

    /// Drops an immutable body, and a buffer whose capacity exceeds `size`.
    ///
    /// The dropped buffer is not returned to the pool. A smaller buffer stays
    /// in place and is recycled by the next [`reset`](Self::reset).
    pub fn release(&mut self, size: usize) {
        match &self.state {
            BodyState::Immutable(_) => self.state = BodyState::Absent,
            BodyState::Materialized(buf) if buf.capacity() > size => self.state = BodyState::Absent,
            _ => {}
        }
    }

    /// Copies the materialized or immutable body into `dst`. Streams are not copied.
    pub fn copy_to(&self, dst: &mut MessageBody) {
        match &self.state {
            BodyState::Materialized(buf) => dst.set(buf),
            BodyState::Immutable(raw) => dst.set_raw(raw.clone()),
            BodyState::Absent | BodyState::Stream(_) => dst.reset(),
        }
    }

    /// Exchanges the bodies of two messages.
    ///
    /// The pools are exchanged along with the bodies, so each buffer still
    /// returns to the pool it came from.
    pub fn swap_with(&mut self, other: &mut MessageBody) {
        mem::swap(&mut self.state, &mut other.state);
        mem::swap(&mut self.pool, &mut other.pool);
    }

    /// Writes the body to `sink`, draining and closing an attached stream.
    pub async fn write_to<W>(&mut self, sink: &mut W) -> Result<(), BodyError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if let Some(mut stream) = self.take_stream() {
            let result = copy_stream(&mut stream, sink).await;
            stream.close();
            return result.map(|_| ());
        }
        sink.write_all(self.bytes()).await?;
        Ok(())
    }
}

impl Drop for MessageBody {
    fn drop(&mut self) {
        self.reset();
    }
}

impl fmt::Debug for MessageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBody").field("state", &self.state).field("pool", &self.pool.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::body::StreamWriterBridge;
    use std::io;

    fn body() -> (MessageBody, Arc<BufferPool>) {
        let pool = Arc::new(BufferPool::new("test"));
        (MessageBody::new(Arc::clone(&pool)), pool)
    }

    #[tokio::test]
    async fn test_set_and_append() {
        let (mut body, _pool) = body();
        body.set(b"hello");
        body.append(b" world");

        assert_eq!(body.body().await, b"hello world");
    }

    #[tokio::test]
    async fn test_states_are_exclusive() {
        let (mut body, pool) = body();

        body.set(b"materialized");
        body.set_raw(Bytes::from_static(b"immutable"));
        assert!(matches!(body.state(), BodyState::Immutable(_)));
        assert_eq!(pool.stats().recycled, 1);

        body.set(b"materialized again");
        body.set_stream(BodyStream::new(&b"streamed"[..]));
        assert!(body.is_stream());
        assert!(body.bytes().is_empty());
        assert_eq!(pool.stats().recycled, 2);
        assert_eq!(pool.stats().idle, 1);

        body.set(b"again");
        assert!(!body.is_stream());
        assert_eq!(body.bytes(), b"again");
    }

    #[tokio::test]
    async fn test_materialize_stream() {
        let (mut body, _pool) = body();
        body.set_stream(BodyStream::new(&b"from a stream"[..]));

        assert_eq!(body.try_body().await.unwrap(), b"from a stream");
        assert!(matches!(body.state(), BodyState::Materialized(_)));
    }

    #[tokio::test]
    async fn test_failed_stream_substitutes_error_text() {
        let (mut body, _pool) = body();
        let bridge = StreamWriterBridge::new(|mut writer| async move {
            writer.write_all(b"partial").await?;
            Err(io::Error::other("disk on fire"))
        });
        body.set_stream(BodyStream::bridge(bridge));

        let text = String::from_utf8(body.body().await.to_vec()).unwrap();
        assert!(text.contains("disk on fire"), "{text}");
    }

    #[tokio::test]
    async fn test_try_body_reports_failure() {
        let (mut body, _pool) = body();
        let bridge = StreamWriterBridge::new(|_writer| async move { Err(io::Error::other("no data")) });
        body.set_stream(BodyStream::bridge(bridge));

        assert!(body.try_body().await.is_err());
    }

    #[tokio::test]
    async fn test_swap() {
        let (mut body, _pool) = body();
        body.set_stream(BodyStream::new(&b"old body"[..]));

        let old = body.swap(BytesMut::from(&b"new body"[..])).await;

        assert_eq!(&old[..], b"old body");
        assert_eq!(body.bytes(), b"new body");

        body.set_raw(Bytes::from_static(b"raw"));
        let old = body.swap(BytesMut::new()).await;
        assert_eq!(&old[..], b"raw");
        assert!(body.bytes().is_empty());
    }

    #[tokio::test]
    async fn test_reset_returns_buffer() {
        let (mut body, pool) = body();
        body.set(b"pooled");
        body.reset();

        assert!(matches!(body.state(), BodyState::Absent));
        assert_eq!(pool.stats().idle, 1);

        body.set(b"reused");
        assert_eq!(pool.stats().reused, 1);
    }

    #[tokio::test]
    async fn test_reset_discards_above_limit() {
        let (mut body, pool) = body();
        pool.set_limit(Some(1024));

        body.set(&vec![0; 4096]);
        body.reset();

        assert_eq!(pool.stats().discarded, 1);
        assert_eq!(pool.stats().idle, 0);
    }

    #[tokio::test]
    async fn test_release() {
        let (mut body, pool) = body();
        body.set(&vec![0; 4096]);
        body.release(1024);
        assert!(matches!(body.state(), BodyState::Absent));

        body.set(b"small");
        body.release(1024);
        assert_eq!(body.bytes(), b"small");

        drop(body);
        assert_eq!(pool.stats().idle, 1);
    }

    #[tokio::test]
    async fn test_copy_to_skips_stream() {
        let (mut src, _pool) = body();
        let (mut dst, _dst_pool) = body();

        src.set(b"copied");
        src.copy_to(&mut dst);
        assert_eq!(dst.bytes(), b"copied");

        src.set_stream(BodyStream::new(&b"not copied"[..]));
        src.copy_to(&mut dst);
        assert!(matches!(dst.state(), BodyState::Absent));
    }

    #[tokio::test]
    async fn test_swap_with() {
        let (mut a, pool_a) = body();
        let (mut b, pool_b) = body();
        a.set(b"a");
        b.set_raw(Bytes::from_static(b"b"));

        a.swap_with(&mut b);

        assert_eq!(a.bytes(), b"b");
        assert_eq!(b.bytes(), b"a");
        assert!(Arc::ptr_eq(b.pool(), &pool_a));

        b.reset();
        assert_eq!(pool_a.stats().recycled, 1);
        assert_eq!(pool_b.stats().recycled, 0);
    }

    #[tokio::test]
    async fn test_write_to() {
        let (mut body, _pool) = body();
        body.set_stream(BodyStream::new(&b"streamed out"[..]));

        let mut sink = Vec::new();
        body.write_to(&mut sink).await.unwrap();

        assert_eq!(sink, b"streamed out");
        assert!(matches!(body.state(), BodyState::Absent));

        body.set(b"buffered out");
        let mut sink = Vec::new();
        body.write_to(&mut sink).await.unwrap();
        assert_eq!(sink, b"buffered out");
    }
}
