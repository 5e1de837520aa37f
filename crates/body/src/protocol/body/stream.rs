use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

use super::body_channel::StreamWriterBridge;
use super::streaming_reader::StreamingBodyReader;

/// A message body that is read lazily.
///
/// Wraps an arbitrary reader supplied by the caller, a body still on the
/// connection, or the output of a producer task. An optional size hint is used
/// as the Content-Length when the message header does not carry one.
pub struct BodyStream {
    inner: StreamKind,
    size_hint: Option<u64>,
}

enum StreamKind {
    Reader(Box<dyn AsyncRead + Send + Unpin>),
    Streaming(StreamingBodyReader),
    Bridge(StreamWriterBridge),
}

impl BodyStream {
    /// Wraps an arbitrary reader as a body of unknown size.
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self { inner: StreamKind::Reader(Box::new(reader)), size_hint: None }
    }

    /// Wraps an arbitrary reader as a body of `size` bytes.
    pub fn with_size<R>(reader: R, size: u64) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self { inner: StreamKind::Reader(Box::new(reader)), size_hint: Some(size) }
    }

    pub(crate) fn streaming(reader: StreamingBodyReader) -> Self {
        Self { inner: StreamKind::Streaming(reader), size_hint: None }
    }

    pub(crate) fn bridge(bridge: StreamWriterBridge) -> Self {
        Self { inner: StreamKind::Bridge(bridge), size_hint: None }
    }

    pub fn size_hint(&self) -> Option<u64> {
        self.size_hint
    }

    /// Closes the stream.
    ///
    /// A body read from a connection hands the transport back; a producer
    /// task sees its next write fail.
    pub fn close(self) {
        match self.inner {
            StreamKind::Streaming(reader) => reader.close(),
            StreamKind::Reader(_) | StreamKind::Bridge(_) => {}
        }
    }
}

impl AsyncRead for BodyStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            StreamKind::Reader(reader) => Pin::new(reader).poll_read(cx, buf),
            StreamKind::Streaming(reader) => Pin::new(reader).poll_read(cx, buf),
            StreamKind::Bridge(bridge) => Pin::new(bridge).poll_read(cx, buf),
        }
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("BodyStream");
        match &self.inner {
            StreamKind::Reader(_) => debug.field("kind", &"reader"),
            StreamKind::Streaming(reader) => debug.field("kind", reader),
            StreamKind::Bridge(bridge) => debug.field("kind", bridge),
        };
        debug.field("size_hint", &self.size_hint).finish()
    }
}
