//! Lazy body reader over a connection.
//!
//! A [`StreamingBodyReader`] serves a body that has not been read yet. It first
//! yields any bytes that were prefetched into a buffer, then reads the rest
//! from the transport according to the message framing. The transport is owned
//! by the reader while the body is in flight and handed back through a
//! [`Reclaim`] once the body is complete, closed or dropped, together with the
//! trailer of a chunked body. A body released before its end is drained by
//! [`Reclaim::wait`], so a reclaimed transport always sits on a message boundary.
//!
//! Reader state lives in a pooled [`StreamCore`], so a busy connection does not
//! allocate a new reader per message.

use std::cmp;
use std::fmt;
use std::future::poll_fn;
use std::io;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use http::HeaderMap;
use once_cell::sync::Lazy;
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::codec::body::{ChunkedDecoder, Decoded};
use crate::codec::header::TrailerDecoder;
use crate::pool::{BodyBuf, BufferPool, Pool, Recycle, scratch};
use crate::protocol::{BodyError, TransferLength};
use crate::utils::clamp_len;

/// A buffered connection a body is read from.
pub type Transport = Box<dyn AsyncBufRead + Send + Unpin>;

/// What a finished body stream hands back to the connection.
pub struct Reclaimed {
    /// The connection, positioned right after the body and its trailer
    pub transport: Transport,
    /// The trailer of a chunked body, empty otherwise
    pub trailer: HeaderMap,
}

impl fmt::Debug for Reclaimed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reclaimed").field("trailer", &self.trailer).finish_non_exhaustive()
    }
}

/// What a released reader sends to its [`Reclaim`] handle.
enum Handoff {
    /// The body was read to its end
    Done(Reclaimed),
    /// The body was released early; the rest is still on the transport
    Unfinished(Box<StreamCore>),
}

/// A handle that yields the transport back once the body stream releases it.
///
/// Dropping the handle without waiting drops the transport, which closes the
/// connection.
pub struct Reclaim {
    inner: ReclaimInner,
}

enum ReclaimInner {
    Ready(Option<Reclaimed>),
    Pending(oneshot::Receiver<Handoff>),
    Unfinished(Box<StreamCore>),
}

impl Reclaim {
    /// A handle for a body that never took the transport.
    pub(crate) fn ready(transport: Transport) -> Self {
        Self { inner: ReclaimInner::Ready(Some(Reclaimed { transport, trailer: HeaderMap::new() })) }
    }

    /// Waits until the body stream is complete, closed or dropped.
    ///
    /// A body released before its end is read to the end here and discarded,
    /// trailer included. If that fails the error is returned and the
    /// transport dropped, since the connection no longer sits on a message
    /// boundary.
    pub async fn wait(self) -> Result<Reclaimed, BodyError> {
        match self.inner {
            ReclaimInner::Ready(Some(reclaimed)) => Ok(reclaimed),
            ReclaimInner::Ready(None) => Err(BodyError::invalid_body("transport already reclaimed")),
            ReclaimInner::Unfinished(core) => drain(core).await,
            ReclaimInner::Pending(receiver) => match receiver.await {
                Ok(Handoff::Done(reclaimed)) => Ok(reclaimed),
                Ok(Handoff::Unfinished(core)) => drain(core).await,
                Err(_closed) => Err(BodyError::invalid_body("body stream dropped its transport")),
            },
        }
    }

    /// Takes the transport if the body stream has been read to its end.
    ///
    /// Returns `None` while the body is in flight, and for a body released
    /// before its end; [`wait`](Self::wait) drains such a body first.
    pub fn try_take(&mut self) -> Option<Reclaimed> {
        if let ReclaimInner::Pending(receiver) = &mut self.inner {
            match receiver.try_recv().ok()? {
                Handoff::Done(reclaimed) => self.inner = ReclaimInner::Ready(Some(reclaimed)),
                Handoff::Unfinished(core) => self.inner = ReclaimInner::Unfinished(core),
            }
        }

        match &mut self.inner {
            ReclaimInner::Ready(reclaimed) => reclaimed.take(),
            ReclaimInner::Pending(_) | ReclaimInner::Unfinished(_) => None,
        }
    }
}

impl fmt::Debug for Reclaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.inner {
            ReclaimInner::Ready(Some(_)) => "ready",
            ReclaimInner::Ready(None) => "taken",
            ReclaimInner::Pending(_) => "pending",
            ReclaimInner::Unfinished(_) => "unfinished",
        };
        f.debug_struct("Reclaim").field("state", &state).finish()
    }
}

/// Reads and discards the rest of an early released body.
async fn drain(mut core: Box<StreamCore>) -> Result<Reclaimed, BodyError> {
    let mut scratch = scratch::acquire();
    let mut drained = 0u64;

    let result = loop {
        if core.finished {
            break Ok(());
        }
        let mut buf = ReadBuf::new(&mut scratch[..]);
        if let Err(e) = poll_fn(|cx| core.poll_fill(cx, &mut buf)).await {
            break Err(e);
        }
        drained += buf.filled().len() as u64;
    };

    let outcome = match (result, core.transport.take()) {
        (Ok(()), Some(transport)) => {
            debug!(drained, "drained released body");
            Ok(Reclaimed { transport, trailer: mem::take(&mut core.trailer) })
        }
        (Ok(()), None) => Err(BodyError::invalid_body("body stream lost its transport")),
        (Err(e), _) => {
            debug!(drained, cause = %e, "failed to drain released body, dropping transport");
            Err(e)
        }
    };
    STREAM_CORE_POOL.release(core);
    outcome
}

/// Pooled state of a streaming body reader.
#[derive(Default)]
pub(crate) struct StreamCore {
    prefix: BodyBuf,
    cursor: usize,
    buffer_pool: Option<Arc<BufferPool>>,
    transport: Option<Transport>,
    transfer: Option<TransferLength>,
    served: u64,
    decoder: ChunkedDecoder,
    trailer_decoder: TrailerDecoder,
    trailer: HeaderMap,
    finished: bool,
    reclaim: Option<oneshot::Sender<Handoff>>,
}

impl Recycle for StreamCore {
    fn recycle(&mut self) {
        self.prefix = BodyBuf::new();
        self.cursor = 0;
        self.buffer_pool = None;
        self.transport = None;
        self.transfer = None;
        self.served = 0;
        self.decoder = ChunkedDecoder::new();
        self.trailer_decoder.reset();
        self.trailer.clear();
        self.finished = false;
        self.reclaim = None;
    }
}

static STREAM_CORE_POOL: Lazy<Pool<Box<StreamCore>>> = Lazy::new(|| Pool::new("stream-core"));

impl StreamCore {
    /// Fills `buf` with the next body bytes. Leaves `buf` untouched at the end of the body.
    fn poll_fill(&mut self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<Result<(), BodyError>> {
        loop {
            if self.finished {
                return Poll::Ready(Ok(()));
            }

            if self.cursor < self.prefix.len() {
                let len = cmp::min(buf.remaining(), self.prefix.len() - self.cursor);
                buf.put_slice(&self.prefix[self.cursor..self.cursor + len]);
                self.cursor += len;
                self.account(len);
                return Poll::Ready(Ok(()));
            }

            let (Some(transport), Some(transfer)) = (self.transport.as_mut(), self.transfer) else {
                self.finished = true;
                continue;
            };

            match transfer {
                TransferLength::Fixed(length) => {
                    if self.served >= length {
                        self.finished = true;
                        continue;
                    }

                    let available = ready!(Pin::new(transport.as_mut()).poll_fill_buf(cx))?;
                    if available.is_empty() {
                        return Poll::Ready(Err(BodyError::unexpected_end(self.served, length)));
                    }
                    let len = cmp::min(cmp::min(clamp_len(length - self.served), available.len()), buf.remaining());
                    buf.put_slice(&available[..len]);
                    Pin::new(transport.as_mut()).consume(len);
                    self.account(len);
                    return Poll::Ready(Ok(()));
                }

                TransferLength::Identity => {
                    let available = ready!(Pin::new(transport.as_mut()).poll_fill_buf(cx))?;
                    if available.is_empty() {
                        self.finished = true;
                        continue;
                    }
                    let len = cmp::min(available.len(), buf.remaining());
                    buf.put_slice(&available[..len]);
                    Pin::new(transport.as_mut()).consume(len);
                    return Poll::Ready(Ok(()));
                }

                TransferLength::Chunked if self.decoder.is_done() => {
                    let available = ready!(Pin::new(transport.as_mut()).poll_fill_buf(cx))?;
                    if available.is_empty() {
                        // a connection closed right after the last chunk has no trailer
                        self.finished = true;
                        continue;
                    }
                    let (consumed, fields) = self.trailer_decoder.decode(available)?;
                    Pin::new(transport.as_mut()).consume(consumed);
                    if let Some(fields) = fields {
                        self.trailer = fields;
                        self.finished = true;
                    }
                }

                TransferLength::Chunked => {
                    let available = match ready!(Pin::new(transport.as_mut()).poll_fill_buf(cx)) {
                        Ok(available) => available,
                        Err(e) => return Poll::Ready(Err(BodyError::broken_chunk_io("cannot read chunked body", e))),
                    };
                    if available.is_empty() {
                        return Poll::Ready(Err(BodyError::chunk_eof()));
                    }

                    match self.decoder.decode(available, buf.remaining())? {
                        Decoded::Data(len) => {
                            buf.put_slice(&available[..len]);
                            Pin::new(transport.as_mut()).consume(len);
                            return Poll::Ready(Ok(()));
                        }
                        Decoded::Framing(len) | Decoded::End(len) => {
                            Pin::new(transport.as_mut()).consume(len);
                        }
                    }
                }
            }
        }
    }

    fn account(&mut self, len: usize) {
        if let Some(TransferLength::Fixed(length)) = self.transfer {
            self.served += len as u64;
            if self.served >= length {
                self.finished = true;
            }
        }
    }
}

/// A body read lazily from a connection.
///
/// Reading to the end releases the reader: the prefix buffer goes back to its
/// pool and the transport is sent to the [`Reclaim`] handle. [`close`](Self::close)
/// and `Drop` release early, in which case the [`Reclaim`] handle drains the
/// rest of the body before handing the transport back.
pub struct StreamingBodyReader {
    core: Option<Box<StreamCore>>,
}

impl StreamingBodyReader {
    /// Creates a reader that first yields `prefix`, then the rest of the body from `transport`.
    ///
    /// For a fixed-size body `transfer` carries the full declared length, prefix included.
    pub(crate) fn new(
        prefix: BodyBuf,
        buffer_pool: Arc<BufferPool>,
        transport: Transport,
        transfer: TransferLength,
    ) -> (Self, Reclaim) {
        let (sender, receiver) = oneshot::channel();

        let mut core = STREAM_CORE_POOL.acquire();
        core.prefix = prefix;
        core.buffer_pool = Some(buffer_pool);
        core.transport = Some(transport);
        core.transfer = Some(transfer);
        core.reclaim = Some(sender);
        if let TransferLength::Fixed(0) = transfer {
            core.finished = true;
        }

        trace!(?transfer, prefix = core.prefix.len(), "create streaming body reader");
        (Self { core: Some(core) }, Reclaim { inner: ReclaimInner::Pending(receiver) })
    }

    /// Returns true once the reader has been released.
    pub fn is_released(&self) -> bool {
        self.core.is_none()
    }

    /// Stops reading and releases the transport and buffers.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(mut core) = self.core.take() else {
            return;
        };

        // unread prefix bytes are already off the transport
        let unread = core.prefix.len() - core.cursor;
        core.account(unread);
        let prefix = mem::take(&mut core.prefix);
        core.cursor = 0;
        if let Some(pool) = core.buffer_pool.take() {
            pool.release(prefix);
        }

        let Some(sender) = core.reclaim.take() else {
            STREAM_CORE_POOL.release(core);
            return;
        };

        let handoff = if core.finished {
            match core.transport.take() {
                Some(transport) => {
                    let trailer = mem::take(&mut core.trailer);
                    STREAM_CORE_POOL.release(core);
                    Handoff::Done(Reclaimed { transport, trailer })
                }
                None => {
                    STREAM_CORE_POOL.release(core);
                    return;
                }
            }
        } else {
            debug!(served = core.served, "release streaming body before its end");
            Handoff::Unfinished(core)
        };

        if let Err(handoff) = sender.send(handoff) {
            trace!("reclaim handle dropped, closing transport");
            if let Handoff::Unfinished(core) = handoff {
                STREAM_CORE_POOL.release(core);
            }
        }
    }
}

impl AsyncRead for StreamingBodyReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let Some(core) = this.core.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let result = ready!(core.poll_fill(cx, buf));
        if core.finished {
            this.release();
        }
        Poll::Ready(result.map_err(io::Error::from))
    }
}

impl Drop for StreamingBodyReader {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for StreamingBodyReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.core {
            Some(core) => f
                .debug_struct("StreamingBodyReader")
                .field("transfer", &core.transfer)
                .field("prefix", &core.prefix.len())
                .field("served", &core.served)
                .finish(),
            None => f.write_str("StreamingBodyReader(released)"),
        }
    }
}
