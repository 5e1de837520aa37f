//! Producer/consumer bridge for bodies generated by a writer callback.
//!
//! A body can be produced by code that wants to *write* it, while the message
//! writer wants to *read* it. [`StreamWriterBridge`] connects the two through a
//! bounded in-memory pipe: the producer runs as a separate task writing into a
//! [`BodyWriter`], and the bridge reads what it wrote.
//!
//! - The pipe capacity bounds how far the producer can run ahead of the consumer
//! - The producer task is spawned on the first read
//! - A producer error or panic is reported by the read that hits end of pipe
//! - Dropping the bridge closes the pipe, so the producer's next write fails

use std::fmt;
use std::future::Future;
use std::io;
use std::mem;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::protocol::BodyError;
use crate::utils::panic_message;

/// The number of bytes a producer may write ahead of the consumer.
pub const BRIDGE_PIPE_CAPACITY: usize = 8 * 1024;

type Producer = Box<dyn FnOnce(BodyWriter) -> BoxFuture<'static, io::Result<()>> + Send>;

/// The write side handed to a body producer.
///
/// Writes wait while the pipe is full. Once the consumer is gone every write
/// fails with [`io::ErrorKind::BrokenPipe`].
pub struct BodyWriter {
    pipe: DuplexStream,
}

impl fmt::Debug for BodyWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BodyWriter")
    }
}

impl AsyncWrite for BodyWriter {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().pipe).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().pipe).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().pipe).poll_shutdown(cx)
    }
}

enum BridgeState {
    Idle(Producer, DuplexStream),
    Running(JoinHandle<Result<(), BodyError>>),
    Done,
}

/// The read side of a producer-driven body.
pub struct StreamWriterBridge {
    pipe: DuplexStream,
    state: BridgeState,
}

impl StreamWriterBridge {
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(BodyWriter) -> Fut + Send + 'static,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        let (pipe, writer) = tokio::io::duplex(BRIDGE_PIPE_CAPACITY);
        let producer: Producer = Box::new(move |body_writer| producer(body_writer).boxed());
        Self { pipe, state: BridgeState::Idle(producer, writer) }
    }

    fn start(&mut self) {
        if !matches!(self.state, BridgeState::Idle(..)) {
            return;
        }
        if let BridgeState::Idle(producer, writer) = mem::replace(&mut self.state, BridgeState::Done) {
            self.state = BridgeState::Running(tokio::spawn(run_producer(producer, writer)));
        }
    }
}

async fn run_producer(producer: Producer, writer: DuplexStream) -> Result<(), BodyError> {
    let body_writer = BodyWriter { pipe: writer };
    // the writer is dropped with the producer future, which closes the pipe
    let outcome = AssertUnwindSafe(async move { producer(body_writer).await }).catch_unwind().await;

    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!(cause = %e, "body stream producer failed");
            Err(BodyError::from_io(e))
        }
        Err(panic) => {
            let message = panic_message(&*panic);
            error!(%message, "panic while writing body stream");
            Err(BodyError::stream_write_panic(message))
        }
    }
}

impl AsyncRead for StreamWriterBridge {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.start();

        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.pipe).poll_read(cx, buf))?;
        if buf.filled().len() > before {
            return Poll::Ready(Ok(()));
        }

        // end of pipe: the producer is done, report how it ended
        let BridgeState::Running(task) = &mut this.state else {
            return Poll::Ready(Ok(()));
        };
        let joined = ready!(Pin::new(task).poll(cx));
        this.state = BridgeState::Done;

        let result = match joined {
            Ok(result) => result,
            Err(join_error) => Err(BodyError::stream_write_panic(join_error)),
        };
        Poll::Ready(result.map_err(io::Error::from))
    }
}

impl fmt::Debug for StreamWriterBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            BridgeState::Idle(..) => "idle",
            BridgeState::Running(_) => "running",
            BridgeState::Done => "done",
        };
        f.debug_struct("StreamWriterBridge").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_reads_what_producer_writes() {
        let mut bridge = StreamWriterBridge::new(|mut writer| async move {
            for i in 0..100u32 {
                writer.write_all(format!("line {i}\n").as_bytes()).await?;
            }
            Ok(())
        });

        let mut body = String::new();
        bridge.read_to_string(&mut body).await.unwrap();

        assert_eq!(body.lines().count(), 100);
        assert!(body.starts_with("line 0\n"));
        assert!(body.ends_with("line 99\n"));
    }

    #[tokio::test]
    async fn test_producer_error() {
        let mut bridge = StreamWriterBridge::new(|mut writer| async move {
            writer.write_all(b"partial").await?;
            Err(io::Error::new(io::ErrorKind::InvalidData, "source failed"))
        });

        let mut body = Vec::new();
        let error = bridge.read_to_end(&mut body).await.unwrap_err();

        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
        assert_eq!(body, b"partial");
    }

    #[tokio::test]
    async fn test_producer_panic() {
        let mut bridge = StreamWriterBridge::new(|mut writer| async move {
            writer.write_all(b"before").await?;
            panic!("producer exploded");
        });

        let mut body = Vec::new();
        let error = bridge.read_to_end(&mut body).await.unwrap_err();

        match BodyError::from_io(error) {
            BodyError::StreamWritePanic { message } => assert_eq!(message, "producer exploded"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dropped_consumer_fails_producer() {
        let (done_tx, done_rx) = oneshot::channel();
        let mut bridge = StreamWriterBridge::new(move |mut writer| async move {
            let chunk = [b'x'; 1024];
            let result = loop {
                if let Err(e) = writer.write_all(&chunk).await {
                    break e;
                }
            };
            let _ = done_tx.send(result.kind());
            Ok(())
        });

        let mut first = [0u8; 16];
        bridge.read_exact(&mut first).await.unwrap();
        drop(bridge);

        assert_eq!(done_rx.await.unwrap(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_producer_not_started_until_read() {
        let (started_tx, mut started_rx) = oneshot::channel::<()>();
        let mut bridge = StreamWriterBridge::new(move |_writer| async move {
            let _ = started_tx.send(());
            Ok(())
        });

        tokio::task::yield_now().await;
        assert!(started_rx.try_recv().is_err());

        let mut body = Vec::new();
        bridge.read_to_end(&mut body).await.unwrap();
        assert!(body.is_empty());
        assert!(started_rx.await.is_ok());
    }
}
