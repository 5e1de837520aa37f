//! Message body storage and streaming.
//!
//! A [`MessageBody`] holds the body of a request or response in one of the
//! states of [`BodyState`]: absent, materialized into a pooled buffer,
//! immutable caller bytes, or a [`BodyStream`] that has not been read yet.
//!
//! Streams come in three flavours:
//!
//! - a caller-supplied reader, see [`BodyStream::new`]
//! - a [`StreamingBodyReader`] serving a body still on the connection, which
//!   hands the transport back through a [`Reclaim`] once it is done
//! - a [`StreamWriterBridge`] fed by a producer task writing into a [`BodyWriter`]

mod body_channel;
mod message_body;
mod stream;
mod streaming_reader;

pub use body_channel::BodyWriter;
pub use body_channel::StreamWriterBridge;
pub use body_channel::BRIDGE_PIPE_CAPACITY;
pub use message_body::BodyState;
pub use message_body::MessageBody;
pub use stream::BodyStream;
pub use streaming_reader::Reclaim;
pub use streaming_reader::Reclaimed;
pub use streaming_reader::StreamingBodyReader;
pub use streaming_reader::Transport;
