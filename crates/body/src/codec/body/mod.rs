//! HTTP body handling module for reading and writing message payloads
//!
//! This module reads and writes HTTP message bodies using the different
//! transfer strategies of HTTP/1.x. Everything here works on plain
//! `tokio::io` traits, so the same code serves sockets, in-memory pipes and
//! byte slices in tests.
//!
//! # Components
//!
//! ## Readers
//! - [`read_fixed`]: Reads Content-Length delimited payloads
//! - [`read_until_end`]: Reads payloads delimited by connection close
//! - [`ChunkedDecoder`] / [`read_chunked`]: Decodes chunked transfer encoded payloads
//! - [`read_body`] / [`prefetch_body`]: Dispatch on the [`TransferLength`](crate::protocol::TransferLength)
//!
//! ## Writers
//! - [`write_chunk`] / [`write_chunked`]: Implements chunked transfer encoding
//! - [`write_fixed`]: Copies a stream of known size
//!
//! # Features
//!
//! - Support for chunked transfer encoding (RFC 7230)
//! - Content-Length based payload handling
//! - Size limits enforced before payload bytes are buffered
//! - Buffers recycled through [`crate::pool`]

mod chunked_decoder;
mod chunked_encoder;
mod fixed_reader;
mod identity_reader;
mod payload_reader;
mod stream_copy;

pub use chunked_decoder::{ChunkedDecoder, Decoded, read_chunked};
pub use chunked_encoder::{write_chunk, write_chunked};
pub use fixed_reader::{FIXED_INITIAL_CAPACITY, read_fixed};
pub use identity_reader::{IDENTITY_INITIAL_CAPACITY, read_until_end};
pub use payload_reader::{Prefetch, STREAM_PREFETCH_LIMIT, prefetch_body, read_body};
pub use stream_copy::{copy_stream, read_stream, write_fixed};
