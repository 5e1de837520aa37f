//! HTTP codec module for reading and writing HTTP/1.x message bodies
//!
//! This module holds the wire-level building blocks of the body engine. It is
//! organized into two components:
//!
//! - [`body`]: payload readers and writers for every framing
//!   - Content-Length delimited bodies
//!   - Chunked transfer encoding
//!   - Bodies delimited by connection close
//!
//! - [`header`]: head and trailer serialization, trailer parsing
//!
//! # Example
//!
//! ```no_run
//! use micro_body::codec::body::{read_chunked, write_chunked};
//! use micro_body::pool::BodyBuf;
//!
//! # async fn demo() -> Result<(), micro_body::protocol::BodyError> {
//! let mut wire = Vec::new();
//! write_chunked(&mut wire, &mut &b"hello world"[..]).await?;
//!
//! let mut body = BodyBuf::new();
//! read_chunked(&mut &wire[..], &mut body, 0).await?;
//! assert_eq!(&body[..], b"hello world");
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - Streaming processing of HTTP message bodies
//! - Support for chunked transfer encoding
//! - Content-Length based payload handling
//! - State machine based chunk decoding

pub mod body;
pub mod header;
