//! An asynchronous HTTP/1.x message body engine
//!
//! This crate reads, writes, streams and buffers the bodies of HTTP/1.x
//! messages on top of tokio. It covers the three ways HTTP/1.x frames a body
//! (a fixed Content-Length, chunked Transfer-Encoding, and reading until the
//! connection closes), compresses bodies on the fly, and recycles body buffers
//! through pools. Parsing the message head and owning the socket are left to
//! the caller.
//!
//! # Features
//!
//! - Fixed-length, chunked and close-delimited body reads with size limits
//! - Chunked encoding with trailers
//! - Bodies materialized into pooled buffers or streamed from the connection
//! - Producer-driven bodies written from a separate task
//! - gzip, deflate and brotli compression of buffered and streamed bodies
//! - Expect-continue handling for requests
//!
//! # Example
//!
//! ```no_run
//! use http::{Method, Request as HttpRequest};
//! use micro_body::message::{BodyReadStatus, Request, Response};
//! use micro_body::compress::CompressionLevel;
//! use micro_body::protocol::RequestHeader;
//! use tokio::io::BufReader;
//! use tokio::net::TcpStream;
//! use tracing::info;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = TcpStream::connect("127.0.0.1:8080").await?;
//!     let (reader, mut writer) = stream.into_split();
//!     let mut reader = BufReader::new(reader);
//!
//!     // the head has been parsed elsewhere
//!     let head = HttpRequest::builder()
//!         .method(Method::POST)
//!         .uri("/upload")
//!         .header(http::header::CONTENT_LENGTH, "5")
//!         .body(())?;
//!     let mut request = Request::with_header(RequestHeader::from(head));
//!
//!     if request.read_limit_body(&mut reader, 1024 * 1024).await? == BodyReadStatus::Complete {
//!         info!(len = request.try_body().await?.len(), "read request body");
//!     }
//!
//!     let mut response = Response::new();
//!     response.set_body("Hello World!\r\n".repeat(100).as_bytes());
//!     response.write_gzip_level(&mut writer, CompressionLevel::BestSpeed).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`pool`]: body buffers, the pools that recycle them and scratch copy buffers
//! - [`codec`]: framing readers and writers working on plain `tokio::io` traits
//! - [`protocol`]: message heads, framing rules, errors and the body representation
//! - [`compress`]: compression of buffered and streamed bodies, and decompression
//! - [`message`]: requests and responses tying a head to a body
//!
//! # Error Handling
//!
//! Every failure is a [`protocol::BodyError`]. Errors that pass through an
//! `AsyncRead` boundary are carried inside an `io::Error` and recovered with
//! [`protocol::BodyError::from_io`].
//!
//! # Limitations
//!
//! - HTTP/1.x only
//! - No header parsing beyond the trailer of a chunked body
//! - Maximum trailer size: 8KB
//! - Maximum number of trailer fields: 64

pub mod codec;
pub mod compress;
pub mod message;
pub mod pool;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
