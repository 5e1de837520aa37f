//! HTTP head encoder for serializing request and response heads and trailers
//!
//! This module serializes the start line and header fields of a message into
//! raw bytes. The framing fields (`Content-Length` / `Transfer-Encoding`) are
//! expected to be set on the header before encoding; the message writers in
//! [`crate::message`] take care of that.
//!
//! # Features
//!
//! - Status line and request line serialization
//! - HTTP/1.0 and HTTP/1.1 support
//! - Trailer section serialization for chunked bodies

use crate::protocol::{BodyError, BodyHeader, RequestHeader, ResponseHeader};

use bytes::{BufMut, BytesMut};

use http::{HeaderMap, HeaderValue, Version, header};
use std::io;
use std::io::Write;
use tracing::error;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

fn version_str(version: Version) -> Result<&'static str, BodyError> {
    match version {
        Version::HTTP_11 => Ok("HTTP/1.1"),
        Version::HTTP_10 => Ok("HTTP/1.0"),
        v => {
            error!(http_version = ?v, "unsupported http version");
            Err(io::Error::from(io::ErrorKind::Unsupported).into())
        }
    }
}

/// Encodes the status line and header fields of a response, including the blank line.
pub fn encode_response_head(head: &ResponseHeader, dst: &mut BytesMut) -> Result<(), BodyError> {
    dst.reserve(INIT_HEADER_SIZE);

    let status = head.status();
    write!(
        FastWrite(dst),
        "{} {} {}\r\n",
        version_str(head.version())?,
        status.as_str(),
        status.canonical_reason().unwrap_or_default()
    )?;

    encode_fields(head.headers(), dst);
    dst.put_slice(b"\r\n");
    Ok(())
}

/// Encodes the request line and header fields of a request, including the blank line.
///
/// A missing `Host` field is taken from the URI authority. A request with
/// neither is rejected.
pub fn encode_request_head(head: &RequestHeader, dst: &mut BytesMut) -> Result<(), BodyError> {
    dst.reserve(INIT_HEADER_SIZE);

    let uri = head.uri();
    let target = uri.path_and_query().map_or("/", |path| path.as_str());
    write!(FastWrite(dst), "{} {} {}\r\n", head.method(), target, version_str(head.version())?)?;

    if !head.headers().contains_key(header::HOST) {
        let authority = uri.authority().ok_or_else(|| BodyError::invalid_header("missing required Host header"))?;
        let host = HeaderValue::from_str(authority.as_str()).map_err(BodyError::invalid_header)?;
        dst.put_slice(b"host: ");
        dst.put_slice(host.as_bytes());
        dst.put_slice(b"\r\n");
    }

    encode_fields(head.headers(), dst);
    dst.put_slice(b"\r\n");
    Ok(())
}

/// Encodes the trailer section that follows the last chunk, including the final blank line.
pub fn encode_trailer(trailer: &HeaderMap, dst: &mut BytesMut) {
    encode_fields(trailer, dst);
    dst.put_slice(b"\r\n");
}

fn encode_fields(fields: &HeaderMap, dst: &mut BytesMut) {
    for (header_name, header_value) in fields.iter() {
        dst.put_slice(header_name.as_ref());
        dst.put_slice(b": ");
        dst.put_slice(header_value.as_ref());
        dst.put_slice(b"\r\n");
    }
}

/// Fast writer implementation for writing to BytesMut.
///
/// This is an optimization to avoid unnecessary bounds checking when writing
/// to the bytes buffer, since we've already reserved enough space.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    /// Writes a buffer into this writer, returning how many bytes were written.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    /// Flush this output stream, ensuring that all intermediately buffered contents reach their destination.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
