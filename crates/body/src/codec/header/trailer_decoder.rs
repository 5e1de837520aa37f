//! Decoder for the trailer section that follows a chunked body.
//!
//! After the last-chunk line `0\r\n` comes an optional list of header fields and
//! a blank line. [`TrailerDecoder`] collects exactly those bytes and parses them
//! with `httparse`, never looking past the blank line so the next message on a
//! keep-alive connection stays untouched.

use bytes::{BufMut, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};
use httparse::Status;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::trace;

use crate::ensure;
use crate::protocol::BodyError;

/// Max number of fields accepted in a trailer section
pub const MAX_TRAILER_HEADERS: usize = 64;

/// Max size in bytes of a trailer section
pub const MAX_TRAILER_BYTES: usize = 8 * 1024;

/// Incremental decoder for a trailer section.
#[derive(Debug, Default)]
pub struct TrailerDecoder {
    buf: BytesMut,
}

impl TrailerDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds `src` to the decoder.
    ///
    /// Returns the number of bytes consumed and, once the blank line has been
    /// seen, the parsed fields. Bytes after the blank line are not consumed.
    pub fn decode(&mut self, src: &[u8]) -> Result<(usize, Option<HeaderMap>), BodyError> {
        for (i, &b) in src.iter().enumerate() {
            self.buf.put_u8(b);
            ensure!(
                self.buf.len() <= MAX_TRAILER_BYTES,
                BodyError::invalid_header(format!("trailer exceeds {MAX_TRAILER_BYTES} bytes"))
            );

            if self.is_complete() {
                let fields = self.parse()?;
                self.buf.clear();
                return Ok((i + 1, Some(fields)));
            }
        }
        Ok((src.len(), None))
    }

    /// Discards any partially collected section.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    fn is_complete(&self) -> bool {
        &self.buf[..] == b"\r\n" || self.buf.ends_with(b"\r\n\r\n")
    }

    fn parse(&self) -> Result<HeaderMap, BodyError> {
        let mut fields = HeaderMap::new();
        if &self.buf[..] == b"\r\n" {
            return Ok(fields);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_TRAILER_HEADERS];
        let parsed = match httparse::parse_headers(&self.buf, &mut headers) {
            Ok(Status::Complete((_, parsed))) => parsed,
            Ok(Status::Partial) => return Err(BodyError::invalid_header("incomplete trailer")),
            Err(e) => return Err(BodyError::invalid_header(format!("cannot parse trailer: {e}"))),
        };

        fields.reserve(parsed.len());
        for header in parsed.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(BodyError::invalid_header)?;
            let value = HeaderValue::from_bytes(header.value).map_err(BodyError::invalid_header)?;
            fields.append(name, value);
        }

        trace!(fields = fields.len(), "read trailer");
        Ok(fields)
    }
}

/// Reads the trailer section of a chunked body from `src`.
///
/// End of input before any trailer byte is treated as an empty trailer.
pub async fn read_trailer<R>(src: &mut R) -> Result<HeaderMap, BodyError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut decoder = TrailerDecoder::new();
    let mut seen = false;

    loop {
        let available = src.fill_buf().await?;
        if available.is_empty() {
            if seen {
                return Err(BodyError::broken_chunk_io(
                    "unexpected end of input in trailer",
                    std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
                ));
            }
            return Ok(HeaderMap::new());
        }

        seen = true;
        let (consumed, fields) = decoder.decode(available)?;
        src.consume(consumed);
        if let Some(fields) = fields {
            return Ok(fields);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[test]
    fn test_empty_trailer() {
        let mut decoder = TrailerDecoder::new();
        let (consumed, fields) = decoder.decode(b"\r\nGET / HTTP/1.1").unwrap();

        assert_eq!(consumed, 2);
        assert!(fields.unwrap().is_empty());
    }

    #[test]
    fn test_fields() {
        let mut decoder = TrailerDecoder::new();
        let (consumed, fields) = decoder.decode(b"Expires: never\r\nX-Sum: 1\r\nX-Sum: 2\r\n\r\nnext").unwrap();

        let fields = fields.unwrap();
        assert_eq!(consumed, 38);
        assert_eq!(fields.get("expires").unwrap(), "never");
        assert_eq!(fields.get_all("x-sum").iter().count(), 2);
    }

    #[test]
    fn test_split_input() {
        let mut decoder = TrailerDecoder::new();
        assert_eq!(decoder.decode(b"Expires: ne").unwrap(), (11, None));
        assert_eq!(decoder.decode(b"ver\r\n\r").unwrap(), (6, None));

        let (consumed, fields) = decoder.decode(b"\n").unwrap();
        assert_eq!(consumed, 1);
        assert_eq!(fields.unwrap().get("expires").unwrap(), "never");
    }

    #[test]
    fn test_invalid_field() {
        let mut decoder = TrailerDecoder::new();
        assert!(decoder.decode(b"bad header\r\n\r\n").is_err());
    }

    #[test]
    fn test_too_large() {
        let mut decoder = TrailerDecoder::new();
        let field = format!("X-Big: {}\r\n", "a".repeat(MAX_TRAILER_BYTES));
        assert!(matches!(decoder.decode(field.as_bytes()), Err(BodyError::InvalidHeader { .. })));
    }

    #[tokio::test]
    async fn test_read_trailer() {
        let data = b"Expires: never\r\n\r\nHTTP/1.1 200 OK";
        let mut src = BufReader::with_capacity(3, &data[..]);

        let fields = read_trailer(&mut src).await.unwrap();
        assert_eq!(fields.get("expires").unwrap(), "never");

        let rest = src.fill_buf().await.unwrap();
        assert!(rest.starts_with(b"H"));
    }

    #[tokio::test]
    async fn test_read_trailer_eof() {
        let mut src: &[u8] = b"";
        assert!(read_trailer(&mut src).await.unwrap().is_empty());

        let mut src: &[u8] = b"Expires: ne";
        assert!(read_trailer(&mut src).await.is_err());
    }
}
