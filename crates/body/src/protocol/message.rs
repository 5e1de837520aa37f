use crate::ensure;
use crate::protocol::BodyError;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue};

/// How the length of a message body is determined on the wire.
///
/// - Fixed: exactly the given number of bytes follow the head
/// - Chunked: the body uses chunked transfer encoding
/// - Identity: the body runs until the peer closes the connection
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransferLength {
    /// Body with a known length in bytes
    Fixed(u64),
    /// Body using chunked transfer encoding
    Chunked,
    /// Body delimited by connection close
    Identity,
}

impl TransferLength {
    /// Returns true if the body uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, TransferLength::Chunked)
    }

    /// Returns true if the body is delimited by connection close
    #[inline]
    pub fn is_identity(&self) -> bool {
        matches!(self, TransferLength::Identity)
    }

    /// Returns the declared length for fixed-size bodies
    #[inline]
    pub fn fixed(&self) -> Option<u64> {
        match self {
            TransferLength::Fixed(len) => Some(*len),
            _ => None,
        }
    }

    /// Derives the transfer length from message headers.
    ///
    /// A `Transfer-Encoding` ending in `chunked` takes precedence over
    /// `Content-Length`. Repeated `Content-Length` values must agree.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, BodyError> {
        for value in headers.get_all(TRANSFER_ENCODING) {
            let value = value.to_str().map_err(|e| BodyError::invalid_header(format!("transfer-encoding: {e}")))?;
            let last = value.rsplit(',').next().unwrap_or_default().trim();
            if last.eq_ignore_ascii_case("chunked") {
                return Ok(TransferLength::Chunked);
            }
        }

        let mut length = None;
        for value in headers.get_all(CONTENT_LENGTH) {
            let parsed = parse_content_length(value.as_bytes())
                .ok_or_else(|| BodyError::invalid_header(format!("invalid content-length: {value:?}")))?;
            if let Some(previous) = length {
                ensure!(previous == parsed, BodyError::invalid_header("conflicting content-length values"));
            }
            length = Some(parsed);
        }

        Ok(length.map_or(TransferLength::Identity, TransferLength::Fixed))
    }

    /// Writes this transfer length into `headers`, removing the competing field.
    pub fn apply(self, headers: &mut HeaderMap) {
        match self {
            TransferLength::Fixed(len) => {
                headers.remove(TRANSFER_ENCODING);
                headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
            }
            TransferLength::Chunked => {
                headers.remove(CONTENT_LENGTH);
                headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }
            TransferLength::Identity => {
                headers.remove(CONTENT_LENGTH);
                headers.remove(TRANSFER_ENCODING);
            }
        }
    }
}

fn parse_content_length(value: &[u8]) -> Option<u64> {
    let value = value.trim_ascii();
    if value.is_empty() {
        return None;
    }

    value.iter().try_fold(0u64, |acc, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add(u64::from(b - b'0'))
    })
}

/// The header fields a message body reads and writes.
///
/// Implemented by [`RequestHeader`](crate::protocol::RequestHeader) and
/// [`ResponseHeader`](crate::protocol::ResponseHeader). The body engine only
/// touches framing, content coding and the trailer; everything else in the
/// head belongs to the caller.
pub trait BodyHeader {
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Trailer fields sent after a chunked body.
    fn trailer(&self) -> &HeaderMap;

    fn trailer_mut(&mut self) -> &mut HeaderMap;

    fn transfer_length(&self) -> Result<TransferLength, BodyError> {
        TransferLength::from_headers(self.headers())
    }

    fn set_transfer_length(&mut self, transfer_length: TransferLength) {
        transfer_length.apply(self.headers_mut());
    }

    fn content_encoding(&self) -> Option<&HeaderValue> {
        self.headers().get(CONTENT_ENCODING).filter(|value| !value.is_empty())
    }

    fn set_content_encoding(&mut self, encoding: &'static str) {
        self.headers_mut().insert(CONTENT_ENCODING, HeaderValue::from_static(encoding));
    }

    fn content_type(&self) -> Option<&HeaderValue> {
        self.headers().get(CONTENT_TYPE)
    }

    /// A missing content type counts as plain text, which is compressible.
    fn is_compressible_content_type(&self) -> bool {
        match self.content_type().map(HeaderValue::to_str) {
            None => true,
            Some(Ok(content_type)) => crate::compress::is_compressible(content_type),
            Some(Err(_)) => false,
        }
    }

    fn set_trailer(&mut self, trailer: HeaderMap) {
        *self.trailer_mut() = trailer;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(fields: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in fields {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_content_length() {
        let map = headers(&[("content-length", "42")]);
        assert_eq!(TransferLength::from_headers(&map).unwrap(), TransferLength::Fixed(42));
    }

    #[test]
    fn test_chunked_wins_over_content_length() {
        let map = headers(&[("content-length", "42"), ("transfer-encoding", "gzip, chunked")]);
        assert_eq!(TransferLength::from_headers(&map).unwrap(), TransferLength::Chunked);
    }

    #[test]
    fn test_no_framing_is_identity() {
        assert_eq!(TransferLength::from_headers(&HeaderMap::new()).unwrap(), TransferLength::Identity);
    }

    #[test]
    fn test_invalid_content_length() {
        for value in ["", "+5", "-1", "12a", "99999999999999999999999"] {
            let mut map = HeaderMap::new();
            map.insert(CONTENT_LENGTH, HeaderValue::from_str(value).unwrap());
            assert!(matches!(TransferLength::from_headers(&map), Err(BodyError::InvalidHeader { .. })), "{value}");
        }
    }

    #[test]
    fn test_conflicting_content_length() {
        let map = headers(&[("content-length", "1"), ("content-length", "2")]);
        assert!(TransferLength::from_headers(&map).is_err());

        let map = headers(&[("content-length", "2"), ("content-length", " 2 ")]);
        assert_eq!(TransferLength::from_headers(&map).unwrap(), TransferLength::Fixed(2));
    }

    #[test]
    fn test_apply() {
        let mut map = headers(&[("content-length", "42")]);
        TransferLength::Chunked.apply(&mut map);
        assert!(map.get(CONTENT_LENGTH).is_none());
        assert_eq!(map.get(TRANSFER_ENCODING).unwrap(), "chunked");

        TransferLength::Fixed(7).apply(&mut map);
        assert!(map.get(TRANSFER_ENCODING).is_none());
        assert_eq!(map.get(CONTENT_LENGTH).unwrap(), "7");

        TransferLength::Identity.apply(&mut map);
        assert!(map.is_empty());
    }
}
