//! HTTP request header handling.
//!
//! [`RequestHeader`] wraps the standard `http::Request<()>` and adds the
//! pieces the body engine needs from a request head: the trailer fields of a
//! chunked body, `Expect: 100-continue` detection, and whether the method
//! carries a body at all.

use http::header::EXPECT;
use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

use crate::protocol::{BodyError, BodyHeader};

/// Represents an HTTP request header.
///
/// This struct wraps a `http::Request<()>` to provide:
/// - Access to standard HTTP header fields
/// - Conversion from parsed request heads
/// - Trailer storage for chunked bodies
#[derive(Debug, Default)]
pub struct RequestHeader {
    inner: Request<()>,
    trailer: HeaderMap,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    /// Consumes the header and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Returns a reference to the request's HTTP method.
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    /// Returns a reference to the request's URI.
    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    /// Returns the request's HTTP version.
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Returns true if the client waits for `100 Continue` before sending the body.
    pub fn may_continue(&self) -> bool {
        self.inner
            .headers()
            .get(EXPECT)
            .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"))
    }

    /// Returns true for methods whose requests never carry a body.
    ///
    /// A bodyless GET or HEAD is written without a `Content-Length: 0` field.
    pub fn ignore_body(&self) -> bool {
        matches!(self.method(), &Method::GET | &Method::HEAD)
    }

    pub(crate) fn copy_to(&self, dst: &mut RequestHeader) {
        let inner = &mut dst.inner;
        inner.method_mut().clone_from(self.inner.method());
        inner.uri_mut().clone_from(self.inner.uri());
        *inner.version_mut() = self.inner.version();
        inner.headers_mut().clone_from(self.inner.headers());
        dst.trailer.clone_from(&self.trailer);
    }
}

impl BodyHeader for RequestHeader {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn trailer(&self) -> &HeaderMap {
        &self.trailer
    }

    fn trailer_mut(&mut self) -> &mut HeaderMap {
        &mut self.trailer
    }
}

/// Converts request parts into a RequestHeader.
impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()), trailer: HeaderMap::new() }
    }
}

/// Converts a bodyless request into a RequestHeader.
impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner, trailer: HeaderMap::new() }
    }
}

/// Converts a parsed HTTP request head into a RequestHeader.
impl<'headers, 'buf> TryFrom<httparse::Request<'headers, 'buf>> for RequestHeader {
    type Error = BodyError;

    fn try_from(req: httparse::Request<'headers, 'buf>) -> Result<Self, Self::Error> {
        let method = req.method.ok_or_else(|| BodyError::invalid_header("missing request method"))?;
        let path = req.path.ok_or_else(|| BodyError::invalid_header("missing request path"))?;
        let version = req.version.ok_or_else(|| BodyError::invalid_header("missing request version"))?;

        let mut builder = Request::builder().method(method).uri(path).version(http_version(version)?);

        if let Some(headers) = builder.headers_mut() {
            headers.reserve(req.headers.len());
        }
        for header in req.headers.iter() {
            builder = builder.header(header.name, header.value);
        }

        let inner = builder.body(()).map_err(BodyError::invalid_header)?;
        Ok(RequestHeader { inner, trailer: HeaderMap::new() })
    }
}

/// Maps the minor version `httparse` reports for an `HTTP/1.x` head.
pub(crate) fn http_version(minor: u8) -> Result<Version, BodyError> {
    match minor {
        1 => Ok(Version::HTTP_11),
        0 => Ok(Version::HTTP_10),
        _ => Err(BodyError::invalid_header(format!("unsupported version HTTP/1.{minor}"))),
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;
    use crate::protocol::TransferLength;

    fn parse(raw: &str) -> RequestHeader {
        let mut headers = [httparse::EMPTY_HEADER; 16];
        let mut parsed_req = httparse::Request::new(&mut headers);
        parsed_req.parse(raw.as_bytes()).unwrap();
        RequestHeader::try_from(parsed_req).unwrap()
    }

    #[test]
    fn from_curl() {
        let header = parse("GET /index.html HTTP/1.1\r\nHost: 127.0.0.1:8080\r\nUser-Agent: curl/7.79.1\r\nAccept: */*\r\n\r\n");

        assert_eq!(header.method(), &Method::GET);
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.uri().path(), "/index.html");
        assert_eq!(header.headers().len(), 3);
        assert_eq!(header.headers().get(http::header::ACCEPT), Some(&HeaderValue::from_static("*/*")));

        assert!(header.ignore_body());
        assert!(!header.may_continue());
        assert_eq!(header.transfer_length().unwrap(), TransferLength::Identity);
    }

    #[test]
    fn from_upload() {
        let header = parse(
            "POST /upload?a=1 HTTP/1.1\r\nHost: 127.0.0.1:8080\r\nExpect: 100-Continue\r\nTransfer-Encoding: chunked\r\n\r\n",
        );

        assert_eq!(header.method(), &Method::POST);
        assert_eq!(header.uri().query(), Some("a=1"));
        assert!(!header.ignore_body());
        assert!(header.may_continue());
        assert_eq!(header.transfer_length().unwrap(), TransferLength::Chunked);
    }

    #[test]
    fn copy_keeps_trailer() {
        let mut header = parse("PUT /a HTTP/1.0\r\nHost: x\r\nContent-Length: 3\r\n\r\n");
        header.trailer_mut().insert("x-checksum", HeaderValue::from_static("abc"));

        let mut copy = RequestHeader::default();
        header.copy_to(&mut copy);

        assert_eq!(copy.method(), &Method::PUT);
        assert_eq!(copy.version(), Version::HTTP_10);
        assert_eq!(copy.transfer_length().unwrap(), TransferLength::Fixed(3));
        assert_eq!(copy.trailer().get("x-checksum").unwrap(), "abc");
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut headers = [httparse::EMPTY_HEADER; 1];
        let mut parsed_req = httparse::Request::new(&mut headers);
        parsed_req.method = Some("GET");
        parsed_req.path = Some("/");
        parsed_req.version = Some(2);

        let error = RequestHeader::try_from(parsed_req).unwrap_err();
        assert!(matches!(error, BodyError::InvalidHeader { .. }));
        assert_eq!(http_version(0).unwrap(), Version::HTTP_10);
    }
}
