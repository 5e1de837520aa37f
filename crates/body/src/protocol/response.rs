//! HTTP response header handling.
//!
//! [`ResponseHeader`] wraps `http::Response<()>` with the trailer fields of a
//! chunked body and the status rules that decide whether a body is present.

use http::{HeaderMap, Response, StatusCode, Version};

use crate::protocol::request::http_version;
use crate::protocol::{BodyError, BodyHeader};

/// Represents an HTTP response header.
#[derive(Debug, Default)]
pub struct ResponseHeader {
    inner: Response<()>,
    trailer: HeaderMap,
}

impl AsRef<Response<()>> for ResponseHeader {
    fn as_ref(&self) -> &Response<()> {
        &self.inner
    }
}

impl AsMut<Response<()>> for ResponseHeader {
    fn as_mut(&mut self) -> &mut Response<()> {
        &mut self.inner
    }
}

impl ResponseHeader {
    pub fn new(status: StatusCode) -> Self {
        let mut inner = Response::new(());
        *inner.status_mut() = status;
        Self { inner, trailer: HeaderMap::new() }
    }

    /// Consumes the header and returns the inner `Response<()>`.
    pub fn into_inner(self) -> Response<()> {
        self.inner
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        *self.inner.status_mut() = status;
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Returns true when the status code forbids a message body.
    ///
    /// Applies to informational responses, `204 No Content` and `304 Not Modified`.
    pub fn must_skip_body(&self) -> bool {
        let status = self.status();
        status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
    }

    pub(crate) fn copy_to(&self, dst: &mut ResponseHeader) {
        let inner = &mut dst.inner;
        *inner.status_mut() = self.inner.status();
        *inner.version_mut() = self.inner.version();
        inner.headers_mut().clone_from(self.inner.headers());
        dst.trailer.clone_from(&self.trailer);
    }
}

impl BodyHeader for ResponseHeader {
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

impl From<Response<()>> for ResponseHeader {
    #[inline]
    fn from(inner: Response<()>) -> Self {
        Self { inner, trailer: HeaderMap::new() }
    }
}

/// Converts a parsed HTTP response head into a ResponseHeader.
impl<'headers, 'buf> TryFrom<httparse::Response<'headers, 'buf>> for ResponseHeader {
    type Error = BodyError;

    fn try_from(resp: httparse::Response<'headers, 'buf>) -> Result<Self, Self::Error> {
        let code = resp.code.ok_or_else(|| BodyError::invalid_header("missing status code"))?;
        let version = resp.version.ok_or_else(|| BodyError::invalid_header("missing response version"))?;

        let mut builder = Response::builder().status(code).version(http_version(version)?);
        if let Some(headers) = builder.headers_mut() {
            headers.reserve(resp.headers.len());
        }
        for header in resp.headers.iter() {
            builder = builder.header(header.name, header.value);
        }

        let inner = builder.body(()).map_err(BodyError::invalid_header)?;
        Ok(ResponseHeader { inner, trailer: HeaderMap::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TransferLength;

    #[test]
    fn from_parsed() {
        let mut headers = [httparse::EMPTY_HEADER; 8];
        let mut parsed = httparse::Response::new(&mut headers);
        parsed.parse(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 12\r\n\r\n").unwrap();

        let header = ResponseHeader::try_from(parsed).unwrap();
        assert_eq!(header.status(), StatusCode::OK);
        assert_eq!(header.content_type().unwrap(), "text/plain");
        assert_eq!(header.transfer_length().unwrap(), TransferLength::Fixed(12));
        assert!(!header.must_skip_body());
    }

    #[test]
    fn skip_body_statuses() {
        for status in [StatusCode::CONTINUE, StatusCode::SWITCHING_PROTOCOLS, StatusCode::NO_CONTENT, StatusCode::NOT_MODIFIED] {
            assert!(ResponseHeader::new(status).must_skip_body(), "{status}");
        }
        for status in [StatusCode::OK, StatusCode::NOT_FOUND, StatusCode::INTERNAL_SERVER_ERROR] {
            assert!(!ResponseHeader::new(status).must_skip_body(), "{status}");
        }
    }
}
