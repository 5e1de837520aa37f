use std::io;
use thiserror::Error;

/// Errors produced while reading, writing or transforming a message body.
///
/// Every failure that escapes this crate is one of these variants. Errors that
/// travel through [`tokio::io::AsyncRead`] implementations are wrapped into an
/// [`io::Error`] and recovered with [`BodyError::from_io`].
#[derive(Error, Debug)]
pub enum BodyError {
    #[error("body size exceeds the given limit")]
    BodyTooLarge,

    #[error("broken chunked body: {reason}")]
    BrokenChunk {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("unexpected end of body, read {read} bytes, expected {expected}")]
    UnexpectedEnd { read: u64, expected: u64 },

    #[error("panic while writing body stream: {message}")]
    StreamWritePanic { message: String },

    #[error("body stream size mismatch, copied {copied} bytes instead of {expected}")]
    StreamSizeMismatch { copied: u64, expected: u64 },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("unsupported content encoding: {encoding}")]
    UnsupportedEncoding { encoding: String },

    #[error("io error: {source}")]
    Io {
        #[source]
        source: io::Error,
    },
}

impl BodyError {
    pub fn broken_chunk<S: ToString>(str: S) -> Self {
        Self::BrokenChunk { reason: str.to_string(), source: None }
    }

    pub fn broken_chunk_io<S: ToString>(str: S, source: io::Error) -> Self {
        Self::BrokenChunk { reason: str.to_string(), source: Some(source) }
    }

    /// The transport ended before the chunked framing was complete.
    pub fn chunk_eof() -> Self {
        Self::broken_chunk_io(
            "unexpected end of input while reading chunked body",
            io::Error::from(io::ErrorKind::UnexpectedEof),
        )
    }

    pub fn unexpected_end(read: u64, expected: u64) -> Self {
        Self::UnexpectedEnd { read, expected }
    }

    pub fn stream_write_panic<S: ToString>(str: S) -> Self {
        Self::StreamWritePanic { message: str.to_string() }
    }

    pub fn stream_size_mismatch(copied: u64, expected: u64) -> Self {
        Self::StreamSizeMismatch { copied, expected }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn unsupported_encoding<S: ToString>(str: S) -> Self {
        Self::UnsupportedEncoding { encoding: str.to_string() }
    }

    /// Converts an [`io::Error`] back into a `BodyError`, unwrapping a body
    /// error that was smuggled through an I/O interface.
    pub fn from_io(error: io::Error) -> Self {
        if !error.get_ref().is_some_and(|inner| inner.is::<BodyError>()) {
            return Self::Io { source: error };
        }

        match error.into_inner().map(|inner| inner.downcast::<BodyError>()) {
            Some(Ok(body_error)) => *body_error,
            _ => Self::invalid_body("lost wrapped body error"),
        }
    }

    /// Returns `true` when the peer reset or closed the connection.
    ///
    /// Response readers treat this as a clean end of the body.
    pub fn is_connection_reset(&self) -> bool {
        let source = match self {
            Self::Io { source } => source,
            Self::BrokenChunk { source: Some(source), .. } => source,
            _ => return false,
        };

        matches!(
            source.kind(),
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe
        )
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            Self::Io { source } => source.kind(),
            Self::UnexpectedEnd { .. } => io::ErrorKind::UnexpectedEof,
            Self::BrokenChunk { .. } | Self::InvalidBody { .. } | Self::InvalidHeader { .. } => {
                io::ErrorKind::InvalidData
            }
            _ => io::ErrorKind::Other,
        }
    }
}

impl From<io::Error> for BodyError {
    fn from(error: io::Error) -> Self {
        Self::from_io(error)
    }
}

impl From<BodyError> for io::Error {
    fn from(error: BodyError) -> Self {
        match error {
            BodyError::Io { source } => source,
            other => io::Error::new(other.io_kind(), other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_io() {
        let io_error: io::Error = BodyError::stream_write_panic("boom").into();
        assert_eq!(io_error.kind(), io::ErrorKind::Other);

        let body_error = BodyError::from_io(io_error);
        assert!(matches!(body_error, BodyError::StreamWritePanic { ref message } if message == "boom"));
    }

    #[test]
    fn test_plain_io_error_is_kept() {
        let body_error = BodyError::from(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(body_error.is_connection_reset());

        let io_error: io::Error = body_error.into();
        assert_eq!(io_error.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn test_connection_reset_inside_chunk_error() {
        let error = BodyError::broken_chunk_io("read failed", io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(error.is_connection_reset());
        assert!(!BodyError::chunk_eof().is_connection_reset());
        assert!(!BodyError::BodyTooLarge.is_connection_reset());
    }

    #[test]
    fn test_unexpected_end_kind() {
        let io_error: io::Error = BodyError::unexpected_end(3, 10).into();
        assert_eq!(io_error.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(io_error.to_string(), "unexpected end of body, read 3 bytes, expected 10");
    }
}
