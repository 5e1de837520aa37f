//! Decoder implementation for HTTP chunked transfer encoding.
//!
//! This module provides functionality to decode HTTP message bodies that use chunked transfer
//! encoding as specified in [RFC 7230 Section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1).
//!
//! The chunked encoding allows the sender to transmit message data in a series of chunks,
//! indicating the size of each chunk before its data.
//!
//! [`ChunkedDecoder`] is a byte-level state machine that never performs I/O itself: it is fed
//! slices of input and reports how many bytes were framing and how many were payload. The
//! same decoder drives both the eager [`read_chunked`] reader and the streaming body reader.
//! Decoding stops right after the `0\r\n` line of the last chunk; the trailer section that
//! follows is left in the input for the trailer decoder.

use std::cmp;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::trace;
use ChunkedState::*;

use crate::pool::BodyBuf;
use crate::protocol::BodyError;
use crate::utils::clamp_len;

/// A decoder for handling HTTP chunked transfer encoding.
///
/// The decoder processes incoming bytes according to the chunked format:
/// - Each chunk starts with its size in hexadecimal
/// - Followed by optional extensions and CRLF
/// - Then the chunk data and CRLF
/// - A zero-sized chunk indicates the end of the message
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
    size_digits: u32,
    decoded: u64,
    max_size: u64,
}

/// The outcome of feeding a slice to [`ChunkedDecoder::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// The first `n` bytes were framing and can be discarded
    Framing(usize),
    /// The first `n` bytes are body payload
    Data(usize),
    /// The last-chunk line ended within the first `n` bytes
    End(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk size in hex
    Size,
    /// Handle whitespace after size
    SizeLws,
    /// Skip chunk extensions
    Extension,
    /// Read LF after chunk size
    SizeLf,
    /// Read chunk data
    Body,
    /// Read CR after chunk data
    BodyCr,
    /// Read LF after chunk data
    BodyLf,
    /// Final state after reading the last chunk line
    End,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    /// Creates a new ChunkedDecoder instance without a size limit.
    ///
    /// The decoder starts in the Size state, ready to read the size of the first chunk.
    pub fn new() -> Self {
        Self::with_max_size(0)
    }

    /// Creates a decoder that fails once the decoded payload would exceed `max_size` bytes.
    ///
    /// A `max_size` of zero means unlimited. The limit is checked when a chunk size
    /// line completes, before any byte of that chunk is produced.
    pub fn with_max_size(max_size: u64) -> Self {
        Self { state: Size, remaining_size: 0, size_digits: 0, decoded: 0, max_size }
    }

    /// Returns true once the last chunk has been seen.
    pub fn is_done(&self) -> bool {
        self.state == End
    }

    /// The number of payload bytes announced by the chunk size lines seen so far.
    pub fn decoded_len(&self) -> u64 {
        self.decoded
    }

    /// Feeds `src` to the state machine.
    ///
    /// At most `limit` payload bytes are reported by a single call. The caller
    /// must consume exactly the reported number of bytes before the next call.
    /// On error, no byte past the offending one has been looked at.
    pub fn decode(&mut self, src: &[u8], limit: usize) -> Result<Decoded, BodyError> {
        if self.state == Body {
            let len = cmp::min(cmp::min(clamp_len(self.remaining_size), src.len()), limit);
            self.remaining_size -= len as u64;
            if self.remaining_size == 0 {
                self.state = BodyCr;
            }
            trace!(len, "read chunked bytes");
            return Ok(Decoded::Data(len));
        }

        let mut consumed = 0;
        for &b in src {
            if matches!(self.state, Body | End) {
                break;
            }
            self.state = self.step(b)?;
            consumed += 1;
        }

        if self.state == End {
            trace!(size = self.decoded, "finished reading chunked data");
            Ok(Decoded::End(consumed))
        } else {
            Ok(Decoded::Framing(consumed))
        }
    }

    /// Processes the next framing byte.
    fn step(&mut self, b: u8) -> Result<ChunkedState, BodyError> {
        match self.state {
            Size => self.read_size(b),
            SizeLws => Self::read_size_lws(b),
            Extension => Self::read_extension(b),
            SizeLf => self.read_size_lf(b),
            BodyCr => Self::read_body_cr(b),
            BodyLf => self.read_body_lf(b),
            Body | End => Ok(self.state),
        }
    }

    /// Reads and parses the chunk size in hexadecimal format.
    ///
    /// The size is read digit by digit until a delimiter is encountered.
    /// Supports both uppercase and lowercase hex digits. A delimiter before
    /// the first digit is an error.
    ///
    /// # State Transitions
    /// - On hex digit (0-9, a-f, A-F): Stay in Size state to read more digits
    /// - On whitespace (tab/space): Transition to SizeLws state
    /// - On semicolon: Transition to Extension state to handle chunk extensions
    /// - On CR: Transition to SizeLf state to finish size line
    /// - On invalid character: Return error
    fn read_size(&mut self, b: u8) -> Result<ChunkedState, BodyError> {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b + 10 - b'a',
            b'A'..=b'F' => b + 10 - b'A',
            b'\t' | b' ' | b';' | b'\r' if self.size_digits == 0 => {
                return Err(BodyError::broken_chunk("invalid chunk size line: missing size"));
            }
            b'\t' | b' ' => return Ok(SizeLws),
            b';' => return Ok(Extension),
            b'\r' => return Ok(SizeLf),
            _ => return Err(BodyError::broken_chunk("invalid chunk size line: invalid size")),
        };

        self.remaining_size = self
            .remaining_size
            .checked_mul(16)
            .and_then(|size| size.checked_add(u64::from(digit)))
            .ok_or_else(|| BodyError::broken_chunk("invalid overflow chunked length"))?;
        self.size_digits += 1;

        Ok(Size)
    }

    /// Processes linear whitespace (LWS) after the chunk size.
    ///
    /// State transitions:
    /// - On tab/space: Stay in SizeLws state to handle more whitespace
    /// - On semicolon: Move to Extension state to process chunk extensions
    /// - On CR: Move to SizeLf state to finish size line
    /// - On invalid char: Return error
    fn read_size_lws(b: u8) -> Result<ChunkedState, BodyError> {
        match b {
            // LWS can follow the chunk size, but no more digits can come
            b'\t' | b' ' => Ok(SizeLws),
            b';' => Ok(Extension),
            b'\r' => Ok(SizeLf),
            _ => Err(BodyError::broken_chunk("invalid chunk size linear white space")),
        }
    }

    /// Skips chunk extensions.
    ///
    /// Extensions end at CRLF. A plain LF inside an extension is rejected.
    fn read_extension(b: u8) -> Result<ChunkedState, BodyError> {
        // We don't care about extensions really at all. Just ignore them.
        // They "end" at the next CRLF.
        //
        // However, some implementations may not check for the CR, so to save
        // them from themselves, we reject extensions containing plain LF as
        // well.
        match b {
            b'\r' => Ok(SizeLf),
            b'\n' => Err(BodyError::broken_chunk("invalid chunk extension contains newline")),
            _ => Ok(Extension), // no supported extensions
        }
    }

    /// Validates the LF byte after the chunk size line.
    ///
    /// A complete size line is where the size limit is enforced.
    ///
    /// # State Transitions
    /// - On LF with size 0: Move to End state, the trailer follows
    /// - On LF with size > 0: Move to Body state to read chunk data
    /// - On any other byte: Return error
    fn read_size_lf(&mut self, b: u8) -> Result<ChunkedState, BodyError> {
        if b != b'\n' {
            return Err(BodyError::broken_chunk("invalid chunk size LF"));
        }

        if self.remaining_size == 0 {
            return Ok(End);
        }

        let total = self.decoded.saturating_add(self.remaining_size);
        if self.max_size > 0 && total > self.max_size {
            return Err(BodyError::BodyTooLarge);
        }
        self.decoded = total;
        Ok(Body)
    }

    /// Validates the CR byte after chunk data.
    fn read_body_cr(b: u8) -> Result<ChunkedState, BodyError> {
        match b {
            b'\r' => Ok(BodyLf),
            _ => Err(BodyError::broken_chunk("cannot find crlf at the end of chunk")),
        }
    }

    /// Validates the LF byte after chunk data and starts the next size line.
    fn read_body_lf(&mut self, b: u8) -> Result<ChunkedState, BodyError> {
        match b {
            b'\n' => {
                self.remaining_size = 0;
                self.size_digits = 0;
                Ok(Size)
            }
            _ => Err(BodyError::broken_chunk("cannot find crlf at the end of chunk")),
        }
    }
}

/// Decodes a chunked body from `src` and appends the payload to `dst`.
///
/// Reading stops right after the last-chunk line, so the trailer section is
/// still unread in `src`. A non-zero `max_size` bounds the decoded payload.
/// End of input before the last chunk is a [`BodyError::BrokenChunk`].
pub async fn read_chunked<R>(src: &mut R, dst: &mut BodyBuf, max_size: usize) -> Result<(), BodyError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut decoder = ChunkedDecoder::with_max_size(max_size as u64);

    loop {
        let available = match src.fill_buf().await {
            Ok(available) => available,
            Err(e) => return Err(BodyError::broken_chunk_io("cannot read chunked body", e)),
        };
        if available.is_empty() {
            return Err(BodyError::chunk_eof());
        }

        let consumed = match decoder.decode(available, usize::MAX)? {
            Decoded::Framing(n) => n,
            Decoded::Data(n) => {
                dst.extend_from_slice(&available[..n]);
                n
            }
            Decoded::End(n) => {
                src.consume(n);
                return Ok(());
            }
        };
        src.consume(consumed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    fn decode_all(decoder: &mut ChunkedDecoder, mut src: &[u8]) -> Result<(Vec<u8>, usize), BodyError> {
        let total = src.len();
        let mut body = Vec::new();
        loop {
            match decoder.decode(src, usize::MAX)? {
                Decoded::Framing(n) => src = &src[n..],
                Decoded::Data(n) => {
                    body.extend_from_slice(&src[..n]);
                    src = &src[n..];
                }
                Decoded::End(n) => return Ok((body, total - src.len() + n)),
            }
            if src.is_empty() {
                return Ok((body, total));
            }
        }
    }

    #[test]
    fn test_basic() {
        let mut decoder = ChunkedDecoder::new();
        let (body, consumed) = decode_all(&mut decoder, b"10\r\n1234567890abcdef\r\n0\r\n\r\n").unwrap();

        assert_eq!(body, b"1234567890abcdef");
        assert!(decoder.is_done());
        // the final CRLF belongs to the trailer section
        assert_eq!(consumed, 25);
    }

    #[test]
    fn test_multiple_chunks() {
        let mut decoder = ChunkedDecoder::new();
        let (body, _) = decode_all(&mut decoder, b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n").unwrap();

        assert_eq!(body, b"hello, world");
        assert_eq!(decoder.decoded_len(), 12);
    }

    #[test]
    fn test_chunks_with_extensions() {
        let mut decoder = ChunkedDecoder::new();
        let (body, _) = decode_all(&mut decoder, b"5;chunk-ext=value\r\nhello\r\n0;last\r\n\r\n").unwrap();

        assert_eq!(body, b"hello");
        assert!(decoder.is_done());
    }

    #[test]
    fn test_size_with_whitespace() {
        let mut decoder = ChunkedDecoder::new();
        let (body, _) = decode_all(&mut decoder, b"5 \t\r\nhello\r\n0\r\n").unwrap();

        assert_eq!(body, b"hello");
        assert!(decoder.is_done());
    }

    #[test]
    fn test_incomplete_chunk() {
        let mut decoder = ChunkedDecoder::new();
        let (body, _) = decode_all(&mut decoder, b"5\r\nhel").unwrap();
        assert_eq!(body, b"hel");
        assert!(!decoder.is_done());

        let (body, _) = decode_all(&mut decoder, b"lo\r\n0\r\n\r\n").unwrap();
        assert_eq!(body, b"lo");
        assert!(decoder.is_done());
    }

    #[test]
    fn test_data_limit() {
        let mut decoder = ChunkedDecoder::new();
        let src = b"a\r\n0123456789\r\n";

        assert_eq!(decoder.decode(src, 4).unwrap(), Decoded::Framing(3));
        assert_eq!(decoder.decode(&src[3..], 4).unwrap(), Decoded::Data(4));
        assert_eq!(decoder.decode(&src[7..], 4).unwrap(), Decoded::Data(4));
        assert_eq!(decoder.decode(&src[11..], 4).unwrap(), Decoded::Data(2));
    }

    #[test]
    fn test_invalid_chunk_size() {
        let mut decoder = ChunkedDecoder::new();
        assert!(matches!(decoder.decode(b"xyz\r\n", usize::MAX), Err(BodyError::BrokenChunk { .. })));
    }

    #[test]
    fn test_missing_chunk_size() {
        let mut decoder = ChunkedDecoder::new();
        assert!(matches!(decoder.decode(b"\r\nhello", usize::MAX), Err(BodyError::BrokenChunk { .. })));

        let mut decoder = ChunkedDecoder::new();
        assert!(matches!(decoder.decode(b";ext\r\n", usize::MAX), Err(BodyError::BrokenChunk { .. })));
    }

    #[test]
    fn test_overflow_chunk_size() {
        let mut decoder = ChunkedDecoder::new();
        let result = decoder.decode(b"fffffffffffffffff\r\n", usize::MAX);
        assert!(matches!(result, Err(BodyError::BrokenChunk { .. })));
    }

    #[test]
    fn test_missing_crlf() {
        let mut decoder = ChunkedDecoder::new();
        let result = decode_all(&mut decoder, b"5\r\nhelloBad");
        assert!(matches!(result, Err(BodyError::BrokenChunk { .. })));
    }

    #[test]
    fn test_newline_in_extension() {
        let mut decoder = ChunkedDecoder::new();
        let result = decoder.decode(b"5;ext\nhello", usize::MAX);
        assert!(matches!(result, Err(BodyError::BrokenChunk { .. })));
    }

    #[test]
    fn test_large_chunk() {
        // Create a large chunk (1MB)
        let size = 1024 * 1024;
        let mut data = Vec::with_capacity(size + 16);
        data.extend(format!("{size:x}\r\n").into_bytes());
        data.extend(vec![b'A'; size]);
        data.extend(b"\r\n0\r\n\r\n");

        let mut decoder = ChunkedDecoder::new();
        let (body, _) = decode_all(&mut decoder, &data).unwrap();

        assert_eq!(body.len(), size);
        assert!(body.iter().all(|&b| b == b'A'));
    }

    #[test]
    fn test_zero_size_chunk() {
        let mut decoder = ChunkedDecoder::new();
        assert_eq!(decoder.decode(b"0\r\n\r\n", usize::MAX).unwrap(), Decoded::End(3));
        assert!(decoder.is_done());
    }

    #[test]
    fn test_max_size_checked_on_size_line() {
        let mut decoder = ChunkedDecoder::with_max_size(5);
        let (body, _) = decode_all(&mut decoder, b"5\r\nhello\r\n0\r\n\r\n").unwrap();
        assert_eq!(body, b"hello");

        let mut decoder = ChunkedDecoder::with_max_size(5);
        assert_eq!(decoder.decode(b"3\r\nabc\r\n", usize::MAX).unwrap(), Decoded::Framing(3));
        assert_eq!(decoder.decode(b"abc\r\n", usize::MAX).unwrap(), Decoded::Data(3));
        assert_eq!(decoder.decode(b"\r\n", usize::MAX).unwrap(), Decoded::Framing(2));
        // the second size line pushes the total past the limit before any payload
        assert!(matches!(decoder.decode(b"3\r\nabc", usize::MAX), Err(BodyError::BodyTooLarge)));
    }

    #[tokio::test]
    async fn test_read_chunked_leaves_trailer() {
        let mut src: &[u8] = b"5\r\nhello\r\n7\r\n, world\r\n0\r\nExpires: never\r\n\r\nGET / HTTP/1.1";
        let mut dst = BodyBuf::new();

        read_chunked(&mut src, &mut dst, 0).await.unwrap();

        assert_eq!(&dst[..], b"hello, world");
        assert_eq!(src, b"Expires: never\r\n\r\nGET / HTTP/1.1");
    }

    #[tokio::test]
    async fn test_read_chunked_tiny_reads() {
        let data = b"5;a=b\r\nhello\r\n1\r\n \r\n6\r\nworld!\r\n0\r\n\r\n";
        let mut src = BufReader::with_capacity(1, &data[..]);
        let mut dst = BodyBuf::new();

        read_chunked(&mut src, &mut dst, 0).await.unwrap();

        assert_eq!(&dst[..], b"hello world!");
    }

    #[tokio::test]
    async fn test_read_chunked_limit_boundary() {
        let data = b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";

        let mut src = &data[..];
        let mut dst = BodyBuf::new();
        read_chunked(&mut src, &mut dst, 11).await.unwrap();
        assert_eq!(&dst[..], b"hello world");

        let mut src = &data[..];
        let mut dst = BodyBuf::new();
        let result = read_chunked(&mut src, &mut dst, 10).await;
        assert!(matches!(result, Err(BodyError::BodyTooLarge)));
        assert_eq!(&dst[..], b"hello");
    }

    #[tokio::test]
    async fn test_read_chunked_early_eof() {
        let mut src: &[u8] = b"5\r\nhello\r\n";
        let mut dst = BodyBuf::new();

        let result = read_chunked(&mut src, &mut dst, 0).await;

        match result {
            Err(BodyError::BrokenChunk { source: Some(source), .. }) => {
                assert_eq!(source.kind(), std::io::ErrorKind::UnexpectedEof);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_chunked_stops_at_failure() {
        let data = b"3\r\nabc\r\nzz\r\ntail";
        let mut src = BufReader::with_capacity(4, &data[..]);
        let mut dst = BodyBuf::new();

        let result = read_chunked(&mut src, &mut dst, 0).await;

        assert!(matches!(result, Err(BodyError::BrokenChunk { .. })));
        let rest = src.fill_buf().await.unwrap().to_vec();
        assert!(rest.starts_with(b"zz") || rest.starts_with(b"z\r"));
    }
}
