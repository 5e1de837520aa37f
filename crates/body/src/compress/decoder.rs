use std::io;

use flate2::read::{MultiGzDecoder, ZlibDecoder};
use tracing::trace;

use super::ContentCoding;
use crate::pool::BodyBuf;
use crate::pool::scratch::COPY_BUF_SIZE;
use crate::protocol::BodyError;

/// Appends the gunzipped `src` to `dst`.
pub fn gunzip(src: &[u8], dst: &mut BodyBuf) -> Result<(), BodyError> {
    copy_decoded(ContentCoding::Gzip, MultiGzDecoder::new(src), dst)
}

/// Appends the inflated zlib stream `src` to `dst`.
pub fn inflate(src: &[u8], dst: &mut BodyBuf) -> Result<(), BodyError> {
    copy_decoded(ContentCoding::Deflate, ZlibDecoder::new(src), dst)
}

/// Appends the brotli-decoded `src` to `dst`.
pub fn unbrotli(src: &[u8], dst: &mut BodyBuf) -> Result<(), BodyError> {
    copy_decoded(ContentCoding::Br, brotli::Decompressor::new(src, COPY_BUF_SIZE), dst)
}

/// Appends `src` decoded according to a Content-Encoding value to `dst`.
///
/// An empty or `identity` encoding copies `src` unchanged.
pub fn decompress(encoding: &str, src: &[u8], dst: &mut BodyBuf) -> Result<(), BodyError> {
    let encoding = encoding.trim();
    if encoding.is_empty() || encoding.eq_ignore_ascii_case("identity") {
        dst.extend_from_slice(src);
        return Ok(());
    }

    match ContentCoding::from_name(encoding) {
        Some(ContentCoding::Gzip) => gunzip(src, dst),
        Some(ContentCoding::Deflate) => inflate(src, dst),
        Some(ContentCoding::Br) => unbrotli(src, dst),
        None => Err(BodyError::unsupported_encoding(encoding)),
    }
}

fn copy_decoded<R: io::Read>(coding: ContentCoding, mut decoder: R, dst: &mut BodyBuf) -> Result<(), BodyError> {
    let decoded = io::copy(&mut decoder, dst)
        .map_err(|e| BodyError::invalid_body(format!("cannot decode {coding} body: {e}")))?;
    trace!(%coding, decoded, "decoded body");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::{CompressionLevel, Encoder};

    fn encode(coding: ContentCoding, data: &[u8]) -> BodyBuf {
        let mut encoder = Encoder::new(BodyBuf::new(), coding, CompressionLevel::Default);
        encoder.write(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decode_each_coding() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);

        for coding in [ContentCoding::Gzip, ContentCoding::Deflate, ContentCoding::Br] {
            let encoded = encode(coding, text.as_bytes());
            assert!(encoded.len() < text.len(), "{coding}");

            let mut decoded = BodyBuf::new();
            decompress(coding.name(), &encoded, &mut decoded).unwrap();
            assert_eq!(&decoded[..], text.as_bytes(), "{coding}");
        }
    }

    #[test]
    fn test_identity() {
        let mut decoded = BodyBuf::new();
        decompress("", b"plain", &mut decoded).unwrap();
        decompress("identity", b" text", &mut decoded).unwrap();
        assert_eq!(&decoded[..], b"plain text");
    }

    #[test]
    fn test_unsupported() {
        let mut decoded = BodyBuf::new();
        let err = decompress("zstd", b"whatever", &mut decoded).unwrap_err();
        assert!(matches!(err, BodyError::UnsupportedEncoding { .. }));
    }

    #[test]
    fn test_corrupt_input() {
        let mut decoded = BodyBuf::new();
        assert!(matches!(gunzip(b"not gzip at all", &mut decoded), Err(BodyError::InvalidBody { .. })));
    }
}
