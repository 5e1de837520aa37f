use bytes::{Bytes, BytesMut};
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use std::fmt;
use std::io;
use std::io::Write;
use tracing::trace;

/// A content coding this crate can produce and undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentCoding {
    Gzip,
    /// zlib-wrapped deflate, as sent by HTTP servers for `deflate`
    Deflate,
    Br,
}

impl ContentCoding {
    /// The token used in the Content-Encoding header.
    pub fn name(self) -> &'static str {
        match self {
            ContentCoding::Gzip => "gzip",
            ContentCoding::Deflate => "deflate",
            ContentCoding::Br => "br",
        }
    }

    /// Parses a Content-Encoding token, ignoring case and surrounding whitespace.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("gzip") || name.eq_ignore_ascii_case("x-gzip") {
            Some(ContentCoding::Gzip)
        } else if name.eq_ignore_ascii_case("deflate") {
            Some(ContentCoding::Deflate)
        } else if name.eq_ignore_ascii_case("br") {
            Some(ContentCoding::Br)
        } else {
            None
        }
    }
}

impl fmt::Display for ContentCoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How hard a compressor works.
///
/// The named levels map onto the native scale of each codec; `Precise` values
/// are clamped to it (0..=9 for gzip and deflate, 0..=11 for brotli).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    BestSpeed,
    #[default]
    Default,
    Best,
    Precise(u32),
}

impl CompressionLevel {
    fn flate(self) -> Compression {
        match self {
            CompressionLevel::BestSpeed => Compression::fast(),
            CompressionLevel::Default => Compression::new(6),
            CompressionLevel::Best => Compression::best(),
            CompressionLevel::Precise(level) => Compression::new(level.min(9)),
        }
    }

    fn brotli_quality(self) -> u32 {
        match self {
            CompressionLevel::BestSpeed => 0,
            CompressionLevel::Default => 4,
            CompressionLevel::Best => 11,
            CompressionLevel::Precise(level) => level.min(11),
        }
    }
}

/// Collects compressor output in memory until it is taken.
#[derive(Debug)]
pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    pub(crate) fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    pub(crate) fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A compressor writing into `W`.
pub(crate) enum Encoder<W: io::Write> {
    Gzip(GzEncoder<W>),
    Deflate(ZlibEncoder<W>),
    Br(Box<brotli::CompressorWriter<W>>),
}

impl<W: io::Write> Encoder<W> {
    pub(crate) fn new(sink: W, coding: ContentCoding, level: CompressionLevel) -> Self {
        match coding {
            ContentCoding::Gzip => Self::Gzip(GzEncoder::new(sink, level.flate())),
            ContentCoding::Deflate => Self::Deflate(ZlibEncoder::new(sink, level.flate())),
            ContentCoding::Br => Self::Br(Box::new(brotli::CompressorWriter::new(
                sink,
                32 * 1024, // 32 KiB buffer
                level.brotli_quality(),
                22, // BROTLI_PARAM_LGWIN
            ))),
        }
    }

    pub(crate) fn coding(&self) -> ContentCoding {
        match self {
            Encoder::Gzip(_) => ContentCoding::Gzip,
            Encoder::Deflate(_) => ContentCoding::Deflate,
            Encoder::Br(_) => ContentCoding::Br,
        }
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let result = match self {
            Self::Gzip(encoder) => encoder.write_all(data),
            Self::Deflate(encoder) => encoder.write_all(data),
            Self::Br(encoder) => encoder.write_all(data),
        };
        if let Err(e) = &result {
            trace!(coding = %self.coding(), cause = %e, "error while compressing");
        }
        result
    }

    /// Pushes everything written so far through to `W` as a complete block.
    pub(crate) fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Gzip(encoder) => encoder.flush(),
            Self::Deflate(encoder) => encoder.flush(),
            Self::Br(encoder) => encoder.flush(),
        }
    }

    pub(crate) fn get_mut(&mut self) -> &mut W {
        match self {
            Self::Gzip(encoder) => encoder.get_mut(),
            Self::Deflate(encoder) => encoder.get_mut(),
            Self::Br(encoder) => encoder.get_mut(),
        }
    }

    /// Writes the end of the compressed stream and returns the sink.
    pub(crate) fn finish(self) -> io::Result<W> {
        match self {
            Self::Gzip(encoder) => encoder.finish(),
            Self::Deflate(encoder) => encoder.finish(),
            Self::Br(mut encoder) => {
                encoder.flush()?;
                Ok(encoder.into_inner())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coding_names() {
        for coding in [ContentCoding::Gzip, ContentCoding::Deflate, ContentCoding::Br] {
            assert_eq!(ContentCoding::from_name(coding.name()), Some(coding));
        }
        assert_eq!(ContentCoding::from_name(" GZIP "), Some(ContentCoding::Gzip));
        assert_eq!(ContentCoding::from_name("zstd"), None);
    }

    #[test]
    fn test_levels_are_clamped() {
        assert_eq!(CompressionLevel::Precise(42).flate(), Compression::new(9));
        assert_eq!(CompressionLevel::Precise(42).brotli_quality(), 11);
        assert_eq!(CompressionLevel::BestSpeed.flate(), Compression::fast());
    }

    #[test]
    fn test_flush_makes_output_visible() {
        for coding in [ContentCoding::Gzip, ContentCoding::Deflate, ContentCoding::Br] {
            let mut encoder = Encoder::new(Writer::new(), coding, CompressionLevel::Default);
            encoder.write(b"hello hello hello").unwrap();
            encoder.flush().unwrap();
            assert!(!encoder.get_mut().take().is_empty(), "{coding}");
        }
    }
}
