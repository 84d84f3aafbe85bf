//! Pluggable stream encodings for sibling files.

use std::io::{self, Read, Write};

use flate2::read::{DeflateDecoder, GzDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;

/// A writable sink that must be told when the stream is complete.
///
/// Compressors buffer and append trailers; dropping one mid-stream loses
/// data. [`FinishWrite::finish`] flushes everything through to the
/// underlying sink.
pub trait FinishWrite: Write {
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// A named, invertible stream transform.
///
/// `decoder(encoder(x)) == x` must hold for every byte sequence `x`. The
/// name becomes the sibling file's suffix after the dot, so it must be
/// non-empty and contain neither `.` nor path separators.
pub trait Encoding: Send + Sync {
    /// Stable identifier, used as the filename suffix.
    fn name(&self) -> &'static str;

    /// Wrap `sink` so that bytes written come out encoded.
    fn encoder<'a>(
        &self,
        sink: Box<dyn Write + Send + 'a>,
    ) -> io::Result<Box<dyn FinishWrite + Send + 'a>>;

    /// Wrap `src` so that encoded bytes read out decoded.
    fn decoder<'a>(
        &self,
        src: Box<dyn Read + Send + 'a>,
    ) -> io::Result<Box<dyn Read + Send + 'a>>;
}

impl<W: Write> FinishWrite for GzEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        (*self).finish().map(|_| ())
    }
}

impl<W: Write> FinishWrite for DeflateEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        (*self).finish().map(|_| ())
    }
}

/// RFC 1952 gzip framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gzip;

impl Encoding for Gzip {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn encoder<'a>(
        &self,
        sink: Box<dyn Write + Send + 'a>,
    ) -> io::Result<Box<dyn FinishWrite + Send + 'a>> {
        Ok(Box::new(GzEncoder::new(sink, Compression::default())))
    }

    fn decoder<'a>(
        &self,
        src: Box<dyn Read + Send + 'a>,
    ) -> io::Result<Box<dyn Read + Send + 'a>> {
        Ok(Box::new(GzDecoder::new(src)))
    }
}

/// Raw RFC 1951 deflate, no framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deflate;

impl Encoding for Deflate {
    fn name(&self) -> &'static str {
        "deflate"
    }

    fn encoder<'a>(
        &self,
        sink: Box<dyn Write + Send + 'a>,
    ) -> io::Result<Box<dyn FinishWrite + Send + 'a>> {
        Ok(Box::new(DeflateEncoder::new(sink, Compression::default())))
    }

    fn decoder<'a>(
        &self,
        src: Box<dyn Read + Send + 'a>,
    ) -> io::Result<Box<dyn Read + Send + 'a>> {
        Ok(Box::new(DeflateDecoder::new(src)))
    }
}
