//! Streaming compressor for entry payloads.

use std::io::{self, Write};

use flate2::write::DeflateEncoder;
use flate2::Compression;
use msix_common::crc::Crc32;
use msix_common::CountingWriter;

use crate::zip::CompressionMethod;
use crate::Result;

/// CRC and sizes of a payload that went through a [`CompressStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadSizes {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

enum Encoder<W: Write> {
    Store(CountingWriter<W>),
    Deflate(DeflateEncoder<CountingWriter<W>>),
}

/// Compresses whatever is written to it into `W`, tracking the CRC-32 of
/// the input and both sizes.
pub struct CompressStream<W: Write> {
    encoder: Encoder<W>,
    crc: Crc32,
    uncompressed: u64,
}

impl<W: Write> CompressStream<W> {
    pub fn new(writer: W, method: CompressionMethod, level: Compression) -> Self {
        let counting = CountingWriter::new(writer);
        let encoder = match method {
            CompressionMethod::Store => Encoder::Store(counting),
            CompressionMethod::Deflate => Encoder::Deflate(DeflateEncoder::new(counting, level)),
        };
        Self {
            encoder,
            crc: Crc32::new(),
            uncompressed: 0,
        }
    }

    /// Flush the final deflate block and return the sizes with the writer.
    pub fn finish(self) -> Result<(PayloadSizes, W)> {
        let counting = match self.encoder {
            Encoder::Store(counting) => counting,
            Encoder::Deflate(encoder) => encoder.finish()?,
        };
        let sizes = PayloadSizes {
            crc32: self.crc.finalize(),
            compressed_size: counting.count(),
            uncompressed_size: self.uncompressed,
        };
        Ok((sizes, counting.into_inner()))
    }
}

impl<W: Write> Write for CompressStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let accepted = match &mut self.encoder {
            Encoder::Store(writer) => writer.write(buf)?,
            Encoder::Deflate(encoder) => encoder.write(buf)?,
        };
        self.crc.update(&buf[..accepted]);
        self.uncompressed += accepted as u64;
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.encoder {
            Encoder::Store(writer) => writer.flush(),
            Encoder::Deflate(encoder) => encoder.flush(),
        }
    }
}
