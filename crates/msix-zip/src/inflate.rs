//! Streaming raw-deflate decompressor with seek support.

use std::io::{self, Read, Seek, SeekFrom};

use flate2::{Decompress, FlushDecompress, Status};
use tracing::trace;

use crate::{Error, Result};

/// Size of the compressed input buffer and of the inflate window.
const BUFFER_SIZE: usize = 32 * 1024;

/// Decompressor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Nothing inflated yet; the next read rewinds the source.
    Uninitialized,
    /// The input buffer is drained and must be refilled from the source.
    ReadyToRead,
    /// Input is available (or output is pending) for another window.
    ReadyToInflate,
    /// The window holds inflated bytes to hand out or skip over.
    ReadyToCopy,
    /// The declared size was produced and the stream verified.
    Cleanup,
}

/// Exposes an entry's raw-deflate bytes as a seekable stream of exactly
/// `uncompressed_size` bytes.
///
/// Data is inflated one window at a time. Forward seeks are served by
/// inflating and discarding; a backward seek restarts from the beginning of
/// the compressed data. Once the declared size has been produced, the
/// deflate stream must be complete and the source exhausted, otherwise the
/// read fails with [`Error::CorruptData`].
pub struct InflateStream<R> {
    source: R,
    state: State,
    decompress: Decompress,
    input: Box<[u8]>,
    input_start: usize,
    input_end: usize,
    window: Box<[u8]>,
    window_len: usize,
    /// Uncompressed offset of `window[0]`.
    window_start: u64,
    seek_position: u64,
    uncompressed_size: u64,
    stream_ended: bool,
}

impl<R: Read + Seek> InflateStream<R> {
    pub fn new(source: R, uncompressed_size: u64) -> Self {
        Self {
            source,
            state: State::Uninitialized,
            decompress: Decompress::new(false),
            input: vec![0u8; BUFFER_SIZE].into_boxed_slice(),
            input_start: 0,
            input_end: 0,
            window: vec![0u8; BUFFER_SIZE].into_boxed_slice(),
            window_len: 0,
            window_start: 0,
            seek_position: 0,
            uncompressed_size,
            stream_ended: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Declared uncompressed size.
    pub fn len(&self) -> u64 {
        self.uncompressed_size
    }

    pub fn is_empty(&self) -> bool {
        self.uncompressed_size == 0
    }

    pub fn position(&self) -> u64 {
        self.seek_position
    }

    fn transition(&mut self, next: State) {
        trace!(from = ?self.state, to = ?next, position = self.seek_position, "inflate state");
        self.state = next;
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0;

        while written < buf.len() && self.seek_position < self.uncompressed_size {
            match self.state {
                State::Uninitialized => self.reset()?,
                State::ReadyToRead => self.fill_input()?,
                State::ReadyToInflate => self.inflate_window()?,
                State::ReadyToCopy => written += self.copy_out(&mut buf[written..])?,
                State::Cleanup => break,
            }
        }

        Ok(written)
    }

    fn reset(&mut self) -> Result<()> {
        self.source.seek(SeekFrom::Start(0))?;
        self.decompress.reset(false);
        self.input_start = 0;
        self.input_end = 0;
        self.window_len = 0;
        self.window_start = 0;
        self.stream_ended = false;
        self.transition(State::ReadyToRead);
        Ok(())
    }

    fn fill_input(&mut self) -> Result<()> {
        debug_assert_eq!(self.input_start, self.input_end, "uninflated input overwritten");

        let read = self.source.read(&mut self.input)?;
        if read == 0 {
            return Err(Error::CorruptData(format!(
                "compressed data ended after {} of {} bytes",
                self.window_start + self.window_len as u64,
                self.uncompressed_size
            )));
        }

        self.input_start = 0;
        self.input_end = read;
        self.transition(State::ReadyToInflate);
        Ok(())
    }

    /// Run the decompressor once into `window`, returning bytes consumed
    /// and produced.
    fn step(&mut self) -> Result<(usize, usize)> {
        let before_in = self.decompress.total_in();
        let before_out = self.decompress.total_out();

        let status = self
            .decompress
            .decompress(
                &self.input[self.input_start..self.input_end],
                &mut self.window,
                FlushDecompress::None,
            )
            .map_err(|e| Error::CorruptData(format!("inflate failed: {e}")))?;

        let consumed = (self.decompress.total_in() - before_in) as usize;
        let produced = (self.decompress.total_out() - before_out) as usize;
        self.input_start += consumed;

        if status == Status::StreamEnd {
            self.stream_ended = true;
        }
        Ok((consumed, produced))
    }

    fn inflate_window(&mut self) -> Result<()> {
        self.window_start += self.window_len as u64;
        self.window_len = 0;

        let (consumed, produced) = self.step()?;
        self.window_len = produced;

        if consumed == 0 && produced == 0 {
            if self.input_start < self.input_end {
                return Err(Error::CorruptData("inflate made no progress".into()));
            }
            self.transition(State::ReadyToRead);
            return Ok(());
        }

        self.transition(State::ReadyToCopy);
        Ok(())
    }

    fn copy_out(&mut self, buf: &mut [u8]) -> Result<usize> {
        let window_end = self.window_start + self.window_len as u64;

        if self.seek_position >= window_end {
            if self.stream_ended {
                return Err(Error::CorruptData(format!(
                    "deflate stream ended after {window_end} of {} bytes",
                    self.uncompressed_size
                )));
            }
            let next = if self.window_len == self.window.len() || self.input_start < self.input_end {
                State::ReadyToInflate
            } else {
                State::ReadyToRead
            };
            self.transition(next);
            return Ok(0);
        }

        let offset = (self.seek_position - self.window_start) as usize;
        let available = (window_end.min(self.uncompressed_size) - self.seek_position) as usize;
        let count = available.min(buf.len());
        buf[..count].copy_from_slice(&self.window[offset..offset + count]);
        self.seek_position += count as u64;

        if self.seek_position == self.uncompressed_size {
            self.finish()?;
            self.transition(State::Cleanup);
        }
        Ok(count)
    }

    /// Verify that the deflate stream ends exactly at the declared size.
    fn finish(&mut self) -> Result<()> {
        if self.window_start + self.window_len as u64 > self.uncompressed_size {
            return Err(Error::CorruptData("entry inflates past its declared size".into()));
        }

        while !self.stream_ended {
            if self.input_start == self.input_end {
                let read = self.source.read(&mut self.input)?;
                if read == 0 {
                    return Err(Error::CorruptData("deflate stream is missing its final block".into()));
                }
                self.input_start = 0;
                self.input_end = read;
            }

            self.window_start += self.window_len as u64;
            let (consumed, produced) = self.step()?;
            self.window_len = produced;
            if produced > 0 {
                return Err(Error::CorruptData("entry inflates past its declared size".into()));
            }
            if consumed == 0 && !self.stream_ended {
                return Err(Error::CorruptData("inflate made no progress".into()));
            }
        }

        let mut trailing = [0u8; 1];
        if self.input_start != self.input_end || self.source.read(&mut trailing)? != 0 {
            return Err(Error::CorruptData("unexpected bytes after the deflate stream".into()));
        }
        Ok(())
    }
}

impl<R: Read + Seek> Read for InflateStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_inner(buf).map_err(|err| {
            self.state = State::Uninitialized;
            err.into()
        })
    }
}

impl<R: Read + Seek> Seek for InflateStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.seek_position as i128 + delta as i128,
            SeekFrom::End(delta) => self.uncompressed_size as i128 + delta as i128,
        };
        let target = target.clamp(0, self.uncompressed_size as i128) as u64;

        if target < self.seek_position {
            self.transition(State::Uninitialized);
        }
        self.seek_position = target;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use flate2::write::DeflateEncoder;
    use flate2::Compression;

    use super::*;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// Incompressible-ish data so the compressed stream spans several buffers.
    fn noisy(len: usize) -> Vec<u8> {
        let mut state = 0x2545_F491u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect()
    }

    #[test]
    fn test_read_whole_entry() {
        let data = b"Hello, World! Hello, World! Hello, World!".repeat(5000);
        let mut stream = InflateStream::new(Cursor::new(deflate(&data)), data.len() as u64);

        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(stream.state(), State::Cleanup);
    }

    #[test]
    fn test_seek_forward_and_back() {
        let data = noisy(200_000);
        let mut stream = InflateStream::new(Cursor::new(deflate(&data)), data.len() as u64);

        let mut buf = [0u8; 64];
        stream.seek(SeekFrom::Start(150_000)).unwrap();
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &data[150_000..150_064]);

        assert_eq!(stream.position(), 150_064);

        stream.seek(SeekFrom::Start(10)).unwrap();
        assert_eq!(stream.state(), State::Uninitialized);
        assert_eq!(stream.position(), 10);
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &data[10..74]);

        stream.seek(SeekFrom::End(-4)).unwrap();
        let mut tail = Vec::new();
        stream.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, &data[data.len() - 4..]);
    }

    #[test]
    fn test_reread_after_rewind() {
        let data = noisy(300_000);
        let mut stream = InflateStream::new(Cursor::new(deflate(&data)), data.len() as u64);

        let mut first = Vec::new();
        stream.read_to_end(&mut first).unwrap();
        assert_eq!(stream.state(), State::Cleanup);

        assert_eq!(stream.seek(SeekFrom::Start(0)).unwrap(), 0);
        let mut second = Vec::new();
        stream.read_to_end(&mut second).unwrap();

        assert_eq!(first.len(), data.len());
        assert_eq!(first, second);
        assert_eq!(second, data);
    }

    #[test]
    fn test_seek_clamps_to_size() {
        let data = b"abcdef".to_vec();
        let mut stream = InflateStream::new(Cursor::new(deflate(&data)), 6);
        assert_eq!(stream.seek(SeekFrom::Start(100)).unwrap(), 6);
        assert_eq!(stream.seek(SeekFrom::Current(-100)).unwrap(), 0);

        let mut buf = [0u8; 8];
        assert_eq!(stream.seek(SeekFrom::End(0)).unwrap(), 6);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_truncated_source() {
        let data = noisy(100_000);
        let mut compressed = deflate(&data);
        compressed.truncate(compressed.len() / 2);

        let mut stream = InflateStream::new(Cursor::new(compressed), data.len() as u64);
        let err = stream.read_to_end(&mut Vec::new()).unwrap_err();
        assert!(matches!(Error::from(err), Error::CorruptData(_)));
    }

    #[test]
    fn test_declared_size_too_large() {
        let data = b"short".to_vec();
        let mut stream = InflateStream::new(Cursor::new(deflate(&data)), 10);
        let err = stream.read_to_end(&mut Vec::new()).unwrap_err();
        assert!(matches!(Error::from(err), Error::CorruptData(_)));
    }

    #[test]
    fn test_declared_size_too_small() {
        let data = b"a longer payload than declared".to_vec();
        let mut stream = InflateStream::new(Cursor::new(deflate(&data)), 4);
        let err = stream.read_to_end(&mut Vec::new()).unwrap_err();
        assert!(matches!(Error::from(err), Error::CorruptData(_)));
    }

    #[test]
    fn test_trailing_garbage() {
        let data = b"payload".to_vec();
        let mut compressed = deflate(&data);
        compressed.extend_from_slice(b"junk");

        let mut stream = InflateStream::new(Cursor::new(compressed), data.len() as u64);
        let err = stream.read_to_end(&mut Vec::new()).unwrap_err();
        assert!(matches!(Error::from(err), Error::CorruptData(_)));
    }

    #[test]
    fn test_garbage_input() {
        let mut stream = InflateStream::new(Cursor::new(vec![0xFFu8; 64]), 100);
        let err = stream.read_to_end(&mut Vec::new()).unwrap_err();
        assert!(matches!(Error::from(err), Error::CorruptData(_)));
    }

    #[test]
    fn test_empty_entry() {
        let mut stream = InflateStream::new(Cursor::new(deflate(b"")), 0);
        let mut out = Vec::new();
        assert_eq!(stream.read_to_end(&mut out).unwrap(), 0);
    }
}
