//! Bounded view over a byte range of the shared archive stream.

use std::io::{self, Read, Seek, SeekFrom};

use msix_common::{read_at, SharedStream};

/// A `[base, base + len)` window of the underlying stream, addressed from 0.
///
/// Reads never cross the end of the window and seeks are clamped into
/// `[0, len]`. Every read seeks the shared stream first, so any number of
/// ranges over the same stream can be used in any order.
pub struct EntryRange<S> {
    stream: SharedStream<S>,
    base: u64,
    len: u64,
    pos: u64,
}

impl<S> EntryRange<S> {
    pub fn new(stream: SharedStream<S>, base: u64, len: u64) -> Self {
        Self {
            stream,
            base,
            len,
            pos: 0,
        }
    }

    /// Length of the window.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current position relative to the window start.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl<S: Read + Seek> Read for EntryRange<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len - self.pos;
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let want = (buf.len() as u64).min(remaining) as usize;
        let read = read_at(&self.stream, self.base + self.pos, &mut buf[..want])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl<S> Seek for EntryRange<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
            SeekFrom::End(delta) => self.len as i128 + delta as i128,
        };
        self.pos = target.clamp(0, self.len as i128) as u64;
        Ok(self.pos)
    }
}
