//! Shared access to one underlying seekable stream.
//!
//! An archive is backed by a single stream with a single cursor. Every view
//! over it performs an absolute seek immediately before reading, while
//! holding the lock, so views can be interleaved freely.

use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Error, Result};

/// An underlying stream shared between an archive and its entry views.
pub type SharedStream<S> = Arc<Mutex<S>>;

/// Wrap a stream for sharing.
pub fn shared<S>(stream: S) -> SharedStream<S> {
    Arc::new(Mutex::new(stream))
}

/// Read into `buf` starting at absolute `offset`.
///
/// Keeps reading until the buffer is full or the stream ends, and returns
/// the number of bytes read.
pub fn read_at<S: Read + Seek>(stream: &SharedStream<S>, offset: u64, buf: &mut [u8]) -> Result<usize> {
    let mut guard = stream.lock();
    guard.seek(SeekFrom::Start(offset))?;

    let mut filled = 0;
    while filled < buf.len() {
        match guard.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }

    Ok(filled)
}

/// Fill `buf` from absolute `offset`, failing if the stream ends first.
pub fn read_exact_at<S: Read + Seek>(stream: &SharedStream<S>, offset: u64, buf: &mut [u8]) -> Result<()> {
    let available = read_at(stream, offset, buf)?;
    if available < buf.len() {
        return Err(Error::UnexpectedEof {
            needed: buf.len(),
            available,
        });
    }
    Ok(())
}

/// Total length of a seekable stream. The cursor is left at the end.
pub fn stream_len<S: Seek>(stream: &mut S) -> Result<u64> {
    Ok(stream.seek(SeekFrom::End(0))?)
}
