//! Writer adapters.

use std::io::{self, Write};

/// A writer that counts the bytes successfully written to the inner writer.
///
/// # Example
///
/// ```
/// use std::io::Write;
/// use msix_common::CountingWriter;
///
/// let mut writer = CountingWriter::new(Vec::new());
/// writer.write_all(b"hello").unwrap();
/// assert_eq!(writer.count(), 5);
/// ```
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W> CountingWriter<W> {
    /// Wrap a writer, starting the count at zero.
    pub fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    /// Number of bytes written so far.
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Get a reference to the inner writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwrap, returning the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_across_writes() {
        let mut writer = CountingWriter::new(Vec::new());
        writer.write_all(b"abc").unwrap();
        writer.write_all(b"defgh").unwrap();

        assert_eq!(writer.count(), 8);
        assert_eq!(writer.into_inner(), b"abcdefgh");
    }
}
