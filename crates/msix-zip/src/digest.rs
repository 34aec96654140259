//! Byte ranges handed to an external signature verifier.

/// A contiguous span of the archive stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// First offset past the range.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// The three sections every package is made of, in stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageRanges {
    /// Local headers, entry data and data descriptors.
    pub content: ByteRange,
    pub central_directory: ByteRange,
    /// ZIP64 end record, locator and end record (or the end record alone).
    pub terminal: ByteRange,
}

/// Hash function capability used to digest ranges.
///
/// The engine never picks a concrete algorithm; callers inject one.
pub trait Hasher {
    fn update(&mut self, bytes: &[u8]);

    fn finish(self) -> Vec<u8>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_end() {
        assert_eq!(ByteRange::new(10, 5).end(), 15);
        assert_eq!(ByteRange::new(0, 0).end(), 0);
    }
}
