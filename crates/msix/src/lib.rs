//! msix - MSIX/APPX package reading and writing library.
//!
//! This crate provides a unified interface to the msix library ecosystem.
//!
//! # Crates
//!
//! - [`msix_common`] - Common utilities (shared streams, CRC-32, byte counting)
//! - [`msix_zip`] - ZIP64 container engine (reader, writer, record codec)
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use msix::prelude::*;
//!
//! let reader = ArchiveReader::open(File::open("app.msix")?)?;
//! let ranges = reader.package_ranges();
//! let digest = reader.digest_range(ranges.central_directory, Sha256Hasher::new())?;
//! println!("central directory: {} bytes, {} byte digest", ranges.central_directory.length, digest.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod hash;

pub use msix_common as common;
pub use msix_zip as zip;

pub use hash::Sha256Hasher;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::Sha256Hasher;
    pub use msix_common::crc;
    pub use msix_zip::{
        ArchiveReader, ArchiveWriter, ByteRange, CentralDirectoryEntry, CompressionMethod, DosDateTime, EntryHandle,
        Hasher, PackageRanges, WriterOptions,
    };
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::prelude::*;

    #[test]
    fn test_digest_matches_direct_hash() {
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()));
        writer.add_entry("AppxManifest.xml", &b"<Package/>"[..], true, false).unwrap();
        writer.close().unwrap();
        let bytes = writer.into_inner().unwrap().into_inner();

        let reader = ArchiveReader::open(Cursor::new(bytes.clone())).unwrap();
        let range = reader.package_ranges().terminal;
        let digest = reader.digest_range(range, Sha256Hasher::new()).unwrap();

        let mut direct = Sha256Hasher::new();
        direct.update(&bytes[range.offset as usize..]);
        assert_eq!(digest, direct.finish());
    }
}
