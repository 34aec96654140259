//! ZIP64 container engine for MSIX/APPX packages.
//!
//! Packages are ordinary ZIP archives with a narrower rule set: no
//! encryption, no comments, no multi-disk spanning, only Store and Deflate,
//! and no unaccounted bytes between the sections. This crate reads such
//! packages with full structural validation and writes them in streaming
//! fashion, always in ZIP64 form.
//!
//! - Every on-disk record is declared once as a field schema (see
//!   [`record`]) that drives decoding, validation and encoding.
//! - Entry contents are exposed as seekable streams; deflated entries are
//!   inflated lazily and never fully buffered.
//! - Byte ranges of the package sections are available for signature
//!   digests through an injected [`Hasher`].
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use msix_zip::ArchiveReader;
//!
//! let reader = ArchiveReader::open(File::open("app.msix")?)?;
//! for name in reader.list_names() {
//!     println!("{name}");
//! }
//!
//! if let Some(manifest) = reader.get("AppxManifest.xml")? {
//!     let xml = manifest.read_all()?;
//!     println!("{} bytes of manifest", xml.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod deflate;
mod digest;
mod dos;
mod entry;
mod error;
mod inflate;
mod range;
mod reader;
mod writer;

pub mod record;
pub mod zip;

use std::io::{Read, Seek, Write};

pub use deflate::{CompressStream, PayloadSizes};
pub use digest::{ByteRange, Hasher, PackageRanges};
pub use dos::DosDateTime;
pub use entry::{CentralDirectoryEntry, EntryHandle, EntryStream};
pub use error::{Error, ErrorKind, Result};
pub use inflate::{InflateStream, State as InflateState};
pub use range::EntryRange;
pub use reader::ArchiveReader;
pub use writer::{ArchiveWriter, EntrySummary, WritableEntry, WriterOptions};
pub use zip::CompressionMethod;

/// Open a package for reading.
pub fn open_reader<S: Read + Seek>(stream: S) -> Result<ArchiveReader<S>> {
    ArchiveReader::open(stream)
}

/// Start writing a package with default options.
pub fn open_writer<W: Write + Seek>(stream: W) -> ArchiveWriter<W> {
    ArchiveWriter::new(stream)
}
