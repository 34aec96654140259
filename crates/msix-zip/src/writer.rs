//! Package writer.
//!
//! Entries are appended one at a time: [`ArchiveWriter::begin_entry`] emits
//! a local header, the caller streams the entry data, and
//! [`ArchiveWriter::end_entry`] either patches the header in place or
//! appends a data descriptor. [`ArchiveWriter::close`] writes the central
//! directory and the ZIP64 terminal records; output is always ZIP64.

use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom, Write};

use flate2::Compression;
use tracing::debug;
use zerocopy::IntoBytes;

use crate::deflate::CompressStream;
use crate::dos::DosDateTime;
use crate::record::Record;
use crate::zip::{
    CentralDirectoryFileHeader, CompressionMethod, DataDescriptor, EocdRecord, LocalFileHeader, Zip64EocdLocator,
    Zip64EocdRecord, MAX_SIZE_WITHOUT_DESCRIPTOR,
};
use crate::{Error, Result};

/// Writer configuration.
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    /// Deflate level for compressed entries.
    pub compression: Compression,
    /// Timestamp stamped on every entry.
    pub modified: DosDateTime,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            modified: DosDateTime::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    ReadyForLfhOrClose,
    ReadyForFile,
    Closed,
}

impl WriterState {
    fn describe(self) -> &'static str {
        match self {
            WriterState::ReadyForLfhOrClose => "ready for an entry or close",
            WriterState::ReadyForFile => "writing an entry",
            WriterState::Closed => "closed",
        }
    }
}

/// The entry between `begin_entry` and `end_entry`.
struct PendingEntry {
    name: String,
    method: CompressionMethod,
    header: LocalFileHeader,
    header_offset: u64,
    data_start: u64,
}

/// What [`ArchiveWriter::add_entry`] wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub name: String,
    pub method: CompressionMethod,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// Whether the sizes went into a trailing data descriptor.
    pub data_descriptor: bool,
}

/// Sink for one entry's already-compressed bytes.
///
/// Borrowing the writer keeps `end_entry` from being called while the
/// entry is still being written.
pub struct WritableEntry<'a, W> {
    stream: &'a mut W,
    header_len: u64,
}

impl<W> WritableEntry<'_, W> {
    /// Encoded size of the local header that precedes this entry.
    pub fn header_len(&self) -> u64 {
        self.header_len
    }
}

impl<W: Write> Write for WritableEntry<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// Writes a package to a seekable stream.
pub struct ArchiveWriter<W: Write + Seek> {
    stream: W,
    state: WriterState,
    options: WriterOptions,
    names: HashSet<String>,
    central_directory: Vec<CentralDirectoryFileHeader>,
    pending: Option<PendingEntry>,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    pub fn new(stream: W) -> Self {
        Self::with_options(stream, WriterOptions::default())
    }

    pub fn with_options(stream: W, options: WriterOptions) -> Self {
        Self {
            stream,
            state: WriterState::ReadyForLfhOrClose,
            options,
            names: HashSet::new(),
            central_directory: Vec::new(),
            pending: None,
        }
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Number of completed entries.
    pub fn entry_count(&self) -> usize {
        self.central_directory.len()
    }

    fn expect_state(&self, expected: WriterState, operation: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState {
                operation,
                state: self.state.describe(),
            });
        }
        Ok(())
    }

    /// Write the local header for a new entry and return a sink for its data.
    ///
    /// A name already used in this package is refused before anything is
    /// written.
    pub fn begin_entry(&mut self, name: &str, compressed: bool) -> Result<WritableEntry<'_, W>> {
        self.expect_state(WriterState::ReadyForLfhOrClose, "begin_entry")?;

        if name.is_empty() || name.len() > u16::MAX as usize {
            return Err(Error::InvalidName(name.to_string()));
        }
        if self.names.contains(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }

        let method = if compressed {
            CompressionMethod::Deflate
        } else {
            CompressionMethod::Store
        };
        let header = LocalFileHeader::new(name, method, self.options.modified);

        let header_offset = self.stream.stream_position()?;
        let header_len = header.write_to(&mut self.stream)?;

        debug!(name, offset = header_offset, ?method, "begin entry");

        self.names.insert(name.to_string());
        self.pending = Some(PendingEntry {
            name: name.to_string(),
            method,
            header,
            header_offset,
            data_start: header_offset + header_len,
        });
        self.state = WriterState::ReadyForFile;

        Ok(WritableEntry {
            stream: &mut self.stream,
            header_len,
        })
    }

    /// Finish the current entry.
    ///
    /// `compressed_size` must equal the number of bytes written since
    /// `begin_entry`. Entries too large for 32-bit sizes, or with
    /// `force_data_descriptor`, get a trailing data descriptor; all others
    /// have their local header patched in place.
    pub fn end_entry(
        &mut self,
        crc32: u32,
        compressed_size: u64,
        uncompressed_size: u64,
        force_data_descriptor: bool,
    ) -> Result<()> {
        self.expect_state(WriterState::ReadyForFile, "end_entry")?;
        let Some(pending) = self.pending.as_ref() else {
            return Err(Error::InvalidState {
                operation: "end_entry",
                state: "missing its pending entry",
            });
        };

        let data_end = self.stream.stream_position()?;
        let written = data_end - pending.data_start;
        if written != compressed_size {
            return Err(Error::SizeMismatch {
                name: pending.name.clone(),
                declared: compressed_size,
                written,
            });
        }

        let descriptor = force_data_descriptor
            || compressed_size > MAX_SIZE_WITHOUT_DESCRIPTOR
            || uncompressed_size > MAX_SIZE_WITHOUT_DESCRIPTOR;

        if descriptor {
            let dd = DataDescriptor::new(crc32, compressed_size, uncompressed_size);
            self.stream.write_all(dd.as_bytes())?;
        } else {
            let mut header = pending.header.clone();
            header.patch_sizes(crc32, compressed_size as u32, uncompressed_size as u32);
            self.stream.seek(SeekFrom::Start(pending.header_offset))?;
            header.write_to(&mut self.stream)?;
            self.stream.seek(SeekFrom::Start(data_end))?;
        }

        let central = CentralDirectoryFileHeader::new(
            &pending.name,
            crc32,
            compressed_size,
            uncompressed_size,
            pending.header_offset,
            pending.method,
            force_data_descriptor,
            self.options.modified,
        )?;

        debug!(
            name = %pending.name,
            compressed_size,
            uncompressed_size,
            descriptor,
            "end entry"
        );

        self.central_directory.push(central);
        self.pending = None;
        self.state = WriterState::ReadyForLfhOrClose;
        Ok(())
    }

    /// Stream `source` into a new entry, computing CRC and sizes on the way.
    pub fn add_entry<R: Read>(
        &mut self,
        name: &str,
        mut source: R,
        compressed: bool,
        force_data_descriptor: bool,
    ) -> Result<EntrySummary> {
        let level = self.options.compression;
        let method = if compressed {
            CompressionMethod::Deflate
        } else {
            CompressionMethod::Store
        };

        let sizes = {
            let mut entry = self.begin_entry(name, compressed)?;
            let mut compressor = CompressStream::new(&mut entry, method, level);
            io::copy(&mut source, &mut compressor)?;
            compressor.finish()?.0
        };

        self.end_entry(
            sizes.crc32,
            sizes.compressed_size,
            sizes.uncompressed_size,
            force_data_descriptor,
        )?;

        Ok(EntrySummary {
            name: name.to_string(),
            method,
            crc32: sizes.crc32,
            compressed_size: sizes.compressed_size,
            uncompressed_size: sizes.uncompressed_size,
            data_descriptor: force_data_descriptor
                || sizes.compressed_size > MAX_SIZE_WITHOUT_DESCRIPTOR
                || sizes.uncompressed_size > MAX_SIZE_WITHOUT_DESCRIPTOR,
        })
    }

    /// Write the central directory and the terminal records.
    pub fn close(&mut self) -> Result<()> {
        self.expect_state(WriterState::ReadyForLfhOrClose, "close")?;

        let cd_offset = self.stream.stream_position()?;
        for header in &self.central_directory {
            header.write_to(&mut self.stream)?;
        }
        let cd_end = self.stream.stream_position()?;

        let mut record = Zip64EocdRecord::new();
        record.set_directory(self.central_directory.len() as u64, cd_end - cd_offset, cd_offset);
        record.write_to(&mut self.stream)?;

        let mut locator = Zip64EocdLocator::new();
        locator.eocd64_offset = Some(cd_end);
        locator.write_to(&mut self.stream)?;

        EocdRecord::zip64().write_to(&mut self.stream)?;
        self.stream.flush()?;

        debug!(
            entries = self.central_directory.len(),
            cd_offset,
            cd_size = cd_end - cd_offset,
            "closed package"
        );

        self.state = WriterState::Closed;
        Ok(())
    }

    /// Hand back the output stream of a closed writer.
    pub fn into_inner(self) -> Result<W> {
        self.expect_state(WriterState::Closed, "into_inner")?;
        Ok(self.stream)
    }
}
