//! Package reader.
//!
//! Opening a package walks the terminal records backwards from the end of
//! the stream, parses the whole central directory, and checks that the
//! sections are adjacent. Entry data is only touched when an entry is
//! requested through [`ArchiveReader::get`].

use std::collections::HashMap;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::sync::Arc;

use msix_common::{read_exact_at, shared, stream_len, SharedStream};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::digest::{ByteRange, Hasher, PackageRanges};
use crate::entry::{CentralDirectoryEntry, EntryHandle, EntryStream};
use crate::inflate::InflateStream;
use crate::range::EntryRange;
use crate::record::Record;
use crate::zip::{
    CentralDirectoryFileHeader, CompressionMethod, EocdRecord, LocalFileHeader, Zip64EocdLocator, Zip64EocdRecord,
};
use crate::{Error, Result};

/// Chunk size used when streaming a range into a hasher.
const HASH_CHUNK: usize = 64 * 1024;

/// Where the central directory is and where the terminal records begin.
#[derive(Debug, Clone, Copy)]
struct Directory {
    entries: u64,
    offset: u64,
    size: u64,
    terminal_start: u64,
}

/// Read access to a package.
///
/// Entries are indexed by name at open time. Handles returned by
/// [`get`](Self::get) are cached, so asking twice for the same name yields
/// the same handle.
pub struct ArchiveReader<S> {
    stream: SharedStream<S>,
    entries: Vec<CentralDirectoryEntry>,
    index: HashMap<String, usize>,
    /// Local header offsets in stream order.
    boundaries: Vec<u64>,
    directory: Directory,
    len: u64,
    zip64: bool,
    cache: Mutex<HashMap<String, EntryHandle<S>>>,
}

impl<S: Read + Seek> ArchiveReader<S> {
    /// Open a package, validating its terminal records and central directory.
    pub fn open(mut stream: S) -> Result<Self> {
        let len = stream_len(&mut stream)?;
        if len < EocdRecord::SIZE {
            return Err(Error::ArchiveTooSmall { size: len });
        }

        let eocd_start = len - EocdRecord::SIZE;
        stream.seek(SeekFrom::Start(eocd_start))?;
        let eocd = EocdRecord::default().read_from(&mut stream)?;
        let zip64 = eocd.is_zip64();

        let directory = if zip64 {
            Self::read_zip64_directory(&mut stream, eocd_start)?
        } else {
            if eocd.total_entries == 0 {
                return Err(Error::field(EocdRecord::NAME, "total_entries", "package has no entries"));
            }
            Directory {
                entries: eocd.total_entries as u64,
                offset: eocd.cd_offset as u64,
                size: eocd.cd_size as u64,
                terminal_start: eocd_start,
            }
        };

        let (entries, index, end) = Self::read_central_directory(&mut stream, &directory, zip64)?;

        let declared_end = directory.offset + directory.size;
        if end != declared_end {
            return Err(Error::HiddenData {
                expected: declared_end,
                actual: end,
            });
        }
        if end != directory.terminal_start {
            return Err(Error::HiddenData {
                expected: directory.terminal_start,
                actual: end,
            });
        }

        let mut boundaries: Vec<u64> = entries.iter().map(|e| e.local_header_offset()).collect();
        boundaries.sort_unstable();

        debug!(
            entries = entries.len(),
            zip64,
            cd_offset = directory.offset,
            cd_size = directory.size,
            "opened package"
        );

        Ok(Self {
            stream: shared(stream),
            entries,
            index,
            boundaries,
            directory,
            len,
            zip64,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn read_zip64_directory(stream: &mut S, eocd_start: u64) -> Result<Directory> {
        let Some(locator_start) = eocd_start.checked_sub(Zip64EocdLocator::SIZE) else {
            return Err(Error::ArchiveTooSmall {
                size: eocd_start + EocdRecord::SIZE,
            });
        };
        stream.seek(SeekFrom::Start(locator_start))?;
        let locator = Zip64EocdLocator::read(stream)?;

        let record_start = locator.offset();
        let record_end = record_start + Zip64EocdRecord::SIZE;
        if record_end != locator_start {
            return Err(Error::HiddenData {
                expected: locator_start,
                actual: record_end,
            });
        }

        stream.seek(SeekFrom::Start(record_start))?;
        let record = Zip64EocdRecord::read(stream)?;

        Ok(Directory {
            entries: record.entries(),
            offset: record.directory_offset(),
            size: record.directory_size(),
            terminal_start: record_start,
        })
    }

    #[allow(clippy::type_complexity)]
    fn read_central_directory(
        stream: &mut S,
        directory: &Directory,
        zip64: bool,
    ) -> Result<(Vec<CentralDirectoryEntry>, HashMap<String, usize>, u64)> {
        let mut reader = BufReader::new(stream);
        reader.seek(SeekFrom::Start(directory.offset))?;

        let capacity = directory.entries.min(u16::MAX as u64) as usize;
        let mut entries = Vec::with_capacity(capacity);
        let mut index = HashMap::with_capacity(capacity);

        for _ in 0..directory.entries {
            let header_offset = reader.stream_position()?;
            let header = CentralDirectoryFileHeader::read(&mut reader, zip64)?;
            let entry = CentralDirectoryEntry::from_header(&header, header_offset)?;

            if entry.local_header_offset() >= directory.offset {
                return Err(Error::field(
                    CentralDirectoryFileHeader::NAME,
                    "local_header_offset",
                    format!("{} points into the central directory", entry.name()),
                ));
            }
            let fits = entry
                .local_header_offset()
                .checked_add(entry.compressed_size())
                .is_some_and(|end| end <= directory.offset);
            if !fits {
                return Err(Error::HeaderMismatch {
                    name: entry.name().to_string(),
                    reason: "compressed size runs past the central directory".to_string(),
                });
            }
            if entry.compression_method() == CompressionMethod::Store
                && entry.compressed_size() != entry.uncompressed_size()
            {
                return Err(Error::HeaderMismatch {
                    name: entry.name().to_string(),
                    reason: "stored entry with differing sizes".to_string(),
                });
            }
            if index.insert(entry.name().to_string(), entries.len()).is_some() {
                return Err(Error::DuplicateName(entry.name().to_string()));
            }

            trace!(name = entry.name(), offset = entry.local_header_offset(), "central directory entry");
            entries.push(entry);
        }

        let end = reader.stream_position()?;
        Ok((entries, index, end))
    }

    /// Entry names in central directory order.
    pub fn list_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name()).collect()
    }

    /// Entry metadata in central directory order.
    pub fn entries(&self) -> &[CentralDirectoryEntry] {
        &self.entries
    }

    /// Look up entry metadata by exact name.
    pub fn entry(&self, name: &str) -> Option<&CentralDirectoryEntry> {
        self.index.get(name).map(|&position| &self.entries[position])
    }

    /// Get the number of entries.
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Whether the package ends with the ZIP64 record chain.
    #[inline]
    pub fn is_zip64(&self) -> bool {
        self.zip64
    }

    /// Open the uncompressed contents of an entry.
    ///
    /// Returns `Ok(None)` when no entry has this name. The first call
    /// validates the entry's local header against the central directory;
    /// later calls return the cached handle.
    pub fn get(&self, name: &str) -> Result<Option<EntryHandle<S>>> {
        let Some(&position) = self.index.get(name) else {
            return Ok(None);
        };

        let mut cache = self.cache.lock();
        if let Some(handle) = cache.get(name) {
            return Ok(Some(handle.clone()));
        }

        let handle = self.open_entry(&self.entries[position])?;
        cache.insert(name.to_string(), handle.clone());
        Ok(Some(handle))
    }

    fn open_entry(&self, entry: &CentralDirectoryEntry) -> Result<EntryHandle<S>> {
        let offset = entry.local_header_offset();
        let header = {
            let mut stream = self.stream.lock();
            stream.seek(SeekFrom::Start(offset))?;
            LocalFileHeader::default().read_from(&mut *stream)?
        };
        header.verify_against(entry)?;

        let data_start = offset + header.encoded_len() as u64;
        let overrun = || Error::HeaderMismatch {
            name: entry.name().to_string(),
            reason: "entry data overruns the next record".to_string(),
        };
        let data_end = data_start.checked_add(entry.compressed_size()).ok_or_else(overrun)?;
        if data_end > self.next_boundary(offset) {
            return Err(overrun());
        }

        let range = EntryRange::new(Arc::clone(&self.stream), data_start, entry.compressed_size());
        let stream = match entry.compression_method() {
            CompressionMethod::Store => EntryStream::Stored(range),
            CompressionMethod::Deflate => EntryStream::Deflated(InflateStream::new(range, entry.uncompressed_size())),
        };

        debug!(
            name = entry.name(),
            offset,
            method = ?entry.compression_method(),
            size = entry.uncompressed_size(),
            "resolved entry"
        );
        Ok(EntryHandle::new(stream))
    }

    /// Start of whatever follows the local header at `offset`: the next
    /// local header, or the central directory.
    fn next_boundary(&self, offset: u64) -> u64 {
        let next = self.boundaries.partition_point(|&o| o <= offset);
        self.boundaries.get(next).copied().unwrap_or(self.directory.offset)
    }

    /// Raw bytes of an entry: local header, data and any data descriptor.
    pub fn entry_range(&self, name: &str) -> Option<ByteRange> {
        let start = self.entry(name)?.local_header_offset();
        Some(ByteRange::new(start, self.next_boundary(start) - start))
    }

    /// Raw bytes of an entry's central directory header.
    pub fn central_directory_entry_range(&self, name: &str) -> Option<ByteRange> {
        let entry = self.entry(name)?;
        Some(ByteRange::new(entry.header_offset(), entry.header_len()))
    }

    /// The content, central directory and terminal sections of the package.
    pub fn package_ranges(&self) -> PackageRanges {
        PackageRanges {
            content: ByteRange::new(0, self.directory.offset),
            central_directory: ByteRange::new(self.directory.offset, self.directory.size),
            terminal: ByteRange::new(self.directory.terminal_start, self.len - self.directory.terminal_start),
        }
    }

    /// Stream the bytes of `range` into `hasher`.
    pub fn hash_range<H: Hasher>(&self, range: ByteRange, hasher: &mut H) -> Result<()> {
        let mut buf = vec![0u8; HASH_CHUNK.min(range.length as usize)];
        let mut offset = range.offset;
        let mut remaining = range.length;

        while remaining > 0 {
            let chunk = (remaining as usize).min(buf.len());
            read_exact_at(&self.stream, offset, &mut buf[..chunk])?;
            hasher.update(&buf[..chunk]);
            offset += chunk as u64;
            remaining -= chunk as u64;
        }
        Ok(())
    }

    /// Digest `range` with a fresh hasher.
    pub fn digest_range<H: Hasher>(&self, range: ByteRange, mut hasher: H) -> Result<Vec<u8>> {
        self.hash_range(range, &mut hasher)?;
        Ok(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::dos::DosDateTime;
    use crate::zip::{Zip64ExtendedInfo, VERSION_ZIP64};
    use crate::ErrorKind;

    #[test]
    fn test_too_small() {
        let err = ArchiveReader::open(Cursor::new(vec![0u8; 10])).err().unwrap();
        assert!(matches!(err, Error::ArchiveTooSmall { size: 10 }));
    }

    #[test]
    fn test_not_a_zip() {
        let err = ArchiveReader::open(Cursor::new(vec![0u8; 100])).err().unwrap();
        assert!(matches!(err, Error::InvalidSignature { .. }));
    }

    #[test]
    fn test_empty_plain_zip_rejected() {
        let eocd = EocdRecord {
            signature: EocdRecord::SIGNATURE,
            ..Default::default()
        };
        let err = ArchiveReader::open(Cursor::new(eocd.to_bytes().unwrap())).err().unwrap();
        assert!(matches!(err, Error::FieldInvalid { field: "total_entries", .. }));
    }

    #[test]
    fn test_zip64_without_room_for_locator() {
        let err = ArchiveReader::open(Cursor::new(EocdRecord::zip64().to_bytes().unwrap()))
            .err()
            .unwrap();
        assert!(matches!(err, Error::ArchiveTooSmall { .. }));
    }

    /// Lay out one local header with its data, then a single-entry central
    /// directory and the ZIP64 terminal records.
    fn single_entry_package(local: &LocalFileHeader, data: &[u8], header: &CentralDirectoryFileHeader) -> Vec<u8> {
        let mut bytes = local.to_bytes().unwrap();
        bytes.extend_from_slice(data);

        let cd_offset = bytes.len() as u64;
        header.write_to(&mut bytes).unwrap();
        let cd_end = bytes.len() as u64;

        let mut record = Zip64EocdRecord::new();
        record.set_directory(1, cd_end - cd_offset, cd_offset);
        record.write_to(&mut bytes).unwrap();

        let mut locator = Zip64EocdLocator::new();
        locator.eocd64_offset = Some(cd_end);
        locator.write_to(&mut bytes).unwrap();

        EocdRecord::zip64().write_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_oversized_compressed_size_rejected_at_open() {
        let local = LocalFileHeader::new("a", CompressionMethod::Deflate, DosDateTime::default());
        for compressed_size in [u64::MAX - 10, 1 << 40] {
            let header = CentralDirectoryFileHeader::new(
                "a",
                0,
                compressed_size,
                5,
                0,
                CompressionMethod::Deflate,
                false,
                DosDateTime::default(),
            )
            .unwrap();
            assert_eq!(header.compressed_size_64().unwrap(), compressed_size);

            let bytes = single_entry_package(&local, &[0x03, 0x00], &header);
            let err = ArchiveReader::open(Cursor::new(bytes)).err().unwrap();
            assert!(matches!(err, Error::HeaderMismatch { .. }), "{err}");
            assert_eq!(err.kind(), ErrorKind::Integrity);
        }
    }

    #[test]
    fn test_sentineled_local_sizes_resolve() {
        let crc = msix_common::crc::hash_bytes(b"hello");
        let extended = Zip64ExtendedInfo {
            uncompressed_size: Some(5),
            compressed_size: Some(5),
            ..Default::default()
        };
        let extra = extended.to_extra_field().unwrap();

        let mut local = LocalFileHeader::new("a", CompressionMethod::Store, DosDateTime::default());
        local.patch_sizes(crc, u32::MAX, u32::MAX);
        local.version_needed = VERSION_ZIP64;
        local.extra_field = extra.clone();
        local.extra_field_length = extra.len() as u16;

        let mut header = CentralDirectoryFileHeader::new(
            "a",
            crc,
            5,
            5,
            0,
            CompressionMethod::Store,
            false,
            DosDateTime::default(),
        )
        .unwrap();
        header.version_needed = VERSION_ZIP64;
        header.compressed_size = u32::MAX;
        header.uncompressed_size = u32::MAX;
        header.extra_field = extra.clone();
        header.extra_field_length = extra.len() as u16;

        let reader = ArchiveReader::open(Cursor::new(single_entry_package(&local, b"hello", &header))).unwrap();
        assert_eq!(reader.entry("a").unwrap().compressed_size(), 5);

        let mut contents = Vec::new();
        reader.get("a").unwrap().unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"hello");
    }
}
