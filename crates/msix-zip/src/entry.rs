//! Package entries: central directory metadata and readable handles.

use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::dos::DosDateTime;
use crate::inflate::InflateStream;
use crate::range::EntryRange;
use crate::record::Record;
use crate::zip::{CentralDirectoryFileHeader, CompressionMethod};
use crate::Result;

/// An entry (file) listed in the central directory.
///
/// This contains metadata about the file, not the file data itself.
/// Use [`ArchiveReader::get`](crate::ArchiveReader::get) for the contents.
#[derive(Debug, Clone)]
pub struct CentralDirectoryEntry {
    name: String,
    compression_method: CompressionMethod,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    local_header_offset: u64,
    flags: u16,
    modified: DosDateTime,
    /// Where the header itself sits in the archive.
    header_offset: u64,
    header_len: u64,
}

impl CentralDirectoryEntry {
    /// Resolve a decoded header, read at `header_offset`, into entry metadata.
    pub(crate) fn from_header(header: &CentralDirectoryFileHeader, header_offset: u64) -> Result<Self> {
        Ok(Self {
            name: header.name()?.to_string(),
            compression_method: header.method()?,
            crc32: header.crc32,
            compressed_size: header.compressed_size_64()?,
            uncompressed_size: header.uncompressed_size_64()?,
            local_header_offset: header.local_header_offset_64()?,
            flags: header.flags,
            modified: DosDateTime::new(header.last_mod_time, header.last_mod_date),
            header_offset,
            header_len: header.encoded_len() as u64,
        })
    }

    /// Get the entry name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn compression_method(&self) -> CompressionMethod {
        self.compression_method
    }

    #[inline]
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    #[inline]
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    #[inline]
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    #[inline]
    pub fn local_header_offset(&self) -> u64 {
        self.local_header_offset
    }

    /// Raw general purpose flags.
    #[inline]
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Whether a data descriptor follows the entry data.
    pub fn uses_data_descriptor(&self) -> bool {
        self.flags & crate::zip::FLAG_DATA_DESCRIPTOR != 0
    }

    #[inline]
    pub fn modified(&self) -> DosDateTime {
        self.modified
    }

    /// Get the last modification time as a SystemTime.
    ///
    /// Returns None if the DOS datetime is invalid.
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.modified.to_system_time()
    }

    pub(crate) fn header_offset(&self) -> u64 {
        self.header_offset
    }

    pub(crate) fn header_len(&self) -> u64 {
        self.header_len
    }

    /// Relative path for extraction, with `/` and `\` both treated as
    /// separators.
    ///
    /// Returns `None` for names that are absolute or climb out of the
    /// extraction root.
    pub fn output_path(&self) -> Option<PathBuf> {
        let normalized = self.name.replace('\\', "/");
        if normalized.starts_with('/') {
            return None;
        }

        let mut path = PathBuf::new();
        for component in Path::new(&normalized).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        (!path.as_os_str().is_empty()).then_some(path)
    }

    /// Check if this entry represents a directory.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/') || self.name.ends_with('\\')
    }
}

/// Uncompressed view over one entry's data.
pub enum EntryStream<S> {
    Stored(EntryRange<S>),
    Deflated(InflateStream<EntryRange<S>>),
}

impl<S: Read + Seek> EntryStream<S> {
    /// Uncompressed length.
    pub fn len(&self) -> u64 {
        match self {
            EntryStream::Stored(range) => range.len(),
            EntryStream::Deflated(inflate) => inflate.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Read + Seek> Read for EntryStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            EntryStream::Stored(range) => range.read(buf),
            EntryStream::Deflated(inflate) => inflate.read(buf),
        }
    }
}

impl<S: Read + Seek> Seek for EntryStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            EntryStream::Stored(range) => range.seek(pos),
            EntryStream::Deflated(inflate) => inflate.seek(pos),
        }
    }
}

/// Shared, seekable handle to an entry's uncompressed bytes.
///
/// Handles returned by the reader are cached per name, so every clone and
/// every later lookup of the same name shares one read position.
pub struct EntryHandle<S> {
    inner: Arc<Mutex<EntryStream<S>>>,
    len: u64,
}

impl<S> Clone for EntryHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            len: self.len,
        }
    }
}

impl<S: Read + Seek> EntryHandle<S> {
    pub(crate) fn new(stream: EntryStream<S>) -> Self {
        let len = stream.len();
        Self {
            inner: Arc::new(Mutex::new(stream)),
            len,
        }
    }

    /// Uncompressed length.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when both handles share the same underlying stream.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read the whole entry from the start.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        let mut stream = self.inner.lock();
        stream.seek(SeekFrom::Start(0))?;
        let mut data = Vec::with_capacity(self.len as usize);
        stream.read_to_end(&mut data)?;
        Ok(data)
    }
}

impl<S: Read + Seek> Read for EntryHandle<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.lock().read(buf)
    }
}

impl<S: Read + Seek> Seek for EntryHandle<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.lock().seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use msix_common::shared;

    use super::*;

    fn entry(name: &str) -> CentralDirectoryEntry {
        let header = CentralDirectoryFileHeader::new(
            name,
            0,
            0,
            0,
            0,
            CompressionMethod::Store,
            false,
            DosDateTime::default(),
        )
        .unwrap();
        CentralDirectoryEntry::from_header(&header, 0).unwrap()
    }

    #[test]
    fn test_output_path_normalization() {
        let path = entry(r"Assets\Logo\store.png").output_path();
        assert_eq!(path, Some(PathBuf::from("Assets/Logo/store.png")));
        assert_eq!(entry("./a/./b").output_path(), Some(PathBuf::from("a/b")));
    }

    #[test]
    fn test_output_path_rejects_escapes() {
        assert_eq!(entry("../evil.dll").output_path(), None);
        assert_eq!(entry(r"a\..\..\evil.dll").output_path(), None);
        assert_eq!(entry("/etc/passwd").output_path(), None);
        assert_eq!(entry(r"\windows\system32").output_path(), None);
    }

    #[test]
    fn test_is_dir() {
        assert!(entry("Assets/").is_dir());
        assert!(!entry("Assets/logo.png").is_dir());
    }

    #[test]
    fn test_header_len() {
        let entry = entry("AppxManifest.xml");
        assert_eq!(entry.header_len(), 46 + 16);
        assert!(entry.last_modified().is_some());
    }

    #[test]
    fn test_handle_clones_share_position() {
        let stream = shared(Cursor::new(b"0123456789".to_vec()));
        let handle = EntryHandle::new(EntryStream::Stored(EntryRange::new(stream, 0, 10)));
        let mut first = handle.clone();
        let mut second = handle.clone();
        assert!(first.ptr_eq(&second));

        let mut buf = [0u8; 3];
        first.read_exact(&mut buf).unwrap();
        second.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"345");

        assert_eq!(handle.read_all().unwrap(), b"0123456789");
    }
}
