//! Local file header and data descriptor.

use zerocopy::byteorder::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::dos::DosDateTime;
use crate::entry::CentralDirectoryEntry;
use crate::record::{field, FieldDescriptor, Record, Validator};
use crate::zip::{
    check_flags, is_sentinel_u32, CompressionMethod, Zip64ExtendedInfo, FLAG_DATA_DESCRIPTOR, VERSION_DEFAULT,
    VERSION_ZIP64,
};
use crate::{Error, Result};

/// Local File Header.
///
/// This structure precedes the actual file data in the archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub signature: u32,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
}

impl Record for LocalFileHeader {
    const NAME: &'static str = "LocalFileHeader";

    fn fields() -> &'static [FieldDescriptor<Self>] {
        static FIELDS: &[FieldDescriptor<LocalFileHeader>] = &[
            field!("signature", u32, signature => Validator::Signature(LocalFileHeader::SIGNATURE)),
            field!("version_needed", u16, version_needed
                => Validator::Either(VERSION_DEFAULT as u64, VERSION_ZIP64 as u64)),
            field!("flags", u16, flags => Validator::Check(|r| check_flags(r.flags))),
            field!("compression_method", u16, compression_method => Validator::Either(8, 0)),
            field!("last_mod_time", u16, last_mod_time),
            field!("last_mod_date", u16, last_mod_date),
            field!("crc32", u32, crc32 => Validator::Check(|r| {
                if r.uses_data_descriptor() && r.crc32 != 0 {
                    return Err("crc must be zero when a data descriptor follows".to_string());
                }
                Ok(())
            })),
            field!("compressed_size", u32, compressed_size => Validator::Check(|r| {
                if r.uses_data_descriptor() && r.compressed_size != 0 {
                    return Err("compressed size must be zero when a data descriptor follows".to_string());
                }
                Ok(())
            })),
            field!("uncompressed_size", u32, uncompressed_size),
            field!("file_name_length", u16, file_name_length => Validator::NotEqual(0)),
            field!("extra_field_length", u16, extra_field_length),
            field!("file_name", bytes, file_name, file_name_length),
            field!("extra_field", bytes, extra_field, extra_field_length),
        ];
        FIELDS
    }
}

impl LocalFileHeader {
    /// Local File Header signature as u32.
    pub const SIGNATURE: u32 = 0x04034b50;

    /// Fixed part of the header, before the name and extra field.
    pub const FIXED_SIZE: usize = 30;

    /// Header for an entry whose CRC and sizes are not known yet.
    ///
    /// Declares ZIP64 and a trailing data descriptor until
    /// [`patch_sizes`](Self::patch_sizes) says otherwise.
    pub fn new(name: &str, method: CompressionMethod, modified: DosDateTime) -> Self {
        Self {
            signature: Self::SIGNATURE,
            version_needed: VERSION_ZIP64,
            flags: FLAG_DATA_DESCRIPTOR,
            compression_method: method as u16,
            last_mod_time: modified.time,
            last_mod_date: modified.date,
            file_name_length: name.len() as u16,
            file_name: name.as_bytes().to_vec(),
            ..Default::default()
        }
    }

    /// Fill in the final CRC and 32-bit sizes and drop the data descriptor
    /// flag. The encoded length does not change.
    pub fn patch_sizes(&mut self, crc32: u32, compressed_size: u32, uncompressed_size: u32) {
        self.version_needed = VERSION_DEFAULT;
        self.flags &= !FLAG_DATA_DESCRIPTOR;
        self.crc32 = crc32;
        self.compressed_size = compressed_size;
        self.uncompressed_size = uncompressed_size;
    }

    /// Whether sizes and CRC follow the data in a descriptor.
    pub fn uses_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Compressed and uncompressed sizes, taking sentineled values from the
    /// header's own ZIP64 block.
    pub fn sizes_64(&self) -> Result<(u64, u64)> {
        let compressed_wide = is_sentinel_u32(self.compressed_size);
        let uncompressed_wide = is_sentinel_u32(self.uncompressed_size);
        if !compressed_wide && !uncompressed_wide {
            return Ok((self.compressed_size as u64, self.uncompressed_size as u64));
        }
        if !Zip64ExtendedInfo::is_present_in(&self.extra_field) {
            let field = if compressed_wide { "compressed_size" } else { "uncompressed_size" };
            return Err(Error::MissingExtendedInfo { field });
        }

        // No offset slot is read here, so the position bound never applies.
        let info = Zip64ExtendedInfo::parse(
            &self.extra_field,
            [uncompressed_wide, compressed_wide, false, false],
            u64::MAX,
        )?;
        Ok((
            info.compressed_size.unwrap_or(self.compressed_size as u64),
            info.uncompressed_size.unwrap_or(self.uncompressed_size as u64),
        ))
    }

    /// Cross-check this header against the central directory entry that
    /// points at it.
    pub fn verify_against(&self, entry: &CentralDirectoryEntry) -> Result<()> {
        let mismatch = |reason: &str| Error::HeaderMismatch {
            name: entry.name().to_string(),
            reason: reason.to_string(),
        };

        if self.file_name != entry.name().as_bytes() {
            return Err(mismatch("file name differs"));
        }
        if self.uses_data_descriptor() != entry.uses_data_descriptor() {
            return Err(mismatch("data descriptor flag differs"));
        }
        if self.compression_method != entry.compression_method() as u16 {
            return Err(mismatch("compression method differs"));
        }
        if !self.uses_data_descriptor() {
            if self.crc32 != entry.crc32() {
                return Err(mismatch("crc differs"));
            }
            let (compressed_size, uncompressed_size) = self.sizes_64()?;
            if compressed_size != entry.compressed_size() {
                return Err(mismatch("compressed size differs"));
            }
            if uncompressed_size != entry.uncompressed_size() {
                return Err(mismatch("uncompressed size differs"));
            }
        }
        Ok(())
    }
}

/// Data descriptor written after entry data that did not fit a patched
/// local header. Always the ZIP64 form with a leading signature.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct DataDescriptor {
    pub signature: U32,
    pub crc32: U32,
    pub compressed_size: U64,
    pub uncompressed_size: U64,
}

impl DataDescriptor {
    /// Data descriptor signature as u32.
    pub const SIGNATURE: u32 = 0x08074b50;

    pub fn new(crc32: u32, compressed_size: u64, uncompressed_size: u64) -> Self {
        Self {
            signature: U32::new(Self::SIGNATURE),
            crc32: U32::new(crc32),
            compressed_size: U64::new(compressed_size),
            uncompressed_size: U64::new(uncompressed_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::zip::CentralDirectoryFileHeader;

    fn header() -> LocalFileHeader {
        LocalFileHeader::new("AppxManifest.xml", CompressionMethod::Deflate, DosDateTime::default())
    }

    #[test]
    fn test_new_header_declares_descriptor() {
        let lfh = header();
        assert_eq!(lfh.version_needed, VERSION_ZIP64);
        assert!(lfh.uses_data_descriptor());
        assert_eq!(lfh.encoded_len(), LocalFileHeader::FIXED_SIZE + "AppxManifest.xml".len());
    }

    #[test]
    fn test_patch_keeps_length() {
        let mut lfh = header();
        let before = lfh.encoded_len();
        lfh.patch_sizes(0xDEADBEEF, 10, 20);
        assert_eq!(lfh.encoded_len(), before);
        assert_eq!(lfh.version_needed, VERSION_DEFAULT);
        assert!(!lfh.uses_data_descriptor());

        let decoded = LocalFileHeader::default()
            .read_from(&mut Cursor::new(lfh.to_bytes().unwrap()))
            .unwrap();
        assert_eq!(decoded, lfh);
    }

    #[test]
    fn test_descriptor_requires_zero_crc() {
        let mut lfh = header();
        lfh.crc32 = 1;
        let err = LocalFileHeader::default()
            .read_from(&mut Cursor::new(lfh.to_bytes().unwrap()))
            .unwrap_err();
        assert!(matches!(err, Error::FieldInvalid { field: "crc32", .. }));
    }

    #[test]
    fn test_encrypted_flag_rejected() {
        let mut lfh = header();
        lfh.flags |= 1;
        let err = LocalFileHeader::default()
            .read_from(&mut Cursor::new(lfh.to_bytes().unwrap()))
            .unwrap_err();
        assert!(matches!(err, Error::FieldInvalid { field: "flags", .. }));
    }

    fn wide_header(name: &str, crc32: u32, extended: Option<Zip64ExtendedInfo>) -> LocalFileHeader {
        let mut lfh = LocalFileHeader::new(name, CompressionMethod::Store, DosDateTime::default());
        lfh.patch_sizes(crc32, u32::MAX, u32::MAX);
        lfh.version_needed = VERSION_ZIP64;
        if let Some(extended) = extended {
            lfh.extra_field = extended.to_extra_field().unwrap();
            lfh.extra_field_length = lfh.extra_field.len() as u16;
        }
        lfh
    }

    fn stored_entry(name: &str, crc32: u32, size: u64) -> CentralDirectoryEntry {
        let cd = CentralDirectoryFileHeader::new(
            name,
            crc32,
            size,
            size,
            0,
            CompressionMethod::Store,
            false,
            DosDateTime::default(),
        )
        .unwrap();
        CentralDirectoryEntry::from_header(&cd, 100).unwrap()
    }

    #[test]
    fn test_sentineled_sizes_come_from_own_block() {
        let extended = Zip64ExtendedInfo {
            uncompressed_size: Some(5),
            compressed_size: Some(5),
            ..Default::default()
        };
        let lfh = wide_header("a", 0x3610a686, Some(extended));
        assert_eq!(lfh.sizes_64().unwrap(), (5, 5));

        let decoded = LocalFileHeader::default()
            .read_from(&mut Cursor::new(lfh.to_bytes().unwrap()))
            .unwrap();
        decoded.verify_against(&stored_entry("a", 0x3610a686, 5)).unwrap();

        let err = decoded.verify_against(&stored_entry("a", 0x3610a686, 6)).unwrap_err();
        assert!(matches!(err, Error::HeaderMismatch { .. }));
    }

    #[test]
    fn test_sentineled_size_without_block() {
        let lfh = wide_header("a", 0, None);
        let err = lfh.verify_against(&stored_entry("a", 0, 5)).unwrap_err();
        assert!(matches!(err, Error::MissingExtendedInfo { field: "compressed_size" }));
    }

    #[test]
    fn test_data_descriptor_layout() {
        let dd = DataDescriptor::new(0x11223344, 0x1_0000_0000, 5);
        let bytes = dd.as_bytes();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[..4], &[0x50, 0x4b, 0x07, 0x08]);
        assert_eq!(&bytes[4..8], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(&bytes[8..16], &[0, 0, 0, 0, 1, 0, 0, 0]);
    }
}
