//! Central Directory File Header.

use std::io::{Read, Seek};

use crate::dos::DosDateTime;
use crate::record::{field, FieldDescriptor, Record, Validator};
use crate::zip::{
    check_flags, is_sentinel_u16, is_sentinel_u32, CompressionMethod, Zip64ExtendedInfo, FLAG_DATA_DESCRIPTOR,
    MAX_SIZE_WITHOUT_DESCRIPTOR, VERSION_DEFAULT, VERSION_ZIP64,
};
use crate::{Error, Result};

/// Central Directory File Header.
///
/// Each file in the archive has a corresponding central directory entry.
/// Sizes and the local header offset that do not fit 32 bits are carried in
/// a [`Zip64ExtendedInfo`] block inside the extra field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CentralDirectoryFileHeader {
    pub signature: u32,
    pub version_made_by: u16,
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
    pub file_comment_length: u16,
    pub disk_number_start: u16,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub local_header_offset: u32,
    pub file_name: Vec<u8>,
    pub extra_field: Vec<u8>,
    pub file_comment: Vec<u8>,
    /// Parsed ZIP64 block, when the extra field carries one.
    pub extended: Option<Zip64ExtendedInfo>,
}

impl Record for CentralDirectoryFileHeader {
    const NAME: &'static str = "CentralDirectoryFileHeader";

    fn fields() -> &'static [FieldDescriptor<Self>] {
        static FIELDS: &[FieldDescriptor<CentralDirectoryFileHeader>] = &[
            field!("signature", u32, signature => Validator::Signature(CentralDirectoryFileHeader::SIGNATURE)),
            field!("version_made_by", u16, version_made_by),
            field!("version_needed", u16, version_needed),
            field!("flags", u16, flags => Validator::Check(|r| check_flags(r.flags))),
            field!("compression_method", u16, compression_method => Validator::Either(8, 0)),
            field!("last_mod_time", u16, last_mod_time),
            field!("last_mod_date", u16, last_mod_date),
            field!("crc32", u32, crc32),
            field!("compressed_size", u32, compressed_size),
            field!("uncompressed_size", u32, uncompressed_size),
            field!("file_name_length", u16, file_name_length => Validator::NotEqual(0)),
            field!("extra_field_length", u16, extra_field_length),
            field!("file_comment_length", u16, file_comment_length => Validator::Exact(0)),
            field!("disk_number_start", u16, disk_number_start => Validator::Exact(0)),
            field!("internal_attributes", u16, internal_attributes),
            field!("external_attributes", u32, external_attributes),
            field!("local_header_offset", u32, local_header_offset),
            field!("file_name", bytes, file_name, file_name_length),
            field!("extra_field", bytes, extra_field, extra_field_length),
            field!("file_comment", bytes, file_comment, file_comment_length),
        ];
        FIELDS
    }
}

impl CentralDirectoryFileHeader {
    /// Central Directory File Header signature as u32.
    pub const SIGNATURE: u32 = 0x02014b50;

    /// Fixed part of the header, before the name, extra field and comment.
    pub const FIXED_SIZE: usize = 46;

    /// Read one header at the current stream position.
    ///
    /// `zip64` tells whether the archive uses ZIP64 end records; in that
    /// case a sentineled offset is resolved through the extended block
    /// instead of being range-checked here.
    pub fn read<S: Read + Seek>(stream: &mut S, zip64: bool) -> Result<Self> {
        let start = stream.stream_position()?;
        let mut header = Self::default().read_from(stream)?;

        let offset_sentineled = is_sentinel_u32(header.local_header_offset);
        if (!zip64 || !offset_sentineled) && header.local_header_offset as u64 >= start {
            return Err(Error::field(
                Self::NAME,
                "local_header_offset",
                format!("offset {} is not before the entry at {start}", header.local_header_offset),
            ));
        }

        if Zip64ExtendedInfo::is_present_in(&header.extra_field) {
            let expected = [
                is_sentinel_u32(header.uncompressed_size),
                is_sentinel_u32(header.compressed_size),
                offset_sentineled,
                is_sentinel_u16(header.disk_number_start),
            ];
            header.extended = Some(Zip64ExtendedInfo::parse(&header.extra_field, expected, start)?);
        }

        Ok(header)
    }

    /// Build the header for a finished entry, promoting any value that does
    /// not fit 32 bits into a ZIP64 extended block.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        crc32: u32,
        compressed_size: u64,
        uncompressed_size: u64,
        local_header_offset: u64,
        method: CompressionMethod,
        force_data_descriptor: bool,
        modified: DosDateTime,
    ) -> Result<Self> {
        let mut extended = Zip64ExtendedInfo::default();
        let narrow = |value: u64, slot: &mut Option<u64>| -> u32 {
            if value > MAX_SIZE_WITHOUT_DESCRIPTOR {
                *slot = Some(value);
                u32::MAX
            } else {
                value as u32
            }
        };

        let uncompressed = narrow(uncompressed_size, &mut extended.uncompressed_size);
        let compressed = narrow(compressed_size, &mut extended.compressed_size);
        let offset = narrow(local_header_offset, &mut extended.local_header_offset);

        let descriptor = force_data_descriptor
            || compressed_size > MAX_SIZE_WITHOUT_DESCRIPTOR
            || uncompressed_size > MAX_SIZE_WITHOUT_DESCRIPTOR;

        let zip64 = descriptor || !extended.is_empty();
        let (extra_field, extended) = if extended.is_empty() {
            (Vec::new(), None)
        } else {
            (extended.to_extra_field()?, Some(extended))
        };

        Ok(Self {
            signature: Self::SIGNATURE,
            version_made_by: VERSION_ZIP64,
            version_needed: if zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT },
            flags: if descriptor { FLAG_DATA_DESCRIPTOR } else { 0 },
            compression_method: method as u16,
            last_mod_time: modified.time,
            last_mod_date: modified.date,
            crc32,
            compressed_size: compressed,
            uncompressed_size: uncompressed,
            file_name_length: name.len() as u16,
            extra_field_length: extra_field.len() as u16,
            local_header_offset: offset,
            file_name: name.as_bytes().to_vec(),
            extra_field,
            extended,
            ..Default::default()
        })
    }

    /// Whether the entry data is followed by a data descriptor.
    pub fn uses_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Entry name, which must be valid UTF-8.
    pub fn name(&self) -> Result<&str> {
        std::str::from_utf8(&self.file_name)
            .map_err(|_| Error::InvalidName(String::from_utf8_lossy(&self.file_name).into_owned()))
    }

    pub fn method(&self) -> Result<CompressionMethod> {
        CompressionMethod::try_from(self.compression_method).map_err(Error::UnsupportedCompression)
    }

    /// Compressed size, resolved through the extended block when sentineled.
    pub fn compressed_size_64(&self) -> Result<u64> {
        self.resolve(
            self.compressed_size,
            self.extended.as_ref().and_then(|e| e.compressed_size),
            "compressed_size",
        )
    }

    /// Uncompressed size, resolved through the extended block when sentineled.
    pub fn uncompressed_size_64(&self) -> Result<u64> {
        self.resolve(
            self.uncompressed_size,
            self.extended.as_ref().and_then(|e| e.uncompressed_size),
            "uncompressed_size",
        )
    }

    /// Local header offset, resolved through the extended block when sentineled.
    pub fn local_header_offset_64(&self) -> Result<u64> {
        self.resolve(
            self.local_header_offset,
            self.extended.as_ref().and_then(|e| e.local_header_offset),
            "local_header_offset",
        )
    }

    fn resolve(&self, narrow: u32, wide: Option<u64>, field: &'static str) -> Result<u64> {
        if !is_sentinel_u32(narrow) {
            return Ok(narrow as u64);
        }
        wide.ok_or(Error::MissingExtendedInfo { field })
    }
}
