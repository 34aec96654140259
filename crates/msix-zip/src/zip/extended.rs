//! ZIP64 extended information extra field.

use std::io::Cursor;

use crate::record::{field, FieldDescriptor, Record, Validator};
use crate::zip::ZIP64_EXTRA_TAG;
use crate::{Error, Result};

/// Tag and size bytes that precede the optional fields.
const FIXED_SIZE: usize = 4;

/// ZIP64 extended information block carried in a central directory header.
///
/// Each 64-bit slot is present only when the matching 32-bit field of the
/// owning header holds the sentinel. The fixed order is uncompressed size,
/// compressed size, local header offset, disk start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64ExtendedInfo {
    pub tag: u16,
    pub size: u16,
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub local_header_offset: Option<u64>,
    pub disk_start: Option<u32>,
}

impl Default for Zip64ExtendedInfo {
    fn default() -> Self {
        Self {
            tag: ZIP64_EXTRA_TAG,
            size: 0,
            uncompressed_size: None,
            compressed_size: None,
            local_header_offset: None,
            disk_start: None,
        }
    }
}

impl Record for Zip64ExtendedInfo {
    const NAME: &'static str = "Zip64ExtendedInfo";

    fn fields() -> &'static [FieldDescriptor<Self>] {
        static FIELDS: &[FieldDescriptor<Zip64ExtendedInfo>] = &[
            field!("tag", u16, tag => Validator::Exact(ZIP64_EXTRA_TAG as u64)),
            field!("size", u16, size),
            field!("uncompressed_size", opt_u64, uncompressed_size),
            field!("compressed_size", opt_u64, compressed_size),
            field!("local_header_offset", opt_u64, local_header_offset),
            field!("disk_start", opt_u32, disk_start),
        ];
        FIELDS
    }
}

impl Zip64ExtendedInfo {
    /// True when an extra field blob starts with this block's tag.
    pub fn is_present_in(extra_field: &[u8]) -> bool {
        extra_field.len() > 2 && extra_field[..2] == ZIP64_EXTRA_TAG.to_le_bytes()
    }

    /// Parse the block from a header's extra field.
    ///
    /// `expected` flags which of the four slots the owning header sentineled.
    /// `position` is the stream position right after the owning header; a
    /// promoted local header offset must lie before it.
    pub fn parse(extra_field: &[u8], expected: [bool; 4], position: u64) -> Result<Self> {
        let slot = |present: bool| present.then_some(0u64);
        let template = Self {
            uncompressed_size: slot(expected[0]),
            compressed_size: slot(expected[1]),
            local_header_offset: slot(expected[2]),
            disk_start: expected[3].then_some(0),
            ..Default::default()
        };

        let info = template.read_from(&mut Cursor::new(extra_field))?;

        let declared = info.size as usize;
        let actual = extra_field.len() - FIXED_SIZE;
        if declared != actual {
            return Err(Error::field(
                Self::NAME,
                "size",
                format!("declares {declared} bytes but the extra field holds {actual}"),
            ));
        }

        if let Some(offset) = info.local_header_offset {
            if offset >= position {
                return Err(Error::field(
                    Self::NAME,
                    "local_header_offset",
                    format!("offset {offset} is not before the central directory entry at {position}"),
                ));
            }
        }

        Ok(info)
    }

    /// True when no optional slot holds a value.
    pub fn is_empty(&self) -> bool {
        self.uncompressed_size.is_none()
            && self.compressed_size.is_none()
            && self.local_header_offset.is_none()
            && self.disk_start.is_none()
    }

    /// Encode the block with its size field computed from the present slots.
    pub fn to_extra_field(&self) -> Result<Vec<u8>> {
        let mut block = self.clone();
        block.size = (block.encoded_len() - FIXED_SIZE) as u16;
        block.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_counts_only_present_slots() {
        let info = Zip64ExtendedInfo {
            compressed_size: Some(0x1_0000_0000),
            local_header_offset: Some(12),
            ..Default::default()
        };
        let bytes = info.to_extra_field().unwrap();
        assert_eq!(bytes.len(), 4 + 16);
        assert_eq!(&bytes[..4], &[0x01, 0x00, 16, 0]);

        let parsed = Zip64ExtendedInfo::parse(&bytes, [false, true, true, false], 100).unwrap();
        assert_eq!(parsed.compressed_size, Some(0x1_0000_0000));
        assert_eq!(parsed.local_header_offset, Some(12));
        assert_eq!(parsed.uncompressed_size, None);
    }

    #[test]
    fn test_size_must_match_extra_length() {
        let info = Zip64ExtendedInfo {
            uncompressed_size: Some(5),
            ..Default::default()
        };
        let mut bytes = info.to_extra_field().unwrap();
        bytes.extend_from_slice(&[0, 0, 0, 0]);

        let err = Zip64ExtendedInfo::parse(&bytes, [true, false, false, false], 100).unwrap_err();
        assert!(matches!(err, Error::FieldInvalid { field: "size", .. }));
    }

    #[test]
    fn test_promoted_offset_must_precede_entry() {
        let info = Zip64ExtendedInfo {
            local_header_offset: Some(500),
            ..Default::default()
        };
        let bytes = info.to_extra_field().unwrap();

        let err = Zip64ExtendedInfo::parse(&bytes, [false, false, true, false], 400).unwrap_err();
        assert!(matches!(err, Error::FieldInvalid { field: "local_header_offset", .. }));
    }

    #[test]
    fn test_missing_slot_is_truncation() {
        let info = Zip64ExtendedInfo {
            uncompressed_size: Some(5),
            ..Default::default()
        };
        let bytes = info.to_extra_field().unwrap();

        assert!(Zip64ExtendedInfo::parse(&bytes, [true, true, false, false], 100).is_err());
    }

    #[test]
    fn test_tag_detection() {
        assert!(Zip64ExtendedInfo::is_present_in(&[0x01, 0x00, 0x00]));
        assert!(!Zip64ExtendedInfo::is_present_in(&[0x01, 0x00]));
        assert!(!Zip64ExtendedInfo::is_present_in(&[0x0a, 0x00, 0x20, 0x00]));
    }
}
