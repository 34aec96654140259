//! End of Central Directory structures.

use std::io::{Read, Seek};

use crate::record::{field, FieldDescriptor, Record, Validator};
use crate::zip::{is_sentinel_u16, is_sentinel_u32, VERSION_ZIP64};
use crate::{Error, Result};

/// End of Central Directory Record.
///
/// Located at the very end of the archive. Packages never carry a comment,
/// so the record always starts exactly 22 bytes before the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EocdRecord {
    pub signature: u32,
    pub disk_number: u16,
    pub cd_disk: u16,
    pub entries_on_disk: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_length: u16,
    pub comment: Vec<u8>,
}

impl Record for EocdRecord {
    const NAME: &'static str = "EndOfCentralDirectory";

    fn fields() -> &'static [FieldDescriptor<Self>] {
        static FIELDS: &[FieldDescriptor<EocdRecord>] = &[
            field!("signature", u32, signature => Validator::Signature(EocdRecord::SIGNATURE)),
            field!("disk_number", u16, disk_number => Validator::Either(0, 0xFFFF)),
            field!("cd_disk", u16, cd_disk => Validator::Check(|r| {
                if r.cd_disk != 0 && r.cd_disk != 0xFFFF {
                    return Err(format!("expected either 0 or 65535, got {}", r.cd_disk));
                }
                if r.cd_disk != r.disk_number {
                    return Err("disk numbers differ".to_string());
                }
                Ok(())
            })),
            field!("entries_on_disk", u16, entries_on_disk),
            field!("total_entries", u16, total_entries => Validator::Check(|r| {
                if r.total_entries != r.entries_on_disk {
                    return Err("entry counts differ".to_string());
                }
                Ok(())
            })),
            field!("cd_size", u32, cd_size),
            field!("cd_offset", u32, cd_offset => Validator::Check(|r| {
                let zip64_form = |value: u32| value == 0 || is_sentinel_u32(value);
                if r.is_zip64() && !(zip64_form(r.cd_size) && zip64_form(r.cd_offset)) {
                    return Err("ZIP64 archives must zero or sentinel the central directory size and offset".to_string());
                }
                Ok(())
            })),
            field!("comment_length", u16, comment_length => Validator::Exact(0)),
            field!("comment", bytes, comment, comment_length),
        ];
        FIELDS
    }
}

impl EocdRecord {
    /// End of Central Directory signature as u32.
    pub const SIGNATURE: u32 = 0x06054b50;

    /// Size of the record without a comment.
    pub const SIZE: u64 = 22;

    /// Record whose counts, size and offset all defer to the ZIP64 records.
    pub fn zip64() -> Self {
        Self {
            signature: Self::SIGNATURE,
            disk_number: 0,
            cd_disk: 0,
            entries_on_disk: u16::MAX,
            total_entries: u16::MAX,
            cd_size: u32::MAX,
            cd_offset: u32::MAX,
            comment_length: 0,
            comment: Vec::new(),
        }
    }

    /// Whether any field defers to the ZIP64 records.
    pub fn is_zip64(&self) -> bool {
        is_sentinel_u16(self.disk_number)
            || is_sentinel_u16(self.cd_disk)
            || is_sentinel_u16(self.entries_on_disk)
            || is_sentinel_u16(self.total_entries)
            || is_sentinel_u32(self.cd_size)
            || is_sentinel_u32(self.cd_offset)
    }
}

/// ZIP64 End of Central Directory Locator.
///
/// Sits directly before the End of Central Directory Record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Zip64EocdLocator {
    pub signature: u32,
    pub disk_with_eocd64: u32,
    /// Offset of the ZIP64 End of Central Directory Record.
    pub eocd64_offset: Option<u64>,
    pub total_disks: u32,
}

impl Record for Zip64EocdLocator {
    const NAME: &'static str = "Zip64EndOfCentralDirectoryLocator";

    fn fields() -> &'static [FieldDescriptor<Self>] {
        static FIELDS: &[FieldDescriptor<Zip64EocdLocator>] = &[
            field!("signature", u32, signature => Validator::Signature(Zip64EocdLocator::SIGNATURE)),
            field!("disk_with_eocd64", u32, disk_with_eocd64 => Validator::Exact(0)),
            field!("eocd64_offset", set_u64, eocd64_offset => Validator::NotEqual(0)),
            field!("total_disks", u32, total_disks => Validator::Exact(1)),
        ];
        FIELDS
    }
}

impl Zip64EocdLocator {
    /// ZIP64 End of Central Directory Locator signature as u32.
    pub const SIGNATURE: u32 = 0x07064b50;

    /// Size of the locator.
    pub const SIZE: u64 = 20;

    /// Locator awaiting the offset of the ZIP64 record.
    pub fn new() -> Self {
        Self {
            signature: Self::SIGNATURE,
            disk_with_eocd64: 0,
            eocd64_offset: None,
            total_disks: 1,
        }
    }

    /// Read the locator at the current position. The ZIP64 record it
    /// points at must lie before it.
    pub fn read<S: Read + Seek>(stream: &mut S) -> Result<Self> {
        let start = stream.stream_position()?;
        let locator = Self::default().read_from(stream)?;

        let offset = locator.offset();
        if offset >= start {
            return Err(Error::field(
                Self::NAME,
                "eocd64_offset",
                format!("offset {offset} is not before the locator at {start}"),
            ));
        }
        Ok(locator)
    }

    /// Offset of the ZIP64 record; zero until injected.
    pub fn offset(&self) -> u64 {
        self.eocd64_offset.unwrap_or(0)
    }
}

/// ZIP64 End of Central Directory Record.
///
/// The entry counts, central directory size and offset are injected by the
/// writer once the central directory has been emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Zip64EocdRecord {
    pub signature: u32,
    /// Size of the remaining record, excluding the leading 12 bytes.
    pub record_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub cd_disk: u32,
    pub entries_on_disk: Option<u64>,
    pub total_entries: Option<u64>,
    pub cd_size: Option<u64>,
    pub cd_offset: Option<u64>,
}

impl Record for Zip64EocdRecord {
    const NAME: &'static str = "Zip64EndOfCentralDirectory";

    fn fields() -> &'static [FieldDescriptor<Self>] {
        static FIELDS: &[FieldDescriptor<Zip64EocdRecord>] = &[
            field!("signature", u32, signature => Validator::Signature(Zip64EocdRecord::SIGNATURE)),
            field!("record_size", u64, record_size => Validator::Exact(Zip64EocdRecord::SIZE - 12)),
            field!("version_made_by", u16, version_made_by => Validator::Exact(VERSION_ZIP64 as u64)),
            field!("version_needed", u16, version_needed => Validator::Exact(VERSION_ZIP64 as u64)),
            field!("disk_number", u32, disk_number => Validator::Exact(0)),
            field!("cd_disk", u32, cd_disk => Validator::Exact(0)),
            field!("entries_on_disk", set_u64, entries_on_disk => Validator::NotEqual(0)),
            field!("total_entries", set_u64, total_entries => Validator::Check(|r| {
                if r.total_entries != r.entries_on_disk {
                    return Err("entry counts differ".to_string());
                }
                Ok(())
            })),
            field!("cd_size", set_u64, cd_size => Validator::NotEqual(0)),
            field!("cd_offset", set_u64, cd_offset => Validator::NotEqual(0)),
        ];
        FIELDS
    }
}

impl Zip64EocdRecord {
    /// ZIP64 End of Central Directory signature as u32.
    pub const SIGNATURE: u32 = 0x06064b50;

    /// Size of the record; no extensible data sector is ever written.
    pub const SIZE: u64 = 56;

    /// Record awaiting its counts, size and offset.
    pub fn new() -> Self {
        Self {
            signature: Self::SIGNATURE,
            record_size: Self::SIZE - 12,
            version_made_by: VERSION_ZIP64,
            version_needed: VERSION_ZIP64,
            ..Default::default()
        }
    }

    /// Inject the central directory summary.
    pub fn set_directory(&mut self, entries: u64, cd_size: u64, cd_offset: u64) {
        self.entries_on_disk = Some(entries);
        self.total_entries = Some(entries);
        self.cd_size = Some(cd_size);
        self.cd_offset = Some(cd_offset);
    }

    /// Read the record at the current position. The central directory it
    /// describes must lie before it.
    pub fn read<S: Read + Seek>(stream: &mut S) -> Result<Self> {
        let start = stream.stream_position()?;
        let record = Self::default().read_from(stream)?;

        for (field, value) in [("cd_size", record.cd_size), ("cd_offset", record.cd_offset)] {
            let value = value.unwrap_or(0);
            if value >= start {
                return Err(Error::field(
                    Self::NAME,
                    field,
                    format!("{value} is not before the record at {start}"),
                ));
            }
        }
        Ok(record)
    }

    pub fn entries(&self) -> u64 {
        self.total_entries.unwrap_or(0)
    }

    pub fn directory_size(&self) -> u64 {
        self.cd_size.unwrap_or(0)
    }

    pub fn directory_offset(&self) -> u64 {
        self.cd_offset.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Place `bytes` at `position` in an otherwise zeroed buffer.
    fn at(position: usize, bytes: Vec<u8>) -> Cursor<Vec<u8>> {
        let mut buf = vec![0u8; position];
        buf.extend(bytes);
        let mut cursor = Cursor::new(buf);
        cursor.set_position(position as u64);
        cursor
    }

    #[test]
    fn test_zip64_eocd_requires_injection() {
        let record = Zip64EocdRecord::new();
        let err = record.to_bytes().unwrap_err();
        assert!(matches!(err, Error::FieldInvalid { field: "entries_on_disk", .. }));
    }

    #[test]
    fn test_zip64_eocd_round_trip() {
        let mut record = Zip64EocdRecord::new();
        record.set_directory(2, 120, 300);
        let bytes = record.to_bytes().unwrap();
        assert_eq!(bytes.len() as u64, Zip64EocdRecord::SIZE);

        let decoded = Zip64EocdRecord::read(&mut at(420, bytes)).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.entries(), 2);
    }

    #[test]
    fn test_zip64_eocd_directory_after_record() {
        let mut record = Zip64EocdRecord::new();
        record.set_directory(2, 120, 300);
        let err = Zip64EocdRecord::read(&mut at(200, record.to_bytes().unwrap())).unwrap_err();
        assert!(matches!(err, Error::FieldInvalid { field: "cd_offset", .. }));
    }

    #[test]
    fn test_zip64_eocd_zero_entries() {
        let mut record = Zip64EocdRecord::new();
        record.set_directory(0, 120, 300);
        let err = Zip64EocdRecord::read(&mut at(420, record.to_bytes().unwrap())).unwrap_err();
        assert!(matches!(err, Error::FieldInvalid { field: "entries_on_disk", .. }));
    }

    #[test]
    fn test_locator() {
        let mut locator = Zip64EocdLocator::new();
        locator.eocd64_offset = Some(64);
        let bytes = locator.to_bytes().unwrap();
        assert_eq!(bytes.len() as u64, Zip64EocdLocator::SIZE);

        assert_eq!(Zip64EocdLocator::read(&mut at(120, bytes.clone())).unwrap().offset(), 64);
        assert!(Zip64EocdLocator::read(&mut at(32, bytes)).is_err());
    }

    #[test]
    fn test_locator_disk_count() {
        let mut locator = Zip64EocdLocator::new();
        locator.eocd64_offset = Some(64);
        locator.total_disks = 2;
        let err = Zip64EocdLocator::read(&mut at(120, locator.to_bytes().unwrap())).unwrap_err();
        assert!(matches!(err, Error::FieldInvalid { field: "total_disks", .. }));
    }

    #[test]
    fn test_eocd_all_sentinels() {
        let eocd = EocdRecord::zip64();
        assert!(eocd.is_zip64());
        let bytes = eocd.to_bytes().unwrap();
        assert_eq!(bytes.len() as u64, EocdRecord::SIZE);
        assert_eq!(EocdRecord::default().read_from(&mut Cursor::new(bytes)).unwrap(), eocd);
    }

    #[test]
    fn test_eocd_partial_sentinel_needs_zip64_form() {
        let eocd = EocdRecord {
            cd_size: 100,
            cd_offset: 50,
            ..EocdRecord::zip64()
        };
        let err = EocdRecord::default()
            .read_from(&mut Cursor::new(eocd.to_bytes().unwrap()))
            .unwrap_err();
        assert!(matches!(err, Error::FieldInvalid { field: "cd_offset", .. }));
    }

    #[test]
    fn test_eocd_plain_zip() {
        let eocd = EocdRecord {
            signature: EocdRecord::SIGNATURE,
            entries_on_disk: 3,
            total_entries: 3,
            cd_size: 100,
            cd_offset: 50,
            ..Default::default()
        };
        let decoded = EocdRecord::default()
            .read_from(&mut Cursor::new(eocd.to_bytes().unwrap()))
            .unwrap();
        assert!(!decoded.is_zip64());
    }

    #[test]
    fn test_eocd_mismatched_counts() {
        let eocd = EocdRecord {
            signature: EocdRecord::SIGNATURE,
            entries_on_disk: 3,
            total_entries: 2,
            ..Default::default()
        };
        let err = EocdRecord::default()
            .read_from(&mut Cursor::new(eocd.to_bytes().unwrap()))
            .unwrap_err();
        assert!(matches!(err, Error::FieldInvalid { field: "total_entries", .. }));
    }
}
