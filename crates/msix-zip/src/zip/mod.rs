//! ZIP64 record set.
//!
//! Every record except the data descriptor is declared through the record
//! codec, so the same schema drives reading, writing and size computation.

mod central_dir;
mod eocd;
mod extended;
mod local;

pub use central_dir::CentralDirectoryFileHeader;
pub use eocd::{EocdRecord, Zip64EocdLocator, Zip64EocdRecord};
pub use extended::Zip64ExtendedInfo;
pub use local::{DataDescriptor, LocalFileHeader};

/// Version needed to extract: plain deflate or store.
pub const VERSION_DEFAULT: u16 = 20;

/// Version needed to extract: ZIP64 extensions.
pub const VERSION_ZIP64: u16 = 45;

/// General purpose flag: sizes and CRC follow the data in a descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// General purpose flags that are refused: encryption (bits 0 and 6),
/// masked local headers (13) and the reserved bits 12, 14 and 15.
pub const FLAGS_UNSUPPORTED: u16 = (1 << 0) | (1 << 6) | (1 << 12) | (1 << 13) | (1 << 14) | (1 << 15);

/// Largest entry size that still fits a patched 32-bit local header.
pub const MAX_SIZE_WITHOUT_DESCRIPTOR: u64 = u32::MAX as u64 - 1;

/// Header tag of the ZIP64 extended information extra field.
pub const ZIP64_EXTRA_TAG: u16 = 0x0001;

/// Compression methods supported in packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CompressionMethod {
    /// No compression (stored).
    Store = 0,
    /// Raw DEFLATE.
    Deflate = 8,
}

impl TryFrom<u16> for CompressionMethod {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Store),
            8 => Ok(Self::Deflate),
            other => Err(other),
        }
    }
}

/// True when a 16-bit field holds the ZIP64 sentinel.
pub fn is_sentinel_u16(value: u16) -> bool {
    value == u16::MAX
}

/// True when a 32-bit field holds the ZIP64 sentinel.
pub fn is_sentinel_u32(value: u32) -> bool {
    value == u32::MAX
}

/// Shared flag check for local and central headers.
pub(crate) fn check_flags(flags: u16) -> Result<(), String> {
    let unsupported = flags & FLAGS_UNSUPPORTED;
    if unsupported != 0 {
        return Err(format!("unsupported general purpose flags {unsupported:#06x}"));
    }
    Ok(())
}
