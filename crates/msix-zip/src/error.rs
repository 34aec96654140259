//! Error types for the msix-zip crate.

use thiserror::Error;

/// Broad category of an [`Error`].
///
/// Callers branch on this rather than on individual variants: a package
/// that fails with anything but [`ErrorKind::Io`] is structurally unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unsupported record.
    Format,
    /// Sections of the archive disagree with each other.
    Integrity,
    /// The deflate payload of an entry is damaged.
    CorruptData,
    /// The writer was driven out of order.
    Contract,
    /// The underlying stream failed.
    Io,
}

/// Errors that can occur when reading or writing packages.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] msix_common::Error),

    /// Invalid record signature.
    #[error("invalid {record} signature: expected {expected:#010x}, got {actual:#010x}")]
    InvalidSignature {
        record: &'static str,
        expected: u32,
        actual: u32,
    },

    /// A field failed validation while decoding or encoding.
    #[error("invalid {record}.{field}: {reason}")]
    FieldInvalid {
        record: &'static str,
        field: &'static str,
        reason: String,
    },

    /// Unsupported compression method.
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    /// The stream is too short to hold the terminal records.
    #[error("archive of {size} bytes is too small to be a package")]
    ArchiveTooSmall { size: u64 },

    /// A 32-bit field is sentineled but the extended information block is missing.
    #[error("{field} requires Zip64 extended information, which is absent")]
    MissingExtendedInfo { field: &'static str },

    /// Entry name is empty, too long, or not UTF-8.
    #[error("invalid entry name: {0}")]
    InvalidName(String),

    /// Bytes found between two sections that must be adjacent.
    #[error("hidden data: expected next record at {expected}, found it at {actual}")]
    HiddenData { expected: u64, actual: u64 },

    /// Local header and central directory disagree.
    #[error("header mismatch for {name}: {reason}")]
    HeaderMismatch { name: String, reason: String },

    /// The same name appears twice.
    #[error("duplicate entry name: {0}")]
    DuplicateName(String),

    /// Deflate payload is damaged or inconsistent with the declared sizes.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// Writer operation called in the wrong state.
    #[error("{operation} called while the writer is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// Declared entry sizes disagree with what was written.
    #[error("entry {name}: {declared} bytes declared but {written} bytes written")]
    SizeMismatch {
        name: String,
        declared: u64,
        written: u64,
    },
}

impl Error {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::Common(msix_common::Error::Io(_)) => ErrorKind::Io,
            Error::Common(_) => ErrorKind::Format,
            Error::InvalidSignature { .. }
            | Error::FieldInvalid { .. }
            | Error::UnsupportedCompression(_)
            | Error::ArchiveTooSmall { .. }
            | Error::MissingExtendedInfo { .. }
            | Error::InvalidName(_) => ErrorKind::Format,
            Error::HiddenData { .. } | Error::HeaderMismatch { .. } | Error::DuplicateName(_) => {
                ErrorKind::Integrity
            }
            Error::CorruptData(_) => ErrorKind::CorruptData,
            Error::InvalidState { .. } | Error::SizeMismatch { .. } => ErrorKind::Contract,
        }
    }

    pub(crate) fn field(record: &'static str, field: &'static str, reason: impl Into<String>) -> Self {
        Error::FieldInvalid {
            record,
            field,
            reason: reason.into(),
        }
    }
}

// Entry streams surface failures through `std::io::Read`, so a package error
// travels inside an `io::Error` and is unwrapped again on the way back.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Error::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            _ => Error::Io(std::io::Error::other("package error lost while unwrapping")),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(inner) => inner,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}

/// Result type for package operations.
pub type Result<T> = std::result::Result<T, Error>;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_error_survives_io_round_trip() {
        let original = Error::CorruptData("stream ended early".into());
        let io: std::io::Error = original.into();
        assert_eq!(io.kind(), std::io::ErrorKind::InvalidData);

        let back = Error::from(io);
        assert!(matches!(back, Error::CorruptData(ref reason) if reason == "stream ended early"));
        assert_eq!(back.kind(), ErrorKind::CorruptData);
    }

    #[test]
    fn test_plain_io_error_stays_io() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        assert_eq!(err.kind(), ErrorKind::Io);

        let io: std::io::Error = err.into();
        assert_eq!(io.kind(), std::io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Error::DuplicateName("a".into()).kind(), ErrorKind::Integrity);
        assert_eq!(
            Error::InvalidState {
                operation: "close",
                state: "closed"
            }
            .kind(),
            ErrorKind::Contract
        );
        assert_eq!(Error::field("Record", "field", "bad").kind(), ErrorKind::Format);
    }
}
