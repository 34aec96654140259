//! Error types for msix-common.

use thiserror::Error;

/// Common error type for msix operations.
#[derive(Debug, Error)]
pub enum Error {
    /// End of stream reached while reading.
    #[error("unexpected end of stream: needed {needed} bytes but only {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(inner) => inner,
            eof @ Error::UnexpectedEof { .. } => std::io::Error::new(std::io::ErrorKind::UnexpectedEof, eof),
        }
    }
}
