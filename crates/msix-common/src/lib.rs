//! Common utilities for msix.
//!
//! This crate provides the foundations shared by the msix crates:
//!
//! - [`SharedStream`] - One underlying archive stream shared by many entry views
//! - [`crc`] - CRC-32 (IEEE, as used by ZIP) hashing utilities
//! - [`CountingWriter`] - A writer adapter that tracks how many bytes went through it

mod error;
mod io;
mod stream;

pub mod crc;

pub use error::{Error, Result};
pub use io::CountingWriter;
pub use stream::{read_at, read_exact_at, shared, stream_len, SharedStream};
