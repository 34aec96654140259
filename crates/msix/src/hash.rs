//! Concrete [`Hasher`] implementations for package digests.

use msix_zip::Hasher;
use sha2::{Digest, Sha256};

/// SHA-256, the digest used by package block maps and signatures.
#[derive(Clone, Default)]
pub struct Sha256Hasher(Sha256);

impl Sha256Hasher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Hasher for Sha256Hasher {
    fn update(&mut self, bytes: &[u8]) {
        Digest::update(&mut self.0, bytes);
    }

    fn finish(self) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}
