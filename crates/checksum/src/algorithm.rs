//! Incremental digest accumulators.

use md5::Md5;
use sha2::{Digest as _, Sha256};
use storlink_protocol::ChecksumAlgorithm;

/// Running digest state for one of the supported algorithms.
pub enum Digest {
    Md5(Md5),
    Adler32(adler2::Adler32),
    Sha256(Sha256),
}

impl Digest {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Digest::Md5(Md5::new()),
            ChecksumAlgorithm::Adler32 => Digest::Adler32(adler2::Adler32::new()),
            ChecksumAlgorithm::Sha256 => Digest::Sha256(Sha256::new()),
        }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        match self {
            Digest::Md5(_) => ChecksumAlgorithm::Md5,
            Digest::Adler32(_) => ChecksumAlgorithm::Adler32,
            Digest::Sha256(_) => ChecksumAlgorithm::Sha256,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Digest::Md5(h) => h.update(data),
            Digest::Adler32(h) => h.write_slice(data),
            Digest::Sha256(h) => h.update(data),
        }
    }

    /// Lowercase hex of the native digest.
    pub fn finalize_hex(self) -> String {
        match self {
            Digest::Md5(h) => hex::encode(h.finalize()),
            Digest::Adler32(h) => hex::encode(h.checksum().to_be_bytes()),
            Digest::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

impl std::fmt::Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Digest").field(&self.algorithm()).finish()
    }
}

/// One-shot digest of `data`.
pub fn digest_hex(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
    let mut digest = Digest::new(algorithm);
    digest.update(data);
    digest.finalize_hex()
}
