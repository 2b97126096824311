//! Payload integrity hashing.
//!
//! The handshake predates hash negotiation and uses MD5, stored in the first
//! 16 bytes of the header hash field with the rest zeroed. Every other
//! protocol uses the full 32-byte BLAKE3 digest.

use md5::{Digest, Md5};

use crate::core::header::{FrameHeader, HASH_SIZE};
use crate::protocol::ProtocolId;

pub const MD5_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Blake3,
    Md5,
}

impl HashAlgorithm {
    /// Algorithm for a raw identifier. Unknown identifiers use BLAKE3.
    pub fn for_protocol_id(id: [u8; 2]) -> Self {
        match ProtocolId::from_bytes(id) {
            Some(p) => p.hash_algorithm(),
            None => HashAlgorithm::Blake3,
        }
    }

    /// Number of leading hash bytes that are compared.
    pub const fn compare_len(self) -> usize {
        match self {
            HashAlgorithm::Blake3 => HASH_SIZE,
            HashAlgorithm::Md5 => MD5_SIZE,
        }
    }

    /// Digest of `payload`, padded with zeros to the header field size.
    pub fn digest(self, payload: &[u8]) -> [u8; HASH_SIZE] {
        let mut out = [0u8; HASH_SIZE];
        match self {
            HashAlgorithm::Blake3 => out.copy_from_slice(blake3::hash(payload).as_bytes()),
            HashAlgorithm::Md5 => out[..MD5_SIZE].copy_from_slice(&md5_digest(payload)),
        }
        out
    }

    /// Compare `expected` against a fresh digest of `payload`.
    pub fn verify(self, expected: &[u8; HASH_SIZE], payload: &[u8]) -> bool {
        let n = self.compare_len();
        self.digest(payload)[..n] == expected[..n]
    }
}

pub fn md5_digest(data: &[u8]) -> [u8; MD5_SIZE] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Recompute the protocol's hash over `payload` and compare with the header.
pub fn verify_integrity(header: &FrameHeader, payload: &[u8]) -> bool {
    HashAlgorithm::for_protocol_id(header.protocol_id).verify(&header.hash, payload)
}

/// Check a 16-byte MD5 tag the way a handshake header hash is checked: the
/// tag fills the front of a zeroed hash field. Tags of any other length fail.
pub fn verify_md5_tag(tag: &[u8], payload: &[u8]) -> bool {
    if tag.len() != MD5_SIZE {
        return false;
    }
    let mut field = [0u8; HASH_SIZE];
    field[..MD5_SIZE].copy_from_slice(tag);
    HashAlgorithm::Md5.verify(&field, payload)
}
