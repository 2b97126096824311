//! Fixed 46-byte frame header.
//!
//! ```text
//! +-------------+---------+-------------+----------+---------+-----------+
//! | protocol(2) | type(1) | len(4, LE)  | magic(6) | ver(1)  | hash(32)  |
//! +-------------+---------+-------------+----------+---------+-----------+
//! ```

use crate::error::{ProtocolError, Result};
use crate::protocol::ProtocolId;

pub const HEADER_SIZE: usize = 46;
pub const MAGIC_SIZE: usize = 6;
pub const HASH_SIZE: usize = 32;

/// Magic carried by every frame except the handshake.
pub const MAGIC: [u8; MAGIC_SIZE] = [0x4C, 0x1C, 0x48, 0x84, 0x92, 0x00];

/// Handshake frames are sent before the peer knows the magic.
pub const HANDSHAKE_MAGIC: [u8; MAGIC_SIZE] = [0; MAGIC_SIZE];

pub const PROTOCOL_VERSION: u8 = 0x06;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub protocol_id: [u8; 2],
    pub msg_type: u8,
    pub payload_len: u32,
    pub magic: [u8; MAGIC_SIZE],
    pub version: u8,
    pub hash: [u8; HASH_SIZE],
}

impl FrameHeader {
    /// Write the header into `out`, returning the number of bytes written.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize> {
        if out.len() < HEADER_SIZE {
            return Err(ProtocolError::BufferTooSmall {
                needed: HEADER_SIZE,
                capacity: out.len(),
            });
        }
        out[0..2].copy_from_slice(&self.protocol_id);
        out[2] = self.msg_type;
        out[3..7].copy_from_slice(&self.payload_len.to_le_bytes());
        out[7..13].copy_from_slice(&self.magic);
        out[13] = self.version;
        out[14..HEADER_SIZE].copy_from_slice(&self.hash);
        Ok(HEADER_SIZE)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        // Fixed-size buffer always fits.
        let _ = self.encode(&mut buf);
        buf
    }

    /// Parse the first 46 bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::TruncatedHeader(bytes.len()));
        }
        let mut protocol_id = [0u8; 2];
        protocol_id.copy_from_slice(&bytes[0..2]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&bytes[3..7]);
        let mut magic = [0u8; MAGIC_SIZE];
        magic.copy_from_slice(&bytes[7..13]);
        let mut hash = [0u8; HASH_SIZE];
        hash.copy_from_slice(&bytes[14..HEADER_SIZE]);

        Ok(Self {
            protocol_id,
            msg_type: bytes[2],
            payload_len: u32::from_le_bytes(len),
            magic,
            version: bytes[13],
            hash,
        })
    }

    pub fn protocol(&self) -> Option<ProtocolId> {
        ProtocolId::from_bytes(self.protocol_id)
    }

    /// Identifier as a number for logging, including unknown ones.
    pub fn protocol_u16(&self) -> u16 {
        u16::from_be_bytes(self.protocol_id)
    }

    /// Magic and version both match the relay's.
    pub fn has_valid_envelope(&self) -> bool {
        self.magic == MAGIC && self.version == PROTOCOL_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FrameHeader {
        FrameHeader {
            protocol_id: *b"NW",
            msg_type: 0x31,
            payload_len: 0x0102_0304,
            magic: MAGIC,
            version: PROTOCOL_VERSION,
            hash: [0xAB; HASH_SIZE],
        }
    }

    #[test]
    fn test_wire_layout() {
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[0..2], b"NW");
        assert_eq!(bytes[2], 0x31);
        assert_eq!(&bytes[3..7], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[7..13], &MAGIC);
        assert_eq!(bytes[13], 0x06);
        assert!(bytes[14..].iter().all(|b| *b == 0xAB));
    }

    #[test]
    fn test_encode_rejects_small_buffer() {
        let mut out = [0u8; HEADER_SIZE - 1];
        let err = sample().encode(&mut out);
        assert!(matches!(
            err,
            Err(ProtocolError::BufferTooSmall { needed: 46, capacity: 45 })
        ));
    }

    #[test]
    fn test_decode_rejects_short_input() {
        let bytes = sample().to_bytes();
        assert!(matches!(
            FrameHeader::decode(&bytes[..20]),
            Err(ProtocolError::TruncatedHeader(20))
        ));
    }

    #[test]
    fn test_envelope_check() {
        let mut h = sample();
        assert!(h.has_valid_envelope());
        h.version = 0x05;
        assert!(!h.has_valid_envelope());
        h.version = PROTOCOL_VERSION;
        h.magic = HANDSHAKE_MAGIC;
        assert!(!h.has_valid_envelope());
    }

    #[test]
    fn test_protocol_lookup() {
        let mut h = sample();
        assert_eq!(h.protocol(), Some(ProtocolId::Config));
        assert_eq!(h.protocol_u16(), 0x4E57);
        h.protocol_id = *b"ZZ";
        assert_eq!(h.protocol(), None);
    }
}
