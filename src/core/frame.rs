//! Whole frames: header plus payload.

use crate::core::hash::{verify_integrity, HashAlgorithm};
use crate::core::header::{
    FrameHeader, HANDSHAKE_MAGIC, HEADER_SIZE, MAGIC, PROTOCOL_VERSION,
};
use crate::error::{ProtocolError, Result};
use crate::protocol::ProtocolId;

/// Capacity of the buffer reply frames are built into.
pub const REPLY_CAPACITY: usize = 512;

/// Hard ceiling on payload bytes, whatever the configuration says.
pub const MAX_PAYLOAD_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame with a correct header for `payload`.
    ///
    /// Handshake frames get the all-zero magic; every other protocol gets
    /// the relay magic. The hash is chosen by protocol.
    pub fn build(protocol: ProtocolId, msg_type: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self::build_raw(protocol.bytes(), msg_type, payload.into())
    }

    /// Same as [`Frame::build`] for an identifier that may be unknown.
    pub fn build_raw(protocol_id: [u8; 2], msg_type: u8, payload: Vec<u8>) -> Self {
        let algorithm = HashAlgorithm::for_protocol_id(protocol_id);
        let magic = if protocol_id == ProtocolId::Handshake.bytes() {
            HANDSHAKE_MAGIC
        } else {
            MAGIC
        };
        let header = FrameHeader {
            protocol_id,
            msg_type,
            payload_len: u32::try_from(payload.len()).unwrap_or(u32::MAX),
            magic,
            version: PROTOCOL_VERSION,
            hash: algorithm.digest(&payload),
        };
        Self { header, payload }
    }

    pub fn protocol(&self) -> Option<ProtocolId> {
        self.header.protocol()
    }

    pub fn msg_type(&self) -> u8 {
        self.header.msg_type
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Serialize into `out`. Fails when the frame does not fit.
    pub fn encode_into(&self, out: &mut [u8]) -> Result<usize> {
        let needed = self.encoded_len();
        if out.len() < needed {
            return Err(ProtocolError::BufferTooSmall {
                needed,
                capacity: out.len(),
            });
        }
        let n = self.header.encode(out)?;
        out[n..needed].copy_from_slice(&self.payload);
        Ok(needed)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a complete frame. Trailing bytes past the declared payload are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::decode(bytes)?;
        let len = header.payload_len as usize;
        let body = bytes
            .get(HEADER_SIZE..)
            .and_then(|rest| rest.get(..len))
            .ok_or(ProtocolError::ConnectionClosed)?;
        Ok(Self {
            header,
            payload: body.to_vec(),
        })
    }

    pub fn verify(&self) -> bool {
        verify_integrity(&self.header, &self.payload)
    }
}
