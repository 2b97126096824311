//! # Protocol Layer
//!
//! The six sub-protocols spoken by the relay and their routing.
//!
//! Every frame names its sub-protocol with a two-byte ASCII identifier and a
//! one-byte message type. [`ProtocolId`] covers the identifiers; the [`msg`]
//! module lists the message types.
//!
//! ## Components
//! - **Message**: payload parsers and reply encoders
//! - **Dispatcher**: `(protocol, type)` routing to one [`Handler`](dispatcher::Handler) per sub-protocol
//! - **Handlers**: handshake, auth, transfer, config, exec, teardown
//! - **Responder**: error frames

pub mod dispatcher;
pub mod handlers;
pub mod message;
pub mod responder;

#[cfg(test)]
mod tests;

use std::fmt;

use crate::core::hash::HashAlgorithm;

/// Message types, grouped by sub-protocol.
pub mod msg {
    pub const AR_REQ: u8 = 0x01;
    pub const AR_RESP: u8 = 0x02;

    pub const SB_REQ: u8 = 0x10;
    pub const SB_RESP: u8 = 0x11;
    pub const SB_ELEVATE: u8 = 0x12;

    pub const BC_RTS: u8 = 0x20;
    pub const BC_CTS: u8 = 0x21;
    pub const BC_DATA: u8 = 0x22;
    pub const BC_ACK: u8 = 0x23;

    pub const NW_SETCFG: u8 = 0x30;
    pub const NW_GETCFG: u8 = 0x31;
    pub const NW_APPROVE: u8 = 0x34;

    pub const UW_EXEC: u8 = 0x40;
    pub const UW_RESULT: u8 = 0x41;
    pub const UW_INVALID: u8 = 0x42;

    pub const ER_REQ: u8 = 0x50;
    pub const ER_RESP: u8 = 0x51;
    pub const ER_IDK: u8 = 0x52;
}

/// Sub-protocol identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolId {
    /// `AR`: capability handshake
    Handshake,
    /// `SB`: login and elevation
    Auth,
    /// `BC`: chunked transfer
    Transfer,
    /// `NW`: runtime configuration
    Config,
    /// `UW`: remote command
    Exec,
    /// `ER`: teardown, and the carrier of every error frame
    Teardown,
}

impl ProtocolId {
    pub const ALL: [ProtocolId; 6] = [
        ProtocolId::Handshake,
        ProtocolId::Auth,
        ProtocolId::Transfer,
        ProtocolId::Config,
        ProtocolId::Exec,
        ProtocolId::Teardown,
    ];

    /// Wire bytes in transmission order.
    pub const fn bytes(self) -> [u8; 2] {
        match self {
            ProtocolId::Handshake => *b"AR",
            ProtocolId::Auth => *b"SB",
            ProtocolId::Transfer => *b"BC",
            ProtocolId::Config => *b"NW",
            ProtocolId::Exec => *b"UW",
            ProtocolId::Teardown => *b"ER",
        }
    }

    pub fn from_bytes(bytes: [u8; 2]) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.bytes() == bytes)
    }

    /// Hash protecting frames of this protocol.
    pub const fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            ProtocolId::Handshake => HashAlgorithm::Md5,
            _ => HashAlgorithm::Blake3,
        }
    }

    /// Whether frames must carry the relay magic and version.
    pub const fn checks_envelope(self) -> bool {
        !matches!(self, ProtocolId::Handshake)
    }

    /// Whether the relay resolves a session token before dispatch.
    pub const fn requires_session(self) -> bool {
        !matches!(self, ProtocolId::Handshake | ProtocolId::Auth)
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b] = self.bytes();
        write!(f, "{}{}", a as char, b as char)
    }
}
