//! # Error Types
//!
//! Error handling for the relay.
//!
//! Two kinds of failure live here:
//! - [`ProtocolError`]: local failures (I/O, timeouts, truncated frames,
//!   configuration). These never reach the wire; the connection is dropped.
//! - [`ErrorCode`]: protocol-level failures a handler reports to the peer.
//!   Each one becomes exactly one error frame on protocol `ER`.
//!
//! ## Example Usage
//! ```rust
//! use lich_relay::error::{ErrorCode, ProtocolError, Result};
//!
//! fn check(code: u16) -> Result<()> {
//!     match ErrorCode::from_code(code) {
//!         Some(code) => Err(ProtocolError::Remote(code)),
//!         None => Ok(()),
//!     }
//! }
//!
//! assert!(check(3).is_err());
//! assert!(check(0).is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

use crate::protocol::msg;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Client-side reply errors
    pub const ERR_UNEXPECTED_REPLY: &str = "Unexpected reply frame";
    pub const ERR_REPLY_INTEGRITY: &str = "Reply failed integrity verification";

    /// Startup errors
    pub const ERR_BIND_FAILED: &str = "Failed to bind listener";
}

/// Protocol-level failure reported to the peer as an error frame.
///
/// The numeric code travels as a 2-byte little-endian payload; the message
/// type of the carrying frame depends on the code (see [`ErrorCode::response_type`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Magic sequence or protocol version did not match.
    MagicVersionMismatch,
    /// Header hash did not match the payload.
    IntegrityFailure,
    /// No usable session, bad credentials, or elevation refused.
    Unauthorized,
    /// Remote command refused by one of the exec gates.
    CommandDenied,
    /// Session expired. Lookups fold this into `Unauthorized`.
    TokenExpired,
    /// Payload shape, route, or state was invalid.
    MalformedFrame,
    /// Configuration key is not in the catalog.
    ConfigNotFound,
    /// Transfer chunk did not match its MD5 tag.
    ChunkIntegrityFailure,
    /// Transfer refused or overran its declared size.
    TransferPolicyViolation,
}

impl ErrorCode {
    /// Wire value of this error.
    pub const fn code(self) -> u16 {
        match self {
            ErrorCode::MagicVersionMismatch => 0x0001,
            ErrorCode::IntegrityFailure => 0x0002,
            ErrorCode::Unauthorized => 0x0003,
            ErrorCode::CommandDenied => 0x0004,
            ErrorCode::TokenExpired => 0x0005,
            ErrorCode::MalformedFrame => 0x0006,
            ErrorCode::ConfigNotFound => 0x0007,
            ErrorCode::ChunkIntegrityFailure => 0x0008,
            ErrorCode::TransferPolicyViolation => 0x0009,
        }
    }

    pub const fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0x0001 => ErrorCode::MagicVersionMismatch,
            0x0002 => ErrorCode::IntegrityFailure,
            0x0003 => ErrorCode::Unauthorized,
            0x0004 => ErrorCode::CommandDenied,
            0x0005 => ErrorCode::TokenExpired,
            0x0006 => ErrorCode::MalformedFrame,
            0x0007 => ErrorCode::ConfigNotFound,
            0x0008 => ErrorCode::ChunkIntegrityFailure,
            0x0009 => ErrorCode::TransferPolicyViolation,
            _ => return None,
        })
    }

    /// Message type of the `ER` frame that carries this error.
    pub const fn response_type(self) -> u8 {
        match self {
            ErrorCode::Unauthorized | ErrorCode::CommandDenied => msg::UW_INVALID,
            ErrorCode::ChunkIntegrityFailure => msg::BC_ACK,
            ErrorCode::TransferPolicyViolation => msg::BC_CTS,
            ErrorCode::MagicVersionMismatch
            | ErrorCode::IntegrityFailure
            | ErrorCode::TokenExpired
            | ErrorCode::MalformedFrame
            | ErrorCode::ConfigNotFound => msg::ER_IDK,
        }
    }

    /// Error frame payload: the code, little-endian.
    pub const fn to_payload(self) -> [u8; 2] {
        self.code().to_le_bytes()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MagicVersionMismatch => "magic/version mismatch",
            ErrorCode::IntegrityFailure => "integrity failure",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::CommandDenied => "command denied",
            ErrorCode::TokenExpired => "token expired",
            ErrorCode::MalformedFrame => "malformed frame",
            ErrorCode::ConfigNotFound => "config key not found",
            ErrorCode::ChunkIntegrityFailure => "chunk integrity failure",
            ErrorCode::TransferPolicyViolation => "transfer policy violation",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:04x})", self.as_str(), self.code())
    }
}

// ProtocolError is the primary error type for local operations
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    #[serde(skip_serializing, skip_deserializing)]
    Io(#[from] io::Error),

    #[error("Output buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("Frame header truncated: got {0} of 46 bytes")]
    TruncatedHeader(usize),

    #[error("Declared payload too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("Relay returned error: {0}")]
    Remote(ErrorCode),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl From<ErrorCode> for ProtocolError {
    fn from(code: ErrorCode) -> Self {
        ProtocolError::Remote(code)
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
