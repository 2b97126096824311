//! # Lich Relay
//!
//! An authenticated relay speaking six small sub-protocols over TCP, one
//! request and one reply per connection.
//!
//! Every frame carries a fixed 46-byte header: a two-byte protocol id, a
//! message type, the payload length, a magic sequence, a version byte and a
//! payload hash (MD5 for the bootstrap handshake, BLAKE3 for everything
//! else).
//!
//! ## Modules
//! - [`core`]: frame header, hashing, whole frames and the stream codec
//! - [`protocol`]: payload layouts, routing and the sub-protocol handlers
//! - [`state`]: session registry, handshake gate, runtime config catalog
//! - [`service`]: the per-frame pipeline and a matching client
//! - [`transport`]: TCP accept loop with graceful shutdown
//! - [`config`]: startup configuration
//! - [`utils`]: logging, metrics, clock, timeouts

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod state;
pub mod transport;
pub mod utils;

pub use crate::core::{Frame, FrameCodec, FrameHeader};
pub use crate::error::{ErrorCode, ProtocolError, Result};
pub use crate::protocol::ProtocolId;
pub use crate::service::{RelayClient, RelayService};
pub use crate::transport::RelayServer;
