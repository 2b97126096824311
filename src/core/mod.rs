//! # Core Wire Format
//!
//! Framing and integrity for relay traffic.
//!
//! A frame is a fixed 46-byte [`FrameHeader`](header::FrameHeader) followed
//! by `payload_len` payload bytes. The header hash covers the payload only.
//!
//! ## Components
//! - **Header**: fixed-layout encode/decode and envelope checks
//! - **Hash**: BLAKE3 / MD5 selection and verification
//! - **Frame**: building reply frames with bounded output buffers
//! - **Codec**: `tokio_util` codec used by the relay and its client

pub mod codec;
pub mod frame;
pub mod hash;
pub mod header;

pub use codec::FrameCodec;
pub use frame::Frame;
pub use header::FrameHeader;
