//! # Transport Layer
//!
//! TCP listener for the relay: accept, spawn one task per connection, shut
//! down gracefully.

pub mod tcp;

pub use tcp::RelayServer;
