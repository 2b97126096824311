//! # Service Layer
//!
//! - [`RelayService`](relay::RelayService): one relay's state and its
//!   per-frame pipeline
//! - [`RelayClient`](client::RelayClient): the matching client

pub mod client;
pub mod relay;

pub use client::RelayClient;
pub use relay::RelayService;
