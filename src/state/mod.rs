//! # Shared Relay State
//!
//! The three tables every connection worker consults:
//! - [`ConfigStore`]: runtime configuration catalog
//! - [`SessionRegistry`]: authenticated sessions
//! - [`HandshakeGate`]: recent handshakes per client address
//!
//! Each table sits behind its own `std::sync::Mutex`. Handlers never await
//! while holding one. [`RelayState`] bundles one instance of each, so any
//! number of independent relays can live in one process.

pub mod config_store;
pub mod handshake_gate;
pub mod session_registry;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use config_store::{ConfigKey, ConfigStore};
pub use handshake_gate::HandshakeGate;
pub use session_registry::{
    AuthLevel, Session, SessionHandle, SessionRegistry, Token, TransferState,
};

use crate::config::AuthConfig;
use crate::utils::metrics::RelayMetrics;
use crate::utils::time::{system_clock, Clock};

/// Lock a mutex, taking over the data if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything a handler may read or change.
#[derive(Debug)]
pub struct RelayState {
    pub config: Arc<ConfigStore>,
    pub sessions: SessionRegistry,
    pub handshakes: HandshakeGate,
    pub auth: AuthConfig,
    pub metrics: RelayMetrics,
}

impl RelayState {
    pub fn new(auth: AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let config = Arc::new(ConfigStore::new());
        Self {
            sessions: SessionRegistry::new(Arc::clone(&config), Arc::clone(&clock)),
            handshakes: HandshakeGate::new(clock),
            config,
            auth,
            metrics: RelayMetrics::new(),
        }
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new(AuthConfig::default(), system_clock())
    }
}
