//! Relay counters.
//!
//! Atomic counters owned by a [`RelayService`](crate::service::relay::RelayService).
//! Each relay instance keeps its own set, so tests running several relays
//! in one process never share numbers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

use crate::error::ErrorCode;

#[derive(Debug)]
pub struct RelayMetrics {
    /// Total connections accepted
    pub connections_total: AtomicU64,
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// Frames fully read from a peer
    pub frames_received: AtomicU64,
    /// Reply frames written
    pub frames_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    /// Accepted capability handshakes
    pub handshakes: AtomicU64,
    pub logins_ok: AtomicU64,
    pub logins_failed: AtomicU64,
    pub sessions_created: AtomicU64,
    /// Connections dropped without a reply (timeout, short read)
    pub dropped: AtomicU64,
    /// Bad magic or version, or a header hash that did not verify
    pub frame_errors: AtomicU64,
    /// Authorization failures of any kind
    pub auth_errors: AtomicU64,
    /// Every other error code. `MalformedFrame` lands here whether the
    /// envelope or a handler raised it.
    pub handler_errors: AtomicU64,
    start_time: Instant,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            handshakes: AtomicU64::new(0),
            logins_ok: AtomicU64::new(0),
            logins_failed: AtomicU64::new(0),
            sessions_created: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            frame_errors: AtomicU64::new(0),
            auth_errors: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self, byte_count: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn frame_sent(&self, byte_count: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn handshake_accepted(&self) {
        self.handshakes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn login(&self, ok: bool) {
        if ok {
            self.logins_ok.fetch_add(1, Ordering::Relaxed);
            self.sessions_created.fetch_add(1, Ordering::Relaxed);
        } else {
            self.logins_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn connection_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an error frame by class.
    pub fn error_reply(&self, code: ErrorCode) {
        let counter = match code {
            ErrorCode::MagicVersionMismatch | ErrorCode::IntegrityFailure => &self.frame_errors,
            ErrorCode::Unauthorized | ErrorCode::TokenExpired | ErrorCode::CommandDenied => {
                &self.auth_errors
            }
            _ => &self.handler_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            handshakes: self.handshakes.load(Ordering::Relaxed),
            logins_ok: self.logins_ok.load(Ordering::Relaxed),
            logins_failed: self.logins_failed.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            auth_errors: self.auth_errors.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn log_metrics(&self) {
        let s = self.snapshot();
        info!(
            connections_total = s.connections_total,
            connections_active = s.connections_active,
            frames_received = s.frames_received,
            frames_sent = s.frames_sent,
            bytes_received = s.bytes_received,
            bytes_sent = s.bytes_sent,
            handshakes = s.handshakes,
            logins_ok = s.logins_ok,
            logins_failed = s.logins_failed,
            sessions_created = s.sessions_created,
            dropped = s.dropped,
            frame_errors = s.frame_errors,
            auth_errors = s.auth_errors,
            handler_errors = s.handler_errors,
            uptime_seconds = s.uptime_seconds,
            "Relay metrics snapshot"
        );
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub frames_received: u64,
    pub frames_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub handshakes: u64,
    pub logins_ok: u64,
    pub logins_failed: u64,
    pub sessions_created: u64,
    pub dropped: u64,
    pub frame_errors: u64,
    pub auth_errors: u64,
    pub handler_errors: u64,
    pub uptime_seconds: u64,
}
