//! # Runtime Configuration Store
//!
//! A fixed catalog of nine operational settings, readable and writable over
//! the `NW` protocol. Values are strings on the wire; the relay reads the
//! numeric ones through clamped accessors so a bad value can never push a
//! limit outside its safe range.
//!
//! Every key except [`ConfigKey::ElevationEnabled`] requires an admin caller
//! to change.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::core::frame::MAX_PAYLOAD_LEN;
use crate::state::session_registry::{AuthLevel, HARD_SESSION_CAP};
use crate::state::lock;
use crate::utils::timeout::{DEFAULT_TIMEOUT, MAX_READ_TIMEOUT};

/// Longest stored value, in bytes. Longer writes are truncated; a value
/// that fits in one payload never is.
pub const MAX_VALUE_LEN: usize = 255;

/// Size of the buffer remote commands are copied into.
pub const MAX_CMD_LEN: usize = 256;

const DEFAULT_TOKEN_EXPIRY_SECS: i64 = 60;
const MAX_TOKEN_EXPIRY_SECS: i64 = 86_400;
const MIN_PAYLOAD_LEN: i64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    Timeout,
    MaxChunkSize,
    ElevationEnabled,
    ServerPort,
    TokenExpire,
    MaxSessions,
    MaxPayload,
    CommandExecEnabled,
    CommandSize,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 9] = [
        ConfigKey::Timeout,
        ConfigKey::MaxChunkSize,
        ConfigKey::ElevationEnabled,
        ConfigKey::ServerPort,
        ConfigKey::TokenExpire,
        ConfigKey::MaxSessions,
        ConfigKey::MaxPayload,
        ConfigKey::CommandExecEnabled,
        ConfigKey::CommandSize,
    ];

    /// Name used on the wire.
    pub const fn name(self) -> &'static str {
        match self {
            ConfigKey::Timeout => "timeout",
            ConfigKey::MaxChunkSize => "maxChunkSize",
            ConfigKey::ElevationEnabled => "EleEnabled",
            ConfigKey::ServerPort => "serverPort",
            ConfigKey::TokenExpire => "tknExpire",
            ConfigKey::MaxSessions => "maxSess",
            ConfigKey::MaxPayload => "maxPayload",
            ConfigKey::CommandExecEnabled => "EnCmdExec",
            ConfigKey::CommandSize => "CmdSize",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub const fn default_value(self) -> &'static str {
        match self {
            ConfigKey::Timeout => "10",
            ConfigKey::MaxChunkSize => "256",
            ConfigKey::ElevationEnabled => "False",
            ConfigKey::ServerPort => "9001",
            ConfigKey::TokenExpire => "60",
            ConfigKey::MaxSessions => "5",
            ConfigKey::MaxPayload => "256",
            ConfigKey::CommandExecEnabled => "False",
            ConfigKey::CommandSize => "256",
        }
    }

    pub const fn requires_admin(self) -> bool {
        !matches!(self, ConfigKey::ElevationEnabled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: ConfigKey,
    pub value: String,
    pub requires_admin: bool,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSetError {
    #[error("configuration key not found")]
    NotFound,
    #[error("configuration key requires admin")]
    Unauthorized,
}

/// In-memory configuration table.
#[derive(Debug)]
pub struct ConfigStore {
    entries: Mutex<Vec<ConfigEntry>>,
}

impl ConfigStore {
    /// Store holding the catalog defaults.
    pub fn new() -> Self {
        let entries = ConfigKey::ALL
            .into_iter()
            .map(|key| ConfigEntry {
                key,
                value: key.default_value().to_string(),
                requires_admin: key.requires_admin(),
            })
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<ConfigEntry>> {
        lock(&self.entries)
    }

    /// Value for a wire key name.
    pub fn get(&self, key: &str) -> Option<String> {
        let key = ConfigKey::from_name(key)?;
        Some(self.value(key))
    }

    /// Value for a catalog key.
    pub fn value(&self, key: ConfigKey) -> String {
        self.entries()
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.clone())
            .unwrap_or_else(|| key.default_value().to_string())
    }

    /// Write a value. Admin-gated keys need `caller_is_admin`.
    pub fn set(
        &self,
        key: &str,
        value: &str,
        caller_is_admin: bool,
    ) -> Result<(), ConfigSetError> {
        let mut entries = self.entries();
        let entry = entries
            .iter_mut()
            .find(|e| e.key.name() == key)
            .ok_or(ConfigSetError::NotFound)?;
        if entry.requires_admin && !caller_is_admin {
            return Err(ConfigSetError::Unauthorized);
        }
        entry.value = truncate(value, MAX_VALUE_LEN).to_string();
        debug!(key, value = %entry.value, "Config value updated");
        Ok(())
    }

    /// Whether a caller at `level` may write `key`. Unknown keys are never writable
    /// by non-admins.
    pub fn can_write(&self, level: AuthLevel, key: &str) -> bool {
        if level == AuthLevel::Admin {
            return true;
        }
        self.entries()
            .iter()
            .any(|e| e.key.name() == key && !e.requires_admin)
    }

    pub fn snapshot(&self) -> Vec<ConfigEntry> {
        self.entries().clone()
    }

    fn int(&self, key: ConfigKey) -> i64 {
        parse_leading_int(&self.value(key))
    }

    /// Positive configured value, else `default`, clamped to `[lo, hi]`.
    fn positive_or(&self, key: ConfigKey, default: i64, lo: i64, hi: i64) -> i64 {
        let v = self.int(key);
        let v = if v > 0 { v } else { default };
        v.clamp(lo, hi)
    }

    /// Per-read socket timeout.
    pub fn read_timeout(&self) -> Duration {
        let secs = self.positive_or(
            ConfigKey::Timeout,
            DEFAULT_TIMEOUT.as_secs() as i64,
            1,
            MAX_READ_TIMEOUT.as_secs() as i64,
        );
        Duration::from_secs(secs as u64)
    }

    /// Active session limit, never above the hard cap.
    pub fn max_sessions(&self) -> usize {
        let cap = HARD_SESSION_CAP as i64;
        self.positive_or(ConfigKey::MaxSessions, cap, 1, cap) as usize
    }

    /// Idle seconds before a session expires.
    pub fn token_expiry_secs(&self) -> u64 {
        self.positive_or(
            ConfigKey::TokenExpire,
            DEFAULT_TOKEN_EXPIRY_SECS,
            1,
            MAX_TOKEN_EXPIRY_SECS,
        ) as u64
    }

    /// Largest accepted payload; never below 16 so login stays possible.
    pub fn max_payload(&self) -> usize {
        let hard = MAX_PAYLOAD_LEN as i64;
        self.positive_or(ConfigKey::MaxPayload, hard, MIN_PAYLOAD_LEN, hard) as usize
    }

    /// Longest command accepted by the exec channel, bounded by the copy buffer.
    pub fn command_size_limit(&self) -> usize {
        let buf = MAX_CMD_LEN as i64;
        self.positive_or(ConfigKey::CommandSize, buf, 1, buf) as usize
    }

    /// Largest transfer an RTS may declare. Negative denies everything.
    pub fn max_chunk_size(&self) -> i64 {
        self.int(ConfigKey::MaxChunkSize)
    }

    /// Flags are on only when the value is exactly `True`.
    pub fn flag_enabled(&self, key: ConfigKey) -> bool {
        self.value(key) == "True"
    }

    pub fn server_port(&self) -> i64 {
        self.int(ConfigKey::ServerPort)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Leading integer of `s`: optional whitespace and sign, then digits. Anything
/// unparsable reads as 0.
pub fn parse_leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut n: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        n = n.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }
    if negative {
        -n
    } else {
        n
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_defaults() {
        let store = ConfigStore::new();
        assert_eq!(store.get("timeout").as_deref(), Some("10"));
        assert_eq!(store.get("EleEnabled").as_deref(), Some("False"));
        assert_eq!(store.get("CmdSize").as_deref(), Some("256"));
        assert_eq!(store.get("nope"), None);
        assert_eq!(store.snapshot().len(), 9);
    }

    #[test]
    fn test_only_elevation_flag_is_open() {
        let open: Vec<_> = ConfigKey::ALL
            .into_iter()
            .filter(|k| !k.requires_admin())
            .collect();
        assert_eq!(open, vec![ConfigKey::ElevationEnabled]);
    }

    #[test]
    fn test_set_respects_admin_flag() {
        let store = ConfigStore::new();
        assert_eq!(
            store.set("EnCmdExec", "True", false),
            Err(ConfigSetError::Unauthorized)
        );
        assert_eq!(store.get("EnCmdExec").as_deref(), Some("False"));

        assert_eq!(store.set("EleEnabled", "True", false), Ok(()));
        assert!(store.flag_enabled(ConfigKey::ElevationEnabled));

        assert_eq!(store.set("EnCmdExec", "True", true), Ok(()));
        assert!(store.flag_enabled(ConfigKey::CommandExecEnabled));

        assert_eq!(store.set("missing", "1", true), Err(ConfigSetError::NotFound));
    }

    #[test]
    fn test_can_write() {
        let store = ConfigStore::new();
        assert!(store.can_write(AuthLevel::Unprivileged, "EleEnabled"));
        assert!(!store.can_write(AuthLevel::Unprivileged, "maxSess"));
        assert!(!store.can_write(AuthLevel::Unprivileged, "missing"));
        assert!(store.can_write(AuthLevel::Admin, "maxSess"));
    }

    #[test]
    fn test_flags_are_case_sensitive() {
        let store = ConfigStore::new();
        store.set("EleEnabled", "true", false).ok();
        assert!(!store.flag_enabled(ConfigKey::ElevationEnabled));
        store.set("EleEnabled", "True ", false).ok();
        assert!(!store.flag_enabled(ConfigKey::ElevationEnabled));
    }

    #[test]
    fn test_clamped_accessors() {
        let store = ConfigStore::new();
        assert_eq!(store.read_timeout(), Duration::from_secs(10));
        assert_eq!(store.max_sessions(), 5);
        assert_eq!(store.token_expiry_secs(), 60);
        assert_eq!(store.max_payload(), 256);
        assert_eq!(store.command_size_limit(), 256);
        assert_eq!(store.max_chunk_size(), 256);

        store.set("timeout", "500", true).ok();
        store.set("maxSess", "0", true).ok();
        store.set("tknExpire", "-3", true).ok();
        store.set("maxPayload", "4", true).ok();
        store.set("CmdSize", "9000", true).ok();
        store.set("maxChunkSize", "-1", true).ok();

        assert_eq!(store.read_timeout(), Duration::from_secs(120));
        assert_eq!(store.max_sessions(), HARD_SESSION_CAP);
        assert_eq!(store.token_expiry_secs(), 60);
        assert_eq!(store.max_payload(), 16);
        assert_eq!(store.command_size_limit(), MAX_CMD_LEN);
        assert_eq!(store.max_chunk_size(), -1);
    }

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int("42"), 42);
        assert_eq!(parse_leading_int("  -7x"), -7);
        assert_eq!(parse_leading_int("+3"), 3);
        assert_eq!(parse_leading_int("abc"), 0);
        assert_eq!(parse_leading_int(""), 0);
        assert_eq!(parse_leading_int("99999999999999999999999"), i64::MAX);
    }

    #[test]
    fn test_long_values_truncated() {
        let store = ConfigStore::new();
        let fits = "9".repeat(200);
        store.set("timeout", &fits, true).unwrap();
        assert_eq!(store.value(ConfigKey::Timeout), fits);

        let long = "9".repeat(300);
        store.set("timeout", &long, true).unwrap();
        assert_eq!(store.value(ConfigKey::Timeout).len(), MAX_VALUE_LEN);
    }
}
