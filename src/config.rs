//! # Relay Startup Configuration
//!
//! Values fixed for the life of the process: where the relay listens, the
//! secrets its auth handler checks, and where logs go. The runtime catalog a
//! client can read and write over `NW` lives in
//! [`ConfigStore`](crate::state::ConfigStore) instead.
//!
//! Load order used by the binary: TOML file (or defaults), then
//! `LICH_RELAY_*` environment overrides, then the CLI port.
//!
//! ```toml
//! [server]
//! address = "0.0.0.0:9001"
//! max_connections = 64
//! shutdown_timeout = 10000   # milliseconds
//!
//! [auth]
//! passphrase = "SBLCHT42"
//!
//! [logging]
//! level = "info"
//! file = "/var/log/lich-relay.log"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;

/// Default listen address; the port matches the catalog's `serverPort`.
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:9001";

/// Shared login passphrase.
pub const DEFAULT_PASSPHRASE: &str = "SBLCHT42";

/// Marker an elevation request must carry.
pub const ELEVATION_MARKER: &str = "elevateRequest";

/// Grant string returned to a session on elevation.
pub const ADMIN_GRANT: &str = "{unDEAD_THR0N3}";

const MAX_CONNECTIONS_CEILING: usize = 65_536;
const MAX_APP_NAME_LEN: usize = 64;

/// Everything the `lich-relay` binary needs before it binds.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Read and parse a TOML file. Missing sections take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ProtocolError::ConfigError(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ProtocolError::ConfigError(format!("Bad TOML: {e}")))
    }

    /// Defaults overridden by `LICH_RELAY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `LICH_RELAY_ADDRESS`, `LICH_RELAY_MAX_CONNECTIONS` and
    /// `LICH_RELAY_PASSPHRASE` on top of the current values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("LICH_RELAY_ADDRESS") {
            self.server.address = addr;
        }
        if let Ok(raw) = std::env::var("LICH_RELAY_MAX_CONNECTIONS") {
            self.server.max_connections = raw.trim().parse().map_err(|e| {
                ProtocolError::ConfigError(format!("LICH_RELAY_MAX_CONNECTIONS={raw:?}: {e}"))
            })?;
        }
        if let Ok(pass) = std::env::var("LICH_RELAY_PASSPHRASE") {
            self.auth.passphrase = pass;
        }
        Ok(())
    }

    /// The default configuration rendered as TOML.
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    /// Every problem found, one human-readable line each. Empty means usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = self.server.validate();
        problems.append(&mut self.auth.validate());
        problems.append(&mut self.logging.validate());
        problems
    }

    /// [`validate`](Self::validate) folded into a single `ConfigError`.
    pub fn validate_strict(&self) -> Result<()> {
        let problems = self.validate();
        if problems.is_empty() {
            return Ok(());
        }
        Err(ProtocolError::ConfigError(format!(
            "{} problem(s) in relay configuration: {}",
            problems.len(),
            problems.join("; ")
        )))
    }
}

/// Listener settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,

    /// Connections served at once; further accepts wait
    pub max_connections: usize,

    /// How long shutdown waits for in-flight connections
    #[serde(with = "millis")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            max_connections: 64,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.address.is_empty() {
            problems.push("Server address cannot be empty".to_string());
        } else if let Err(e) = self.address.parse::<SocketAddr>() {
            problems.push(format!("Invalid server address {:?}: {e}", self.address));
        }

        match self.max_connections {
            0 => problems.push("Max connections must be at least 1".to_string()),
            n if n > MAX_CONNECTIONS_CEILING => problems.push(format!(
                "Max connections {n} exceeds {MAX_CONNECTIONS_CEILING}"
            )),
            _ => {}
        }

        let secs = self.shutdown_timeout.as_secs();
        if secs < 1 {
            problems.push(format!("Shutdown timeout too short: {:?} (min 1s)", self.shutdown_timeout));
        } else if secs > 60 {
            problems.push(format!("Shutdown timeout too long: {secs}s (max 60s)"));
        }

        problems
    }

    /// Copy of this configuration listening on `port` instead.
    pub fn with_port(&self, port: u16) -> Result<Self> {
        let mut addr: SocketAddr = self
            .address
            .parse()
            .map_err(|e| ProtocolError::ConfigError(format!("Invalid server address: {e}")))?;
        addr.set_port(port);
        Ok(Self {
            address: addr.to_string(),
            ..self.clone()
        })
    }
}

/// Secrets checked by the `SB` handler
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Passphrase every login must present
    pub passphrase: String,

    /// Text an elevation request must carry
    pub elevation_marker: String,

    /// Grant returned on successful elevation; only the first 15 bytes are sent
    pub admin_grant: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            passphrase: DEFAULT_PASSPHRASE.to_string(),
            elevation_marker: ELEVATION_MARKER.to_string(),
            admin_grant: ADMIN_GRANT.to_string(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Vec<String> {
        // Login and elevation payloads are NUL-delimited.
        [
            ("Passphrase", &self.passphrase),
            ("Elevation marker", &self.elevation_marker),
            ("Admin grant", &self.admin_grant),
        ]
        .into_iter()
        .filter_map(|(what, value)| {
            if value.is_empty() {
                Some(format!("{what} cannot be empty"))
            } else if value.contains('\0') {
                Some(format!("{what} cannot contain NUL bytes"))
            } else {
                None
            }
        })
        .collect()
    }
}

/// Where and how the relay logs
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Name attached to the startup log line
    pub app_name: String,

    /// Default filter level; `RUST_LOG` takes precedence
    #[serde(with = "level_name")]
    pub level: Level,

    /// Write to stderr
    pub console: bool,

    /// Also append to this file
    pub file: Option<PathBuf>,

    /// JSON lines instead of the human format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: "lich-relay".to_string(),
            level: Level::INFO,
            console: true,
            file: None,
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.app_name.is_empty() || self.app_name.len() > MAX_APP_NAME_LEN {
            problems.push(format!(
                "Application name must be 1 to {MAX_APP_NAME_LEN} bytes, got {}",
                self.app_name.len()
            ));
        }

        if let Some(dir) = self.file.as_deref().and_then(Path::parent) {
            if !dir.as_os_str().is_empty() && !dir.is_dir() {
                problems.push(format!("Log directory {} does not exist", dir.display()));
            }
        }

        if !self.console && self.file.is_none() {
            problems.push("At least one logging output (console or file) must be enabled".to_string());
        }

        problems
    }
}

/// `Duration` as integer milliseconds
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// `tracing::Level` as a lowercase name
mod level_name {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use tracing::Level;

    pub fn serialize<S: Serializer>(level: &Level, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&level.as_str().to_ascii_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Level, D::Error> {
        let name = String::deserialize(d)?;
        name.parse()
            .map_err(|_| D::Error::custom(format!("unknown log level {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NetworkConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.server.address, "0.0.0.0:9001");
        assert_eq!(config.auth.passphrase, DEFAULT_PASSPHRASE);
        assert_eq!(
            config.auth.admin_grant.len(),
            crate::protocol::message::GRANT_LEN
        );
    }

    #[test]
    fn test_partial_toml() {
        let config = NetworkConfig::from_toml(
            r#"
            [auth]
            passphrase = "hunter2"
            "#,
        )
        .unwrap();
        assert_eq!(config.auth.passphrase, "hunter2");
        assert_eq!(config.auth.elevation_marker, ELEVATION_MARKER);
        assert_eq!(config.server.max_connections, 64);
        assert!(config.logging.console);
    }

    #[test]
    fn test_with_port() {
        let server = ServerConfig::default().with_port(4242).unwrap();
        assert_eq!(server.address, "0.0.0.0:4242");
    }

    #[test]
    fn test_example_config_parses() {
        let text = NetworkConfig::example_config();
        let parsed = NetworkConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.server.address, DEFAULT_ADDRESS);
        assert_eq!(parsed.server.shutdown_timeout, timeout::SHUTDOWN_TIMEOUT);
        assert_eq!(parsed.logging.level, Level::INFO);
    }
}
