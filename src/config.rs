//! Client configuration using Figment.
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (`ClientConfig::default()`)
//! 2. A TOML file (optional; a missing file is not an error)
//! 3. Environment variables prefixed with `AQUEDUCT_`, using `__` between section and key
//!
//! # Example
//! ```no_run
//! use aqueduct::config::ClientConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // AQUEDUCT_TRANSPORT__MAX_ATTEMPTS=3 overrides the file value
//! let config = ClientConfig::load_from("config/aqueduct.toml")?;
//! config.validate()?;
//! println!("Server: {}", config.server.address());
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{AqError, AqResult};
use crate::transport::codec::Framing;
use crate::validation::{is_in_range, is_not_empty, is_valid_host, is_valid_port};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "AQUEDUCT_";

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/aqueduct.toml";

/// Top-level client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClientConfig {
    /// Device-control server location and owner identity
    pub server: ServerConfig,
    /// Request/response transport tuning
    pub transport: TransportConfig,
    /// PID synchronisation settings
    pub pid: PidConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Device-control server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    /// Server host name or IP address
    pub host: String,
    /// Server TCP port
    pub port: u16,
    /// Owner identity assigned to this client session
    pub user_id: String,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
}

/// Transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TransportConfig {
    /// Maximum send/receive attempts per request
    pub max_attempts: u32,
    /// Read timeout for a single attempt, in milliseconds
    pub recv_timeout_ms: u64,
    /// Pause between send and receive for snapshot requests, in milliseconds
    pub socket_delay_ms: u64,
    /// Default dispatch delay for devices on a physical interface, in milliseconds
    pub command_delay_ms: u64,
    /// Receive buffer size in bytes (upper bound on one reply frame)
    pub recv_buffer_bytes: usize,
    /// Frame format on the wire
    pub framing: Framing,
}

/// PID synchronisation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PidConfig {
    /// Attempt budget for create/update/delete round trips
    pub sync_attempts: u32,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (pretty, compact, json)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 59000,
            user_id: "local".to_string(),
            connect_timeout_ms: 5000,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            recv_timeout_ms: 500,
            socket_delay_ms: 5,
            command_delay_ms: 10,
            recv_buffer_bytes: 32 * 1024,
            framing: Framing::Raw,
        }
    }
}

impl Default for PidConfig {
    fn default() -> Self {
        Self { sync_attempts: 5 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for socket address resolution.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// TCP connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl TransportConfig {
    /// Per-attempt read timeout.
    #[must_use]
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    /// Pause between send and receive for snapshot requests.
    #[must_use]
    pub fn socket_delay(&self) -> Duration {
        Duration::from_millis(self.socket_delay_ms)
    }

    /// Default dispatch delay for non-simulated devices.
    #[must_use]
    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }
}

impl ClientConfig {
    /// Load configuration from the default path and environment variables
    pub fn load() -> AqResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// Environment variables override the file, e.g.
    /// `AQUEDUCT_SERVER__PORT=60000` or `AQUEDUCT_LOGGING__LEVEL=debug`.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AqResult<Self> {
        let config = Self::figment(path.as_ref()).extract()?;
        Ok(config)
    }

    /// The layered provider stack used by [`ClientConfig::load_from`].
    #[must_use]
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(ClientConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AqResult<()> {
        let invalid = |field: &str, reason: &str| {
            AqError::Configuration(format!("{field}: {reason}"))
        };

        is_valid_host(&self.server.host).map_err(|e| invalid("server.host", e))?;
        is_valid_port(self.server.port).map_err(|e| invalid("server.port", e))?;
        is_not_empty(self.server.user_id.trim()).map_err(|e| invalid("server.user_id", e))?;

        if self.transport.max_attempts == 0 {
            return Err(invalid("transport.max_attempts", "must be at least 1"));
        }
        if self.transport.recv_timeout_ms == 0 {
            return Err(invalid("transport.recv_timeout_ms", "must be greater than 0"));
        }
        is_in_range(self.transport.recv_buffer_bytes, 64..=16 * 1024 * 1024)
            .map_err(|e| invalid("transport.recv_buffer_bytes", e))?;

        if self.pid.sync_attempts == 0 {
            return Err(invalid("pid.sync_attempts", "must be at least 1"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(AqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(AqError::Configuration(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            )));
        }

        Ok(())
    }
}
