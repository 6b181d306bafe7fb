//! Configuration for the NUT bridge.

use nutbridge_common::config::{LoggingConfig, ZenohConfig};
use nutbridge_common::serialization::Format;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Standard upsd port.
pub const DEFAULT_UPSD_PORT: u16 = 3493;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] nutbridge_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NutBridgeConfig {
    /// Zenoh connection settings
    pub zenoh: ZenohConfig,

    /// NUT-specific settings
    pub nut: NutConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// NUT polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NutConfig {
    /// Key expression prefix (default: "nut")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// upsd servers to poll, as `host` or `host:port`, in polling order
    pub hosts: Vec<String>,

    /// Port used for hosts given without one
    #[serde(default = "default_port")]
    pub default_port: u16,

    /// Seconds between sweeps
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Seconds after which an unseen device is forgotten
    #[serde(default = "default_cache_expiry")]
    pub cache_expiry_secs: u64,

    /// Bound on a single upsd exchange in milliseconds (none by default)
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Encoding of per-variable payloads
    #[serde(default)]
    pub payload: PayloadFormat,
}

fn default_key_prefix() -> String {
    nutbridge_common::KEY_PREFIX.to_string()
}

fn default_port() -> u16 {
    DEFAULT_UPSD_PORT
}

fn default_poll_interval() -> u64 {
    30
}

fn default_cache_expiry() -> u64 {
    300
}

/// How variable values are encoded on the bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// The bare value text (default).
    #[default]
    Raw,
    /// `{value, previous, timestamp}` as JSON.
    Json,
    /// `{value, previous, timestamp}` as CBOR.
    Cbor,
}

impl PayloadFormat {
    /// Structured serialization format, `None` for raw text.
    pub fn structured(&self) -> Option<Format> {
        match self {
            PayloadFormat::Raw => None,
            PayloadFormat::Json => Some(Format::Json),
            PayloadFormat::Cbor => Some(Format::Cbor),
        }
    }
}

/// A parsed `host[:port]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddr {
    pub host: String,
    pub port: u16,
}

impl HostAddr {
    /// Parse `host` or `host:port`, using `default_port` when none is given.
    pub fn parse(entry: &str, default_port: u16) -> Result<Self, ConfigError> {
        let entry = entry.trim();
        let fragments: Vec<&str> = entry.split(':').collect();
        let (host, port) = match fragments.as_slice() {
            [host] => (*host, default_port),
            [host, port] => {
                let port = port.parse::<u16>().map_err(|e| {
                    ConfigError::Validation(format!("Invalid port in host '{}': {}", entry, e))
                })?;
                (*host, port)
            }
            _ => {
                return Err(ConfigError::Validation(format!(
                    "Cannot parse host '{}' (expected host or host:port)",
                    entry
                )));
            }
        };

        if host.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Host name missing in '{}'",
                entry
            )));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl NutBridgeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: NutBridgeConfig = nutbridge_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nut.hosts.is_empty() {
            return Err(ConfigError::Validation(
                "At least one upsd host must be configured".to_string(),
            ));
        }

        self.nut.host_addrs()?;

        nutbridge_common::validate_prefix(&self.nut.key_prefix)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if self.nut.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }

        if self.nut.cache_expiry_secs == 0 {
            return Err(ConfigError::Validation(
                "cache_expiry_secs must be greater than zero".to_string(),
            ));
        }

        if self.nut.timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "timeout_ms must be greater than zero when set".to_string(),
            ));
        }

        Ok(())
    }
}

impl NutConfig {
    /// Parse every configured host, preserving order.
    pub fn host_addrs(&self) -> Result<Vec<HostAddr>, ConfigError> {
        self.hosts
            .iter()
            .map(|h| HostAddr::parse(h, self.default_port))
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn cache_expiry(&self) -> Duration {
        Duration::from_secs(self.cache_expiry_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutbridge_common::parse_config;

    #[test]
    fn test_parse_minimal_config() {
        let json = r#"{
            zenoh: { mode: "client", connect: ["tcp/localhost:7447"] },
            nut: { hosts: ["localhost"] }
        }"#;

        let config: NutBridgeConfig = parse_config(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.nut.key_prefix, "nut");
        assert_eq!(config.nut.default_port, 3493);
        assert_eq!(config.nut.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.nut.cache_expiry(), Duration::from_secs(300));
        assert_eq!(config.nut.request_timeout(), None);
        assert_eq!(config.nut.payload, PayloadFormat::Raw);
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            zenoh: { mode: "client", connect: ["tcp/broker:7447"], username: "nut" },
            nut: {
                key_prefix: "home/nut",
                hosts: ["ups1.lan", "ups2.lan:3500"],
                poll_interval_secs: 10,
                cache_expiry_secs: 60,
                timeout_ms: 2000,
                payload: "json",
            },
            logging: { level: "debug" }
        }"#;

        let config: NutBridgeConfig = parse_config(json).unwrap();
        config.validate().unwrap();

        let hosts = config.nut.host_addrs().unwrap();
        assert_eq!(
            hosts,
            vec![
                HostAddr {
                    host: "ups1.lan".to_string(),
                    port: 3493
                },
                HostAddr {
                    host: "ups2.lan".to_string(),
                    port: 3500
                },
            ]
        );
        assert_eq!(
            config.nut.request_timeout(),
            Some(Duration::from_millis(2000))
        );
        assert_eq!(config.nut.payload.structured(), Some(Format::Json));
        assert_eq!(config.zenoh.username.as_deref(), Some("nut"));
    }

    #[test]
    fn test_validate_empty_hosts() {
        let json = r#"{
            zenoh: { mode: "peer" },
            nut: { hosts: [] }
        }"#;

        let config: NutBridgeConfig = parse_config(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_host() {
        for bad in ["ups:notaport", "a:b:c", ":3493", "ups:70000"] {
            assert!(
                HostAddr::parse(bad, DEFAULT_UPSD_PORT).is_err(),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_validate_wildcard_prefix() {
        let json = r#"{
            zenoh: { mode: "peer" },
            nut: { hosts: ["localhost"], key_prefix: "nut/**" }
        }"#;

        let config: NutBridgeConfig = parse_config(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_validates() {
        use std::io::Write;

        let mut good = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            good,
            r#"{{ zenoh: {{ mode: "peer" }}, nut: {{ hosts: ["ups.lan:3500"] }} }}"#
        )
        .unwrap();
        let config = NutBridgeConfig::load_from_file(good.path()).unwrap();
        assert_eq!(config.nut.host_addrs().unwrap()[0].port, 3500);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            bad,
            r#"{{ zenoh: {{ mode: "peer" }}, nut: {{ hosts: ["localhost"], timeout_ms: 0 }} }}"#
        )
        .unwrap();
        assert!(matches!(
            NutBridgeConfig::load_from_file(bad.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_zero_interval() {
        let json = r#"{
            zenoh: { mode: "peer" },
            nut: { hosts: ["localhost"], poll_interval_secs: 0 }
        }"#;

        let config: NutBridgeConfig = parse_config(json).unwrap();
        assert!(config.validate().is_err());
    }
}
