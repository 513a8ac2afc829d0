//! Core configuration types and loading.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use bakery_proto::{KeyPair, ProtocolError, decode_base64};
use serde::Deserialize;
use thiserror::Error;
use zeroize::Zeroizing;

use super::admin::AdminConfig;
use super::defaults::*;
use super::idp::IdentityProviderConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid {field}: {source}")]
    Key {
        field: &'static str,
        #[source]
        source: ProtocolError,
    },
}

/// Service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Public location and listeners.
    pub server: ServerConfig,
    /// Key material.
    #[serde(default)]
    pub keys: KeysConfig,
    /// Built-in administrator.
    #[serde(default)]
    pub admin: AdminConfig,
    /// Discharge timing.
    #[serde(default)]
    pub discharge: DischargeConfig,
    /// Identity database; in-memory when absent.
    pub database: Option<DatabaseConfig>,
    /// Identity providers, in login-page order.
    #[serde(default)]
    pub identity_providers: Vec<IdentityProviderConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Server location and listeners.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Public URL prefix of this service (e.g. "https://idm.example.com").
    /// Third-party caveats name it, and visit/wait URLs are built from it.
    pub location: String,
    /// Discharge API listen address.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Prometheus metrics HTTP port; 0 disables the endpoint.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl ServerConfig {
    /// Location without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.location.trim_end_matches('/')
    }
}

/// Key material, base64 encoded.
#[derive(Debug, Clone, Deserialize)]
pub struct KeysConfig {
    /// X25519 private key used to open third-party caveats.
    #[serde(default = "default_private_key")]
    pub private_key: String,
    /// Root key (32 bytes) for identity cookie macaroons.
    #[serde(default = "default_root_key")]
    pub root_key: String,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            private_key: default_private_key(),
            root_key: default_root_key(),
        }
    }
}

impl KeysConfig {
    /// Decode the discharge key pair.
    pub fn key_pair(&self) -> Result<KeyPair, ConfigError> {
        KeyPair::from_base64(&self.private_key).map_err(|source| ConfigError::Key {
            field: "keys.private_key",
            source,
        })
    }

    /// Decode the identity cookie root key.
    pub fn root_key(&self) -> Result<Zeroizing<Vec<u8>>, ConfigError> {
        let key = Zeroizing::new(decode_base64(&self.root_key).map_err(|source| {
            ConfigError::Key {
                field: "keys.root_key",
                source,
            }
        })?);
        if key.len() != 32 {
            return Err(ConfigError::Key {
                field: "keys.root_key",
                source: ProtocolError::KeyLength {
                    actual: key.len(),
                    expected: 32,
                },
            });
        }
        Ok(key)
    }
}

/// Discharge timing, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct DischargeConfig {
    /// How long a wait request blocks before giving up.
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout: u64,
    /// How long an unfinished login ticket lives.
    #[serde(default = "default_ticket_lifetime")]
    pub ticket_lifetime: u64,
    /// Interval of the expired-ticket sweep.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
    /// Lifetime of minted discharge macaroons.
    #[serde(default = "default_discharge_expiry")]
    pub discharge_expiry: u64,
    /// Lifetime of the identity session cookie.
    #[serde(default = "default_session_expiry")]
    pub session_expiry: u64,
}

impl Default for DischargeConfig {
    fn default() -> Self {
        Self {
            wait_timeout: default_wait_timeout(),
            ticket_lifetime: default_ticket_lifetime(),
            sweep_interval: default_sweep_interval(),
            discharge_expiry: default_discharge_expiry(),
            session_expiry: default_session_expiry(),
        }
    }
}

impl DischargeConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout)
    }

    pub fn ticket_lifetime(&self) -> Duration {
        Duration::from_secs(self.ticket_lifetime)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }

    pub fn discharge_expiry(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.discharge_expiry as i64)
    }

    pub fn session_expiry(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_expiry as i64)
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, or `:memory:`.
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discharge_defaults() {
        let d = DischargeConfig::default();
        assert_eq!(d.wait_timeout, 60);
        assert_eq!(d.ticket_lifetime, 600);
        assert_eq!(d.sweep_interval, 30);
        assert_eq!(d.discharge_expiry, 86_400);
        assert_eq!(d.session_expiry, 28 * 86_400);
    }

    #[test]
    fn minimal_config_parses() {
        let config: Config = toml::from_str(
            r#"
[server]
location = "https://idm.example.com/"
"#,
        )
        .unwrap();
        assert_eq!(config.server.base_url(), "https://idm.example.com");
        assert_eq!(config.server.listen, default_listen());
        assert_eq!(config.server.metrics_port, 9090);
        assert!(config.database.is_none());
        assert!(config.identity_providers.is_empty());
        assert_eq!(config.admin.username, "admin");
    }

    #[test]
    fn ephemeral_keys_decode() {
        let keys = KeysConfig::default();
        assert!(keys.key_pair().is_ok());
        assert_eq!(keys.root_key().unwrap().len(), 32);
    }

    #[test]
    fn short_root_key_is_rejected() {
        let keys = KeysConfig {
            private_key: default_private_key(),
            root_key: "AAAA".into(),
        };
        assert!(matches!(keys.root_key(), Err(ConfigError::Key { .. })));
    }

    #[test]
    fn providers_are_tagged_by_type() {
        let config: Config = toml::from_str(
            r#"
[server]
location = "http://localhost:8081"

[[identity_providers]]
type = "static"
domain = "example"

[[identity_providers.users]]
username = "alice@example"
password = "pw"
groups = ["staff"]

[[identity_providers]]
type = "keystone_token"
name = "token"
url = "http://keystone:5000"
domain = "openstack"
"#,
        )
        .unwrap();
        assert_eq!(config.identity_providers.len(), 2);
        assert_eq!(config.identity_providers[0].name(), "static");
        assert_eq!(config.identity_providers[1].name(), "token");
        assert_eq!(config.identity_providers[1].domain(), Some("openstack"));
        match &config.identity_providers[0] {
            IdentityProviderConfig::Static(s) => assert_eq!(s.users[0].groups, vec!["staff"]),
            other => panic!("unexpected provider {other:?}"),
        }
    }
}
