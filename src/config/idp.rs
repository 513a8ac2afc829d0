//! Identity provider configuration.

use serde::Deserialize;

use super::defaults::{default_keystone_name, default_static_name};

/// One `[[identity_providers]]` entry, selected by its `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdentityProviderConfig {
    /// Users listed inline, logged in with an HTML form.
    Static(StaticProviderConfig),
    /// Interactive username/password login checked against Keystone.
    Keystone(KeystoneConfig),
    /// Non-interactive login with an existing Keystone token.
    KeystoneToken(KeystoneConfig),
}

impl IdentityProviderConfig {
    /// Provider name used in login URLs.
    pub fn name(&self) -> &str {
        match self {
            Self::Static(c) => &c.name,
            Self::Keystone(c) | Self::KeystoneToken(c) => &c.name,
        }
    }

    /// Domain the provider's users belong to.
    pub fn domain(&self) -> Option<&str> {
        match self {
            Self::Static(c) => c.domain.as_deref(),
            Self::Keystone(c) | Self::KeystoneToken(c) => c.domain.as_deref(),
        }
    }
}

/// Inline user list.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticProviderConfig {
    #[serde(default = "default_static_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub domain: Option<String>,
    #[serde(default)]
    pub users: Vec<StaticUser>,
}

/// A user of the static provider.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticUser {
    pub username: String,
    /// Password (argon2 PHC string, bcrypt hash or plaintext).
    pub password: String,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Keystone endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct KeystoneConfig {
    #[serde(default = "default_keystone_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Domain appended to usernames, external IDs and groups.
    pub domain: Option<String>,
    /// Keystone base URL, e.g. `https://keystone.example.com:5000`.
    pub url: String,
}
