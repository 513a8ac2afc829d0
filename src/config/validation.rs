//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use std::collections::HashSet;
use std::path::Path;

use bakery_proto::is_valid_domain;
use thiserror::Error;

use super::{Config, IdentityProviderConfig};

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.location is required")]
    MissingLocation,
    #[error("server.location must be an absolute http(s) URL, got '{0}'")]
    InvalidLocation(String),
    #[error("{0}")]
    InvalidKey(String),
    #[error("discharge.{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("discharge.wait_timeout ({wait}s) exceeds discharge.ticket_lifetime ({lifetime}s)")]
    WaitExceedsLifetime { wait: u64, lifetime: u64 },
    #[error("duplicate identity provider name '{0}'")]
    DuplicateProvider(String),
    #[error("identity provider name '{0}' must be non-empty and URL-safe")]
    InvalidProviderName(String),
    #[error("identity provider '{provider}' has invalid domain '{domain}'")]
    InvalidProviderDomain { provider: String, domain: String },
    #[error("identity provider '{provider}' has invalid url '{url}'")]
    InvalidProviderUrl { provider: String, url: String },
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Location
    let location = &config.server.location;
    if location.is_empty() {
        errors.push(ValidationError::MissingLocation);
    } else if !matches!(url::Url::parse(location), Ok(u) if matches!(u.scheme(), "http" | "https"))
    {
        errors.push(ValidationError::InvalidLocation(location.clone()));
    }

    // Keys
    if let Err(e) = config.keys.key_pair() {
        errors.push(ValidationError::InvalidKey(e.to_string()));
    }
    if let Err(e) = config.keys.root_key() {
        errors.push(ValidationError::InvalidKey(e.to_string()));
    }

    // Discharge timing
    let d = &config.discharge;
    for (name, value) in [
        ("wait_timeout", d.wait_timeout),
        ("ticket_lifetime", d.ticket_lifetime),
        ("sweep_interval", d.sweep_interval),
        ("discharge_expiry", d.discharge_expiry),
        ("session_expiry", d.session_expiry),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroDuration(name));
        }
    }
    if d.wait_timeout > d.ticket_lifetime {
        errors.push(ValidationError::WaitExceedsLifetime {
            wait: d.wait_timeout,
            lifetime: d.ticket_lifetime,
        });
    }

    // Identity providers
    let mut names = HashSet::new();
    for idp in &config.identity_providers {
        let name = idp.name();
        if name.is_empty()
            || !name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_'))
        {
            errors.push(ValidationError::InvalidProviderName(name.to_string()));
        }
        if !names.insert(name) {
            errors.push(ValidationError::DuplicateProvider(name.to_string()));
        }
        if let Some(domain) = idp.domain()
            && !is_valid_domain(domain)
        {
            errors.push(ValidationError::InvalidProviderDomain {
                provider: name.to_string(),
                domain: domain.to_string(),
            });
        }
        if let IdentityProviderConfig::Keystone(k) | IdentityProviderConfig::KeystoneToken(k) = idp
            && url::Url::parse(&k.url).is_err()
        {
            errors.push(ValidationError::InvalidProviderUrl {
                provider: name.to_string(),
                url: k.url.clone(),
            });
        }
    }

    // Database path validation
    if let Some(ref db) = config.database {
        let db_path = Path::new(&db.path);
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::DatabasePathInvalid(db.path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
