//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, KeysConfig, DischargeConfig)
//! - [`admin`]: Administrator basic-auth credentials (AdminConfig)
//! - [`idp`]: Identity provider blocks (IdentityProviderConfig)
//! - [`validation`]: Startup checks that collect every error

mod admin;
mod defaults;
mod idp;
mod types;
mod validation;

pub use admin::{AdminConfig, verify_password};
pub use idp::{IdentityProviderConfig, KeystoneConfig, StaticProviderConfig, StaticUser};
pub use types::{Config, ConfigError, DatabaseConfig, DischargeConfig, KeysConfig, ServerConfig};
pub use validation::{ValidationError, validate};
