//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use std::net::SocketAddr;

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}

pub fn default_metrics_port() -> u16 {
    9090
}

// =============================================================================
// Key Defaults
// =============================================================================

fn random_key_b64() -> String {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    STANDARD.encode(key)
}

pub fn default_private_key() -> String {
    tracing::warn!(
        "No private_key configured - using ephemeral random discharge key. \
         Relying parties must re-fetch the public key after every restart. \
         Set [keys].private_key in config.toml for production use."
    );
    random_key_b64()
}

pub fn default_root_key() -> String {
    tracing::warn!(
        "No root_key configured - using ephemeral random root key. \
         Identity cookies will NOT survive server restarts. \
         Set [keys].root_key in config.toml for production use."
    );
    random_key_b64()
}

// =============================================================================
// Admin Defaults
// =============================================================================

pub fn default_admin_username() -> String {
    "admin".to_string()
}

// =============================================================================
// Discharge Defaults (seconds)
// =============================================================================

pub fn default_wait_timeout() -> u64 {
    60
}

pub fn default_ticket_lifetime() -> u64 {
    600
}

pub fn default_sweep_interval() -> u64 {
    30
}

pub fn default_discharge_expiry() -> u64 {
    24 * 60 * 60
}

pub fn default_session_expiry() -> u64 {
    28 * 24 * 60 * 60
}

// =============================================================================
// Identity Provider Defaults
// =============================================================================

pub fn default_static_name() -> String {
    "static".to_string()
}

pub fn default_keystone_name() -> String {
    "keystone".to_string()
}
