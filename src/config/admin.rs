//! Administrator credentials.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use super::defaults::default_admin_username;

/// The built-in administrator, authenticated with HTTP Basic auth.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_username")]
    pub username: String,
    /// Password (argon2 PHC string, bcrypt hash or plaintext). Without one
    /// basic auth is refused.
    pub password: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: default_admin_username(),
            password: None,
        }
    }
}

impl AdminConfig {
    /// Check basic-auth credentials.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let Some(stored) = &self.password else {
            return false;
        };
        username == self.username && verify_password(password, stored)
    }
}

/// Verify a password against a stored argon2 hash, bcrypt hash or plaintext.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if stored.starts_with("$argon2") {
        match PasswordHash::new(stored) {
            Ok(hash) => Argon2::default()
                .verify_password(password.as_bytes(), &hash)
                .is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "Malformed argon2 hash in config");
                false
            }
        }
    } else if stored.starts_with("$2") {
        bcrypt::verify(password, stored).unwrap_or(false)
    } else {
        bool::from(password.as_bytes().ct_eq(stored.as_bytes()))
    }
}
