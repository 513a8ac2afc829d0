//! Identity store.
//!
//! The discharge engine only needs three things from persistence: look an
//! identity up, record one after a provider login, and bump its
//! `last_discharge` time. Two backends implement [`IdentityStore`]:
//! - [`MemoryStore`]: process-local, used when no database is configured
//! - [`SqliteStore`]: SQLx-backed SQLite with embedded migrations

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use bakery_proto::is_valid_domain;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("username {0:?} already in use")]
    DuplicateUsername(String),
    #[error("invalid domain {domain:?} in username {username:?}")]
    InvalidDomain { username: String, domain: String },
    #[error("corrupt identity record {provider_id:?}: {reason}")]
    Corrupt { provider_id: String, reason: String },
}

/// A user known to the service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    /// Provider-qualified external ID, e.g. `static:alice`.
    pub provider_id: String,
    /// Username; domain-scoped users carry an `@domain` suffix.
    pub username: String,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Groups reported by the identity provider.
    pub groups: Vec<String>,
    /// Time of the last successful login discharge.
    pub last_discharge: Option<DateTime<Utc>>,
}

impl Identity {
    /// Domain suffix of the username, if any.
    pub fn domain(&self) -> Option<&str> {
        self.username.rsplit_once('@').map(|(_, d)| d)
    }

    /// Whether the user belongs to `group`. Every user is implicitly a
    /// member of the group named after themselves.
    pub fn is_member_of(&self, group: &str) -> bool {
        self.username == group || self.groups.iter().any(|g| g == group)
    }

    /// Reject usernames whose domain suffix is malformed.
    pub(crate) fn check_domain(&self) -> Result<(), StoreError> {
        match self.domain() {
            Some(domain) if !is_valid_domain(domain) => Err(StoreError::InvalidDomain {
                username: self.username.clone(),
                domain: domain.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Lookup key for [`IdentityStore::identity`].
#[derive(Debug, Clone, Copy)]
pub enum IdentityKey<'a> {
    ProviderId(&'a str),
    Username(&'a str),
}

/// Persistent identity storage used by the discharge engine.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fetch an identity.
    async fn identity(&self, key: IdentityKey<'_>) -> Result<Option<Identity>, StoreError>;

    /// Insert or update an identity keyed by provider ID and return the
    /// stored record. The stored `last_discharge` is never moved backwards.
    async fn upsert_identity(&self, identity: &Identity) -> Result<Identity, StoreError>;

    /// Record a successful login discharge.
    async fn touch_last_discharge(
        &self,
        provider_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
