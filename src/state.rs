//! Shared server state.

use std::sync::Arc;

use bakery_proto::KeyPair;
use thiserror::Error;
use tracing::{debug, info};
use url::form_urlencoded;
use zeroize::Zeroizing;

use crate::config::{AdminConfig, Config, ConfigError, DischargeConfig};
use crate::discharge::TicketTable;
use crate::idp::{self, IdentityProvider};
use crate::store::{IdentityStore, MemoryStore, SqliteStore, StoreError};

/// Everything request handlers share.
pub struct AppState {
    /// Public base URL, without a trailing slash.
    pub location: String,
    /// Key pair third-party caveats are sealed to.
    pub key: KeyPair,
    /// Root key of identity session macaroons.
    pub root_key: Zeroizing<Vec<u8>>,
    pub admin: AdminConfig,
    pub timing: DischargeConfig,
    pub store: Arc<dyn IdentityStore>,
    pub tickets: TicketTable,
    pub providers: Vec<Arc<dyn IdentityProvider>>,
}

pub type SharedState = Arc<AppState>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("identity provider {name:?}: {source}")]
    Provider {
        name: String,
        #[source]
        source: reqwest::Error,
    },
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn IdentityStore>) -> Result<Self, BuildError> {
        let providers = config
            .identity_providers
            .iter()
            .map(|c| {
                idp::build(c).map_err(|source| BuildError::Provider {
                    name: c.name().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        info!(count = providers.len(), "Identity providers configured");

        Ok(Self {
            location: config.server.base_url().to_string(),
            key: config.keys.key_pair()?,
            root_key: config.keys.root_key()?,
            admin: config.admin.clone(),
            timing: config.discharge.clone(),
            store,
            tickets: TicketTable::new(),
            providers,
        })
    }

    /// Absolute URL of `path` for a ticket, optionally scoped to `domain`.
    pub fn url(&self, path: &str, waitid: &str, domain: Option<&str>) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("waitid", waitid);
        if let Some(domain) = domain {
            query.append_pair("domain", domain);
        }
        format!("{}{path}?{}", self.location, query.finish())
    }

    pub fn provider(&self, name: &str) -> Option<&Arc<dyn IdentityProvider>> {
        self.providers.iter().find(|p| p.name() == name)
    }

    /// Providers to offer for `domain`: those claiming it, or all of them
    /// when none does.
    pub fn providers_for_domain(&self, domain: Option<&str>) -> Vec<&Arc<dyn IdentityProvider>> {
        if let Some(domain) = domain {
            let matching: Vec<_> = self
                .providers
                .iter()
                .filter(|p| p.domain() == Some(domain))
                .collect();
            if !matching.is_empty() {
                return matching;
            }
        }
        self.providers.iter().collect()
    }
}

/// Open the configured identity store.
pub async fn open_store(config: &Config) -> Result<Arc<dyn IdentityStore>, StoreError> {
    Ok(match &config.database {
        Some(db) => {
            info!(path = %db.path, "Opening identity database");
            Arc::new(SqliteStore::open(&db.path).await?)
        }
        None => {
            info!("No database configured, identities are kept in memory");
            Arc::new(MemoryStore::new())
        }
    })
}

/// Periodically expire abandoned login tickets.
pub fn spawn_ticket_sweeper(state: SharedState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.timing.sweep_interval());
        loop {
            interval.tick().await;
            let expired = state.tickets.sweep(state.timing.ticket_lifetime());
            if expired > 0 {
                debug!(expired, remaining = state.tickets.len(), "Swept login tickets");
            }
        }
    })
}
