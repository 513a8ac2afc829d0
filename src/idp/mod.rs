//! Identity providers.
//!
//! A provider logs a user in and reports the outcome through its
//! [`IdpContext`]. Interactive providers drive a browser through HTML
//! forms; non-interactive ones take a credential in a single request and
//! answer with the completed discharge.

pub mod keystone;
pub mod static_users;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use axum::response::Response;
use tracing::{info, warn};
use url::form_urlencoded;

use crate::config::IdentityProviderConfig;
use crate::discharge::responder;
use crate::error::DischargeError;
use crate::state::AppState;
use crate::store::Identity;

pub use keystone::{KeystoneProvider, KeystoneTokenProvider};
pub use static_users::StaticProvider;

/// A login backend.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Name used in login URLs and interaction methods.
    fn name(&self) -> &str;

    /// Human readable description shown on the login choice page.
    fn description(&self) -> &str;

    /// Domain this provider's users belong to, if any.
    fn domain(&self) -> Option<&str>;

    /// Whether the provider is driven by a browser.
    fn interactive(&self) -> bool;

    /// Handle a request to `/login/<name>`.
    async fn handle(&self, ctx: IdpContext, req: IdpRequest) -> Response;
}

/// Build a provider from its configuration.
pub fn build(config: &IdentityProviderConfig) -> Result<Arc<dyn IdentityProvider>, reqwest::Error> {
    Ok(match config {
        IdentityProviderConfig::Static(c) => Arc::new(StaticProvider::new(c.clone())),
        IdentityProviderConfig::Keystone(c) => Arc::new(KeystoneProvider::new(c.clone())?),
        IdentityProviderConfig::KeystoneToken(c) => {
            Arc::new(KeystoneTokenProvider::new(c.clone())?)
        }
    })
}

/// A request routed to a provider.
#[derive(Debug, Clone)]
pub struct IdpRequest {
    pub method: Method,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IdpRequest {
    /// Decode an urlencoded form body.
    pub fn form(&self) -> HashMap<String, String> {
        form_urlencoded::parse(&self.body).into_owned().collect()
    }
}

/// Where a provider reports login outcomes.
#[derive(Clone)]
pub struct IdpContext {
    state: Arc<AppState>,
    provider: String,
    waitid: Option<String>,
    login_url: String,
}

impl IdpContext {
    pub fn new(
        state: Arc<AppState>,
        provider: impl Into<String>,
        waitid: Option<String>,
        login_url: String,
    ) -> Self {
        Self {
            state,
            provider: provider.into(),
            waitid,
            login_url,
        }
    }

    /// URL of this provider's login endpoint for the current ticket.
    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    pub fn waitid(&self) -> Option<&str> {
        self.waitid.as_deref()
    }

    fn require_waitid(&self) -> Result<&str, DischargeError> {
        self.waitid
            .as_deref()
            .filter(|w| !w.is_empty())
            .ok_or(DischargeError::MissingParameter("waitid"))
    }

    /// Store the logged-in identity and complete the ticket with it.
    ///
    /// The ticket is reserved first: nothing is stored for an unknown,
    /// used or expired ticket.
    pub async fn login_success(&self, identity: Identity) -> Result<Identity, DischargeError> {
        let waitid = self.require_waitid()?;
        self.state.tickets.reserve(waitid)?;
        let stored = match self.state.store.upsert_identity(&identity).await {
            Ok(stored) => stored,
            Err(e) => {
                self.state.tickets.release(waitid);
                return Err(e.into());
            }
        };
        self.state.tickets.complete(waitid, Ok(stored.clone()))?;
        crate::metrics::record_login(&self.provider, "ok");
        info!(provider = %self.provider, username = %stored.username, "Login succeeded");
        Ok(stored)
    }

    /// Fail the ticket. The wait request receives `message` verbatim.
    pub fn login_failure(&self, message: impl Into<String>) {
        let message = message.into();
        crate::metrics::record_login(&self.provider, "failed");
        warn!(provider = %self.provider, error = %message, "Login failed");
        if let Some(waitid) = self.waitid()
            && let Err(e) = self.state.tickets.complete(waitid, Err(message))
        {
            warn!(provider = %self.provider, error = %e, "Cannot fail ticket");
        }
    }

    /// Mint the discharge for a ticket completed by this request, in the
    /// same shape a wait request would get.
    pub async fn discharge_response(&self, headers: &HeaderMap) -> Response {
        let version = responder::version(headers);
        let result = match self.require_waitid() {
            Ok(waitid) => crate::discharge::complete_wait(&self.state, waitid, Duration::ZERO).await,
            Err(e) => Err(e),
        };
        responder::wait_response(&self.state, result, version)
    }
}

/// Escape text for HTML element content and quoted attributes.
pub(crate) fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Append `@domain` to a name when a domain is set.
pub(crate) fn qualify(name: &str, domain: Option<&str>) -> String {
    match domain {
        Some(d) => format!("{name}@{d}"),
        None => name.to_string(),
    }
}
