//! Third-party caveat discharge.
//!
//! A discharge request carries a caveat sealed to our public key. We open
//! it, parse its condition, resolve who is asking and either mint a
//! discharge right away or park the caveat in a ticket until the user has
//! logged in with an identity provider.

pub mod coordinator;
pub mod domain;
pub mod evaluator;
pub mod minter;
pub mod resolver;
pub mod responder;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use axum::http::{HeaderMap, header};
use bakery_proto::{Condition, ThirdPartyCaveat, decode_base64};
use chrono::Utc;
use serde::Serialize;
use tracing::{Instrument, Span, debug, field, info, warn};
use url::form_urlencoded;
use zeroize::Zeroizing;

pub use coordinator::{CompletedLogin, TicketTable};
pub use minter::Minted;

use crate::error::DischargeError;
use crate::state::AppState;
use crate::store::Identity;
use crate::telemetry::spans;

/// Interaction method name for the browser visit URL.
pub const INTERACTIVE_METHOD: &str = "interactive";

/// Where the client goes to log in and where it waits for the outcome.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InteractionInfo {
    #[serde(rename = "VisitURL")]
    pub visit_url: String,
    #[serde(rename = "WaitURL")]
    pub wait_url: String,
    #[serde(rename = "InteractionMethods")]
    pub interaction_methods: BTreeMap<String, String>,
}

/// A decoded caveat waiting for its discharge.
#[derive(Clone)]
pub struct PendingDischarge {
    pub caveat_id: Vec<u8>,
    pub root_key: Zeroizing<Vec<u8>>,
    pub condition: Condition,
    /// Origin of the discharge request; bound into the session macaroon.
    pub origin: Option<String>,
    /// Domain interactive logins are scoped to.
    pub domain: Option<String>,
}

impl fmt::Debug for PendingDischarge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingDischarge")
            .field("caveat_id", &String::from_utf8_lossy(&self.caveat_id))
            .field("condition", &self.condition)
            .field("origin", &self.origin)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

/// Parameters of a discharge request, merged from query and form body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DischargeParams {
    pub id: Option<String>,
    pub id64: Option<String>,
    pub caveat64: Option<String>,
    pub location: Option<String>,
    pub discharge_for_user: Option<String>,
}

impl DischargeParams {
    /// Parse urlencoded query and body. Body values win.
    pub fn parse(query: Option<&str>, body: &[u8]) -> Self {
        let mut params = Self::default();
        let query = query.unwrap_or("").as_bytes();
        for (key, value) in form_urlencoded::parse(query).chain(form_urlencoded::parse(body)) {
            let slot = match key.as_ref() {
                "id" => &mut params.id,
                "id64" => &mut params.id64,
                "caveat64" => &mut params.caveat64,
                "location" => &mut params.location,
                "discharge-for-user" => &mut params.discharge_for_user,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }
        params
    }

    fn caveat_id(&self) -> Result<Vec<u8>, DischargeError> {
        match (&self.id64, &self.id) {
            (Some(id64), _) => Ok(decode_base64(id64)?),
            (None, Some(id)) => Ok(id.as_bytes().to_vec()),
            (None, None) => Err(DischargeError::MissingParameter("id")),
        }
    }
}

/// Outcome of a discharge request.
#[derive(Debug)]
pub enum Discharged {
    /// The condition held; here is the discharge.
    Minted(Minted),
    /// The user must log in first.
    Interaction(Box<InteractionInfo>),
}

/// Open and decode the caveat named by `params`.
pub fn decode_caveat(
    state: &AppState,
    params: &DischargeParams,
) -> Result<(Vec<u8>, ThirdPartyCaveat, Condition), DischargeError> {
    let caveat_id = params.caveat_id()?;
    let payload = match &params.caveat64 {
        Some(c) => decode_base64(c)?,
        None => caveat_id.clone(),
    };
    let caveat = ThirdPartyCaveat::open(&state.key, &payload)?;
    let condition: Condition = caveat.condition().parse()?;
    Ok((caveat_id, caveat, condition))
}

/// Run the discharge pipeline for one request.
pub async fn discharge(
    state: &AppState,
    headers: &HeaderMap,
    params: &DischargeParams,
) -> Result<Discharged, DischargeError> {
    let (caveat_id, caveat, condition) = decode_caveat(state, params)?;
    Span::current().record("condition", field::display(&condition));
    let origin = resolver::header_str(headers, header::ORIGIN).map(str::to_string);
    let cookie_domain = resolver::cookie(headers, "domain").and_then(domain::cookie_domain);
    let pending = PendingDischarge {
        caveat_id,
        root_key: Zeroizing::new(caveat.root_key().to_vec()),
        domain: domain::resolve_domain(condition.domain(), cookie_domain.as_deref()),
        condition,
        origin,
    };

    let identity = resolver::resolve(
        state,
        headers,
        &pending.condition,
        params.discharge_for_user.as_deref(),
    )
    .await?;

    match identity {
        Some(identity) => {
            evaluator::evaluate(&pending.condition, &identity)?;
            let minted = mint(state, &pending, &identity).await?;
            info!(username = %identity.username, condition = %pending.condition, "Discharged");
            Ok(Discharged::Minted(minted))
        }
        None => {
            let waitid = state.tickets.create(pending.clone());
            debug!(waitid = %waitid, domain = ?pending.domain, "Interaction required");
            Ok(Discharged::Interaction(Box::new(interaction_info(
                state,
                &waitid,
                pending.domain.as_deref(),
            ))))
        }
    }
}

/// Wait for the ticket's login and mint its discharge.
pub async fn complete_wait(
    state: &AppState,
    waitid: &str,
    timeout: Duration,
) -> Result<Minted, DischargeError> {
    async {
        let CompletedLogin { identity, pending } = state.tickets.wait(waitid, timeout).await?;
        evaluator::evaluate(&pending.condition, &identity)?;
        let minted = mint(state, &pending, &identity).await?;
        info!(username = %identity.username, condition = %pending.condition, "Discharged after login");
        Ok(minted)
    }
    .instrument(spans::wait(waitid))
    .await
}

/// Mint a discharge and record the login.
async fn mint(
    state: &AppState,
    pending: &PendingDischarge,
    identity: &Identity,
) -> Result<Minted, DischargeError> {
    let mut minted = minter::mint(
        pending,
        identity,
        &state.location,
        &state.root_key,
        state.timing.discharge_expiry(),
        state.timing.session_expiry(),
    );
    // The admin is never stored, so a session naming it would be useless.
    if identity.provider_id == resolver::ADMIN_PROVIDER_ID {
        minted.session = None;
    } else if pending.condition.is_login() {
        state
            .store
            .touch_last_discharge(&identity.provider_id, Utc::now())
            .await
            .inspect_err(|e| {
                warn!(provider_id = %identity.provider_id, error = %e, "Failed to record discharge time");
            })?;
    }
    Ok(minted)
}

/// Build the visit and wait URLs for a ticket.
pub fn interaction_info(state: &AppState, waitid: &str, domain: Option<&str>) -> InteractionInfo {
    let visit_url = state.url("/login", waitid, domain);
    let mut interaction_methods = BTreeMap::new();
    interaction_methods.insert(INTERACTIVE_METHOD.to_string(), visit_url.clone());
    for idp in state.providers.iter().filter(|p| !p.interactive()) {
        interaction_methods.insert(
            idp.name().to_string(),
            state.url(&format!("/login/{}", idp.name()), waitid, domain),
        );
    }
    InteractionInfo {
        visit_url,
        wait_url: state.url("/wait", waitid, domain),
        interaction_methods,
    }
}
