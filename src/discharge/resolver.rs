//! Identity resolution for discharge requests.
//!
//! Basic auth as the administrator beats a session cookie, which beats
//! nothing at all. Finding no credentials is not an error: the caller
//! starts an interactive login instead.

use axum::http::{HeaderMap, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bakery_proto::{CheckContext, Condition, Macaroon, decode_slice, infer_declared};
use chrono::Utc;
use tracing::debug;

use super::minter::{LOGIN_OP, PROVIDER_ID_ATTR};
use crate::error::DischargeError;
use crate::state::AppState;
use crate::store::{Identity, IdentityKey};

/// Cookie holding the identity session macaroon slice.
pub const SESSION_COOKIE: &str = "macaroon-identity";

/// Username of the built-in administrator identity.
pub const ADMIN_USERNAME: &str = "admin@idm";

/// Provider ID of the built-in administrator identity. Never stored.
pub const ADMIN_PROVIDER_ID: &str = "idm:admin";

/// Credentials carried by a request, in precedence order.
#[derive(Debug)]
pub enum Credentials {
    Basic { username: String, password: String },
    Session(Vec<Macaroon>),
    None,
}

impl Credentials {
    /// Extract credentials from request headers. An undecodable cookie is
    /// treated as absent.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        if let Some((username, password)) = basic_auth(headers) {
            return Self::Basic { username, password };
        }
        match cookie(headers, SESSION_COOKIE).map(decode_slice) {
            Some(Ok(ms)) if !ms.is_empty() => Self::Session(ms),
            Some(Err(e)) => {
                debug!(error = %e, "Ignoring undecodable session cookie");
                Self::None
            }
            _ => Self::None,
        }
    }
}

/// The built-in administrator identity.
pub fn admin_identity() -> Identity {
    Identity {
        provider_id: ADMIN_PROVIDER_ID.to_string(),
        username: ADMIN_USERNAME.to_string(),
        ..Default::default()
    }
}

/// Resolve the identity a discharge request acts as.
///
/// `discharge_for_user` only applies to administrator requests; the named
/// user must exist and lie in the condition's domain.
pub async fn resolve(
    state: &AppState,
    headers: &HeaderMap,
    condition: &Condition,
    discharge_for_user: Option<&str>,
) -> Result<Option<Identity>, DischargeError> {
    match Credentials::from_headers(headers) {
        Credentials::Basic { username, password } => {
            if !state.admin.verify(&username, &password) {
                return Err(DischargeError::InvalidCredentials);
            }
            match discharge_for_user {
                Some(target) if !target.is_empty() => {
                    for_user(state, target, condition.domain()).await.map(Some)
                }
                _ => Ok(Some(admin_identity())),
            }
        }
        Credentials::Session(ms) => {
            let origin = header_str(headers, header::ORIGIN);
            session_identity(state, &ms, origin, condition.domain()).await
        }
        Credentials::None => Ok(None),
    }
}

async fn for_user(
    state: &AppState,
    username: &str,
    domain: Option<&str>,
) -> Result<Identity, DischargeError> {
    let identity = state
        .store
        .identity(IdentityKey::Username(username))
        .await?
        .ok_or_else(|| DischargeError::UserNotFound {
            username: username.to_string(),
        })?;
    if let Some(domain) = domain
        && identity.domain() != Some(domain)
    {
        return Err(DischargeError::UserNotInDomain {
            username: username.to_string(),
            domain: domain.to_string(),
        });
    }
    Ok(identity)
}

/// Verify a session macaroon slice and fetch its identity from the store.
///
/// Invalid or expired sessions resolve to nothing, as do sessions for users
/// outside `domain`: the client gets a chance to log in again.
async fn session_identity(
    state: &AppState,
    ms: &[Macaroon],
    origin: Option<&str>,
    domain: Option<&str>,
) -> Result<Option<Identity>, DischargeError> {
    let Some((primary, discharges)) = ms.split_first() else {
        return Ok(None);
    };
    let ctx = CheckContext {
        now: Utc::now(),
        origin,
        op: Some(LOGIN_OP),
    };
    if let Err(e) = primary.verify(&state.root_key, |c| ctx.check(c), discharges) {
        debug!(error = %e, "Ignoring invalid session cookie");
        return Ok(None);
    }
    let declared = infer_declared(primary);
    let Some(provider_id) = declared.get(PROVIDER_ID_ATTR) else {
        debug!("Session cookie declares no provider ID");
        return Ok(None);
    };
    let Some(identity) = state
        .store
        .identity(IdentityKey::ProviderId(provider_id))
        .await?
    else {
        debug!(provider_id = %provider_id, "Session identity no longer stored");
        return Ok(None);
    };
    if let Some(domain) = domain
        && identity.domain() != Some(domain)
    {
        debug!(username = %identity.username, domain = %domain, "Session user outside domain");
        return Ok(None);
    }
    Ok(Some(identity))
}

/// Decode `Authorization: Basic` credentials.
fn basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = header_str(headers, header::AUTHORIZATION)?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

pub(crate) fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// First value of the named cookie across all `Cookie` headers.
pub(crate) fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"'))
}
