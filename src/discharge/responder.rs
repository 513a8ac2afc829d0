//! HTTP rendering of discharge outcomes.
//!
//! The status of an interaction-required response depends on the client's
//! `Bakery-Protocol-Version`: legacy clients get 407, newer ones 401 with
//! `WWW-Authenticate: Macaroon`.

use std::time::Duration;

use axum::Json;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use bakery_proto::{BakeryVersion, Macaroon, encode_slice, version::VERSION_HEADER};
use serde::Serialize;
use tracing::{Instrument, debug, error, warn};

use super::resolver::SESSION_COOKIE;
use super::{DischargeParams, Discharged, Minted};
use crate::error::DischargeError;
use crate::state::AppState;
use crate::telemetry::{DischargeTimer, spans};

/// Prefix for discharge failures other than refusals and interaction.
pub const DISCHARGE_FAILURE_PREFIX: &str = "cannot discharge: ";

/// `{Macaroon, DischargeToken?}`. The token is the identity session and is
/// present only for login ops.
#[derive(Serialize)]
struct DischargeBody<'a> {
    #[serde(rename = "Macaroon")]
    macaroon: &'a Macaroon,
    #[serde(rename = "DischargeToken", skip_serializing_if = "Option::is_none")]
    discharge_token: Option<[&'a Macaroon; 1]>,
}

/// Render minted macaroons, setting the session cookie alongside the
/// discharge token.
fn minted_response(state: &AppState, minted: &Minted) -> Response {
    let mut response = Json(DischargeBody {
        macaroon: &minted.discharge,
        discharge_token: minted.session.as_ref().map(|s| [s]),
    })
    .into_response();
    if let Some(session) = &minted.session {
        set_session_cookie(state, &mut response, session);
    }
    response
}

/// Protocol version declared by the request.
pub fn version(headers: &HeaderMap) -> BakeryVersion {
    BakeryVersion::from_header(headers.get(VERSION_HEADER).and_then(|v| v.to_str().ok()))
}

/// Handle `/discharge`.
pub async fn discharge(state: &AppState, headers: &HeaderMap, params: &DischargeParams) -> Response {
    let version = version(headers);
    let mut timer = DischargeTimer::new();
    let result = super::discharge(state, headers, params)
        .instrument(spans::discharge(version.as_u8()))
        .await;
    match result {
        Ok(Discharged::Minted(minted)) => {
            timer.outcome("ok");
            minted_response(state, &minted)
        }
        Ok(Discharged::Interaction(info)) => {
            timer.outcome("interaction_required");
            DischargeError::InteractionRequired(info).to_response(version, None)
        }
        Err(e) => {
            timer.outcome(e.error_code());
            discharge_error(e, version)
        }
    }
}

/// Render a `/discharge` failure.
pub fn discharge_error(e: DischargeError, version: BakeryVersion) -> Response {
    if e.is_discharge_failure() {
        warn!(error = %e, code = e.error_code(), "Discharge failed");
        e.to_response(version, Some(DISCHARGE_FAILURE_PREFIX))
    } else {
        debug!(error = %e, "Discharge not granted");
        e.to_response(version, None)
    }
}

/// Handle `/wait`.
pub async fn wait(state: &AppState, headers: &HeaderMap, waitid: &str, timeout: Duration) -> Response {
    let version = version(headers);
    let result = super::complete_wait(state, waitid, timeout).await;
    wait_response(state, result, version)
}

/// Render a completed wait: the discharge, the session as a discharge
/// token, and the session cookie.
pub fn wait_response(
    state: &AppState,
    result: Result<Minted, DischargeError>,
    version: BakeryVersion,
) -> Response {
    match result {
        Ok(minted) => minted_response(state, &minted),
        Err(e) => {
            debug!(error = %e, "Wait failed");
            e.to_response(version, None)
        }
    }
}

fn set_session_cookie(state: &AppState, response: &mut Response, session: &Macaroon) {
    let value = match encode_slice(std::slice::from_ref(session)) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "Failed to encode session cookie");
            return;
        }
    };
    let cookie = format!(
        "{SESSION_COOKIE}={value}; Path=/; HttpOnly; Max-Age={}",
        state.timing.session_expiry
    );
    match HeaderValue::from_str(&cookie) {
        Ok(v) => {
            response.headers_mut().append(header::SET_COOKIE, v);
        }
        Err(e) => error!(error = %e, "Invalid session cookie header"),
    }
}
