//! Unified error handling for idmd.
//!
//! [`DischargeError`] covers every way a discharge, wait or login request
//! can fail. Its `Display` strings cross the HTTP boundary unchanged and
//! relying parties match on them, so treat them as part of the protocol.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bakery_proto::{BakeryVersion, ConditionError, ProtocolError};
use serde::Serialize;
use thiserror::Error;

use crate::discharge::InteractionInfo;
use crate::store::StoreError;

/// Errors that can occur while discharging a caveat.
#[derive(Debug, Error)]
pub enum DischargeError {
    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error("cannot decode caveat: {0}")]
    Caveat(#[from] ProtocolError),

    #[error("missing {0}")]
    MissingParameter(&'static str),

    /// Malformed request body; the message is sent as is.
    #[error("{0}")]
    BadRequest(String),

    #[error("could not determine identity: invalid credentials")]
    InvalidCredentials,

    #[error("invalid username {username:?}: user {username} not found")]
    UserNotFound { username: String },

    #[error("invalid username {username:?}: {username:?} not in required domain {domain:?}")]
    UserNotInDomain { username: String, domain: String },

    #[error("third party refused discharge: {0}")]
    Refused(String),

    #[error("macaroon discharge required: authentication required")]
    InteractionRequired(Box<InteractionInfo>),

    #[error("discharge timed out")]
    Timeout,

    #[error("invalid waitid {0:?}")]
    InvalidWaitId(String),

    #[error("discharge token already used")]
    AlreadyUsed,

    /// Login failure reported by an identity provider; forwarded verbatim.
    #[error("{0}")]
    LoginFailed(String),

    #[error("identity provider {0:?} not found")]
    UnknownProvider(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// JSON error body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorBody<'a> {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<&'a InteractionInfo>,
}

impl DischargeError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Condition(ConditionError::InvalidDomain(_)) => "invalid_domain",
            Self::Condition(_) => "caveat_not_recognized",
            Self::Caveat(_) => "bad_caveat",
            Self::MissingParameter(_) => "missing_parameter",
            Self::BadRequest(_) => "bad_request",
            Self::InvalidCredentials => "invalid_credentials",
            Self::UserNotFound { .. } => "user_not_found",
            Self::UserNotInDomain { .. } => "user_not_in_domain",
            Self::Refused(_) => "refused",
            Self::InteractionRequired(_) => "interaction_required",
            Self::Timeout => "timeout",
            Self::InvalidWaitId(_) => "invalid_waitid",
            Self::AlreadyUsed => "already_used",
            Self::LoginFailed(_) => "login_failed",
            Self::UnknownProvider(_) => "unknown_provider",
            Self::Store(_) => "store_error",
        }
    }

    /// Error code carried in the JSON body.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::InteractionRequired(_) => "interaction required",
            Self::Refused(_) | Self::InvalidCredentials | Self::LoginFailed(_) => "forbidden",
            Self::UserNotFound { .. } | Self::UserNotInDomain { .. } => "forbidden",
            Self::Timeout => "timeout",
            Self::InvalidWaitId(_) | Self::UnknownProvider(_) => "not found",
            Self::AlreadyUsed => "conflict",
            Self::Store(_) => "internal error",
            _ => "bad request",
        }
    }

    /// HTTP status for a client speaking `version`.
    pub fn status(&self, version: BakeryVersion) -> StatusCode {
        match self {
            Self::InteractionRequired(_) if version.uses_www_authenticate() => {
                StatusCode::UNAUTHORIZED
            }
            Self::InteractionRequired(_) => StatusCode::PROXY_AUTHENTICATION_REQUIRED,
            Self::Refused(_)
            | Self::InvalidCredentials
            | Self::UserNotFound { .. }
            | Self::UserNotInDomain { .. }
            | Self::LoginFailed(_) => StatusCode::FORBIDDEN,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::InvalidWaitId(_) | Self::UnknownProvider(_) => StatusCode::NOT_FOUND,
            Self::AlreadyUsed => StatusCode::CONFLICT,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Condition(_)
            | Self::Caveat(_)
            | Self::MissingParameter(_)
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Whether `/discharge` reports this error with the `cannot discharge: `
    /// prefix. Interaction and refusals keep their own wording.
    pub fn is_discharge_failure(&self) -> bool {
        !matches!(self, Self::InteractionRequired(_) | Self::Refused(_))
    }

    /// Render for a client speaking `version`, with an optional message prefix.
    pub fn to_response(&self, version: BakeryVersion, prefix: Option<&str>) -> Response {
        let message = match prefix {
            Some(p) => format!("{p}{self}"),
            None => self.to_string(),
        };
        let info = match self {
            Self::InteractionRequired(info) => Some(info.as_ref()),
            _ => None,
        };
        let body = ErrorBody {
            code: self.wire_code(),
            message,
            info,
        };
        let mut response = (self.status(version), Json(body)).into_response();
        if matches!(self, Self::InteractionRequired(_)) && version.uses_www_authenticate() {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Macaroon"));
        }
        response
    }
}

impl IntoResponse for DischargeError {
    fn into_response(self) -> Response {
        self.to_response(BakeryVersion::default(), None)
    }
}

/// Result type for discharge handlers.
pub type DischargeResult<T> = Result<T, DischargeError>;
