//! Error types for the bakery protocol library.
//!
//! Condition errors carry the exact wording that relying parties see in
//! discharge denials, so their `Display` output is part of the protocol.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Top-level protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Base64 decoding failed.
    #[error("cannot decode base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// JSON encoding or decoding failed.
    #[error("cannot unmarshal macaroon: {0}")]
    Json(#[from] serde_json::Error),

    /// A key had the wrong length.
    #[error("wrong key length {actual} (want {expected})")]
    KeyLength {
        /// Length of the rejected key.
        actual: usize,
        /// Required length.
        expected: usize,
    },

    /// Third-party caveat ID is too short or has an unknown layout.
    #[error("caveat id too short")]
    CaveatTooShort,

    /// Unsupported third-party caveat version.
    #[error("caveat has unsupported version {0}")]
    UnsupportedVersion(u8),

    /// The caveat was sealed for another public key.
    #[error("public key mismatch")]
    PublicKeyMismatch,

    /// Authenticated decryption failed.
    #[error("cannot decrypt caveat id")]
    Decrypt,

    /// Authenticated encryption failed.
    #[error("cannot encrypt caveat id")]
    Encrypt,

    /// The caveat condition is not valid UTF-8.
    #[error("caveat condition is not valid UTF-8")]
    ConditionEncoding,
}

/// Errors produced when parsing a caveat condition.
///
/// The `Display` strings are stable: they are forwarded verbatim to the
/// relying party as the reason a discharge was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// The verb is unknown or the arguments do not fit it.
    #[error("caveat not recognized")]
    NotRecognized,

    /// The condition could not be tokenised at all.
    #[error("cannot parse caveat {condition:?}: {reason}")]
    Parse {
        /// The raw condition text.
        condition: String,
        /// Why tokenising failed.
        reason: &'static str,
    },

    /// A `@domain` token failed domain validation.
    #[error("invalid domain {0:?}")]
    InvalidDomain(String),
}

/// Errors produced while verifying a macaroon and its discharges.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum VerificationError {
    /// The final signature did not match.
    #[error("signature mismatch after caveat verification")]
    SignatureMismatch,

    /// A first-party caveat was not satisfied.
    #[error("caveat {condition:?} not satisfied: {reason}")]
    CaveatNotSatisfied {
        /// The caveat condition.
        condition: String,
        /// Why the checker rejected it.
        reason: String,
    },

    /// No discharge was supplied for a third-party caveat.
    #[error("cannot find discharge macaroon for caveat {0:?}")]
    DischargeNotFound(String),

    /// A discharge was used for more than one caveat.
    #[error("discharge macaroon {0:?} was used more than once")]
    DischargeUsedTwice(String),

    /// A discharge was supplied but no caveat referenced it.
    #[error("discharge macaroon {0:?} was not used")]
    DischargeNotUsed(String),

    /// The verification ID could not be opened with the current signature.
    #[error("cannot decrypt third party caveat verification id")]
    VerificationId,
}
