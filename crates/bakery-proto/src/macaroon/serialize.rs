//! JSON encoding of macaroons and macaroon slices.
//!
//! Field names follow the compact bakery JSON form: `l` location, `i` or
//! `i64` identifier (UTF-8 or base64url), `c` caveats, `s64` signature.
//! Caveats use `i`/`i64`, `v64` and `l`.

use base64::{Engine as _, engine::general_purpose::STANDARD, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{Caveat, Macaroon};
use crate::crypto::KEY_LEN;
use crate::error::ProtocolError;

#[derive(Serialize, Deserialize)]
struct CaveatJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    i: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    i64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    v64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    l: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct MacaroonJson {
    #[serde(default)]
    c: Vec<CaveatJson>,
    #[serde(default)]
    l: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    i: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    i64: Option<String>,
    s64: String,
}

/// Split bytes into the `i` (text) or `i64` (binary) field.
fn id_fields(id: &[u8]) -> (Option<String>, Option<String>) {
    match std::str::from_utf8(id) {
        Ok(s) => (Some(s.to_string()), None),
        Err(_) => (None, Some(URL_SAFE_NO_PAD.encode(id))),
    }
}

fn id_from_fields(i: Option<String>, i64: Option<String>) -> Result<Vec<u8>, ProtocolError> {
    match (i, i64) {
        (_, Some(b64)) => decode_base64(&b64),
        (Some(text), None) => Ok(text.into_bytes()),
        (None, None) => Ok(Vec::new()),
    }
}

/// Decode base64 in any of the padded, unpadded, URL-safe or standard forms.
pub fn decode_base64(s: &str) -> Result<Vec<u8>, ProtocolError> {
    let trimmed = s.trim_end_matches('=');
    if trimmed.contains(['+', '/']) {
        let engine = base64::engine::GeneralPurpose::new(
            &base64::alphabet::STANDARD,
            base64::engine::general_purpose::NO_PAD,
        );
        Ok(engine.decode(trimmed)?)
    } else {
        Ok(URL_SAFE_NO_PAD.decode(trimmed)?)
    }
}

impl From<&Macaroon> for MacaroonJson {
    fn from(m: &Macaroon) -> Self {
        let (i, i64) = id_fields(&m.id);
        Self {
            c: m
                .caveats
                .iter()
                .map(|cav| {
                    let (i, i64) = id_fields(&cav.id);
                    CaveatJson {
                        i,
                        i64,
                        v64: cav.verification_id.as_ref().map(|v| URL_SAFE_NO_PAD.encode(v)),
                        l: cav.location.clone(),
                    }
                })
                .collect(),
            l: m.location.clone(),
            i,
            i64,
            s64: URL_SAFE_NO_PAD.encode(m.signature),
        }
    }
}

impl TryFrom<MacaroonJson> for Macaroon {
    type Error = ProtocolError;

    fn try_from(j: MacaroonJson) -> Result<Self, Self::Error> {
        let sig = decode_base64(&j.s64)?;
        let signature: [u8; KEY_LEN] =
            sig.as_slice()
                .try_into()
                .map_err(|_| ProtocolError::KeyLength {
                    actual: sig.len(),
                    expected: KEY_LEN,
                })?;
        let caveats = j
            .c
            .into_iter()
            .map(|c| {
                Ok(Caveat {
                    id: id_from_fields(c.i, c.i64)?,
                    verification_id: c.v64.as_deref().map(decode_base64).transpose()?,
                    location: c.l,
                })
            })
            .collect::<Result<Vec<_>, ProtocolError>>()?;
        Ok(Macaroon::from_parts(
            j.l,
            id_from_fields(j.i, j.i64)?,
            caveats,
            signature,
        ))
    }
}

impl Serialize for Macaroon {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        MacaroonJson::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Macaroon {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let j = MacaroonJson::deserialize(deserializer)?;
        Macaroon::try_from(j).map_err(serde::de::Error::custom)
    }
}

/// Encode a macaroon slice as standard base64 of its JSON array.
///
/// This is the value format of `macaroon-*` cookies.
pub fn encode_slice(ms: &[Macaroon]) -> Result<String, ProtocolError> {
    Ok(STANDARD.encode(serde_json::to_vec(ms)?))
}

/// Decode a value produced by [`encode_slice`].
pub fn decode_slice(value: &str) -> Result<Vec<Macaroon>, ProtocolError> {
    let data = STANDARD.decode(value.trim())?;
    Ok(serde_json::from_slice(&data)?)
}
