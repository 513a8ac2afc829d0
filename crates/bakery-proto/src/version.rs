//! Bakery protocol version negotiation.

use std::fmt;

/// Header clients use to announce their protocol version.
pub const VERSION_HEADER: &str = "Bakery-Protocol-Version";

/// Protocol version spoken by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum BakeryVersion {
    /// Legacy clients; discharge-required is signalled with 407.
    #[default]
    V0,
    /// Discharge-required is signalled with 401 and `WWW-Authenticate: Macaroon`.
    V1,
    /// Adds binary macaroon ids.
    V2,
    /// Adds sealed third-party caveats with version prefix.
    V3,
}

impl BakeryVersion {
    /// Latest supported version.
    pub const LATEST: Self = Self::V3;

    /// Version announced by a header value. Missing or unparseable values
    /// are treated as legacy clients; versions above the latest are clamped.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.and_then(|v| v.trim().parse::<u32>().ok()) {
            Some(0) | None => Self::V0,
            Some(1) => Self::V1,
            Some(2) => Self::V2,
            Some(_) => Self::V3,
        }
    }

    /// Numeric version.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether the client expects 401 rather than 407 for interaction.
    pub fn uses_www_authenticate(self) -> bool {
        self >= Self::V1
    }
}

impl fmt::Display for BakeryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}
