//! Identity caveat conditions.
//!
//! Grammar:
//!
//! ```text
//! condition := verb (SP arg)*
//! verb      := "is-authenticated-user" | "is-member-of"
//! arg       := group | "@" domain
//! ```
//!
//! `is-authenticated-user` takes at most a domain. `is-member-of` takes one
//! or more group names optionally followed by a domain. Anything else is a
//! parse failure; nothing is silently ignored.

mod parse;

use std::fmt;
use std::str::FromStr;

use crate::error::ConditionError;

/// Verb requiring an authenticated user.
pub const IS_AUTHENTICATED_USER: &str = "is-authenticated-user";

/// Verb requiring membership of at least one group.
pub const IS_MEMBER_OF: &str = "is-member-of";

/// A parsed identity condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The requester must be an authenticated user, optionally in a domain.
    IsAuthenticatedUser {
        /// Required user domain.
        domain: Option<String>,
    },
    /// The requester must belong to at least one of the groups.
    IsMemberOf {
        /// Acceptable groups; never empty.
        groups: Vec<String>,
        /// Required user domain.
        domain: Option<String>,
    },
}

impl Condition {
    /// Required domain, if the condition carries one.
    pub fn domain(&self) -> Option<&str> {
        match self {
            Self::IsAuthenticatedUser { domain } | Self::IsMemberOf { domain, .. } => {
                domain.as_deref()
            }
        }
    }

    /// Required groups; empty for `is-authenticated-user`.
    pub fn groups(&self) -> &[String] {
        match self {
            Self::IsAuthenticatedUser { .. } => &[],
            Self::IsMemberOf { groups, .. } => groups,
        }
    }

    /// Whether this is the generic login condition.
    pub fn is_login(&self) -> bool {
        matches!(self, Self::IsAuthenticatedUser { .. })
    }

    /// The verb this condition was parsed from.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::IsAuthenticatedUser { .. } => IS_AUTHENTICATED_USER,
            Self::IsMemberOf { .. } => IS_MEMBER_OF,
        }
    }
}

impl FromStr for Condition {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse::parse_condition(s)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())?;
        for group in self.groups() {
            write!(f, " {}", group)?;
        }
        if let Some(domain) = self.domain() {
            write!(f, " @{}", domain)?;
        }
        Ok(())
    }
}

/// Check a user domain: `[A-Za-z0-9_.-]+` with no trailing hyphen.
pub fn is_valid_domain(domain: &str) -> bool {
    !domain.is_empty()
        && !domain.ends_with('-')
        && domain
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}
