//! First-party caveats understood by relying parties and the discharger.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::ConditionError;
use crate::macaroon::Macaroon;

const TIME_BEFORE: &str = "time-before";
const DECLARED: &str = "declared";
const ORIGIN: &str = "origin";
const OP: &str = "op";

/// A parsed first-party caveat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirstPartyCheck {
    /// The macaroon expires at the given instant.
    TimeBefore(DateTime<Utc>),
    /// An attribute asserted by the minter, e.g. `declared username bob`.
    Declared {
        /// Attribute name.
        key: String,
        /// Attribute value; may contain spaces.
        value: String,
    },
    /// Requests must come from this HTTP origin (empty means no Origin header).
    Origin(String),
    /// The macaroon authorizes only these operations.
    Op(Vec<String>),
}

impl FirstPartyCheck {
    /// Parse a first-party condition.
    pub fn parse(condition: &str) -> Result<Self, ConditionError> {
        let (verb, arg) = match condition.split_once(' ') {
            Some((verb, arg)) => (verb, arg),
            None => (condition, ""),
        };
        let parse_err = |reason| ConditionError::Parse {
            condition: condition.to_string(),
            reason,
        };
        match verb {
            TIME_BEFORE => DateTime::parse_from_rfc3339(arg)
                .map(|t| Self::TimeBefore(t.with_timezone(&Utc)))
                .map_err(|_| parse_err("invalid expiry time")),
            DECLARED => {
                let (key, value) = arg
                    .split_once(' ')
                    .ok_or_else(|| parse_err("declared caveat has no value"))?;
                Ok(Self::Declared {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
            ORIGIN => Ok(Self::Origin(arg.to_string())),
            OP => {
                let ops: Vec<String> = arg.split_whitespace().map(String::from).collect();
                if ops.is_empty() {
                    return Err(parse_err("no operations"));
                }
                Ok(Self::Op(ops))
            }
            _ => Err(ConditionError::NotRecognized),
        }
    }

    /// `time-before <t>`
    pub fn time_before(t: DateTime<Utc>) -> Self {
        Self::TimeBefore(t)
    }

    /// `declared <key> <value>`
    pub fn declared(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Declared {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Check against the request context.
    ///
    /// Declared caveats always pass here; their values are collected by
    /// [`infer_declared`].
    pub fn check(&self, ctx: &CheckContext<'_>) -> Result<(), String> {
        match self {
            Self::TimeBefore(t) if ctx.now < *t => Ok(()),
            Self::TimeBefore(_) => Err("macaroon has expired".into()),
            Self::Declared { .. } => Ok(()),
            Self::Origin(want) => {
                let got = ctx.origin.unwrap_or("");
                if got == want {
                    Ok(())
                } else {
                    Err(format!("request has invalid Origin header; got {got:?}"))
                }
            }
            Self::Op(ops) => match ctx.op {
                Some(op) if ops.iter().any(|o| o == op) => Ok(()),
                Some(op) => Err(format!("{op} not allowed")),
                None => Err("no operation in context".into()),
            },
        }
    }
}

impl fmt::Display for FirstPartyCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeBefore(t) => write!(
                f,
                "{TIME_BEFORE} {}",
                t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
            ),
            Self::Declared { key, value } => write!(f, "{DECLARED} {key} {value}"),
            Self::Origin(o) => write!(f, "{ORIGIN} {o}"),
            Self::Op(ops) => write!(f, "{OP} {}", ops.join(" ")),
        }
    }
}

/// Request attributes first-party caveats are checked against.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    /// Current time.
    pub now: DateTime<Utc>,
    /// Value of the request's Origin header.
    pub origin: Option<&'a str>,
    /// Operation being authorized.
    pub op: Option<&'a str>,
}

impl CheckContext<'_> {
    /// Parse and check a single condition.
    pub fn check(&self, condition: &str) -> Result<(), String> {
        FirstPartyCheck::parse(condition)
            .map_err(|e| e.to_string())?
            .check(self)
    }
}

/// Collect `declared` attributes from a macaroon's first-party caveats.
///
/// A key declared twice with different values is dropped.
pub fn infer_declared(m: &Macaroon) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let mut conflicts = Vec::new();
    for condition in m.caveats().iter().filter_map(|c| c.condition()) {
        if let Ok(FirstPartyCheck::Declared { key, value }) = FirstPartyCheck::parse(condition) {
            match out.get(&key) {
                Some(existing) if existing != &value => conflicts.push(key),
                Some(_) => {}
                None => {
                    out.insert(key, value);
                }
            }
        }
    }
    for key in conflicts {
        out.remove(&key);
    }
    out
}
