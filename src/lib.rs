//! idmd - identity manager and third-party discharger.
//!
//! Relying parties add `is-authenticated-user` and `is-member-of` caveats
//! addressed to this service. idmd opens them, works out who the user is
//! (administrator basic auth, a session cookie, or an interactive login
//! through an identity provider) and mints discharge macaroons.

pub mod config;
pub mod discharge;
pub mod error;
pub mod http;
pub mod idp;
pub mod metrics;
pub mod state;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use error::{DischargeError, DischargeResult};
pub use state::{AppState, SharedState};
