//! Telemetry utilities for discharge timing and request correlation.

use std::time::Instant;

/// Guard for timing a discharge request and recording metrics.
///
/// Records latency and outcome when dropped. The outcome defaults to
/// `error` until [`DischargeTimer::outcome`] is called.
pub struct DischargeTimer {
    start: Instant,
    outcome: &'static str,
}

impl DischargeTimer {
    /// Start timing a discharge.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            outcome: "error",
        }
    }

    /// Set the outcome label recorded on drop.
    pub fn outcome(&mut self, outcome: &'static str) {
        self.outcome = outcome;
    }
}

impl Default for DischargeTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DischargeTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_discharge(self.outcome, duration);
    }
}

/// Standardized span constructors for discharge observability.
pub mod spans {
    use tracing::{Span, field, info_span};

    /// Create a span for a discharge request. `condition` is recorded once
    /// the caveat has been opened.
    pub fn discharge(version: u8) -> Span {
        info_span!("discharge", version, condition = field::Empty)
    }

    /// Create a span for an identity provider login.
    pub fn login(provider: &str, waitid: Option<&str>) -> Span {
        if let Some(waitid) = waitid {
            info_span!("login", provider = %provider, waitid = %waitid)
        } else {
            info_span!("login", provider = %provider)
        }
    }

    /// Create a span for a wait request.
    pub fn wait(waitid: &str) -> Span {
        info_span!("wait", waitid = %waitid)
    }
}
