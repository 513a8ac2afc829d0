//! Prometheus metrics collection for idmd.
//!
//! - `idm_discharge_total{outcome}` - Discharge requests by outcome
//! - `idm_discharge_duration_seconds` - Discharge latency histogram
//! - `idm_login_total{provider,outcome}` - Identity provider logins
//! - `idm_wait_timeouts_total` - Wait requests that timed out
//! - `idm_pending_tickets` - Interactive logins in flight (gauge)

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Discharge requests by outcome.
pub static DISCHARGE_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Discharge latency.
pub static DISCHARGE_LATENCY: OnceLock<Histogram> = OnceLock::new();

/// Identity provider logins by provider and outcome.
pub static LOGIN_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Wait requests that hit the wait timeout.
pub static WAIT_TIMEOUTS: OnceLock<IntCounter> = OnceLock::new();

/// Tickets currently held in the ticket table.
pub static PENDING_TICKETS: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Call once at startup; later calls are harmless.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                let m = $init.expect(concat!(stringify!($metric), " creation failed"));
                if let Err(e) = r.register(Box::new(m.clone())) {
                    tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                }
                let _ = $metric.set(m);
            }
        };
    }

    register!(DISCHARGE_TOTAL, IntCounterVec::new(Opts::new("idm_discharge_total", "Discharge requests by outcome"), &["outcome"]));
    register!(DISCHARGE_LATENCY, Histogram::with_opts(
        HistogramOpts::new("idm_discharge_duration_seconds", "Discharge request latency")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    ));
    register!(LOGIN_TOTAL, IntCounterVec::new(Opts::new("idm_login_total", "Identity provider logins"), &["provider", "outcome"]));
    register!(WAIT_TIMEOUTS, IntCounter::new("idm_wait_timeouts_total", "Wait requests that timed out"));
    register!(PENDING_TICKETS, IntGauge::new("idm_pending_tickets", "Interactive logins in flight"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record a discharge outcome with latency.
#[inline]
pub fn record_discharge(outcome: &str, duration_secs: f64) {
    if let Some(c) = DISCHARGE_TOTAL.get() {
        c.with_label_values(&[outcome]).inc();
    }
    if let Some(h) = DISCHARGE_LATENCY.get() {
        h.observe(duration_secs);
    }
}

/// Record an identity provider login.
#[inline]
pub fn record_login(provider: &str, outcome: &str) {
    if let Some(c) = LOGIN_TOTAL.get() {
        c.with_label_values(&[provider, outcome]).inc();
    }
}

/// Record a wait timeout.
#[inline]
pub fn record_wait_timeout() {
    if let Some(c) = WAIT_TIMEOUTS.get() {
        c.inc();
    }
}

/// Update the pending ticket gauge.
#[inline]
pub fn set_pending_tickets(count: usize) {
    if let Some(g) = PENDING_TICKETS.get() {
        g.set(count as i64);
    }
}
