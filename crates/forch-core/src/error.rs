// ── Core error types ──
//
// Domain errors from forch-core. Query methods never return these to
// their callers directly: the restore guard turns them into broken
// summaries. They do propagate out of restore and the orchestrator loop.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Restore errors ───────────────────────────────────────────────
    #[error("Missing required metric: {metric}")]
    MissingMetric { metric: String },

    #[error("Invalid sample for {metric}: {reason}")]
    InvalidSample { metric: String, reason: String },

    #[error("State not restored: {detail}")]
    NotRestored { detail: String },

    // ── Lookup errors ────────────────────────────────────────────────
    #[error("Switch not found: {name}")]
    SwitchNotFound { name: String },

    #[error("MAC address not learned: {mac}")]
    HostNotFound { mac: String },

    // ── Consistency errors ───────────────────────────────────────────
    #[error("Consistency violation: {message}")]
    Consistency { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Transport errors ─────────────────────────────────────────────
    #[error(transparent)]
    Api(#[from] forch_api::Error),

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn invalid_sample(metric: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSample {
            metric: metric.to_owned(),
            reason: reason.into(),
        }
    }

    /// The event stream skipped events; state must be restored again.
    pub fn needs_restore(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_out_of_sequence())
    }
}
