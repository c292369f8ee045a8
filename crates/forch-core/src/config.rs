// ── Runtime configuration ──
//
// These types describe how the engine and orchestrator behave. They never
// touch disk: the CLI builds them from forch-config and hands them in.

use std::time::Duration;

use forch_api::IngestConfig;
use url::Url;

/// Default name of the per-VLAN packet counter metric.
pub const DEFAULT_VLAN_METRIC: &str = "vlan_packet_count";

/// Tuning for the [`StateEngine`](crate::StateEngine).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Minimum gap since the last applied topology change before a pending
    /// update is applied. The forced-apply ceiling is twice this.
    pub coalesce_window: Duration,
    /// Packets per second above which a VLAN counts as flooding.
    /// `None` disables the check.
    pub vlan_packet_rate_threshold: Option<f64>,
    /// Metric carrying per-VLAN packet counts.
    pub vlan_metric: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            coalesce_window: Duration::from_secs(2),
            vlan_packet_rate_threshold: None,
            vlan_metric: DEFAULT_VLAN_METRIC.to_owned(),
        }
    }
}

/// Everything the [`Orchestrator`](crate::Orchestrator) needs to run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub ingest: IngestConfig,
    pub varz_url: Url,
    pub varz_retries: u32,
    pub varz_retry_delay: Duration,
    /// Period of the topology heartbeat and VLAN sampling.
    pub heartbeat_interval: Duration,
    pub engine: EngineConfig,
}
