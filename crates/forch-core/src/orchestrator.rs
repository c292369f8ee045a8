// ── Orchestrator ──
//
// Owns the event loop: connect to the event socket, restore from varz,
// then dispatch events into the engine until cancelled. A heartbeat task
// runs beside it, applying coalesced topology updates and sampling VLAN
// packet counters. An out-of-sequence stream triggers a fresh restore.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use forch_api::{EventIngestor, MetricSnapshot, VarzClient};

use crate::config::OrchestratorConfig;
use crate::error::CoreError;
use crate::state::StateEngine;

pub struct Orchestrator {
    engine: Arc<StateEngine>,
    varz: VarzClient,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let engine = Arc::new(StateEngine::new(config.engine.clone()));
        Self::with_engine(config, engine)
    }

    /// Drive an existing engine, e.g. one with callbacks already attached.
    pub fn with_engine(config: OrchestratorConfig, engine: Arc<StateEngine>) -> Self {
        let varz = VarzClient::new(config.varz_url.clone())
            .with_retries(config.varz_retries, config.varz_retry_delay);
        Self {
            engine,
            varz,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn engine(&self) -> &Arc<StateEngine> {
        &self.engine
    }

    /// Cancelling this token stops [`run`](Self::run).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Scrape varz and rebuild engine state. Returns the event horizon.
    pub async fn restore(&self) -> Result<u64, CoreError> {
        let targets = self.engine.restore_metrics();
        let snapshot = match self.varz.retry_get_metrics(&targets).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.engine.set_state_restored(false, Some(e.to_string()));
                return Err(e.into());
            }
        };
        let horizon = self.engine.restore_states_from_metrics(&snapshot, Utc::now())?;
        self.engine.set_state_restored(true, None);
        info!(horizon, url = %self.varz.endpoint(), "restored state from varz");
        Ok(horizon)
    }

    /// Connect, restore and process events until cancelled or the event
    /// channel is lost.
    pub async fn run(&self) -> Result<(), CoreError> {
        let mut ingestor = EventIngestor::new(self.config.ingest.clone());
        ingestor.connect().await?;
        let horizon = self.restore().await?;
        ingestor.set_event_horizon(horizon);

        let heartbeat_cancel = self.cancel.child_token();
        let heartbeat = tokio::spawn(heartbeat_task(
            Arc::clone(&self.engine),
            self.varz.clone(),
            self.config.engine.vlan_metric.clone(),
            self.config.heartbeat_interval,
            heartbeat_cancel.clone(),
        ));

        let result = self.event_loop(&mut ingestor).await;

        heartbeat_cancel.cancel();
        if let Err(e) = heartbeat.await {
            warn!(error = %e, "heartbeat task ended abnormally");
        }
        ingestor.disconnect();
        result
    }

    async fn event_loop(&self, ingestor: &mut EventIngestor) -> Result<(), CoreError> {
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    info!("orchestrator shutting down");
                    return Ok(());
                }
                next = ingestor.next_event(true) => next,
            };

            match next {
                Ok(Some(event)) => self.engine.dispatch(&event),
                Ok(None) => {}
                Err(e) if e.is_out_of_sequence() => {
                    warn!(error = %e, "event stream out of sequence, restoring state");
                    let horizon = self.restore().await?;
                    ingestor.set_event_horizon(horizon);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

const MIN_HEARTBEAT: Duration = Duration::from_millis(100);

async fn heartbeat_task(
    engine: Arc<StateEngine>,
    varz: VarzClient,
    vlan_metric: String,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period.max(MIN_HEARTBEAT));
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if engine.heartbeat_update(Utc::now()) {
                    debug!("heartbeat applied topology update");
                }
                match varz.get_metrics(&[vlan_metric.as_str()]).await {
                    Ok(snapshot) => {
                        sample_vlans(&engine, &snapshot, &vlan_metric);
                    }
                    Err(e) => warn!(error = %e, "vlan packet count sampling failed"),
                }
            }
        }
    }
}

/// Feed one periodic VLAN counter read into the engine. Returns whether the
/// metric was present.
fn sample_vlans(engine: &StateEngine, snapshot: &MetricSnapshot, metric: &str) -> bool {
    let Some(samples) = snapshot.get(metric) else {
        warn!(%metric, "vlan packet count metric missing");
        return false;
    };
    engine.process_vlan_metrics(Utc::now(), samples);
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use forch_api::Sample;

    use super::*;
    use crate::config::EngineConfig;

    fn engine() -> StateEngine {
        let engine = StateEngine::new(EngineConfig::default());
        engine.set_state_restored(true, None);
        engine
    }

    #[test]
    fn missing_vlan_metric_is_skipped() {
        let engine = engine();
        assert!(!sample_vlans(&engine, &MetricSnapshot::new(), "vlan_packet_count"));
        assert!(engine.dataplane_state().into_ready().unwrap().vlans.is_empty());
    }

    #[test]
    fn vlan_metric_reaches_engine() {
        let engine = engine();
        let mut snapshot = MetricSnapshot::new();
        snapshot.push("vlan_packet_count", Sample::new([("vlan", "100")], 10.0));
        assert!(sample_vlans(&engine, &snapshot, "vlan_packet_count"));
        let vlans = engine.dataplane_state().into_ready().unwrap().vlans;
        assert!(vlans.contains_key(&100));
    }
}
