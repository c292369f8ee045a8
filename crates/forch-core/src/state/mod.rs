// ── State engine ──
//
// Thread-safe facade over the `StateGraph`. One coarse mutex guards the
// graph; handlers run under it and queue notifications, which are
// delivered to registered callbacks after the lock is released. Every
// query goes through `guarded_query`, which refuses to answer before a
// restore and turns errors and panics into broken replies.

mod callbacks;
mod graph;
mod health;
mod path;
mod restore;
mod topology;
mod views;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use forch_api::{FaucetEvent, MetricSnapshot, Sample};

use crate::attributes::DpsConfig;
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::model::{
    self, AuthResult, DataplaneState, HostPathReply, HostsReply, LacpRole, LacpState, MacAddress,
    PathReply, Reply, Summary, SwitchesState, TopologySnapshot,
};

pub use callbacks::{DevicePlacement, DeviceStateReporter, PlacementCallback};
pub use graph::StateGraph;
pub use path::{LOOP_DETAIL, ROOT_ABSENT_DETAIL};

use callbacks::Callbacks;
use graph::{NOT_RESTORED, RestoreStatus};
use restore::RestoreEntry;

pub struct StateEngine {
    graph: Mutex<StateGraph>,
    restore_table: Vec<RestoreEntry>,
    callbacks: RwLock<Callbacks>,
}

impl std::fmt::Debug for StateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateEngine")
            .field("restore_table", &self.restore_table)
            .finish_non_exhaustive()
    }
}

impl Default for StateEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl StateEngine {
    pub fn new(config: EngineConfig) -> Self {
        let restore_table = restore::restore_table(&config);
        Self {
            graph: Mutex::new(StateGraph::new(config)),
            restore_table,
            callbacks: RwLock::new(Callbacks::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StateGraph> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the lock, then deliver whatever it queued.
    fn mutate<R>(&self, f: impl FnOnce(&mut StateGraph) -> R) -> R {
        let (result, notifications) = {
            let mut graph = self.lock();
            let result = f(&mut graph);
            (result, graph.take_notifications())
        };
        if !notifications.is_empty() {
            let callbacks = self
                .callbacks
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            callbacks.deliver(notifications);
        }
        result
    }

    // ── Callbacks ───────────────────────────────────────────────────

    pub fn set_placement_callback(
        &self,
        callback: impl Fn(Option<&MacAddress>, &DevicePlacement) + Send + Sync + 'static,
    ) {
        let mut callbacks = self.callbacks.write().unwrap_or_else(PoisonError::into_inner);
        callbacks.placement = Some(Arc::new(callback));
    }

    pub fn set_device_state_reporter(&self, reporter: Arc<dyn DeviceStateReporter>) {
        let mut callbacks = self.callbacks.write().unwrap_or_else(PoisonError::into_inner);
        callbacks.reporter = Some(reporter);
    }

    // ── Event dispatch ──────────────────────────────────────────────

    /// Route one controller event to its handler.
    pub fn dispatch(&self, event: &FaucetEvent) {
        let now = model::timestamp(event.time);
        debug!(event_id = ?event.event_id, kind = ?event.kind(), dp = ?event.dp_name, "dispatching event");

        if let Some(info) = event.as_port_state() {
            self.process_port_state(now, &info.name, info.port, info.active);
        } else if let Some((name, _, ports)) = event.as_ports_status() {
            self.mutate(|graph| {
                for (port, up) in ports {
                    graph.process_port_state(now, &name, *port, *up);
                }
            });
        } else if let Some(info) = event.as_port_learn() {
            let mac = MacAddress::new(&info.mac);
            self.process_port_learn(now, &info.name, info.port, &mac, info.ip.as_deref(), info.vid);
        } else if let Some((name, entries)) = event.as_learned_macs() {
            self.mutate(|graph| {
                for entry in entries {
                    let mac = MacAddress::new(&entry.eth_src);
                    graph.process_port_learn(now, &name, entry.port_no, &mac, entry.l3_src_ip.as_deref(), entry.vid);
                }
            });
        } else if let Some(info) = event.as_port_expire() {
            self.process_port_expire(&info.name, info.port, &MacAddress::new(&info.mac));
        } else if let Some(info) = event.as_lag_state() {
            let role = info.role.map(LacpRole::from_code);
            self.process_lag_state(now, &info.name, info.port, Some(LacpState::from_code(info.state)), role);
        } else if let Some(info) = event.as_stack_state() {
            self.process_stack_state(now, &info.name, info.port, info.state);
        } else if let Some(change) = event.as_stack_topo_change() {
            self.process_stack_topo_change(now, TopologySnapshot::from_event(change));
        } else if let Some(info) = event.as_config_change() {
            self.process_dp_config_change(
                now,
                &info.name,
                info.dp_id,
                info.restart_type.as_deref(),
                info.config_hashes.as_deref(),
            );
        } else if let Some(info) = event.as_dp_change() {
            self.process_dp_change(now, &info.name, event.dp_id, info.connected);
        } else {
            debug!(event_id = ?event.event_id, "ignoring event without a tracked payload");
        }
    }

    // ── Handlers ────────────────────────────────────────────────────

    pub fn process_port_state(&self, now: DateTime<Utc>, name: &str, port: u32, up: bool) {
        self.mutate(|graph| graph.process_port_state(now, name, port, up));
    }

    pub fn process_port_learn(
        &self,
        now: DateTime<Utc>,
        name: &str,
        port: u32,
        mac: &MacAddress,
        ip: Option<&str>,
        vid: Option<u16>,
    ) {
        self.mutate(|graph| graph.process_port_learn(now, name, port, mac, ip, vid));
    }

    pub fn process_port_expire(&self, name: &str, port: u32, mac: &MacAddress) {
        self.mutate(|graph| graph.process_port_expire(name, port, mac));
    }

    pub fn process_lag_state(
        &self,
        now: DateTime<Utc>,
        name: &str,
        port: u32,
        state: Option<LacpState>,
        role: Option<LacpRole>,
    ) {
        self.mutate(|graph| graph.process_lag_state(now, name, port, state, role));
    }

    pub fn process_stack_state(&self, now: DateTime<Utc>, name: &str, port: u32, code: i64) {
        self.mutate(|graph| graph.process_stack_state(now, name, port, code));
    }

    pub fn process_stack_topo_change(&self, now: DateTime<Utc>, snapshot: TopologySnapshot) {
        self.mutate(|graph| graph.process_stack_topo_change(now, snapshot));
    }

    pub fn process_dp_change(&self, now: DateTime<Utc>, name: &str, dp_id: Option<u64>, connected: bool) {
        self.mutate(|graph| graph.process_dp_change(now, name, dp_id, connected));
    }

    pub fn process_dp_config_change(
        &self,
        now: DateTime<Utc>,
        name: &str,
        dp_id: Option<u64>,
        restart_type: Option<&str>,
        config_hashes: Option<&str>,
    ) {
        self.mutate(|graph| graph.process_dp_config_change(now, name, dp_id, restart_type, config_hashes));
    }

    pub fn process_dataplane_config_change(&self, now: DateTime<Utc>, dps: DpsConfig) {
        self.mutate(|graph| graph.process_dataplane_config_change(now, dps));
    }

    pub fn process_auth_result(&self, mac: &MacAddress, result: AuthResult) -> Result<(), CoreError> {
        self.mutate(|graph| graph.process_auth_result(mac, result))
    }

    pub fn process_vlan_metrics(&self, now: DateTime<Utc>, samples: &[Sample]) {
        self.mutate(|graph| graph.process_vlan_metrics(now, samples));
    }

    /// Apply a pending topology update if it is due.
    pub fn heartbeat_update(&self, now: DateTime<Utc>) -> bool {
        self.mutate(|graph| graph.heartbeat_update(now))
    }

    // ── Restore ─────────────────────────────────────────────────────

    /// Rebuild state from a metrics snapshot. Returns the event horizon.
    /// A failure leaves the engine unrestored with the reason recorded.
    pub fn restore_states_from_metrics(
        &self,
        snapshot: &MetricSnapshot,
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        let result = self.mutate(|graph| graph.restore_from_metrics(&self.restore_table, snapshot, now));
        if let Err(e) = &result {
            warn!(error = %e, "state restore failed");
            self.set_state_restored(false, Some(e.to_string()));
        }
        result
    }

    /// Metric families a restore needs, in the order they are applied.
    pub fn restore_metrics(&self) -> Vec<&str> {
        self.restore_table.iter().map(|e| e.metric.as_str()).collect()
    }

    pub fn set_state_restored(&self, restored: bool, reason: Option<String>) {
        let detail = match (restored, reason) {
            (true, _) => String::new(),
            (false, Some(reason)) => format!("{NOT_RESTORED}: {reason}"),
            (false, None) => NOT_RESTORED.to_owned(),
        };
        info!(restored, detail = %detail, "state restore status updated");
        self.lock().restore = RestoreStatus { restored, detail };
    }

    pub fn is_restored(&self) -> bool {
        self.lock().restore.restored
    }

    // ── Queries ─────────────────────────────────────────────────────

    fn guarded_query<T>(
        &self,
        name: &str,
        query: impl FnOnce(&StateGraph) -> Result<T, CoreError>,
    ) -> Reply<T> {
        let graph = self.lock();
        if !graph.restore.restored {
            return Reply::Broken(Summary::broken(graph.restore.detail.clone()));
        }
        match panic::catch_unwind(AssertUnwindSafe(|| query(&graph))) {
            Ok(Ok(value)) => Reply::Ready(value),
            Ok(Err(e)) => {
                warn!(query = name, error = %e, "query failed");
                Reply::Broken(Summary::broken(e.to_string()))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(query = name, panic = %message, "query panicked");
                Reply::Broken(Summary::broken(format!("Internal error in {name}: {message}")))
            }
        }
    }

    fn guarded_summary(&self, name: &str, query: impl FnOnce(&StateGraph) -> Summary) -> Summary {
        match self.guarded_query(name, |graph| Ok(query(graph))) {
            Reply::Ready(summary) | Reply::Broken(summary) => summary,
        }
    }

    pub fn switch_summary(&self) -> Summary {
        self.guarded_summary("switch_summary", StateGraph::switch_summary)
    }

    pub fn dataplane_summary(&self) -> Summary {
        self.guarded_summary("dataplane_summary", StateGraph::dataplane_summary)
    }

    pub fn host_summary(&self) -> Summary {
        self.guarded_summary("host_summary", StateGraph::host_summary)
    }

    /// Detail of every switch, or of `switch` alone.
    pub fn switch_state(&self, switch: Option<&str>) -> Reply<SwitchesState> {
        self.guarded_query("switch_state", |graph| graph.switches_state(switch))
    }

    pub fn dataplane_state(&self) -> Reply<DataplaneState> {
        self.guarded_query("dataplane_state", |graph| Ok(graph.dataplane_state()))
    }

    pub fn switch_egress_path(&self, switch: &str, in_port: Option<u32>) -> Reply<PathReply> {
        self.guarded_query("switch_egress_path", |graph| {
            if !graph.switches.contains_key(switch) && !graph.dps.dps.contains_key(switch) {
                return Err(CoreError::SwitchNotFound {
                    name: switch.to_owned(),
                });
            }
            Ok(graph.path_to_egress(switch, in_port))
        })
    }

    pub fn host_path(
        &self,
        src: &MacAddress,
        dst: Option<&MacAddress>,
        to_egress: bool,
    ) -> Reply<HostPathReply> {
        self.guarded_query("host_path", |graph| graph.host_path(src, dst, to_egress))
    }

    pub fn list_hosts(&self) -> Reply<HostsReply> {
        self.guarded_query("list_hosts", |graph| Ok(graph.hosts()))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::model::State;

    #[test]
    fn queries_refuse_before_restore() {
        let engine = StateEngine::default();
        let summary = engine.switch_summary();
        assert_eq!(summary.state, State::Broken);
        assert_eq!(summary.detail, NOT_RESTORED);
        assert_eq!(engine.list_hosts().broken_detail(), Some(NOT_RESTORED));
    }

    #[test]
    fn failed_restore_reason_is_reported() {
        let engine = StateEngine::default();
        let result = engine.restore_states_from_metrics(&MetricSnapshot::new(), Utc::now());
        assert!(matches!(result, Err(CoreError::MissingMetric { .. })));
        assert!(!engine.is_restored());
        let detail = engine.dataplane_summary().detail;
        assert!(detail.starts_with("State not restored: Missing required metric"), "{detail}");
    }

    #[test]
    fn query_panics_become_broken_replies() {
        let engine = StateEngine::default();
        engine.set_state_restored(true, None);
        let reply: Reply<()> = engine.guarded_query("exploding", |_| panic!("boom"));
        assert_eq!(reply.broken_detail(), Some("Internal error in exploding: boom"));
        // The lock is still usable afterwards.
        assert!(engine.is_restored());
    }

    #[test]
    fn unknown_switch_path_is_broken() {
        let engine = StateEngine::default();
        engine.set_state_restored(true, None);
        let reply = engine.switch_egress_path("nope", None);
        assert_eq!(reply.broken_detail(), Some("Switch not found: nope"));
    }
}
