// ── Snapshot restore ──
//
// Rebuilds the graph from a varz snapshot by feeding every sample through
// the live handlers. The table is ordered: port status lands before hosts
// so that a restored learn is not expired by a restored port-down, and the
// topology is applied last, once every stack port state is known.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use forch_api::{MetricSnapshot, Sample};

use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::model::{LacpRole, LacpState, MacAddress, StackPortState, TopologySnapshot};

use super::graph::StateGraph;

pub(crate) const EVENT_ID_METRIC: &str = "faucet_event_id";

type RestoreFn = fn(&mut StateGraph, &mut RestoreContext, &Sample) -> Result<(), CoreError>;

/// One required metric and the handler its samples go through.
pub(crate) struct RestoreEntry {
    pub metric: String,
    apply: RestoreFn,
}

impl std::fmt::Debug for RestoreEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreEntry").field("metric", &self.metric).finish()
    }
}

/// Values that only make sense once every sample has been read.
struct RestoreContext {
    now: DateTime<Utc>,
    metric: String,
    lacp: BTreeMap<(String, u32), (Option<LacpState>, Option<LacpRole>)>,
    root_dpid: Option<u64>,
    root_hop_ports: BTreeMap<String, u32>,
    vlan_samples: Vec<Sample>,
    event_id: Option<u64>,
}

impl RestoreContext {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            metric: String::new(),
            lacp: BTreeMap::new(),
            root_dpid: None,
            root_hop_ports: BTreeMap::new(),
            vlan_samples: Vec::new(),
            event_id: None,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> CoreError {
        CoreError::invalid_sample(&self.metric, reason)
    }

    fn label<'a>(&self, sample: &'a Sample, name: &str) -> Result<&'a str, CoreError> {
        sample
            .label(name)
            .ok_or_else(|| self.invalid(format!("missing label {name}")))
    }

    fn port(&self, sample: &Sample) -> Result<u32, CoreError> {
        let raw = self.label(sample, "port")?;
        raw.parse()
            .map_err(|_| self.invalid(format!("bad port label {raw:?}")))
    }

    fn value(&self, sample: &Sample) -> Result<u64, CoreError> {
        sample_u64(sample.value).ok_or_else(|| self.invalid(format!("bad value {}", sample.value)))
    }

    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    fn code(&self, sample: &Sample) -> Result<i64, CoreError> {
        if sample.value.is_finite() && sample.value.fract() == 0.0 {
            Ok(sample.value as i64)
        } else {
            Err(self.invalid(format!("bad state code {}", sample.value)))
        }
    }
}

/// Counters and ids arrive as floats; only non-negative integers are valid.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
pub(crate) fn sample_u64(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0).then_some(value as u64)
}

/// Datapath ids are exported as `0x..` hex or plain decimal.
pub(crate) fn parse_dp_id(raw: &str) -> Option<u64> {
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

// ── Table ───────────────────────────────────────────────────────────

fn entry(metric: impl Into<String>, apply: RestoreFn) -> RestoreEntry {
    RestoreEntry {
        metric: metric.into(),
        apply,
    }
}

pub(crate) fn restore_table(config: &EngineConfig) -> Vec<RestoreEntry> {
    vec![
        entry("dp_status", restore_dp_status),
        entry("port_status", restore_port_status),
        entry("port_stack_state", restore_stack_state),
        entry("port_lacp_state", restore_lacp_state),
        entry("port_lacp_role", restore_lacp_role),
        entry("learned_l2_port", restore_learned_port),
        entry("faucet_config_reload_cold", restore_config_reload),
        entry("faucet_config_reload_warm", restore_config_reload),
        entry("dp_root_hop_port", restore_root_hop_port),
        entry("faucet_stack_root_dpid", restore_stack_root),
        entry(config.vlan_metric.clone(), restore_vlan),
        entry(EVENT_ID_METRIC, restore_event_id),
    ]
}

fn restore_dp_status(graph: &mut StateGraph, ctx: &mut RestoreContext, sample: &Sample) -> Result<(), CoreError> {
    let name = ctx.label(sample, "dp_name")?;
    let dp_id = sample.label("dp_id").and_then(parse_dp_id);
    graph.process_dp_change(ctx.now, name, dp_id, sample.value > 0.0);
    Ok(())
}

fn restore_port_status(graph: &mut StateGraph, ctx: &mut RestoreContext, sample: &Sample) -> Result<(), CoreError> {
    let name = ctx.label(sample, "dp_name")?;
    let port = ctx.port(sample)?;
    graph.process_port_state(ctx.now, name, port, sample.value > 0.0);
    Ok(())
}

fn restore_stack_state(graph: &mut StateGraph, ctx: &mut RestoreContext, sample: &Sample) -> Result<(), CoreError> {
    let name = ctx.label(sample, "dp_name")?;
    let port = ctx.port(sample)?;
    let code = ctx.code(sample)?;
    graph.process_stack_state(ctx.now, name, port, code);
    Ok(())
}

fn restore_lacp_state(_graph: &mut StateGraph, ctx: &mut RestoreContext, sample: &Sample) -> Result<(), CoreError> {
    let key = (ctx.label(sample, "dp_name")?.to_owned(), ctx.port(sample)?);
    let state = LacpState::from_code(ctx.code(sample)?);
    ctx.lacp.entry(key).or_default().0 = Some(state);
    Ok(())
}

fn restore_lacp_role(_graph: &mut StateGraph, ctx: &mut RestoreContext, sample: &Sample) -> Result<(), CoreError> {
    let key = (ctx.label(sample, "dp_name")?.to_owned(), ctx.port(sample)?);
    let role = LacpRole::from_code(ctx.code(sample)?);
    ctx.lacp.entry(key).or_default().1 = Some(role);
    Ok(())
}

fn restore_learned_port(graph: &mut StateGraph, ctx: &mut RestoreContext, sample: &Sample) -> Result<(), CoreError> {
    let name = ctx.label(sample, "dp_name")?;
    let mac = MacAddress::new(ctx.label(sample, "eth_src")?);
    let vid = sample.label("vid").and_then(|v| v.parse().ok());
    let port = u32::try_from(ctx.value(sample)?).map_err(|_| ctx.invalid("port out of range"))?;
    // Faucet exports 0 for entries that have already aged out.
    if port != 0 {
        graph.process_port_learn(ctx.now, name, port, &mac, None, vid);
    }
    Ok(())
}

fn restore_config_reload(graph: &mut StateGraph, ctx: &mut RestoreContext, sample: &Sample) -> Result<(), CoreError> {
    let name = ctx.label(sample, "dp_name")?;
    let count = ctx.value(sample)?;
    if count == 0 {
        return Ok(());
    }
    let restart_type = if ctx.metric.ends_with("cold") { "cold" } else { "warm" };
    let dp_id = sample.label("dp_id").and_then(parse_dp_id);
    let switch = graph.switch_mut(name);
    if dp_id.is_some() {
        switch.dp_id = dp_id;
    }
    switch.config_change_count += count;
    switch.config_change_type = Some(restart_type.to_owned());
    switch.config_change_time = Some(ctx.now);
    Ok(())
}

fn restore_root_hop_port(_graph: &mut StateGraph, ctx: &mut RestoreContext, sample: &Sample) -> Result<(), CoreError> {
    let name = ctx.label(sample, "dp_name")?.to_owned();
    let port = u32::try_from(ctx.value(sample)?).map_err(|_| ctx.invalid("port out of range"))?;
    if port != 0 {
        ctx.root_hop_ports.insert(name, port);
    }
    Ok(())
}

fn restore_stack_root(_graph: &mut StateGraph, ctx: &mut RestoreContext, sample: &Sample) -> Result<(), CoreError> {
    let dpid = ctx.value(sample)?;
    if dpid != 0 {
        ctx.root_dpid = Some(dpid);
    }
    Ok(())
}

fn restore_vlan(_graph: &mut StateGraph, ctx: &mut RestoreContext, sample: &Sample) -> Result<(), CoreError> {
    ctx.vlan_samples.push(sample.clone());
    Ok(())
}

fn restore_event_id(_graph: &mut StateGraph, ctx: &mut RestoreContext, sample: &Sample) -> Result<(), CoreError> {
    let id = ctx.value(sample)?;
    ctx.event_id = Some(ctx.event_id.map_or(id, |seen| seen.max(id)));
    Ok(())
}

// ── Driver ──────────────────────────────────────────────────────────

impl StateGraph {
    /// Rebuild dynamic state from `snapshot` and return the event id it
    /// reflects. Configuration survives; everything else starts over.
    pub(crate) fn restore_from_metrics(
        &mut self,
        table: &[RestoreEntry],
        snapshot: &MetricSnapshot,
        now: DateTime<Utc>,
    ) -> Result<u64, CoreError> {
        if let Some(missing) = table.iter().find(|e| !snapshot.contains(&e.metric)) {
            return Err(CoreError::MissingMetric {
                metric: missing.metric.clone(),
            });
        }

        self.reset();
        let mut ctx = RestoreContext::new(now);
        for entry in table {
            let samples = snapshot.get(&entry.metric).unwrap_or_default();
            debug!(metric = %entry.metric, samples = samples.len(), "restoring metric");
            ctx.metric.clone_from(&entry.metric);
            for sample in samples {
                match (entry.apply)(self, &mut ctx, sample) {
                    Ok(()) => {}
                    Err(CoreError::InvalidSample { metric, reason }) => {
                        warn!(%metric, %reason, labels = ?sample.labels, "skipping malformed sample");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        for ((name, port), (state, role)) in std::mem::take(&mut ctx.lacp) {
            self.process_lag_state(now, &name, port, state, role);
        }
        let topology = self.restored_topology(&ctx);
        self.apply_topology(now, topology);
        self.process_vlan_metrics(now, &ctx.vlan_samples);

        let horizon = ctx.event_id.ok_or_else(|| CoreError::invalid_sample(EVENT_ID_METRIC, "no samples"))?;
        info!(
            switches = self.switches.len(),
            hosts = self.hosts.len(),
            horizon,
            "state restored from metrics"
        );
        Ok(horizon)
    }

    /// Configured stack links count as part of the graph once both ends
    /// report the stack up.
    fn restored_topology(&self, ctx: &RestoreContext) -> TopologySnapshot {
        let root = ctx.root_dpid.and_then(|dpid| {
            self.switches
                .values()
                .find(|sw| sw.dp_id == Some(dpid))
                .map(|sw| sw.name.clone())
                .or_else(|| self.dps.switch_name_by_id(dpid).map(str::to_owned))
        });
        let links = self
            .dps
            .stack_links()
            .into_iter()
            .filter(|key| {
                key.endpoints()
                    .iter()
                    .all(|endpoint| self.stack_state(endpoint) == Some(StackPortState::Up))
            })
            .collect();
        TopologySnapshot {
            root,
            root_hop_ports: ctx.root_hop_ports.clone(),
            links,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
