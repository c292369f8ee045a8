//! Faucet event records.
//!
//! The controller writes one JSON object per line to its event socket.
//! Every record carries the datapath identity (`dp_name`, `dp_id`), a
//! timestamp and a monotonically increasing `event_id`, plus exactly one
//! payload key naming the event kind (`PORT_CHANGE`, `L2_LEARN`, ...).
//!
//! [`FaucetEvent`] models the record with one optional field per payload.
//! The `as_*` accessors classify a record: each returns `Some` only for its
//! own kind, so callers can try them in turn.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Reason Faucet attaches to a port that was removed from the datapath.
const REASON_DELETE: &str = "DELETE";
/// `DP_CHANGE` reason for a datapath that (re)connected.
const REASON_COLD_START: &str = "cold_start";

// ── Event kinds ─────────────────────────────────────────────────────

/// The payload key present in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    PortChange,
    PortsStatus,
    L2Learn,
    L2LearnedMacs,
    L2Expire,
    LagChange,
    StackState,
    StackTopoChange,
    ConfigChange,
    DpChange,
}

// ── Raw record ──────────────────────────────────────────────────────

/// One record from the Faucet event socket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaucetEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    /// Seconds since the epoch, as reported by the controller.
    #[serde(default)]
    pub time: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<u64>,

    /// Set on synthetic port events that already went through the
    /// debounce stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounced: Option<bool>,

    #[serde(rename = "PORT_CHANGE", default, skip_serializing_if = "Option::is_none")]
    pub port_change: Option<PortChange>,

    #[serde(rename = "PORTS_STATUS", default, skip_serializing_if = "Option::is_none")]
    pub ports_status: Option<BTreeMap<u32, bool>>,

    #[serde(rename = "L2_LEARN", default, skip_serializing_if = "Option::is_none")]
    pub l2_learn: Option<L2Learn>,

    #[serde(rename = "L2_LEARNED_MACS", default, skip_serializing_if = "Option::is_none")]
    pub l2_learned_macs: Option<Vec<L2Learn>>,

    #[serde(rename = "L2_EXPIRE", default, skip_serializing_if = "Option::is_none")]
    pub l2_expire: Option<L2Expire>,

    #[serde(rename = "LAG_CHANGE", default, skip_serializing_if = "Option::is_none")]
    pub lag_change: Option<LagChange>,

    #[serde(rename = "STACK_STATE", default, skip_serializing_if = "Option::is_none")]
    pub stack_state: Option<StackState>,

    #[serde(rename = "STACK_TOPO_CHANGE", default, skip_serializing_if = "Option::is_none")]
    pub stack_topo_change: Option<StackTopoChange>,

    #[serde(rename = "CONFIG_CHANGE", default, skip_serializing_if = "Option::is_none")]
    pub config_change: Option<ConfigChange>,

    #[serde(rename = "DP_CHANGE", default, skip_serializing_if = "Option::is_none")]
    pub dp_change: Option<DpChange>,
}

// ── Payloads ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortChange {
    pub port_no: u32,
    pub status: bool,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L2Learn {
    pub port_no: u32,
    pub eth_src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vid: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l3_src_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L2Expire {
    pub port_no: u32,
    pub eth_src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vid: Option<u16>,
}

/// LACP status of one aggregated port. `state` and `role` are Faucet's
/// numeric encodings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagChange {
    pub port_no: u32,
    pub state: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<i64>,
}

/// Stack protocol status of one stack port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackState {
    pub port: u32,
    pub state: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackTopoChange {
    #[serde(default)]
    pub stack_root: String,
    #[serde(default)]
    pub graph: StackGraph,
    #[serde(default)]
    pub dps: BTreeMap<String, StackDp>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackGraph {
    #[serde(default)]
    pub links: Vec<StackLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackDp {
    /// Port leading towards the root; absent (or zero) on the root itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_hop_port: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackLink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub port_map: StackPortMap,
}

/// Endpoint pair of a stack link. Ports are rendered as `"Port <n>"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackPortMap {
    pub dp_a: String,
    pub port_a: String,
    pub dp_z: String,
    pub port_z: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash_info: Option<ConfigHashInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigHashInfo {
    #[serde(default)]
    pub config_files: String,
    #[serde(default)]
    pub hashes: String,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DpChange {
    pub reason: String,
}

// ── Accessor results ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStateInfo {
    pub name: String,
    pub dp_id: u64,
    pub port: u32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortLearnInfo {
    pub name: String,
    pub port: u32,
    pub mac: String,
    pub ip: Option<String>,
    pub vid: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortExpireInfo {
    pub name: String,
    pub port: u32,
    pub mac: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LagInfo {
    pub name: String,
    pub port: u32,
    pub state: i64,
    pub role: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackStateInfo {
    pub name: String,
    pub port: u32,
    pub state: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChangeInfo {
    pub name: String,
    pub dp_id: Option<u64>,
    pub restart_type: Option<String>,
    pub config_hashes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpChangeInfo {
    pub name: String,
    pub connected: bool,
}

// ── Classification ──────────────────────────────────────────────────

impl FaucetEvent {
    /// Payload kind of this record, if it carries a recognized one.
    pub fn kind(&self) -> Option<EventKind> {
        let kind = if self.port_change.is_some() {
            EventKind::PortChange
        } else if self.ports_status.is_some() {
            EventKind::PortsStatus
        } else if self.l2_learn.is_some() {
            EventKind::L2Learn
        } else if self.l2_learned_macs.is_some() {
            EventKind::L2LearnedMacs
        } else if self.l2_expire.is_some() {
            EventKind::L2Expire
        } else if self.lag_change.is_some() {
            EventKind::LagChange
        } else if self.stack_state.is_some() {
            EventKind::StackState
        } else if self.stack_topo_change.is_some() {
            EventKind::StackTopoChange
        } else if self.config_change.is_some() {
            EventKind::ConfigChange
        } else if self.dp_change.is_some() {
            EventKind::DpChange
        } else {
            return None;
        };
        Some(kind)
    }

    fn name(&self) -> String {
        self.dp_name.clone().unwrap_or_default()
    }

    /// Port up/down transition. A `DELETE` reason always reads as down.
    pub fn as_port_state(&self) -> Option<PortStateInfo> {
        let change = self.port_change.as_ref()?;
        Some(PortStateInfo {
            name: self.name(),
            dp_id: self.dp_id?,
            port: change.port_no,
            active: change.status && change.reason != REASON_DELETE,
        })
    }

    /// Bulk status of every port on a datapath.
    pub fn as_ports_status(&self) -> Option<(String, u64, &BTreeMap<u32, bool>)> {
        let status = self.ports_status.as_ref()?;
        Some((self.name(), self.dp_id?, status))
    }

    /// Batch of MACs learned since the datapath connected.
    pub fn as_learned_macs(&self) -> Option<(String, &[L2Learn])> {
        let macs = self.l2_learned_macs.as_ref()?;
        Some((self.name(), macs.as_slice()))
    }

    pub fn as_port_learn(&self) -> Option<PortLearnInfo> {
        let learn = self.l2_learn.as_ref()?;
        Some(PortLearnInfo {
            name: self.name(),
            port: learn.port_no,
            mac: learn.eth_src.clone(),
            ip: learn.l3_src_ip.clone(),
            vid: learn.vid,
        })
    }

    pub fn as_port_expire(&self) -> Option<PortExpireInfo> {
        let expire = self.l2_expire.as_ref()?;
        Some(PortExpireInfo {
            name: self.name(),
            port: expire.port_no,
            mac: expire.eth_src.clone(),
        })
    }

    pub fn as_lag_state(&self) -> Option<LagInfo> {
        let lag = self.lag_change.as_ref()?;
        Some(LagInfo {
            name: self.name(),
            port: lag.port_no,
            state: lag.state,
            role: lag.role,
        })
    }

    pub fn as_stack_state(&self) -> Option<StackStateInfo> {
        let stack = self.stack_state.as_ref()?;
        Some(StackStateInfo {
            name: self.name(),
            port: stack.port,
            state: stack.state,
        })
    }

    pub fn as_stack_topo_change(&self) -> Option<&StackTopoChange> {
        self.stack_topo_change.as_ref()
    }

    pub fn as_config_change(&self) -> Option<ConfigChangeInfo> {
        let change = self.config_change.as_ref()?;
        Some(ConfigChangeInfo {
            name: self.name(),
            dp_id: self.dp_id,
            restart_type: change.restart_type.clone(),
            config_hashes: change
                .config_hash_info
                .as_ref()
                .map(|info| info.hashes.clone())
                .filter(|hashes| !hashes.is_empty()),
        })
    }

    pub fn as_dp_change(&self) -> Option<DpChangeInfo> {
        let change = self.dp_change.as_ref()?;
        Some(DpChangeInfo {
            name: self.name(),
            connected: change.reason == REASON_COLD_START,
        })
    }

    // ── Synthetic records ───────────────────────────────────────────

    /// Empty record carrying `base`'s datapath identity, id and time.
    fn derived_from(base: &Self) -> Self {
        Self {
            version: base.version,
            time: base.time,
            dp_name: base.dp_name.clone(),
            dp_id: base.dp_id,
            event_id: base.event_id,
            ..Self::default()
        }
    }

    /// Single-port change derived from a bulk or raw port record.
    pub fn port_change_from(base: &Self, port: u32, status: bool) -> Self {
        Self {
            port_change: Some(PortChange {
                port_no: port,
                status,
                reason: "MODIFY".into(),
            }),
            ..Self::derived_from(base)
        }
    }

    /// Single-MAC learn derived from a learned-MAC batch.
    pub fn l2_learn_from(base: &Self, entry: &L2Learn) -> Self {
        Self {
            l2_learn: Some(entry.clone()),
            ..Self::derived_from(base)
        }
    }
}

impl StackLink {
    /// Both endpoints as `(switch, port)` pairs, or `None` if a port label
    /// doesn't end in a port number.
    pub fn endpoints(&self) -> Option<((String, u32), (String, u32))> {
        let map = &self.port_map;
        Some((
            (map.dp_a.clone(), parse_port_label(&map.port_a)?),
            (map.dp_z.clone(), parse_port_label(&map.port_z)?),
        ))
    }
}

/// Faucet renders stack ports as `"Port 3"`; accept a bare number as well.
fn parse_port_label(label: &str) -> Option<u32> {
    label.split_whitespace().last()?.parse().ok()
}

// ── Tests ────────────────────────────────────────────────────────────
