// ── Query replies ──
//
// Owned views copied out of the state graph under the lock. Field names
// follow the JSON the query layer serves.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

use crate::attributes::PortType;

use super::egress::{LacpRole, LacpState, MemberHealth};
use super::host::{AuthResult, LearnRecord, MacAddress};
use super::link::LinkState;
use super::switch::SwitchStatus;
use super::topology::StackPortState;

// ── State & summaries ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum State {
    Healthy,
    Damaged,
    Broken,
    Down,
    Up,
    Active,
}

impl State {
    fn severity(self) -> u8 {
        match self {
            Self::Broken | Self::Down => 2,
            Self::Damaged => 1,
            Self::Healthy | Self::Up | Self::Active => 0,
        }
    }

    /// The more severe of the two.
    pub fn worst(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

/// Aggregate state of one axis (switches, dataplane, egress).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub state: State,
    pub detail: String,
    pub change_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_change: Option<DateTime<Utc>>,
}

impl Summary {
    pub fn broken(detail: impl Into<String>) -> Self {
        Self {
            state: State::Broken,
            detail: detail.into(),
            change_count: 0,
            last_change: None,
        }
    }
}

/// A query answer, or the reason it could not be given.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply<T> {
    Ready(T),
    Broken(Summary),
}

impl<T> Reply<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Broken(_) => None,
        }
    }

    pub fn into_ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Broken(_) => None,
        }
    }

    pub fn broken_detail(&self) -> Option<&str> {
        match self {
            Self::Ready(_) => None,
            Self::Broken(summary) => Some(&summary.detail),
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathHop {
    pub switch: String,
    #[serde(rename = "in", skip_serializing_if = "Option::is_none")]
    pub in_port: Option<u32>,
    #[serde(rename = "out", skip_serializing_if = "Option::is_none")]
    pub out_port: Option<u32>,
}

impl PathHop {
    pub fn new(switch: impl Into<String>, in_port: Option<u32>, out_port: Option<u32>) -> Self {
        Self {
            switch: switch.into(),
            in_port,
            out_port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathReply {
    pub path_state: State,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub path: Vec<PathHop>,
}

impl PathReply {
    pub fn healthy(path: Vec<PathHop>) -> Self {
        Self {
            path_state: State::Healthy,
            detail: None,
            path,
        }
    }

    pub fn broken(detail: impl Into<String>, path: Vec<PathHop>) -> Self {
        Self {
            path_state: State::Broken,
            detail: Some(detail.into()),
            path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostPathReply {
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    #[serde(flatten)]
    pub path: PathReply,
}

// ── Switches ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortView {
    pub status_up: Option<bool>,
    pub status_count: u64,
    pub status_timestamp: Option<DateTime<Utc>>,
    pub port_type: Option<PortType>,
    pub description: Option<String>,
    pub stack_peer: Option<String>,
    pub stack_state: Option<StackPortState>,
    pub learned_macs: Vec<MacAddress>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchDetail {
    pub name: String,
    pub dp_id: Option<u64>,
    pub description: Option<String>,
    pub switch_state: Option<SwitchStatus>,
    pub switch_state_change_count: u64,
    pub switch_state_last_change: Option<DateTime<Utc>>,
    pub config_change_count: u64,
    pub config_change_type: Option<String>,
    pub config_change_timestamp: Option<DateTime<Utc>>,
    pub ports: BTreeMap<u32, PortView>,
    pub root_path: PathReply,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchesState {
    #[serde(flatten)]
    pub summary: Summary,
    pub switches: BTreeMap<String, SwitchDetail>,
}

// ── Dataplane ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkView {
    pub switch_a: String,
    pub port_a: u32,
    pub switch_b: String,
    pub port_b: u32,
    pub link_state: LinkState,
    pub change_count: u64,
    pub last_change: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyView {
    pub stack_root: Option<String>,
    pub root_hop_ports: BTreeMap<String, u32>,
    pub links_change_count: u64,
    pub links_last_change: Option<DateTime<Utc>>,
    pub topology_change_count: u64,
    pub topology_last_change: Option<DateTime<Utc>>,
    pub update_pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EgressMemberView {
    pub lacp_state: Option<LacpState>,
    pub lacp_role: Option<LacpRole>,
    pub health: MemberHealth,
    pub change_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EgressView {
    #[serde(flatten)]
    pub summary: Summary,
    pub members: BTreeMap<String, EgressMemberView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VlanView {
    pub packet_count: f64,
    pub packet_rate: f64,
    pub over_threshold: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataplaneState {
    #[serde(flatten)]
    pub summary: Summary,
    pub switches: BTreeMap<String, Option<SwitchStatus>>,
    pub stack_links: BTreeMap<String, LinkView>,
    pub topology: TopologyView,
    /// `None` when no egress is configured or reported.
    pub egress: Option<EgressView>,
    pub vlans: BTreeMap<u16, VlanView>,
}

// ── Hosts ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostEntry {
    pub access_switch: Option<String>,
    pub access_port: Option<u32>,
    pub ips: Vec<String>,
    pub vid: Option<u16>,
    pub auth: Option<AuthResult>,
    pub switches: BTreeMap<String, LearnRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostsReply {
    pub hosts: BTreeMap<MacAddress, HostEntry>,
}
