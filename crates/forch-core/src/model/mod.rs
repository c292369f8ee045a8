// ── Domain model ──
//
// Canonical types for switches, ports, links, hosts, topology, egress and
// VLAN counters, plus the reply shapes returned by queries. Everything
// here is plain data; mutation rules live in `state`.

pub mod egress;
pub mod host;
pub mod link;
pub mod reply;
pub mod switch;
pub mod topology;
pub mod vlan;

pub use egress::{EgressGroup, EgressMember, LacpRole, LacpState, MemberHealth};
pub use host::{AuthResult, LearnRecord, LearnedHost, MacAddress};
pub use link::{Endpoint, Link, LinkKey, LinkState};
pub use reply::{
    DataplaneState, EgressMemberView, EgressView, HostEntry, HostPathReply, HostsReply, LinkView, PathHop,
    PathReply, PortView, Reply, State, Summary, SwitchDetail, SwitchesState, TopologyView,
    VlanView,
};
pub use switch::{Port, Switch, SwitchStatus};
pub use topology::{PendingTopology, StackPortState, TopologySnapshot, TopologyState};
pub use vlan::VlanCounters;

use chrono::{DateTime, Utc};

/// Convert a controller timestamp (fractional epoch seconds).
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
pub fn timestamp(secs: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis((secs * 1000.0) as i64).unwrap_or_default()
}
