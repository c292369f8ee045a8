// ── Stack topology ──
//
// The controller announces the whole topology at once: root, per-switch
// root-hop-port and the link graph. Snapshots are compared by content
// hash so a repeated announcement changes nothing.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use tracing::warn;

use forch_api::event::StackTopoChange;

use super::link::{Endpoint, LinkKey};

/// Stack protocol state of one port, as Faucet encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StackPortState {
    AdminDown,
    Init,
    Bad,
    Up,
    Gone,
    None,
}

impl StackPortState {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::AdminDown,
            1 => Self::Init,
            2 => Self::Bad,
            3 => Self::Up,
            4 => Self::Gone,
            5 => Self::None,
            _ => return None,
        })
    }
}

/// One topology announcement, reduced to what the engine uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TopologySnapshot {
    pub root: Option<String>,
    pub root_hop_ports: BTreeMap<String, u32>,
    pub links: BTreeSet<LinkKey>,
}

impl TopologySnapshot {
    pub fn from_event(change: &StackTopoChange) -> Self {
        let root = Some(change.stack_root.clone()).filter(|r| !r.is_empty());
        let root_hop_ports = change
            .dps
            .iter()
            .filter_map(|(name, dp)| {
                dp.root_hop_port
                    .filter(|port| *port != 0)
                    .map(|port| (name.clone(), port))
            })
            .collect();
        let links = change
            .graph
            .links
            .iter()
            .filter_map(|link| match link.endpoints() {
                Some(((sw_a, port_a), (sw_z, port_z))) => Some(LinkKey::new(
                    Endpoint::new(sw_a, port_a),
                    Endpoint::new(sw_z, port_z),
                )),
                None => {
                    warn!(key = ?link.key, "skipping stack link with unparseable ports");
                    None
                }
            })
            .collect();
        Self {
            root,
            root_hop_ports,
            links,
        }
    }

    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    pub fn root_hop_port(&self, switch: &str) -> Option<u32> {
        self.root_hop_ports.get(switch).copied()
    }

    pub fn is_root(&self, switch: &str) -> bool {
        self.root.as_deref() == Some(switch)
    }
}

/// Latest unapplied announcement.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTopology {
    pub snapshot: TopologySnapshot,
    /// Arrival of the oldest announcement this one superseded.
    pub first_received: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopologyState {
    pub applied: TopologySnapshot,
    pub applied_hash: Option<u64>,
    /// When a snapshot last changed the applied topology.
    pub last_applied: Option<DateTime<Utc>>,
    pub pending: Option<PendingTopology>,
    pub links_change_count: u64,
    pub links_last_change: Option<DateTime<Utc>>,
    pub topology_change_count: u64,
    pub topology_last_change: Option<DateTime<Utc>>,
}
