// ── Static port attributes ──
//
// The Faucet `dps` configuration, reduced to what state tracking needs:
// every configured port gets a type (access, stack, egress, sequester),
// stack ports get their peer, and access ports their native VLAN. These
// are immutable once loaded; events never change them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::model::{Endpoint, LinkKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PortType {
    Access,
    Stack,
    Egress,
    Sequester,
}

// ── Faucet config shape ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DpsConfig {
    #[serde(default)]
    pub dps: BTreeMap<String, DpConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DpConfig {
    #[serde(default)]
    pub dp_id: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub interfaces: BTreeMap<InterfaceKey, InterfaceConfig>,
    /// Keys like `"1-10"` or `"1,3,5-7"`.
    #[serde(default)]
    pub interface_ranges: BTreeMap<String, InterfaceConfig>,
}

/// Interfaces are keyed by number or by name (with a `number` field).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(untagged)]
pub enum InterfaceKey {
    Number(u32),
    Name(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InterfaceConfig {
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub native_vlan: Option<VlanRef>,
    #[serde(default)]
    pub stack: Option<StackPeerConfig>,
    #[serde(default)]
    pub lacp: Option<u32>,
    #[serde(default)]
    pub loop_protect_external: Option<bool>,
    #[serde(default)]
    pub output_only: Option<bool>,
    #[serde(default)]
    pub acls_in: Vec<String>,
    #[serde(default)]
    pub acl_in: Option<String>,
}

/// Faucet accepts a VLAN id or a VLAN name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum VlanRef {
    Id(u16),
    Name(String),
}

impl fmt::Display for VlanRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StackPeerConfig {
    pub dp: String,
    pub port: u32,
}

// ── Resolved attributes ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortAttributes {
    pub port_type: PortType,
    pub description: Option<String>,
    pub native_vlan: Option<String>,
    pub stack_peer: Option<Endpoint>,
    pub acls: Vec<String>,
}

impl InterfaceConfig {
    fn port_type(&self) -> PortType {
        if self.stack.is_some() {
            PortType::Stack
        } else if self.lacp.is_some() || self.loop_protect_external == Some(true) {
            PortType::Egress
        } else if self.output_only == Some(true) {
            PortType::Sequester
        } else {
            PortType::Access
        }
    }

    fn attributes(&self) -> PortAttributes {
        let mut acls = self.acls_in.clone();
        acls.extend(self.acl_in.iter().cloned());
        PortAttributes {
            port_type: self.port_type(),
            description: self.description.clone(),
            native_vlan: self.native_vlan.as_ref().map(ToString::to_string),
            stack_peer: self
                .stack
                .as_ref()
                .map(|peer| Endpoint::new(peer.dp.clone(), peer.port)),
            acls,
        }
    }
}

impl DpConfig {
    fn interface(&self, port: u32) -> Option<&InterfaceConfig> {
        self.interfaces
            .iter()
            .find(|(key, iface)| interface_number(key, iface) == Some(port))
            .map(|(_, iface)| iface)
    }

    fn interface_range(&self, port: u32) -> Option<&InterfaceConfig> {
        self.interface_ranges
            .iter()
            .find(|(spec, _)| range_contains(spec, port))
            .map(|(_, iface)| iface)
    }

    /// Every explicitly numbered interface.
    fn numbered_interfaces(&self) -> impl Iterator<Item = (u32, &InterfaceConfig)> {
        self.interfaces
            .iter()
            .filter_map(|(key, iface)| interface_number(key, iface).map(|n| (n, iface)))
    }
}

impl DpsConfig {
    /// Explicit interfaces win over ranges; unknown ports have none.
    pub fn port_attributes(&self, switch: &str, port: u32) -> Option<PortAttributes> {
        let dp = self.dps.get(switch)?;
        dp.interface(port)
            .or_else(|| dp.interface_range(port))
            .map(InterfaceConfig::attributes)
    }

    pub fn port_type(&self, switch: &str, port: u32) -> Option<PortType> {
        self.port_attributes(switch, port).map(|attr| attr.port_type)
    }

    pub fn switch_description(&self, switch: &str) -> Option<&str> {
        self.dps.get(switch)?.description.as_deref()
    }

    pub fn switch_name_by_id(&self, dp_id: u64) -> Option<&str> {
        self.dps
            .iter()
            .find(|(_, dp)| dp.dp_id == Some(dp_id))
            .map(|(name, _)| name.as_str())
    }

    /// Links implied by `stack` entries, deduplicated.
    pub fn stack_links(&self) -> BTreeSet<LinkKey> {
        let mut links = BTreeSet::new();
        for (name, dp) in &self.dps {
            for (port, iface) in dp.numbered_interfaces() {
                if let Some(peer) = &iface.stack {
                    links.insert(LinkKey::new(
                        Endpoint::new(name.clone(), port),
                        Endpoint::new(peer.dp.clone(), peer.port),
                    ));
                }
            }
        }
        links
    }

    /// All egress-typed ports, in switch then port order.
    pub fn egress_ports(&self) -> Vec<Endpoint> {
        let mut ports = Vec::new();
        for (name, dp) in &self.dps {
            for (port, iface) in dp.numbered_interfaces() {
                if iface.port_type() == PortType::Egress {
                    ports.push(Endpoint::new(name.clone(), port));
                }
            }
        }
        ports.sort();
        ports
    }
}

fn interface_number(key: &InterfaceKey, iface: &InterfaceConfig) -> Option<u32> {
    iface.number.or(match key {
        InterfaceKey::Number(n) => Some(*n),
        InterfaceKey::Name(name) => name.trim().parse().ok(),
    })
}

/// Does a range spec like `"1-10,12"` cover `port`?
fn range_contains(spec: &str, port: u32) -> bool {
    spec.split(',').any(|part| {
        let part = part.trim();
        match part.split_once('-') {
            Some((start, end)) => match (start.trim().parse::<u32>(), end.trim().parse::<u32>()) {
                (Ok(start), Ok(end)) => (start..=end).contains(&port),
                _ => false,
            },
            None => part.parse::<u32>() == Ok(port),
        }
    })
}

// ── Tests ────────────────────────────────────────────────────────────
