use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{Display, EnumString};

use super::host::MacAddress;
use super::topology::StackPortState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SwitchStatus {
    Connected,
    Down,
}

/// One datapath. Created on first reference, never removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Switch {
    pub name: String,
    pub dp_id: Option<u64>,
    /// `None` until the controller reports connectivity.
    pub status: Option<SwitchStatus>,
    pub change_count: u64,
    pub last_change: Option<DateTime<Utc>>,
    pub config_change_count: u64,
    pub config_change_type: Option<String>,
    pub config_change_time: Option<DateTime<Utc>>,
    pub config_hashes: Option<String>,
    pub ports: BTreeMap<u32, Port>,
}

impl Switch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == Some(SwitchStatus::Connected)
    }

    pub fn port_mut(&mut self, port: u32) -> &mut Port {
        self.ports.entry(port).or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Port {
    /// `None` until the first status report.
    pub up: Option<bool>,
    pub change_count: u64,
    pub last_change: Option<DateTime<Utc>>,
    pub stack_state: Option<StackPortState>,
    pub learned_macs: BTreeSet<MacAddress>,
}
