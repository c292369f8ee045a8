// ── Egress LACP group ──

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

use super::link::Endpoint;

/// Faucet's LACP actor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LacpState {
    None,
    Init,
    Up,
    NoAct,
    Unknown,
}

impl LacpState {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::None,
            1 => Self::Init,
            3 => Self::Up,
            5 => Self::NoAct,
            _ => Self::Unknown,
        }
    }
}

/// Faucet's LACP port selection role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LacpRole {
    None,
    Selected,
    Unselected,
    Standby,
    Unknown,
}

impl LacpRole {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::None,
            1 => Self::Selected,
            2 => Self::Unselected,
            3 => Self::Standby,
            _ => Self::Unknown,
        }
    }
}

/// Health of one aggregated member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MemberHealth {
    Active,
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EgressMember {
    pub state: Option<LacpState>,
    pub role: Option<LacpRole>,
    pub change_count: u64,
    pub last_change: Option<DateTime<Utc>>,
}

impl EgressMember {
    pub fn new() -> Self {
        Self {
            state: None,
            role: None,
            change_count: 0,
            last_change: None,
        }
    }

    /// Up and selected is active; up in any other role is a standby
    /// uplink; everything else has failed.
    pub fn health(&self) -> MemberHealth {
        match (self.state, self.role) {
            (Some(LacpState::Up), Some(LacpRole::Selected)) => MemberHealth::Active,
            (Some(LacpState::Up), _) => MemberHealth::Up,
            _ => MemberHealth::Down,
        }
    }
}

impl Default for EgressMember {
    fn default() -> Self {
        Self::new()
    }
}

/// Members keyed by `switch:port`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EgressGroup {
    pub members: BTreeMap<Endpoint, EgressMember>,
}

impl EgressGroup {
    pub fn member_mut(&mut self, endpoint: Endpoint) -> &mut EgressMember {
        self.members.entry(endpoint).or_default()
    }

    pub fn change_count(&self) -> u64 {
        self.members.values().map(|m| m.change_count).sum()
    }

    pub fn last_change(&self) -> Option<DateTime<Utc>> {
        self.members.values().filter_map(|m| m.last_change).max()
    }
}
