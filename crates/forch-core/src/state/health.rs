// ── Derived health ──
//
// Aggregates are computed on read from the entity counters. Nothing here
// mutates the graph.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::model::{EgressMember, Endpoint, MemberHealth, State, Summary};

use super::graph::StateGraph;

fn latest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    a.max(b)
}

impl StateGraph {
    /// Broken when any known switch is not connected.
    pub fn switch_summary(&self) -> Summary {
        if self.switches.is_empty() {
            return Summary::broken("No switches");
        }
        let down: Vec<&str> = self
            .switches
            .values()
            .filter(|sw| !sw.is_connected())
            .map(|sw| sw.name.as_str())
            .collect();
        let change_count = self.switches.values().map(|sw| sw.change_count).sum();
        let last_change = self.switches.values().filter_map(|sw| sw.last_change).max();

        let (state, detail) = if down.is_empty() {
            (State::Healthy, format!("{} switches connected", self.switches.len()))
        } else {
            (State::Broken, format!("Switches not connected: {}", down.join(", ")))
        };
        Summary {
            state,
            detail,
            change_count,
            last_change,
        }
    }

    /// Configured egress ports plus any member that reported LACP status.
    /// A configured port that never reported counts as down.
    pub(crate) fn egress_members(&self) -> BTreeMap<Endpoint, EgressMember> {
        let mut members: BTreeMap<Endpoint, EgressMember> = self
            .dps
            .egress_ports()
            .into_iter()
            .map(|endpoint| (endpoint, EgressMember::default()))
            .collect();
        for (endpoint, member) in &self.egress.members {
            members.insert(endpoint.clone(), member.clone());
        }
        members
    }

    /// `None` when there is no egress at all.
    pub fn egress_summary(&self) -> Option<Summary> {
        let members = self.egress_members();
        if members.is_empty() {
            return None;
        }

        let failed: Vec<String> = members
            .iter()
            .filter(|(_, member)| member.health() == MemberHealth::Down)
            .map(|(endpoint, _)| endpoint.to_string())
            .collect();
        let active = members
            .values()
            .filter(|member| member.health() == MemberHealth::Active)
            .count();

        let (state, detail) = if active == 0 {
            (State::Broken, "No active egress link".to_owned())
        } else if failed.is_empty() {
            (State::Healthy, format!("{active} active egress links"))
        } else {
            (State::Damaged, format!("Egress links down: {}", failed.join(", ")))
        };
        Some(Summary {
            state,
            detail,
            change_count: self.egress.change_count(),
            last_change: self.egress.last_change(),
        })
    }

    pub fn dataplane_summary(&self) -> Summary {
        let mut state = State::Healthy;
        let mut details = Vec::new();
        let mut change_count = 0;
        let mut last_change = None;

        if let Some(egress) = self.egress_summary() {
            state = state.worst(egress.state);
            if egress.state != State::Healthy {
                details.push(egress.detail);
            }
            change_count += egress.change_count;
            last_change = latest(last_change, egress.last_change);
        }

        let down: Vec<&str> = self
            .switches
            .values()
            .filter(|sw| !sw.is_connected())
            .map(|sw| sw.name.as_str())
            .collect();
        if !down.is_empty() {
            state = state.worst(State::Broken);
            details.push(format!("Switches down: {}", down.join(", ")));
        }
        for sw in self.switches.values() {
            change_count += sw.change_count;
            last_change = latest(last_change, sw.last_change);
        }

        let unhealthy: Vec<String> = self
            .links
            .values()
            .filter(|link| !link.state.is_healthy())
            .map(|link| link.key.to_string())
            .collect();
        if !unhealthy.is_empty() {
            state = state.worst(State::Damaged);
            details.push(format!("Links not up: {}", unhealthy.join(", ")));
        }
        for link in self.links.values() {
            change_count += link.change_count;
            last_change = latest(last_change, link.last_change);
        }

        let flooding: Vec<String> = self
            .vlans
            .iter()
            .filter(|(_, counters)| counters.over_threshold)
            .map(|(vid, _)| vid.to_string())
            .collect();
        if !flooding.is_empty() {
            state = state.worst(State::Broken);
            details.push(format!("VLANs over packet rate threshold: {}", flooding.join(", ")));
        }

        let topology = &self.topology;
        change_count += topology.links_change_count + topology.topology_change_count;
        last_change = latest(last_change, topology.links_last_change);
        last_change = latest(last_change, topology.topology_last_change);

        let detail = if details.is_empty() {
            "Dataplane healthy".to_owned()
        } else {
            details.join("; ")
        };
        Summary {
            state,
            detail,
            change_count,
            last_change,
        }
    }

    pub fn host_summary(&self) -> Summary {
        let last_change = self
            .hosts
            .values()
            .flat_map(|host| host.switches.values().map(|record| record.learned_at))
            .max();
        Summary {
            state: State::Healthy,
            detail: format!("{} hosts learned", self.hosts.len()),
            change_count: self.hosts_change_count,
            last_change,
        }
    }
}
