// ── Topology coalescing & link derivation ──
//
// Topology announcements are staged and applied from the heartbeat. Link
// state is recomputed from scratch whenever one of its inputs changes
// (applied snapshot, stack port states, static config), so the result
// never depends on arrival order. Until a staged snapshot is applied,
// links keep reflecting the previously applied one.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use crate::model::{Link, LinkKey, LinkState, PendingTopology, StackPortState, TopologySnapshot};

use super::graph::StateGraph;

impl StateGraph {
    /// Stage the latest announcement; older staged ones are superseded.
    pub fn process_stack_topo_change(&mut self, now: DateTime<Utc>, snapshot: TopologySnapshot) {
        match &mut self.topology.pending {
            Some(pending) => pending.snapshot = snapshot,
            None => {
                self.topology.pending = Some(PendingTopology {
                    snapshot,
                    first_received: now,
                });
            }
        }
        debug!("stack topology update staged");
    }

    /// Apply the staged snapshot once the last applied change is older than
    /// the coalescing window (or nothing was applied yet), or once the
    /// oldest superseded announcement is older than twice the window.
    /// Returns whether anything changed.
    pub fn heartbeat_update(&mut self, now: DateTime<Utc>) -> bool {
        let window = TimeDelta::from_std(self.config.coalesce_window).unwrap_or(TimeDelta::MAX);
        let Some(pending) = &self.topology.pending else {
            return false;
        };

        let settled = self
            .topology
            .last_applied
            .is_none_or(|last| now - last > window);
        let overdue = now - pending.first_received > window.checked_mul(2).unwrap_or(TimeDelta::MAX);
        if !settled && !overdue {
            return false;
        }

        let Some(pending) = self.topology.pending.take() else {
            return false;
        };
        if overdue && !settled {
            debug!("applying continuously refreshed topology update");
        }
        self.apply_topology(now, pending.snapshot)
    }

    /// Make `snapshot` the applied topology. An identical snapshot is a
    /// no-op: no link is touched and no counter moves.
    pub(crate) fn apply_topology(&mut self, now: DateTime<Utc>, snapshot: TopologySnapshot) -> bool {
        let hash = snapshot.content_hash();
        if self.topology.applied_hash == Some(hash) {
            debug!(hash, "stack topology unchanged");
            return false;
        }

        let applied = &self.topology.applied;
        let links_changed = applied.links != snapshot.links;
        let topology_changed =
            applied.root != snapshot.root || applied.root_hop_ports != snapshot.root_hop_ports;

        let topology = &mut self.topology;
        if links_changed {
            topology.links_change_count += 1;
            topology.links_last_change = Some(now);
        }
        if topology_changed {
            topology.topology_change_count += 1;
            topology.topology_last_change = Some(now);
        }
        info!(
            root = snapshot.root.as_deref().unwrap_or(""),
            links = snapshot.links.len(),
            links_changed,
            topology_changed,
            "stack topology applied"
        );
        topology.applied = snapshot;
        topology.applied_hash = Some(hash);
        topology.last_applied = Some(now);

        self.refresh_links(now);
        true
    }

    /// Recompute every known link's derived state.
    pub(crate) fn refresh_links(&mut self, now: DateTime<Utc>) {
        let mut keys: BTreeSet<LinkKey> = self.dps.stack_links();
        keys.extend(self.topology.applied.links.iter().cloned());
        keys.extend(self.links.keys().cloned());

        for key in keys {
            let state = self.derive_link_state(&key);
            let link = self
                .links
                .entry(key.clone())
                .or_insert_with(|| Link::new(key));
            if link.state != state {
                debug!(link = %link.key, from = %link.state, to = %state, "link state changed");
                link.state = state;
                link.change_count += 1;
                link.last_change = Some(now);
            }
        }
    }

    pub(crate) fn derive_link_state(&self, key: &LinkKey) -> LinkState {
        let states = key.endpoints().map(|endpoint| self.stack_state(endpoint));
        if states.contains(&Some(StackPortState::Bad)) {
            return LinkState::Broken;
        }

        let applied = &self.topology.applied;
        let in_graph = applied.links.contains(key);
        let both_up = states.iter().all(|s| *s == Some(StackPortState::Up));
        if !in_graph && !both_up {
            return LinkState::Down;
        }

        let on_root_path = key
            .endpoints()
            .iter()
            .any(|endpoint| applied.root_hop_port(&endpoint.switch) == Some(endpoint.port));
        if on_root_path {
            LinkState::Active
        } else {
            LinkState::Up
        }
    }
}
