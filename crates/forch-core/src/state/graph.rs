// ── State graph & event handlers ──
//
// `StateGraph` owns every tracked entity. Handlers take `&mut self` and
// are only ever called with the engine lock held. Each one is idempotent
// where the input allows: replaying the same state changes no counter.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use forch_api::Sample;

use crate::attributes::{DpsConfig, PortType};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::model::{
    AuthResult, EgressGroup, Endpoint, LacpRole, LacpState, LearnRecord, LearnedHost, Link,
    LinkKey, MacAddress, StackPortState, Switch, SwitchStatus, TopologyState, VlanCounters,
};

use super::callbacks::{DevicePlacement, Notification};

/// Detail reported while no restore has completed.
pub(crate) const NOT_RESTORED: &str = "State not restored";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RestoreStatus {
    pub restored: bool,
    pub detail: String,
}

impl Default for RestoreStatus {
    fn default() -> Self {
        Self {
            restored: false,
            detail: NOT_RESTORED.to_owned(),
        }
    }
}

#[derive(Debug, Default)]
pub struct StateGraph {
    pub(crate) config: EngineConfig,
    pub(crate) dps: DpsConfig,
    pub(crate) switches: BTreeMap<String, Switch>,
    pub(crate) links: BTreeMap<LinkKey, Link>,
    pub(crate) topology: TopologyState,
    pub(crate) egress: EgressGroup,
    pub(crate) hosts: BTreeMap<MacAddress, LearnedHost>,
    pub(crate) hosts_change_count: u64,
    pub(crate) vlans: BTreeMap<u16, VlanCounters>,
    pub(crate) restore: RestoreStatus,
    pub(crate) notifications: Vec<Notification>,
}

impl StateGraph {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Drop all dynamic state, keeping configuration.
    pub(crate) fn reset(&mut self) {
        let config = std::mem::take(&mut self.config);
        let dps = std::mem::take(&mut self.dps);
        let restore = std::mem::take(&mut self.restore);
        *self = Self {
            config,
            dps,
            restore,
            ..Self::default()
        };
    }

    pub(crate) fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub(crate) fn switch_mut(&mut self, name: &str) -> &mut Switch {
        self.switches
            .entry(name.to_owned())
            .or_insert_with(|| Switch::new(name))
    }

    pub(crate) fn port_type(&self, switch: &str, port: u32) -> Option<PortType> {
        self.dps.port_type(switch, port)
    }

    pub(crate) fn stack_state(&self, endpoint: &Endpoint) -> Option<StackPortState> {
        self.switches
            .get(&endpoint.switch)?
            .ports
            .get(&endpoint.port)?
            .stack_state
    }

    // ── Ports ───────────────────────────────────────────────────────

    pub fn process_port_state(&mut self, now: DateTime<Utc>, name: &str, port: u32, up: bool) {
        let entry = self.switch_mut(name).port_mut(port);
        if entry.up == Some(up) {
            debug!(switch = name, port, up, "port state unchanged");
            return;
        }
        entry.up = Some(up);
        entry.change_count += 1;
        entry.last_change = Some(now);
        debug!(switch = name, port, up, "port state changed");

        self.notifications.push(Notification::PortState {
            switch: name.to_owned(),
            port,
            up,
        });

        if !up && self.port_type(name, port) == Some(PortType::Access) {
            self.expire_port_hosts(name, port);
        }
    }

    /// An access port went down: everything learned behind it is gone.
    fn expire_port_hosts(&mut self, name: &str, port: u32) {
        let macs: Vec<MacAddress> = self
            .switches
            .get(name)
            .and_then(|sw| sw.ports.get(&port))
            .map(|p| p.learned_macs.iter().cloned().collect())
            .unwrap_or_default();

        if macs.is_empty() {
            self.notifications.push(Notification::Placement {
                mac: None,
                placement: DevicePlacement {
                    switch: name.to_owned(),
                    port,
                    connected: false,
                },
            });
            return;
        }
        for mac in macs {
            self.expire_host(&mac, name);
        }
    }

    // ── Hosts ───────────────────────────────────────────────────────

    pub fn process_port_learn(
        &mut self,
        now: DateTime<Utc>,
        name: &str,
        port: u32,
        mac: &MacAddress,
        ip: Option<&str>,
        vid: Option<u16>,
    ) {
        let is_access = self.port_type(name, port) == Some(PortType::Access);

        if is_access {
            let stale: Vec<MacAddress> = self
                .switches
                .get(name)
                .and_then(|sw| sw.ports.get(&port))
                .map(|p| p.learned_macs.iter().filter(|m| *m != mac).cloned().collect())
                .unwrap_or_default();
            for other in stale {
                info!(switch = name, port, stale = %other, new = %mac, "expiring stale host placement");
                self.expire_host(&other, name);
            }
        }

        let host = self.hosts.entry(mac.clone()).or_default();
        let previous = host.switches.insert(
            name.to_owned(),
            LearnRecord {
                port,
                learned_at: now,
            },
        );
        if let Some(ip) = ip.filter(|ip| !ip.is_empty()) {
            host.ips.insert(ip.to_owned());
        }
        let reassigned = match vid {
            Some(vid) if host.vid != Some(vid) => {
                let moved = host.vid.is_some();
                host.vid = Some(vid);
                moved.then_some(vid)
            }
            _ => None,
        };

        let moved_from = previous.as_ref().map(|record| record.port).filter(|p| *p != port);
        if previous.is_none() || moved_from.is_some() {
            self.hosts_change_count += 1;
        }
        let switch = self.switch_mut(name);
        if let Some(old_port) = moved_from {
            switch.port_mut(old_port).learned_macs.remove(mac);
        }
        switch.port_mut(port).learned_macs.insert(mac.clone());
        debug!(switch = name, port, mac = %mac, "host learned");

        if let Some(vid) = reassigned {
            self.notifications.push(Notification::PortAssign {
                mac: mac.clone(),
                vid,
            });
        }
        if is_access {
            self.notifications.push(Notification::Placement {
                mac: Some(mac.clone()),
                placement: DevicePlacement {
                    switch: name.to_owned(),
                    port,
                    connected: true,
                },
            });
            self.notifications.push(Notification::PortLearn {
                switch: name.to_owned(),
                port,
                mac: mac.clone(),
            });
        }
    }

    pub fn process_port_expire(&mut self, name: &str, port: u32, mac: &MacAddress) {
        let learned_port = self
            .hosts
            .get(mac)
            .and_then(|host| host.switches.get(name))
            .map(|record| record.port);
        match learned_port {
            Some(learned) if learned == port => self.expire_host(mac, name),
            Some(learned) => {
                debug!(switch = name, port, learned, mac = %mac, "ignoring expiry for moved host");
            }
            None => debug!(switch = name, port, mac = %mac, "ignoring expiry for unknown host"),
        }
    }

    /// Remove `mac`'s record on `name`; drop the host once no switch has it.
    pub(crate) fn expire_host(&mut self, mac: &MacAddress, name: &str) {
        let Some(host) = self.hosts.get_mut(mac) else {
            return;
        };
        let Some(record) = host.switches.remove(name) else {
            return;
        };
        if host.switches.is_empty() {
            self.hosts.remove(mac);
        }
        self.hosts_change_count += 1;

        if let Some(port) = self
            .switches
            .get_mut(name)
            .and_then(|sw| sw.ports.get_mut(&record.port))
        {
            port.learned_macs.remove(mac);
        }
        debug!(switch = name, port = record.port, mac = %mac, "host expired");

        if self.port_type(name, record.port) == Some(PortType::Access) {
            self.notifications.push(Notification::Placement {
                mac: Some(mac.clone()),
                placement: DevicePlacement {
                    switch: name.to_owned(),
                    port: record.port,
                    connected: false,
                },
            });
        }
    }

    pub fn process_auth_result(&mut self, mac: &MacAddress, result: AuthResult) -> Result<(), CoreError> {
        let host = self.hosts.get_mut(mac).ok_or_else(|| CoreError::HostNotFound {
            mac: mac.to_string(),
        })?;
        host.auth = Some(result);
        Ok(())
    }

    // ── Egress ──────────────────────────────────────────────────────

    /// `None` leaves that half of the LACP status as it was.
    pub fn process_lag_state(
        &mut self,
        now: DateTime<Utc>,
        name: &str,
        port: u32,
        state: Option<LacpState>,
        role: Option<LacpRole>,
    ) {
        let member = self.egress.member_mut(Endpoint::new(name, port));
        let next_state = state.or(member.state);
        let next_role = role.or(member.role);
        if member.state == next_state && member.role == next_role {
            return;
        }
        member.state = next_state;
        member.role = next_role;
        member.change_count += 1;
        member.last_change = Some(now);
        debug!(switch = name, port, state = ?next_state, role = ?next_role, "lacp state changed");
    }

    // ── Stack ───────────────────────────────────────────────────────

    pub fn process_stack_state(&mut self, now: DateTime<Utc>, name: &str, port: u32, code: i64) {
        let Some(state) = StackPortState::from_code(code) else {
            warn!(switch = name, port, code, "unknown stack port state");
            return;
        };
        let entry = self.switch_mut(name).port_mut(port);
        if entry.stack_state == Some(state) {
            return;
        }
        entry.stack_state = Some(state);
        debug!(switch = name, port, %state, "stack port state changed");
        self.refresh_links(now);
    }

    // ── Datapaths ───────────────────────────────────────────────────

    pub fn process_dp_change(&mut self, now: DateTime<Utc>, name: &str, dp_id: Option<u64>, connected: bool) {
        let switch = self.switch_mut(name);
        if dp_id.is_some() {
            switch.dp_id = dp_id;
        }
        let status = if connected {
            SwitchStatus::Connected
        } else {
            SwitchStatus::Down
        };
        if switch.status == Some(status) {
            return;
        }
        switch.status = Some(status);
        switch.change_count += 1;
        switch.last_change = Some(now);
        info!(switch = name, %status, "switch connectivity changed");
    }

    pub fn process_dp_config_change(
        &mut self,
        now: DateTime<Utc>,
        name: &str,
        dp_id: Option<u64>,
        restart_type: Option<&str>,
        config_hashes: Option<&str>,
    ) {
        let switch = self.switch_mut(name);
        if dp_id.is_some() {
            switch.dp_id = dp_id;
        }
        switch.config_change_count += 1;
        switch.config_change_type = restart_type.map(str::to_owned);
        switch.config_change_time = Some(now);
        if let Some(hashes) = config_hashes {
            switch.config_hashes = Some(hashes.to_owned());
        }
        info!(switch = name, restart_type, count = switch.config_change_count, "switch config reloaded");
    }

    /// New static configuration. Link derivation depends on it.
    pub fn process_dataplane_config_change(&mut self, now: DateTime<Utc>, dps: DpsConfig) {
        info!(switches = dps.dps.len(), "dataplane config loaded");
        self.dps = dps;
        self.refresh_links(now);
    }

    // ── VLANs ───────────────────────────────────────────────────────

    pub fn process_vlan_metrics(&mut self, now: DateTime<Utc>, samples: &[Sample]) {
        let threshold = self.config.vlan_packet_rate_threshold;
        for sample in samples {
            let Some(vid) = sample.label("vlan").and_then(|v| v.parse::<u16>().ok()) else {
                warn!(labels = ?sample.labels, "vlan sample without usable vlan label");
                continue;
            };
            match self.vlans.get_mut(&vid) {
                Some(counters) => {
                    let was_over = counters.over_threshold;
                    counters.update(sample.value, now, threshold);
                    if counters.over_threshold != was_over {
                        info!(vlan = vid, rate = counters.packet_rate, over = counters.over_threshold, "vlan packet rate threshold crossed");
                    }
                }
                None => {
                    self.vlans.insert(vid, VlanCounters::first(sample.value, now));
                }
            }
        }
    }
}
