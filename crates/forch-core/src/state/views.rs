// ── Query views ──

use std::collections::BTreeMap;

use crate::error::CoreError;
use crate::model::{
    DataplaneState, EgressMemberView, EgressView, HostEntry, HostsReply, LinkView, PortView,
    Switch, SwitchDetail, SwitchesState, TopologyView, VlanView,
};

use super::graph::StateGraph;

impl StateGraph {
    fn switch_detail(&self, switch: &Switch) -> SwitchDetail {
        let ports = switch
            .ports
            .iter()
            .map(|(number, port)| {
                let attr = self.dps.port_attributes(&switch.name, *number);
                let view = PortView {
                    status_up: port.up,
                    status_count: port.change_count,
                    status_timestamp: port.last_change,
                    port_type: attr.as_ref().map(|a| a.port_type),
                    description: attr.as_ref().and_then(|a| a.description.clone()),
                    stack_peer: attr
                        .as_ref()
                        .and_then(|a| a.stack_peer.as_ref())
                        .map(ToString::to_string),
                    stack_state: port.stack_state,
                    learned_macs: port.learned_macs.iter().cloned().collect(),
                };
                (*number, view)
            })
            .collect();

        SwitchDetail {
            name: switch.name.clone(),
            dp_id: switch.dp_id,
            description: self.dps.switch_description(&switch.name).map(str::to_owned),
            switch_state: switch.status,
            switch_state_change_count: switch.change_count,
            switch_state_last_change: switch.last_change,
            config_change_count: switch.config_change_count,
            config_change_type: switch.config_change_type.clone(),
            config_change_timestamp: switch.config_change_time,
            ports,
            root_path: self.path_to_egress(&switch.name, None),
        }
    }

    /// Every switch, or only `name` when given.
    pub fn switches_state(&self, name: Option<&str>) -> Result<SwitchesState, CoreError> {
        let switches = match name {
            Some(name) => {
                let switch = self
                    .switches
                    .get(name)
                    .ok_or_else(|| CoreError::SwitchNotFound { name: name.to_owned() })?;
                BTreeMap::from([(switch.name.clone(), self.switch_detail(switch))])
            }
            None => self
                .switches
                .values()
                .map(|switch| (switch.name.clone(), self.switch_detail(switch)))
                .collect(),
        };
        Ok(SwitchesState {
            summary: self.switch_summary(),
            switches,
        })
    }

    fn egress_view(&self) -> Option<EgressView> {
        let summary = self.egress_summary()?;
        let members = self
            .egress_members()
            .into_iter()
            .map(|(endpoint, member)| {
                let view = EgressMemberView {
                    lacp_state: member.state,
                    lacp_role: member.role,
                    health: member.health(),
                    change_count: member.change_count,
                };
                (endpoint.to_string(), view)
            })
            .collect();
        Some(EgressView { summary, members })
    }

    pub fn dataplane_state(&self) -> DataplaneState {
        let topology = &self.topology;
        DataplaneState {
            summary: self.dataplane_summary(),
            switches: self
                .switches
                .values()
                .map(|sw| (sw.name.clone(), sw.status))
                .collect(),
            stack_links: self
                .links
                .values()
                .map(|link| {
                    let (a, b) = (link.key.a(), link.key.b());
                    let view = LinkView {
                        switch_a: a.switch.clone(),
                        port_a: a.port,
                        switch_b: b.switch.clone(),
                        port_b: b.port,
                        link_state: link.state,
                        change_count: link.change_count,
                        last_change: link.last_change,
                    };
                    (link.key.to_string(), view)
                })
                .collect(),
            topology: TopologyView {
                stack_root: topology.applied.root.clone(),
                root_hop_ports: topology.applied.root_hop_ports.clone(),
                links_change_count: topology.links_change_count,
                links_last_change: topology.links_last_change,
                topology_change_count: topology.topology_change_count,
                topology_last_change: topology.topology_last_change,
                update_pending: topology.pending.is_some(),
            },
            egress: self.egress_view(),
            vlans: self
                .vlans
                .iter()
                .map(|(vid, counters)| {
                    let view = VlanView {
                        packet_count: counters.packet_count,
                        packet_rate: counters.packet_rate,
                        over_threshold: counters.over_threshold,
                    };
                    (*vid, view)
                })
                .collect(),
        }
    }

    pub fn hosts(&self) -> HostsReply {
        let hosts = self
            .hosts
            .iter()
            .map(|(mac, host)| {
                let access = self.access_point(mac);
                let entry = HostEntry {
                    access_switch: access.map(|(switch, _)| switch.to_owned()),
                    access_port: access.map(|(_, port)| port),
                    ips: host.ips.iter().cloned().collect(),
                    vid: host.vid,
                    auth: host.auth.clone(),
                    switches: host.switches.clone(),
                };
                (mac.clone(), entry)
            })
            .collect();
        HostsReply { hosts }
    }
}
