// ── Forwarding paths ──

use std::collections::HashSet;

use crate::attributes::PortType;
use crate::error::CoreError;
use crate::model::{HostPathReply, MacAddress, MemberHealth, PathHop, PathReply};

use super::graph::StateGraph;

pub const LOOP_DETAIL: &str = "No path to root found. Loop in topology.";
pub const ROOT_ABSENT_DETAIL: &str = "No path to root found. Root absent in topology.";

/// Longest host-to-host walk before it counts as a forwarding loop.
const MAX_HOST_HOPS: usize = 5;

impl StateGraph {
    /// Walk root-hop-ports from `switch` to the root over the applied link
    /// graph. `in_port` becomes the first hop's ingress. Partial paths are
    /// returned with broken results.
    pub fn path_to_egress(&self, switch: &str, in_port: Option<u32>) -> PathReply {
        let topology = &self.topology.applied;
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        let mut current = switch.to_owned();
        let mut ingress = in_port;

        loop {
            let Some(out) = topology.root_hop_port(&current) else {
                if topology.is_root(&current) {
                    path.push(PathHop::new(current, ingress, self.root_egress_port()));
                    return PathReply::healthy(path);
                }
                return PathReply::broken(ROOT_ABSENT_DETAIL, path);
            };

            if !visited.insert((current.clone(), ingress, out)) {
                return PathReply::broken(LOOP_DETAIL, path);
            }
            path.push(PathHop::new(current.clone(), ingress, Some(out)));

            let Some(peer) = topology
                .links
                .iter()
                .find_map(|link| link.peer_of(&current, out))
            else {
                return PathReply::broken(ROOT_ABSENT_DETAIL, path);
            };
            current.clone_from(&peer.switch);
            ingress = Some(peer.port);
        }
    }

    /// Egress port on the root: an active LACP member, else one that is
    /// up, else the first configured egress port.
    pub(crate) fn root_egress_port(&self) -> Option<u32> {
        let root = self.topology.applied.root.as_deref()?;
        let on_root: Vec<_> = self
            .egress
            .members
            .iter()
            .filter(|(endpoint, _)| endpoint.switch == root)
            .collect();

        [MemberHealth::Active, MemberHealth::Up]
            .into_iter()
            .find_map(|wanted| {
                on_root
                    .iter()
                    .find(|(_, member)| member.health() == wanted)
                    .map(|(endpoint, _)| endpoint.port)
            })
            .or_else(|| {
                self.dps
                    .egress_ports()
                    .into_iter()
                    .find(|endpoint| endpoint.switch == root)
                    .map(|endpoint| endpoint.port)
            })
    }

    /// Switch and port where `mac` is learned on an access port.
    pub(crate) fn access_point(&self, mac: &MacAddress) -> Option<(&str, u32)> {
        let host = self.hosts.get(mac)?;
        host.switches
            .iter()
            .find(|(switch, record)| self.port_type(switch, record.port) == Some(PortType::Access))
            .map(|(switch, record)| (switch.as_str(), record.port))
    }

    /// Path between two learned hosts over configured stack peers, or the
    /// source's path to egress when there is no destination.
    pub fn host_path(
        &self,
        src: &MacAddress,
        dst: Option<&MacAddress>,
        to_egress: bool,
    ) -> Result<HostPathReply, CoreError> {
        let src_host = self.hosts.get(src).ok_or_else(|| CoreError::HostNotFound {
            mac: src.to_string(),
        })?;
        let (src_switch, src_port) = self.access_point(src).ok_or_else(|| CoreError::Consistency {
            message: format!("{src} is not learned on an access port"),
        })?;
        let src_ip = src_host.ips.iter().next().cloned();

        let dst = match dst {
            Some(dst) if !to_egress => dst,
            _ => {
                return Ok(HostPathReply {
                    src_ip,
                    dst_ip: None,
                    path: self.path_to_egress(src_switch, Some(src_port)),
                });
            }
        };

        let dst_host = self.hosts.get(dst).ok_or_else(|| CoreError::HostNotFound {
            mac: dst.to_string(),
        })?;
        let (dst_switch, dst_port) = self.access_point(dst).ok_or_else(|| CoreError::Consistency {
            message: format!("{dst} is not learned on an access port"),
        })?;
        let dst_ip = dst_host.ips.iter().next().cloned();

        let mut path = Vec::new();
        let mut current = src_switch.to_owned();
        let mut ingress = Some(src_port);
        let reply = loop {
            if path.len() >= MAX_HOST_HOPS {
                break PathReply::broken(
                    format!("Forwarding loop: {dst} not reached within {MAX_HOST_HOPS} hops"),
                    path,
                );
            }
            let Some(out) = dst_host.switches.get(&current).map(|record| record.port) else {
                break PathReply::broken(format!("{dst} not learned on {current}"), path);
            };
            path.push(PathHop::new(current.clone(), ingress, Some(out)));

            if current == dst_switch {
                if out == dst_port {
                    break PathReply::healthy(path);
                }
                break PathReply::broken(
                    format!("{dst} learned on {current}:{out}, expected access port {dst_port}"),
                    path,
                );
            }

            let peer = self
                .dps
                .port_attributes(&current, out)
                .filter(|attr| attr.port_type == PortType::Stack)
                .and_then(|attr| attr.stack_peer);
            let Some(peer) = peer else {
                break PathReply::broken(format!("{current}:{out} is not a stack port"), path);
            };
            current = peer.switch;
            ingress = Some(peer.port);
        };

        Ok(HostPathReply {
            src_ip,
            dst_ip,
            path: reply,
        })
    }
}
