//! One-shot queries: restore from varz, answer, exit.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

use forch_core::model::{DataplaneState, HostsReply, PathReply, Summary, SwitchesState};
use forch_core::{HostPathReply, MacAddress, StateEngine};

use crate::cli::{GlobalOpts, PathCommand};
use crate::config::Session;
use crate::error::CliError;
use crate::output::{self, or_dash};

use super::answer;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Axis")]
    axis: &'static str,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Detail")]
    detail: String,
    #[tabled(rename = "Changes")]
    changes: u64,
    #[tabled(rename = "Last change")]
    last_change: String,
}

impl SummaryRow {
    fn new(axis: &'static str, summary: &Summary) -> Self {
        Self {
            axis,
            state: summary.state.to_string(),
            detail: summary.detail.clone(),
            changes: summary.change_count,
            last_change: or_dash(summary.last_change.as_ref().map(format_time)),
        }
    }
}

#[derive(Tabled)]
struct SwitchRow {
    #[tabled(rename = "Switch")]
    name: String,
    #[tabled(rename = "DP ID")]
    dp_id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Changes")]
    changes: u64,
    #[tabled(rename = "Config")]
    config: String,
    #[tabled(rename = "Ports")]
    ports: usize,
    #[tabled(rename = "Root path")]
    root_path: String,
}

#[derive(Tabled)]
struct LinkRow {
    #[tabled(rename = "Link")]
    key: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Changes")]
    changes: u64,
}

#[derive(Tabled)]
struct EgressRow {
    #[tabled(rename = "Member")]
    member: String,
    #[tabled(rename = "Health")]
    health: String,
    #[tabled(rename = "LACP")]
    lacp: String,
    #[tabled(rename = "Role")]
    role: String,
}

#[derive(Tabled)]
struct VlanRow {
    #[tabled(rename = "VLAN")]
    vid: u16,
    #[tabled(rename = "Packets")]
    packets: String,
    #[tabled(rename = "Rate (pps)")]
    rate: String,
    #[tabled(rename = "Flooding")]
    flooding: bool,
}

#[derive(Tabled)]
struct HostRow {
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Switch")]
    switch: String,
    #[tabled(rename = "Port")]
    port: String,
    #[tabled(rename = "VLAN")]
    vid: String,
    #[tabled(rename = "IPs")]
    ips: String,
    #[tabled(rename = "Access")]
    access: String,
}

#[derive(Tabled)]
struct HopRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Switch")]
    switch: String,
    #[tabled(rename = "In")]
    in_port: String,
    #[tabled(rename = "Out")]
    out_port: String,
}

#[derive(Serialize)]
struct RestoreDump {
    event_horizon: u64,
    switches: SwitchesState,
    dataplane: DataplaneState,
    hosts: HostsReply,
}

#[derive(Serialize)]
struct StatusReport {
    switches: Summary,
    dataplane: Summary,
    hosts: Summary,
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn restore(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let (engine, horizon) = session.restore().await?;
    let dump = RestoreDump {
        event_horizon: horizon,
        switches: answer("switch_state", engine.switch_state(None))?,
        dataplane: answer("dataplane_state", engine.dataplane_state())?,
        hosts: answer("list_hosts", engine.list_hosts())?,
    };
    let out = output::render(global.output, &dump, |d| {
        format!(
            "Restored up to event {}\n\n{}\n\n{}\n\n{}",
            d.event_horizon,
            switches_table(&d.switches),
            dataplane_table(&d.dataplane),
            hosts_table(&d.hosts)
        )
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn status(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let engine = session.restored_engine().await?;
    let report = StatusReport {
        switches: engine.switch_summary(),
        dataplane: engine.dataplane_summary(),
        hosts: engine.host_summary(),
    };
    let out = output::render(global.output, &report, |r| {
        output::table([
            SummaryRow::new("switches", &r.switches),
            SummaryRow::new("dataplane", &r.dataplane),
            SummaryRow::new("hosts", &r.hosts),
        ])
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn switches(
    session: &Session,
    global: &GlobalOpts,
    name: Option<&str>,
) -> Result<(), CliError> {
    let engine = session.restored_engine().await?;
    let state = answer("switch_state", engine.switch_state(name))?;
    let out = output::render(global.output, &state, switches_table)?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn dataplane(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let engine = session.restored_engine().await?;
    let state = answer("dataplane_state", engine.dataplane_state())?;
    let out = output::render(global.output, &state, dataplane_table)?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn hosts(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let engine = session.restored_engine().await?;
    let hosts = answer("list_hosts", engine.list_hosts())?;
    let out = output::render(global.output, &hosts, hosts_table)?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn path(
    session: &Session,
    global: &GlobalOpts,
    command: &PathCommand,
) -> Result<(), CliError> {
    let engine = session.restored_engine().await?;
    let out = match command {
        PathCommand::Switch { name, in_port } => {
            let reply = answer("switch_egress_path", engine.switch_egress_path(name, *in_port))?;
            output::render(global.output, &reply, path_table)?
        }
        PathCommand::Host { src, dst, to_egress } => {
            let reply = host_path(&engine, src, dst.as_deref(), *to_egress)?;
            output::render(global.output, &reply, |r| {
                let mut text = format!(
                    "{} -> {}\n",
                    or_dash(r.src_ip.as_deref()),
                    or_dash(r.dst_ip.as_deref())
                );
                text.push_str(&path_table(&r.path));
                text
            })?
        }
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

fn host_path(
    engine: &StateEngine,
    src: &str,
    dst: Option<&str>,
    to_egress: bool,
) -> Result<HostPathReply, CliError> {
    let src = MacAddress::new(src);
    let dst = dst.map(MacAddress::new);
    answer("host_path", engine.host_path(&src, dst.as_ref(), to_egress))
}

// ── Table views ─────────────────────────────────────────────────────

fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn switches_table(state: &SwitchesState) -> String {
    let rows = state.switches.values().map(|sw| SwitchRow {
        name: sw.name.clone(),
        dp_id: or_dash(sw.dp_id.map(|id| format!("{id:#x}"))),
        state: or_dash(sw.switch_state),
        changes: sw.switch_state_change_count,
        config: match &sw.config_change_type {
            Some(kind) => format!("{} ({kind})", sw.config_change_count),
            None => sw.config_change_count.to_string(),
        },
        ports: sw.ports.len(),
        root_path: sw.root_path.path_state.to_string(),
    });
    let mut text = format!("{}: {}\n", state.summary.state, state.summary.detail);
    text.push_str(&output::table(rows));
    text
}

fn dataplane_table(state: &DataplaneState) -> String {
    let mut text = output::table([SummaryRow::new("dataplane", &state.summary)]);

    let topology = &state.topology;
    let _ = write!(
        text,
        "\nStack root: {}{}\n",
        or_dash(topology.stack_root.as_deref()),
        if topology.update_pending {
            " (update pending)"
        } else {
            ""
        }
    );

    let links = state.stack_links.iter().map(|(key, link)| LinkRow {
        key: key.clone(),
        state: link.link_state.to_string(),
        changes: link.change_count,
    });
    text.push_str(&output::table(links));

    if let Some(egress) = &state.egress {
        let _ = write!(text, "\nEgress: {}: {}\n", egress.summary.state, egress.summary.detail);
        let members = egress.members.iter().map(|(member, view)| EgressRow {
            member: member.clone(),
            health: view.health.to_string(),
            lacp: or_dash(view.lacp_state),
            role: or_dash(view.lacp_role),
        });
        text.push_str(&output::table(members));
    }

    if !state.vlans.is_empty() {
        text.push('\n');
        let vlans = state.vlans.iter().map(|(vid, vlan)| VlanRow {
            vid: *vid,
            packets: format!("{:.0}", vlan.packet_count),
            rate: format!("{:.1}", vlan.packet_rate),
            flooding: vlan.over_threshold,
        });
        text.push_str(&output::table(vlans));
    }
    text
}

fn hosts_table(reply: &HostsReply) -> String {
    let rows = reply.hosts.iter().map(|(mac, host)| HostRow {
        mac: mac.to_string(),
        switch: or_dash(host.access_switch.as_deref()),
        port: or_dash(host.access_port),
        vid: or_dash(host.vid),
        ips: host.ips.join(", "),
        access: or_dash(host.auth.as_ref().and_then(|auth| auth.access.as_deref())),
    });
    output::table(rows)
}

fn path_table(reply: &PathReply) -> String {
    let mut text = match &reply.detail {
        Some(detail) => format!("{}: {detail}\n", reply.path_state),
        None => format!("{}\n", reply.path_state),
    };
    let hops = reply.path.iter().enumerate().map(|(index, hop)| HopRow {
        index,
        switch: hop.switch.clone(),
        in_port: or_dash(hop.in_port),
        out_port: or_dash(hop.out_port),
    });
    text.push_str(&output::table(hops));
    text
}
