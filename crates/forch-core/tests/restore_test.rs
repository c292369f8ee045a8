#![allow(clippy::unwrap_used)]
// Restoring from a varz snapshot must land in the same state as live
// processing of the equivalent events.

use chrono::{DateTime, TimeDelta, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

use forch_api::{MetricSnapshot, Sample};
use forch_core::model::{Endpoint, LacpRole, LacpState, LinkKey, TopologySnapshot};
use forch_core::{CoreError, DpsConfig, EngineConfig, MacAddress, State, StateEngine};

const HOST_A: &str = "0e:00:00:00:00:0a";
const HOST_B: &str = "0e:00:00:00:00:0b";

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_100, 0).unwrap()
}

fn dps() -> DpsConfig {
    serde_json::from_value(json!({
        "dps": {
            "sw1": {"dp_id": 1, "interfaces": {
                "1": {"stack": {"dp": "sw2", "port": 1}},
                "2": {"stack": {"dp": "sw3", "port": 1}},
                "28": {"lacp": 3}
            }},
            "sw2": {"dp_id": 2, "interfaces": {
                "1": {"stack": {"dp": "sw1", "port": 1}},
                "2": {"stack": {"dp": "sw3", "port": 2}},
                "10": {"native_vlan": 100}
            }},
            "sw3": {"dp_id": 3, "interfaces": {
                "1": {"stack": {"dp": "sw1", "port": 2}},
                "2": {"stack": {"dp": "sw2", "port": 2}},
                "10": {"native_vlan": 100}
            }}
        }
    }))
    .unwrap()
}

const STACK_PORTS: [(&str, u32); 6] = [
    ("sw1", 1),
    ("sw1", 2),
    ("sw2", 1),
    ("sw2", 2),
    ("sw3", 1),
    ("sw3", 2),
];

fn sample<const N: usize>(labels: [(&str, &str); N], value: f64) -> Sample {
    Sample::new(labels, value)
}

fn varz() -> MetricSnapshot {
    let mut snapshot = MetricSnapshot::new();
    for (name, id) in [("sw1", "0x1"), ("sw2", "0x2"), ("sw3", "0x3")] {
        snapshot.push("dp_status", sample([("dp_name", name), ("dp_id", id)], 1.0));
        let cold = if name == "sw1" { 1.0 } else { 0.0 };
        snapshot.push("faucet_config_reload_cold", sample([("dp_name", name), ("dp_id", id)], cold));
        snapshot.push("faucet_config_reload_warm", sample([("dp_name", name), ("dp_id", id)], 0.0));
    }
    for (name, port) in [("sw2", "10"), ("sw3", "10")] {
        snapshot.push("port_status", sample([("dp_name", name), ("port", port)], 1.0));
    }
    for (name, port) in STACK_PORTS {
        let port = port.to_string();
        snapshot.push("port_stack_state", sample([("dp_name", name), ("port", port.as_str())], 3.0));
    }
    snapshot.push("port_lacp_state", sample([("dp_name", "sw1"), ("port", "28")], 3.0));
    snapshot.push("port_lacp_role", sample([("dp_name", "sw1"), ("port", "28")], 1.0));
    snapshot.push(
        "learned_l2_port",
        sample([("dp_name", "sw2"), ("eth_src", HOST_A), ("vid", "100")], 10.0),
    );
    snapshot.push(
        "learned_l2_port",
        sample([("dp_name", "sw3"), ("eth_src", HOST_B), ("vid", "100")], 10.0),
    );
    snapshot.push("dp_root_hop_port", sample([("dp_name", "sw1")], 0.0));
    snapshot.push("dp_root_hop_port", sample([("dp_name", "sw2")], 1.0));
    snapshot.push("dp_root_hop_port", sample([("dp_name", "sw3")], 1.0));
    snapshot.push("faucet_stack_root_dpid", sample([], 1.0));
    snapshot.push("vlan_packet_count", sample([("vlan", "100")], 1234.0));
    snapshot.push("faucet_event_id", sample([], 42.0));
    snapshot
}

/// The same history, fed through the live handlers in restore order.
fn live(engine: &StateEngine, t: DateTime<Utc>) {
    for (name, id) in [("sw1", 1), ("sw2", 2), ("sw3", 3)] {
        engine.process_dp_change(t, name, Some(id), true);
    }
    engine.process_port_state(t, "sw2", 10, true);
    engine.process_port_state(t, "sw3", 10, true);
    for (name, port) in STACK_PORTS {
        engine.process_stack_state(t, name, port, 3);
    }
    engine.process_lag_state(t, "sw1", 28, Some(LacpState::Up), Some(LacpRole::Selected));
    engine.process_port_learn(t, "sw2", 10, &MacAddress::new(HOST_A), None, Some(100));
    engine.process_port_learn(t, "sw3", 10, &MacAddress::new(HOST_B), None, Some(100));
    engine.process_dp_config_change(t, "sw1", Some(1), Some("cold"), None);

    let link = |a: (&str, u32), b: (&str, u32)| LinkKey::new(Endpoint::new(a.0, a.1), Endpoint::new(b.0, b.1));
    let topology = TopologySnapshot {
        root: Some("sw1".into()),
        root_hop_ports: [("sw2".to_owned(), 1), ("sw3".to_owned(), 1)].into(),
        links: [
            link(("sw1", 1), ("sw2", 1)),
            link(("sw1", 2), ("sw3", 1)),
            link(("sw2", 2), ("sw3", 2)),
        ]
        .into(),
    };
    engine.process_stack_topo_change(t - TimeDelta::seconds(2), topology);
    assert!(engine.heartbeat_update(t));
    engine.process_vlan_metrics(t, &[sample([("vlan", "100")], 1234.0)]);
}

fn loaded_engine() -> StateEngine {
    let engine = StateEngine::new(EngineConfig::default());
    engine.process_dataplane_config_change(now(), dps());
    engine
}

#[test]
fn test_restore_matches_live_processing() {
    let restored = loaded_engine();
    let horizon = restored.restore_states_from_metrics(&varz(), now()).unwrap();
    restored.set_state_restored(true, None);
    assert_eq!(horizon, 42);

    let processed = loaded_engine();
    live(&processed, now());
    processed.set_state_restored(true, None);

    let dump = |engine: &StateEngine| {
        json!({
            "switches": serde_json::to_value(engine.switch_state(None).into_ready().unwrap()).unwrap(),
            "dataplane": serde_json::to_value(engine.dataplane_state().into_ready().unwrap()).unwrap(),
            "hosts": serde_json::to_value(engine.list_hosts().into_ready().unwrap()).unwrap(),
        })
    };
    assert_eq!(dump(&restored), dump(&processed));

    let summary = restored.dataplane_summary();
    assert_eq!(summary.state, State::Healthy, "{}", summary.detail);
}

#[test]
fn test_restore_replaces_previous_state() {
    let engine = loaded_engine();
    engine.process_port_learn(now(), "sw2", 10, &MacAddress::new("0e:00:00:00:00:99"), None, None);
    engine.restore_states_from_metrics(&varz(), now()).unwrap();
    engine.set_state_restored(true, None);

    let hosts = engine.list_hosts().into_ready().unwrap().hosts;
    let macs: Vec<String> = hosts.keys().map(ToString::to_string).collect();
    assert_eq!(macs, vec![HOST_A.to_owned(), HOST_B.to_owned()]);
}

#[test]
fn test_missing_required_metric_fails_restore() {
    let mut snapshot = MetricSnapshot::new();
    for (metric, samples) in [("dp_status", vec![]), ("port_status", vec![])] {
        snapshot.insert(metric, samples);
    }
    let engine = loaded_engine();
    let err = engine.restore_states_from_metrics(&snapshot, now()).unwrap_err();
    assert!(matches!(err, CoreError::MissingMetric { ref metric } if metric == "port_stack_state"));
    assert!(!engine.is_restored());
    assert!(engine.switch_summary().detail.contains("port_stack_state"));
}

#[test]
fn test_malformed_sample_is_skipped() {
    let mut snapshot = varz();
    snapshot.push("port_status", sample([("dp_name", "sw2"), ("port", "ten")], 0.0));
    snapshot.push("port_status", sample([("port", "10")], 0.0));
    let engine = loaded_engine();
    let horizon = engine.restore_states_from_metrics(&snapshot, now()).unwrap();
    engine.set_state_restored(true, None);
    assert_eq!(horizon, 42);

    let switches = engine.switch_state(None).into_ready().unwrap().switches;
    assert_eq!(switches["sw2"].ports[&10].status_up, Some(true));
    assert_eq!(switches.len(), 3);
}

#[test]
fn test_restore_without_event_id_fails() {
    let mut snapshot = varz();
    snapshot.insert("faucet_event_id", vec![]);
    let engine = loaded_engine();
    let err = engine.restore_states_from_metrics(&snapshot, now()).unwrap_err();
    assert!(matches!(err, CoreError::InvalidSample { ref metric, .. } if metric == "faucet_event_id"));
}
