#![allow(clippy::unwrap_used)]
// Orchestrator restore and event loop against a mock varz endpoint and a
// local event socket.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::time::{sleep, timeout};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use forch_api::{EventIngestor, IngestConfig};
use forch_core::{EngineConfig, MacAddress, Orchestrator, OrchestratorConfig, State, StateEngine};

const VARZ_BODY: &str = r#"
# TYPE dp_status gauge
dp_status{dp_id="0x1",dp_name="sw1"} 1
dp_status{dp_id="0x2",dp_name="sw2"} 1
dp_status{dp_id="0x3",dp_name="sw3"} 1
port_status{dp_id="0x2",dp_name="sw2",port="10"} 1
port_status{dp_id="0x3",dp_name="sw3",port="10"} 1
port_stack_state{dp_id="0x1",dp_name="sw1",port="1"} 3
port_stack_state{dp_id="0x2",dp_name="sw2",port="1"} 3
port_lacp_state{dp_id="0x1",dp_name="sw1",port="28"} 3
port_lacp_role{dp_id="0x1",dp_name="sw1",port="28"} 1
learned_l2_port{dp_id="0x2",dp_name="sw2",eth_src="0e:00:00:00:00:0a",vid="100"} 10
faucet_config_reload_cold{dp_id="0x1",dp_name="sw1"} 2
faucet_config_reload_warm{dp_id="0x1",dp_name="sw1"} 0
dp_root_hop_port{dp_id="0x2",dp_name="sw2"} 1
faucet_stack_root_dpid 1
vlan_packet_count{vlan="100"} 500
faucet_event_id 42
"#;

// ── Helpers ─────────────────────────────────────────────────────────

async fn varz_server(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(status).set_body_string(VARZ_BODY))
        .mount(&server)
        .await;
    server
}

fn config(server: &MockServer, socket: &Path) -> OrchestratorConfig {
    let mut ingest = IngestConfig::new(socket);
    ingest.connect_retries = 5;
    ingest.retry_backoff = Duration::from_millis(10);
    ingest.port_debounce = Duration::ZERO;
    OrchestratorConfig {
        ingest,
        varz_url: Url::parse(&format!("{}/metrics", server.uri())).unwrap(),
        varz_retries: 2,
        varz_retry_delay: Duration::from_millis(10),
        heartbeat_interval: Duration::from_millis(100),
        engine: EngineConfig::default(),
    }
}

fn learn(event_id: u64, dp: &str, dp_id: u64, mac: &str) -> serde_json::Value {
    json!({
        "version": 1, "time": 1_700_000_000.0, "dp_name": dp, "dp_id": dp_id, "event_id": event_id,
        "L2_LEARN": {"port_no": 10, "eth_src": mac, "vid": 100, "l3_src_ip": "10.0.0.3"}
    })
}

async fn send(peer: &mut UnixStream, records: &[serde_json::Value]) {
    let mut bytes = Vec::new();
    for record in records {
        bytes.extend_from_slice(record.to_string().as_bytes());
        bytes.push(b'\n');
    }
    peer.write_all(&bytes).await.unwrap();
}

fn has_host(engine: &StateEngine, mac: &str) -> bool {
    engine
        .list_hosts()
        .into_ready()
        .is_some_and(|reply| reply.hosts.contains_key(&MacAddress::new(mac)))
}

async fn wait_for(condition: impl Fn() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

// ── Restore ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_restore_from_varz() {
    let server = varz_server(200).await;
    let orchestrator = Orchestrator::new(config(&server, Path::new("/unused")));

    let horizon = orchestrator.restore().await.unwrap();
    assert_eq!(horizon, 42);

    let engine = orchestrator.engine();
    assert!(engine.is_restored());
    assert_eq!(engine.switch_summary().state, State::Healthy);
    assert!(has_host(engine, "0e:00:00:00:00:0a"));

    let sw1 = &engine.switch_state(Some("sw1")).into_ready().unwrap().switches["sw1"];
    assert_eq!(sw1.config_change_count, 2);
    assert_eq!(sw1.config_change_type.as_deref(), Some("cold"));
}

#[tokio::test]
async fn test_unreachable_varz_leaves_state_unrestored() {
    let server = varz_server(503).await;
    let orchestrator = Orchestrator::new(config(&server, Path::new("/unused")));

    assert!(orchestrator.restore().await.is_err());
    let engine = orchestrator.engine();
    assert!(!engine.is_restored());
    let detail = engine.host_summary().detail;
    assert!(detail.starts_with("State not restored: "), "{detail}");
}

// ── Event loop ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_run_dispatches_events_past_horizon() {
    let server = varz_server(200).await;
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("faucet.sock");
    let listener = UnixListener::bind(&socket).unwrap();

    let orchestrator = Arc::new(Orchestrator::new(config(&server, &socket)));
    let runner = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run().await })
    };
    let (mut peer, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();

    send(
        &mut peer,
        &[
            learn(42, "sw2", 2, "0e:00:00:00:00:42"),
            learn(43, "sw3", 3, "0e:00:00:00:00:43"),
        ],
    )
    .await;

    let engine = Arc::clone(orchestrator.engine());
    wait_for(|| has_host(&engine, "0e:00:00:00:00:43")).await;
    assert!(!has_host(&engine, "0e:00:00:00:00:42"));

    orchestrator.shutdown();
    timeout(Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_gap_in_event_ids_triggers_restore() {
    let server = varz_server(200).await;
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("faucet.sock");
    let listener = UnixListener::bind(&socket).unwrap();

    let orchestrator = Arc::new(Orchestrator::new(config(&server, &socket)));
    let runner = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run().await })
    };
    let (mut peer, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();

    // 45 skips 44; the restore that follows resets the horizon to 42, so
    // the state learned from 43 is replaced and a fresh 43 is accepted.
    send(
        &mut peer,
        &[
            learn(43, "sw3", 3, "0e:00:00:00:00:43"),
            learn(45, "sw3", 3, "0e:00:00:00:00:45"),
            learn(43, "sw2", 2, "0e:00:00:00:00:d0"),
        ],
    )
    .await;

    let engine = Arc::clone(orchestrator.engine());
    wait_for(|| has_host(&engine, "0e:00:00:00:00:d0")).await;
    assert!(!has_host(&engine, "0e:00:00:00:00:43"));
    assert!(!has_host(&engine, "0e:00:00:00:00:45"));
    assert!(engine.is_restored());

    orchestrator.shutdown();
    timeout(Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_lost_event_channel_ends_run() {
    let server = varz_server(200).await;
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("faucet.sock");
    let listener = UnixListener::bind(&socket).unwrap();

    let orchestrator = Arc::new(Orchestrator::new(config(&server, &socket)));
    let runner = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run().await })
    };
    let (peer, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    drop(peer);

    let result = timeout(Duration::from_secs(5), runner).await.unwrap().unwrap();
    let err = result.unwrap_err();
    assert!(matches!(err, forch_core::CoreError::Api(ref e) if e.is_channel_lost()), "{err}");
}

// ── Debounce ────────────────────────────────────────────────────────

fn port_change(event_id: u64, status: bool) -> serde_json::Value {
    json!({
        "version": 1, "time": 1_700_000_000.0, "dp_name": "sw1", "dp_id": 1, "event_id": event_id,
        "PORT_CHANGE": {"port_no": 3, "status": status, "reason": "MODIFY"}
    })
}

#[tokio::test(start_paused = true)]
async fn test_debounced_flap_leaves_port_state_untouched() {
    let (ours, mut peer) = UnixStream::pair().unwrap();
    let mut ingest = IngestConfig::new("/unused");
    ingest.port_debounce = Duration::from_secs(5);
    let mut ingestor = EventIngestor::new(ingest);
    ingestor.attach(ours);

    let engine = StateEngine::new(EngineConfig::default());
    engine.set_state_restored(true, None);
    let port = || {
        let state = engine.switch_state(Some("sw1")).into_ready().unwrap();
        state.switches["sw1"].ports[&3].clone()
    };

    send(&mut peer, &[port_change(1, true)]).await;
    let up = timeout(Duration::from_secs(1), ingestor.next_event(true))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    engine.dispatch(&up);
    let before = port();
    assert_eq!(before.status_up, Some(true));

    send(&mut peer, &[port_change(2, false), port_change(3, true)]).await;
    while let Ok(Ok(Some(event))) = timeout(Duration::from_secs(30), ingestor.next_event(true)).await {
        engine.dispatch(&event);
    }

    let after = port();
    assert_eq!(after.status_up, Some(true));
    assert_eq!(after.status_count, before.status_count);
}
