#![allow(clippy::unwrap_used)]
// Event socket ingestion over a connected Unix socket pair.

use std::time::Duration;

use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::time::timeout;

use forch_api::{Error, EventIngestor, EventKind, FaucetEvent, IngestConfig};

// ── Helpers ─────────────────────────────────────────────────────────

fn ingestor(debounce: Duration) -> (EventIngestor, UnixStream) {
    let (ours, theirs) = UnixStream::pair().unwrap();
    let mut config = IngestConfig::new("/unused");
    config.port_debounce = debounce;
    let mut ingestor = EventIngestor::new(config);
    ingestor.attach(ours);
    (ingestor, theirs)
}

async fn send(peer: &mut UnixStream, records: &[serde_json::Value]) {
    let mut bytes = Vec::new();
    for record in records {
        bytes.extend_from_slice(record.to_string().as_bytes());
        bytes.push(b'\n');
    }
    peer.write_all(&bytes).await.unwrap();
}

async fn next(ingestor: &mut EventIngestor) -> FaucetEvent {
    timeout(Duration::from_secs(1), ingestor.next_event(true))
        .await
        .unwrap()
        .unwrap()
        .unwrap()
}

fn port_change(event_id: u64, port: u32, status: bool) -> serde_json::Value {
    json!({
        "version": 1, "time": 10.0, "dp_name": "sw1", "dp_id": 1, "event_id": event_id,
        "PORT_CHANGE": {"port_no": port, "status": status, "reason": "MODIFY"}
    })
}

// ── Framing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_undecodable_record_is_skipped() {
    let (mut ingestor, mut peer) = ingestor(Duration::ZERO);
    peer.write_all(b"{not json\n\n").await.unwrap();
    send(&mut peer, &[json!({"dp_name": "sw1", "dp_id": 1, "event_id": 5, "DP_CHANGE": {"reason": "cold_start"}})]).await;

    let event = next(&mut ingestor).await;
    assert_eq!(event.kind(), Some(EventKind::DpChange));
    assert_eq!(event.event_id, Some(5));
}

#[tokio::test]
async fn test_nothing_ready_returns_none() {
    let (mut ingestor, _peer) = ingestor(Duration::ZERO);
    assert!(ingestor.next_event(false).await.unwrap().is_none());
    assert!(ingestor.is_connected());
}

#[tokio::test]
async fn test_peer_close_is_channel_loss() {
    let (mut ingestor, peer) = ingestor(Duration::ZERO);
    drop(peer);

    let err = timeout(Duration::from_secs(1), ingestor.next_event(true))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, Error::EventSocketClosed));
    assert!(err.is_channel_lost());
}

#[tokio::test]
async fn test_connect_to_listening_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("faucet.sock");
    let listener = tokio::net::UnixListener::bind(&path).unwrap();

    let mut config = IngestConfig::new(&path);
    config.connect_retries = 0;
    let mut ingestor = EventIngestor::new(config);
    ingestor.connect().await.unwrap();
    let (_server_side, _) = listener.accept().await.unwrap();

    assert!(ingestor.is_connected());
    ingestor.disconnect();
    assert!(!ingestor.is_connected());
}

// ── Event horizon ───────────────────────────────────────────────────

#[tokio::test]
async fn test_horizon_drops_old_and_detects_gap() {
    let (mut ingestor, mut peer) = ingestor(Duration::ZERO);
    ingestor.set_event_horizon(100);
    send(
        &mut peer,
        &[
            json!({"version": 1, "time": 122.0, "event_id": 99}),
            json!({"version": 1, "time": 123.0, "event_id": 101}),
            json!({"version": 1, "time": 124.0, "event_id": 200}),
        ],
    )
    .await;

    let event = next(&mut ingestor).await;
    assert_eq!(event.event_id, Some(101));

    let err = timeout(Duration::from_secs(1), ingestor.next_event(true))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, Error::EventOutOfSequence { expected: 102, got: 200 }));
}

// ── Fan-out ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ports_status_fans_out_in_order() {
    let (mut ingestor, mut peer) = ingestor(Duration::ZERO);
    send(
        &mut peer,
        &[
            json!({
                "dp_name": "sw1", "dp_id": 1, "event_id": 1,
                "PORTS_STATUS": {"1": true, "2": false, "3": true}
            }),
            port_change(2, 9, true),
        ],
    )
    .await;

    let mut seen = Vec::new();
    for _ in 0..4 {
        let state = next(&mut ingestor).await.as_port_state().unwrap();
        seen.push((state.port, state.active));
    }
    assert_eq!(seen, vec![(1, true), (2, false), (3, true), (9, true)]);
}

#[tokio::test]
async fn test_learned_macs_fan_out() {
    let (mut ingestor, mut peer) = ingestor(Duration::ZERO);
    send(
        &mut peer,
        &[json!({
            "dp_name": "sw2", "dp_id": 2, "event_id": 7,
            "L2_LEARNED_MACS": [
                {"port_no": 4, "eth_src": "aa:aa:aa:aa:aa:01", "vid": 10},
                {"port_no": 5, "eth_src": "aa:aa:aa:aa:aa:02", "vid": 10, "l3_src_ip": "10.0.0.2"}
            ]
        })],
    )
    .await;

    let first = next(&mut ingestor).await.as_port_learn().unwrap();
    let second = next(&mut ingestor).await.as_port_learn().unwrap();
    assert_eq!((first.name.as_str(), first.port), ("sw2", 4));
    assert_eq!(second.mac, "aa:aa:aa:aa:aa:02");
    assert_eq!(second.ip.as_deref(), Some("10.0.0.2"));
}

// ── Debounce ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_flap_inside_window_emits_no_down() {
    let (mut ingestor, mut peer) = ingestor(Duration::from_secs(5));
    send(
        &mut peer,
        &[port_change(1, 3, true), port_change(2, 3, false), port_change(3, 3, true)],
    )
    .await;

    let up = next(&mut ingestor).await.as_port_state().unwrap();
    assert!(up.active);

    // The held down is cancelled and the repeated up is deduplicated, so
    // nothing surfaces even well past the debounce window.
    let quiet = timeout(Duration::from_secs(30), ingestor.next_event(true)).await;
    assert!(quiet.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_down_emitted_after_window() {
    let (mut ingestor, mut peer) = ingestor(Duration::from_secs(5));
    send(&mut peer, &[port_change(1, 3, true), port_change(2, 3, false)]).await;

    assert!(next(&mut ingestor).await.as_port_state().unwrap().active);

    let down = timeout(Duration::from_secs(30), ingestor.next_event(true))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(down.debounced, Some(true));
    assert!(!down.as_port_state().unwrap().active);
}
