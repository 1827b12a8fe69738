//! Topology sync client against a fake manager

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use cni_overlay_test::{topology_fixtures, CommandVerifier, PeerStatus, RecordingRunner};
use cni_overlaymgrd::tables::PATCH_INT_OFPORT;
use cni_overlaymgrd::{
    FlowProgrammer, IdAllocator, OverlayConfig, OverlayMgr, SharedOverlayMgr, TopologyClient,
    TunnelSettings,
};
use common::{test_config, FakeManager};

fn overlay(config: &OverlayConfig, runner: &Arc<RecordingRunner>) -> SharedOverlayMgr {
    let ofports = Arc::new(IdAllocator::new("tunnel-ofport"));
    ofports.init_by_history(&[0, PATCH_INT_OFPORT]);
    let settings = TunnelSettings {
        self_ip: config.agent.internal_ip.clone(),
        local_ip: config.local_tunnel_ip().to_string(),
        dst_port: config.switch.vxlan_dst_port,
        command_attempts: config.switch.command_attempts,
        command_retry_delay: config.switch.command_retry_delay(),
    };
    OverlayMgr::new(
        runner.clone(),
        FlowProgrammer::new(runner.clone(), &config.switch),
        ofports,
        settings,
    )
    .into_shared()
}

#[tokio::test]
async fn test_init_retries_until_manager_answers() {
    let fake = FakeManager::new();
    fake.push(StatusCode::INTERNAL_SERVER_ERROR, "boom")
        .push(StatusCode::OK, "not json")
        .push_topology(&topology_fixtures::single_peer(PeerStatus::Ready).with_interval_secs(15));
    let addr = fake.serve().await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(addr, dir.path());
    let runner = Arc::new(RecordingRunner::new());
    let mgr = overlay(&config, &runner);
    let client = TopologyClient::new(&config, mgr.clone()).unwrap();

    let interval = client.init().await;
    assert_eq!(interval, Duration::from_secs(15));
    assert_eq!(fake.requests().len(), 3);
    assert!(fake
        .requests()
        .iter()
        .all(|ip| ip == topology_fixtures::SELF_IP));

    let mgr = mgr.lock().await;
    assert_eq!(mgr.linked_ofports(), vec![2]);
    CommandVerifier::new(runner.commands())
        .assert_command_executed("options:remote_ip=\"192.168.10.2\"")
        .unwrap();
}

#[tokio::test]
async fn test_fetch_reports_bad_status() {
    let fake = FakeManager::new();
    fake.push(StatusCode::NOT_FOUND, "");
    let addr = fake.serve().await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(addr, dir.path());
    let runner = Arc::new(RecordingRunner::new());
    let client = TopologyClient::new(&config, overlay(&config, &runner)).unwrap();

    let err = client.fetch().await.unwrap_err();
    assert!(err.to_string().contains("404"));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_init_falls_back_to_default_interval() {
    let fake = FakeManager::new();
    fake.push_topology(&topology_fixtures::ready_mesh(1).with_interval_str("later"));
    let addr = fake.serve().await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(addr, dir.path());
    let runner = Arc::new(RecordingRunner::new());
    let client = TopologyClient::new(&config, overlay(&config, &runner)).unwrap();

    assert_eq!(client.init().await, config.manager.default_interval());
}

#[tokio::test]
async fn test_oversized_interval_uses_default() {
    let fake = FakeManager::new();
    fake.set_topology(&topology_fixtures::ready_mesh(1).with_interval_secs(u64::MAX));
    let addr = fake.serve().await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(addr, dir.path());
    let runner = Arc::new(RecordingRunner::new());
    let client = TopologyClient::new(&config, overlay(&config, &runner)).unwrap();

    let interval = client.init().await;
    assert_eq!(interval, config.manager.default_interval());

    // Heartbeat keeps running instead of overflowing the timer
    let res = tokio::time::timeout(Duration::from_millis(200), client.heartbeat(interval)).await;
    assert!(res.is_err());

    let res = tokio::time::timeout(
        Duration::from_millis(200),
        client.heartbeat(Duration::from_secs(u64::MAX)),
    )
    .await;
    assert!(res.is_err());
}

#[tokio::test]
async fn test_heartbeat_stops_on_interval_change() {
    let fake = FakeManager::new();
    fake.push_topology(&topology_fixtures::single_peer(PeerStatus::Ready).with_interval_secs(1));
    fake.set_topology(&topology_fixtures::single_peer(PeerStatus::Down).with_interval_str("2"));
    let addr = fake.serve().await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(addr, dir.path());
    let runner = Arc::new(RecordingRunner::new());
    let mgr = overlay(&config, &runner);
    let client = TopologyClient::new(&config, mgr.clone()).unwrap();

    let interval = client.init().await;
    assert_eq!(interval, Duration::from_secs(1));

    let next = tokio::time::timeout(Duration::from_secs(10), client.heartbeat(interval))
        .await
        .expect("heartbeat should return on interval change");
    assert_eq!(next, Duration::from_secs(2));
    assert_eq!(fake.requests().len(), 2);

    // The tick that changed the interval was still applied
    let mgr = mgr.lock().await;
    assert_eq!(mgr.ports().len(), 1);
    assert!(!mgr.ports()[0].is_linked());
}

#[tokio::test]
async fn test_heartbeat_keeps_running_at_same_interval() {
    let fake = FakeManager::new();
    fake.set_topology(&topology_fixtures::ready_mesh(2).with_interval_secs(1));
    let addr = fake.serve().await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(addr, dir.path());
    let runner = Arc::new(RecordingRunner::new());
    let client = TopologyClient::new(&config, overlay(&config, &runner)).unwrap();

    let interval = client.init().await;
    let res = tokio::time::timeout(Duration::from_millis(2500), client.heartbeat(interval)).await;
    assert!(res.is_err());
    assert!(fake.requests().len() >= 3);

    // Steady state: each peer linked exactly once
    CommandVerifier::new(runner.commands())
        .assert_command_count("type=vxlan", 2)
        .unwrap();
}
