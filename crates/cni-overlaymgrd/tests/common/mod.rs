//! Fake central manager serving the topology sync endpoint

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use cni_overlay_test::{topology_fixtures, TopologyFixture};
use cni_overlaymgrd::OverlayConfig;
use parking_lot::Mutex;

#[derive(Default)]
struct Inner {
    queued: VecDeque<(StatusCode, String)>,
    fallback: Option<(StatusCode, String)>,
    requests: Vec<String>,
}

/// Replies from a queue, then repeats the fallback response
#[derive(Clone, Default)]
pub struct FakeManager {
    inner: Arc<Mutex<Inner>>,
}

impl FakeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot reply
    pub fn push(&self, status: StatusCode, body: impl Into<String>) -> &Self {
        self.inner.lock().queued.push_back((status, body.into()));
        self
    }

    /// Queue a one-shot topology reply
    pub fn push_topology(&self, topology: &TopologyFixture) -> &Self {
        self.push(StatusCode::OK, topology.to_body())
    }

    /// Reply used once the queue is empty
    pub fn set_topology(&self, topology: &TopologyFixture) {
        self.inner.lock().fallback = Some((StatusCode::OK, topology.to_body()));
    }

    /// Agent IPs of every request received so far
    pub fn requests(&self) -> Vec<String> {
        self.inner.lock().requests.clone()
    }

    /// Bind to an ephemeral port and serve in the background
    pub async fn serve(&self) -> SocketAddr {
        let app = Router::new()
            .route("/tenants/admin/sync/{ip}", get(sync))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }
}

async fn sync(State(mgr): State<FakeManager>, Path(ip): Path<String>) -> (StatusCode, String) {
    let mut inner = mgr.inner.lock();
    inner.requests.push(ip);
    if let Some(reply) = inner.queued.pop_front() {
        return reply;
    }
    inner
        .fallback
        .clone()
        .unwrap_or((StatusCode::SERVICE_UNAVAILABLE, String::new()))
}

/// Agent configuration pointing at `addr` with fast retries
pub fn test_config(addr: SocketAddr, state_dir: &FsPath) -> OverlayConfig {
    let mut config = OverlayConfig::default();
    config.manager.url = format!("http://{}", addr);
    config.manager.sync_retry_secs = 1;
    config.manager.request_timeout_secs = 5;
    config.agent.internal_ip = topology_fixtures::SELF_IP.to_string();
    config.switch.bridge_retry_ms = 1;
    config.switch.command_retry_delay_ms = 1;
    config.store.dir = state_dir.to_string_lossy().into_owned();
    config.validate().unwrap();
    config
}
