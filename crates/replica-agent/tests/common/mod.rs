//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use parking_lot::Mutex;
use replica_agent::{AgentConfig, DirectiveHandler, DirectiveMode, ReplicaAgent};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A controller stand-in that records every request body by route.
#[derive(Clone)]
pub struct FakeController {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

type Recorded = Arc<Mutex<Vec<(String, Value)>>>;

fn recorder(path: &'static str) -> axum::routing::MethodRouter<Recorded> {
    post(move |State(requests): State<Recorded>, Json(body): Json<Value>| async move {
        requests.lock().push((path.to_string(), body));
        StatusCode::OK
    })
}

impl FakeController {
    pub async fn spawn() -> Self {
        let requests: Recorded = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route("/replica", recorder("/replica"))
            .route("/message", recorder("/message"))
            .route("/event", recorder("/event"))
            .route("/log", recorder("/log"))
            .with_state(Arc::clone(&requests));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { addr, requests }
    }

    pub fn requests(&self, path: &str) -> Vec<Value> {
        self.requests
            .lock()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Events of the given type seen so far.
    pub fn events(&self, event_type: &str) -> Vec<Value> {
        self.requests("/event")
            .into_iter()
            .filter(|e| e["type"] == event_type)
            .collect()
    }

    /// Waits until at least `n` requests have hit `path`.
    pub async fn wait_for(&self, path: &str, n: usize) -> Vec<Value> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let seen = self.requests(path);
                if seen.len() >= n {
                    return seen;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {} request(s) to {}", n, path))
    }

    pub async fn wait_for_event(&self, event_type: &str, n: usize) -> Vec<Value> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let seen = self.events(event_type);
                if seen.len() >= n {
                    return seen;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {} {} event(s)", n, event_type))
    }
}

/// Handler that counts lifecycle calls.
#[derive(Default)]
pub struct CountingHandler {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub restarts: AtomicUsize,
}

impl CountingHandler {
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectiveHandler for CountingHandler {
    async fn start(&self) -> anyhow::Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn restart(&self) -> anyhow::Result<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn config(controller: &FakeController, mode: DirectiveMode) -> AgentConfig {
    AgentConfig::builder()
        .replica_id("r1")
        .controller_addr(controller.addr.to_string())
        .listen_addr("127.0.0.1:0")
        .info("role", "follower")
        .start_grace(Duration::from_millis(50))
        .stop_grace(Duration::from_secs(2))
        .request_timeout(Duration::from_secs(2))
        .directive_mode(mode)
        .build()
}

/// Starts an agent against a fresh fake controller.
pub async fn running_agent(
    mode: DirectiveMode,
) -> (ReplicaAgent, FakeController, Arc<CountingHandler>) {
    let controller = FakeController::spawn().await;
    let handler = Arc::new(CountingHandler::default());
    let agent = ReplicaAgent::new(config(&controller, mode), handler.clone()).unwrap();
    agent.start().await.unwrap();
    (agent, controller, handler)
}

pub fn agent_url(agent: &ReplicaAgent, path: &str) -> String {
    format!("http://{}{}", agent.local_addr().unwrap(), path)
}
