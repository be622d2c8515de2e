//! Common test utilities for API tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use lha_api::{build_state, create_router, CredentialVerifier, ServerState};
use lha_core::{EncodedCommand, RelayConfig};
use lha_devices::{Ack, TransportError, TransportPublisher, TransportResult};
use tower::ServiceExt;

pub const SECRET: &str = "test-secret";

/// How the stub publisher answers.
#[derive(Clone)]
pub enum Behaviour {
    Acknowledge,
    NeverAcknowledge,
    Fail(TransportError),
}

/// Publisher double that counts every command it is handed.
pub struct SpyPublisher {
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl SpyPublisher {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportPublisher for SpyPublisher {
    fn name(&self) -> &str {
        "spy"
    }

    async fn publish(&self, command: &EncodedCommand) -> TransportResult<Ack> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Acknowledge => Ok(Ack {
                target: command.target().to_string(),
                detail: "spy".into(),
                elapsed: Duration::ZERO,
            }),
            Behaviour::NeverAcknowledge => std::future::pending().await,
            Behaviour::Fail(e) => Err(e.clone()),
        }
    }
}

/// Default configuration with the test secret and a short transport timeout.
pub fn test_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.auth.jwt_secret = SECRET.to_string();
    config.transport.timeout_ms = 200;
    config
}

pub fn state_with(config: RelayConfig, publisher: Arc<SpyPublisher>) -> ServerState {
    build_state(config, publisher).expect("state")
}

/// Router as seen from `client`.
pub fn router_for(state: &ServerState, client: [u8; 4]) -> Router {
    create_router(state.clone()).layer(MockConnectInfo(SocketAddr::from((client, 40000))))
}

pub fn token() -> String {
    CredentialVerifier::new(SECRET).issue("tester", Some(3600)).expect("token")
}

pub fn toggle_request(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(path);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).expect("request")
}

pub fn get_request(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).expect("request")
}

/// Send one request, returning status, headers and the body as JSON (or a string).
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, serde_json::Value) {
    let response = router.oneshot(request).await.expect("infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, headers, body)
}
