//! Test utilities for tank-client
//!
//! [`FakeIngest`] is an in-memory stand-in for the ingestion API and
//! [`TestServer`] serves any router on a local port with a client pointed
//! at it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::{IngestClient, Result, SendTankIndicatorsRequest, SendTankTransfersRequest};

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: IngestClient,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Serve `router` on a free local port
    pub async fn start(router: Router) -> Result<Self> {
        Self::start_with_timeout(router, Duration::from_secs(5), Duration::from_secs(2)).await
    }

    /// Serve `router` with custom client timeouts
    pub async fn start_with_timeout(
        router: Router,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        let base_url = format!("http://{}", addr);
        let client = IngestClient::with_config(&base_url, None, timeout, connect_timeout)?;

        Ok(Self {
            addr,
            client,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// How the fake API answers uploads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestReply {
    /// 200 with `{"success": true}`
    Accept,
    /// 200 with `{"success": false, "error": ...}`
    Reject(String),
    /// The given status with `{"error": ...}`
    Status(u16, String),
}

#[derive(Debug)]
struct IngestState {
    reply: IngestReply,
    indicators: Vec<SendTankIndicatorsRequest>,
    transfers: Vec<SendTankTransfersRequest>,
    authorization: Vec<Option<String>>,
}

/// In-memory ingestion API recording every request it receives
#[derive(Debug, Clone)]
pub struct FakeIngest {
    state: Arc<Mutex<IngestState>>,
}

impl Default for FakeIngest {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeIngest {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(IngestState {
                reply: IngestReply::Accept,
                indicators: Vec::new(),
                transfers: Vec::new(),
                authorization: Vec::new(),
            })),
        }
    }

    /// Change the answer for subsequent requests
    pub fn set_reply(&self, reply: IngestReply) {
        self.state.lock().reply = reply;
    }

    pub fn indicators(&self) -> Vec<SendTankIndicatorsRequest> {
        self.state.lock().indicators.clone()
    }

    pub fn transfers(&self) -> Vec<SendTankTransfersRequest> {
        self.state.lock().transfers.clone()
    }

    /// `Authorization` header of each request, in arrival order
    pub fn authorization(&self) -> Vec<Option<String>> {
        self.state.lock().authorization.clone()
    }

    /// Router serving both upload endpoints
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/Tank/SendTankIndicators", post(send_indicators))
            .route("/api/Tank/SendTankTransfers", post(send_transfers))
            .with_state(self.clone())
    }

    fn answer(&self, headers: &HeaderMap) -> (StatusCode, Json<Value>) {
        let mut state = self.state.lock();
        let auth = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        state.authorization.push(auth);

        match &state.reply {
            IngestReply::Accept => (StatusCode::OK, Json(json!({ "success": true }))),
            IngestReply::Reject(error) => (
                StatusCode::OK,
                Json(json!({ "success": false, "error": error })),
            ),
            IngestReply::Status(code, error) => (
                StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                Json(json!({ "error": error })),
            ),
        }
    }
}

async fn send_indicators(
    State(ingest): State<FakeIngest>,
    headers: HeaderMap,
    Json(body): Json<SendTankIndicatorsRequest>,
) -> (StatusCode, Json<Value>) {
    ingest.state.lock().indicators.push(body);
    ingest.answer(&headers)
}

async fn send_transfers(
    State(ingest): State<FakeIngest>,
    headers: HeaderMap,
    Json(body): Json<SendTankTransfersRequest>,
) -> (StatusCode, Json<Value>) {
    ingest.state.lock().transfers.push(body);
    ingest.answer(&headers)
}

/// Wait for a condition with timeout
pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}
