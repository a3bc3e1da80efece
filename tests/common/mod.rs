//! Shared mock server and event helpers for integration tests

#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use futures_util::{StreamExt, stream};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use transferbox::config::Config;
use transferbox::{ChannelSink, JobEvent, TransferService};

pub const FILE_LEN: usize = 64 * 1024;

/// Deterministic payload served at `/file`
pub fn file_payload() -> Vec<u8> {
    (0..FILE_LEN).map(|i| (i % 251) as u8).collect()
}

#[derive(Debug, Clone)]
pub struct CapturedUpload {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Default)]
pub struct Hits {
    pub file: AtomicUsize,
    pub redirect: AtomicUsize,
    pub hop_one: AtomicUsize,
    pub hop_two: AtomicUsize,
    pub slow_upload_finished: AtomicUsize,
}

#[derive(Clone, Default)]
struct ServerState {
    hits: Arc<Hits>,
    uploads: Arc<Mutex<Vec<CapturedUpload>>>,
    file_requests: Arc<Mutex<Vec<HeaderMap>>>,
}

pub struct MockServer {
    pub base: String,
    pub hits: Arc<Hits>,
    uploads: Arc<Mutex<Vec<CapturedUpload>>>,
    file_requests: Arc<Mutex<Vec<HeaderMap>>>,
}

impl MockServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn uploads(&self) -> Vec<CapturedUpload> {
        self.uploads.lock().unwrap().clone()
    }

    /// Request headers of every GET `/file`, in arrival order
    pub fn file_requests(&self) -> Vec<HeaderMap> {
        self.file_requests.lock().unwrap().clone()
    }
}

/// Start the mock HTTP server on a random local port
pub async fn start_mock_server() -> MockServer {
    let state = ServerState::default();
    let app = Router::new()
        .route("/file", get(serve_file))
        .route("/redirect", get(redirect_to_file))
        .route("/redirect-to", get(redirect_to_target))
        .route("/hop1", get(hop_one))
        .route("/hop2", get(hop_two))
        .route("/multiple-choices", get(multiple_choices))
        .route("/redirect-without-location", get(redirect_without_location))
        .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
        .route("/stall", get(stall))
        .route("/upload", any(capture_upload))
        .route("/slow-upload", any(slow_upload))
        .with_state(state.clone());

    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let bound_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockServer {
        base: format!("http://{bound_addr}"),
        hits: state.hits,
        uploads: state.uploads,
        file_requests: state.file_requests,
    }
}

async fn serve_file(State(state): State<ServerState>, headers: HeaderMap) -> impl IntoResponse {
    state.hits.file.fetch_add(1, Ordering::SeqCst);
    state.file_requests.lock().unwrap().push(headers);
    ([(header::CONTENT_TYPE, "application/octet-stream")], file_payload())
}

async fn redirect_to_file(State(state): State<ServerState>) -> impl IntoResponse {
    state.hits.redirect.fetch_add(1, Ordering::SeqCst);
    (StatusCode::FOUND, [(header::LOCATION, "/file")])
}

/// `302` to the absolute URL in `?target=`
async fn redirect_to_target(Query(params): Query<HashMap<String, String>>) -> Response {
    let target = params.get("target").cloned().unwrap_or_default();
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, target)
        .body(Body::empty())
        .unwrap()
}

async fn hop_one(State(state): State<ServerState>) -> impl IntoResponse {
    state.hits.hop_one.fetch_add(1, Ordering::SeqCst);
    (StatusCode::FOUND, [(header::LOCATION, "/hop2")])
}

async fn hop_two(State(state): State<ServerState>) -> impl IntoResponse {
    state.hits.hop_two.fetch_add(1, Ordering::SeqCst);
    (StatusCode::FOUND, [(header::LOCATION, "/file")])
}

async fn multiple_choices() -> impl IntoResponse {
    (StatusCode::MULTIPLE_CHOICES, [(header::LOCATION, "/file")])
}

async fn redirect_without_location() -> StatusCode {
    StatusCode::TEMPORARY_REDIRECT
}

/// One chunk, then nothing until the client gives up
async fn stall() -> Response {
    let first = stream::iter([Ok::<_, std::io::Error>(Bytes::from(vec![7u8; 1024]))]);
    let body = Body::from_stream(first.chain(stream::pending()));
    Response::builder()
        .status(StatusCode::OK)
        .body(body)
        .unwrap()
}

async fn capture_upload(
    State(state): State<ServerState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    state.uploads.lock().unwrap().push(CapturedUpload {
        method,
        headers,
        body,
    });
    (StatusCode::CREATED, [("x-upload-id", "42")], "stored")
}

/// Drain the request body a frame at a time with a pause between frames
async fn slow_upload(State(state): State<ServerState>, body: Body) -> StatusCode {
    let mut frames = body.into_data_stream();
    while let Some(frame) = frames.next().await {
        if frame.is_err() {
            return StatusCode::BAD_REQUEST;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    state.hits.slow_upload_finished.fetch_add(1, Ordering::SeqCst);
    StatusCode::CREATED
}

pub fn service() -> (TransferService, UnboundedReceiver<JobEvent>) {
    service_with(Config::default())
}

pub fn service_with(config: Config) -> (TransferService, UnboundedReceiver<JobEvent>) {
    let (sink, rx) = ChannelSink::new();
    let service = TransferService::new(config, sink).unwrap();
    (service, rx)
}

/// Next event, failing the test after five seconds
pub async fn next_event(rx: &mut UnboundedReceiver<JobEvent>) -> JobEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Events up to and including the first terminal one
pub async fn collect_until_terminal(rx: &mut UnboundedReceiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = event.event.is_terminal();
        events.push(event);
        if done {
            return events;
        }
    }
}

/// Assert nothing else arrives for a short while
pub async fn assert_quiet(rx: &mut UnboundedReceiver<JobEvent>) {
    let extra = timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(extra.is_err(), "unexpected event: {extra:?}");
}
