//! Shared harness for integration tests
//!
//! - `MockServer` - in-process hyper server that records requests
//! - `App` - coordinator, timer and host wired the way the binary wires them

#![allow(dead_code)]

use bytes::Bytes;
use checkin_gateway::domain::types::LocationRecord;
use checkin_gateway::infra::{Config, ManualClock, Metrics};
use checkin_gateway::io::{MemoryKvStore, SubmissionClient};
use checkin_gateway::services::validator::encode_scan_payload;
use checkin_gateway::services::{
    CoordinatorDeps, CoordinatorInput, CoordinatorState, SessionCoordinator, SessionStore,
    TimerHost, TimerOptions, TimerProcess, UiEvent,
};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

pub const T0: i64 = 1_700_000_000_000;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub content_type: String,
    pub body: String,
}

pub struct MockServer {
    pub url: String,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Serve every request with `status` and `body`, recording what came in
pub async fn start_mock_server(status: u16, body: &'static str) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let recorded = recorded.clone();
                    async move {
                        let method = req.method().to_string();
                        let path = req.uri().path().to_string();
                        let content_type = req
                            .headers()
                            .get(hyper::header::CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        let bytes = match req.into_body().collect().await {
                            Ok(collected) => collected.to_bytes(),
                            Err(_) => Bytes::new(),
                        };
                        recorded.lock().push(RecordedRequest {
                            method,
                            path,
                            content_type,
                            body: String::from_utf8_lossy(&bytes).into_owned(),
                        });

                        let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
                        *response.status_mut() = StatusCode::from_u16(status).unwrap();
                        Ok::<_, Infallible>(response)
                    }
                });
                let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
            });
        }
    });

    MockServer { url: format!("http://{}", addr), requests }
}

/// A base url nothing listens on
pub fn unreachable_url() -> String {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    format!("http://127.0.0.1:{}", port)
}

pub fn library_a() -> LocationRecord {
    LocationRecord::new(
        "ButterKnife Lib, 80 Feet Rd, Koramangala 1A Block, Bangalore",
        "ButterKnifeLib-1234",
        5.5,
    )
}

pub fn library_b() -> LocationRecord {
    LocationRecord::new("Other Lib, MG Road", "OtherLib-99", 2.0)
}

pub fn scan_input(record: &LocationRecord) -> CoordinatorInput {
    CoordinatorInput::Scan(Some(encode_scan_payload(record).unwrap()))
}

pub struct App {
    pub input_tx: mpsc::Sender<CoordinatorInput>,
    pub events_rx: mpsc::UnboundedReceiver<UiEvent>,
    pub state_rx: watch::Receiver<CoordinatorState>,
    pub host: TimerHost,
    pub timer: TimerProcess,
    pub clock: Arc<ManualClock>,
    pub store: SessionStore,
    pub metrics: Arc<Metrics>,
    pub coordinator_task: JoinHandle<()>,
    /// Events the host handed back while waiting for state
    unhandled: VecDeque<UiEvent>,
}

impl App {
    /// Wire a coordinator against the given config with a fast timer
    pub fn new(config: &Config) -> Self {
        let kv = Arc::new(MemoryKvStore::new());
        let metrics = Arc::new(Metrics::new());
        let clock = Arc::new(ManualClock::new(T0));
        let options = TimerOptions { tick_interval: Duration::from_millis(20), ..Default::default() };
        let timer = TimerProcess::new(options, metrics.clone());

        let (input_tx, input_rx) = mpsc::channel(256);
        let deps = CoordinatorDeps {
            store: SessionStore::new(kv.clone()),
            submitter: Arc::new(SubmissionClient::new(config).unwrap()),
            probe: Arc::new(timer.clone()),
            clock: clock.clone(),
            metrics: metrics.clone(),
        };
        let (coordinator, events_rx) = SessionCoordinator::new(deps, &input_tx);
        let state_rx = coordinator.subscribe();
        let coordinator_task = tokio::spawn(coordinator.run(input_rx));
        let host = TimerHost::new(timer.clone(), input_tx.clone());

        Self {
            input_tx,
            events_rx,
            state_rx,
            host,
            timer,
            clock,
            store: SessionStore::new(kv),
            metrics,
            coordinator_task,
            unhandled: VecDeque::new(),
        }
    }

    pub async fn send(&self, input: CoordinatorInput) {
        self.input_tx.send(input).await.unwrap();
    }

    /// Next event the host did not consume itself
    pub async fn next_event(&mut self) -> UiEvent {
        if let Some(event) = self.unhandled.pop_front() {
            return event;
        }
        loop {
            let event = timeout(Duration::from_secs(5), self.events_rx.recv())
                .await
                .expect("event within timeout")
                .expect("coordinator alive");
            if let Some(event) = self.host.handle_event(event).await {
                return event;
            }
        }
    }

    /// Wait until `f` holds, executing host intents meanwhile
    pub async fn wait_state<F>(&mut self, f: F) -> CoordinatorState
    where
        F: Fn(&CoordinatorState) -> bool,
    {
        let fut = async {
            loop {
                {
                    let state = self.state_rx.borrow_and_update();
                    if f(&state) {
                        return state.clone();
                    }
                }
                tokio::select! {
                    changed = self.state_rx.changed() => changed.expect("coordinator alive"),
                    Some(event) = self.events_rx.recv() => {
                        if let Some(event) = self.host.handle_event(event).await {
                            self.unhandled.push_back(event);
                        }
                    }
                }
            }
        };
        timeout(Duration::from_secs(10), fut).await.expect("state within timeout")
    }

    /// Scan `record`, confirm the offer and wait for the timer to be bound
    pub async fn start_session(&mut self, record: &LocationRecord) {
        self.send(scan_input(record)).await;
        assert_eq!(self.next_event().await, UiEvent::OfferSession(record.clone()));
        self.send(CoordinatorInput::StartSession(record.clone())).await;
        assert_eq!(self.next_event().await, UiEvent::LaunchMainView);
        self.wait_state(|s| s.process_bound).await;
    }
}
