//! Session lifecycle state machine
//!
//! The SessionCoordinator is the single writer of session state. It consumes
//! [`CoordinatorInput`]s strictly in arrival order and produces:
//! - observable state on a watch channel ([`CoordinatorState`])
//! - one-shot [`UiEvent`]s on a single-consumer channel
//!
//! Submissions run on their own task and report back through the same input
//! channel, so their results are ordered with every other input.

mod handlers;

use crate::domain::session::SessionSummary;
use crate::domain::types::{LocationRecord, SubmissionStatus};
use crate::infra::clock::Clock;
use crate::infra::metrics::Metrics;
use crate::io::submission::SessionSubmitter;
use crate::services::session_store::SessionStore;
use crate::services::timer::ProcessProbe;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use uuid::Uuid;

/// Connection between the host and the timer process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    /// Host could not tell; the coordinator asks the probe
    Unknown,
}

/// Progress of one submission attempt
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionUpdate {
    Subscribed,
    /// Server answered; `None` when it gave no verdict
    Succeeded(Option<bool>),
    Failed(String),
}

/// Everything the coordinator reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorInput {
    Initialise,
    /// Raw scanner payload
    Scan(Option<String>),
    ScanCancelled,
    /// User confirmed starting a session at this location
    StartSession(LocationRecord),
    /// Formatted elapsed time from the timer process
    Tick(String),
    EndSessionRequested,
    ExitConfirmed,
    Submission { attempt: Uuid, update: SubmissionUpdate },
    ProcessConnection(ConnectionState),
    ClearSession,
}

/// One-shot events for the host. Each is delivered exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Warning(String),
    /// Ask the user to confirm starting a session here
    OfferSession(LocationRecord),
    LaunchMainView,
    StartTimer,
    StopTimer,
    SessionEnded(SessionSummary),
    /// Open the scanner for the end-of-session scan
    ScanRequested,
    ExitConfirmed,
    SessionCleared,
}

/// Observable coordinator state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoordinatorState {
    pub current_location: Option<LocationRecord>,
    pub elapsed_display: String,
    pub submission_status: SubmissionStatus,
    pub last_summary: Option<SessionSummary>,
    pub session_ended: bool,
    pub process_bound: bool,
}

/// Collaborators injected into the coordinator
pub struct CoordinatorDeps {
    pub store: SessionStore,
    pub submitter: Arc<dyn SessionSubmitter>,
    pub probe: Arc<dyn ProcessProbe>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<Metrics>,
}

pub struct SessionCoordinator {
    pub(crate) store: SessionStore,
    pub(crate) submitter: Arc<dyn SessionSubmitter>,
    pub(crate) probe: Arc<dyn ProcessProbe>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) metrics: Arc<Metrics>,
    /// Weak handle to our own input channel, for submission results
    pub(crate) self_tx: mpsc::WeakSender<CoordinatorInput>,
    pub(crate) events_tx: mpsc::UnboundedSender<UiEvent>,
    pub(crate) state_tx: watch::Sender<CoordinatorState>,
    /// Attempt whose results are still wanted
    pub(crate) current_attempt: Option<Uuid>,
}

impl SessionCoordinator {
    /// Create a coordinator fed by `input_tx`'s channel.
    ///
    /// Returns the coordinator and the receiving end of its UI events.
    pub fn new(
        deps: CoordinatorDeps,
        input_tx: &mpsc::Sender<CoordinatorInput>,
    ) -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(CoordinatorState::default());
        let coordinator = Self {
            store: deps.store,
            submitter: deps.submitter,
            probe: deps.probe,
            clock: deps.clock,
            metrics: deps.metrics,
            self_tx: input_tx.downgrade(),
            events_tx,
            state_tx,
            current_attempt: None,
        };
        (coordinator, events_rx)
    }

    /// Watch the observable state
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state_tx.subscribe()
    }

    /// Snapshot of the observable state
    pub fn state(&self) -> CoordinatorState {
        self.state_tx.borrow().clone()
    }

    /// Consume inputs until every sender is gone
    pub async fn run(mut self, mut input_rx: mpsc::Receiver<CoordinatorInput>) {
        info!("coordinator_started");
        while let Some(input) = input_rx.recv().await {
            self.handle(input);
        }
        info!("coordinator_stopped");
    }

    /// Apply a single input
    pub fn handle(&mut self, input: CoordinatorInput) {
        match input {
            CoordinatorInput::Initialise => self.initialise(),
            CoordinatorInput::Scan(raw) => self.on_scan(raw.as_deref()),
            CoordinatorInput::ScanCancelled => debug!("scan_cancelled"),
            CoordinatorInput::StartSession(record) => self.start_session(record),
            CoordinatorInput::Tick(formatted) => self.on_tick(formatted),
            CoordinatorInput::EndSessionRequested => self.emit(UiEvent::ScanRequested),
            CoordinatorInput::ExitConfirmed => self.emit(UiEvent::ExitConfirmed),
            CoordinatorInput::Submission { attempt, update } => {
                self.on_submission(attempt, update)
            }
            CoordinatorInput::ProcessConnection(state) => self.on_process_connection(state),
            CoordinatorInput::ClearSession => self.clear_session(),
        }
    }

    pub(crate) fn emit(&self, event: UiEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("ui_event_dropped_no_consumer");
        }
    }

    pub(crate) fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut CoordinatorState),
    {
        self.state_tx.send_modify(f);
    }
}
