//! Host bridge between the coordinator and the timer process
//!
//! Executes the coordinator's timer intents, keeps one tick observer
//! attached and forwards its ticks into the coordinator's input channel.
//! Events that are not timer intents are handed back to the caller.

use crate::services::coordinator::{ConnectionState, CoordinatorInput, UiEvent};
use crate::services::timer::{ObserverId, TimerProcess};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct TimerHost {
    timer: TimerProcess,
    input_tx: mpsc::Sender<CoordinatorInput>,
    observer: Option<(ObserverId, JoinHandle<()>)>,
}

impl TimerHost {
    pub fn new(timer: TimerProcess, input_tx: mpsc::Sender<CoordinatorInput>) -> Self {
        Self { timer, input_tx, observer: None }
    }

    pub fn timer(&self) -> &TimerProcess {
        &self.timer
    }

    pub fn is_attached(&self) -> bool {
        self.observer.is_some()
    }

    /// Act on a coordinator event. Returns the event if the host UI should
    /// see it, `None` if it was fully handled here.
    pub async fn handle_event(&mut self, event: UiEvent) -> Option<UiEvent> {
        match event {
            UiEvent::StartTimer => {
                self.timer.start();
                self.attach().await;
                None
            }
            UiEvent::StopTimer => {
                self.timer.stop().await;
                self.detach().await;
                None
            }
            UiEvent::LaunchMainView => {
                self.send(CoordinatorInput::Initialise).await;
                Some(UiEvent::LaunchMainView)
            }
            other => Some(other),
        }
    }

    /// Attach a tick observer and report the connection.
    ///
    /// No-op when already attached.
    pub async fn attach(&mut self) -> bool {
        if self.observer.is_some() {
            debug!("timer_host_already_attached");
            return false;
        }

        let (id, mut ticks) = self.timer.attach();
        let input_tx = self.input_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(formatted) = ticks.recv().await {
                if input_tx.send(CoordinatorInput::Tick(formatted)).await.is_err() {
                    break;
                }
            }
        });
        self.observer = Some((id, forwarder));
        info!(observer_id = %id, timer_running = %self.timer.is_running(), "timer_host_attached");

        let state = if self.timer.is_running() {
            ConnectionState::Connected
        } else {
            ConnectionState::Unknown
        };
        self.send(CoordinatorInput::ProcessConnection(state)).await;
        true
    }

    /// Stop forwarding ticks. The timer itself keeps running.
    pub async fn detach(&mut self) -> bool {
        let Some((id, forwarder)) = self.observer.take() else {
            return false;
        };

        // Dropping the observer's sender ends the forwarder
        self.timer.detach(id);
        let _ = forwarder.await;
        info!(observer_id = %id, "timer_host_detached");

        self.send(CoordinatorInput::ProcessConnection(ConnectionState::Disconnected)).await;
        true
    }

    async fn send(&self, input: CoordinatorInput) {
        if self.input_tx.send(input).await.is_err() {
            debug!("timer_host_coordinator_gone");
        }
    }
}
