//! Typed channel for the cross-process time signal
//!
//! Provides a non-blocking way for the timer process to hand ticks to the
//! MQTT publisher. Uses a bounded mpsc channel; when it is full the tick is
//! dropped rather than delaying the next one.

use crate::domain::session::epoch_ms;
use crate::infra::metrics::Metrics;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Messages that can be sent to the broadcast publisher
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastMessage {
    /// Formatted elapsed time of the running timer
    Tick(TickPayload),
    /// Timer stopped; consumers should clear their display
    Stopped { ts: i64 },
}

/// Payload for one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickPayload {
    /// `HH:MM:SS`
    pub time: String,
    /// Timestamp (epoch ms)
    pub ts: i64,
}

/// Sender handle for broadcast messages
///
/// Clone this to share across producers.
/// Non-blocking - if the channel is full, messages are dropped.
#[derive(Clone)]
pub struct TickSender {
    tx: mpsc::Sender<BroadcastMessage>,
    metrics: Option<Arc<Metrics>>,
}

impl TickSender {
    pub fn new(tx: mpsc::Sender<BroadcastMessage>) -> Self {
        Self { tx, metrics: None }
    }

    /// Count dropped broadcasts in the given metrics
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Send a formatted tick
    pub fn send_tick(&self, formatted: &str) {
        let payload = TickPayload { time: formatted.to_string(), ts: epoch_ms() };
        self.offer(BroadcastMessage::Tick(payload));
    }

    /// Announce that the timer stopped
    pub fn send_stopped(&self) {
        self.offer(BroadcastMessage::Stopped { ts: epoch_ms() });
    }

    fn offer(&self, msg: BroadcastMessage) {
        // Use try_send to avoid blocking - drop if channel full
        if self.tx.try_send(msg).is_err() {
            if let Some(ref metrics) = self.metrics {
                metrics.record_broadcast_dropped();
            }
        }
    }
}

/// Create a new broadcast channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
pub fn create_tick_channel(buffer_size: usize) -> (TickSender, mpsc::Receiver<BroadcastMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (TickSender::new(tx), rx)
}
