//! MQTT publisher for the cross-process time signal
//!
//! Publishes `{"<key>": "HH:MM:SS", "ts": <epoch ms>}` to the configured
//! topic at QoS 0 (at most once). A stop is published as `{"<key>": null}`.

use crate::infra::config::Config;
use crate::io::tick_channel::BroadcastMessage;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// MQTT publisher actor
///
/// Receives messages from the tick channel and publishes to the broadcast topic.
pub struct TickPublisher {
    client: AsyncClient,
    rx: mpsc::Receiver<BroadcastMessage>,
    topic: String,
    key: String,
}

impl TickPublisher {
    /// Create a new publisher connected to the configured broker
    pub fn new(config: &Config, rx: mpsc::Receiver<BroadcastMessage>) -> Self {
        let client_id = format!("checkin-timer-{}", uuid::Uuid::now_v7().simple());
        let mut mqttoptions =
            MqttOptions::new(client_id, config.broadcast_host(), config.broadcast_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) =
            (config.broadcast_username(), config.broadcast_password())
        {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        // Spawn the eventloop handler
        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("tick_broadcast_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "tick_broadcast_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            client,
            rx,
            topic: config.broadcast_topic().to_string(),
            key: config.broadcast_key().to_string(),
        }
    }

    /// Run the publisher loop until shutdown
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(topic = %self.topic, key = %self.key, "tick_broadcast_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("tick_broadcast_shutdown");
                        return;
                    }
                }
                msg = self.rx.recv() => {
                    match msg {
                        Some(msg) => self.publish_message(msg).await,
                        None => return,
                    }
                }
            }
        }
    }

    async fn publish_message(&self, msg: BroadcastMessage) {
        let json = encode_message(&self.key, &msg);
        if let Err(e) = self.client.try_publish(&self.topic, QoS::AtMostOnce, false, json) {
            debug!(error = %e, "tick_broadcast_publish_failed");
        }
    }
}

/// Encode a broadcast message under the configured key
pub fn encode_message(key: &str, msg: &BroadcastMessage) -> String {
    let mut obj = serde_json::Map::new();
    match msg {
        BroadcastMessage::Tick(payload) => {
            obj.insert(key.to_string(), serde_json::Value::String(payload.time.clone()));
            obj.insert("ts".to_string(), serde_json::Value::Number(payload.ts.into()));
        }
        BroadcastMessage::Stopped { ts } => {
            obj.insert(key.to_string(), serde_json::Value::Null);
            obj.insert("ts".to_string(), serde_json::Value::Number((*ts).into()));
        }
    }
    serde_json::Value::Object(obj).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::tick_channel::TickPayload;

    #[test]
    fn test_encode_tick() {
        let msg = BroadcastMessage::Tick(TickPayload { time: "00:01:02".to_string(), ts: 99 });
        let parsed: serde_json::Value =
            serde_json::from_str(&encode_message("elapsed", &msg)).unwrap();
        assert_eq!(parsed["elapsed"], "00:01:02");
        assert_eq!(parsed["ts"], 99);
    }

    #[test]
    fn test_encode_stopped() {
        let msg = BroadcastMessage::Stopped { ts: 5 };
        let parsed: serde_json::Value =
            serde_json::from_str(&encode_message("elapsed", &msg)).unwrap();
        assert!(parsed["elapsed"].is_null());
        assert_eq!(parsed["ts"], 5);
    }
}
