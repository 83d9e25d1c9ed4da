//! MQTT transport (rumqttc).
//!
//! [`connect`] returns the publishing half immediately; [`MqttListener::run`]
//! drives the connection, resubscribes after every (re)connect and forwards
//! decoded messages to the skill.
//!
//! The listener task is the only one polling the event loop, and the skill
//! publishes through the same client. The listener therefore never awaits
//! the skill or the client's request queue: inbound messages the skill has
//! no room for are dropped.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use super::Publisher;
use super::messages::{self, Inbound, Outbound};
use crate::error::{MessageError, TransportError};
use crate::tracing::prelude::*;

const CLIENT_CAPACITY: usize = 64;
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Ringtones are sent as one message.
const MAX_PACKET_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub intent_namespace: String,
}

/// Open the client. No network traffic happens until the listener runs.
pub fn connect(settings: &MqttSettings) -> (MqttPublisher, MqttListener) {
    let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
    options.set_keep_alive(KEEP_ALIVE);
    options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

    let (client, eventloop) = AsyncClient::new(options, CLIENT_CAPACITY);
    let publisher = MqttPublisher {
        client: client.clone(),
    };
    let listener = MqttListener {
        client,
        eventloop,
        namespace: settings.intent_namespace.clone(),
    };
    (publisher, listener)
}

#[derive(Debug, Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, message: Outbound) -> Result<(), TransportError> {
        let topic = message.topic();
        let payload = message.payload()?;
        trace!(topic = %topic, bytes = payload.len(), "Publishing");
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))
    }
}

pub struct MqttListener {
    client: AsyncClient,
    eventloop: EventLoop,
    namespace: String,
}

impl MqttListener {
    /// Poll the connection until cancelled or the skill stops listening.
    pub async fn run(mut self, inbound_tx: mpsc::Sender<Inbound>, cancellation: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancellation.cancelled() => break,
                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT broker");
                    self.subscribe();
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match Inbound::parse(&publish.topic, &publish.payload, &self.namespace) {
                        Ok(message) => {
                            if forward(&inbound_tx, message) == Forward::Closed {
                                debug!("Inbound channel closed, stopping MQTT listener");
                                break;
                            }
                        }
                        Err(MessageError::UnknownTopic(topic)) => {
                            trace!(topic = %topic, "Ignoring message");
                        }
                        Err(e) => warn!(error = %e, "Dropping malformed message"),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "MQTT connection error, retrying");
                    tokio::select! {
                        _ = cancellation.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }

        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect failed");
        }
    }

    fn subscribe(&self) {
        for filter in messages::subscriptions() {
            if let Err(e) = self.client.try_subscribe(&filter, QoS::AtLeastOnce) {
                error!(filter = %filter, error = %e, "Subscribe failed");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Forward {
    Delivered,
    Dropped,
    Closed,
}

/// Hand a message to the skill without waiting for room.
fn forward(inbound_tx: &mpsc::Sender<Inbound>, message: Inbound) -> Forward {
    match inbound_tx.try_send(message) {
        Ok(()) => Forward::Delivered,
        Err(TrySendError::Full(message)) => {
            warn!(message = ?message, "Skill busy, dropping inbound message");
            Forward::Dropped
        }
        Err(TrySendError::Closed(_)) => Forward::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SiteId;

    fn hotword(site: &str) -> Inbound {
        Inbound::Hotword {
            site_id: SiteId::from(site),
        }
    }

    #[test]
    fn should_drop_instead_of_waiting_when_skill_is_busy() {
        let (tx, mut rx) = mpsc::channel(1);

        assert_eq!(forward(&tx, hotword("bedroom")), Forward::Delivered);
        assert_eq!(forward(&tx, hotword("kitchen")), Forward::Dropped);

        assert_eq!(rx.try_recv().ok(), Some(hotword("bedroom")));
        assert!(rx.try_recv().is_err());
        assert_eq!(forward(&tx, hotword("kitchen")), Forward::Delivered);
    }

    #[test]
    fn should_report_closed_when_skill_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        assert_eq!(forward(&tx, hotword("bedroom")), Forward::Closed);
    }
}
