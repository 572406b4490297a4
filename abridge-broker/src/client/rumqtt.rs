use rumqttc::{AsyncClient, ConnectReturnCode, Event, Incoming, MqttOptions, QoS};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    time::{timeout_at, Duration, Instant},
};

use crate::{
    client::{BrokerClient, ClientError, ClientEvent, InboundMessage},
    config::BridgeConfig,
    CONNECT_ACK_TIMEOUT_SECS,
};

/// [`BrokerClient`] implementation backed by rumqttc. `connect` performs
/// the handshake inline (a refused or unreachable broker surfaces as a
/// connect error) and then hands the event loop to a spawned poll task,
/// which forwards publishes to the bridge and exits after reporting the
/// first connection loss. Publish and subscribe use QoS 1
pub struct RumqttClient {
    events: UnboundedSender<ClientEvent>,
    client: Option<AsyncClient>,
    poll_task: Option<tokio::task::JoinHandle<()>>,
    solicited: Arc<AtomicBool>,
}

/// A requested disconnect also ends the event loop through the error
/// path; only unsolicited drops go out as a connection loss
fn forward_loss(events: &UnboundedSender<ClientEvent>, solicited: &AtomicBool, reason: String) {
    if solicited.load(Ordering::SeqCst) {
        log::debug!("MQTT event loop closed after requested disconnect");
    } else {
        log::warn!("MQTT event loop error {reason:}");
        events.send(ClientEvent::ConnectionLost(reason)).ok();
    }
}

impl RumqttClient {
    /// Returns the client and the event stream the bridge consumes
    pub fn new() -> (Self, UnboundedReceiver<ClientEvent>) {
        let (events, events_rx) = unbounded_channel();
        (
            Self {
                events,
                client: None,
                poll_task: None,
                solicited: Arc::new(AtomicBool::new(false)),
            },
            events_rx,
        )
    }

    fn parse_uri(uri: &str) -> Result<(String, u16), ClientError> {
        let trimmed = uri
            .strip_prefix("tcp://")
            .or_else(|| uri.strip_prefix("mqtt://"))
            .unwrap_or(uri);

        match trimmed.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| ClientError::Uri(format!("bad port in [{uri}]: {e}")))?;
                Ok((host.to_string(), port))
            }
            None => Ok((trimmed.to_string(), 1883)),
        }
    }
}

#[async_trait::async_trait]
impl BrokerClient for RumqttClient {
    async fn connect(&mut self, config: &BridgeConfig) -> Result<(), ClientError> {
        // Clear any remains of a previous connection
        self.client = None;
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        self.solicited.store(false, Ordering::SeqCst);

        let (host, port) = Self::parse_uri(&config.broker_uri)?;
        let mut options = MqttOptions::new(config.client_id.clone(), host, port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if !config.username.is_empty() {
            options.set_credentials(config.username.clone(), config.password.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 64);

        // Poll for the broker ack before handing the loop off, so the
        // caller sees a real result instead of a fire-and-forget
        let deadline = Instant::now() + Duration::from_secs(CONNECT_ACK_TIMEOUT_SECS);
        loop {
            match timeout_at(deadline, eventloop.poll()).await {
                Err(_) => {
                    return Err(ClientError::Connect(
                        "timed out waiting for broker ack".to_string(),
                    ))
                }
                Ok(Err(e)) => return Err(ClientError::Connect(e.to_string())),
                Ok(Ok(Event::Incoming(Incoming::ConnAck(ack)))) => {
                    if ack.code == ConnectReturnCode::Success {
                        break;
                    }
                    return Err(ClientError::Connect(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )));
                }
                Ok(Ok(event)) => {
                    log::trace!("MQTT event before ack {event:?}");
                }
            }
        }

        let events = self.events.clone();
        let solicited = self.solicited.clone();
        let task = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        events
                            .send(ClientEvent::Message(InboundMessage {
                                topic: publish.topic.clone(),
                                payload: publish.payload.to_vec(),
                            }))
                            .ok();
                    }
                    Ok(event) => {
                        log::trace!("MQTT event {event:?}");
                    }
                    Err(e) => {
                        forward_loss(&events, &solicited, e.to_string());
                        break;
                    }
                }
            }
            log::debug!("MQTT poll task exiting");
        });

        self.client = Some(client);
        self.poll_task = Some(task);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ClientError> {
        self.solicited.store(true, Ordering::SeqCst);
        if let Some(client) = self.client.take() {
            client
                .disconnect()
                .await
                .map_err(|e| ClientError::Disconnect(e.to_string()))?;
        }
        if let Some(task) = self.poll_task.take() {
            // The poll task flushes the DISCONNECT and exits once the
            // broker closes the connection; the supervisor bounds this
            // whole call with its shutdown timeout
            task.await.ok();
        }
        Ok(())
    }

    async fn subscribe(&mut self, filter: &str) -> Result<(), ClientError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ClientError::Subscribe("not connected".to_string()))?;
        client
            .subscribe(filter, QoS::AtLeastOnce)
            .await
            .map_err(|e| ClientError::Subscribe(e.to_string()))
    }

    async fn unsubscribe(&mut self, filter: &str) -> Result<(), ClientError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ClientError::Unsubscribe("not connected".to_string()))?;
        client
            .unsubscribe(filter)
            .await
            .map_err(|e| ClientError::Unsubscribe(e.to_string()))
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), ClientError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ClientError::Publish("not connected".to_string()))?;
        client
            .publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .await
            .map_err(|e| ClientError::Publish(e.to_string()))
    }
}

impl Drop for RumqttClient {
    fn drop(&mut self) {
        if let Some(task) = &self.poll_task {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_broker_uris() {
        assert_eq!(
            RumqttClient::parse_uri("tcp://broker.local:1884").unwrap(),
            ("broker.local".to_string(), 1884)
        );
        assert_eq!(
            RumqttClient::parse_uri("mqtt://10.0.0.7:1883").unwrap(),
            ("10.0.0.7".to_string(), 1883)
        );
        // bare host falls back to the default port
        assert_eq!(
            RumqttClient::parse_uri("broker.local").unwrap(),
            ("broker.local".to_string(), 1883)
        );
        assert!(RumqttClient::parse_uri("tcp://broker.local:notaport").is_err());
    }

    #[test]
    fn requested_disconnect_is_not_a_connection_loss() {
        let (events, mut events_rx) = unbounded_channel();

        let solicited = AtomicBool::new(true);
        forward_loss(&events, &solicited, "connection closed".to_string());
        assert!(events_rx.try_recv().is_err());

        solicited.store(false, Ordering::SeqCst);
        forward_loss(&events, &solicited, "broker went away".to_string());
        match events_rx.try_recv() {
            Ok(ClientEvent::ConnectionLost(reason)) => assert_eq!(reason, "broker went away"),
            other => panic!("expected connection loss, got {other:?}"),
        }
    }
}
