use abridge_command::{Notification, NotificationAction};
use rand::Rng;
use thiserror::Error;
use tokio::time::Duration;

use crate::{
    client::{BrokerClient, ClientError},
    config::BridgeConfig,
    RETAIN_MESSAGES,
};

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Client Error")]
    Client(#[from] ClientError),
    #[error("Reconnect budget exhausted after {0} attempts")]
    BudgetExhausted(u32),
}

/// Connection lifecycle for the bridge. Transitions:
/// `Disconnected -> Connecting` on start, `Connecting -> Connected` on
/// broker ack (or back to `Disconnected` on failure),
/// `Connected -> Listening` on subscribe success, and
/// `Listening -> ShuttingDown -> Disconnected` on shutdown. An
/// unsolicited loss while listening goes back through `Connecting`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Listening,
    ShuttingDown,
}

/// Owns the broker connection and the one [`ConnectionState`] variable;
/// nothing else in the crate mutates it. Also the home of the outbound
/// publish policy, since it owns the client
pub struct ConnectionSupervisor {
    state: ConnectionState,
    config: BridgeConfig,
    /// Dynamic trait object so any broker client library can back the
    /// bridge
    client: Box<dyn BrokerClient>,
}

impl ConnectionSupervisor {
    pub fn new(config: BridgeConfig, client: Box<dyn BrokerClient>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            client,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Establish the initial connection and subscribe to the listen
    /// filter. A connect failure is returned for the caller to decide
    /// on (retry, degrade, abort); a subscribe failure is logged and
    /// leaves the connection up
    pub async fn start(&mut self) -> Result<(), SupervisorError> {
        self.state = ConnectionState::Connecting;
        if let Err(e) = self.client.connect(&self.config).await {
            self.state = ConnectionState::Disconnected;
            return Err(SupervisorError::Client(e));
        }
        self.state = ConnectionState::Connected;
        log::info!(
            "Connection successful to MQTT broker [{:}]",
            self.config.broker_uri
        );

        self.subscribe().await;
        Ok(())
    }

    async fn subscribe(&mut self) {
        let filter = self.config.listen_filter();
        match self.client.subscribe(&filter).await {
            Ok(()) => {
                self.state = ConnectionState::Listening;
                log::trace!("Listening for input on MQTT topic [{filter:}]");
            }
            Err(e) => {
                // failed subscribe does not tear down the connection
                log::warn!("Subscribe failed on MQTT topic [{filter:}]: {e:}");
            }
        }
    }

    /// Publish one notification. A `New` with no value is skipped,
    /// everything else goes out retained to `topic_base + key`. Publish
    /// failures are logged and the packet is dropped, no retry; the
    /// drain loop continues with the next queued item
    pub async fn publish_notification(&mut self, packet: &Notification) {
        if packet.action == NotificationAction::New && packet.value.is_empty() {
            log::trace!("New object detected with no value, skipping MQTT publish");
            return;
        }

        let topic = self.config.publish_topic(&packet.key);
        match self
            .client
            .publish(&topic, packet.value.as_bytes(), RETAIN_MESSAGES)
            .await
        {
            Ok(()) => log::trace!(
                "Sent MQTT message [{:}] in topic [{topic:}]",
                packet.value
            ),
            Err(e) => log::warn!("Dropping notification [{packet:}] after publish failure {e:}"),
        }
    }

    /// Bounded reconnection with jittered exponential backoff.
    /// Re-subscribes on success and returns the attempts used; exhausts
    /// the configured budget into an error for the observer
    pub async fn reconnect(&mut self) -> Result<u32, SupervisorError> {
        self.state = ConnectionState::Connecting;
        let budget = self.config.reconnect_budget;

        for attempt in 1..=budget {
            let delay = self.backoff_delay(attempt);
            log::warn!("MQTT reconnect attempt {attempt:}/{budget:} in {delay:?}");
            tokio::time::sleep(delay).await;

            match self.client.connect(&self.config).await {
                Ok(()) => {
                    self.state = ConnectionState::Connected;
                    log::info!("Reconnected to MQTT broker after {attempt:} attempt(s)");
                    self.subscribe().await;
                    return Ok(attempt);
                }
                Err(e) => log::warn!("Reconnect attempt {attempt:} failed {e:}"),
            }
        }

        self.state = ConnectionState::Disconnected;
        Err(SupervisorError::BudgetExhausted(budget))
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_ms.max(1);
        let cap = self.config.reconnect_cap_ms.max(base);
        // doubles per attempt, capped; the shift bound keeps the
        // multiplier from overflowing on large budgets
        let exp = base.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
        let capped = exp.min(cap);
        let jittered = rand::thread_rng().gen_range(capped / 2..=capped);
        Duration::from_millis(jittered)
    }

    /// Unsubscribe and disconnect, bounded by the configured timeout so
    /// shutdown never blocks indefinitely on a broker that won't
    /// confirm disconnection
    pub async fn shutdown(&mut self) {
        self.state = ConnectionState::ShuttingDown;
        let bound = Duration::from_millis(self.config.shutdown_timeout_ms);
        let filter = self.config.listen_filter();

        let client = &mut self.client;
        let teardown = async {
            if let Err(e) = client.unsubscribe(&filter).await {
                log::warn!("Unsubscribe failed on MQTT topic [{filter:}]: {e:}");
            }
            if let Err(e) = client.disconnect().await {
                log::warn!("Error while disconnecting from MQTT broker {e:}");
            }
        };

        if tokio::time::timeout(bound, teardown).await.is_err() {
            log::warn!("Broker did not confirm disconnect within {bound:?}");
        }

        self.state = ConnectionState::Disconnected;
        log::info!("Shutdown MQTT bridge connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockCall, MockClient};

    fn config() -> BridgeConfig {
        BridgeConfig {
            reconnect_base_ms: 10,
            reconnect_cap_ms: 100,
            reconnect_budget: 5,
            shutdown_timeout_ms: 100,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn start_connects_and_subscribes() {
        let client = MockClient::new();
        let mut supervisor = ConnectionSupervisor::new(config(), Box::new(client.clone()));

        supervisor.start().await.unwrap();
        assert_eq!(supervisor.state(), ConnectionState::Listening);
        assert_eq!(
            client.calls(),
            vec![
                MockCall::Connect,
                MockCall::Subscribe("alarm/commands/#".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn start_surfaces_connect_failure() {
        let client = MockClient::failing_connects(1);
        let mut supervisor = ConnectionSupervisor::new(config(), Box::new(client));

        assert!(supervisor.start().await.is_err());
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn subscribe_failure_leaves_connection_up() {
        let mut client = MockClient::new();
        client.fail_subscribe = true;
        let mut supervisor = ConnectionSupervisor::new(config(), Box::new(client));

        supervisor.start().await.unwrap();
        assert_eq!(supervisor.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_retries_until_success() {
        let client = MockClient::failing_connects(2);
        let mut supervisor = ConnectionSupervisor::new(config(), Box::new(client.clone()));

        let attempts = supervisor.reconnect().await.unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(supervisor.state(), ConnectionState::Listening);
        assert_eq!(client.connect_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_gives_up_after_budget() {
        let client = MockClient::failing_connects(u32::MAX);
        let mut supervisor = ConnectionSupervisor::new(
            BridgeConfig {
                reconnect_budget: 2,
                ..config()
            },
            Box::new(client.clone()),
        );

        match supervisor.reconnect().await {
            Err(SupervisorError::BudgetExhausted(2)) => {}
            other => panic!("expected exhausted budget, got {other:?}"),
        }
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        assert_eq!(client.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn skips_empty_new_notifications() {
        let client = MockClient::new();
        let mut supervisor = ConnectionSupervisor::new(config(), Box::new(client.clone()));
        supervisor.start().await.unwrap();

        supervisor
            .publish_notification(&Notification::new("/zone/9", "", NotificationAction::New))
            .await;
        assert!(client.published().is_empty());

        // an empty value is only skipped for New
        supervisor
            .publish_notification(&Notification::new("/zone/9", "", NotificationAction::Delete))
            .await;
        assert_eq!(client.published().len(), 1);
    }

    #[tokio::test]
    async fn publishes_retained_to_base_plus_key() {
        let client = MockClient::new();
        let mut supervisor = ConnectionSupervisor::new(config(), Box::new(client.clone()));
        supervisor.start().await.unwrap();

        supervisor
            .publish_notification(&Notification::new(
                "/zone/3",
                "OPEN",
                NotificationAction::Update,
            ))
            .await;

        assert_eq!(
            client.published(),
            vec![MockCall::Publish {
                topic: "alarm/zone/3".to_string(),
                payload: b"OPEN".to_vec(),
                retain: true,
            }]
        );
    }

    #[tokio::test]
    async fn publish_failure_drops_the_packet_and_continues() {
        let mut client = MockClient::new();
        client.fail_publish = true;
        let mut supervisor = ConnectionSupervisor::new(config(), Box::new(client.clone()));
        supervisor.start().await.unwrap();

        supervisor
            .publish_notification(&Notification::new("/a", "1", NotificationAction::Update))
            .await;
        supervisor
            .publish_notification(&Notification::new("/b", "2", NotificationAction::Update))
            .await;

        // both were attempted; the failures were swallowed
        assert_eq!(client.published().len(), 2);
        assert_eq!(supervisor.state(), ConnectionState::Listening);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_bounded_when_disconnect_hangs() {
        let mut client = MockClient::new();
        client.hang_disconnect = true;
        let mut supervisor = ConnectionSupervisor::new(config(), Box::new(client));
        supervisor.start().await.unwrap();

        // completes via the timeout arm rather than hanging forever
        supervisor.shutdown().await;
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }
}
