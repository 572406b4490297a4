/// Mod for broker client implementations. The bridge only depends on
/// the [`BrokerClient`] capability, so any client library can back it;
/// currently an rumqttc-based implementation is provided
mod rumqtt;
pub use rumqtt::RumqttClient;

use crate::config::BridgeConfig;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connect Error {0}")]
    Connect(String),
    #[error("Subscribe Error {0}")]
    Subscribe(String),
    #[error("Unsubscribe Error {0}")]
    Unsubscribe(String),
    #[error("Publish Error {0}")]
    Publish(String),
    #[error("Disconnect Error {0}")]
    Disconnect(String),
    #[error("Broker URI Error {0}")]
    Uri(String),
}

/// One raw message delivered by the broker client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Events a broker client delivers to the bridge drain loop over the
/// channel handed out at client construction
#[derive(Debug)]
pub enum ClientEvent {
    Message(InboundMessage),
    /// Unsolicited drop; carries the client library's reason string.
    /// Reconnection is the supervisor's job, never the client's
    ConnectionLost(String),
}

/// Capability trait over the broker client. The bridge calls these and
/// nothing else, so swapping client libraries (or scripting one in
/// tests) never touches bridge code
#[async_trait::async_trait]
pub trait BrokerClient: Send {
    async fn connect(&mut self, config: &BridgeConfig) -> Result<(), ClientError>;
    async fn disconnect(&mut self) -> Result<(), ClientError>;
    async fn subscribe(&mut self, filter: &str) -> Result<(), ClientError>;
    async fn unsubscribe(&mut self, filter: &str) -> Result<(), ClientError>;
    async fn publish(&mut self, topic: &str, payload: &[u8], retain: bool)
        -> Result<(), ClientError>;
}
