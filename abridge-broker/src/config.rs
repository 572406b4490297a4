use serde::Deserialize;

/// Connection configuration for the bridge. Immutable after
/// construction; the topic base and listen topic are fixed for the
/// lifetime of a bridge instance
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Broker URI, e.g. `tcp://localhost:1883`
    pub broker_uri: String,
    pub client_id: String,
    /// Empty string means no credentials in the connect handshake
    pub username: String,
    pub password: String,
    /// Prefix for every outbound topic; notification keys are appended
    /// verbatim (no separator inserted)
    pub topic_base: String,
    /// Topic below the base the bridge listens on for commands
    pub listen_topic: String,
    /// Gates all inbound command processing
    pub enable_commands: bool,
    pub keep_alive_secs: u64,
    /// First reconnect delay; doubles per attempt up to the cap
    pub reconnect_base_ms: u64,
    pub reconnect_cap_ms: u64,
    /// Connect attempts before the supervisor gives up on reconnection
    pub reconnect_budget: u32,
    /// Upper bound on the unsubscribe + disconnect wait during shutdown
    pub shutdown_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            broker_uri: "tcp://localhost:1883".to_string(),
            client_id: "alarm-bridge".to_string(),
            username: String::new(),
            password: String::new(),
            topic_base: "alarm".to_string(),
            listen_topic: "commands".to_string(),
            enable_commands: false,
            keep_alive_secs: 30,
            reconnect_base_ms: 1000,
            reconnect_cap_ms: 60_000,
            reconnect_budget: 10,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl BridgeConfig {
    /// Filter the bridge subscribes to: `topic_base/listen_topic/#`
    pub fn listen_filter(&self) -> String {
        format!("{}/{}/#", self.topic_base, self.listen_topic)
    }

    /// Literal prefix stripped from inbound topics before dispatch
    pub fn listen_prefix(&self) -> String {
        format!("{}/{}", self.topic_base, self.listen_topic)
    }

    /// Outbound topic for a notification key
    pub fn publish_topic(&self, key: &str) -> String {
        format!("{}{}", self.topic_base, key)
    }
}
