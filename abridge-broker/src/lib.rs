//! The `abridge-broker` crate defines the MQTT bridge layer for the
//! alarm-bridge system: it turns state-change notifications produced by
//! the alarm layer into retained broker publishes, and filters raw
//! inbound broker messages into validated
//! [`abridge_command::InboundCommand`]s for the alarm layer to collect.
//!
//! The crate defines a top-level [`bridge()`] constructor, which connects
//! to the broker and exposes an actor handle, plus an internal drain
//! task, that act in coordination to meet the following
//! responsibilities:
//! 1. Own the broker connection via the [`ConnectionSupervisor`], the
//!    only component that mutates the [`ConnectionState`] variable. On
//!    an unsolicited connection loss while listening it reconnects with
//!    bounded, jittered exponential backoff, re-subscribing on success,
//!    and surfaces a [`BridgeEvent::ConnectionLost`] once the retry
//!    budget is spent
//! 2. Drain the unbounded outbound notification queue on a dedicated
//!    task. The task suspends on an empty queue (woken by a new
//!    submission or the shutdown signal, never spinning) and hands each
//!    packet to the publish path: retained, topic `topic_base + key`,
//!    failures logged and dropped
//! 3. Route each raw inbound message through the command router, which
//!    strips the listen-topic prefix, parses base-topic payloads as
//!    panel commands and queues only the valid ones. Inbound command
//!    processing as a whole is gated by the `enable_commands` config
//!    flag
//!
//! The broker client itself is a capability behind the [`BrokerClient`]
//! trait; [`RumqttClient`] is the shipped implementation and delivers
//! inbound traffic over a [`ClientEvent`] channel. See the below example
//!
//! # Examples
//! ```no_run
//! use abridge_broker::{bridge, BridgeConfig, RumqttClient, SubmitNotification};
//! use abridge_command::{Notification, NotificationAction};
//!
//! #[actix::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BridgeConfig {
//!         enable_commands: true,
//!         ..Default::default()
//!     };
//!     let (client, client_events) = RumqttClient::new();
//!
//!     let (handle, _bridge_events, _drain_task) =
//!         bridge(config, Box::new(client), client_events).await?;
//!
//!     handle
//!         .send(SubmitNotification(Notification::new(
//!             "/zone/3",
//!             "OPEN",
//!             NotificationAction::Update,
//!         )))
//!         .await??;
//!     Ok(())
//! }
//! ```

mod bridge;
mod client;
mod config;
mod queue;
mod router;
mod supervisor;

pub(crate) use queue::CommandQueue;
pub(crate) use router::CommandRouter;

pub use bridge::{
    bridge, BridgeError, BridgeEvent, BridgeHandle, InboundPending, PollInboundCommands, Shutdown,
    SubmitNotification,
};
pub use client::{BrokerClient, ClientError, ClientEvent, InboundMessage, RumqttClient};
pub use config::BridgeConfig;
pub use supervisor::{ConnectionState, ConnectionSupervisor, SupervisorError};

/// Every published message is retained so late subscribers see
/// last-known state. Fixed policy, not configurable
pub const RETAIN_MESSAGES: bool = true;

// How long the shipped client waits for the broker ack before giving
// up on the initial handshake
pub(crate) const CONNECT_ACK_TIMEOUT_SECS: u64 = 10;
