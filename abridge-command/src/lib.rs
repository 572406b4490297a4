//! Shared contract types for the alarm-bridge system: outbound
//! [`Notification`]s produced by the alarm layer and destined for the
//! MQTT broker, and [`InboundCommand`]s parsed and validated from raw
//! messages received on the listen topic.
//!
//! A [`Notification`] is created once by the producing layer, queued,
//! and consumed exactly once by the bridge drain loop; it is never
//! mutated after creation. An [`InboundCommand`] can only be obtained
//! through [`InboundCommand::parse`], so every command that exists has
//! already passed validation.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Json parse Error")]
    Json(#[from] serde_json::Error),
    #[error("Keypress Error {0}")]
    Keypress(String),
}

// Keypad sequences longer than this are rejected outright
const MAX_KEYPRESS_LEN: usize = 24;

/// Action carried by a [`Notification`]. A `New` with an empty value
/// means "new object with no data yet" and is never published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationAction {
    New,
    Update,
    Delete,
}

/// One pending state change to publish to the broker. The `key` is the
/// topic suffix appended verbatim to the configured topic base, so it
/// is expected to begin with `/` where a separator is wanted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub key: String,
    pub value: String,
    pub action: NotificationAction,
}

impl Notification {
    pub fn new<K, V>(key: K, value: V, action: NotificationAction) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            key: key.into(),
            value: value.into(),
            action,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} = {}", self.action, self.key, self.value)
    }
}

/// Commands accepted from the broker on the base listen topic. The wire
/// form is an internally tagged JSON envelope, e.g.
/// `{"command":"keypress","keys":"1234#"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PanelCommand {
    ArmStay,
    ArmAway,
    Disarm,
    Keypress { keys: String },
}

impl PanelCommand {
    /// Parse and validate a raw payload. Keypress sequences are limited
    /// to the keys an alarm keypad actually has
    pub fn parse(payload: &[u8]) -> Result<Self, CommandError> {
        let command: PanelCommand = serde_json::from_slice(payload)?;
        if let PanelCommand::Keypress { keys } = &command {
            if keys.is_empty() || keys.len() > MAX_KEYPRESS_LEN {
                return Err(CommandError::Keypress(format!(
                    "sequence must be 1..={} keys, got {}",
                    MAX_KEYPRESS_LEN,
                    keys.len()
                )));
            }
            if let Some(bad) = keys
                .chars()
                .find(|c| !c.is_ascii_digit() && *c != '*' && *c != '#')
            {
                return Err(CommandError::Keypress(format!("invalid key '{bad}'")));
            }
        }
        Ok(command)
    }
}

/// A validated command collected from the broker, holding the raw
/// payload it was parsed from and the receipt timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub raw: Vec<u8>,
    pub command: PanelCommand,
    pub received_at: i64,
}

impl InboundCommand {
    /// Only constructor; a raw payload that fails validation never
    /// becomes an [`InboundCommand`]
    pub fn parse(raw: &[u8]) -> Result<Self, CommandError> {
        let command = PanelCommand::parse(raw)?;
        Ok(Self {
            raw: raw.to_vec(),
            command,
            received_at: Local::now().timestamp(),
        })
    }
}
