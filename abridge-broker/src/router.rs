use abridge_command::InboundCommand;

use crate::{client::InboundMessage, config::BridgeConfig, CommandQueue};

/// Inspects each raw inbound message and either queues a validated
/// command or discards it. Invoked once per message by the drain loop;
/// inactive (every message discarded uninspected) unless commands are
/// enabled in the config
pub(crate) struct CommandRouter {
    prefix: String,
    enable_commands: bool,
    inbound: CommandQueue,
}

impl CommandRouter {
    pub fn new(config: &BridgeConfig, inbound: CommandQueue) -> Self {
        Self {
            prefix: config.listen_prefix(),
            enable_commands: config.enable_commands,
            inbound,
        }
    }

    /// One raw message in, at most one queued command out
    pub fn route(&self, message: InboundMessage) {
        if !self.enable_commands {
            return;
        }

        log::debug!(
            "Received message from MQTT in topic [{:}] ({} bytes)",
            message.topic,
            message.payload.len()
        );

        let Some(short_topic) = message.topic.strip_prefix(&self.prefix) else {
            log::debug!(
                "Message outside the listen prefix [{:}], ignoring",
                self.prefix
            );
            return;
        };

        if short_topic.is_empty() {
            // broadcast on the base listen topic, treat as a raw command
            log::trace!("Received MQTT message on base topic, treating as raw command");
            match InboundCommand::parse(&message.payload) {
                Ok(command) => self.inbound.push(command),
                Err(e) => log::info!(
                    "Received MQTT message [{:}], but not a valid alarm command, ignoring: {e:}",
                    String::from_utf8_lossy(&message.payload)
                ),
            }
        } else {
            // sub-topics below the listen topic carry no routing
            // semantics yet
            log::debug!("Ignoring message on listen sub-topic [{short_topic:}]");
        }
    }
}
