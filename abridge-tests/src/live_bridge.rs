//! Manual harness for exercising the bridge against a live MQTT broker
//! (e.g. a local mosquitto). Publishes a few retained status updates,
//! then polls the inbound command queue until interrupted. Commands can
//! be injected with e.g.
//! `mosquitto_pub -t alarm/commands -m '{"command":"arm_stay"}'`

use abridge_broker::{
    bridge, BridgeConfig, BridgeEvent, PollInboundCommands, RumqttClient, Shutdown,
    SubmitNotification,
};
use abridge_command::{Notification, NotificationAction};

#[actix::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    log::info!("Initializing MQTT bridge");

    let config = BridgeConfig {
        enable_commands: true,
        ..Default::default()
    };
    let (client, client_events) = RumqttClient::new();

    let (handle, mut bridge_events, drain_task) = bridge(config, Box::new(client), client_events)
        .await
        .map_err(|e| {
            log::error!("Error starting bridge {e:}");
            e
        })?;

    for (key, value) in [
        ("/partition/1/status", "READY"),
        ("/zone/1", "CLOSED"),
        ("/zone/2", "CLOSED"),
    ] {
        handle
            .send(SubmitNotification(Notification::new(
                key,
                value,
                NotificationAction::Update,
            )))
            .await??;
    }

    let mut poll = tokio::time::interval(tokio::time::Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, shutting bridge down");
                handle.send(Shutdown).await??;
                break;
            }
            _ = poll.tick() => {
                let commands = handle.send(PollInboundCommands).await??;
                for command in commands {
                    log::info!("Collected inbound command {:?}", command.command);
                }
            }
            event = bridge_events.recv() => {
                match event {
                    Some(BridgeEvent::Reconnected { attempts }) => {
                        log::warn!("Bridge reconnected after {attempts:} attempt(s)");
                    }
                    Some(BridgeEvent::ConnectionLost(e)) => {
                        log::error!("Bridge lost its connection for good {e:}");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    drain_task.await.ok();

    Ok(())
}
