use actix::{prelude::*, Actor};
use futures::prelude::*;
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

use abridge_command::{InboundCommand, Notification};

use crate::{
    client::{BrokerClient, ClientEvent},
    config::BridgeConfig,
    supervisor::{ConnectionSupervisor, SupervisorError},
    CommandQueue, CommandRouter,
};

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Connection Error")]
    Connection(#[from] SupervisorError),
    #[error("Bridge is shut down")]
    Closed,
}

/// Out-of-band events the bridge surfaces to the embedding application
/// on the receiver returned by [`bridge()`]
#[derive(Debug)]
pub enum BridgeEvent {
    /// Connection recovered after an unsolicited drop
    Reconnected { attempts: u32 },
    /// The reconnect budget is spent and the drain loop has exited
    ConnectionLost(SupervisorError),
}

/// Worker side of the bridge: owns the supervisor (and through it the
/// broker client), the outbound queue receiver and the inbound router.
/// Runs as one dedicated task so queue draining is exactly-once per
/// entry without any shared locking on the publish path
struct Bridge {
    supervisor: ConnectionSupervisor,
    router: CommandRouter,
    outbound_rx: UnboundedReceiver<Notification>,
    client_events: UnboundedReceiverStream<ClientEvent>,
    shutdown_rx: UnboundedReceiver<()>,
    events_tx: UnboundedSender<BridgeEvent>,
}

impl Bridge {
    async fn event_loop(&mut self) {
        loop {
            let client_event = self.client_events.next().fuse();

            tokio::select! {
                Some(packet) = self.outbound_rx.recv() => {
                    log::debug!("Sending notification packet via MQTT bridge [{packet:}]");
                    self.supervisor.publish_notification(&packet).await;
                }
                Some(event) = client_event => {
                    match event {
                        ClientEvent::Message(message) => self.router.route(message),
                        ClientEvent::ConnectionLost(reason) => {
                            log::warn!("MQTT connection lost while listening: {reason:}");
                            match self.supervisor.reconnect().await {
                                Ok(attempts) => {
                                    self.events_tx
                                        .send(BridgeEvent::Reconnected { attempts })
                                        .ok();
                                }
                                Err(e) => {
                                    log::error!("Giving up on MQTT reconnection {e:}");
                                    self.events_tx.send(BridgeEvent::ConnectionLost(e)).ok();
                                    break;
                                }
                            }
                        }
                    }
                }
                Some(()) = self.shutdown_rx.recv() => {
                    self.drain_remaining().await;
                    self.supervisor.shutdown().await;
                    break;
                }
                else => break,
            };
        }
    }

    /// Everything submitted before the shutdown signal still gets its
    /// publish attempt
    async fn drain_remaining(&mut self) {
        while let Ok(packet) = self.outbound_rx.try_recv() {
            log::debug!("Draining queued notification before disconnect [{packet:}]");
            self.supervisor.publish_notification(&packet).await;
        }
    }
}

/// The [`BridgeHandle`] provides the embedding application a minimal
/// handle exposing only the public contract of the bridge: submit
/// outbound notifications, poll or peek the validated inbound command
/// queue, and signal shutdown
pub struct BridgeHandle {
    outbound: UnboundedSender<Notification>,
    shutdown: UnboundedSender<()>,
    inbound: CommandQueue,
}

impl Actor for BridgeHandle {
    type Context = Context<Self>;
}

/// Append one notification to the outbound queue. Never blocks and
/// always succeeds while the drain loop is alive (the queue is
/// unbounded; a broker outage grows it without backpressure)
#[derive(Message)]
#[rtype(result = "SubmitResponse")]
pub struct SubmitNotification(pub Notification);
type SubmitResponse = Result<(), BridgeError>;

impl Handler<SubmitNotification> for BridgeHandle {
    type Result = SubmitResponse;

    fn handle(&mut self, msg: SubmitNotification, _ctx: &mut Self::Context) -> Self::Result {
        log::debug!("Added notification packet to MQTT queue [{:}]", msg.0);
        self.outbound.send(msg.0).map_err(|_| BridgeError::Closed)
    }
}

/// Atomically drain and return everything currently in the inbound
/// queue, preserving arrival order; empty when nothing is pending
#[derive(Message)]
#[rtype(result = "PollResponse")]
pub struct PollInboundCommands;
type PollResponse = Result<Vec<InboundCommand>, BridgeError>;

impl Handler<PollInboundCommands> for BridgeHandle {
    type Result = PollResponse;

    fn handle(&mut self, _msg: PollInboundCommands, _ctx: &mut Self::Context) -> Self::Result {
        Ok(self.inbound.drain())
    }
}

/// Non-blocking peek at whether validated commands are waiting
#[derive(Message)]
#[rtype(result = "PendingResponse")]
pub struct InboundPending;
type PendingResponse = Result<bool, BridgeError>;

impl Handler<InboundPending> for BridgeHandle {
    type Result = PendingResponse;

    fn handle(&mut self, _msg: InboundPending, _ctx: &mut Self::Context) -> Self::Result {
        Ok(self.inbound.pending())
    }
}

/// Signal the drain loop to stop after finishing the current pass: it
/// drains the remaining outbound entries, unsubscribes and disconnects
/// under the configured timeout. Awaiting the join handle returned by
/// [`bridge()`] observes the (bounded) completion
#[derive(Message)]
#[rtype(result = "ShutdownResponse")]
pub struct Shutdown;
type ShutdownResponse = Result<(), BridgeError>;

impl Handler<Shutdown> for BridgeHandle {
    type Result = ShutdownResponse;

    fn handle(&mut self, _msg: Shutdown, _ctx: &mut Self::Context) -> Self::Result {
        self.shutdown.send(()).map_err(|_| BridgeError::Closed)
    }
}

/// Public constructor for the bridge layer. Connects to the broker,
/// subscribes to the listen filter and spawns the drain loop, returning
/// the actor handle for the public contract, the out-of-band
/// [`BridgeEvent`] receiver, and the drain task join handle. A connect
/// failure comes back as an error for the caller to act on (retry, run
/// degraded, abort); the bridge never terminates the process
pub async fn bridge(
    config: BridgeConfig,
    client: Box<dyn BrokerClient>,
    client_events: UnboundedReceiver<ClientEvent>,
) -> Result<
    (
        Addr<BridgeHandle>,
        UnboundedReceiver<BridgeEvent>,
        tokio::task::JoinHandle<()>,
    ),
    BridgeError,
> {
    let mut supervisor = ConnectionSupervisor::new(config.clone(), client);
    supervisor.start().await?;

    let inbound = CommandQueue::new();
    let router = CommandRouter::new(&config, inbound.clone());

    let (outbound_tx, outbound_rx) = unbounded_channel();
    let (shutdown_tx, shutdown_rx) = unbounded_channel();
    let (events_tx, events_rx) = unbounded_channel();

    let mut worker = Bridge {
        supervisor,
        router,
        outbound_rx,
        client_events: UnboundedReceiverStream::new(client_events),
        shutdown_rx,
        events_tx,
    };

    let drain_task = tokio::spawn(async move {
        worker.event_loop().await;
        log::warn!("Bridge exiting drain loop");
    });

    let handle = BridgeHandle {
        outbound: outbound_tx,
        shutdown: shutdown_tx,
        inbound,
    }
    .start();

    Ok((handle, events_rx, drain_task))
}
