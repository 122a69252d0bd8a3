//! Cloud connection manager: connect, poll, keepalive and reconnect

use crate::fault::{ErrorKind, FaultHandler};
use crate::transport::{CloudTransport, InboundEvent, Readiness, TransportError};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use tracker_shared::state_machine::{is_valid_link_transition, LinkState};
use tracker_shared::CloudMessage;

/// Depth of the inbound event queue. Events beyond it are dropped rather
/// than stalling the connection loop.
pub const EVENT_QUEUE_DEPTH: usize = 16;

/// Configuration for the connection loop
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Ping the cloud when the link has been quiet this long
    pub keepalive: Duration,
    /// Delay before retrying a failed connect
    pub reconnect_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(tracker_shared::defaults::KEEPALIVE_SECS),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// How the poll loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Escalated to the fault handler; the loop is not restarted
    Fault(Readiness),
    /// Every sender and the event receiver were dropped
    Shutdown,
}

/// An outbound message with a confirmation channel
struct Outbound {
    msg: CloudMessage,
    reply: oneshot::Sender<Result<(), TransportError>>,
}

/// Cloneable handle for sending through the connection task
///
/// The connection task is the single writer on the transport, so callers on
/// different tasks never interleave sends.
#[derive(Debug, Clone)]
pub struct CloudSender {
    outbound_tx: mpsc::Sender<Outbound>,
    state_rx: watch::Receiver<LinkState>,
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound").field("msg", &self.msg).finish()
    }
}

impl CloudSender {
    /// Send a message and wait until the transport accepted it
    pub async fn send(&self, msg: CloudMessage) -> Result<(), TransportError> {
        if *self.state_rx.borrow() != LinkState::Connected {
            return Err(TransportError::NotConnected);
        }

        let (reply, confirmed) = oneshot::channel();
        self.outbound_tx
            .send(Outbound { msg, reply })
            .await
            .map_err(|_| TransportError::Closed)?;
        confirmed.await.map_err(|_| TransportError::Closed)?
    }

    pub fn state(&self) -> LinkState {
        *self.state_rx.borrow()
    }
}

struct LoopParts<T> {
    transport: T,
    outbound_rx: mpsc::Receiver<Outbound>,
    event_tx: mpsc::Sender<InboundEvent>,
    state_tx: watch::Sender<LinkState>,
}

/// Owns the cloud transport until the connection loop is started
pub struct ConnectionManager<T> {
    config: ConnectionConfig,
    fault: FaultHandler,
    sender: CloudSender,
    event_rx: mpsc::Receiver<InboundEvent>,
    parts: Option<LoopParts<T>>,
    task: Option<JoinHandle<LoopExit>>,
}

impl<T: CloudTransport> ConnectionManager<T> {
    /// Create a manager; the loop does not run until [`start`](Self::start)
    pub fn new(config: ConnectionConfig, transport: T, fault: FaultHandler) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Outbound>(16);
        let (event_tx, event_rx) = mpsc::channel::<InboundEvent>(EVENT_QUEUE_DEPTH);
        let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);

        Self {
            config,
            fault,
            sender: CloudSender {
                outbound_tx,
                state_rx,
            },
            event_rx,
            parts: Some(LoopParts {
                transport,
                outbound_rx,
                event_tx,
                state_tx,
            }),
            task: None,
        }
    }

    /// Spawn the connection loop. Only the first call has an effect.
    pub fn start(&mut self) -> bool {
        let Some(parts) = self.parts.take() else {
            return false;
        };

        info!("Starting cloud connection loop");
        let config = self.config.clone();
        let fault = self.fault.clone();
        self.task = Some(tokio::spawn(async move {
            connection_loop(parts, config, fault).await
        }));
        true
    }

    pub fn is_started(&self) -> bool {
        self.task.is_some()
    }

    /// Receive the next inbound transport event
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        self.event_rx.recv().await
    }

    pub fn sender(&self) -> CloudSender {
        self.sender.clone()
    }

    /// Wait for the loop to end (tests and shutdown only)
    pub async fn join(&mut self) -> Option<LoopExit> {
        match self.task.take() {
            Some(task) => task.await.ok(),
            None => None,
        }
    }
}

fn set_state(state_tx: &watch::Sender<LinkState>, to: LinkState) {
    let from = *state_tx.borrow();
    if from == to {
        return;
    }
    if !is_valid_link_transition(from, to) {
        warn!("Unexpected link transition {} -> {}", from, to);
    }
    debug!("Link {} -> {}", from, to);
    let _ = state_tx.send(to);
}

/// Main connection loop with reconnection logic
async fn connection_loop<T: CloudTransport>(
    mut parts: LoopParts<T>,
    config: ConnectionConfig,
    fault: FaultHandler,
) -> LoopExit {
    loop {
        set_state(&parts.state_tx, LinkState::Connecting);

        if let Err(e) = parts.transport.connect().await {
            warn!("cloud connect via {} failed: {}", parts.transport.name(), e);
            set_state(&parts.state_tx, LinkState::Disconnected);
            tokio::time::sleep(config.reconnect_delay).await;
            continue;
        }

        info!("Connected to cloud via {}", parts.transport.name());
        set_state(&parts.state_tx, LinkState::Connected);
        if !deliver(&parts.event_tx, InboundEvent::Connected) {
            return LoopExit::Shutdown;
        }

        let result = poll_connection(&mut parts, &config).await;

        parts.transport.disconnect().await;
        set_state(&parts.state_tx, LinkState::Disconnected);

        match result {
            PollEnd::Clean => {
                // The transport applies its own backoff
                info!("Cloud connection closed, reconnecting");
            }
            PollEnd::Fault(readiness) => {
                let reason = match readiness {
                    Readiness::InvalidHandle => "Socket error: POLLNVAL",
                    Readiness::HangUp => "Socket error: POLLHUP",
                    _ => "Socket error: POLLERR",
                };
                fault.raise(ErrorKind::Cloud, reason);
                return LoopExit::Fault(readiness);
            }
            PollEnd::Shutdown => return LoopExit::Shutdown,
        }
    }
}

/// Queue an inbound event without waiting. Returns false once the
/// receiver is gone.
fn deliver(event_tx: &mpsc::Sender<InboundEvent>, event: InboundEvent) -> bool {
    match event_tx.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            warn!("Inbound event queue full, dropping {:?}", event);
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

enum PollEnd {
    Clean,
    Fault(Readiness),
    Shutdown,
}

/// Handle an active connection
async fn poll_connection<T: CloudTransport>(
    parts: &mut LoopParts<T>,
    config: &ConnectionConfig,
) -> PollEnd {
    loop {
        tokio::select! {
            outbound = parts.outbound_rx.recv() => {
                let Some(Outbound { msg, reply }) = outbound else {
                    return PollEnd::Shutdown;
                };
                let result = parts.transport.send(&msg).await;
                if let Err(e) = &result {
                    error!("Cloud send failed, err: {}", e);
                }
                let _ = reply.send(result);
            }

            readiness = timeout(config.keepalive, parts.transport.ready()) => {
                match readiness {
                    Err(_) => {
                        debug!("Keepalive ping");
                        if let Err(e) = parts.transport.ping().await {
                            warn!("Ping failed: {}", e);
                        }
                    }
                    Ok(Readiness::Readable) => match parts.transport.input().await {
                        Ok(Some(InboundEvent::Disconnected)) => {
                            deliver(&parts.event_tx, InboundEvent::Disconnected);
                            return PollEnd::Clean;
                        }
                        Ok(Some(event)) => {
                            if !deliver(&parts.event_tx, event) {
                                return PollEnd::Shutdown;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            // Unread input is discarded with the connection
                            warn!("Cloud input error, reconnecting: {}", e);
                            return PollEnd::Clean;
                        }
                    },
                    Ok(fatal) => return PollEnd::Fault(fatal),
                }
            }
        }
    }
}
