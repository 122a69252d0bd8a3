//! Transport trait abstraction for the cloud connection

use super::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use tracker_shared::CloudMessage;

/// Condition reported by the transport's pollable handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// An inbound event can be taken with `input()`
    Readable,
    /// The handle is not open
    InvalidHandle,
    /// The peer closed the connection
    HangUp,
    Error,
}

/// Events delivered by the transport, one per `input()` call
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Connected,
    Ready,
    /// Peer-initiated orderly disconnect
    Disconnected,
    Error(String),
    DataSent,
    /// Raw configuration write for the codec
    DataReceived(Bytes),
    PairRequest,
    PairDone,
    /// Firmware update finished; the device must restart
    FotaDone,
}

/// A cloud transport connection
///
/// Implementations are owned by a single connection task, so sends are never
/// interleaved.
#[async_trait]
pub trait CloudTransport: Send + 'static {
    async fn connect(&mut self) -> Result<(), TransportError>;

    async fn disconnect(&mut self);

    async fn send(&mut self, msg: &CloudMessage) -> Result<(), TransportError>;

    /// Wait until the handle is readable or faulted. Must be cancel safe.
    async fn ready(&mut self) -> Readiness;

    /// Take one pending inbound event, if any
    async fn input(&mut self) -> Result<Option<InboundEvent>, TransportError>;

    /// Keepalive
    async fn ping(&mut self) -> Result<(), TransportError>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
