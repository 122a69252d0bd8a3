//! Cloud synchronisation
//!
//! This module handles:
//! - Building and sending pairing, config, sensor, modem and batch messages
//! - Draining the GPS sample store
//! - Mapping inbound transport events onto deferred work items

mod events;
mod sync;

pub use events::EventDispatcher;
pub use sync::{CloudSync, SyncError};

/// Deferred work executed serially by the application task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Work {
    /// Announce identity and static device info
    Pairing,
    /// Echo the applied configuration back to the cloud
    ConfigAck,
    /// Regular cloud cycle: sensor and modem snapshots, buffer flush
    Update,
}
