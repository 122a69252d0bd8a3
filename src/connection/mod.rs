//! Cloud connection management
//!
//! This module handles:
//! - Connecting the cloud transport and reconnecting after a clean close
//! - Multiplexing inbound events with keepalive pings
//! - Serialising outbound sends through one writer task
//! - Escalating socket faults to the fault handler

mod manager;

pub use manager::{CloudSender, ConnectionConfig, ConnectionManager, LoopExit};
