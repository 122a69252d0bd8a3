//! Driver interfaces the tracker core calls into

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracker_shared::ModemSnapshot;

/// GPS receiver control
pub trait GpsReceiver: Send + Sync {
    /// Start a search that stops by itself after `timeout`
    fn start(&self, timeout: Duration) -> Result<()>;

    fn stop(&self);

    fn is_active(&self) -> bool;
}

/// Modem parameter queries
#[async_trait]
pub trait ModemInfoProvider: Send + Sync {
    /// Re-read battery, network time, signal strength and network details
    async fn refresh(&self) -> Result<ModemSnapshot>;
}

/// Network registration as reported by the modem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Home,
    Roaming,
    Searching,
    NotRegistered,
}

impl Registration {
    pub fn is_registered(self) -> bool {
        matches!(self, Registration::Home | Registration::Roaming)
    }
}

/// Cellular link control
#[async_trait]
pub trait LteLink: Send + Sync {
    /// Power up and attach; may take minutes
    async fn init_and_connect(&self) -> Result<()>;

    async fn registration(&self) -> Result<Registration>;

    /// Switch the modem to GPS-only operation
    async fn gps_only_mode(&self) -> Result<()>;
}
