//! LTE link supervision
//!
//! Brings the cellular link up before a cloud cycle and anchors absolute
//! time to the modem's network clock on every fresh connect.

use crate::devices::{LteLink, ModemInfoProvider};
use crate::state::TrackerContext;
use crate::time_sync::anchor_from_network_time;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tracker_shared::uptime_ms;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("LTE connect failed: {0}")]
    Connect(String),
}

/// What the caller needs from the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    /// First attach after boot
    Init,
    /// Before a cloud cycle: reconnect only if registration was lost
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    AlreadyRegistered,
    Connected,
}

pub struct LinkSupervisor {
    lte: Arc<dyn LteLink>,
    modem: Arc<dyn ModemInfoProvider>,
    ctx: Arc<TrackerContext>,
}

impl LinkSupervisor {
    pub fn new(
        lte: Arc<dyn LteLink>,
        modem: Arc<dyn ModemInfoProvider>,
        ctx: Arc<TrackerContext>,
    ) -> Self {
        Self { lte, modem, ctx }
    }

    /// Make sure the link is up. On failure the modem falls back to GPS-only
    /// operation and the caller skips its cloud work.
    pub async fn ensure(&self, action: LinkAction) -> Result<LinkOutcome, LinkError> {
        if action == LinkAction::Update {
            match self.lte.registration().await {
                Ok(status) if status.is_registered() => {
                    debug!("LTE registered: {:?}", status);
                    return Ok(LinkOutcome::AlreadyRegistered);
                }
                Ok(status) => info!("LTE not registered ({:?}), reconnecting", status),
                Err(e) => warn!("Registration query failed: {}", e),
            }
        }

        info!("Establishing LTE link, this may take several minutes");
        if let Err(e) = self.lte.init_and_connect().await {
            error!("LTE link could not be established: {}", e);
            if let Err(e) = self.lte.gps_only_mode().await {
                warn!("Failed to enter GPS-only mode: {}", e);
            }
            return Err(LinkError::Connect(e.to_string()));
        }

        info!("LTE link established");
        self.sync_time().await;
        Ok(LinkOutcome::Connected)
    }

    /// Anchor absolute time to the modem's network clock
    async fn sync_time(&self) {
        let snapshot = match self.modem.refresh().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Modem refresh failed, time not synced: {}", e);
                return;
            }
        };

        match anchor_from_network_time(&snapshot.network_time, uptime_ms()) {
            Ok(anchor) => {
                self.ctx.set_anchor(anchor).await;
                info!("Time anchored to network: epoch {}", anchor.epoch);
            }
            Err(e) => warn!("Network time not usable: {}", e),
        }
    }
}
