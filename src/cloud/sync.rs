//! Cloud sync orchestrator - discrete, independently retriable sends

use crate::config::FeatureFlags;
use crate::connection::CloudSender;
use crate::devices::ModemInfoProvider;
use crate::fault::ErrorKind;
use crate::state::TrackerContext;
use crate::transport::TransportError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};
use tracker_shared::codec::{
    encode_config, encode_gps_batch, encode_modem_data, encode_sensor_data, CodecError,
};
use tracker_shared::{uptime_ms, CloudMessage, ModemSnapshot};

/// Errors from a single send operation
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Encode failed: {0}")]
    Codec(#[from] CodecError),

    #[error("Send failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Modem query failed: {0}")]
    Modem(String),
}

impl SyncError {
    /// Classify for logging; none of these end the cycle early
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Codec(_) => ErrorKind::Cloud,
            SyncError::Transport(e) => e.kind(),
            SyncError::Modem(_) => ErrorKind::TransportRecoverable,
        }
    }
}

fn log_failure(operation: &str, e: &SyncError) {
    error!("{}, error of type {}: {}", operation, e.kind(), e);
}

/// Builds cloud messages from the tracker context and sends them
///
/// No operation rolls back an earlier one. Sensor and modem sends carry the
/// latest values, so a partially failed cycle heals on the next one; only
/// the GPS store keeps unsent history.
pub struct CloudSync {
    ctx: Arc<TrackerContext>,
    sender: CloudSender,
    modem: Arc<dyn ModemInfoProvider>,
    features: FeatureFlags,
    batch_size: usize,
    config_ack_delay: Duration,
}

impl CloudSync {
    pub fn new(
        ctx: Arc<TrackerContext>,
        sender: CloudSender,
        modem: Arc<dyn ModemInfoProvider>,
        features: FeatureFlags,
        batch_size: usize,
        config_ack_delay: Duration,
    ) -> Self {
        Self {
            ctx,
            sender,
            modem,
            features,
            batch_size: batch_size.max(1),
            config_ack_delay,
        }
    }

    /// Announce the device identity (at most once)
    pub async fn send_pairing(&self) -> Result<(), SyncError> {
        self.sender.send(CloudMessage::pairing()).await?;
        info!("Pairing announced");
        Ok(())
    }

    /// Send the applied configuration after the settle delay
    pub async fn send_config_ack(&self) -> Result<(), SyncError> {
        tokio::time::sleep(self.config_ack_delay).await;

        let config = self.ctx.config().await;
        let msg = encode_config(&config)?;
        self.sender.send(msg).await?;
        debug!("Config acknowledged: {:?}", config);
        Ok(())
    }

    async fn refresh_modem(&self) -> Result<ModemSnapshot, SyncError> {
        self.modem
            .refresh()
            .await
            .map_err(|e| SyncError::Modem(e.to_string()))
    }

    /// Refresh the battery level, then send the latest accelerometer, GPS
    /// and battery readings in one message
    ///
    /// Nothing is sent if the battery read fails. `gps_found` is cleared
    /// once encoding succeeds, whatever the send result.
    pub async fn send_sensor_snapshot(&self) -> Result<(), SyncError> {
        let snapshot = self.refresh_modem().await?;
        let now = uptime_ms();
        self.ctx
            .update_state(|state| {
                state.battery_voltage = snapshot.battery_mv;
                state.battery_timestamp = now;
            })
            .await;

        let anchor = self.ctx.anchor().await;
        let msg = {
            // Store before state, same order as the sensor pipeline
            let store = self.ctx.store().await;
            let latest = store.latest().copied();
            self.ctx
                .update_state(|state| {
                    let msg = encode_sensor_data(state, latest.as_ref(), &anchor)?;
                    state.gps_found = false;
                    Ok::<_, CodecError>(msg)
                })
                .await?
        };

        self.sender.send(msg).await?;
        Ok(())
    }

    /// Send network info, plus static device identity when `include_static`
    pub async fn send_modem_snapshot(&self, include_static: bool) -> Result<(), SyncError> {
        let snapshot = self.refresh_modem().await?;
        let anchor = self.ctx.anchor().await;
        let msg = encode_modem_data(&snapshot, include_static, snapshot.rsrp, &anchor)?;
        self.sender.send(msg).await?;
        Ok(())
    }

    /// Send every queued fix in batches, clearing queued flags only for
    /// batches the transport accepted. Returns the number of fixes flushed.
    pub async fn flush_buffer(&self) -> Result<usize, SyncError> {
        let scan = self.ctx.store().await.scan_queued();
        if !scan.any {
            debug!("No buffered fixes to flush");
            return Ok(0);
        }

        let mut remaining = scan.count;
        let mut flushed = 0;
        while remaining > 0 {
            let batch = self.ctx.store().await.pending_batch(self.batch_size);
            if batch.is_empty() {
                break;
            }

            let anchor = self.ctx.anchor().await;
            let msg = encode_gps_batch(&batch.fixes, &anchor)?;
            self.sender.send(msg).await?;

            flushed += self.ctx.store().await.mark_sent(&batch);
            remaining = remaining.saturating_sub(batch.len());
        }

        info!("Flushed {} buffered fixes", flushed);
        Ok(flushed)
    }

    /// Pairing and static device info, run on every cloud connect
    pub async fn pairing_routine(&self) {
        if self.features.cloud_pair {
            if let Err(e) = self.send_pairing().await {
                log_failure("send_pairing", &e);
            }
        }
        if self.features.modem_info {
            if let Err(e) = self.send_modem_snapshot(true).await {
                log_failure("send_modem_snapshot", &e);
            }
        }
    }

    /// Regular cloud cycle. Each step runs even if an earlier one failed.
    pub async fn update_routine(&self) {
        if self.features.sensor_data_send {
            if let Err(e) = self.send_sensor_snapshot().await {
                log_failure("send_sensor_snapshot", &e);
            }
        }
        if self.features.modem_info {
            if let Err(e) = self.send_modem_snapshot(false).await {
                log_failure("send_modem_snapshot", &e);
            }
        }
        if self.features.buffered_data_send {
            if let Err(e) = self.flush_buffer().await {
                log_failure("flush_buffer", &e);
            }
        }
    }
}
