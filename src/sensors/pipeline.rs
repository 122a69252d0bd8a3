//! Consumer task for accelerometer and GPS triggers

use super::{GpsPvt, SensorEvent};
use crate::devices::GpsReceiver;
use crate::state::TrackerContext;
use crate::time_sync::anchor_from_gps;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracker_shared::{uptime_ms, GpsFix};

/// Applies sensor triggers to the tracker context
pub struct SensorPipeline {
    ctx: Arc<TrackerContext>,
    gps: Arc<dyn GpsReceiver>,
    /// Record every Nth fix
    fix_count_target: u32,
    fix_count: u32,
}

impl SensorPipeline {
    pub fn new(ctx: Arc<TrackerContext>, gps: Arc<dyn GpsReceiver>, fix_count_target: u32) -> Self {
        Self {
            ctx,
            gps,
            fix_count_target: fix_count_target.max(1),
            fix_count: 0,
        }
    }

    /// Process triggers until every driver handle is dropped
    pub async fn run(mut self, mut rx: mpsc::Receiver<SensorEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(event).await;
        }
        info!("Sensor trigger queue closed");
    }

    pub async fn handle(&mut self, event: SensorEvent) {
        match event {
            SensorEvent::Accel(sample) => {
                self.on_accel(sample).await;
            }
            SensorEvent::GpsFix(pvt) => {
                self.on_fix(pvt).await;
            }
        }
    }

    /// Latch the reading and signal motion if any axis exceeds the threshold
    async fn on_accel(&self, sample: [f64; 3]) -> bool {
        let now = uptime_ms();
        let moved = self
            .ctx
            .update_state(|state| {
                let threshold = state.config.scaled_accel_threshold();
                if !sample.iter().any(|axis| axis.abs() > threshold) {
                    return false;
                }
                state.accel = sample;
                state.accel_timestamp = now;
                true
            })
            .await;

        if moved {
            debug!(
                "Motion detected: x={:.2} y={:.2} z={:.2}",
                sample[0], sample[1], sample[2]
            );
            self.ctx.motion().signal();
        }
        moved
    }

    /// Record every Nth fix, then stop the receiver
    async fn on_fix(&mut self, pvt: GpsPvt) -> bool {
        self.fix_count += 1;
        if self.fix_count < self.fix_count_target {
            return false;
        }
        self.fix_count = 0;

        let now = uptime_ms();
        match anchor_from_gps(&pvt.datetime, now) {
            Ok(anchor) => self.ctx.set_anchor(anchor).await,
            Err(e) => warn!("Keeping previous time anchor: {}", e),
        }

        let fix = GpsFix {
            longitude: pvt.longitude,
            latitude: pvt.latitude,
            altitude: pvt.altitude,
            accuracy: pvt.accuracy,
            speed: pvt.speed,
            heading: pvt.heading,
            fix_timestamp: now,
            queued: true,
        };
        let slot = self.ctx.store().await.record(fix, now);
        self.ctx.update_state(|state| state.gps_found = true).await;

        info!(
            "GPS fix recorded in slot {}: lat={:.5} lon={:.5}",
            slot, pvt.latitude, pvt.longitude
        );

        self.gps.stop();
        self.ctx.fix_ready().notify_waiters();
        true
    }
}
