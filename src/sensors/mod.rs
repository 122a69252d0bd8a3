//! Sensor trigger handling
//!
//! Drivers never touch shared state. They enqueue a [`SensorEvent`] on a
//! bounded channel and the [`SensorPipeline`] task applies it.

mod pipeline;

pub use pipeline::SensorPipeline;

use crate::time_sync::GpsDateTime;
use tokio::sync::mpsc;
use tracing::warn;

/// Depth of the trigger queue
pub const SENSOR_QUEUE_DEPTH: usize = 16;

/// Position/velocity/time solution from the GPS receiver
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GpsPvt {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f32,
    pub accuracy: f32,
    pub speed: f32,
    pub heading: f32,
    pub datetime: GpsDateTime,
}

/// A sample delivered by a driver callback
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    /// Accelerometer threshold interrupt with the 3-axis reading (m/s²)
    Accel([f64; 3]),
    /// Fix-ready callback
    GpsFix(GpsPvt),
}

/// Driver-side handle to the trigger queue
#[derive(Debug, Clone)]
pub struct TriggerSender {
    tx: mpsc::Sender<SensorEvent>,
}

impl TriggerSender {
    pub fn new(tx: mpsc::Sender<SensorEvent>) -> Self {
        Self { tx }
    }

    /// Enqueue without blocking, as an interrupt handler would. Returns false
    /// if the sample was dropped.
    pub fn trigger(&self, event: SensorEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!("Sensor trigger dropped: {}", e);
                false
            }
        }
    }
}

/// Create the trigger queue
pub fn channel() -> (TriggerSender, mpsc::Receiver<SensorEvent>) {
    let (tx, rx) = mpsc::channel(SENSOR_QUEUE_DEPTH);
    (TriggerSender::new(tx), rx)
}
