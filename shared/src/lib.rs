//! Cat Tracker Shared Types
//!
//! This crate provides the data model, cloud codec and state machines shared
//! by the tracker firmware core and its tests.

pub mod codec;
pub mod messages;
pub mod state_machine;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Instant;

static BOOT: OnceLock<Instant> = OnceLock::new();

/// Milliseconds elapsed since the first call in this process (monotonic uptime)
pub fn uptime_ms() -> i64 {
    BOOT.get_or_init(Instant::now).elapsed().as_millis() as i64
}

/// Firmware defaults
pub mod defaults {
    /// Capacity of the GPS sample store
    pub const GPS_BUFFER_CAPACITY: usize = 10;

    /// Only every Kth fix reported by the receiver is recorded
    pub const GPS_FIX_COUNT: u32 = 3;

    /// Keepalive interval for the cloud transport in seconds
    pub const KEEPALIVE_SECS: u64 = 60;

    /// Delay before reading back configuration after a remote write
    pub const CONFIG_ACK_DELAY_MS: u64 = 1000;

    pub const GPS_TIMEOUT_SECS: u32 = 60;
    pub const ACTIVE_WAIT_SECS: u32 = 60;
    pub const PASSIVE_WAIT_SECS: u32 = 60;
    pub const MOVEMENT_TIMEOUT_SECS: u32 = 3600;
    pub const ACCEL_THRESHOLD: u32 = 100;
}

/// One GPS location sample
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GpsFix {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f32,
    pub accuracy: f32,
    pub speed: f32,
    pub heading: f32,
    /// Uptime in milliseconds when the fix was recorded
    pub fix_timestamp: i64,
    /// Set while the fix has not been confirmed sent to the cloud
    pub queued: bool,
}

/// Remotely settable tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Upper bound on one GPS search window, seconds
    pub gps_timeout: u32,
    /// Active mode wakes every `active_wait`; passive mode needs motion
    pub active: bool,
    pub active_wait: u32,
    pub passive_wait: u32,
    pub movement_timeout: u32,
    /// Raw threshold; compared against acceleration as `accel_threshold / 10`
    pub accel_threshold: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            gps_timeout: defaults::GPS_TIMEOUT_SECS,
            active: true,
            active_wait: defaults::ACTIVE_WAIT_SECS,
            passive_wait: defaults::PASSIVE_WAIT_SECS,
            movement_timeout: defaults::MOVEMENT_TIMEOUT_SECS,
            accel_threshold: defaults::ACCEL_THRESHOLD,
        }
    }
}

impl DeviceConfig {
    /// Threshold in m/s² that any axis must exceed to count as motion
    pub fn scaled_accel_threshold(&self) -> f64 {
        if self.accel_threshold == 0 {
            return 0.0;
        }
        f64::from(self.accel_threshold) / 10.0
    }

    /// Period between duty cycles for the current mode, in seconds
    pub fn wait_period_secs(&self) -> u32 {
        if self.active {
            self.active_wait
        } else {
            self.passive_wait
        }
    }

    /// Overwrite every field present in `patch`
    pub fn apply(&mut self, patch: &ConfigPatch) {
        if let Some(v) = patch.active {
            self.active = v;
        }
        if let Some(v) = patch.active_wait {
            self.active_wait = v;
        }
        if let Some(v) = patch.passive_wait {
            self.passive_wait = v;
        }
        if let Some(v) = patch.movement_timeout {
            self.movement_timeout = v;
        }
        if let Some(v) = patch.gps_timeout {
            self.gps_timeout = v;
        }
        if let Some(v) = patch.accel_threshold {
            self.accel_threshold = v;
        }
    }
}

/// A decoded configuration update; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigPatch {
    pub active: Option<bool>,
    pub active_wait: Option<u32>,
    pub passive_wait: Option<u32>,
    pub movement_timeout: Option<u32>,
    pub gps_timeout: Option<u32>,
    pub accel_threshold: Option<u32>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Latest sensor readings plus the active configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceState {
    pub battery_voltage: i32,
    pub battery_timestamp: i64,
    pub accel: [f64; 3],
    pub accel_timestamp: i64,
    pub config: DeviceConfig,
    /// A new fix was recorded since the last sensor snapshot
    pub gps_found: bool,
}

impl DeviceState {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }
}

/// Mapping from monotonic uptime to absolute time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeAnchor {
    /// Absolute time in seconds since the Unix epoch
    pub epoch: i64,
    /// Uptime in milliseconds at which `epoch` was captured
    pub update_time: i64,
}

impl TimeAnchor {
    pub fn new(epoch: i64, update_time: i64) -> Self {
        Self { epoch, update_time }
    }

    /// Absolute timestamp in milliseconds for a sample taken at `uptime_ms`
    pub fn to_unix_ms(&self, uptime_ms: i64) -> i64 {
        self.epoch * 1000 + (uptime_ms - self.update_time)
    }
}

/// Network parameters that change between cycles
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkInfo {
    pub current_band: u32,
    pub network_mode: String,
    pub operator: String,
    pub cell_id: u32,
    pub area_code: u32,
    pub ip_address: String,
}

/// Rarely changing device identity, only sent on pairing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticDeviceInfo {
    pub imei: String,
    pub iccid: String,
    pub modem_firmware: String,
    pub board: String,
    pub app_version: String,
}

/// One reading of the modem information provider
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModemSnapshot {
    /// Battery voltage in millivolts
    pub battery_mv: i32,
    /// Network time as reported by the modem, `YY/MM/DD,hh:mm:ss+TZ`
    pub network_time: String,
    /// Reference signal received power
    pub rsrp: i32,
    pub network: NetworkInfo,
    pub device: StaticDeviceInfo,
}

/// Cloud endpoint a message is published to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Pair,
    Message,
    Batch,
}

/// Delivery guarantee requested from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Qos {
    #[default]
    AtMostOnce,
    AtLeastOnce,
}

/// An encoded message ready for the transport
#[derive(Debug, Clone, PartialEq)]
pub struct CloudMessage {
    pub topic: Topic,
    pub qos: Qos,
    pub payload: Bytes,
}

impl CloudMessage {
    pub fn new(topic: Topic, payload: impl Into<Bytes>) -> Self {
        Self {
            topic,
            qos: Qos::AtMostOnce,
            payload: payload.into(),
        }
    }

    /// Device identity announcement with an empty body
    pub fn pairing() -> Self {
        Self::new(Topic::Pair, Bytes::new())
    }
}
