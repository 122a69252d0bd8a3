//! Tracker configuration
//!
//! Every field has a default, so an empty JSON object (or no file at all) is
//! a valid configuration.

use crate::fault::FaultPolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracker_shared::{defaults, DeviceConfig};

/// Cloud transport settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Cloud endpoint address
    pub address: String,
    /// Keepalive ping interval when the link is quiet
    pub keepalive_secs: u64,
    /// Connection timeout
    pub connect_timeout_secs: u64,
    /// Delay before retrying a failed connect
    pub reconnect_delay_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8883".into(),
            keepalive_secs: defaults::KEEPALIVE_SECS,
            connect_timeout_secs: 10,
            reconnect_delay_secs: 5,
        }
    }
}

impl CloudConfig {
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// GPS sample store sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub capacity: usize,
    /// Maximum fixes per batch message
    pub batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::GPS_BUFFER_CAPACITY,
            batch_size: defaults::GPS_BUFFER_CAPACITY,
        }
    }
}

/// Which cloud messages are sent
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub cloud_pair: bool,
    pub sensor_data_send: bool,
    pub modem_info: bool,
    pub buffered_data_send: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            cloud_pair: true,
            sensor_data_send: true,
            modem_info: true,
            buffered_data_send: true,
        }
    }
}

/// Top-level tracker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub device_id: String,
    pub cloud: CloudConfig,
    pub store: StoreConfig,
    /// Record only every Nth fix delivered by the receiver
    pub gps_fix_count: u32,
    /// Settle delay before echoing configuration back to the cloud
    pub config_ack_delay_ms: u64,
    pub fault_policy: FaultPolicy,
    pub features: FeatureFlags,
    /// Initial device configuration, until the cloud overrides it
    pub device: DeviceConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            device_id: "cat-tracker-001".into(),
            cloud: CloudConfig::default(),
            store: StoreConfig::default(),
            gps_fix_count: defaults::GPS_FIX_COUNT,
            config_ack_delay_ms: defaults::CONFIG_ACK_DELAY_MS,
            fault_policy: FaultPolicy::default(),
            features: FeatureFlags::default(),
            device: DeviceConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Load from a JSON file, or use defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn config_ack_delay(&self) -> Duration {
        Duration::from_millis(self.config_ack_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = TrackerConfig::from_json("{}").expect("parse failed");
        assert_eq!(config.store.capacity, defaults::GPS_BUFFER_CAPACITY);
        assert_eq!(config.gps_fix_count, defaults::GPS_FIX_COUNT);
        assert!(config.device.active);
        assert_eq!(config.fault_policy, FaultPolicy::Halt);
        assert!(config.features.buffered_data_send);
    }

    #[test]
    fn test_partial_override() {
        let config = TrackerConfig::from_json(
            r#"{
                "device_id": "cat-42",
                "cloud": { "address": "10.0.0.1:9000" },
                "device": { "active": false, "passive_wait": 900 },
                "fault_policy": "reboot",
                "features": { "cloud_pair": false }
            }"#,
        )
        .expect("parse failed");

        assert_eq!(config.device_id, "cat-42");
        assert_eq!(config.cloud.address, "10.0.0.1:9000");
        assert_eq!(config.cloud.keepalive(), Duration::from_secs(defaults::KEEPALIVE_SECS));
        assert!(!config.device.active);
        assert_eq!(config.device.passive_wait, 900);
        assert_eq!(config.device.gps_timeout, defaults::GPS_TIMEOUT_SECS);
        assert_eq!(config.fault_policy, FaultPolicy::Reboot);
        assert!(!config.features.cloud_pair);
        assert!(config.features.modem_info);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = TrackerConfig::load(Some(Path::new("/nonexistent/tracker.json")));
        assert!(result.is_err());
        assert!(TrackerConfig::load(None).is_ok());
    }
}
