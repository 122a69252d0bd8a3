//! Device doubles for tests

use super::traits::{GpsReceiver, LteLink, ModemInfoProvider, Registration};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracker_shared::{ModemSnapshot, NetworkInfo, StaticDeviceInfo};

/// Receiver double counting start/stop calls
#[derive(Default)]
pub struct MockGps {
    pub active: AtomicBool,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl GpsReceiver for MockGps {
    fn start(&self, _timeout: Duration) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Modem returning a fixed snapshot, or failing
pub struct FixedModem {
    pub fail: bool,
}

#[async_trait]
impl ModemInfoProvider for FixedModem {
    async fn refresh(&self) -> Result<ModemSnapshot> {
        if self.fail {
            anyhow::bail!("modem not responding");
        }
        Ok(ModemSnapshot {
            battery_mv: 3900,
            network_time: "20/02/14,13:25:09+04".into(),
            rsrp: 51,
            network: NetworkInfo {
                operator: "24201".into(),
                ..Default::default()
            },
            device: StaticDeviceInfo {
                imei: "352656100000001".into(),
                ..Default::default()
            },
        })
    }
}

#[derive(Default)]
pub struct MockLte {
    pub registered: AtomicBool,
    pub fail_connect: AtomicBool,
    pub connects: AtomicUsize,
    pub gps_only: AtomicBool,
}

#[async_trait]
impl LteLink for MockLte {
    async fn init_and_connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            anyhow::bail!("no network");
        }
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn registration(&self) -> Result<Registration> {
        Ok(if self.registered.load(Ordering::SeqCst) {
            Registration::Roaming
        } else {
            Registration::Searching
        })
    }

    async fn gps_only_mode(&self) -> Result<()> {
        self.gps_only.store(true, Ordering::SeqCst);
        self.registered.store(false, Ordering::SeqCst);
        Ok(())
    }
}
