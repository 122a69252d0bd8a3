//! Simulated drivers for running the tracker on a host
//!
//! The GPS and accelerometer push samples through the sensor trigger queue
//! exactly as interrupt handlers would on the device.

use super::traits::{GpsReceiver, LteLink, ModemInfoProvider, Registration};
use crate::sensors::{GpsPvt, SensorEvent, TriggerSender};
use crate::time_sync::GpsDateTime;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, Timelike, Utc};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant};
use tracing::{debug, info};
use tracker_shared::{ModemSnapshot, NetworkInfo, StaticDeviceInfo};

/// Interval between simulated PVT solutions
const FIX_INTERVAL: Duration = Duration::from_secs(1);

/// GPS receiver producing a fix every second around a fixed position
pub struct SimulatedGps {
    triggers: TriggerSender,
    active: Arc<AtomicBool>,
    /// Bumped on every start and stop so stale search tasks exit
    generation: Arc<AtomicU64>,
    origin: (f64, f64),
}

impl SimulatedGps {
    pub fn new(triggers: TriggerSender, latitude: f64, longitude: f64) -> Self {
        Self {
            triggers,
            active: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            origin: (latitude, longitude),
        }
    }
}

fn utc_datetime() -> GpsDateTime {
    let now = Utc::now();
    GpsDateTime {
        year: now.year() as u16,
        month: now.month() as u8,
        day: now.day() as u8,
        hour: now.hour() as u8,
        minute: now.minute() as u8,
        seconds: now.second() as u8,
    }
}

impl GpsReceiver for SimulatedGps {
    fn start(&self, timeout: Duration) -> Result<()> {
        if self.active.swap(true, Ordering::SeqCst) {
            debug!("GPS search already running");
            return Ok(());
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let triggers = self.triggers.clone();
        let active = self.active.clone();
        let current = self.generation.clone();
        let (lat, lon) = self.origin;

        info!("GPS search started, timeout {:?}", timeout);
        tokio::spawn(async move {
            let deadline = Instant::now() + timeout;
            let mut ticker = interval(FIX_INTERVAL);
            ticker.tick().await;
            let mut n = 0u32;

            loop {
                ticker.tick().await;
                if current.load(Ordering::SeqCst) != generation {
                    break;
                }
                if Instant::now() >= deadline {
                    info!("GPS search timed out");
                    active.store(false, Ordering::SeqCst);
                    break;
                }

                n += 1;
                let jitter = f64::from(n % 7) * 1e-5;
                triggers.trigger(SensorEvent::GpsFix(GpsPvt {
                    latitude: lat + jitter,
                    longitude: lon - jitter,
                    altitude: 42.0,
                    accuracy: 5.0,
                    speed: 0.4,
                    heading: 90.0,
                    datetime: utc_datetime(),
                }));
            }
        });
        Ok(())
    }

    fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if self.active.swap(false, Ordering::SeqCst) {
            info!("GPS search stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Accelerometer that reports a reading every `period`, alternating between
/// rest and a jolt on the y axis
pub struct SimulatedAccelerometer;

impl SimulatedAccelerometer {
    pub fn spawn(triggers: TriggerSender, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut moving = false;
            loop {
                sleep(period).await;
                moving = !moving;
                let sample = if moving {
                    [0.3, 12.5, 9.6]
                } else {
                    [0.0, 0.1, 9.8]
                };
                if !triggers.trigger(SensorEvent::Accel(sample)) {
                    debug!("Accelerometer sample dropped");
                }
            }
        })
    }
}

/// Modem answering from host time and a draining battery
pub struct SimulatedModem {
    battery_mv: AtomicI32,
    device: StaticDeviceInfo,
}

impl SimulatedModem {
    pub fn new(device_id: &str) -> Self {
        Self {
            battery_mv: AtomicI32::new(4200),
            device: StaticDeviceInfo {
                imei: format!("35{:0>13}", device_id.len()),
                iccid: "8931080019073497795".to_string(),
                modem_firmware: "mfw_sim_1.0.0".to_string(),
                board: "sim".to_string(),
                app_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

#[async_trait]
impl ModemInfoProvider for SimulatedModem {
    async fn refresh(&self) -> Result<ModemSnapshot> {
        let battery_mv = (self.battery_mv.fetch_sub(1, Ordering::SeqCst) - 1).max(3300);

        Ok(ModemSnapshot {
            battery_mv,
            network_time: Utc::now().format("%y/%m/%d,%H:%M:%S+00").to_string(),
            rsrp: 48,
            network: NetworkInfo {
                current_band: 20,
                network_mode: "LTE-M".to_string(),
                operator: "24201".to_string(),
                cell_id: 0x0133_4a0b,
                area_code: 0x0bb9,
                ip_address: "10.160.33.50".to_string(),
            },
            device: self.device.clone(),
        })
    }
}

/// LTE link that attaches immediately
#[derive(Default)]
pub struct SimulatedLte {
    attached: AtomicBool,
}

#[async_trait]
impl LteLink for SimulatedLte {
    async fn init_and_connect(&self) -> Result<()> {
        self.attached.store(true, Ordering::SeqCst);
        info!("LTE attached");
        Ok(())
    }

    async fn registration(&self) -> Result<Registration> {
        if self.attached.load(Ordering::SeqCst) {
            Ok(Registration::Home)
        } else {
            Ok(Registration::NotRegistered)
        }
    }

    async fn gps_only_mode(&self) -> Result<()> {
        self.attached.store(false, Ordering::SeqCst);
        info!("Modem in GPS-only mode");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors;
    use crate::time_sync::anchor_from_network_time;

    #[tokio::test(start_paused = true)]
    async fn test_gps_emits_fixes_until_stopped() {
        let (triggers, mut rx) = sensors::channel();
        let gps = SimulatedGps::new(triggers, 63.43, 10.39);

        gps.start(Duration::from_secs(60)).expect("start failed");
        assert!(gps.is_active());
        // Second start is a no-op
        gps.start(Duration::from_secs(60)).expect("start failed");

        let first = rx.recv().await.expect("no fix");
        assert!(matches!(first, SensorEvent::GpsFix(_)));

        gps.stop();
        assert!(!gps.is_active());
        sleep(Duration::from_secs(5)).await;
        while rx.try_recv().is_ok() {}
        sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gps_search_times_out() {
        let (triggers, _rx) = sensors::channel();
        let gps = SimulatedGps::new(triggers, 0.0, 0.0);

        gps.start(Duration::from_secs(3)).expect("start failed");
        sleep(Duration::from_secs(5)).await;
        assert!(!gps.is_active());
    }

    #[tokio::test]
    async fn test_modem_time_parses() {
        let modem = SimulatedModem::new("cat-tracker-001");
        let snapshot = modem.refresh().await.expect("refresh failed");

        assert!(snapshot.battery_mv < 4200);
        let anchor = anchor_from_network_time(&snapshot.network_time, 0).expect("parse failed");
        assert!((anchor.epoch - Utc::now().timestamp()).abs() < 5);
    }

    #[tokio::test]
    async fn test_lte_registration() {
        let lte = SimulatedLte::default();
        assert!(!lte.registration().await.unwrap().is_registered());
        lte.init_and_connect().await.unwrap();
        assert!(lte.registration().await.unwrap().is_registered());
    }
}
