//! Process-wide tracker context
//!
//! Device state, the time anchor and the GPS sample store are shared between
//! the sensor pipeline, the scheduler and the cloud orchestrator. Each lives
//! behind its own lock; the context is passed around as `Arc<TrackerContext>`.

use crate::buffer::GpsSampleStore;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard, Notify, RwLock};
use tracker_shared::{ConfigPatch, DeviceConfig, DeviceState, TimeAnchor};

/// Single-slot motion flag. Signalling twice before the scheduler takes it
/// has the same effect as signalling once.
#[derive(Debug, Default)]
pub struct MotionLatch {
    flag: AtomicBool,
}

impl MotionLatch {
    pub fn signal(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Consume the latch without blocking; true if motion was signalled
    pub fn try_take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

/// Shared tracker state
#[derive(Debug)]
pub struct TrackerContext {
    state: RwLock<DeviceState>,
    anchor: RwLock<TimeAnchor>,
    store: Mutex<GpsSampleStore>,
    motion: MotionLatch,
    fix_ready: Notify,
}

impl TrackerContext {
    pub fn new(config: DeviceConfig, buffer_capacity: usize) -> Self {
        Self {
            state: RwLock::new(DeviceState::new(config)),
            anchor: RwLock::new(TimeAnchor::default()),
            store: Mutex::new(GpsSampleStore::new(buffer_capacity)),
            motion: MotionLatch::default(),
            fix_ready: Notify::new(),
        }
    }

    /// Snapshot of the current device state
    pub async fn device_state(&self) -> DeviceState {
        self.state.read().await.clone()
    }

    pub async fn config(&self) -> DeviceConfig {
        self.state.read().await.config.clone()
    }

    /// Mutate device state under the write lock
    pub async fn update_state<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        let mut state = self.state.write().await;
        f(&mut state)
    }

    /// Apply a decoded config patch in one write
    pub async fn apply_config(&self, patch: &ConfigPatch) -> DeviceConfig {
        let mut state = self.state.write().await;
        state.config.apply(patch);
        state.config.clone()
    }

    pub async fn anchor(&self) -> TimeAnchor {
        *self.anchor.read().await
    }

    pub async fn set_anchor(&self, anchor: TimeAnchor) {
        *self.anchor.write().await = anchor;
    }

    pub async fn store(&self) -> MutexGuard<'_, GpsSampleStore> {
        self.store.lock().await
    }

    pub fn motion(&self) -> &MotionLatch {
        &self.motion
    }

    /// Woken when a fix has been recorded
    pub fn fix_ready(&self) -> &Notify {
        &self.fix_ready
    }
}
