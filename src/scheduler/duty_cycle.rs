//! Duty-cycle scheduler task

use crate::cloud::Work;
use crate::devices::GpsReceiver;
use crate::state::TrackerContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use tracker_shared::state_machine::{CycleEvent, DutyCycleMachine, TransitionResult};

/// What one timer tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Passive mode with no motion since the last tick
    Skipped,
    /// GPS search ran and a cloud cycle was submitted
    Completed { fix: bool },
}

/// Drives the duty-cycle state machine
pub struct DutyCycleScheduler {
    ctx: Arc<TrackerContext>,
    gps: Arc<dyn GpsReceiver>,
    work_tx: mpsc::Sender<Work>,
    fsm: DutyCycleMachine,
}

impl DutyCycleScheduler {
    pub fn new(ctx: Arc<TrackerContext>, gps: Arc<dyn GpsReceiver>, work_tx: mpsc::Sender<Work>) -> Self {
        Self {
            ctx,
            gps,
            work_tx,
            fsm: DutyCycleMachine::new(),
        }
    }

    pub fn machine(&self) -> &DutyCycleMachine {
        &self.fsm
    }

    fn advance(&mut self, event: CycleEvent) -> TransitionResult {
        let result = self.fsm.process_event(event);
        match &result {
            TransitionResult::Success(phase) => debug!("Duty cycle -> {:?}", phase),
            TransitionResult::Skipped => debug!("Duty cycle skipped"),
            TransitionResult::Invalid { from, event } => {
                warn!("Invalid duty-cycle event {:?} in {:?}", event, from)
            }
        }
        result
    }

    /// Run one wake-up: motion gate, GPS search, cloud cycle
    pub async fn tick(&mut self) -> CycleOutcome {
        let config = self.ctx.config().await;
        // Always consume the latch so stale motion does not leak into a
        // later passive period
        let motion = self.ctx.motion().try_take();

        let fired = self.advance(CycleEvent::TimerFired {
            active: config.active,
            motion,
        });
        if fired == TransitionResult::Skipped {
            info!("No movement since last cycle, going back to sleep");
            return CycleOutcome::Skipped;
        }
        if !config.active {
            info!("Movement detected, starting cycle");
        }

        let fix = self
            .search(Duration::from_secs(u64::from(config.gps_timeout)))
            .await;
        self.advance(CycleEvent::GpsSearchEnded { fix });

        if self.work_tx.send(Work::Update).await.is_err() {
            warn!("Work queue closed, cloud cycle dropped");
        }
        self.advance(CycleEvent::CloudCycleDone);

        CycleOutcome::Completed { fix }
    }

    /// Time-boxed GPS search. Returns true if a fix was recorded.
    async fn search(&self, limit: Duration) -> bool {
        // Register before starting the receiver so a fast fix is not missed
        let notified = self.ctx.fix_ready().notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.gps.is_active() {
            debug!("GPS search already running");
        } else if let Err(e) = self.gps.start(limit) {
            warn!("GPS start failed: {}", e);
            return false;
        }

        match timeout(limit, notified).await {
            Ok(()) => true,
            Err(_) => {
                info!("No GPS fix within {:?}", limit);
                self.gps.stop();
                false
            }
        }
    }

    /// Tick, then sleep for the current mode's wait period, forever
    pub async fn run(mut self) {
        loop {
            self.tick().await;

            let wait = self.ctx.config().await.wait_period_secs().max(1);
            debug!(
                "Sleeping {} s until next cycle ({} completed, {} skipped)",
                wait,
                self.fsm.completed_cycles(),
                self.fsm.skipped_cycles()
            );
            sleep(Duration::from_secs(u64::from(wait))).await;
            self.advance(CycleEvent::Woke);
        }
    }
}
