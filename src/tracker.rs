//! Application task
//!
//! Owns the connection manager and executes deferred work one item at a time,
//! so cloud routines never overlap.

use crate::cloud::{CloudSync, EventDispatcher, Work};
use crate::connection::ConnectionManager;
use crate::link::{LinkAction, LinkSupervisor};
use crate::transport::CloudTransport;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Depth of the deferred work queue
pub const WORK_QUEUE_DEPTH: usize = 8;

pub struct Tracker<T> {
    conn: ConnectionManager<T>,
    sync: CloudSync,
    link: LinkSupervisor,
    dispatcher: EventDispatcher,
    work_tx: mpsc::Sender<Work>,
    work_rx: mpsc::Receiver<Work>,
}

impl<T: CloudTransport> Tracker<T> {
    pub fn new(
        conn: ConnectionManager<T>,
        sync: CloudSync,
        link: LinkSupervisor,
        dispatcher: EventDispatcher,
    ) -> Self {
        let (work_tx, work_rx) = mpsc::channel(WORK_QUEUE_DEPTH);
        Self {
            conn,
            sync,
            link,
            dispatcher,
            work_tx,
            work_rx,
        }
    }

    /// Handle for submitting work from other tasks
    pub fn work_sender(&self) -> mpsc::Sender<Work> {
        self.work_tx.clone()
    }

    /// Bring the link up and start the connection loop once it is
    pub async fn start(&mut self) {
        match self.link.ensure(LinkAction::Init).await {
            Ok(_) => {
                self.conn.start();
            }
            Err(e) => warn!("Starting without cloud: {}", e),
        }
    }

    /// Run one work item to completion
    pub async fn execute(&mut self, work: Work) {
        debug!("Executing {:?}", work);
        match work {
            Work::Pairing => self.sync.pairing_routine().await,
            Work::ConfigAck => {
                if let Err(e) = self.sync.send_config_ack().await {
                    warn!("send_config_ack, error of type {}: {}", e.kind(), e);
                }
            }
            Work::Update => match self.link.ensure(LinkAction::Update).await {
                Ok(_) => {
                    if !self.conn.is_started() {
                        self.conn.start();
                    }
                    self.sync.update_routine().await;
                }
                Err(e) => info!("Cloud cycle skipped: {}", e),
            },
        }
    }

    fn submit(&self, work: Work) {
        if let Err(e) = self.work_tx.try_send(work) {
            warn!("Work item dropped: {}", e);
        }
    }

    /// Serve inbound events and queued work
    pub async fn run(mut self) {
        let mut events_open = true;
        loop {
            tokio::select! {
                event = self.conn.recv(), if events_open => match event {
                    Some(event) => {
                        if let Some(work) = self.dispatcher.dispatch(event).await {
                            self.submit(work);
                        }
                    }
                    None => {
                        info!("Cloud event stream ended");
                        events_open = false;
                    }
                },
                work = self.work_rx.recv() => match work {
                    Some(work) => self.execute(work).await,
                    None => break,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureFlags;
    use crate::connection::ConnectionConfig;
    use crate::devices::mock::{FixedModem, MockLte};
    use crate::fault::FaultHandler;
    use crate::state::TrackerContext;
    use crate::transport::mock::{MockProbe, MockTransport};
    use crate::transport::{InboundEvent, Readiness};
    use bytes::Bytes;
    use prost::Message;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;
    use tracker_shared::messages::{ConfigReport, ConfigUpdate};
    use tracker_shared::{DeviceConfig, GpsFix, Topic};

    fn tracker(
        transport: MockTransport,
        lte: Arc<MockLte>,
    ) -> (Tracker<MockTransport>, Arc<TrackerContext>, Arc<MockProbe>) {
        let ctx = Arc::new(TrackerContext::new(DeviceConfig::default(), 10));
        let probe = transport.probe.clone();
        let (fault, _faults) = FaultHandler::new();
        let conn = ConnectionManager::new(ConnectionConfig::default(), transport, fault.clone());
        let modem = Arc::new(FixedModem { fail: false });
        let sync = CloudSync::new(
            ctx.clone(),
            conn.sender(),
            modem.clone(),
            FeatureFlags::default(),
            10,
            Duration::from_millis(1000),
        );
        let link = LinkSupervisor::new(lte, modem, ctx.clone());
        let dispatcher = EventDispatcher::new(ctx.clone(), fault);
        (Tracker::new(conn, sync, link, dispatcher), ctx, probe)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_triggers_pairing() {
        let (mut tracker, _, probe) = tracker(MockTransport::new(), Arc::new(MockLte::default()));
        tracker.start().await;
        let work_tx = tracker.work_sender();
        tokio::spawn(tracker.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let topics: Vec<Topic> = probe.sent().iter().map(|m| m.topic).collect();
        assert_eq!(topics, vec![Topic::Pair, Topic::Message]);
        drop(work_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_write_is_acknowledged() {
        let update = ConfigUpdate {
            active: Some(false),
            ..Default::default()
        };
        let transport = MockTransport::new()
            .with_script([Readiness::Readable])
            .with_inbound([InboundEvent::DataReceived(Bytes::from(update.encode_to_vec()))]);
        let (mut tracker, ctx, probe) = tracker(transport, Arc::new(MockLte::default()));
        tracker.start().await;
        let _work_tx = tracker.work_sender();
        tokio::spawn(tracker.run());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!ctx.config().await.active);

        let sent = probe.sent();
        let ack = sent.last().expect("nothing sent");
        let report = ConfigReport::decode(ack.payload.clone()).expect("decode failed");
        assert!(!report.active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_burst_keeps_link_alive() {
        let update = ConfigUpdate {
            active: Some(false),
            ..Default::default()
        };
        let write = InboundEvent::DataReceived(Bytes::from(update.encode_to_vec()));
        let transport = MockTransport::new()
            .with_script(vec![Readiness::Readable; 40])
            .with_inbound(vec![write; 40]);
        let (mut tracker, ctx, probe) = tracker(transport, Arc::new(MockLte::default()));
        tracker.start().await;
        let _work_tx = tracker.work_sender();
        tokio::spawn(tracker.run());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(!ctx.config().await.active);
        assert!(probe.pings.load(Ordering::SeqCst) > 0);

        let sent = probe.sent();
        assert_eq!(sent[0].topic, Topic::Pair);
        let acks = sent
            .iter()
            .filter(|m| {
                m.topic == Topic::Message
                    && ConfigReport::decode(m.payload.clone()).is_ok_and(|r| !r.active)
            })
            .count();
        assert!(acks > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_flushes_buffer_when_link_is_up() {
        let (mut tracker, ctx, probe) = tracker(MockTransport::new(), Arc::new(MockLte::default()));
        tracker.start().await;
        ctx.store().await.record(GpsFix::default(), 10);

        // Drain the Connected event so pairing is not pending
        let event = tracker.conn.recv().await;
        assert_eq!(event, Some(InboundEvent::Connected));

        tracker.execute(Work::Update).await;
        assert!(probe.sent().iter().any(|m| m.topic == Topic::Batch));
        assert_eq!(ctx.store().await.scan_queued().count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_skipped_without_link() {
        let lte = Arc::new(MockLte::default());
        lte.fail_connect.store(true, Ordering::SeqCst);
        let (mut tracker, ctx, probe) = tracker(MockTransport::new(), lte.clone());

        tracker.start().await;
        assert!(!tracker.conn.is_started());

        ctx.store().await.record(GpsFix::default(), 10);
        tracker.execute(Work::Update).await;
        assert!(probe.sent().is_empty());
        assert_eq!(ctx.store().await.scan_queued().count, 1);
        assert!(lte.gps_only.load(Ordering::SeqCst));

        // Link comes back on a later cycle and the connection loop starts
        lte.fail_connect.store(false, Ordering::SeqCst);
        tracker.execute(Work::Update).await;
        assert!(tracker.conn.is_started());
    }
}
