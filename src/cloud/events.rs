//! Inbound cloud event handling

use super::Work;
use crate::fault::FaultHandler;
use crate::state::TrackerContext;
use crate::transport::InboundEvent;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracker_shared::codec::decode_response;

/// Applies inbound transport events and decides what work follows
pub struct EventDispatcher {
    ctx: Arc<TrackerContext>,
    fault: FaultHandler,
}

impl EventDispatcher {
    pub fn new(ctx: Arc<TrackerContext>, fault: FaultHandler) -> Self {
        Self { ctx, fault }
    }

    /// Handle one event; returns the work item to submit, if any
    pub async fn dispatch(&self, event: InboundEvent) -> Option<Work> {
        match event {
            InboundEvent::Connected => {
                info!("CLOUD_EVT_CONNECTED");
                Some(Work::Pairing)
            }
            InboundEvent::DataReceived(body) => {
                debug!("CLOUD_EVT_DATA_RECEIVED ({} bytes)", body.len());
                match decode_response(&body) {
                    Ok(patch) => {
                        let applied = self.ctx.apply_config(&patch).await;
                        info!("Config updated: {:?}", applied);
                    }
                    Err(e) => warn!("Config update discarded: {}", e),
                }
                // Echo the applied state either way
                Some(Work::ConfigAck)
            }
            InboundEvent::FotaDone => {
                info!("CLOUD_EVT_FOTA_DONE");
                self.fault.reboot("firmware update applied");
                None
            }
            InboundEvent::Error(reason) => {
                error!("CLOUD_EVT_ERROR: {}", reason);
                None
            }
            InboundEvent::Ready => {
                info!("CLOUD_EVT_READY");
                None
            }
            InboundEvent::Disconnected => {
                info!("CLOUD_EVT_DISCONNECTED");
                None
            }
            InboundEvent::DataSent => {
                debug!("CLOUD_EVT_DATA_SENT");
                None
            }
            InboundEvent::PairRequest => {
                info!("CLOUD_EVT_PAIR_REQUEST");
                None
            }
            InboundEvent::PairDone => {
                info!("CLOUD_EVT_PAIR_DONE");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::Shutdown;
    use bytes::Bytes;
    use prost::Message;
    use tracker_shared::messages::ConfigUpdate;
    use tracker_shared::DeviceConfig;

    fn dispatcher() -> (
        EventDispatcher,
        Arc<TrackerContext>,
        tokio::sync::mpsc::UnboundedReceiver<Shutdown>,
    ) {
        let ctx = Arc::new(TrackerContext::new(DeviceConfig::default(), 4));
        let (fault, faults) = FaultHandler::new();
        (EventDispatcher::new(ctx.clone(), fault), ctx, faults)
    }

    fn update(update: ConfigUpdate) -> InboundEvent {
        InboundEvent::DataReceived(Bytes::from(update.encode_to_vec()))
    }

    #[tokio::test]
    async fn test_connected_submits_pairing() {
        let (dispatcher, _, _faults) = dispatcher();
        assert_eq!(
            dispatcher.dispatch(InboundEvent::Connected).await,
            Some(Work::Pairing)
        );
    }

    #[tokio::test]
    async fn test_config_update_is_applied_and_acked() {
        let (dispatcher, ctx, _faults) = dispatcher();
        let event = update(ConfigUpdate {
            active: Some(false),
            passive_wait: Some(300),
            ..Default::default()
        });

        assert_eq!(dispatcher.dispatch(event).await, Some(Work::ConfigAck));
        let config = ctx.config().await;
        assert!(!config.active);
        assert_eq!(config.passive_wait, 300);
        assert_eq!(config.active_wait, DeviceConfig::default().active_wait);
    }

    #[tokio::test]
    async fn test_invalid_update_changes_nothing() {
        let (dispatcher, ctx, _faults) = dispatcher();
        let event = update(ConfigUpdate {
            active: Some(false),
            gps_timeout: Some(0),
            ..Default::default()
        });

        assert_eq!(dispatcher.dispatch(event).await, Some(Work::ConfigAck));
        assert_eq!(ctx.config().await, DeviceConfig::default());

        let garbage = InboundEvent::DataReceived(Bytes::from_static(&[0xff, 0xff, 0xff]));
        assert_eq!(dispatcher.dispatch(garbage).await, Some(Work::ConfigAck));
        assert_eq!(ctx.config().await, DeviceConfig::default());
    }

    #[tokio::test]
    async fn test_fota_done_requests_reboot() {
        let (dispatcher, _, mut faults) = dispatcher();
        assert_eq!(dispatcher.dispatch(InboundEvent::FotaDone).await, None);
        assert!(matches!(faults.recv().await, Some(Shutdown::Reboot { .. })));
    }

    #[tokio::test]
    async fn test_informational_events_submit_nothing() {
        let (dispatcher, _, _faults) = dispatcher();
        for event in [
            InboundEvent::Ready,
            InboundEvent::DataSent,
            InboundEvent::PairRequest,
            InboundEvent::PairDone,
            InboundEvent::Disconnected,
            InboundEvent::Error("boom".into()),
        ] {
            assert_eq!(dispatcher.dispatch(event).await, None);
        }
    }
}
