//! Scripted transport for tests

use super::traits::{CloudTransport, InboundEvent, Readiness};
use super::TransportError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracker_shared::codec::CodecError;
use tracker_shared::CloudMessage;

/// Shared view of what a [`MockTransport`] did
#[derive(Debug, Default)]
pub struct MockProbe {
    pub sent: Mutex<Vec<CloudMessage>>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub pings: AtomicUsize,
    pub fail_sends: AtomicBool,
    pub fail_connect: AtomicBool,
    /// Number of upcoming `input()` calls that fail with a framing error
    pub bad_frames: AtomicUsize,
}

impl MockProbe {
    pub fn sent(&self) -> Vec<CloudMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// A transport whose readiness is scripted; once the script runs out it
/// blocks forever, so the keepalive fires.
pub struct MockTransport {
    script: VecDeque<Readiness>,
    inbound: VecDeque<InboundEvent>,
    pub probe: Arc<MockProbe>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            inbound: VecDeque::new(),
            probe: Arc::new(MockProbe::default()),
        }
    }

    pub fn with_script(mut self, script: impl IntoIterator<Item = Readiness>) -> Self {
        self.script.extend(script);
        self
    }

    pub fn with_inbound(mut self, events: impl IntoIterator<Item = InboundEvent>) -> Self {
        self.inbound.extend(events);
        self
    }
}

#[async_trait]
impl CloudTransport for MockTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Timeout);
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.probe.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn send(&mut self, msg: &CloudMessage) -> Result<(), TransportError> {
        if self.probe.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::ErrorKind::BrokenPipe.into()));
        }
        if let Ok(mut sent) = self.probe.sent.lock() {
            sent.push(msg.clone());
        }
        Ok(())
    }

    async fn ready(&mut self) -> Readiness {
        match self.script.pop_front() {
            Some(readiness) => readiness,
            None => std::future::pending().await,
        }
    }

    async fn input(&mut self) -> Result<Option<InboundEvent>, TransportError> {
        let bad = self
            .probe
            .bad_frames
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if bad.is_ok() {
            return Err(CodecError::InvalidLength(u32::MAX).into());
        }
        Ok(self.inbound.pop_front())
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.probe.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
