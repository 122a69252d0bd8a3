//! TCP transport speaking length-prefixed protobuf frames

use super::traits::{CloudTransport, InboundEvent, Readiness};
use super::TransportError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, Interest};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};
use tracker_shared::codec::{encode_frame, FrameDecoder};
use tracker_shared::messages::{DownlinkFrame, DownlinkKind, UplinkFrame, UplinkTopic};
use tracker_shared::{CloudMessage, Topic};

/// Cloud transport over a plain TCP stream
pub struct TcpCloudTransport {
    address: String,
    device_id: String,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
    decoder: FrameDecoder<DownlinkFrame>,
    pending: VecDeque<InboundEvent>,
    read_buf: Vec<u8>,
    hung_up: bool,
}

impl TcpCloudTransport {
    pub fn new(address: String, device_id: String, connect_timeout: Duration) -> Self {
        Self {
            address,
            device_id,
            connect_timeout,
            stream: None,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            read_buf: vec![0u8; 4096],
            hung_up: false,
        }
    }

    async fn write_frame(&mut self, topic: UplinkTopic, body: bytes::Bytes) -> Result<(), TransportError> {
        let frame = UplinkFrame {
            device_id: self.device_id.clone(),
            topic: topic as i32,
            body,
        };
        let encoded = encode_frame(&frame)?;

        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        stream.write_all(&encoded).await?;
        Ok(())
    }

    /// Read whatever is available and queue the decoded events
    fn fill_pending(&mut self) -> Result<(), TransportError> {
        let Some(stream) = self.stream.as_ref() else {
            return Err(TransportError::NotConnected);
        };

        match stream.try_read(&mut self.read_buf) {
            Ok(0) => {
                self.hung_up = true;
            }
            Ok(n) => {
                self.decoder.extend(&self.read_buf[..n]);
                loop {
                    match self.decoder.decode_next() {
                        Ok(Some(frame)) => {
                            if let Some(event) = downlink_event(frame) {
                                self.pending.push_back(event);
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            self.decoder.clear();
                            return Err(e.into());
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

fn uplink_topic(topic: Topic) -> UplinkTopic {
    match topic {
        Topic::Pair => UplinkTopic::TopicPair,
        Topic::Message => UplinkTopic::TopicMessage,
        Topic::Batch => UplinkTopic::TopicBatch,
    }
}

fn downlink_event(frame: DownlinkFrame) -> Option<InboundEvent> {
    match DownlinkKind::try_from(frame.kind).unwrap_or(DownlinkKind::KindUnspecified) {
        DownlinkKind::KindData => Some(InboundEvent::DataReceived(frame.body)),
        DownlinkKind::KindPairRequest => Some(InboundEvent::PairRequest),
        DownlinkKind::KindPairDone => Some(InboundEvent::PairDone),
        DownlinkKind::KindFotaDone => Some(InboundEvent::FotaDone),
        DownlinkKind::KindUnspecified => {
            debug!("Dropping downlink frame of unknown kind {}", frame.kind);
            None
        }
    }
}

#[async_trait]
impl CloudTransport for TcpCloudTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| TransportError::Timeout)??;

        self.stream = Some(stream);
        self.decoder = FrameDecoder::new();
        self.pending.clear();
        self.hung_up = false;
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Shutdown error: {}", e);
            }
        }
        self.pending.clear();
    }

    async fn send(&mut self, msg: &CloudMessage) -> Result<(), TransportError> {
        self.write_frame(uplink_topic(msg.topic), msg.payload.clone())
            .await
    }

    async fn ready(&mut self) -> Readiness {
        if !self.pending.is_empty() {
            return Readiness::Readable;
        }
        if self.hung_up {
            return Readiness::HangUp;
        }
        let Some(stream) = self.stream.as_ref() else {
            return Readiness::InvalidHandle;
        };

        // End of stream also reports readable; input() then records the hang-up
        match stream.ready(Interest::READABLE).await {
            Ok(_) => Readiness::Readable,
            Err(e) => {
                warn!("Socket readiness error: {}", e);
                Readiness::Error
            }
        }
    }

    async fn input(&mut self) -> Result<Option<InboundEvent>, TransportError> {
        if self.pending.is_empty() {
            self.fill_pending()?;
        }
        Ok(self.pending.pop_front())
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.write_frame(UplinkTopic::TopicPing, bytes::Bytes::new())
            .await
    }

    fn name(&self) -> &'static str {
        "TCP"
    }
}
