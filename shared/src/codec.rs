//! Cloud codec: payload encoders, response decoder and TCP framing
//!
//! Payloads are protobuf messages from [`crate::messages`]. On a stream
//! transport every frame is laid out as:
//! ```text
//! [ 4 bytes: length (u32, big-endian) ][ N bytes: protobuf frame ]
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use std::marker::PhantomData;
use thiserror::Error;

use crate::messages::{
    AccelReading, BatteryReading, ConfigReport, ConfigUpdate, DeviceReport, GpsBatch, GpsReading,
    ModemReport, NetworkReport, SensorReport,
};
use crate::{
    uptime_ms, CloudMessage, ConfigPatch, DeviceConfig, DeviceState, GpsFix, ModemSnapshot,
    TimeAnchor, Topic,
};

/// Maximum frame size (64 KiB); a tracker never produces more
pub const MAX_MESSAGE_SIZE: u32 = 64 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("Invalid message length prefix: {0}")]
    InvalidLength(u32),

    #[error("Sensor report has no readings")]
    EmptyReport,

    #[error("GPS batch has no entries")]
    EmptyBatch,

    #[error("Config update carries no fields")]
    EmptyUpdate,

    #[error("Config field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: u32 },

    #[error("Protobuf decode error: {0}")]
    DecodeError(#[from] prost::DecodeError),

    #[error("Protobuf encode error: {0}")]
    EncodeError(#[from] prost::EncodeError),
}

fn gps_reading(fix: &GpsFix, anchor: &TimeAnchor) -> GpsReading {
    GpsReading {
        lng: fix.longitude,
        lat: fix.latitude,
        alt: fix.altitude,
        acc: fix.accuracy,
        spd: fix.speed,
        hdg: fix.heading,
        ts: anchor.to_unix_ms(fix.fix_timestamp),
    }
}

fn to_bytes<M: Message>(msg: &M) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::with_capacity(msg.encoded_len());
    msg.encode(&mut buf)?;
    Ok(buf.freeze())
}

/// Encode the latest accelerometer, GPS and battery readings
///
/// The GPS section is only present when `state.gps_found` is set, so a fix is
/// reported once in a snapshot and otherwise only through the batch path.
pub fn encode_sensor_data(
    state: &DeviceState,
    latest_fix: Option<&GpsFix>,
    anchor: &TimeAnchor,
) -> Result<CloudMessage, CodecError> {
    let accel = (state.accel_timestamp != 0).then(|| AccelReading {
        x: state.accel[0],
        y: state.accel[1],
        z: state.accel[2],
        ts: anchor.to_unix_ms(state.accel_timestamp),
    });

    let gps = latest_fix
        .filter(|_| state.gps_found)
        .map(|fix| gps_reading(fix, anchor));

    let battery = (state.battery_timestamp != 0).then(|| BatteryReading {
        voltage: state.battery_voltage,
        ts: anchor.to_unix_ms(state.battery_timestamp),
    });

    if accel.is_none() && gps.is_none() && battery.is_none() {
        return Err(CodecError::EmptyReport);
    }

    let report = SensorReport {
        accel,
        gps,
        battery,
    };
    Ok(CloudMessage::new(Topic::Message, to_bytes(&report)?))
}

/// Encode a batch of buffered fixes
pub fn encode_gps_batch(fixes: &[GpsFix], anchor: &TimeAnchor) -> Result<CloudMessage, CodecError> {
    if fixes.is_empty() {
        return Err(CodecError::EmptyBatch);
    }

    let batch = GpsBatch {
        entries: fixes.iter().map(|fix| gps_reading(fix, anchor)).collect(),
    };
    Ok(CloudMessage::new(Topic::Batch, to_bytes(&batch)?))
}

/// Encode network information, plus device identity when `include_static`
pub fn encode_modem_data(
    info: &ModemSnapshot,
    include_static: bool,
    rsrp: i32,
    anchor: &TimeAnchor,
) -> Result<CloudMessage, CodecError> {
    let network = NetworkReport {
        band: info.network.current_band,
        mode: info.network.network_mode.clone(),
        operator: info.network.operator.clone(),
        cell_id: info.network.cell_id,
        area_code: info.network.area_code,
        ip_address: info.network.ip_address.clone(),
        rsrp,
    };

    let device = include_static.then(|| DeviceReport {
        imei: info.device.imei.clone(),
        iccid: info.device.iccid.clone(),
        modem_firmware: info.device.modem_firmware.clone(),
        board: info.device.board.clone(),
        app_version: info.device.app_version.clone(),
    });

    let report = ModemReport {
        network: Some(network),
        device,
        ts: anchor.to_unix_ms(uptime_ms()),
    };
    Ok(CloudMessage::new(Topic::Message, to_bytes(&report)?))
}

/// Encode the applied configuration
pub fn encode_config(config: &DeviceConfig) -> Result<CloudMessage, CodecError> {
    let report = ConfigReport {
        active: config.active,
        active_wait: config.active_wait,
        passive_wait: config.passive_wait,
        movement_timeout: config.movement_timeout,
        gps_timeout: config.gps_timeout,
        accel_threshold: config.accel_threshold,
    };
    Ok(CloudMessage::new(Topic::Message, to_bytes(&report)?))
}

/// Decode a configuration write from the cloud
///
/// The whole update is validated before a patch is returned, so a caller
/// never sees a partially valid update.
pub fn decode_response(input: &[u8]) -> Result<ConfigPatch, CodecError> {
    let update = ConfigUpdate::decode(input)?;

    let patch = ConfigPatch {
        active: update.active,
        active_wait: update.active_wait,
        passive_wait: update.passive_wait,
        movement_timeout: update.movement_timeout,
        gps_timeout: update.gps_timeout,
        accel_threshold: update.accel_threshold,
    };

    if patch.is_empty() {
        return Err(CodecError::EmptyUpdate);
    }

    for (field, value) in [
        ("active_wait", patch.active_wait),
        ("passive_wait", patch.passive_wait),
        ("gps_timeout", patch.gps_timeout),
    ] {
        if value == Some(0) {
            return Err(CodecError::OutOfRange { field, value: 0 });
        }
    }

    Ok(patch)
}

/// Encode a message into a length-prefixed byte buffer
pub fn encode_frame<M: Message>(msg: &M) -> Result<Bytes, CodecError> {
    let msg_len = msg.encoded_len();

    if msg_len > MAX_MESSAGE_SIZE as usize {
        return Err(CodecError::MessageTooLarge(msg_len));
    }

    let mut buf = BytesMut::with_capacity(4 + msg_len);
    buf.put_u32(msg_len as u32);
    msg.encode(&mut buf)?;

    Ok(buf.freeze())
}

/// Try to decode a length-prefixed message from a buffer
///
/// Returns:
/// - `Ok(Some(msg))` if a complete message was decoded
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the data is invalid
pub fn decode_frame<M: Message + Default>(buf: &mut BytesMut) -> Result<Option<M>, CodecError> {
    if buf.len() < 4 {
        return Ok(None);
    }

    // Peek at the length prefix without consuming
    let msg_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

    if msg_len > MAX_MESSAGE_SIZE {
        return Err(CodecError::InvalidLength(msg_len));
    }

    let total_len = 4 + msg_len as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(4);
    let msg_bytes = buf.split_to(msg_len as usize);

    Ok(Some(M::decode(msg_bytes)?))
}

/// Streaming decoder accumulating partial frames
#[derive(Debug)]
pub struct FrameDecoder<M> {
    buffer: BytesMut,
    _frame: PhantomData<M>,
}

impl<M: Message + Default> Default for FrameDecoder<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Message + Default> FrameDecoder<M> {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            _frame: PhantomData,
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Call repeatedly until it returns `Ok(None)` to drain all complete frames
    pub fn decode_next(&mut self) -> Result<Option<M>, CodecError> {
        decode_frame(&mut self.buffer)
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop buffered bytes. A bad length prefix cannot be skipped, so the
    /// stream has to be resynchronised from scratch.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{DownlinkFrame, DownlinkKind};
    use crate::StaticDeviceInfo;

    fn sample_fix(ts: i64) -> GpsFix {
        GpsFix {
            longitude: 10.39,
            latitude: 63.43,
            altitude: 12.0,
            accuracy: 4.5,
            speed: 0.3,
            heading: 180.0,
            fix_timestamp: ts,
            queued: true,
        }
    }

    #[test]
    fn test_config_encoding_is_deterministic() {
        let config = DeviceConfig::default();
        let first = encode_config(&config).expect("encode failed");
        let second = encode_config(&config).expect("encode failed");
        assert_eq!(first, second);
        assert_eq!(first.topic, Topic::Message);
    }

    #[test]
    fn test_sensor_report_omits_gps_unless_found() {
        let anchor = TimeAnchor::new(1_000, 0);
        let fix = sample_fix(500);
        let mut state = DeviceState {
            battery_voltage: 3900,
            battery_timestamp: 100,
            ..Default::default()
        };

        let msg = encode_sensor_data(&state, Some(&fix), &anchor).expect("encode failed");
        let report = SensorReport::decode(msg.payload).expect("decode failed");
        assert!(report.gps.is_none());
        assert!(report.accel.is_none());
        assert_eq!(report.battery.map(|b| b.voltage), Some(3900));

        state.gps_found = true;
        let msg = encode_sensor_data(&state, Some(&fix), &anchor).expect("encode failed");
        let report = SensorReport::decode(msg.payload).expect("decode failed");
        let gps = report.gps.expect("gps section missing");
        assert_eq!(gps.ts, 1_000_500);
    }

    #[test]
    fn test_empty_sensor_report_is_rejected() {
        let state = DeviceState::default();
        let result = encode_sensor_data(&state, None, &TimeAnchor::default());
        assert!(matches!(result, Err(CodecError::EmptyReport)));
    }

    #[test]
    fn test_gps_batch_timestamps() {
        let anchor = TimeAnchor::new(2_000, 1_000);
        let msg = encode_gps_batch(&[sample_fix(1_000), sample_fix(3_000)], &anchor)
            .expect("encode failed");
        assert_eq!(msg.topic, Topic::Batch);

        let batch = GpsBatch::decode(msg.payload).expect("decode failed");
        let ts: Vec<i64> = batch.entries.iter().map(|e| e.ts).collect();
        assert_eq!(ts, vec![2_000_000, 2_002_000]);

        assert!(matches!(
            encode_gps_batch(&[], &anchor),
            Err(CodecError::EmptyBatch)
        ));
    }

    #[test]
    fn test_modem_static_fields_only_when_requested() {
        let info = ModemSnapshot {
            device: StaticDeviceInfo {
                imei: "352656100000000".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let anchor = TimeAnchor::default();

        let msg = encode_modem_data(&info, false, -90, &anchor).expect("encode failed");
        let report = ModemReport::decode(msg.payload).expect("decode failed");
        assert!(report.device.is_none());
        assert_eq!(report.network.map(|n| n.rsrp), Some(-90));

        let msg = encode_modem_data(&info, true, -90, &anchor).expect("encode failed");
        let report = ModemReport::decode(msg.payload).expect("decode failed");
        assert_eq!(report.device.map(|d| d.imei), Some("352656100000000".into()));
    }

    #[test]
    fn test_decode_response() {
        let update = ConfigUpdate {
            active: Some(false),
            passive_wait: Some(300),
            active_wait: None,
            movement_timeout: None,
            gps_timeout: None,
            accel_threshold: Some(0),
        };
        let patch = decode_response(&update.encode_to_vec()).expect("decode failed");
        assert_eq!(patch.active, Some(false));
        assert_eq!(patch.passive_wait, Some(300));
        assert_eq!(patch.accel_threshold, Some(0));
        assert_eq!(patch.active_wait, None);
    }

    #[test]
    fn test_decode_response_rejects_whole_update() {
        let update = ConfigUpdate {
            active: Some(false),
            active_wait: Some(0),
            passive_wait: None,
            movement_timeout: None,
            gps_timeout: None,
            accel_threshold: None,
        };
        let result = decode_response(&update.encode_to_vec());
        assert!(matches!(
            result,
            Err(CodecError::OutOfRange {
                field: "active_wait",
                ..
            })
        ));

        assert!(matches!(decode_response(&[]), Err(CodecError::EmptyUpdate)));
        assert!(decode_response(&[0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_partial_frame() {
        let frame = DownlinkFrame {
            kind: DownlinkKind::KindPairDone as i32,
            body: Bytes::new(),
        };
        let encoded = encode_frame(&frame).expect("encode failed");

        let mut decoder = FrameDecoder::<DownlinkFrame>::new();
        decoder.extend(&encoded[..3]);
        assert!(decoder.decode_next().expect("decode error").is_none());

        decoder.extend(&encoded[3..]);
        let decoded = decoder
            .decode_next()
            .expect("decode error")
            .expect("should have message");
        assert_eq!(decoded, frame);
        assert_eq!(decoder.buffer_len(), 0);
    }

    #[test]
    fn test_oversized_length_prefix() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_MESSAGE_SIZE + 1);
        buf.put_bytes(0, 16);

        let result = decode_frame::<DownlinkFrame>(&mut buf);
        assert!(matches!(result, Err(CodecError::InvalidLength(_))));
    }

    #[test]
    fn test_cleared_decoder_accepts_next_frame() {
        let mut decoder = FrameDecoder::<DownlinkFrame>::new();
        decoder.extend(&[0xff, 0xff, 0xff, 0xff, 0x00, 0x00]);
        assert!(decoder.decode_next().is_err());
        // The bad prefix stays put until cleared
        assert!(decoder.decode_next().is_err());

        decoder.clear();
        let frame = DownlinkFrame {
            kind: DownlinkKind::KindPairDone as i32,
            body: Bytes::new(),
        };
        decoder.extend(&encode_frame(&frame).expect("encode failed"));
        let decoded = decoder.decode_next().expect("decode failed");
        assert_eq!(decoded.map(|f| f.kind), Some(DownlinkKind::KindPairDone as i32));
    }
}
