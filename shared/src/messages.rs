//! Protobuf message definitions exchanged with the cloud

use prost::{Enumeration, Message};

#[derive(Clone, PartialEq, Message)]
pub struct AccelReading {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
    #[prost(double, tag = "3")]
    pub z: f64,
    #[prost(int64, tag = "4")]
    pub ts: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct GpsReading {
    #[prost(double, tag = "1")]
    pub lng: f64,
    #[prost(double, tag = "2")]
    pub lat: f64,
    #[prost(float, tag = "3")]
    pub alt: f32,
    #[prost(float, tag = "4")]
    pub acc: f32,
    #[prost(float, tag = "5")]
    pub spd: f32,
    #[prost(float, tag = "6")]
    pub hdg: f32,
    #[prost(int64, tag = "7")]
    pub ts: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct BatteryReading {
    /// Millivolts
    #[prost(int32, tag = "1")]
    pub voltage: i32,
    #[prost(int64, tag = "2")]
    pub ts: i64,
}

/// Latest accelerometer, GPS and battery values in one message
#[derive(Clone, PartialEq, Message)]
pub struct SensorReport {
    #[prost(message, optional, tag = "1")]
    pub accel: Option<AccelReading>,
    #[prost(message, optional, tag = "2")]
    pub gps: Option<GpsReading>,
    #[prost(message, optional, tag = "3")]
    pub battery: Option<BatteryReading>,
}

/// Buffered fixes flushed from the sample store
#[derive(Clone, PartialEq, Message)]
pub struct GpsBatch {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<GpsReading>,
}

#[derive(Clone, PartialEq, Message)]
pub struct NetworkReport {
    #[prost(uint32, tag = "1")]
    pub band: u32,
    #[prost(string, tag = "2")]
    pub mode: String,
    #[prost(string, tag = "3")]
    pub operator: String,
    #[prost(uint32, tag = "4")]
    pub cell_id: u32,
    #[prost(uint32, tag = "5")]
    pub area_code: u32,
    #[prost(string, tag = "6")]
    pub ip_address: String,
    #[prost(int32, tag = "7")]
    pub rsrp: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeviceReport {
    #[prost(string, tag = "1")]
    pub imei: String,
    #[prost(string, tag = "2")]
    pub iccid: String,
    #[prost(string, tag = "3")]
    pub modem_firmware: String,
    #[prost(string, tag = "4")]
    pub board: String,
    #[prost(string, tag = "5")]
    pub app_version: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ModemReport {
    #[prost(message, optional, tag = "1")]
    pub network: Option<NetworkReport>,
    /// Only present in the pairing report
    #[prost(message, optional, tag = "2")]
    pub device: Option<DeviceReport>,
    #[prost(int64, tag = "3")]
    pub ts: i64,
}

/// Applied configuration, echoed back after every remote write
#[derive(Clone, PartialEq, Message)]
pub struct ConfigReport {
    #[prost(bool, tag = "1")]
    pub active: bool,
    #[prost(uint32, tag = "2")]
    pub active_wait: u32,
    #[prost(uint32, tag = "3")]
    pub passive_wait: u32,
    #[prost(uint32, tag = "4")]
    pub movement_timeout: u32,
    #[prost(uint32, tag = "5")]
    pub gps_timeout: u32,
    #[prost(uint32, tag = "6")]
    pub accel_threshold: u32,
}

/// Remote configuration write; unset fields keep their current value
#[derive(Clone, PartialEq, Message)]
pub struct ConfigUpdate {
    #[prost(bool, optional, tag = "1")]
    pub active: Option<bool>,
    #[prost(uint32, optional, tag = "2")]
    pub active_wait: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub passive_wait: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub movement_timeout: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub gps_timeout: Option<u32>,
    #[prost(uint32, optional, tag = "6")]
    pub accel_threshold: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum UplinkTopic {
    TopicUnspecified = 0,
    TopicPair = 1,
    TopicMessage = 2,
    TopicBatch = 3,
    TopicPing = 4,
}

/// Device to cloud frame
#[derive(Clone, PartialEq, Message)]
pub struct UplinkFrame {
    #[prost(string, tag = "1")]
    pub device_id: String,
    #[prost(enumeration = "UplinkTopic", tag = "2")]
    pub topic: i32,
    #[prost(bytes = "bytes", tag = "3")]
    pub body: bytes::Bytes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum DownlinkKind {
    KindUnspecified = 0,
    KindData = 1,
    KindPairRequest = 2,
    KindPairDone = 3,
    KindFotaDone = 4,
}

/// Cloud to device frame
#[derive(Clone, PartialEq, Message)]
pub struct DownlinkFrame {
    #[prost(enumeration = "DownlinkKind", tag = "1")]
    pub kind: i32,
    #[prost(bytes = "bytes", tag = "2")]
    pub body: bytes::Bytes,
}
