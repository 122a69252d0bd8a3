//! Absolute time from modem network time or GPS time
//!
//! Both sources produce a [`TimeAnchor`] pairing an absolute epoch with the
//! uptime at which it was read.

use chrono::NaiveDate;
use thiserror::Error;
use tracker_shared::TimeAnchor;

#[derive(Error, Debug, PartialEq)]
pub enum TimeSyncError {
    #[error("Network time string too short: {0:?}")]
    TooShort(String),

    #[error("Malformed {field} in time string {raw:?}")]
    Malformed { field: &'static str, raw: String },

    #[error("Date/time out of range: {0}")]
    OutOfRange(String),
}

/// UTC date and time as delivered with a GPS fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpsDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub seconds: u8,
}

fn to_epoch(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Result<i64, TimeSyncError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .map(|dt| dt.and_utc().timestamp())
        .ok_or_else(|| {
            TimeSyncError::OutOfRange(format!(
                "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
            ))
        })
}

/// Parse modem network time `YY/MM/DD,hh:mm:ss+TZ` (TZ in quarter hours).
///
/// The timezone suffix is ignored; the modem reports UTC on this network.
pub fn anchor_from_network_time(raw: &str, uptime_ms: i64) -> Result<TimeAnchor, TimeSyncError> {
    if raw.len() < 17 {
        return Err(TimeSyncError::TooShort(raw.to_string()));
    }

    let field = |name: &'static str, start: usize| -> Result<u32, TimeSyncError> {
        raw.get(start..start + 2)
            .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| TimeSyncError::Malformed {
                field: name,
                raw: raw.to_string(),
            })
    };

    let year = field("year", 0)? as i32 + 2000;
    let epoch = to_epoch(
        year,
        field("month", 3)?,
        field("day", 6)?,
        field("hour", 9)?,
        field("minute", 12)?,
        field("second", 15)?,
    )?;

    Ok(TimeAnchor::new(epoch, uptime_ms))
}

/// Anchor from the UTC time carried by a GPS fix
pub fn anchor_from_gps(dt: &GpsDateTime, uptime_ms: i64) -> Result<TimeAnchor, TimeSyncError> {
    let epoch = to_epoch(
        i32::from(dt.year),
        u32::from(dt.month),
        u32::from(dt.day),
        u32::from(dt.hour),
        u32::from(dt.minute),
        u32::from(dt.seconds),
    )?;
    Ok(TimeAnchor::new(epoch, uptime_ms))
}
