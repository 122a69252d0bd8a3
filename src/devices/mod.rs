//! Device abstractions: GPS receiver, modem and LTE link

#[cfg(test)]
pub mod mock;
pub mod simulated;
pub mod traits;

pub use traits::{GpsReceiver, LteLink, ModemInfoProvider, Registration};
