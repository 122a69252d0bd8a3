//! Duty-cycle scheduling
//!
//! One wake-up per active/passive period: a time-boxed GPS search, then a
//! cloud cycle submitted to the application task.

mod duty_cycle;

pub use duty_cycle::{CycleOutcome, DutyCycleScheduler};
