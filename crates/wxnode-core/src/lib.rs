//! Hardware-independent core library for wxnode
//!
//! This crate contains the run-cycle state machine of the wxnode remote
//! weather station: the battery gate, channel selection, sensor acquisition,
//! uplink submission and the persistent run record that survives deep sleep.
//!
//! It is `#![no_std]` so it compiles on both the ESP32-S3 target and desktop
//! hosts (for the simulator and tests). Hardware is reached only through
//! `embedded-hal` traits and the small collaborator traits defined here.

#![cfg_attr(not(test), no_std)]

pub mod async_i2c_bus;
pub mod battery;
pub mod channel;
pub mod config;
pub mod cycle;
pub mod flags;
pub mod indicator;
pub mod run_store;
pub mod sensors;
pub mod uplink;

#[cfg(test)]
pub(crate) mod testing;

pub use cycle::{CycleContext, CycleHardware, CycleReport, Reading, SleepDirective, run_cycle};
pub use flags::CycleErrorFlags;
pub use run_store::{BootKind, RunRecord, RunStore};
