//! ESP32-S3 firmware-specific modules for wxnode
//!
//! This crate contains the code that only builds for the device: peripheral
//! bring-up, the RTC scratch region, the radio and TCP client behind the
//! core's uplink traits, deep sleep and Wi-Fi credential management.

#![no_std]

pub mod hardware;
pub mod net;
pub mod power;
pub mod rtc_scratch;
pub mod wifi_secrets;
