use serde::{Deserialize, Serialize};

use crate::channel::CHANNEL_COUNT;
use crate::sensors::OversamplingProfile;

/// Maximum number of known networks tried during association.
pub const MAX_NETWORKS: usize = 4;

/// Channel identities selected by the strap pins, in index order.
pub const DEFAULT_CHANNELS: [&str; CHANNEL_COUNT] = ["node0", "node1", "node2", "node3"];

/// Raw 12-bit ADC counts below which the cycle is skipped.
pub const DEFAULT_BATTERY_CUTOFF: u16 = 2200;

pub const DEFAULT_SLEEP_SECS: u32 = 600;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct Config<'a> {
    pub internet: InternetConfig<'a>,
    pub collector: CollectorConfig<'a>,
    pub channels: [&'a str; CHANNEL_COUNT],
    pub power: PowerConfig,
    pub sensor: SensorConfig,
    pub association: AssociationConfig,
    pub indicator: IndicatorConfig,
}

impl Default for Config<'_> {
    fn default() -> Self {
        Self {
            internet: InternetConfig::default(),
            collector: CollectorConfig::default(),
            channels: DEFAULT_CHANNELS,
            power: PowerConfig::default(),
            sensor: SensorConfig::default(),
            association: AssociationConfig::default(),
            indicator: IndicatorConfig::default(),
        }
    }
}

/// One known wireless network.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Credentials<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct InternetConfig<'a> {
    /// Networks in preference order
    pub networks: heapless::Vec<Credentials<'a>, MAX_NETWORKS>,
}

/// Base URLs of the collector, tried in order.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy)]
pub struct CollectorConfig<'a> {
    pub primary_url: &'a str,
    pub fallback_url: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct PowerConfig {
    pub battery_cutoff: u16,
    pub sleep_secs: u32,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            battery_cutoff: DEFAULT_BATTERY_CUTOFF,
            sleep_secs: DEFAULT_SLEEP_SECS,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct SensorConfig {
    /// Handshake attempts before the primary sensor is given up on
    pub max_attempts: u8,
    pub retry_delay_ms: u32,
    /// Wait between triggering a measurement and reading it back
    pub settle_ms: u32,
    pub oversampling: OversamplingProfile,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay_ms: 500,
            settle_ms: 50,
            oversampling: OversamplingProfile::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct AssociationConfig {
    /// Wait after starting association before the first status poll
    pub settle_ms: u32,
    pub max_polls: u8,
    pub poll_interval_ms: u32,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            settle_ms: 2000,
            max_polls: 20,
            poll_interval_ms: 500,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct IndicatorConfig {
    /// On and off time of one fault pulse
    pub half_period_ms: u32,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self { half_period_ms: 500 }
    }
}
