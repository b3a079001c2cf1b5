//! Build-time secrets and the station configuration assembled from them.
//!
//! Values come from `.env` through `build.rs`; empty entries are skipped.

use log::warn;
use wxnode_core::config::{CollectorConfig, Config, Credentials};

pub const WIFI_SSID: &str = env!("WIFI_SSID");
pub const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");
pub const WIFI_SSID_2: &str = env!("WIFI_SSID_2");
pub const WIFI_PASSWORD_2: &str = env!("WIFI_PASSWORD_2");
pub const COLLECTOR_URL: &str = env!("COLLECTOR_URL");
pub const COLLECTOR_FALLBACK_URL: &str = env!("COLLECTOR_FALLBACK_URL");

/// Station configuration: compile-time defaults plus the injected secrets.
pub fn config() -> Config<'static> {
    let mut config = Config {
        collector: CollectorConfig {
            primary_url: COLLECTOR_URL,
            fallback_url: COLLECTOR_FALLBACK_URL,
        },
        ..Config::default()
    };

    for (ssid, password) in [(WIFI_SSID, WIFI_PASSWORD), (WIFI_SSID_2, WIFI_PASSWORD_2)] {
        if ssid.is_empty() {
            continue;
        }
        if config
            .internet
            .networks
            .push(Credentials { ssid, password })
            .is_err()
        {
            warn!("Network list full, ignoring {}", ssid);
        }
    }

    if config.internet.networks.is_empty() {
        warn!("No WIFI_SSID set at build time, uplink will be skipped");
    }

    config
}
