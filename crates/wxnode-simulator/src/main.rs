//! Desktop simulator for the wxnode run cycle.
//!
//! Runs a scripted sequence of wake cycles against simulated hardware. The
//! scratch region is carried from one cycle to the next the way RTC memory
//! survives deep sleep, so the error code of each cycle shows up in the
//! payload of the following one.
//!
//! ```text
//! RUST_LOG=info cargo run -p wxnode-simulator            # all scenarios
//! RUST_LOG=info cargo run -p wxnode-simulator -- dead    # scenarios whose name contains "dead"
//! ```

use std::convert::Infallible;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use embedded_hal_async::delay::DelayNs;
use embassy_futures::block_on;
use log::{info, warn};

use wxnode_core::battery::BatteryMonitor;
use wxnode_core::channel::ChannelSelector;
use wxnode_core::config::{CollectorConfig, Config, Credentials};
use wxnode_core::run_store::SCRATCH_BUCKETS;
use wxnode_core::sensors::{
    ClimateSample, DeviceVariant, OversamplingProfile, PrimaryReadout, PrimarySensor,
    SecondarySensor, SensorFault,
};
use wxnode_core::uplink::{HttpTransport, TransportError, UplinkError, WifiLink};
use wxnode_core::{BootKind, CycleHardware, RunStore, run_cycle};

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

const PRIMARY_URL: &str = "http://collector.local/wx";
const FALLBACK_URL: &str = "http://backup.example.net/wx";

/// Environment of one simulated wake cycle.
#[derive(Debug, Clone, Copy)]
struct Scenario {
    name: &'static str,
    battery_raw: u16,
    sensor_alive: bool,
    secondary_fitted: bool,
    wifi_up: bool,
    primary_collector_up: bool,
    fallback_collector_up: bool,
}

const NOMINAL: Scenario = Scenario {
    name: "nominal",
    battery_raw: 3100,
    sensor_alive: true,
    secondary_fitted: false,
    wifi_up: true,
    primary_collector_up: true,
    fallback_collector_up: true,
};

const SCENARIOS: [Scenario; 8] = [
    NOMINAL,
    Scenario {
        name: "low battery",
        battery_raw: 1900,
        ..NOMINAL
    },
    Scenario {
        name: "dead sensor",
        sensor_alive: false,
        ..NOMINAL
    },
    Scenario {
        name: "secondary sensor fitted",
        secondary_fitted: true,
        ..NOMINAL
    },
    Scenario {
        name: "wifi outage",
        wifi_up: false,
        ..NOMINAL
    },
    Scenario {
        name: "primary collector outage",
        primary_collector_up: false,
        ..NOMINAL
    },
    Scenario {
        name: "total collector outage",
        primary_collector_up: false,
        fallback_collector_up: false,
        ..NOMINAL
    },
    Scenario {
        name: "recovery",
        ..NOMINAL
    },
];

// ---------------------------------------------------------------------------
// Simulated hardware
// ---------------------------------------------------------------------------

struct SimBattery(u16);

impl BatteryMonitor for SimBattery {
    async fn sample(&mut self) -> u16 {
        self.0
    }
}

struct StrapPin(bool);

impl ErrorType for StrapPin {
    type Error = Infallible;
}

impl InputPin for StrapPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0)
    }
}

/// Fault LED counting its pulses.
#[derive(Default)]
struct SimLed {
    lit: bool,
    pulses: u32,
}

impl ErrorType for SimLed {
    type Error = Infallible;
}

impl OutputPin for SimLed {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.lit = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if !self.lit {
            self.pulses += 1;
        }
        self.lit = true;
        Ok(())
    }
}

/// Delay that only adds up the simulated time.
#[derive(Default)]
struct SimDelay {
    elapsed_ms: u64,
}

impl DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ms += u64::from(ns) / 1_000_000;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.elapsed_ms += u64::from(ms);
    }
}

/// BME280 stand-in producing a slow diurnal-looking curve.
struct SimPrimary {
    alive: bool,
    cycle: u32,
}

impl PrimarySensor for SimPrimary {
    async fn probe(&mut self) -> Result<DeviceVariant, SensorFault> {
        if self.alive {
            Ok(DeviceVariant::Bme280)
        } else {
            Err(SensorFault::NoResponse {
                sensor: "BME280",
                operation: "read chip id",
            })
        }
    }

    async fn configure(
        &mut self,
        _variant: DeviceVariant,
        _profile: &OversamplingProfile,
    ) -> Result<(), SensorFault> {
        Ok(())
    }

    async fn trigger(&mut self) -> Result<(), SensorFault> {
        Ok(())
    }

    async fn read(&mut self) -> PrimaryReadout {
        let phase = self.cycle as f32 / 6.0;
        PrimaryReadout {
            temperature: Ok(14.0 + 6.0 * phase.sin()),
            pressure: Ok(1008.0 + 4.0 * (phase / 3.0).cos()),
            humidity: Ok(70.0 - 15.0 * phase.sin()),
        }
    }
}

struct SimSecondary;

impl SecondarySensor for SimSecondary {
    async fn is_present(&mut self) -> bool {
        true
    }

    async fn read(&mut self) -> Result<ClimateSample, SensorFault> {
        Ok(ClimateSample {
            temperature: 15.25,
            humidity: 66.5,
        })
    }
}

struct SimWifi {
    up: bool,
    connected: Option<&'static str>,
}

impl WifiLink for SimWifi {
    async fn begin(&mut self, networks: &[Credentials<'_>]) -> Result<(), UplinkError> {
        if self.up {
            self.connected = Some("sim-ap");
        }
        info!("[sim] radio started for {} network(s)", networks.len());
        Ok(())
    }

    async fn is_connected(&mut self) -> bool {
        self.connected.is_some()
    }

    fn network_name(&self) -> Option<&str> {
        self.connected
    }
}

struct SimHttp {
    primary_up: bool,
    fallback_up: bool,
}

impl HttpTransport for SimHttp {
    async fn get(&mut self, url: &str) -> Result<u16, TransportError> {
        let up = if url.starts_with(PRIMARY_URL) {
            self.primary_up
        } else {
            self.fallback_up
        };

        if up {
            info!("[sim] collector received {}", url);
            Ok(200)
        } else if url.starts_with(PRIMARY_URL) {
            Ok(503)
        } else {
            Err(TransportError::Connect)
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn station_config() -> Config<'static> {
    let mut config = Config {
        collector: CollectorConfig {
            primary_url: PRIMARY_URL,
            fallback_url: FALLBACK_URL,
        },
        ..Config::default()
    };
    if config
        .internet
        .networks
        .push(Credentials {
            ssid: "sim-ap",
            password: "correct horse",
        })
        .is_err()
    {
        warn!("Network list full");
    }
    config
}

fn main() {
    env_logger::init();
    info!("Starting wxnode simulator");

    let filter = std::env::args().nth(1);
    let config = station_config();

    // Survives the simulated deep sleep between cycles.
    let mut rtc_memory = [0u32; SCRATCH_BUCKETS];
    let mut boot = BootKind::Cold;

    let scenarios = SCENARIOS
        .iter()
        .filter(|s| filter.as_deref().is_none_or(|f| s.name.contains(f)));

    for (cycle, scenario) in (0u32..).zip(scenarios) {
        info!("=== {} ===", scenario.name);

        let mut store = RunStore::new(&mut rtc_memory);
        let mut hw = CycleHardware {
            battery: SimBattery(scenario.battery_raw),
            selector: ChannelSelector::new(StrapPin(false), StrapPin(true)),
            primary: SimPrimary {
                alive: scenario.sensor_alive,
                cycle,
            },
            secondary: scenario.secondary_fitted.then_some(SimSecondary),
            wifi: SimWifi {
                up: scenario.wifi_up,
                connected: None,
            },
            http: SimHttp {
                primary_up: scenario.primary_collector_up,
                fallback_up: scenario.fallback_collector_up,
            },
            indicator: SimLed::default(),
            delay: SimDelay::default(),
        };

        let report = block_on(run_cycle(&mut store, &mut hw, &config, boot));

        info!(
            "{}: error code {} ({:?}), {} blink(s), persisted {:?}, {} ms awake, sleeping {} s",
            scenario.name,
            report.flags.to_wire_value(),
            report.flags,
            hw.indicator.pulses,
            report.record,
            hw.delay.elapsed_ms,
            report.sleep.duration.as_secs()
        );

        boot = BootKind::Wake;
    }

    info!("Simulator exiting");
}
