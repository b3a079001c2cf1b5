//! Run-cycle orchestration
//!
//! One wake cycle, strictly in order:
//!
//! ```text
//! INIT -> BATTERY_CHECK
//!      -> (SENSOR_ACQUIRE -> CHANNEL_BUILD -> NETWORK_SUBMIT)?
//!      -> PERSIST -> SLEEP
//! ```
//!
//! The bracketed stages only run when the battery gate passes. Every fault is
//! folded into [`CycleErrorFlags`]; nothing aborts the cycle, so persist and
//! the sleep directive are always reached.

use embassy_time::Duration;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal_async::delay::DelayNs;
use log::{error, info, warn};

use crate::battery::{self, BatteryMonitor};
use crate::channel::ChannelSelector;
use crate::config::Config;
use crate::flags::CycleErrorFlags;
use crate::indicator;
use crate::run_store::{BootKind, RunRecord, RunStore, ScratchMemory};
use crate::sensors::{self, Measurement, PrimarySensor, SecondarySensor};
use crate::uplink::{self, HttpTransport, WifiLink};

/// Everything reported to the collector for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading<'c> {
    pub channel: &'c str,
    pub battery_raw: u16,
    pub run_count: u32,
    pub measurement: Measurement,
    /// Wire value of the previous cycle's error flags
    pub previous_error: i32,
}

/// State threaded through the stages of a single cycle.
///
/// Created at INIT from the loaded record and consumed at PERSIST.
#[derive(Debug)]
pub struct CycleContext<'c> {
    pub flags: CycleErrorFlags,
    /// Record as loaded, with this cycle's run counter applied
    pub record: RunRecord,
    pub reading: Option<Reading<'c>>,
}

impl<'c> CycleContext<'c> {
    /// Load the run record and count this cycle.
    pub fn init<M: ScratchMemory>(store: &mut RunStore<M>, boot: BootKind) -> Self {
        let loaded = store.load(boot);
        store.increment_count();
        info!(
            "Run {} starting ({:?} boot, previous error code {})",
            store.count(),
            boot,
            loaded.error_code
        );

        Self {
            flags: CycleErrorFlags::empty(),
            record: store.record(),
            reading: None,
        }
    }

    /// Replace the stored error code with this cycle's flags and write the
    /// record back in one piece.
    pub fn persist<M: ScratchMemory>(
        self,
        store: &mut RunStore<M>,
    ) -> (CycleErrorFlags, Option<Reading<'c>>) {
        store.set_error_code(self.flags.to_wire_value());
        store.save();
        info!(
            "Run {} finished with error code {}",
            store.count(),
            self.flags.to_wire_value()
        );
        (self.flags, self.reading)
    }
}

/// Board peripherals and collaborators used by a cycle.
pub struct CycleHardware<B, L, M, P, S, W, H, O, D> {
    pub battery: B,
    pub selector: ChannelSelector<L, M>,
    pub primary: P,
    pub secondary: Option<S>,
    pub wifi: W,
    pub http: H,
    pub indicator: O,
    pub delay: D,
}

/// How long to deep sleep before the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepDirective {
    pub duration: Duration,
}

/// Outcome of one cycle, handed back to the caller that performs the sleep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport<'c> {
    pub flags: CycleErrorFlags,
    /// `None` when the battery gate skipped the measurement
    pub reading: Option<Reading<'c>>,
    pub record: RunRecord,
    pub sleep: SleepDirective,
}

/// Run one complete wake cycle.
pub async fn run_cycle<'c, Mem, B, L, M, P, S, W, H, O, D>(
    store: &mut RunStore<Mem>,
    hw: &mut CycleHardware<B, L, M, P, S, W, H, O, D>,
    config: &Config<'c>,
    boot: BootKind,
) -> CycleReport<'c>
where
    Mem: ScratchMemory,
    B: BatteryMonitor,
    L: InputPin,
    M: InputPin,
    P: PrimarySensor,
    S: SecondarySensor,
    W: WifiLink,
    H: HttpTransport,
    O: OutputPin,
    D: DelayNs,
{
    let mut ctx = CycleContext::init(store, boot);

    let status = battery::check(&mut hw.battery, config.power.battery_cutoff).await;
    if status.is_acceptable() {
        measure_and_submit(&mut ctx, hw, config, status.raw()).await;
    } else {
        ctx.flags |= CycleErrorFlags::LOW_BATTERY;
    }

    let (flags, reading) = ctx.persist(store);

    indicator::blink(
        &mut hw.indicator,
        &mut hw.delay,
        flags.blink_count(),
        config.indicator.half_period_ms,
    )
    .await;

    let sleep = SleepDirective {
        duration: Duration::from_secs(config.power.sleep_secs as u64),
    };
    info!("Sleeping for {} s", config.power.sleep_secs);

    CycleReport {
        flags,
        reading,
        record: store.record(),
        sleep,
    }
}

async fn measure_and_submit<'c, B, L, M, P, S, W, H, O, D>(
    ctx: &mut CycleContext<'c>,
    hw: &mut CycleHardware<B, L, M, P, S, W, H, O, D>,
    config: &Config<'c>,
    battery_raw: u16,
) where
    L: InputPin,
    M: InputPin,
    P: PrimarySensor,
    S: SecondarySensor,
    W: WifiLink,
    H: HttpTransport,
    D: DelayNs,
{
    let measurement = sensors::acquire(
        &mut hw.primary,
        hw.secondary.as_mut(),
        &mut hw.delay,
        &config.sensor,
        &mut ctx.flags,
    )
    .await;

    let reading = Reading {
        channel: hw.selector.select(&config.channels),
        battery_raw,
        run_count: ctx.record.run_count,
        measurement,
        previous_error: ctx.record.error_code,
    };
    ctx.reading = Some(reading);

    if let Err(e) = uplink::associate(
        &mut hw.wifi,
        &mut hw.delay,
        &config.internet.networks,
        &config.association,
    )
    .await
    {
        error!("Wi-Fi unavailable: {}", e);
        ctx.flags |= CycleErrorFlags::WIFI_FAILED;
        return;
    }

    match uplink::submit(&mut hw.http, &config.collector, &reading).await {
        Ok(delivery) => info!("Reading delivered via {:?} collector", delivery),
        Err(e) => {
            warn!("Upload failed: {}", e);
            ctx.flags |= CycleErrorFlags::UPLOAD_FAILED;
        }
    }
}
