#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_futures::select::{Either3, select3};
use embassy_time::{Delay, Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info};
use static_cell::StaticCell;
use wxnode_core::{CycleHardware, RunStore, SleepDirective, indicator, run_cycle};
use wxnode_firmware::{hardware, net, power, rtc_scratch, wifi_secrets};

/// A cycle still running after this long is considered stalled.
const CYCLE_DEADLINE: Duration = Duration::from_secs(120);

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // esp-radio requires an allocator.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let boot = power::boot_kind();
    info!(
        "{} v{} ({:?} boot)",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        boot
    );

    let config = wifi_secrets::config();
    let mut store = RunStore::new(rtc_scratch::take());

    let i2c_bus =
        hardware::create_i2c_bus(peripherals.I2C0, peripherals.GPIO12, peripherals.GPIO11);
    let bus = match i2c_bus {
        Ok(bus) => bus,
        Err(e) => {
            error!("I2C bus init failed: {:?}", e);
            power::deep_sleep(
                peripherals.LPWR,
                SleepDirective {
                    duration: Duration::from_secs(config.power.sleep_secs as u64),
                },
            );
        }
    };
    let (primary, secondary) = hardware::init_sensors(bus);

    // Only the driver and the DHCP stack are created here. The station is
    // started by `WifiLink::begin`, which the cycle calls after the battery
    // gate, so a low battery never powers the RF front end.
    let network = match esp_radio::init() {
        Ok(radio) => net::start(RADIO.init(radio), peripherals.WIFI)
            .inspect_err(|e| error!("Wi-Fi driver init failed: {:?}", e))
            .ok(),
        Err(e) => {
            error!("Radio init failed: {:?}", e);
            None
        }
    };
    let (wifi, http, runner) = match network {
        Some(net::Network { wifi, http, runner }) => (Some(wifi), Some(http), Some(runner)),
        None => (None, None, None),
    };

    let mut hw = CycleHardware {
        battery: hardware::AdcBattery::new(peripherals.ADC1, peripherals.GPIO1),
        selector: hardware::create_selector(peripherals.GPIO4, peripherals.GPIO5),
        primary,
        secondary,
        wifi,
        http,
        indicator: hardware::create_indicator(peripherals.GPIO21),
        delay: Delay,
    };

    let net_runner = async move {
        match runner {
            Some(mut runner) => runner.run().await,
            None => core::future::pending::<()>().await,
        }
    };

    match select3(
        run_cycle(&mut store, &mut hw, &config, boot),
        Timer::after(CYCLE_DEADLINE),
        net_runner,
    )
    .await
    {
        Either3::First(report) => power::deep_sleep(peripherals.LPWR, report.sleep),
        Either3::Second(()) => error!("Cycle exceeded {} s deadline", CYCLE_DEADLINE.as_secs()),
        Either3::Third(()) => error!("Network runner stopped"),
    }

    indicator::stall(&mut hw.indicator, &mut Delay).await
}
