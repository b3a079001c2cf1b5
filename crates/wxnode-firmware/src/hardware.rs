//! Hardware initialization for the wxnode board
//!
//! Pin map:
//! - I2C0: SDA GPIO12, SCL GPIO11 (BME280 at 0x76, optional SHT40 at 0x44)
//! - Battery divider: GPIO1 on ADC1
//! - Channel selector straps: GPIO4 (lsb), GPIO5 (msb), pulled down
//! - Fault LED: GPIO21

use embassy_sync::mutex::Mutex;
use embassy_time::Delay;
use esp_hal::Blocking;
use esp_hal::analog::adc::{Adc, AdcConfig, AdcPin, Attenuation};
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::i2c::master::{Config as I2cConfig, ConfigError, I2c};
use esp_hal::peripherals::{ADC1, GPIO1, GPIO4, GPIO5, GPIO11, GPIO12, GPIO21, I2C0};
use esp_hal::time::Rate;
use log::{error, info};
use static_cell::StaticCell;
use wxnode_core::async_i2c_bus::{AsyncI2cDevice, SharedI2c};
use wxnode_core::battery::BatteryMonitor;
use wxnode_core::channel::ChannelSelector;
use wxnode_core::sensors::bme280::{ADDRESS_PRIMARY, Bme280};

pub type SensorBus = I2c<'static, esp_hal::Async>;
pub type SensorDevice = AsyncI2cDevice<'static, SensorBus>;
pub type PrimarySensor = Bme280<SensorDevice, Delay>;

#[cfg(feature = "sensor-sht40")]
pub type SecondarySensor = wxnode_core::sensors::SHT40Sensor<SensorDevice, Delay>;
#[cfg(not(feature = "sensor-sht40"))]
pub type SecondarySensor = NoSecondary;

/// Stand-in when the secondary sensor is compiled out.
#[cfg(not(feature = "sensor-sht40"))]
pub struct NoSecondary;

#[cfg(not(feature = "sensor-sht40"))]
impl wxnode_core::sensors::SecondarySensor for NoSecondary {
    async fn is_present(&mut self) -> bool {
        false
    }

    async fn read(
        &mut self,
    ) -> Result<wxnode_core::sensors::ClimateSample, wxnode_core::sensors::SensorFault> {
        Err(wxnode_core::sensors::SensorFault::NotInitialized)
    }
}

/// Create the sensor I2C bus (400 kHz).
pub fn create_i2c_bus(
    i2c0: I2C0<'static>,
    sda: GPIO12<'static>,
    scl: GPIO11<'static>,
) -> Result<SensorBus, ConfigError> {
    Ok(I2c::new(i2c0, I2cConfig::default().with_frequency(Rate::from_khz(400)))?
        .with_sda(sda)
        .with_scl(scl)
        .into_async())
}

/// Share the bus between the primary and the secondary sensor.
pub fn init_sensors(bus: SensorBus) -> (PrimarySensor, Option<SecondarySensor>) {
    static SENSOR_BUS: StaticCell<SharedI2c<SensorBus>> = StaticCell::new();
    let bus = SENSOR_BUS.init(Mutex::new(bus));

    let primary = Bme280::new(AsyncI2cDevice::new(bus), Delay, ADDRESS_PRIMARY);

    #[cfg(feature = "sensor-sht40")]
    let secondary = Some(wxnode_core::sensors::SHT40Sensor::new(
        AsyncI2cDevice::new(bus),
        Delay,
    ));
    #[cfg(not(feature = "sensor-sht40"))]
    let secondary = None;

    info!("Sensor bus ready");
    (primary, secondary)
}

/// Battery level read from a resistor divider on ADC1.
pub struct AdcBattery {
    adc: Adc<'static, ADC1<'static>, Blocking>,
    pin: AdcPin<GPIO1<'static>, ADC1<'static>>,
}

impl AdcBattery {
    pub fn new(adc1: ADC1<'static>, pin: GPIO1<'static>) -> Self {
        let mut config = AdcConfig::new();
        let pin = config.enable_pin(pin, Attenuation::_11dB);
        Self {
            adc: Adc::new(adc1, config),
            pin,
        }
    }
}

impl BatteryMonitor for AdcBattery {
    async fn sample(&mut self) -> u16 {
        match nb::block!(self.adc.read_oneshot(&mut self.pin)) {
            Ok(raw) => raw,
            Err(e) => {
                // An unreadable ADC counts as an empty battery.
                error!("Battery ADC read failed: {:?}", e);
                0
            }
        }
    }
}

pub type Selector = ChannelSelector<Input<'static>, Input<'static>>;

pub fn create_selector(lsb: GPIO4<'static>, msb: GPIO5<'static>) -> Selector {
    let pulled_down = || InputConfig::default().with_pull(Pull::Down);
    ChannelSelector::new(Input::new(lsb, pulled_down()), Input::new(msb, pulled_down()))
}

pub fn create_indicator(pin: GPIO21<'static>) -> Output<'static> {
    Output::new(pin, Level::Low, OutputConfig::default())
}
