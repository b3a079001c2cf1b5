//! Sensor acquisition
//!
//! The primary device (BME280 / BMP280) provides temperature, pressure and,
//! depending on the variant, humidity. An optional secondary device on the
//! same bus provides temperature and humidity. Every value is carried as a
//! `Result` so that a missing reading is a typed fault until it reaches the
//! wire format.

#[cfg(feature = "sensor-bme280")]
pub mod bme280;
#[cfg(feature = "sensor-sht40")]
pub mod sht40;

#[cfg(feature = "sensor-bme280")]
pub use bme280::Bme280;
#[cfg(feature = "sensor-sht40")]
pub use sht40::SHT40Sensor;

use embedded_hal_async::delay::DelayNs;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::config::SensorConfig;
use crate::flags::CycleErrorFlags;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFault {
    #[error("{sensor} did not answer during {operation}")]
    NoResponse {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor} reported unsupported chip id 0x{chip_id:02X}")]
    UnsupportedChip { sensor: &'static str, chip_id: u8 },
    #[error("{sensor} is still busy with a previous measurement")]
    Busy { sensor: &'static str },
    #[error("{sensor} value not ready")]
    NotReady { sensor: &'static str },
    #[error("{sensor} has no {channel} channel")]
    Unsupported {
        sensor: &'static str,
        channel: &'static str,
    },
    #[error("sensor was not brought up")]
    NotInitialized,
}

/// Identity reported by the primary device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceVariant {
    /// Temperature, pressure and humidity
    Bme280,
    /// Temperature and pressure only
    Bmp280,
}

impl DeviceVariant {
    pub const fn has_humidity(self) -> bool {
        matches!(self, Self::Bme280)
    }
}

/// Oversampling factor for one measurement channel.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Oversampling {
    Skip,
    X1,
    X2,
    X4,
    X8,
    X16,
}

impl Oversampling {
    /// Register field encoding shared by all Bosch environmental sensors.
    pub const fn bits(self) -> u8 {
        match self {
            Self::Skip => 0b000,
            Self::X1 => 0b001,
            Self::X2 => 0b010,
            Self::X4 => 0b011,
            Self::X8 => 0b100,
            Self::X16 => 0b101,
        }
    }
}

/// Oversampling for each channel the primary device may support.
///
/// The default is the "weather monitoring" profile: single samples, lowest
/// power, one forced measurement per wake.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct OversamplingProfile {
    pub temperature: Oversampling,
    pub pressure: Oversampling,
    pub humidity: Oversampling,
}

impl Default for OversamplingProfile {
    fn default() -> Self {
        Self {
            temperature: Oversampling::X1,
            pressure: Oversampling::X1,
            humidity: Oversampling::X1,
        }
    }
}

/// Readings of the primary device, each channel independently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimaryReadout {
    /// Degrees Celsius
    pub temperature: Result<f32, SensorFault>,
    /// Hectopascal
    pub pressure: Result<f32, SensorFault>,
    /// Percent relative humidity
    pub humidity: Result<f32, SensorFault>,
}

/// Readings of the secondary temperature/humidity device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateSample {
    pub temperature: f32,
    pub humidity: f32,
}

/// Primary temperature/pressure(/humidity) device contract.
pub trait PrimarySensor {
    /// Handshake with the device and query its identity.
    fn probe(&mut self) -> impl Future<Output = Result<DeviceVariant, SensorFault>>;

    /// Apply the oversampling profile to every channel `variant` supports.
    fn configure(
        &mut self,
        variant: DeviceVariant,
        profile: &OversamplingProfile,
    ) -> impl Future<Output = Result<(), SensorFault>>;

    /// Start a single-shot measurement. Rejected while one is in flight.
    fn trigger(&mut self) -> impl Future<Output = Result<(), SensorFault>>;

    /// Read whatever the device currently holds.
    fn read(&mut self) -> impl Future<Output = PrimaryReadout>;
}

/// Secondary temperature/humidity device contract.
pub trait SecondarySensor {
    /// Whether the device acknowledges on the bus.
    fn is_present(&mut self) -> impl Future<Output = bool>;

    fn read(&mut self) -> impl Future<Output = Result<ClimateSample, SensorFault>>;
}

/// Merged measurement of one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub temperature: Result<f32, SensorFault>,
    pub pressure: Result<f32, SensorFault>,
    pub humidity: Result<f32, SensorFault>,
}

impl Default for Measurement {
    fn default() -> Self {
        Self {
            temperature: Err(SensorFault::NotInitialized),
            pressure: Err(SensorFault::NotInitialized),
            humidity: Err(SensorFault::NotInitialized),
        }
    }
}

impl From<PrimaryReadout> for Measurement {
    fn from(readout: PrimaryReadout) -> Self {
        Self {
            temperature: readout.temperature,
            pressure: readout.pressure,
            humidity: readout.humidity,
        }
    }
}

impl Measurement {
    /// Merge a secondary sample into this measurement.
    ///
    /// Precedence: when the secondary device produced a sample, its
    /// temperature and humidity supersede the primary's, even when the
    /// primary values were valid. Pressure always comes from the primary.
    /// There is no averaging.
    pub fn merge_secondary(self, secondary: Option<ClimateSample>) -> Self {
        match secondary {
            Some(sample) => Self {
                temperature: Ok(sample.temperature),
                pressure: self.pressure,
                humidity: Ok(sample.humidity),
            },
            None => self,
        }
    }
}

/// Handshake with the primary device up to `max_attempts` times.
///
/// `retry_delay_ms` is waited between consecutive attempts, not after the
/// last one.
pub async fn bring_up<P: PrimarySensor, D: DelayNs>(
    sensor: &mut P,
    delay: &mut D,
    max_attempts: u8,
    retry_delay_ms: u32,
) -> Result<DeviceVariant, SensorFault> {
    let mut last_fault = SensorFault::NotInitialized;

    for attempt in 1..=max_attempts {
        match sensor.probe().await {
            Ok(variant) => {
                info!("Primary sensor {:?} answered on attempt {}", variant, attempt);
                return Ok(variant);
            }
            Err(fault) => {
                warn!(
                    "Primary sensor attempt {}/{} failed: {}",
                    attempt, max_attempts, fault
                );
                last_fault = fault;
                if attempt < max_attempts {
                    delay.delay_ms(retry_delay_ms).await;
                }
            }
        }
    }

    Err(last_fault)
}

/// Trigger a single-shot measurement, wait `settle_ms`, then read it back.
///
/// Only a rejected trigger is an error. Channels that are not ready after
/// the settle delay come back as per-channel faults.
pub async fn trigger_and_read<P: PrimarySensor, D: DelayNs>(
    sensor: &mut P,
    delay: &mut D,
    settle_ms: u32,
) -> Result<PrimaryReadout, SensorFault> {
    sensor.trigger().await?;
    delay.delay_ms(settle_ms).await;
    Ok(sensor.read().await)
}

/// Query the secondary device, if one is fitted and answers.
pub async fn read_secondary<S: SecondarySensor>(sensor: Option<&mut S>) -> Option<ClimateSample> {
    let sensor = sensor?;

    if !sensor.is_present().await {
        info!("Secondary sensor not present");
        return None;
    }

    match sensor.read().await {
        Ok(sample) => {
            info!(
                "Secondary sensor: {:.2} C, {:.2} %RH",
                sample.temperature, sample.humidity
            );
            Some(sample)
        }
        Err(fault) => {
            warn!("Secondary sensor present but unreadable: {}", fault);
            None
        }
    }
}

/// Full acquisition stage: bring-up, configuration, measurement, merge.
///
/// Faults are recorded in `flags`; the returned measurement always has an
/// entry for every channel.
pub async fn acquire<P, S, D>(
    primary: &mut P,
    secondary: Option<&mut S>,
    delay: &mut D,
    config: &SensorConfig,
    flags: &mut CycleErrorFlags,
) -> Measurement
where
    P: PrimarySensor,
    S: SecondarySensor,
    D: DelayNs,
{
    let primary_measurement = match bring_up(
        primary,
        delay,
        config.max_attempts,
        config.retry_delay_ms,
    )
    .await
    {
        Ok(variant) => measure_primary(primary, delay, variant, config, flags).await,
        Err(fault) => {
            error!("Primary sensor unavailable: {}", fault);
            *flags |= CycleErrorFlags::SENSOR_INIT_FAILED;
            Measurement::default()
        }
    };

    let secondary_sample = read_secondary(secondary).await;
    primary_measurement.merge_secondary(secondary_sample)
}

async fn measure_primary<P: PrimarySensor, D: DelayNs>(
    primary: &mut P,
    delay: &mut D,
    variant: DeviceVariant,
    config: &SensorConfig,
    flags: &mut CycleErrorFlags,
) -> Measurement {
    if let Err(fault) = primary.configure(variant, &config.oversampling).await {
        error!("Primary sensor configuration failed: {}", fault);
        *flags |= CycleErrorFlags::SENSOR_INIT_FAILED;
        return Measurement::default();
    }

    match trigger_and_read(primary, delay, config.settle_ms).await {
        Ok(readout) => {
            info!(
                "Primary sensor: temperature {:?}, pressure {:?}, humidity {:?}",
                readout.temperature, readout.pressure, readout.humidity
            );
            readout.into()
        }
        Err(fault) => {
            error!("Primary sensor measurement failed: {}", fault);
            *flags |= CycleErrorFlags::SENSOR_READ_FAILED;
            Measurement::default()
        }
    }
}
