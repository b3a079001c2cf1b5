use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{debug, error};
use sht4x::Sht4xAsync;

use super::{ClimateSample, SecondarySensor, SensorFault};

const SENSOR: &str = "SHT40";

/// SHT40 temperature/humidity sensor on the shared bus.
///
/// The device has no identity register; a valid serial number read counts as
/// present.
pub struct SHT40Sensor<I, D> {
    sensor: Sht4xAsync<I, D>,
    delay: D,
}

impl<I: I2c, D: DelayNs> SHT40Sensor<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        Self {
            sensor: Sht4xAsync::<I, D>::new(i2c),
            delay,
        }
    }
}

impl<I: I2c, D: DelayNs> SecondarySensor for SHT40Sensor<I, D> {
    async fn is_present(&mut self) -> bool {
        match self.sensor.serial_number(&mut self.delay).await {
            Ok(serial) => {
                debug!("SHT40 serial number 0x{:08X}", serial);
                true
            }
            Err(e) => {
                debug!("SHT40 did not answer: {:?}", e);
                false
            }
        }
    }

    async fn read(&mut self) -> Result<ClimateSample, SensorFault> {
        let measurement = self
            .sensor
            .measure(sht4x::Precision::High, &mut self.delay)
            .await
            .map_err(|e| {
                error!("SHT40 measurement failed: {:?}", e);
                SensorFault::NoResponse {
                    sensor: SENSOR,
                    operation: "measure temperature/humidity",
                }
            })?;

        Ok(ClimateSample {
            temperature: measurement.temperature_celsius().to_num::<f32>(),
            humidity: measurement.humidity_percent().to_num::<f32>(),
        })
    }
}
