//! BME280 / BMP280 driver
//!
//! Register-level driver for the Bosch environmental sensors, used in forced
//! mode: one measurement per trigger, then the device returns to sleep.
//!
//! Notes (datasheet summary):
//! - I2C address 0x76 (SDO low) or 0x77 (SDO high).
//! - Chip id register 0xD0: 0x60 for BME280, 0x58 for BMP280.
//! - Soft reset: write 0xB6 to 0xE0, wait 2 ms for the NVM copy.
//! - Calibration words at 0x88..=0xA1, humidity calibration at 0xE1..=0xE7.
//! - `ctrl_hum` only takes effect after the next `ctrl_meas` write.
//! - Burst read from 0xF7: pressure (20 bit), temperature (20 bit),
//!   humidity (16 bit, BME280 only). Skipped channels read 0x80000 / 0x8000.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{debug, error, warn};

use super::{DeviceVariant, OversamplingProfile, PrimaryReadout, PrimarySensor, SensorFault};

pub const ADDRESS_PRIMARY: u8 = 0x76;
pub const ADDRESS_SECONDARY: u8 = 0x77;

const SENSOR: &str = "BME280";

mod reg {
    pub const CALIB_TP: u8 = 0x88;
    pub const CHIP_ID: u8 = 0xD0;
    pub const RESET: u8 = 0xE0;
    pub const CALIB_H: u8 = 0xE1;
    pub const CTRL_HUM: u8 = 0xF2;
    pub const STATUS: u8 = 0xF3;
    pub const CTRL_MEAS: u8 = 0xF4;
    pub const CONFIG: u8 = 0xF5;
    pub const DATA: u8 = 0xF7;
}

pub const CHIP_ID_BME280: u8 = 0x60;
pub const CHIP_ID_BMP280: u8 = 0x58;

const RESET_COMMAND: u8 = 0xB6;
const RESET_DELAY_MS: u32 = 2;
const STATUS_MEASURING: u8 = 1 << 3;
const MODE_FORCED: u8 = 0b01;
const SKIPPED_20BIT: u32 = 0x80000;
const SKIPPED_16BIT: u32 = 0x8000;

const CALIB_TP_LEN: usize = 26;
const CALIB_H_LEN: usize = 7;

/// Factory trimming values read from the device NVM.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
    pub h1: u8,
    pub h2: i16,
    pub h3: u8,
    pub h4: i16,
    pub h5: i16,
    pub h6: i8,
}

impl Calibration {
    /// Parse the temperature/pressure block (0x88..=0xA1).
    pub fn from_tp_bytes(bytes: &[u8; CALIB_TP_LEN]) -> Self {
        let u = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let s = |i: usize| i16::from_le_bytes([bytes[i], bytes[i + 1]]);

        Self {
            t1: u(0),
            t2: s(2),
            t3: s(4),
            p1: u(6),
            p2: s(8),
            p3: s(10),
            p4: s(12),
            p5: s(14),
            p6: s(16),
            p7: s(18),
            p8: s(20),
            p9: s(22),
            h1: bytes[25],
            ..Self::default()
        }
    }

    /// Merge in the humidity block (0xE1..=0xE7).
    ///
    /// H4 and H5 are 12-bit values sharing the nibbles of 0xE5.
    pub fn with_humidity_bytes(mut self, bytes: &[u8; CALIB_H_LEN]) -> Self {
        self.h2 = i16::from_le_bytes([bytes[0], bytes[1]]);
        self.h3 = bytes[2];
        self.h4 = ((bytes[3] as i8 as i16) << 4) | (bytes[4] & 0x0F) as i16;
        self.h5 = ((bytes[5] as i8 as i16) << 4) | (bytes[4] >> 4) as i16;
        self.h6 = bytes[6] as i8;
        self
    }

    /// Returns `(t_fine, degrees Celsius)`.
    pub fn compensate_temperature(&self, adc_t: u32) -> (f64, f64) {
        let adc_t = adc_t as f64;
        let t1 = self.t1 as f64;
        let var1 = (adc_t / 16384.0 - t1 / 1024.0) * self.t2 as f64;
        let delta = adc_t / 131072.0 - t1 / 8192.0;
        let var2 = delta * delta * self.t3 as f64;
        let t_fine = var1 + var2;
        (t_fine, t_fine / 5120.0)
    }

    /// Pressure in Pascal, `None` when the calibration would divide by zero.
    pub fn compensate_pressure(&self, adc_p: u32, t_fine: f64) -> Option<f64> {
        let mut var1 = t_fine / 2.0 - 64000.0;
        let mut var2 = var1 * var1 * self.p6 as f64 / 32768.0;
        var2 += var1 * self.p5 as f64 * 2.0;
        var2 = var2 / 4.0 + self.p4 as f64 * 65536.0;
        var1 = (self.p3 as f64 * var1 * var1 / 524288.0 + self.p2 as f64 * var1) / 524288.0;
        var1 = (1.0 + var1 / 32768.0) * self.p1 as f64;
        if var1 == 0.0 {
            return None;
        }

        let mut p = 1048576.0 - adc_p as f64;
        p = (p - var2 / 4096.0) * 6250.0 / var1;
        let var1 = self.p9 as f64 * p * p / 2147483648.0;
        let var2 = p * self.p8 as f64 / 32768.0;
        Some(p + (var1 + var2 + self.p7 as f64) / 16.0)
    }

    /// Relative humidity in percent, clamped to 0..=100.
    pub fn compensate_humidity(&self, adc_h: u32, t_fine: f64) -> f64 {
        let var = t_fine - 76800.0;
        let offset = adc_h as f64 - (self.h4 as f64 * 64.0 + self.h5 as f64 / 16384.0 * var);
        let scale = self.h2 as f64 / 65536.0
            * (1.0 + self.h6 as f64 / 67108864.0 * var * (1.0 + self.h3 as f64 / 67108864.0 * var));
        let mut h = offset * scale;
        h *= 1.0 - self.h1 as f64 * h / 524288.0;
        h.clamp(0.0, 100.0)
    }
}

pub struct Bme280<I, D> {
    i2c: I,
    delay: D,
    address: u8,
    variant: Option<DeviceVariant>,
    calibration: Calibration,
    ctrl_meas: u8,
}

impl<I: I2c, D: DelayNs> Bme280<I, D> {
    pub fn new(i2c: I, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
            variant: None,
            calibration: Calibration::default(),
            ctrl_meas: 0,
        }
    }

    /// Variant found by the last successful probe.
    pub fn variant(&self) -> Option<DeviceVariant> {
        self.variant
    }

    async fn read_register(
        &mut self,
        register: u8,
        operation: &'static str,
    ) -> Result<u8, SensorFault> {
        let mut value = [0u8; 1];
        self.read_block(register, &mut value, operation).await?;
        Ok(value[0])
    }

    async fn read_block(
        &mut self,
        register: u8,
        buf: &mut [u8],
        operation: &'static str,
    ) -> Result<(), SensorFault> {
        self.i2c
            .write_read(self.address, &[register], buf)
            .await
            .map_err(|e| {
                error!("BME280 read of 0x{:02X} failed: {:?}", register, e);
                SensorFault::NoResponse {
                    sensor: SENSOR,
                    operation,
                }
            })
    }

    async fn write_register(
        &mut self,
        register: u8,
        value: u8,
        operation: &'static str,
    ) -> Result<(), SensorFault> {
        self.i2c
            .write(self.address, &[register, value])
            .await
            .map_err(|e| {
                error!("BME280 write of 0x{:02X} failed: {:?}", register, e);
                SensorFault::NoResponse {
                    sensor: SENSOR,
                    operation,
                }
            })
    }

    async fn read_calibration(
        &mut self,
        variant: DeviceVariant,
    ) -> Result<Calibration, SensorFault> {
        let mut tp = [0u8; CALIB_TP_LEN];
        self.read_block(reg::CALIB_TP, &mut tp, "read calibration").await?;
        let calibration = Calibration::from_tp_bytes(&tp);

        if !variant.has_humidity() {
            return Ok(calibration);
        }

        let mut h = [0u8; CALIB_H_LEN];
        self.read_block(reg::CALIB_H, &mut h, "read humidity calibration").await?;
        Ok(calibration.with_humidity_bytes(&h))
    }
}

fn decode_20bit(bytes: &[u8]) -> u32 {
    ((bytes[0] as u32) << 12) | ((bytes[1] as u32) << 4) | ((bytes[2] as u32) >> 4)
}

impl<I: I2c, D: DelayNs> PrimarySensor for Bme280<I, D> {
    async fn probe(&mut self) -> Result<DeviceVariant, SensorFault> {
        let chip_id = self.read_register(reg::CHIP_ID, "read chip id").await?;
        let variant = match chip_id {
            CHIP_ID_BME280 => DeviceVariant::Bme280,
            CHIP_ID_BMP280 => DeviceVariant::Bmp280,
            other => {
                return Err(SensorFault::UnsupportedChip {
                    sensor: SENSOR,
                    chip_id: other,
                });
            }
        };

        self.write_register(reg::RESET, RESET_COMMAND, "soft reset").await?;
        self.delay.delay_ms(RESET_DELAY_MS).await;

        self.calibration = self.read_calibration(variant).await?;
        self.variant = Some(variant);
        debug!("BME280 calibration: {:?}", self.calibration);
        Ok(variant)
    }

    async fn configure(
        &mut self,
        variant: DeviceVariant,
        profile: &OversamplingProfile,
    ) -> Result<(), SensorFault> {
        if variant.has_humidity() {
            self.write_register(reg::CTRL_HUM, profile.humidity.bits(), "configure humidity")
                .await?;
        }
        // Filter off, standby time is irrelevant in forced mode.
        self.write_register(reg::CONFIG, 0x00, "configure filter").await?;

        self.ctrl_meas = (profile.temperature.bits() << 5) | (profile.pressure.bits() << 2);
        self.write_register(reg::CTRL_MEAS, self.ctrl_meas, "configure oversampling").await
    }

    async fn trigger(&mut self) -> Result<(), SensorFault> {
        if self.variant.is_none() {
            return Err(SensorFault::NotInitialized);
        }

        let status = self.read_register(reg::STATUS, "read status").await?;
        if status & STATUS_MEASURING != 0 {
            return Err(SensorFault::Busy { sensor: SENSOR });
        }

        self.write_register(reg::CTRL_MEAS, self.ctrl_meas | MODE_FORCED, "trigger").await
    }

    async fn read(&mut self) -> PrimaryReadout {
        let Some(variant) = self.variant else {
            return PrimaryReadout::all(Err(SensorFault::NotInitialized));
        };

        match self.read_register(reg::STATUS, "read status").await {
            Ok(status) if status & STATUS_MEASURING != 0 => {
                warn!("BME280 still measuring after settle delay");
                return PrimaryReadout::all(Err(SensorFault::NotReady { sensor: SENSOR }));
            }
            Ok(_) => {}
            Err(fault) => return PrimaryReadout::all(Err(fault)),
        }

        let mut data = [0u8; 8];
        let len = if variant.has_humidity() { 8 } else { 6 };
        if let Err(fault) = self.read_block(reg::DATA, &mut data[..len], "read data").await {
            return PrimaryReadout::all(Err(fault));
        }

        let adc_p = decode_20bit(&data[0..3]);
        let adc_t = decode_20bit(&data[3..6]);
        let adc_h = ((data[6] as u32) << 8) | data[7] as u32;

        let not_ready = Err(SensorFault::NotReady { sensor: SENSOR });
        if adc_t == SKIPPED_20BIT {
            // Pressure and humidity compensation both need t_fine.
            return PrimaryReadout::all(not_ready);
        }

        let (t_fine, celsius) = self.calibration.compensate_temperature(adc_t);

        let pressure = if adc_p == SKIPPED_20BIT {
            not_ready
        } else {
            self.calibration
                .compensate_pressure(adc_p, t_fine)
                .map(|pa| (pa / 100.0) as f32)
                .ok_or(SensorFault::NotReady { sensor: SENSOR })
        };

        let humidity = if !variant.has_humidity() {
            Err(SensorFault::Unsupported {
                sensor: SENSOR,
                channel: "humidity",
            })
        } else if adc_h == SKIPPED_16BIT {
            not_ready
        } else {
            Ok(self.calibration.compensate_humidity(adc_h, t_fine) as f32)
        };

        PrimaryReadout {
            temperature: Ok(celsius as f32),
            pressure,
            humidity,
        }
    }
}

impl PrimaryReadout {
    fn all(value: Result<f32, SensorFault>) -> Self {
        Self {
            temperature: value,
            pressure: value,
            humidity: value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::Oversampling;
    use crate::testing::{FakeBmeBus, RecordingDelay, datasheet_calibration};
    use embassy_futures::block_on;

    fn sensor(bus: FakeBmeBus) -> Bme280<FakeBmeBus, RecordingDelay> {
        Bme280::new(bus, RecordingDelay::default(), ADDRESS_PRIMARY)
    }

    #[test]
    fn test_datasheet_temperature_and_pressure() {
        let calibration = datasheet_calibration();

        let (t_fine, celsius) = calibration.compensate_temperature(519888);
        let pascal = calibration.compensate_pressure(415148, t_fine).unwrap();

        assert!((celsius - 25.08).abs() < 0.01, "celsius = {}", celsius);
        assert!((pascal - 100653.27).abs() < 0.1, "pascal = {}", pascal);
    }

    #[test]
    fn test_humidity_compensation() {
        let calibration = datasheet_calibration();
        let (t_fine, _) = calibration.compensate_temperature(519888);

        let humidity = calibration.compensate_humidity(30000, t_fine);

        assert!((humidity - 55.0).abs() < 0.01, "humidity = {}", humidity);
    }

    #[test]
    fn test_humidity_nibble_unpacking() {
        let calibration = Calibration::default()
            .with_humidity_bytes(&[0x6A, 0x01, 0x00, 0x13, 0x29, 0x03, 0x1E]);

        assert_eq!(calibration.h2, 362);
        assert_eq!(calibration.h4, 313);
        assert_eq!(calibration.h5, 50);
        assert_eq!(calibration.h6, 30);
    }

    #[test]
    fn test_probe_identifies_variant() {
        let mut bme = sensor(FakeBmeBus::new(CHIP_ID_BME280));
        assert_eq!(block_on(bme.probe()), Ok(DeviceVariant::Bme280));

        let mut bmp = sensor(FakeBmeBus::new(CHIP_ID_BMP280));
        assert_eq!(block_on(bmp.probe()), Ok(DeviceVariant::Bmp280));
    }

    #[test]
    fn test_probe_rejects_unknown_chip() {
        let mut unknown = sensor(FakeBmeBus::new(0x55));
        assert_eq!(
            block_on(unknown.probe()),
            Err(SensorFault::UnsupportedChip {
                sensor: SENSOR,
                chip_id: 0x55
            })
        );
    }

    #[test]
    fn test_probe_without_device() {
        let mut bus = FakeBmeBus::new(CHIP_ID_BME280);
        bus.present = false;
        let mut absent = sensor(bus);

        assert!(matches!(
            block_on(absent.probe()),
            Err(SensorFault::NoResponse { .. })
        ));
    }

    #[test]
    fn test_bmp280_never_touches_humidity_control() {
        let mut bmp = sensor(FakeBmeBus::new(CHIP_ID_BMP280));
        block_on(bmp.probe()).unwrap();
        block_on(bmp.configure(DeviceVariant::Bmp280, &OversamplingProfile::default())).unwrap();

        assert!(!bmp.i2c.written_registers().contains(&reg::CTRL_HUM));
        assert_eq!(bmp.i2c.registers[reg::CTRL_MEAS as usize], 0b001_001_00);
    }

    #[test]
    fn test_configure_writes_oversampling() {
        let profile = OversamplingProfile {
            temperature: Oversampling::X2,
            pressure: Oversampling::X16,
            humidity: Oversampling::X4,
        };
        let mut bme = sensor(FakeBmeBus::new(CHIP_ID_BME280));
        block_on(bme.probe()).unwrap();
        block_on(bme.configure(DeviceVariant::Bme280, &profile)).unwrap();

        assert_eq!(bme.i2c.registers[reg::CTRL_HUM as usize], 0b011);
        assert_eq!(bme.i2c.registers[reg::CTRL_MEAS as usize], 0b010_101_00);
    }

    #[test]
    fn test_forced_measurement_round() {
        let mut bme = sensor(FakeBmeBus::new(CHIP_ID_BME280));
        block_on(bme.probe()).unwrap();
        block_on(bme.configure(DeviceVariant::Bme280, &OversamplingProfile::default())).unwrap();

        block_on(bme.trigger()).unwrap();
        assert_eq!(bme.i2c.registers[reg::CTRL_MEAS as usize] & 0b11, MODE_FORCED);

        let readout = block_on(bme.read());
        let celsius = readout.temperature.unwrap();
        let hpa = readout.pressure.unwrap();
        let humidity = readout.humidity.unwrap();

        assert!((celsius - 25.08).abs() < 0.01);
        assert!((hpa - 1006.53).abs() < 0.01);
        assert!((humidity - 55.0).abs() < 0.01);
    }

    #[test]
    fn test_trigger_rejected_while_measuring() {
        let mut bme = sensor(FakeBmeBus::new(CHIP_ID_BME280));
        block_on(bme.probe()).unwrap();
        bme.i2c.registers[reg::STATUS as usize] = STATUS_MEASURING;

        assert_eq!(
            block_on(bme.trigger()),
            Err(SensorFault::Busy { sensor: SENSOR })
        );
    }

    #[test]
    fn test_trigger_before_probe() {
        let mut bme = sensor(FakeBmeBus::new(CHIP_ID_BME280));
        assert_eq!(block_on(bme.trigger()), Err(SensorFault::NotInitialized));
    }

    #[test]
    fn test_skipped_humidity_reads_not_ready() {
        let mut bus = FakeBmeBus::new(CHIP_ID_BME280);
        bus.set_humidity_adc(0x8000);
        let mut bme = sensor(bus);
        block_on(bme.probe()).unwrap();

        let readout = block_on(bme.read());

        assert!(readout.temperature.is_ok());
        assert_eq!(
            readout.humidity,
            Err(SensorFault::NotReady { sensor: SENSOR })
        );
    }

    #[test]
    fn test_bmp280_humidity_unsupported() {
        let mut bmp = sensor(FakeBmeBus::new(CHIP_ID_BMP280));
        block_on(bmp.probe()).unwrap();

        let readout = block_on(bmp.read());

        assert!(readout.pressure.is_ok());
        assert!(matches!(
            readout.humidity,
            Err(SensorFault::Unsupported { .. })
        ));
    }
}
