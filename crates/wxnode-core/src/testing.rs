//! Test doubles shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::string::{String, ToString};
use std::vec::Vec;

use embedded_hal::digital::{self, ErrorType as PinErrorType, InputPin, OutputPin};
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{ErrorType as I2cErrorType, I2c, Operation};

use crate::battery::BatteryMonitor;
use crate::config::Credentials;
use crate::run_store::{SCRATCH_BUCKETS, ScratchMemory};
#[cfg(feature = "sensor-bme280")]
use crate::sensors::bme280::Calibration;
use crate::sensors::{
    ClimateSample, DeviceVariant, OversamplingProfile, PrimaryReadout, PrimarySensor,
    SecondarySensor, SensorFault,
};
use crate::uplink::{HttpTransport, TransportError, UplinkError, WifiLink};

/// Scratch region that logs every write as `(bucket, len)`.
pub struct CountingScratch {
    pub region: [u32; SCRATCH_BUCKETS],
    pub writes: Vec<(usize, usize)>,
}

impl Default for CountingScratch {
    fn default() -> Self {
        Self {
            region: [0; SCRATCH_BUCKETS],
            writes: Vec::new(),
        }
    }
}

impl ScratchMemory for CountingScratch {
    fn read_buckets(&self, bucket: usize, out: &mut [u32]) {
        self.region.read_buckets(bucket, out);
    }

    fn write_buckets(&mut self, bucket: usize, data: &[u32]) {
        self.writes.push((bucket, data.len()));
        self.region.write_buckets(bucket, data);
    }
}

pub struct FixedBattery {
    raw: u16,
    pub samples: usize,
}

impl FixedBattery {
    pub fn new(raw: u16) -> Self {
        Self { raw, samples: 0 }
    }
}

impl BatteryMonitor for FixedBattery {
    async fn sample(&mut self) -> u16 {
        self.samples += 1;
        self.raw
    }
}

/// Delay that returns immediately and remembers what was asked for.
#[derive(Default)]
pub struct RecordingDelay {
    pub delays_ms: Vec<u32>,
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.delays_ms.push(ns / 1_000_000);
    }

    async fn delay_us(&mut self, us: u32) {
        self.delays_ms.push(us / 1_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.delays_ms.push(ms);
    }
}

pub struct FixedPin(pub bool);

impl PinErrorType for FixedPin {
    type Error = core::convert::Infallible;
}

impl InputPin for FixedPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0)
    }
}

/// Input pin whose every read fails.
pub struct BrokenPin;

impl PinErrorType for BrokenPin {
    type Error = digital::ErrorKind;
}

impl InputPin for BrokenPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Err(digital::ErrorKind::Other)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Err(digital::ErrorKind::Other)
    }
}

/// Output pin logging every level it is driven to.
#[derive(Default)]
pub struct RecordingPin {
    pub levels: Vec<bool>,
}

impl RecordingPin {
    /// Number of low-to-high transitions, starting from low.
    pub fn pulses(&self) -> usize {
        let mut previous = false;
        let mut pulses = 0;
        for &level in &self.levels {
            if level && !previous {
                pulses += 1;
            }
            previous = level;
        }
        pulses
    }
}

impl PinErrorType for RecordingPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for RecordingPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.levels.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.levels.push(true);
        Ok(())
    }
}

pub struct ScriptedPrimary {
    /// Probes that fail before the device answers; `None` never answers
    failures_before_answer: Option<usize>,
    pub variant: DeviceVariant,
    pub busy: bool,
    pub readout: PrimaryReadout,
    pub configured: Option<DeviceVariant>,
    pub probes: usize,
    pub triggers: usize,
    pub reads: usize,
}

impl ScriptedPrimary {
    pub fn failing_probes(failures: usize) -> Self {
        Self {
            failures_before_answer: Some(failures),
            variant: DeviceVariant::Bme280,
            busy: false,
            readout: PrimaryReadout {
                temperature: Ok(21.5),
                pressure: Ok(1013.25),
                humidity: Ok(48.0),
            },
            configured: None,
            probes: 0,
            triggers: 0,
            reads: 0,
        }
    }

    pub fn healthy() -> Self {
        Self::failing_probes(0)
    }

    pub fn dead() -> Self {
        Self {
            failures_before_answer: None,
            ..Self::healthy()
        }
    }
}

impl PrimarySensor for ScriptedPrimary {
    async fn probe(&mut self) -> Result<DeviceVariant, SensorFault> {
        self.probes += 1;
        match self.failures_before_answer {
            Some(failures) if self.probes > failures => Ok(self.variant),
            _ => Err(SensorFault::NoResponse {
                sensor: "scripted",
                operation: "probe",
            }),
        }
    }

    async fn configure(
        &mut self,
        variant: DeviceVariant,
        _profile: &OversamplingProfile,
    ) -> Result<(), SensorFault> {
        self.configured = Some(variant);
        Ok(())
    }

    async fn trigger(&mut self) -> Result<(), SensorFault> {
        self.triggers += 1;
        if self.busy {
            Err(SensorFault::Busy { sensor: "scripted" })
        } else {
            Ok(())
        }
    }

    async fn read(&mut self) -> PrimaryReadout {
        self.reads += 1;
        self.readout
    }
}

pub struct ScriptedSecondary {
    sample: Option<ClimateSample>,
    pub reads: usize,
}

impl ScriptedSecondary {
    pub fn present(temperature: f32, humidity: f32) -> Self {
        Self {
            sample: Some(ClimateSample {
                temperature,
                humidity,
            }),
            reads: 0,
        }
    }

    pub fn absent() -> Self {
        Self {
            sample: None,
            reads: 0,
        }
    }
}

impl SecondarySensor for ScriptedSecondary {
    async fn is_present(&mut self) -> bool {
        self.sample.is_some()
    }

    async fn read(&mut self) -> Result<ClimateSample, SensorFault> {
        self.reads += 1;
        self.sample.ok_or(SensorFault::NoResponse {
            sensor: "scripted",
            operation: "read",
        })
    }
}

pub struct ScriptedWifi {
    /// Status polls answered "not connected" first; `None` never connects
    polls_before_connect: Option<usize>,
    ssid: Option<&'static str>,
    pub begins: usize,
    pub begun_with: usize,
    pub polls: usize,
}

impl ScriptedWifi {
    pub fn connects_after(polls: usize) -> Self {
        Self {
            polls_before_connect: Some(polls),
            ssid: None,
            begins: 0,
            begun_with: 0,
            polls: 0,
        }
    }

    pub fn never_connects() -> Self {
        Self {
            polls_before_connect: None,
            ..Self::connects_after(0)
        }
    }
}

impl WifiLink for ScriptedWifi {
    async fn begin(&mut self, networks: &[Credentials<'_>]) -> Result<(), UplinkError> {
        self.begins += 1;
        self.begun_with = networks.len();
        Ok(())
    }

    async fn is_connected(&mut self) -> bool {
        self.polls += 1;
        let connected = matches!(self.polls_before_connect, Some(n) if self.polls > n);
        if connected {
            self.ssid = Some("field-ap");
        }
        connected
    }

    fn network_name(&self) -> Option<&str> {
        self.ssid
    }
}

/// HTTP transport answering from a script; an exhausted script refuses
/// connections.
pub struct ScriptedHttp {
    responses: VecDeque<Result<u16, TransportError>>,
    pub requests: Vec<String>,
}

impl ScriptedHttp {
    pub fn answering(responses: &[Result<u16, TransportError>]) -> Self {
        Self {
            responses: responses.iter().copied().collect(),
            requests: Vec::new(),
        }
    }
}

impl HttpTransport for ScriptedHttp {
    async fn get(&mut self, url: &str) -> Result<u16, TransportError> {
        self.requests.push(url.to_string());
        self.responses
            .pop_front()
            .unwrap_or(Err(TransportError::Connect))
    }
}

#[cfg(feature = "sensor-bme280")]
/// Trimming values and raw readings of the Bosch datasheet worked example,
/// extended with a humidity calibration.
pub fn datasheet_calibration() -> Calibration {
    Calibration {
        t1: 27504,
        t2: 26435,
        t3: -1000,
        p1: 36477,
        p2: -10685,
        p3: 3024,
        p4: 2855,
        p5: 140,
        p6: -7,
        p7: 15500,
        p8: -14600,
        p9: 6000,
        h1: 75,
        h2: 362,
        h3: 0,
        h4: 313,
        h5: 50,
        h6: 30,
    }
}

#[cfg(feature = "sensor-bme280")]
pub const DATASHEET_ADC_T: u32 = 519888;
#[cfg(feature = "sensor-bme280")]
pub const DATASHEET_ADC_P: u32 = 415148;
#[cfg(feature = "sensor-bme280")]
pub const DATASHEET_ADC_H: u32 = 30000;

#[cfg(feature = "sensor-bme280")]
/// Register-map model of a BME280/BMP280 on an I2C bus.
///
/// Writes are `(register, value)` pairs; reads auto-increment from the last
/// register pointer. Measurements complete instantly.
pub struct FakeBmeBus {
    pub registers: [u8; 256],
    pub present: bool,
    pub writes: Vec<(u8, u8)>,
    pointer: u8,
}

#[cfg(feature = "sensor-bme280")]
impl FakeBmeBus {
    pub fn new(chip_id: u8) -> Self {
        let mut registers = [0u8; 256];
        registers[0xD0] = chip_id;

        let c = datasheet_calibration();
        let mut tp = Vec::new();
        tp.extend_from_slice(&c.t1.to_le_bytes());
        for word in [c.t2, c.t3] {
            tp.extend_from_slice(&word.to_le_bytes());
        }
        tp.extend_from_slice(&c.p1.to_le_bytes());
        for word in [c.p2, c.p3, c.p4, c.p5, c.p6, c.p7, c.p8, c.p9] {
            tp.extend_from_slice(&word.to_le_bytes());
        }
        registers[0x88..0x88 + tp.len()].copy_from_slice(&tp);
        registers[0xA1] = c.h1;

        let h2 = c.h2.to_le_bytes();
        registers[0xE1] = h2[0];
        registers[0xE2] = h2[1];
        registers[0xE3] = c.h3;
        registers[0xE4] = (c.h4 >> 4) as u8;
        registers[0xE5] = ((c.h4 & 0x0F) | ((c.h5 & 0x0F) << 4)) as u8;
        registers[0xE6] = (c.h5 >> 4) as u8;
        registers[0xE7] = c.h6 as u8;

        let mut bus = Self {
            registers,
            present: true,
            writes: Vec::new(),
            pointer: 0,
        };
        bus.set_pressure_adc(DATASHEET_ADC_P);
        bus.set_temperature_adc(DATASHEET_ADC_T);
        bus.set_humidity_adc(DATASHEET_ADC_H);
        bus
    }

    fn set_20bit(&mut self, register: usize, adc: u32) {
        self.registers[register] = (adc >> 12) as u8;
        self.registers[register + 1] = (adc >> 4) as u8;
        self.registers[register + 2] = ((adc & 0x0F) << 4) as u8;
    }

    pub fn set_pressure_adc(&mut self, adc: u32) {
        self.set_20bit(0xF7, adc);
    }

    pub fn set_temperature_adc(&mut self, adc: u32) {
        self.set_20bit(0xFA, adc);
    }

    pub fn set_humidity_adc(&mut self, adc: u32) {
        self.registers[0xFD] = (adc >> 8) as u8;
        self.registers[0xFE] = adc as u8;
    }

    pub fn written_registers(&self) -> Vec<u8> {
        self.writes.iter().map(|&(register, _)| register).collect()
    }
}

#[cfg(feature = "sensor-bme280")]
impl I2cErrorType for FakeBmeBus {
    type Error = ErrorKind;
}

#[cfg(feature = "sensor-bme280")]
impl I2c for FakeBmeBus {
    async fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if !self.present {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }

        for operation in operations {
            match operation {
                Operation::Write(bytes) => match &bytes[..] {
                    [register] => self.pointer = *register,
                    pairs => {
                        for pair in pairs.chunks(2) {
                            if let [register, value] = pair {
                                self.writes.push((*register, *value));
                                // Soft reset reloads the NVM, which the model never loses.
                                if *register != 0xE0 {
                                    self.registers[*register as usize] = *value;
                                }
                            }
                        }
                    }
                },
                Operation::Read(buf) => {
                    for byte in buf.iter_mut() {
                        *byte = self.registers[self.pointer as usize];
                        self.pointer = self.pointer.wrapping_add(1);
                    }
                }
            }
        }
        Ok(())
    }
}
