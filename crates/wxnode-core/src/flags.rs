//! Per-cycle fault flags

use bitflags::bitflags;

bitflags! {
    /// Faults accumulated during a single wake cycle.
    ///
    /// Flags are additive: several failures in one cycle are all recorded.
    /// The numeric value is part of the external contract (it is persisted,
    /// submitted as `error=` and blinked on the fault indicator), so the bit
    /// values must never change.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CycleErrorFlags: u8 {
        /// Battery below cutoff; sensor and network work were skipped.
        const LOW_BATTERY = 1;
        /// Primary sensor did not respond after the bounded bring-up.
        const SENSOR_INIT_FAILED = 2;
        /// Wireless association did not succeed within the bound.
        const WIFI_FAILED = 4;
        /// Sensor came up but no measurement could be obtained.
        const SENSOR_READ_FAILED = 8;
        /// Both the primary and the fallback submission failed.
        const UPLOAD_FAILED = 16;
    }
}

impl CycleErrorFlags {
    /// Integer form used in the persisted record and the uplink payload.
    pub const fn to_wire_value(self) -> i32 {
        self.bits() as i32
    }

    /// Rebuild the flag set from a persisted error code.
    ///
    /// Bits outside the known flags are retained so a corrupted code can
    /// still be reported verbatim.
    pub const fn from_wire_value(value: i32) -> Self {
        Self::from_bits_retain(value as u8)
    }

    /// Number of fault indicator pulses for this flag set.
    ///
    /// This is the numeric code, not the number of set flags: a lone
    /// `UPLOAD_FAILED` pulses sixteen times.
    pub const fn blink_count(self) -> u32 {
        self.bits() as u32
    }
}
