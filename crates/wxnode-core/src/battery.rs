//! Battery gate
//!
//! A single raw ADC sample decides whether this cycle has enough charge to
//! power the sensors and the radio.

use log::{info, warn};

/// Source of raw battery level samples (board ADC).
pub trait BatteryMonitor {
    /// Take one raw sample of the battery level.
    fn sample(&mut self) -> impl Future<Output = u16>;
}

/// Outcome of the battery check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryStatus {
    Acceptable { raw: u16 },
    Low { raw: u16 },
}

impl BatteryStatus {
    pub const fn raw(self) -> u16 {
        match self {
            Self::Acceptable { raw } | Self::Low { raw } => raw,
        }
    }

    pub const fn is_acceptable(self) -> bool {
        matches!(self, Self::Acceptable { .. })
    }
}

/// `true` when `raw` is at or above `cutoff`.
///
/// The boundary value itself passes; anything below fails.
pub const fn is_acceptable(raw: u16, cutoff: u16) -> bool {
    raw >= cutoff
}

/// Sample the battery once and classify it against `cutoff`.
pub async fn check<B: BatteryMonitor>(monitor: &mut B, cutoff: u16) -> BatteryStatus {
    let raw = monitor.sample().await;

    if is_acceptable(raw, cutoff) {
        info!("Battery level {} (cutoff {})", raw, cutoff);
        BatteryStatus::Acceptable { raw }
    } else {
        warn!("Battery level {} below cutoff {}, skipping measurement", raw, cutoff);
        BatteryStatus::Low { raw }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedBattery;
    use embassy_futures::block_on;

    #[test]
    fn test_boundary_value_passes() {
        // The cutoff itself is acceptable; one below is not.
        assert!(is_acceptable(300, 300));
        assert!(!is_acceptable(299, 300));
    }

    #[test]
    fn test_gate_over_range() {
        for raw in 0..=1024u16 {
            assert_eq!(is_acceptable(raw, 300), raw >= 300, "raw = {}", raw);
        }
        assert!(is_acceptable(0, 0));
        assert!(is_acceptable(u16::MAX, u16::MAX));
    }

    #[test]
    fn test_check_samples_once() {
        let mut battery = FixedBattery::new(250);

        let status = block_on(check(&mut battery, 300));

        assert_eq!(status, BatteryStatus::Low { raw: 250 });
        assert!(!status.is_acceptable());
        assert_eq!(battery.samples, 1);
    }

    #[test]
    fn test_check_acceptable() {
        let mut battery = FixedBattery::new(400);

        let status = block_on(check(&mut battery, 300));

        assert!(status.is_acceptable());
        assert_eq!(status.raw(), 400);
    }
}
