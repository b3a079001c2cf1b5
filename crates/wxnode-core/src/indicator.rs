//! Fault indicator LED

use embedded_hal::digital::{Error as _, OutputPin};
use embedded_hal_async::delay::DelayNs;
use log::{info, warn};

/// Period of the toggle shown when a cycle never reaches sleep.
pub const STALL_HALF_PERIOD_MS: u32 = 2000;

/// Pulse the indicator `count` times: on for `half_period_ms`, then off for
/// `half_period_ms`. The pin is left low.
pub async fn blink<P: OutputPin, D: DelayNs>(
    pin: &mut P,
    delay: &mut D,
    count: u32,
    half_period_ms: u32,
) {
    if count == 0 {
        return;
    }

    info!("Blinking fault code {}", count);
    for _ in 0..count {
        drive(pin, true);
        delay.delay_ms(half_period_ms).await;
        drive(pin, false);
        delay.delay_ms(half_period_ms).await;
    }
}

/// Toggle the indicator slowly forever.
pub async fn stall<P: OutputPin, D: DelayNs>(pin: &mut P, delay: &mut D) -> ! {
    warn!("Cycle stalled, toggling indicator");
    let mut level = false;
    loop {
        level = !level;
        drive(pin, level);
        delay.delay_ms(STALL_HALF_PERIOD_MS).await;
    }
}

fn drive<P: OutputPin>(pin: &mut P, high: bool) {
    let result = if high { pin.set_high() } else { pin.set_low() };
    if let Err(e) = result {
        warn!("Indicator pin write failed: {:?}", e.kind());
    }
}
