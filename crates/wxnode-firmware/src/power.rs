//! Boot kind detection and deep sleep

use esp_hal::peripherals::LPWR;
use esp_hal::rtc_cntl::sleep::TimerWakeupSource;
use esp_hal::rtc_cntl::{Rtc, SocResetReason, reset_reason, wakeup_cause};
use esp_hal::system::Cpu;
use log::{debug, info};
use wxnode_core::{BootKind, SleepDirective};

/// Whether this run follows a deep-sleep wake or a power-on/reset.
pub fn boot_kind() -> BootKind {
    let reason = reset_reason(Cpu::ProCpu);
    debug!("Reset reason {:?}, wakeup cause {:?}", reason, wakeup_cause());

    match reason {
        Some(SocResetReason::CoreDeepSleep) => BootKind::Wake,
        _ => BootKind::Cold,
    }
}

/// Enter deep sleep with a timer wakeup. Execution restarts from reset.
pub fn deep_sleep(lpwr: LPWR<'static>, directive: SleepDirective) -> ! {
    let mut rtc = Rtc::new(lpwr);
    let timer = TimerWakeupSource::new(core::time::Duration::from_millis(
        directive.duration.as_millis(),
    ));

    info!("Entering deep sleep for {} ms", directive.duration.as_millis());
    rtc.sleep_deep(&[&timer]);
}
