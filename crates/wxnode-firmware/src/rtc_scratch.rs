//! Run-record storage in RTC fast memory
//!
//! The region is placed in a persistent RTC fast RAM section: it keeps its
//! contents through deep sleep and is never initialized by the startup code,
//! so after a cold boot it holds arbitrary bits.

use static_cell::StaticCell;
use wxnode_core::run_store::SCRATCH_BUCKETS;

#[esp_hal::ram(unstable(rtc_fast, persistent))]
static mut SCRATCH: [u32; SCRATCH_BUCKETS] = [0; SCRATCH_BUCKETS];

// Guards the single mutable borrow of SCRATCH.
static TAKEN: StaticCell<()> = StaticCell::new();

/// Hand out the scratch region. Panics when called twice.
pub fn take() -> &'static mut [u32; SCRATCH_BUCKETS] {
    TAKEN.init(());
    // SAFETY: TAKEN makes this the only reference ever created.
    unsafe { &mut *core::ptr::addr_of_mut!(SCRATCH) }
}
