//! Channel selection from two strap pins
//!
//! Two digital inputs form a 2-bit index into a fixed table of four channel
//! identities. The index space is exactly the table size, so every pin
//! combination maps to an entry.

use embedded_hal::digital::{Error as _, InputPin};
use log::{info, warn};

/// Number of selectable channel identities.
pub const CHANNEL_COUNT: usize = 4;

/// Compose the table index from the two selector lines.
pub const fn channel_index(lsb: bool, msb: bool) -> usize {
    lsb as usize + 2 * msb as usize
}

/// Reads the selector pins and resolves the channel identity.
pub struct ChannelSelector<L, M> {
    lsb: L,
    msb: M,
}

impl<L: InputPin, M: InputPin> ChannelSelector<L, M> {
    pub const fn new(lsb: L, msb: M) -> Self {
        Self { lsb, msb }
    }

    /// Sample both pins once and return the matching entry of `table`.
    ///
    /// A pin that cannot be read is treated as low.
    pub fn select<'t>(&mut self, table: &[&'t str; CHANNEL_COUNT]) -> &'t str {
        let lsb = read_line(&mut self.lsb, "lsb");
        let msb = read_line(&mut self.msb, "msb");
        let index = channel_index(lsb, msb);
        let channel = table[index];

        info!("Channel selector lsb={} msb={} -> {} ({})", lsb, msb, index, channel);
        channel
    }
}

fn read_line<P: InputPin>(pin: &mut P, name: &str) -> bool {
    match pin.is_high() {
        Ok(level) => level,
        Err(e) => {
            warn!("Channel selector {} pin unreadable: {:?}", name, e.kind());
            false
        }
    }
}
