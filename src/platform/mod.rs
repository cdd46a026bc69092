//! Hardware abstraction consumed by the streaming core
//!
//! The [`Platform`] trait is the boundary to the code that actually programs DAC output
//! registers and timer-match interrupts. The streaming core never touches hardware any
//! other way. A platform's timer ISR is expected to call
//! [`InterruptTable::dispatch`] with [`InterruptLine::TimerMatch`] and the id of the timer
//! that fired.

pub mod interrupt;
#[cfg(feature = "simulator")]
pub mod sim;

pub use interrupt::{Dispatch, HandlerToken, InterruptLine, InterruptTable};
#[cfg(feature = "simulator")]
pub use sim::{SimulatedPlatform, TickMode};

use bitflags::bitflags;

bitflags! {
    /// Set of DAC channels written together by one [`Platform::dac_write`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChannelMask: u32 {
        /// DAC channel 0
        const DAC0 = 1 << 0;
        /// DAC channel 1
        const DAC1 = 1 << 1;
        // any channel bit is valid
        const _ = !0;
    }
}

impl ChannelMask {
    /// Mask covering `count` consecutive channels starting at `first`
    ///
    /// Channels at or above 32 have no bit and are left out.
    pub fn span(first: u32, count: u32) -> Self {
        let bits = (first..first.saturating_add(count))
            .take_while(|&ch| ch < u32::BITS)
            .fold(0u32, |acc, ch| acc | 1u32 << ch);
        ChannelMask::from_bits_retain(bits)
    }

    /// Mask for a single channel
    pub fn channel(id: u32) -> Self {
        Self::span(id, 1)
    }

    /// Channel ids in ascending order
    pub fn channels(self) -> impl Iterator<Item = u32> {
        (0..u32::BITS).filter(move |ch| self.bits() & (1 << ch) != 0)
    }
}

/// DAC and timer hardware used by a streaming session
///
/// Methods take `&self`: [`dac_write`](Self::dac_write) is called from interrupt context
/// while the other methods run on the caller's stack, so implementations use interior
/// mutability where they need state. `dac_write` must not block or allocate.
pub trait Platform: Send + Sync {
    /// Number of DAC output channels
    fn dac_count(&self) -> u32;

    /// Number of hardware timers
    fn timer_count(&self) -> u32;

    /// Configure one DAC channel for `bits_per_sample` output
    ///
    /// Returns a platform-specific error code on failure.
    fn dac_configure(&self, channel: u32, bits_per_sample: u32, options: u32) -> Result<(), i32>;

    /// Write `values[i]` to the i-th channel of `mask` (ascending order) in one step
    fn dac_write(&self, mask: ChannelMask, values: &[u16]);

    /// Start periodic timer-match interrupts every `period_us` microseconds
    fn timer_arm_periodic(&self, timer: u32, period_us: u32) -> Result<(), i32>;

    /// Stop timer-match interrupts for `timer`
    fn timer_disarm(&self, timer: u32);

    /// Whether `timer` can pace output on DAC `channel`
    fn timer_supports_dac(&self, channel: u32, timer: u32) -> bool;

    /// Dispatch table the platform's interrupt service routine feeds
    fn interrupts(&self) -> &InterruptTable;
}
