//! Timer interrupt consumer
//!
//! Runs once per timer-match interrupt. Bounded work only: one frame copy, one DAC write,
//! a few atomic counter updates. Never blocks, never allocates.

use super::SessionShared;
use crate::config::MAX_DAC_CHANNELS;
use crate::platform::{Dispatch, Platform};
use std::sync::Arc;

/// Interrupt-side half of a session
pub struct TimerConsumer<P: Platform> {
    shared: Arc<SessionShared>,
    platform: Arc<P>,
}

impl<P: Platform> TimerConsumer<P> {
    /// Bind a consumer to a session's shared state
    pub fn new(shared: Arc<SessionShared>, platform: Arc<P>) -> Self {
        TimerConsumer { shared, platform }
    }

    /// Handle one timer-match event raised by `timer`
    ///
    /// Events from other timers are forwarded down the handler chain.
    pub fn on_tick(&self, timer: u32) -> Dispatch {
        let shared = &*self.shared;
        if timer != shared.timer() {
            return Dispatch::Forward;
        }
        if shared.target_reached() {
            return Dispatch::Handled;
        }

        let Some(frame) = shared.ring().pop_frame() else {
            shared.record_underflow();
            return Dispatch::Handled;
        };

        let format = shared.format();
        let channels = format.channel_count as usize;
        let mut values = [0u16; MAX_DAC_CHANNELS];
        for (value, raw) in values[..channels]
            .iter_mut()
            .zip(frame.as_bytes().chunks_exact(format.bytes_per_sample as usize))
        {
            let sample = match raw {
                [lo] => u16::from(*lo),
                [lo, hi] => u16::from_le_bytes([*lo, *hi]),
                _ => 0,
            };
            *value = sample.wrapping_add(format.bias);
        }

        self.platform.dac_write(format.mask, &values[..channels]);
        shared.record_output();
        Dispatch::Handled
    }
}
