//! Exclusive ownership of timers and DAC channels
//!
//! A session leases one timer and a contiguous set of DAC channels for its whole
//! lifetime. The conflict check and the commit happen under one lock, so two sessions can
//! never both believe they own the same resource. The lease gives everything back when it
//! is dropped.

use crate::error::Resource;
use crate::platform::ChannelMask;
use crate::{DacError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Owned {
    timers: u64,
    channels: ChannelMask,
}

/// Book of resources currently owned by active sessions
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    owned: Mutex<Owned>,
}

impl ResourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `timer` and every channel in `channels`, or nothing at all
    pub fn acquire(self: &Arc<Self>, timer: u32, channels: ChannelMask) -> Result<Lease> {
        let timer_bit = Self::timer_bit(timer)?;
        let mut owned = self.owned.lock();

        if owned.timers & timer_bit != 0 {
            return Err(DacError::ResourceConflict(Resource::Timer(timer)));
        }
        if let Some(busy) = (owned.channels & channels).channels().next() {
            return Err(DacError::ResourceConflict(Resource::DacChannel(busy)));
        }

        owned.timers |= timer_bit;
        owned.channels |= channels;

        Ok(Lease {
            registry: Arc::clone(self),
            timer,
            channels,
        })
    }

    /// Whether any active session owns `timer`
    pub fn timer_busy(&self, timer: u32) -> bool {
        Self::timer_bit(timer).is_ok_and(|bit| self.owned.lock().timers & bit != 0)
    }

    /// First channel of `channels` owned by an active session, if any
    pub fn first_busy_channel(&self, channels: ChannelMask) -> Option<u32> {
        (self.owned.lock().channels & channels).channels().next()
    }

    /// Run `f` while no session owns any of `channels`
    ///
    /// The registry stays locked for the duration of `f`, so no session can start on
    /// those channels halfway through.
    pub fn with_idle_channels<T>(&self, channels: ChannelMask, f: impl FnOnce() -> T) -> Result<T> {
        let owned = self.owned.lock();
        if let Some(busy) = (owned.channels & channels).channels().next() {
            return Err(DacError::ResourceConflict(Resource::DacChannel(busy)));
        }
        Ok(f())
    }

    fn timer_bit(timer: u32) -> Result<u64> {
        1u64.checked_shl(timer)
            .ok_or_else(|| format!("timer id {timer} out of range").into())
    }

    fn release(&self, timer: u32, channels: ChannelMask) {
        let mut owned = self.owned.lock();
        if let Ok(bit) = Self::timer_bit(timer) {
            owned.timers &= !bit;
        }
        owned.channels &= !channels;
    }
}

/// Proof of ownership of one timer and a DAC channel set
#[derive(Debug)]
pub struct Lease {
    registry: Arc<ResourceRegistry>,
    timer: u32,
    channels: ChannelMask,
}

impl Lease {
    /// Leased timer id
    pub fn timer(&self) -> u32 {
        self.timer
    }

    /// Leased DAC channels
    pub fn channels(&self) -> ChannelMask {
        self.channels
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.registry.release(self.timer, self.channels);
    }
}
