//! Controller and per-session configuration
//!
//! [`ControllerConfig`] holds the buffer-sizing policy shared by every session a
//! [`DacController`](crate::DacController) starts. It can be loaded from JSON so the
//! CLI and embedding hosts can tune it without recompiling. [`StreamOptions`] carries the
//! optional per-call parameters of the `play_*` operations.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Highest number of DAC channels a single frame can address
pub const MAX_DAC_CHANNELS: usize = 8;

/// Largest frame: two bytes per sample on every channel
pub const MAX_FRAME_BYTES: usize = 2 * MAX_DAC_CHANNELS;

/// Scratch ring size used when playing from an integer list
pub const LIST_RING_SIZE: usize = 16;

/// Default ring size for file-backed playback
pub const DEFAULT_FILE_BUFFER_SIZE: usize = 1024;

/// Microseconds per second, used to turn a sample rate into a timer period
pub const MICROS_PER_SECOND: u32 = 1_000_000;

/// How the producer waits for ring space or for the consumer to drain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategy {
    /// Busy-wait with a CPU spin hint. The only option without a scheduler.
    #[default]
    Spin,
    /// Give the rest of the time slice back to the OS scheduler between polls
    Yield,
}

impl WaitStrategy {
    /// One poll interval
    #[inline]
    pub fn relax(self) {
        match self {
            WaitStrategy::Spin => std::hint::spin_loop(),
            WaitStrategy::Yield => std::thread::yield_now(),
        }
    }

    /// Poll `ready` until it returns true
    #[inline]
    pub fn wait_until(self, mut ready: impl FnMut() -> bool) {
        while !ready() {
            self.relax();
        }
    }
}

/// Buffer sizing policy shared by all sessions of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Ring size for list playback (grown to fit one frame if needed)
    pub list_ring_size: usize,
    /// Default ring size for sound-file playback
    pub file_buffer_size: usize,
    /// Producer wait behaviour
    pub wait: WaitStrategy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            list_ring_size: LIST_RING_SIZE,
            file_buffer_size: DEFAULT_FILE_BUFFER_SIZE,
            wait: WaitStrategy::Spin,
        }
    }
}

impl ControllerConfig {
    /// Parse a configuration from a JSON string. Missing fields take their defaults.
    pub fn from_json(text: &str) -> crate::Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| crate::DacError::InvalidArgument(format!("invalid configuration: {e}")))
    }

    /// Load a configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

/// Optional parameters of the `play_*` operations
///
/// Anything left as `None` is filled in by the controller: the timer is auto-selected,
/// bytes per sample come from the channel's last [`configure`](crate::DacController::configure)
/// call (or 1), and one channel is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// Timer to drive the session with
    pub timer_id: Option<u32>,
    /// 1 or 2
    pub bytes_per_sample: Option<u8>,
    /// Consecutive DAC channels fed from each frame
    pub channel_count: Option<u8>,
    /// Added to every decoded sample before output
    pub bias: u16,
    /// Overrides the controller's wait strategy for this session
    pub wait: Option<WaitStrategy>,
}

impl StreamOptions {
    /// Options with every field defaulted
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive the session from a specific timer
    pub fn timer(mut self, timer_id: u32) -> Self {
        self.timer_id = Some(timer_id);
        self
    }

    /// Set bytes per sample (1 or 2)
    pub fn bytes_per_sample(mut self, bytes: u8) -> Self {
        self.bytes_per_sample = Some(bytes);
        self
    }

    /// Feed `count` consecutive channels from each frame
    pub fn channels(mut self, count: u8) -> Self {
        self.channel_count = Some(count);
        self
    }

    /// Set the bias added to every sample
    pub fn bias(mut self, bias: u16) -> Self {
        self.bias = bias;
        self
    }

    /// Override the wait strategy
    pub fn wait(mut self, wait: WaitStrategy) -> Self {
        self.wait = Some(wait);
        self
    }
}
