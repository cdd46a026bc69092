//! Interrupt-driven sample streaming
//!
//! A [`StreamSession`] owns one timer and a set of DAC channels. While it is active, the
//! [`TimerConsumer`] pops one frame from the [`SampleRing`] per timer tick and writes it
//! to the DAC, and a [`Producer`](crate::producer::Producer) keeps the ring topped up
//! from the caller's stack.

pub mod consumer;
pub mod ring;
pub mod session;

pub use consumer::TimerConsumer;
pub use ring::{Frame, SampleRing};
pub use session::{SessionRequest, SessionShared, SessionState, StreamSession};

/// How many frames a session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTarget {
    /// Stop after exactly this many frames have been output
    Finite(u64),
    /// Stop once the producer is exhausted and the ring has drained
    Unbounded,
}

/// Counters returned when a session completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackReport {
    /// Frames written to the DAC
    pub frames_output: u64,
    /// Ticks that found less than one frame in the ring
    pub underflows: u64,
}

impl std::fmt::Display for PlaybackReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames output, {} underflows",
            self.frames_output, self.underflows
        )
    }
}
