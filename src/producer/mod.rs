//! Producer adapters
//!
//! A producer keeps a session's [`SampleRing`] topped up from one kind of source. All
//! producers run on the caller's stack and wait (spin or yield, per the session's
//! [`WaitStrategy`](crate::config::WaitStrategy)) whenever the ring is too full.
//!
//! | Adapter | Source | Ring |
//! |---------|--------|------|
//! | [`ListAdapter`] | integer values | small scratch ring |
//! | [`BufferAdapter`] | raw bytes | the bytes themselves |
//! | [`StreamAdapter`] | pull callback | sized by the first chunk |
//! | [`FileAdapter`] | WAV file | configurable heap ring |

pub mod buffer;
#[cfg(feature = "sound-file")]
pub mod file;
pub mod list;
pub mod stream;

pub use buffer::BufferAdapter;
#[cfg(feature = "sound-file")]
pub use file::FileAdapter;
pub use list::ListAdapter;
pub use stream::StreamAdapter;

use crate::streaming::{FrameTarget, SampleRing, SessionShared};
use crate::Result;

/// Source of sample bytes for a streaming session
pub trait Producer {
    /// Build the ring for a session with `stride`-byte frames
    ///
    /// Called once, before the timer is armed. Implementations may pull source data here
    /// to size or pre-fill the ring.
    fn prepare(&mut self, stride: usize) -> Result<SampleRing>;

    /// How many frames the session plays. Called after [`prepare`](Self::prepare).
    fn target(&self) -> FrameTarget;

    /// Feed the ring until the source is exhausted
    ///
    /// Called with the timer running. Returning hands the session over to draining.
    fn run(&mut self, session: &SessionShared) -> Result<()>;

    /// Short name for logging
    fn name(&self) -> &str;
}
