//! Raw byte buffer producer
//!
//! The caller's bytes become the ring's contents directly; nothing is produced once the
//! timer is running.

use super::Producer;
use crate::streaming::{FrameTarget, SampleRing, SessionShared};
use crate::Result;

/// Plays a byte buffer, optionally starting at an offset and limited to a frame count
#[derive(Debug, Clone)]
pub struct BufferAdapter {
    bytes: Vec<u8>,
    offset: usize,
    frame_count: Option<u64>,
}

impl BufferAdapter {
    /// Play all of `bytes`
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        BufferAdapter {
            bytes: bytes.into(),
            offset: 0,
            frame_count: None,
        }
    }

    /// Skip the first `offset` bytes
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Play exactly `frames` frames
    pub fn with_frame_count(mut self, frames: u64) -> Self {
        self.frame_count = Some(frames);
        self
    }
}

impl Producer for BufferAdapter {
    fn prepare(&mut self, stride: usize) -> Result<SampleRing> {
        let data = self.bytes.get(self.offset..).ok_or_else(|| {
            format!(
                "offset {} beyond buffer of {} bytes",
                self.offset,
                self.bytes.len()
            )
        })?;

        let available = (data.len() / stride) as u64;
        if let Some(frames) = self.frame_count {
            if frames > available {
                return Err(format!(
                    "frame count {frames} exceeds the {available} frames in the buffer"
                )
                .into());
            }
        }

        SampleRing::from_bytes(data, stride)
    }

    fn target(&self) -> FrameTarget {
        self.frame_count
            .map_or(FrameTarget::Unbounded, FrameTarget::Finite)
    }

    fn run(&mut self, session: &SessionShared) -> Result<()> {
        // data was in place before the timer started; earlier ticks are not starvation
        session.reset_underflows();
        Ok(())
    }

    fn name(&self) -> &str {
        "buffer"
    }
}
