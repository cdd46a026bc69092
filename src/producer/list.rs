//! Integer list producer
//!
//! Each value becomes one frame, written least-significant byte first for `stride`
//! bytes through a small scratch ring.

use super::Producer;
use crate::config::LIST_RING_SIZE;
use crate::streaming::{FrameTarget, SampleRing, SessionShared};
use crate::Result;

/// Plays a list of integer sample values
#[derive(Debug, Clone)]
pub struct ListAdapter {
    values: Vec<u32>,
    ring_size: usize,
    stride: usize,
}

impl ListAdapter {
    /// Play `values`, one frame each
    pub fn new(values: impl Into<Vec<u32>>) -> Self {
        ListAdapter {
            values: values.into(),
            ring_size: LIST_RING_SIZE,
            stride: 1,
        }
    }

    /// Use a scratch ring of `bytes` instead of the default
    pub fn with_ring_size(mut self, bytes: usize) -> Self {
        self.ring_size = bytes;
        self
    }
}

impl Producer for ListAdapter {
    fn prepare(&mut self, stride: usize) -> Result<SampleRing> {
        self.stride = stride;
        // a frame must fit next to the empty slot
        SampleRing::with_capacity(self.ring_size.max(stride + 1), stride)
    }

    fn target(&self) -> FrameTarget {
        FrameTarget::Finite(self.values.len() as u64)
    }

    fn run(&mut self, session: &SessionShared) -> Result<()> {
        let ring = session.ring();
        for (index, &value) in self.values.iter().enumerate() {
            session.wait_for_space(self.stride);

            let mut remaining = value;
            for _ in 0..self.stride {
                ring.push(remaining as u8);
                remaining >>= 8;
            }

            // ticks before the first frame only measured the fill-up delay
            if index == 0 {
                session.reset_underflows();
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "list"
    }
}
