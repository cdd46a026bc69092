//! Pull-callback producer
//!
//! The callback returns the next chunk of sample bytes each time it is called, and
//! `None` or an empty chunk once the stream is over. The first chunk sets the ring size
//! and is copied in whole before the timer starts; later chunks are copied byte by byte
//! as the consumer frees space.

use super::Producer;
use crate::streaming::{FrameTarget, SampleRing, SessionShared};
use crate::Result;
use tracing::trace;

/// Plays the chunks returned by a callback until it signals the end
pub struct StreamAdapter<F> {
    pull: F,
    first_chunk_len: usize,
    stride: usize,
    exhausted: bool,
}

impl<F> std::fmt::Debug for StreamAdapter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAdapter")
            .field("first_chunk_len", &self.first_chunk_len)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl<F> StreamAdapter<F>
where
    F: FnMut() -> Option<Vec<u8>>,
{
    /// Play the chunks returned by `pull`
    pub fn new(pull: F) -> Self {
        StreamAdapter {
            pull,
            first_chunk_len: 0,
            stride: 1,
            exhausted: false,
        }
    }

    fn next_chunk(&mut self) -> Option<Vec<u8>> {
        if self.exhausted {
            return None;
        }
        match (self.pull)() {
            Some(chunk) if !chunk.is_empty() => Some(chunk),
            _ => {
                self.exhausted = true;
                None
            }
        }
    }
}

impl<F> Producer for StreamAdapter<F>
where
    F: FnMut() -> Option<Vec<u8>>,
{
    fn prepare(&mut self, stride: usize) -> Result<SampleRing> {
        self.stride = stride;
        match self.next_chunk() {
            Some(chunk) => {
                self.first_chunk_len = chunk.len();
                trace!(bytes = chunk.len(), "first chunk sizes ring");
                SampleRing::from_bytes(&chunk, stride)
            }
            None => SampleRing::with_capacity(1, stride),
        }
    }

    fn target(&self) -> FrameTarget {
        FrameTarget::Unbounded
    }

    fn run(&mut self, session: &SessionShared) -> Result<()> {
        if self.exhausted {
            return Ok(());
        }
        session.reset_underflows();

        // consumer must have started before more data is requested
        if self.first_chunk_len >= self.stride {
            let full = self.first_chunk_len;
            session.wait_until(|| session.ring().occupancy() < full);
        }

        let ring = session.ring();
        while let Some(chunk) = self.next_chunk() {
            trace!(bytes = chunk.len(), "chunk");
            for &byte in &chunk {
                session.wait_for_space(1);
                ring.push(byte);
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "stream"
    }
}
