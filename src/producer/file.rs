//! Sound file producer
//!
//! Streams the data chunk of a validated WAV file through a heap ring. The ring is
//! pre-filled before the timer starts; afterwards bytes are read one at a time whenever
//! there is room, and silence is pushed once the data runs out so the consumer can reach
//! the frame count even for a file shorter than its header claims.

use super::Producer;
use crate::config::DEFAULT_FILE_BUFFER_SIZE;
use crate::streaming::{FrameTarget, SampleRing, SessionShared};
use crate::wav::SoundFile;
use crate::Result;
use std::fs::File;
use std::io::Read;
use tracing::trace;

/// Plays the data chunk of a sound file
#[derive(Debug)]
pub struct FileAdapter<R: Read = File> {
    file: SoundFile<R>,
    buffer_size: usize,
    exhausted: bool,
}

impl<R: Read> FileAdapter<R> {
    /// Play `file` through a ring of the default size
    pub fn new(file: SoundFile<R>) -> Self {
        FileAdapter {
            file,
            buffer_size: DEFAULT_FILE_BUFFER_SIZE,
            exhausted: false,
        }
    }

    /// Use a ring of `bytes` instead of the default
    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }

    /// The file being played
    pub fn sound_file(&self) -> &SoundFile<R> {
        &self.file
    }

    fn next_byte(&mut self) -> Result<u8> {
        if self.exhausted {
            return Ok(0);
        }
        match self.file.read_byte()? {
            Some(byte) => Ok(byte),
            None => {
                trace!("end of sample data, padding with silence");
                self.exhausted = true;
                Ok(0)
            }
        }
    }
}

impl<R: Read> Producer for FileAdapter<R> {
    fn prepare(&mut self, stride: usize) -> Result<SampleRing> {
        if self.buffer_size < stride + 2 {
            return Err(format!(
                "buffer of {} bytes cannot hold a {stride}-byte frame",
                self.buffer_size
            )
            .into());
        }

        let ring = SampleRing::with_capacity(self.buffer_size, stride)?;
        for _ in 0..self.buffer_size - stride {
            ring.push(self.next_byte()?);
        }
        trace!(prefilled = ring.occupancy(), "ring primed");
        Ok(ring)
    }

    fn target(&self) -> FrameTarget {
        FrameTarget::Finite(self.file.descriptor().frame_count())
    }

    fn run(&mut self, session: &SessionShared) -> Result<()> {
        let ring = session.ring();
        while !session.target_reached() {
            if ring.free_space() >= 2 {
                ring.push(self.next_byte()?);
            } else {
                session.relax();
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}
