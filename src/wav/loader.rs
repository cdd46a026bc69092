//! WAV File Loader
//!
//! Opens a sound file, validates its header and hands back a reader positioned at the
//! sample data, bounded to the declared data length.

use super::parser::{ContainerParser, WavDescriptor};
use crate::{DacError, Result};
use std::fs::File;
use std::io::{self, BufReader, Read, Take};
use std::path::Path;
use tracing::debug;

/// A validated sound file, ready to be read frame by frame
pub struct SoundFile<R: Read = File> {
    descriptor: WavDescriptor,
    data: Take<BufReader<R>>,
}

impl<R: Read> std::fmt::Debug for SoundFile<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundFile")
            .field("descriptor", &self.descriptor)
            .field("data_remaining", &self.data.limit())
            .finish()
    }
}

impl SoundFile<File> {
    /// Open and validate the file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            DacError::Io(io::Error::new(
                e.kind(),
                format!("failed to open '{}': {e}", path.display()),
            ))
        })?;
        let sound = Self::from_reader(file)?;
        debug!(path = %path.display(), descriptor = ?sound.descriptor, "sound file opened");
        Ok(sound)
    }
}

impl<R: Read> SoundFile<R> {
    /// Validate the header at the start of `reader`
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let descriptor = ContainerParser::parse(&mut reader)?;
        Ok(SoundFile {
            descriptor,
            data: reader.take(u64::from(descriptor.data_length)),
        })
    }

    /// Header fields
    pub fn descriptor(&self) -> &WavDescriptor {
        &self.descriptor
    }

    /// Data bytes not yet read
    pub fn data_remaining(&self) -> u64 {
        self.data.limit()
    }

    /// Next byte of sample data, `None` past the end of the data chunk
    ///
    /// A file shorter than its declared data length ends early rather than failing.
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.data.read(&mut byte) {
                Ok(0) => {
                    self.data.set_limit(0);
                    return Ok(None);
                }
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
