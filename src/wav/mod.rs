//! WAV Sound File Domain
//!
//! Header validation and bounded access to the sample data of uncompressed PCM WAV
//! files with 8- or 16-bit samples.

pub mod loader;
pub mod parser;

pub use loader::SoundFile;
pub use parser::{ContainerParser, FormatTag, WavDescriptor};

use crate::Result;
use std::path::Path;

/// Convenience function to open and validate a WAV file
pub fn open(path: impl AsRef<Path>) -> Result<SoundFile> {
    SoundFile::open(path)
}
