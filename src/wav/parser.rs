//! RIFF/WAVE header parser
//!
//! Reads the fixed part of a PCM WAV file from any [`Read`] and stops at the first byte
//! of sample data. Layout (all integers little-endian):
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | `"RIFF"` |
//! | 4 | 4 | RIFF size |
//! | 8 | 4 | `"WAVE"` |
//! | 12 | 4 | `"fmt "` |
//! | 16 | 4 | format chunk size (>= 16) |
//! | 20 | 2 | compression code (1 = PCM) |
//! | 22 | 2 | channels |
//! | 24 | 4 | sample rate |
//! | 28 | 4 | byte rate |
//! | 32 | 2 | block align |
//! | 34 | 2 | bits per sample |
//! | .. | n | format extension (skipped) |
//! | .. | 4 | `"data"` |
//! | .. | 4 | data length |

use crate::error::FormatError;
use crate::{DacError, Result};
use nom::bytes::complete::take;
use nom::number::complete::{le_u16, le_u32};
use nom::sequence::tuple;
use nom::IResult;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::io::{self, Read};

/// Size of the mandatory part of the format chunk
pub const FORMAT_CHUNK_MIN: u32 = 16;

/// Known WAVE compression codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum FormatTag {
    /// Uncompressed PCM, the only one played
    Pcm = 0x0001,
    /// Microsoft ADPCM
    Adpcm = 0x0002,
    /// 32/64-bit float
    IeeeFloat = 0x0003,
    /// G.711 A-law
    ALaw = 0x0006,
    /// G.711 mu-law
    MuLaw = 0x0007,
    /// WAVE_FORMAT_EXTENSIBLE
    Extensible = 0xFFFE,
}

/// Header fields recovered from a WAV file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavDescriptor {
    /// Always [`FormatTag::Pcm`] once validated
    pub compression_code: u16,
    /// Interleaved channels per frame
    pub channel_count: u16,
    /// Frames per second
    pub sample_rate: u32,
    /// Bytes per second as declared by the file
    pub byte_rate: u32,
    /// Bytes per frame
    pub block_align: u16,
    /// Declared resolution
    pub bits_per_sample: u16,
    /// Length of the data chunk in bytes
    pub data_length: u32,
}

impl WavDescriptor {
    /// Bytes per sample per channel (1 or 2 once validated)
    pub fn bytes_per_sample(&self) -> u16 {
        self.block_align / self.channel_count.max(1)
    }

    /// Number of frames in the data chunk
    pub fn frame_count(&self) -> u64 {
        match self.block_align {
            0 => 0,
            align => u64::from(self.data_length / u32::from(align)),
        }
    }

    /// Compression code as a known tag, if it is one
    pub fn format_tag(&self) -> Option<FormatTag> {
        FormatTag::from_u16(self.compression_code)
    }
}

struct FormatFields {
    compression_code: u16,
    channel_count: u16,
    sample_rate: u32,
    byte_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

fn fourcc(input: &[u8]) -> IResult<&[u8], [u8; 4]> {
    let (rest, bytes) = take(4usize)(input)?;
    let mut tag = [0u8; 4];
    tag.copy_from_slice(bytes);
    Ok((rest, tag))
}

fn riff_preamble(input: &[u8]) -> IResult<&[u8], ([u8; 4], u32, [u8; 4])> {
    tuple((fourcc, le_u32, fourcc))(input)
}

fn chunk_header(input: &[u8]) -> IResult<&[u8], ([u8; 4], u32)> {
    tuple((fourcc, le_u32))(input)
}

fn format_fields(input: &[u8]) -> IResult<&[u8], FormatFields> {
    let (rest, (compression_code, channel_count, sample_rate, byte_rate, block_align, bits_per_sample)) =
        tuple((le_u16, le_u16, le_u32, le_u32, le_u16, le_u16))(input)?;
    Ok((
        rest,
        FormatFields {
            compression_code,
            channel_count,
            sample_rate,
            byte_rate,
            block_align,
            bits_per_sample,
        },
    ))
}

/// WAV header parser
pub struct ContainerParser;

impl ContainerParser {
    /// Parse a header, leaving `reader` positioned at the first data byte
    ///
    /// # Errors
    ///
    /// - [`FormatError`] for a short read, a wrong tag, a non-PCM compression code or a
    ///   bytes-per-sample other than 1 or 2
    /// - [`DacError::Io`] for any other read failure
    pub fn parse<R: Read>(reader: &mut R) -> Result<WavDescriptor> {
        let preamble: [u8; 12] = read_array(reader, "RIFF header")?;
        let (_, (riff, _riff_size, wave)) =
            riff_preamble(&preamble).map_err(|_| FormatError::Truncated("RIFF header"))?;
        expect_tag(riff, "RIFF")?;
        expect_tag(wave, "WAVE")?;

        let header: [u8; 8] = read_array(reader, "format chunk header")?;
        let (_, (tag, format_len)) =
            chunk_header(&header).map_err(|_| FormatError::Truncated("format chunk header"))?;
        expect_tag(tag, "fmt ")?;
        if format_len < FORMAT_CHUNK_MIN {
            return Err(FormatError::ShortFormatChunk(format_len).into());
        }

        let body: [u8; 16] = read_array(reader, "format chunk")?;
        let (_, fields) =
            format_fields(&body).map_err(|_| FormatError::Truncated("format chunk"))?;
        skip(reader, u64::from(format_len - FORMAT_CHUNK_MIN), "format chunk")?;

        if fields.compression_code != FormatTag::Pcm as u16 {
            return Err(FormatError::UnsupportedCompression(fields.compression_code).into());
        }
        if fields.channel_count == 0 {
            return Err(FormatError::InvalidChannelCount.into());
        }
        if !matches!(fields.block_align / fields.channel_count, 1 | 2) {
            return Err(FormatError::UnsupportedBitDepth {
                block_align: fields.block_align,
                channels: fields.channel_count,
            }
            .into());
        }

        let header: [u8; 8] = read_array(reader, "data chunk header")?;
        let (_, (tag, data_length)) =
            chunk_header(&header).map_err(|_| FormatError::Truncated("data chunk header"))?;
        expect_tag(tag, "data")?;

        Ok(WavDescriptor {
            compression_code: fields.compression_code,
            channel_count: fields.channel_count,
            sample_rate: fields.sample_rate,
            byte_rate: fields.byte_rate,
            block_align: fields.block_align,
            bits_per_sample: fields.bits_per_sample,
            data_length,
        })
    }
}

fn expect_tag(found: [u8; 4], expected: &'static str) -> Result<()> {
    if found.as_slice() == expected.as_bytes() {
        Ok(())
    } else {
        Err(FormatError::MissingTag { expected, found }.into())
    }
}

fn read_array<R: Read, const N: usize>(reader: &mut R, what: &'static str) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|e| short_read(e, what))?;
    Ok(buf)
}

fn skip<R: Read>(reader: &mut R, bytes: u64, what: &'static str) -> Result<()> {
    let skipped = io::copy(&mut reader.by_ref().take(bytes), &mut io::sink())?;
    if skipped < bytes {
        return Err(FormatError::Truncated(what).into());
    }
    Ok(())
}

fn short_read(err: io::Error, what: &'static str) -> DacError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        FormatError::Truncated(what).into()
    } else {
        DacError::Io(err)
    }
}
