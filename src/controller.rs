//! Public DAC operations
//!
//! [`DacController`] ties a [`Platform`] to a [`ResourceRegistry`] and offers the
//! operations a script or host program uses: one-off DAC writes and the blocking `play_*`
//! family, each of which runs one [`StreamSession`] to completion.

use crate::config::{ControllerConfig, StreamOptions, MAX_DAC_CHANNELS};
use crate::platform::{ChannelMask, Platform};
use crate::producer::{BufferAdapter, ListAdapter, Producer, StreamAdapter};
use crate::resources::ResourceRegistry;
use crate::streaming::{PlaybackReport, SessionRequest, StreamSession};
use crate::{DacError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[cfg(feature = "sound-file")]
use crate::producer::FileAdapter;
#[cfg(feature = "sound-file")]
use crate::wav::SoundFile;
#[cfg(feature = "sound-file")]
use std::path::Path;
#[cfg(feature = "sound-file")]
use tracing::info;

/// What the last `configure` call set up on a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChannelSetup {
    bits_per_sample: u32,
    bytes_per_sample: u8,
    options: u32,
}

/// Entry point for DAC output on one platform
///
/// Sessions started from different threads share the controller; the registry keeps
/// them from overlapping on a timer or channel.
pub struct DacController<P: Platform + 'static> {
    platform: Arc<P>,
    registry: Arc<ResourceRegistry>,
    config: ControllerConfig,
    channels: Mutex<HashMap<u32, ChannelSetup>>,
}

impl<P: Platform + 'static> std::fmt::Debug for DacController<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DacController")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: Platform + 'static> DacController<P> {
    /// Controller with the default configuration
    pub fn new(platform: Arc<P>) -> Self {
        Self::with_config(platform, ControllerConfig::default())
    }

    /// Controller with an explicit configuration
    pub fn with_config(platform: Arc<P>, config: ControllerConfig) -> Self {
        DacController {
            platform,
            registry: Arc::new(ResourceRegistry::new()),
            config,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// The platform sessions run on
    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    /// Ownership book shared by this controller's sessions
    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Active configuration
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Program a DAC channel's resolution
    ///
    /// Later `play_*` calls on this channel default to `ceil(bits / 8)` bytes per sample
    /// and keep the DAC at `bits_per_sample` while that width is in use.
    pub fn configure(&self, channel: u32, bits_per_sample: u32, options: u32) -> Result<()> {
        self.check_channels(channel, 1)?;
        self.registry
            .with_idle_channels(ChannelMask::channel(channel), || {
                self.platform.dac_configure(channel, bits_per_sample, options)
            })?
            .map_err(|code| DacError::Initialization { what: "DAC", code })?;

        let bytes_per_sample = bits_per_sample.div_ceil(8) as u8;
        self.channels.lock().insert(
            channel,
            ChannelSetup {
                bits_per_sample,
                bytes_per_sample,
                options,
            },
        );
        debug!(channel, bits_per_sample, options, "DAC configured");
        Ok(())
    }

    /// Write one value to one channel
    pub fn write_single_sample(&self, channel: u32, value: u16) -> Result<()> {
        self.write_samples(channel, &[value])
    }

    /// Write `values` to consecutive channels starting at `first_channel`, in one write
    pub fn write_samples(&self, first_channel: u32, values: &[u16]) -> Result<()> {
        let count = u32::try_from(values.len()).unwrap_or(u32::MAX);
        self.check_channels(first_channel, count)?;
        let mask = ChannelMask::span(first_channel, count);
        self.registry
            .with_idle_channels(mask, || self.platform.dac_write(mask, values))
    }

    /// Play one frame per integer in `values`
    pub fn play_from_list(
        &self,
        channel: u32,
        values: &[u32],
        rate: u32,
        options: &StreamOptions,
    ) -> Result<PlaybackReport> {
        let mut producer =
            ListAdapter::new(values.to_vec()).with_ring_size(self.config.list_ring_size);
        self.play(self.request(channel, rate, options), &mut producer)
    }

    /// Play raw interleaved sample bytes
    ///
    /// `offset` skips leading bytes; `frame_count` limits playback to that many frames,
    /// otherwise everything from `offset` is played.
    pub fn play_from_buffer(
        &self,
        channel: u32,
        bytes: &[u8],
        rate: u32,
        options: &StreamOptions,
        offset: Option<usize>,
        frame_count: Option<u64>,
    ) -> Result<PlaybackReport> {
        let mut producer = BufferAdapter::new(bytes).with_offset(offset.unwrap_or(0));
        if let Some(frames) = frame_count {
            producer = producer.with_frame_count(frames);
        }
        self.play(self.request(channel, rate, options), &mut producer)
    }

    /// Play chunks pulled from `pull` until it returns `None` or an empty chunk
    pub fn play_from_stream<F>(
        &self,
        channel: u32,
        pull: F,
        rate: u32,
        options: &StreamOptions,
    ) -> Result<PlaybackReport>
    where
        F: FnMut() -> Option<Vec<u8>>,
    {
        let mut producer = StreamAdapter::new(pull);
        self.play(self.request(channel, rate, options), &mut producer)
    }

    /// Play a PCM WAV file at its own sample rate
    ///
    /// The header is validated before any timer or DAC is touched. One DAC channel is
    /// used per file channel, starting at `channel`. 16-bit files are signed and get a
    /// bias of 0x8000; 8-bit files are already unsigned.
    #[cfg(feature = "sound-file")]
    pub fn play_sound_file(
        &self,
        channel: u32,
        path: impl AsRef<Path>,
        timer_id: Option<u32>,
        buffer_size: Option<usize>,
    ) -> Result<PlaybackReport> {
        let sound = SoundFile::open(path)?;
        let descriptor = *sound.descriptor();

        let channel_count = u8::try_from(descriptor.channel_count)
            .map_err(|_| format!("{} channels is too many", descriptor.channel_count))?;
        let bytes_per_sample = descriptor.bytes_per_sample() as u8;
        let options = StreamOptions {
            timer_id,
            bytes_per_sample: Some(bytes_per_sample),
            channel_count: Some(channel_count),
            bias: if bytes_per_sample == 2 { 0x8000 } else { 0 },
            wait: None,
        };
        let request = self.request(channel, descriptor.sample_rate, &options);

        info!(
            rate = descriptor.sample_rate,
            channels = channel_count,
            bits = descriptor.bits_per_sample,
            frames = descriptor.frame_count(),
            "playing sound file"
        );
        let mut producer = FileAdapter::new(sound)
            .with_buffer_size(buffer_size.unwrap_or(self.config.file_buffer_size));
        self.play(request, &mut producer)
    }

    fn play<R: Producer + ?Sized>(
        &self,
        request: SessionRequest,
        producer: &mut R,
    ) -> Result<PlaybackReport> {
        let session = StreamSession::new(Arc::clone(&self.platform), Arc::clone(&self.registry));
        session.run(&request, producer)
    }

    fn request(&self, channel: u32, rate: u32, options: &StreamOptions) -> SessionRequest {
        let setup = self.channels.lock().get(&channel).copied();
        let bytes_per_sample = options
            .bytes_per_sample
            .or(setup.map(|s| s.bytes_per_sample))
            .unwrap_or(1);
        SessionRequest {
            channel,
            channel_count: options.channel_count.unwrap_or(1),
            bytes_per_sample,
            bias: options.bias,
            rate,
            timer_id: options.timer_id,
            wait: options.wait.unwrap_or(self.config.wait),
            dac_options: setup.map_or(0, |s| s.options),
            dac_bits: setup
                .filter(|s| s.bytes_per_sample == bytes_per_sample)
                .map(|s| s.bits_per_sample),
        }
    }

    fn check_channels(&self, first: u32, count: u32) -> Result<()> {
        let dac_count = self.platform.dac_count().min(u32::BITS);
        if count == 0 || count as usize > MAX_DAC_CHANNELS {
            return Err(format!("between 1 and {MAX_DAC_CHANNELS} values per write").into());
        }
        if first >= dac_count || count > dac_count - first {
            return Err(format!(
                "channels {first}..{} out of range (platform has {dac_count})",
                u64::from(first) + u64::from(count)
            )
            .into());
        }
        Ok(())
    }
}
