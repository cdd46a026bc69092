//! Streaming session lifecycle
//!
//! ```text
//! Idle -> Configuring -> Active -> Draining -> Idle
//!              |            |
//!              +-> Failed <-+
//! ```
//!
//! Configuring reserves the timer and DAC channels and programs the DACs. Active installs
//! the [`TimerConsumer`] in the interrupt chain, arms the timer and runs the producer on
//! the caller's stack. Draining waits for the consumer to finish. Teardown (disarm, unhook,
//! release) runs from `Drop`, so every exit path takes it, including `?` returns.

use super::{FrameTarget, PlaybackReport, SampleRing, TimerConsumer};
use crate::config::{WaitStrategy, MAX_DAC_CHANNELS, MICROS_PER_SECOND};
use crate::platform::{ChannelMask, HandlerToken, InterruptLine, Platform};
use crate::producer::Producer;
use crate::resources::{Lease, ResourceRegistry};
use crate::{DacError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing reserved
    Idle,
    /// Validating arguments and acquiring hardware
    Configuring,
    /// Timer armed, producer running
    Active,
    /// Producer exhausted, waiting for the consumer to finish
    Draining,
    /// Setup or production failed; resources have been released
    Failed,
}

/// Layout of one frame and how it maps onto the DAC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Channels written by each frame
    pub mask: ChannelMask,
    /// Number of channels in `mask`
    pub channel_count: u8,
    /// 1 or 2
    pub bytes_per_sample: u8,
    /// Added (wrapping) to every decoded sample
    pub bias: u16,
}

impl FrameFormat {
    /// Bytes per frame
    pub fn stride(&self) -> usize {
        usize::from(self.channel_count) * usize::from(self.bytes_per_sample)
    }
}

/// Everything a caller decides about a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRequest {
    /// First DAC channel
    pub channel: u32,
    /// Consecutive channels starting at `channel`
    pub channel_count: u8,
    /// 1 or 2
    pub bytes_per_sample: u8,
    /// Added to every decoded sample
    pub bias: u16,
    /// Frames per second
    pub rate: u32,
    /// Timer to use; `None` picks the first one able to drive `channel`
    pub timer_id: Option<u32>,
    /// Producer wait behaviour
    pub wait: WaitStrategy,
    /// Passed through to `dac_configure`
    pub dac_options: u32,
    /// DAC resolution; `None` programs `bytes_per_sample * 8` bits
    pub dac_bits: Option<u32>,
}

/// State shared between the producer and the interrupt consumer
///
/// The ring carries the samples; the counters are plain atomics because each one has a
/// single writer (the consumer), except the underflow reset done once by the producer.
#[derive(Debug)]
pub struct SessionShared {
    ring: SampleRing,
    format: FrameFormat,
    timer: u32,
    bounded: bool,
    remaining: AtomicU64,
    frames_output: AtomicU64,
    underflows: AtomicU64,
    wait: WaitStrategy,
}

impl SessionShared {
    /// Bundle a prepared ring with the session parameters
    pub fn new(
        ring: SampleRing,
        format: FrameFormat,
        timer: u32,
        target: FrameTarget,
        wait: WaitStrategy,
    ) -> Self {
        let (bounded, remaining) = match target {
            FrameTarget::Finite(frames) => (true, frames),
            FrameTarget::Unbounded => (false, 0),
        };
        SessionShared {
            ring,
            format,
            timer,
            bounded,
            remaining: AtomicU64::new(remaining),
            frames_output: AtomicU64::new(0),
            underflows: AtomicU64::new(0),
            wait,
        }
    }

    /// The sample ring
    pub fn ring(&self) -> &SampleRing {
        &self.ring
    }

    /// Frame layout
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Timer driving the session
    pub fn timer(&self) -> u32 {
        self.timer
    }

    /// Frames still to output, or `None` for an unbounded session
    pub fn remaining(&self) -> Option<u64> {
        self.bounded
            .then(|| self.remaining.load(Ordering::Acquire))
    }

    /// Whether a finite session has output all its frames
    #[inline]
    pub fn target_reached(&self) -> bool {
        self.bounded && self.remaining.load(Ordering::Acquire) == 0
    }

    /// Counters so far
    pub fn report(&self) -> PlaybackReport {
        PlaybackReport {
            frames_output: self.frames_output.load(Ordering::Acquire),
            underflows: self.underflows.load(Ordering::Acquire),
        }
    }

    /// Forget underflows seen while the ring was first filling
    pub fn reset_underflows(&self) {
        self.underflows.store(0, Ordering::Release);
    }

    /// One wait-strategy poll interval
    #[inline]
    pub fn relax(&self) {
        self.wait.relax();
    }

    /// Wait until `ready` holds
    pub fn wait_until(&self, ready: impl FnMut() -> bool) {
        self.wait.wait_until(ready);
    }

    /// Wait until at least `bytes` can be pushed
    pub fn wait_for_space(&self, bytes: usize) {
        self.wait.wait_until(|| self.ring.free_space() >= bytes);
    }

    /// Wait until the consumer has nothing left to do
    ///
    /// Finite sessions wait for the frame target; unbounded ones wait until less than one
    /// frame is left in the ring.
    pub fn wait_for_drain(&self) {
        if self.bounded {
            self.wait.wait_until(|| self.target_reached());
        } else {
            let stride = self.format.stride();
            self.wait.wait_until(|| self.ring.occupancy() < stride);
        }
    }

    #[inline]
    pub(crate) fn record_output(&self) {
        self.frames_output.fetch_add(1, Ordering::AcqRel);
        if self.bounded {
            self.remaining.fetch_sub(1, Ordering::AcqRel);
        }
    }

    #[inline]
    pub(crate) fn record_underflow(&self) {
        self.underflows.fetch_add(1, Ordering::AcqRel);
    }
}

/// One playback on one timer and DAC channel set
pub struct StreamSession<P: Platform + 'static> {
    platform: Arc<P>,
    registry: Arc<ResourceRegistry>,
    state: SessionState,
    lease: Option<Lease>,
    handler: Option<HandlerToken>,
    armed: Option<u32>,
}

impl<P: Platform + 'static> StreamSession<P> {
    /// Create an idle session
    pub fn new(platform: Arc<P>, registry: Arc<ResourceRegistry>) -> Self {
        StreamSession {
            platform,
            registry,
            state: SessionState::Idle,
            lease: None,
            handler: None,
            armed: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Play `producer` to completion
    ///
    /// Blocks the caller for the whole playback. Hardware is released before returning,
    /// whether the session succeeded or not.
    pub fn run<R>(mut self, request: &SessionRequest, producer: &mut R) -> Result<PlaybackReport>
    where
        R: Producer + ?Sized,
    {
        match self.drive(request, producer) {
            Ok(report) => {
                if report.underflows > 0 {
                    warn!(
                        underflows = report.underflows,
                        frames = report.frames_output,
                        "playback starved"
                    );
                }
                Ok(report)
            }
            Err(err) => {
                self.teardown();
                self.transition(SessionState::Failed);
                warn!(error = %err, producer = producer.name(), "session failed");
                Err(err)
            }
        }
    }

    fn drive<R>(&mut self, request: &SessionRequest, producer: &mut R) -> Result<PlaybackReport>
    where
        R: Producer + ?Sized,
    {
        let format = self.configure(request)?;
        let ring = producer.prepare(format.stride())?;
        let shared = self.activate(ring, format, producer.target(), request)?;

        producer.run(&shared)?;

        self.transition(SessionState::Draining);
        shared.wait_for_drain();
        // unhooking waits out a tick still inside its dac_write
        self.teardown();
        let report = shared.report();
        self.transition(SessionState::Idle);
        debug!(%report, producer = producer.name(), "session complete");
        Ok(report)
    }

    /// Validate the request, reserve hardware and program the DACs
    pub fn configure(&mut self, request: &SessionRequest) -> Result<FrameFormat> {
        self.transition(SessionState::Configuring);
        let platform = &*self.platform;

        if request.rate == 0 {
            return Err("rate must be > 0".into());
        }
        let dac_count = platform.dac_count().min(u32::BITS);
        if request.channel >= dac_count {
            return Err(format!("no DAC channel {}", request.channel).into());
        }
        let max_channels = (dac_count - request.channel).min(MAX_DAC_CHANNELS as u32);
        let channels = u32::from(request.channel_count);
        if channels == 0 || channels > max_channels {
            return Err(format!("channels must be between 1 and {max_channels}").into());
        }
        if !matches!(request.bytes_per_sample, 1 | 2) {
            return Err(format!(
                "bytes per sample must be 1 or 2, got {}",
                request.bytes_per_sample
            )
            .into());
        }

        let timer = self.select_timer(request)?;
        let mask = ChannelMask::span(request.channel, channels);
        self.lease = Some(self.registry.acquire(timer, mask)?);

        let bits = request
            .dac_bits
            .unwrap_or(u32::from(request.bytes_per_sample) * 8);
        for channel in mask.channels() {
            platform
                .dac_configure(channel, bits, request.dac_options)
                .map_err(|code| DacError::Initialization { what: "DAC", code })?;
        }

        debug!(timer, channels = ?mask, bits, rate = request.rate, "session configured");
        Ok(FrameFormat {
            mask,
            channel_count: request.channel_count,
            bytes_per_sample: request.bytes_per_sample,
            bias: request.bias,
        })
    }

    /// Hook the consumer into the interrupt chain and start the timer
    pub fn activate(
        &mut self,
        ring: SampleRing,
        format: FrameFormat,
        target: FrameTarget,
        request: &SessionRequest,
    ) -> Result<Arc<SessionShared>> {
        let timer = self
            .lease
            .as_ref()
            .map(Lease::timer)
            .ok_or("session activated before configure")?;

        let shared = Arc::new(SessionShared::new(ring, format, timer, target, request.wait));
        let consumer = TimerConsumer::new(Arc::clone(&shared), Arc::clone(&self.platform));
        self.handler = Some(self.platform.interrupts().install(
            InterruptLine::TimerMatch,
            Arc::new(move |resource: u32| consumer.on_tick(resource)),
        ));

        let period_us = MICROS_PER_SECOND / request.rate;
        self.platform
            .timer_arm_periodic(timer, period_us)
            .map_err(|code| DacError::Initialization { what: "timer", code })?;
        self.armed = Some(timer);

        self.transition(SessionState::Active);
        debug!(timer, period_us, ?target, capacity = shared.ring().capacity(), "timer armed");
        Ok(shared)
    }

    fn select_timer(&self, request: &SessionRequest) -> Result<u32> {
        let platform = &*self.platform;
        match request.timer_id {
            Some(timer) if timer >= platform.timer_count() => {
                Err(format!("no timer {timer}").into())
            }
            Some(timer) if !platform.timer_supports_dac(request.channel, timer) => Err(format!(
                "timer {timer} cannot drive DAC channel {}",
                request.channel
            )
            .into()),
            Some(timer) => Ok(timer),
            None => (0..platform.timer_count())
                .find(|&timer| platform.timer_supports_dac(request.channel, timer))
                .ok_or_else(|| {
                    format!("no timer can drive DAC channel {}", request.channel).into()
                }),
        }
    }

    fn teardown(&mut self) {
        if let Some(timer) = self.armed.take() {
            self.platform.timer_disarm(timer);
        }
        if let Some(token) = self.handler.take() {
            self.platform.interrupts().remove(token);
        }
        if let Some(lease) = self.lease.take() {
            debug!(timer = lease.timer(), "resources released");
        }
    }

    fn transition(&mut self, to: SessionState) {
        debug!(from = ?self.state, ?to, "session state");
        self.state = to;
    }
}

impl<P: Platform + 'static> Drop for StreamSession<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}
