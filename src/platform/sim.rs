//! Simulated DAC + timer hardware
//!
//! Runs one ticker thread per armed timer that feeds the shared [`InterruptTable`], and
//! records every DAC configuration and output value so playback can be inspected or
//! exported to a WAV file afterwards.

use super::{ChannelMask, InterruptLine, InterruptTable, Platform};
use crate::Result;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Error code returned when a timer is armed with a zero period
pub const TIMER_ERR_PERIOD: i32 = -2;
/// Error code returned for an unknown timer or DAC id
pub const ERR_NO_SUCH_DEVICE: i32 = -19;
/// Error code returned for bit depths the simulated DAC does not support
pub const DAC_ERR_BITS: i32 = -3;

/// How fast the simulated timers fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickMode {
    /// Sleep one timer period between ticks
    #[default]
    RealTime,
    /// Tick as fast as the OS schedules the ticker thread
    Free,
}

/// One `dac_configure` call as seen by the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DacConfigCall {
    /// Channel configured
    pub channel: u32,
    /// Requested resolution
    pub bits_per_sample: u32,
    /// Opaque option word
    pub options: u32,
}

struct Ticker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Recorder {
    configs: Vec<DacConfigCall>,
    outputs: HashMap<u32, Vec<u16>>,
    writes: usize,
    arms: Vec<(u32, u32)>,
}

#[derive(Default)]
struct Faults {
    dac_configure: Option<i32>,
    timer_arm: Option<i32>,
    unsupported: HashSet<(u32, u32)>,
}

/// Software implementation of [`Platform`]
pub struct SimulatedPlatform {
    dac_count: u32,
    timer_count: u32,
    mode: TickMode,
    interrupts: Arc<InterruptTable>,
    tickers: Mutex<HashMap<u32, Ticker>>,
    recorder: Mutex<Recorder>,
    faults: Mutex<Faults>,
}

impl std::fmt::Debug for SimulatedPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedPlatform")
            .field("dac_count", &self.dac_count)
            .field("timer_count", &self.timer_count)
            .field("mode", &self.mode)
            .finish()
    }
}

impl SimulatedPlatform {
    /// Create a platform with `dac_count` DACs and `timer_count` timers, every timer able
    /// to drive every DAC
    pub fn new(dac_count: u32, timer_count: u32, mode: TickMode) -> Self {
        SimulatedPlatform {
            dac_count,
            timer_count,
            mode,
            interrupts: Arc::new(InterruptTable::new()),
            tickers: Mutex::new(HashMap::new()),
            recorder: Mutex::new(Recorder::default()),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Declare that `timer` cannot pace DAC `channel`
    pub fn set_unsupported(&self, channel: u32, timer: u32) {
        self.faults.lock().unsupported.insert((channel, timer));
    }

    /// Make every following `dac_configure` fail with `code`
    pub fn fail_dac_configure(&self, code: Option<i32>) {
        self.faults.lock().dac_configure = code;
    }

    /// Make every following `timer_arm_periodic` fail with `code`
    pub fn fail_timer_arm(&self, code: Option<i32>) {
        self.faults.lock().timer_arm = code;
    }

    /// Values written to `channel`, oldest first
    pub fn captured(&self, channel: u32) -> Vec<u16> {
        self.recorder
            .lock()
            .outputs
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Most recent value written to `channel`
    pub fn last_value(&self, channel: u32) -> Option<u16> {
        self.recorder
            .lock()
            .outputs
            .get(&channel)
            .and_then(|values| values.last().copied())
    }

    /// Number of `dac_write` calls so far
    pub fn write_count(&self) -> usize {
        self.recorder.lock().writes
    }

    /// Every `dac_configure` call that reached the hardware, in order
    pub fn config_calls(&self) -> Vec<DacConfigCall> {
        self.recorder.lock().configs.clone()
    }

    /// Successful `(timer, period_us)` arm requests, in order
    pub fn arm_log(&self) -> Vec<(u32, u32)> {
        self.recorder.lock().arms.clone()
    }

    /// Whether `timer` is currently firing
    pub fn is_armed(&self, timer: u32) -> bool {
        self.tickers.lock().contains_key(&timer)
    }

    /// Forget everything recorded so far
    pub fn clear_capture(&self) {
        let mut recorder = self.recorder.lock();
        recorder.outputs.clear();
        recorder.writes = 0;
    }

    /// Write the values captured on `channel` to a mono WAV file
    ///
    /// The channel's last configured resolution picks 8- or 16-bit output; DAC codes are
    /// treated as offset binary.
    pub fn export_capture(&self, path: impl AsRef<Path>, channel: u32, sample_rate: u32) -> Result<()> {
        let (bits, values) = {
            let recorder = self.recorder.lock();
            let bits = recorder
                .configs
                .iter()
                .rev()
                .find(|call| call.channel == channel)
                .map_or(8, |call| call.bits_per_sample);
            let values = recorder.outputs.get(&channel).cloned().unwrap_or_default();
            (bits, values)
        };

        let bits_per_sample: u16 = if bits > 8 { 16 } else { 8 };
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path.as_ref(), spec)
            .map_err(|e| std::io::Error::other(format!("Failed to create WAV file: {e}")))?;

        for value in values {
            let written = if bits_per_sample == 8 {
                writer.write_sample((value as u8 as i16 - 128) as i8)
            } else {
                writer.write_sample((value ^ 0x8000) as i16)
            };
            written.map_err(|e| std::io::Error::other(format!("Failed to write sample: {e}")))?;
        }

        writer
            .finalize()
            .map_err(|e| std::io::Error::other(format!("Failed to finalize WAV file: {e}")))?;

        Ok(())
    }

    fn spawn_ticker(&self, timer: u32, period_us: u32) -> Ticker {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let interrupts = Arc::clone(&self.interrupts);
        let mode = self.mode;
        let period = Duration::from_micros(u64::from(period_us));

        let handle = thread::spawn(move || {
            let mut deadline = Instant::now() + period;
            while flag.load(Ordering::Acquire) {
                match mode {
                    TickMode::RealTime => {
                        let now = Instant::now();
                        if deadline > now {
                            thread::sleep(deadline - now);
                        }
                        deadline += period;
                    }
                    TickMode::Free => thread::yield_now(),
                }
                if !flag.load(Ordering::Acquire) {
                    break;
                }
                interrupts.dispatch(InterruptLine::TimerMatch, timer);
            }
        });

        Ticker { running, handle }
    }

    fn stop_ticker(ticker: Ticker) {
        ticker.running.store(false, Ordering::Release);
        // a panicking handler already reported itself; nothing left to stop
        let _ = ticker.handle.join();
    }
}

impl Platform for SimulatedPlatform {
    fn dac_count(&self) -> u32 {
        self.dac_count
    }

    fn timer_count(&self) -> u32 {
        self.timer_count
    }

    fn dac_configure(&self, channel: u32, bits_per_sample: u32, options: u32) -> std::result::Result<(), i32> {
        if channel >= self.dac_count {
            return Err(ERR_NO_SUCH_DEVICE);
        }
        if let Some(code) = self.faults.lock().dac_configure {
            return Err(code);
        }
        if !(1..=16).contains(&bits_per_sample) {
            return Err(DAC_ERR_BITS);
        }
        self.recorder.lock().configs.push(DacConfigCall {
            channel,
            bits_per_sample,
            options,
        });
        Ok(())
    }

    fn dac_write(&self, mask: ChannelMask, values: &[u16]) {
        let mut recorder = self.recorder.lock();
        recorder.writes += 1;
        for (channel, &value) in mask.channels().zip(values) {
            recorder.outputs.entry(channel).or_default().push(value);
        }
    }

    fn timer_arm_periodic(&self, timer: u32, period_us: u32) -> std::result::Result<(), i32> {
        if timer >= self.timer_count {
            return Err(ERR_NO_SUCH_DEVICE);
        }
        if let Some(code) = self.faults.lock().timer_arm {
            return Err(code);
        }
        if period_us == 0 {
            return Err(TIMER_ERR_PERIOD);
        }

        let previous = self.tickers.lock().remove(&timer);
        if let Some(ticker) = previous {
            Self::stop_ticker(ticker);
        }
        let ticker = self.spawn_ticker(timer, period_us);
        self.tickers.lock().insert(timer, ticker);
        self.recorder.lock().arms.push((timer, period_us));
        Ok(())
    }

    fn timer_disarm(&self, timer: u32) {
        let ticker = self.tickers.lock().remove(&timer);
        if let Some(ticker) = ticker {
            Self::stop_ticker(ticker);
        }
    }

    fn timer_supports_dac(&self, channel: u32, timer: u32) -> bool {
        channel < self.dac_count
            && timer < self.timer_count
            && !self.faults.lock().unsupported.contains(&(channel, timer))
    }

    fn interrupts(&self) -> &InterruptTable {
        &self.interrupts
    }
}

impl Drop for SimulatedPlatform {
    fn drop(&mut self) {
        let tickers: Vec<Ticker> = self.tickers.lock().drain().map(|(_, t)| t).collect();
        for ticker in tickers {
            Self::stop_ticker(ticker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Dispatch;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_armed_timer_dispatches_its_id() {
        let platform = SimulatedPlatform::new(2, 2, TickMode::Free);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let token = platform.interrupts().install(
            InterruptLine::TimerMatch,
            Arc::new(move |timer: u32| {
                if timer == 1 {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Dispatch::Handled
                } else {
                    Dispatch::Forward
                }
            }),
        );

        platform.timer_arm_periodic(1, 100).unwrap();
        while hits.load(Ordering::Relaxed) < 10 {
            thread::yield_now();
        }
        platform.timer_disarm(1);
        assert!(!platform.is_armed(1));

        let after = hits.load(Ordering::Relaxed);
        thread::sleep(Duration::from_millis(5));
        assert_eq!(hits.load(Ordering::Relaxed), after);
        platform.interrupts().remove(token);
    }

    #[test]
    fn test_arm_rejects_bad_requests() {
        let platform = SimulatedPlatform::new(1, 1, TickMode::Free);
        assert_eq!(platform.timer_arm_periodic(0, 0), Err(TIMER_ERR_PERIOD));
        assert_eq!(platform.timer_arm_periodic(4, 100), Err(ERR_NO_SUCH_DEVICE));

        platform.fail_timer_arm(Some(-7));
        assert_eq!(platform.timer_arm_periodic(0, 100), Err(-7));
        assert!(platform.arm_log().is_empty());
    }

    #[test]
    fn test_writes_recorded_per_channel() {
        let platform = SimulatedPlatform::new(4, 1, TickMode::Free);
        platform.dac_write(ChannelMask::span(1, 2), &[10, 20]);
        platform.dac_write(ChannelMask::channel(1), &[11]);

        assert_eq!(platform.captured(1), vec![10, 11]);
        assert_eq!(platform.captured(2), vec![20]);
        assert_eq!(platform.last_value(1), Some(11));
        assert_eq!(platform.write_count(), 2);
        assert!(platform.captured(0).is_empty());
    }

    #[test]
    fn test_configure_validation() {
        let platform = SimulatedPlatform::new(2, 1, TickMode::Free);
        assert_eq!(platform.dac_configure(2, 8, 0), Err(ERR_NO_SUCH_DEVICE));
        assert_eq!(platform.dac_configure(0, 24, 0), Err(DAC_ERR_BITS));
        assert!(platform.dac_configure(0, 12, 0).is_ok());
        assert_eq!(
            platform.config_calls(),
            vec![DacConfigCall {
                channel: 0,
                bits_per_sample: 12,
                options: 0
            }]
        );
    }

    #[test]
    fn test_capability_matrix() {
        let platform = SimulatedPlatform::new(2, 3, TickMode::Free);
        platform.set_unsupported(1, 0);
        assert!(platform.timer_supports_dac(0, 0));
        assert!(!platform.timer_supports_dac(1, 0));
        assert!(platform.timer_supports_dac(1, 1));
        assert!(!platform.timer_supports_dac(1, 3));
    }

    #[test]
    fn test_export_capture_roundtrips_through_hound() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.wav");

        let platform = SimulatedPlatform::new(1, 1, TickMode::Free);
        platform.dac_configure(0, 16, 0).unwrap();
        platform.dac_write(ChannelMask::DAC0, &[0x8000]);
        platform.dac_write(ChannelMask::DAC0, &[0x8100]);
        platform.export_capture(&path, 0, 8000).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.spec().bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 0x100]);
    }
}
