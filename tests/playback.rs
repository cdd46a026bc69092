//! Integration tests for interrupt-driven playback
//!
//! These tests run complete sessions on the simulated platform and check what reached
//! the DACs, how sessions contend for timers and channels, and that every exit path
//! leaves the hardware released.

#![cfg(feature = "simulator")]

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dacstream::platform::{InterruptLine, InterruptTable, SimulatedPlatform, TickMode};
use dacstream::{
    ChannelMask, ControllerConfig, DacController, DacError, Platform, Resource, StreamOptions,
    WaitStrategy,
};

fn controller(mode: TickMode) -> DacController<SimulatedPlatform> {
    let config = ControllerConfig {
        wait: WaitStrategy::Yield,
        ..ControllerConfig::default()
    };
    DacController::with_config(Arc::new(SimulatedPlatform::new(2, 4, mode)), config)
}

fn assert_released(dac: &DacController<SimulatedPlatform>) {
    let platform = dac.platform();
    for timer in 0..platform.timer_count() {
        assert!(!platform.is_armed(timer), "timer {timer} still armed");
        assert!(!dac.registry().timer_busy(timer), "timer {timer} still leased");
    }
    assert_eq!(platform.interrupts().depth(InterruptLine::TimerMatch), 0);
}

/// Simulator whose DAC writes take a while, so a tick is still running when the ring
/// reports empty
struct SlowDac(SimulatedPlatform);

impl Platform for SlowDac {
    fn dac_count(&self) -> u32 {
        self.0.dac_count()
    }

    fn timer_count(&self) -> u32 {
        self.0.timer_count()
    }

    fn dac_configure(&self, channel: u32, bits_per_sample: u32, options: u32) -> Result<(), i32> {
        self.0.dac_configure(channel, bits_per_sample, options)
    }

    fn dac_write(&self, mask: ChannelMask, values: &[u16]) {
        thread::sleep(Duration::from_millis(2));
        self.0.dac_write(mask, values);
    }

    fn timer_arm_periodic(&self, timer: u32, period_us: u32) -> Result<(), i32> {
        self.0.timer_arm_periodic(timer, period_us)
    }

    fn timer_disarm(&self, timer: u32) {
        self.0.timer_disarm(timer);
    }

    fn timer_supports_dac(&self, channel: u32, timer: u32) -> bool {
        self.0.timer_supports_dac(channel, timer)
    }

    fn interrupts(&self) -> &InterruptTable {
        self.0.interrupts()
    }
}

fn slow_controller() -> DacController<SlowDac> {
    let config = ControllerConfig {
        wait: WaitStrategy::Yield,
        ..ControllerConfig::default()
    };
    let platform = SlowDac(SimulatedPlatform::new(2, 2, TickMode::Free));
    DacController::with_config(Arc::new(platform), config)
}

#[test]
fn test_list_plays_in_real_time() {
    let dac = controller(TickMode::RealTime);
    let started = Instant::now();
    let report = dac
        .play_from_list(0, &[10, 20, 30], 1000, &StreamOptions::new().bytes_per_sample(1))
        .unwrap();

    assert_eq!(report.frames_output, 3);
    assert_eq!(report.underflows, 0, "list data was never late");
    assert_eq!(dac.platform().captured(0), vec![10, 20, 30]);
    assert!(started.elapsed() >= Duration::from_millis(3));
    assert_eq!(dac.platform().arm_log(), vec![(0, 1000)]);
    assert_released(&dac);
}

#[test]
fn test_list_bias_and_sixteen_bit() {
    let dac = controller(TickMode::Free);
    let opts = StreamOptions::new().bytes_per_sample(2).bias(0x8000);
    let report = dac.play_from_list(1, &[0x0000, 0x7FFF, 0xFFFF], 8000, &opts).unwrap();

    assert_eq!(report.frames_output, 3);
    assert_eq!(dac.platform().captured(1), vec![0x8000, 0xFFFF, 0x7FFF]);
    let calls = dac.platform().config_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].bits_per_sample, 16);
}

#[test]
fn test_stream_chunks_play_in_order() {
    let dac = controller(TickMode::Free);
    let mut chunks = vec![b"AB".to_vec(), b"CD".to_vec()].into_iter();
    let report = dac
        .play_from_stream(0, move || chunks.next(), 2000, &StreamOptions::new())
        .unwrap();

    assert_eq!(report.frames_output, 4);
    let expected: Vec<u16> = b"ABCD".iter().map(|&b| u16::from(b)).collect();
    assert_eq!(dac.platform().captured(0), expected);
    assert_released(&dac);
}

#[test]
fn test_unbounded_report_counts_last_frame() {
    let dac = slow_controller();
    let report = dac
        .play_from_buffer(0, &[1, 2, 3, 4], 1000, &StreamOptions::new(), None, None)
        .unwrap();
    assert_eq!(report.frames_output, 4);
    assert_eq!(dac.platform().0.captured(0), vec![1, 2, 3, 4]);

    dac.platform().0.clear_capture();
    let mut chunks = vec![b"AB".to_vec(), b"CD".to_vec()].into_iter();
    let report = dac
        .play_from_stream(0, move || chunks.next(), 1000, &StreamOptions::new())
        .unwrap();
    assert_eq!(report.frames_output, 4);
    let expected: Vec<u16> = b"ABCD".iter().map(|&b| u16::from(b)).collect();
    assert_eq!(dac.platform().0.captured(0), expected);
}

#[test]
fn test_empty_stream_outputs_nothing() {
    let dac = controller(TickMode::Free);
    let report = dac
        .play_from_stream(0, || None, 2000, &StreamOptions::new())
        .unwrap();
    assert_eq!(report.frames_output, 0);
    assert!(dac.platform().captured(0).is_empty());
    assert_released(&dac);
}

#[test]
fn test_stereo_buffer_single_write_per_frame() {
    let dac = controller(TickMode::Free);
    let opts = StreamOptions::new().channels(2);
    let report = dac
        .play_from_buffer(0, &[1, 2, 3, 4, 5, 6], 4000, &opts, None, None)
        .unwrap();

    assert_eq!(report.frames_output, 3);
    assert_eq!(dac.platform().captured(0), vec![1, 3, 5]);
    assert_eq!(dac.platform().captured(1), vec![2, 4, 6]);
    assert_eq!(dac.platform().write_count(), 3);
}

#[test]
fn test_busy_resources_conflict() {
    let dac = Arc::new(controller(TickMode::RealTime));
    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    tx.send(b"WXYZ".to_vec()).unwrap();

    let first = {
        let dac = Arc::clone(&dac);
        thread::spawn(move || {
            // blocks until the test hangs up
            dac.play_from_stream(0, move || rx.recv().ok(), 1000, &StreamOptions::new())
        })
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while !dac.registry().timer_busy(0) {
        assert!(Instant::now() < deadline, "first session never started");
        thread::yield_now();
    }

    let same_timer = StreamOptions::new().timer(0);
    assert!(matches!(
        dac.play_from_list(1, &[1], 1000, &same_timer),
        Err(DacError::ResourceConflict(Resource::Timer(0)))
    ));

    let same_channel = StreamOptions::new().timer(1);
    assert!(matches!(
        dac.play_from_list(0, &[1], 1000, &same_channel),
        Err(DacError::ResourceConflict(Resource::DacChannel(0)))
    ));
    assert!(matches!(
        dac.write_single_sample(0, 99),
        Err(DacError::ResourceConflict(Resource::DacChannel(0)))
    ));

    // a disjoint session runs alongside
    let report = dac.play_from_list(1, &[7, 8], 1000, &same_channel).unwrap();
    assert_eq!(report.frames_output, 2);
    assert_eq!(dac.platform().captured(1), vec![7, 8]);

    drop(tx);
    let report = first.join().unwrap().unwrap();
    assert_eq!(report.frames_output, 4);
    let expected: Vec<u16> = b"WXYZ".iter().map(|&b| u16::from(b)).collect();
    assert_eq!(dac.platform().captured(0), expected);
    assert_released(&dac);
}

#[test]
fn test_setup_failures_release_everything() {
    let dac = controller(TickMode::Free);

    dac.platform().fail_timer_arm(Some(-7));
    let err = dac
        .play_from_list(0, &[1, 2], 1000, &StreamOptions::new())
        .unwrap_err();
    assert!(matches!(err, DacError::Initialization { what: "timer", code: -7 }));
    assert_released(&dac);

    dac.platform().fail_timer_arm(None);
    let err = dac
        .play_from_buffer(0, &[1, 2], 1000, &StreamOptions::new(), Some(5), None)
        .unwrap_err();
    assert!(matches!(err, DacError::InvalidArgument(_)));
    assert_released(&dac);

    // nothing leaked: the same resources are usable again
    let report = dac.play_from_list(0, &[1, 2], 1000, &StreamOptions::new()).unwrap();
    assert_eq!(report.frames_output, 2);
}

#[test]
fn test_foreign_handler_keeps_receiving_ticks() {
    use dacstream::platform::Dispatch;
    use std::sync::atomic::{AtomicU64, Ordering};

    let dac = controller(TickMode::Free);
    let platform = Arc::clone(dac.platform());
    let foreign_ticks = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&foreign_ticks);
    let token = platform.interrupts().install(
        InterruptLine::TimerMatch,
        Arc::new(move |_timer: u32| {
            counter.fetch_add(1, Ordering::Relaxed);
            Dispatch::Handled
        }),
    );

    // ticks of a timer the session does not own pass through its consumer
    platform.timer_arm_periodic(3, 100).unwrap();
    let report = dac.play_from_list(0, &[1, 2, 3], 1000, &StreamOptions::new()).unwrap();
    assert_eq!(report.frames_output, 3);

    let deadline = Instant::now() + Duration::from_secs(5);
    while foreign_ticks.load(Ordering::Relaxed) == 0 {
        assert!(Instant::now() < deadline, "timer 3 ticks never forwarded");
        thread::yield_now();
    }
    platform.timer_disarm(3);
    assert!(platform.interrupts().remove(token));
    assert_eq!(platform.interrupts().depth(InterruptLine::TimerMatch), 0);
}
