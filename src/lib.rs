//! Interrupt-driven DAC sample streaming
//!
//! Plays sample data on DAC output channels at a fixed rate. A hardware timer fires once
//! per frame; its interrupt handler pops the next frame from a lock-free ring and writes it
//! to the DAC, while the caller keeps the ring topped up from a list of values, a byte
//! buffer, a pull callback or a PCM WAV file.
//!
//! # Features
//! - Single-producer/single-consumer byte ring, safe between interrupt and thread context
//! - Chained timer-match interrupt handlers with token-based removal
//! - Exclusive leasing of timers and DAC channels across concurrent sessions
//! - Multi-channel frames with 8- or 16-bit little-endian samples and a per-session bias
//! - RIFF/WAVE header validation before any hardware is touched
//!
//! # Crate feature flags
//! - `simulator` (default): software timers and a recording DAC (`platform::sim`)
//! - `sound-file` (default): WAV parsing and file playback (`wav`, `FileAdapter`)
//! - `cli` (opt-in): the `dacstream` command-line player
//!
//! # Quick start
//! ```no_run
//! # #[cfg(feature = "simulator")]
//! # {
//! use std::sync::Arc;
//! use dacstream::platform::{SimulatedPlatform, TickMode};
//! use dacstream::{DacController, StreamOptions};
//!
//! let platform = Arc::new(SimulatedPlatform::new(2, 4, TickMode::RealTime));
//! let dac = DacController::new(Arc::clone(&platform));
//! let report = dac
//!     .play_from_list(0, &[10, 20, 30], 1000, &StreamOptions::new())
//!     .unwrap();
//! assert_eq!(report.frames_output, 3);
//! assert_eq!(platform.captured(0), vec![10, 20, 30]);
//! # }
//! ```
//!
//! ## Sound file
//! ```no_run
//! # #[cfg(all(feature = "simulator", feature = "sound-file"))]
//! # {
//! use std::sync::Arc;
//! use dacstream::platform::{SimulatedPlatform, TickMode};
//! use dacstream::DacController;
//!
//! let platform = Arc::new(SimulatedPlatform::new(2, 4, TickMode::RealTime));
//! let dac = DacController::new(platform);
//! let report = dac.play_sound_file(0, "speech.wav", None, None).unwrap();
//! println!("{report}");
//! # }
//! ```

#![warn(missing_docs)]

pub mod config; // Buffer sizing & per-call options
pub mod controller; // Public DAC operations
pub mod error; // Error types
pub mod platform; // Hardware abstraction
pub mod producer; // Ring producers per source kind
pub mod resources; // Timer & channel ownership
pub mod streaming; // Ring, consumer, session lifecycle
#[cfg(feature = "sound-file")]
pub mod wav; // WAV header parsing & loading

pub use config::{ControllerConfig, StreamOptions, WaitStrategy};
pub use controller::DacController;
pub use error::{DacError, FormatError, Resource, Result};
pub use platform::{ChannelMask, Platform};
pub use streaming::{FrameTarget, PlaybackReport, SampleRing, SessionState, StreamSession};
#[cfg(feature = "sound-file")]
pub use wav::{SoundFile, WavDescriptor};
