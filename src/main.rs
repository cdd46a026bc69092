#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!(
        "The dacstream CLI requires the \"cli\" feature. Rebuild with `--features cli` to enable playback."
    );
}

#[cfg(feature = "cli")]
mod cli {
    use std::env;
    use std::sync::Arc;
    use std::time::Instant;

    use anyhow::{bail, Context, Result};
    use dacstream::config::MAX_DAC_CHANNELS;
    use dacstream::platform::{SimulatedPlatform, TickMode};
    use dacstream::{wav, ControllerConfig, DacController};
    use tracing_subscriber::EnvFilter;

    const SIMULATED_TIMERS: u32 = 4;

    /// Parsed command-line arguments.
    #[derive(Debug, Default)]
    struct CliArgs {
        file_path: Option<String>,
        dac: u32,
        timer: Option<u32>,
        buffer: Option<usize>,
        config_path: Option<String>,
        capture_path: Option<String>,
        free_run: bool,
        show_help: bool,
    }

    impl CliArgs {
        fn parse() -> Result<Self> {
            let mut args = Self::default();
            let mut iter = env::args().skip(1);

            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--help" | "-h" => args.show_help = true,
                    "--free-run" => args.free_run = true,
                    "--dac" => args.dac = number(&arg, iter.next())?,
                    "--timer" => args.timer = Some(number(&arg, iter.next())?),
                    "--buffer" => args.buffer = Some(number(&arg, iter.next())?),
                    "--config" => args.config_path = Some(value(&arg, iter.next())?),
                    "--capture" => args.capture_path = Some(value(&arg, iter.next())?),
                    _ if arg.starts_with('-') => {
                        eprintln!("Unknown flag: {}", arg);
                        args.show_help = true;
                    }
                    _ => args.file_path = Some(arg),
                }
            }

            Ok(args)
        }

        fn print_help() {
            eprintln!(
                "Usage:\n  dacstream <file.wav> [options]\n\n\
                 Options:\n\
                 \x20 --dac <N>           First DAC channel (default 0)\n\
                 \x20 --timer <N>         Timer driving playback (default: first suitable)\n\
                 \x20 --buffer <BYTES>    Ring buffer size (default from config, 1024)\n\
                 \x20 --config <FILE>     JSON controller configuration\n\
                 \x20 --capture <FILE>    Write the first channel's DAC output to a WAV file\n\
                 \x20 --free-run          Tick timers as fast as possible instead of in real time\n\
                 \x20 -h, --help          Show this help\n\n\
                 Environment:\n\
                 \x20 RUST_LOG            Log filter, e.g. RUST_LOG=dacstream=debug\n"
            );
        }
    }

    fn value(flag: &str, next: Option<String>) -> Result<String> {
        next.with_context(|| format!("{flag} requires an argument"))
    }

    fn number<T: std::str::FromStr>(flag: &str, next: Option<String>) -> Result<T> {
        let raw = value(flag, next)?;
        raw.parse()
            .ok()
            .with_context(|| format!("{flag}: '{raw}' is not a valid number"))
    }

    pub fn run() -> Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();

        let args = CliArgs::parse()?;
        if args.show_help {
            CliArgs::print_help();
            return Ok(());
        }
        let Some(path) = args.file_path.as_deref() else {
            CliArgs::print_help();
            bail!("no sound file given");
        };

        let config = match &args.config_path {
            Some(config_path) => ControllerConfig::load(config_path)
                .with_context(|| format!("loading configuration '{config_path}'"))?,
            None => ControllerConfig::default(),
        };

        let descriptor = *wav::open(path)
            .with_context(|| format!("opening '{path}'"))?
            .descriptor();
        println!(
            "{path}: {} Hz, {} channel(s), {}-bit, {} frames",
            descriptor.sample_rate,
            descriptor.channel_count,
            descriptor.bits_per_sample,
            descriptor.frame_count()
        );

        let mode = if args.free_run {
            TickMode::Free
        } else {
            TickMode::RealTime
        };
        let platform = Arc::new(SimulatedPlatform::new(
            MAX_DAC_CHANNELS as u32,
            SIMULATED_TIMERS,
            mode,
        ));
        let dac = DacController::with_config(Arc::clone(&platform), config);

        let started = Instant::now();
        let report = dac
            .play_sound_file(args.dac, path, args.timer, args.buffer)
            .with_context(|| format!("playing '{path}'"))?;
        println!("{report} in {:.2?}", started.elapsed());

        if let Some(capture) = &args.capture_path {
            platform
                .export_capture(capture, args.dac, descriptor.sample_rate)
                .with_context(|| format!("writing capture '{capture}'"))?;
            println!("DAC {} output written to {capture}", args.dac);
        }

        Ok(())
    }
}

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::run()
}
