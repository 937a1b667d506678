use osmodump_engine::device::{Backend, DeviceRegistry, SimulatedRegistry, ToneSpec};
use osmodump_engine::{CancelContext, CancelFlag, Engine};
use osmodump_messages::{
    AcquisitionConfig, AcquisitionState, DEFAULT_BUF_LENGTH, DEFAULT_SAMPLE_RATE, DeviceConfig,
    Event, Hertz, OutputTarget, TenthsDb, TransferMode,
};

use anyhow::{Context, anyhow, bail};
use clap::Parser;
use log::{LevelFilter, debug, error, info, warn};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

/// Dump raw I/Q samples from an OsmoSDR receiver to a file or stdout.
#[derive(Parser, Debug)]
#[command(name = "osmodump", version)]
struct Args {
    /// Device index
    #[arg(short = 'd', value_name = "device_index", default_value_t = 0)]
    device_index: u32,

    /// Frequency to tune to [Hz]
    #[arg(short = 'f', value_name = "frequency", value_parser = parse_number)]
    frequency: u32,

    /// Gain in tenths of a dB (0 for auto)
    #[arg(
        short = 'g',
        value_name = "gain",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    gain: i32,

    /// Sample rate [Hz]
    #[arg(short = 's', value_name = "samplerate", default_value_t = DEFAULT_SAMPLE_RATE, value_parser = parse_number)]
    sample_rate: u32,

    /// Output block size [bytes]
    #[arg(short = 'b', value_name = "output_block_size", default_value_t = DEFAULT_BUF_LENGTH, value_parser = parse_number)]
    block_size: u32,

    /// Force sync output (default: async)
    #[arg(short = 'S')]
    sync: bool,

    /// Expose a raw capture file as an extra device (repeatable)
    #[arg(long, value_name = "PATH")]
    replay: Vec<PathBuf>,

    /// Offset of the simulated tone from the center frequency [Hz]
    #[arg(
        long,
        value_name = "HZ",
        default_value_t = 10_000.0,
        allow_negative_numbers = true
    )]
    tone_offset: f32,

    /// Output file ('-' dumps samples to stdout)
    filename: String,
}

/// Parse a non-negative integer, also accepting float notation such as
/// `433.92e6`. Fractions are truncated.
fn parse_number(s: &str) -> Result<u32, String> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", s))?;
    if !(0.0..=u32::MAX as f64).contains(&value) {
        return Err(format!("{} is out of range", s));
    }
    Ok(value as u32)
}

impl Args {
    fn acquisition_config(&self) -> AcquisitionConfig {
        let device = DeviceConfig {
            sample_rate: Hertz(self.sample_rate),
            center_frequency: Hertz(self.frequency),
            gain: Some(TenthsDb(self.gain)),
            block_size: self.block_size,
        };
        let mode = if self.sync {
            TransferMode::Sync
        } else {
            TransferMode::Async
        };
        AcquisitionConfig::new(device, mode, OutputTarget::from_name(&self.filename))
    }

    fn registry(&self) -> SimulatedRegistry {
        let tone = Backend::Tone(ToneSpec {
            offset_hz: self.tone_offset,
            ..ToneSpec::default()
        });
        let backends = std::iter::once(tone)
            .chain(self.replay.iter().cloned().map(Backend::Replay))
            .collect();
        SimulatedRegistry::new(backends)
    }
}

fn init_logger() {
    env_logger::builder()
        .format(|buf, record| {
            writeln!(
                buf,
                "{:<5} {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .filter_module("osmodump_engine::device", LevelFilter::Warn)
        .parse_default_env()
        .init();
}

fn log_event(event: Event) {
    match event {
        Event::StateSnapshot(state) => {
            info!(
                "Streaming {} at {} ({:?} mode, {} byte blocks, gain {})",
                state.center_frequency, state.sample_rate, state.mode, state.block_size, state.gain
            );
            if state.negotiation_warnings > 0 {
                warn!(
                    "{} parameter(s) were not accepted by the device",
                    state.negotiation_warnings
                );
            }
        }
        Event::State(AcquisitionState::Stopped(reason)) => debug!("stopped: {:?}", reason),
        Event::State(state) => debug!("state: {:?}", state),
    }
}

/// ctrlc covers SIGINT, SIGTERM and SIGHUP; SIGQUIT takes the same path.
#[cfg(unix)]
fn forward_quit(cancel_context: CancelContext) -> anyhow::Result<()> {
    use signal_hook::consts::SIGQUIT;
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGQUIT]).context("Failed to set SIGQUIT handler")?;
    thread::spawn(move || {
        for signal in signals.forever() {
            debug!("received signal {}", signal);
            cancel_context.trigger();
        }
    });
    Ok(())
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let registry = args.registry();

    let device_count = registry.count();
    if device_count == 0 {
        bail!("No supported devices found.");
    }
    info!("Found {} device(s):", device_count);
    for index in 0..device_count {
        match registry.usb_strings(index) {
            Ok(strings) => info!("  {}:  {}", index, strings),
            Err(e) => warn!("  {}:  failed to read usb strings: {}", index, e),
        }
    }
    info!(
        "Using device {}: {}",
        args.device_index,
        registry.name(args.device_index).unwrap_or_default()
    );

    let device = registry
        .open(args.device_index)
        .with_context(|| format!("Failed to open osmosdr device #{}.", args.device_index))?;

    // Create flume channel for engine events
    let (event_tx, event_rx) = flume::unbounded();

    let engine = Engine::new(
        device,
        args.acquisition_config(),
        CancelFlag::new(),
        event_tx,
    );

    let cancel_context = engine.cancel_context();
    #[cfg(unix)]
    forward_quit(cancel_context.clone())?;
    ctrlc::set_handler(move || {
        cancel_context.trigger();
    })
    .context("Failed to set signal handler")?;

    // Spawn engine thread
    let engine_handle = thread::spawn(move || engine.run());

    // Drain events until the engine drops its sender
    for event in event_rx.iter() {
        log_event(event);
    }

    let reason = engine_handle
        .join()
        .map_err(|_| anyhow!("Engine thread panicked"))??;

    let code = reason.exit_code().clamp(0, u8::MAX as i32) as u8;
    Ok(ExitCode::from(code))
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        // --help and --version
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    init_logger();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_accepts_float_notation() {
        assert_eq!(parse_number("433.92e6"), Ok(433_920_000));
        assert_eq!(parse_number("500000"), Ok(500_000));
        assert_eq!(parse_number("2048000.9"), Ok(2_048_000));
        assert!(parse_number("-5").is_err());
        assert!(parse_number("5e10").is_err());
        assert!(parse_number("fast").is_err());
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["osmodump", "-f", "100e6", "out.bin"]).unwrap();
        let config = args.acquisition_config();
        assert_eq!(config.device.sample_rate, Hertz(500_000));
        assert_eq!(config.device.block_size, 262_144);
        assert_eq!(config.device.center_frequency, Hertz(100_000_000));
        assert_eq!(config.mode, TransferMode::Async);
        assert_eq!(config.output, OutputTarget::File(PathBuf::from("out.bin")));
        assert_eq!(args.device_index, 0);
    }

    #[test]
    fn test_sync_stdout_and_gain() {
        let args =
            Args::try_parse_from(["osmodump", "-S", "-g", "-10", "-f", "433920000", "-"]).unwrap();
        let config = args.acquisition_config();
        assert_eq!(config.mode, TransferMode::Sync);
        assert_eq!(config.output, OutputTarget::Stdout);
        assert_eq!(config.device.gain, Some(TenthsDb(-10)));
    }

    #[test]
    fn test_missing_frequency_or_output_is_a_usage_error() {
        assert!(Args::try_parse_from(["osmodump", "out.bin"]).is_err());
        assert!(Args::try_parse_from(["osmodump", "-f", "100e6"]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_sigquit_stops_a_running_engine() {
        use osmodump_engine::SinkWriter;
        use osmodump_messages::StopReason;
        use std::time::Duration;

        let registry = SimulatedRegistry::default();
        let device = registry.open(0).unwrap();
        let args = Args::try_parse_from(["osmodump", "-f", "100e6", "-"]).unwrap();
        let (event_tx, _event_rx) = flume::unbounded();
        let flag = CancelFlag::new();
        let engine = Engine::new(device, args.acquisition_config(), flag.clone(), event_tx);
        forward_quit(engine.cancel_context()).unwrap();

        let sink = SinkWriter::from_writer(std::io::sink(), "discard");
        let handle = thread::spawn(move || engine.run_with_sink(sink));
        thread::sleep(Duration::from_millis(200));
        signal_hook::low_level::raise(signal_hook::consts::SIGQUIT).unwrap();

        assert_eq!(handle.join().unwrap(), StopReason::UserCancel);
        assert!(flag.is_set());
    }

    #[test]
    fn test_replay_adds_devices() {
        let args = Args::try_parse_from([
            "osmodump",
            "-f",
            "100e6",
            "--replay",
            "a.bin",
            "--replay",
            "b.bin",
            "out.bin",
        ])
        .unwrap();
        let registry = args.registry();
        assert_eq!(registry.count(), 3);
        assert_eq!(
            registry.backends()[2],
            Backend::Replay(PathBuf::from("b.bin"))
        );
    }
}
