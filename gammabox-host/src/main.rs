//! `gammabox` command line tool

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{error, info, warn};

use gammabox_core::config::CalibrationBaseline;
use gammabox_core::input::{HandPressure, PressureFeed};
use gammabox_core::link::LinkState;
use gammabox_core::modulation::{
    ConstantAmplitude, ModulationSource, StepwiseFrequency, StepwisePads, StepwiseWidth,
};
use gammabox_host::config::{
    load_calibration_or_default, load_config, save_calibration, HostConfig,
};
use gammabox_host::feed::OscillatingFeed;
use gammabox_host::scan::find_box;
use gammabox_host::transport::EmulatedBox;
use gammabox_host::{BoxController, HostError};

/// Frame period of the control loop
const FRAME: Duration = Duration::from_millis(10);

/// Interval between status lines while running
const STATUS_INTERVAL_MS: u64 = 5000;

#[derive(Parser)]
#[command(name = "gammabox", version, about = "Drive a gamma box electro-tactile stimulator")]
struct Cli {
    /// Configuration file (defaults to the built-in gammabox.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe serial ports for a gamma box
    Scan,
    /// List configured devices
    Devices,
    /// Stream modulated stimulation from the demo pressure feed
    Run(RunArgs),
    /// Stimulate a single pad
    Pulse(PulseArgs),
    /// Write a calibration file holding the device minimums
    InitCalibration {
        #[arg(long, default_value = "glove")]
        device: String,
        /// Directory for calibration files
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,
        /// Prefix for the file name, e.g. a participant id
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[derive(Args)]
struct Target {
    /// Serial port of the box; scans when omitted
    #[arg(long, conflicts_with = "emulate")]
    port: Option<String>,

    /// Use the in-process emulator instead of hardware
    #[arg(long)]
    emulate: bool,

    /// Device name from the configuration
    #[arg(long, default_value = "glove")]
    device: String,

    /// Calibration file to load
    #[arg(long)]
    calibration: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    target: Target,

    /// Seconds to run; 0 runs until interrupted
    #[arg(long, default_value_t = 10)]
    duration_s: u64,

    /// Period of the demo pressure wave in seconds
    #[arg(long, default_value_t = 3.0)]
    period_s: f32,

    /// Modulation sources to subscribe
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "constant-amplitude,stepwise-pads,stepwise-width,stepwise-frequency"
    )]
    sources: Vec<String>,
}

#[derive(Args)]
struct PulseArgs {
    #[command(flatten)]
    target: Target,

    /// Pad number, starting at 1
    #[arg(long)]
    pad: usize,

    #[arg(long)]
    amp: f32,

    /// Pulse width in microseconds
    #[arg(long)]
    width: u32,

    /// How long to hold the pulse before switching off
    #[arg(long, default_value_t = 500)]
    hold_ms: u64,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), HostError> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan => {
            match find_box(&config.serial)? {
                Some(port) => println!("{}", port),
                None => warn!("No gamma box found"),
            }
            Ok(())
        }
        Commands::Devices => {
            for device in config.devices.iter() {
                println!(
                    "{:<12} {:>2} pads  amp {}-{}  width {}-{}us  freq {}-{}Hz (base {})",
                    device.device_name(),
                    device.num_pads(),
                    device.min_amp(),
                    device.max_amp(),
                    device.min_width(),
                    device.max_width(),
                    device.min_freq(),
                    device.max_freq(),
                    device.base_freq()
                );
            }
            Ok(())
        }
        Commands::Run(args) => run_feed(&config, args),
        Commands::Pulse(args) => pulse(&config, args),
        Commands::InitCalibration {
            device,
            data_dir,
            prefix,
        } => {
            let device = config.device(&device)?;
            let baseline = CalibrationBaseline::for_device(device);
            let path = save_calibration(&data_dir, prefix.as_deref(), device, &baseline)?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

/// Built-in modulation source by name
fn source(name: &str) -> Option<Box<dyn ModulationSource>> {
    match name {
        ConstantAmplitude::NAME => Some(Box::new(ConstantAmplitude)),
        StepwisePads::NAME => Some(Box::new(StepwisePads)),
        StepwiseWidth::NAME => Some(Box::new(StepwiseWidth)),
        StepwiseFrequency::NAME => Some(Box::new(StepwiseFrequency)),
        _ => None,
    }
}

/// Build a controller for `target` and start connecting
fn open(config: &HostConfig, target: &Target, clock: &Clock) -> Result<BoxController, HostError> {
    let device = config.device(&target.device)?.clone();
    let baseline = load_calibration_or_default(target.calibration.as_deref(), &device);
    let mut controller = BoxController::new(device, config.controller, baseline)?;

    if target.emulate {
        controller.connect(Box::new(EmulatedBox::new()), clock.now_ms())?;
        return Ok(controller);
    }

    let port = match &target.port {
        Some(port) => port.clone(),
        None => find_box(&config.serial)?.ok_or(HostError::NoBoxFound)?,
    };
    controller.open_serial(&port, &config.serial, clock.now_ms())?;
    Ok(controller)
}

/// Run frames until the box is connected or the handshake gives up
fn wait_connected(
    controller: &mut BoxController,
    clock: &Clock,
    feed: &mut dyn PressureFeed,
) -> Result<(), HostError> {
    while !controller.is_connected() {
        if controller.link_state() == LinkState::Disconnected {
            let port = controller.snapshot(clock.now_ms()).port.unwrap_or_default();
            return Err(HostError::NoGreeting(port));
        }
        let now = clock.now_ms();
        controller.update(now, &feed.sample(now));
        thread::sleep(FRAME);
    }
    Ok(())
}

fn run_feed(config: &HostConfig, args: RunArgs) -> Result<(), HostError> {
    let clock = Clock::start();
    let mut controller = open(config, &args.target, &clock)?;

    for name in &args.sources {
        match source(name) {
            // Rejections are logged by the controller
            Some(source) => {
                let _ = controller.subscribe(source);
            }
            None => warn!("Unknown modulation source '{}'", name),
        }
    }

    let mut feed = OscillatingFeed::new((args.period_s.max(0.1) * 1000.0) as u64).staggered(0.1);
    // The demo feed produces data from the first frame
    controller.hand_tracking_signal().signal(());

    wait_connected(&mut controller, &clock, &mut feed)?;

    let deadline = (args.duration_s > 0).then(|| clock.now_ms() + args.duration_s * 1000);
    let mut next_status = 0;
    loop {
        let now = clock.now_ms();
        if deadline.is_some_and(|d| now >= d) {
            break;
        }
        let pressure: HandPressure = feed.sample(now);
        controller.update(now, &pressure);

        if !controller.is_transport_open() {
            controller.shutdown();
            return Err(HostError::closed("gamma box link"));
        }
        if now >= next_status {
            report(&controller, now);
            next_status = now + STATUS_INTERVAL_MS;
        }
        thread::sleep(FRAME);
    }

    info!(
        "Done; {} message(s) dropped on a full queue",
        controller.dropped_messages()
    );
    controller.shutdown();
    Ok(())
}

fn pulse(config: &HostConfig, args: PulseArgs) -> Result<(), HostError> {
    let clock = Clock::start();
    let mut controller = open(config, &args.target, &clock)?;
    let mut feed = Idle;
    wait_connected(&mut controller, &clock, &mut feed)?;

    controller.set_stimulation(true)?;
    controller.pulse_pad(args.pad.saturating_sub(1), args.amp, args.width)?;

    let until = clock.now_ms() + args.hold_ms;
    while clock.now_ms() < until || controller.pending_messages() > 0 {
        let now = clock.now_ms();
        controller.update(now, &HandPressure::idle());
        if !controller.is_transport_open() {
            return Err(HostError::closed("gamma box link"));
        }
        thread::sleep(FRAME);
    }
    controller.shutdown();
    Ok(())
}

fn report(controller: &BoxController, now_ms: u64) {
    let s = controller.snapshot(now_ms);
    let age = s
        .telemetry_age
        .map(|age| age.to_string())
        .unwrap_or_else(|| "never".into());
    info!(
        "{} {:?} | battery {}% {}V {}A {}C ({}) | link {} | queue {}",
        s.port.as_deref().unwrap_or("-"),
        s.state,
        s.battery.as_deref().unwrap_or("?"),
        s.voltage.as_deref().unwrap_or("?"),
        s.current.as_deref().unwrap_or("?"),
        s.temperature.as_deref().unwrap_or("?"),
        age,
        if s.link_healthy { "ok" } else { "silent" },
        controller.pending_messages()
    );
}

/// Feed with no hand data
struct Idle;

impl PressureFeed for Idle {
    fn sample(&mut self, _now_ms: u64) -> HandPressure {
        HandPressure::idle()
    }
}

/// Milliseconds since the command started
struct Clock(Instant);

impl Clock {
    fn start() -> Self {
        Self(Instant::now())
    }

    fn now_ms(&self) -> u64 {
        self.0.elapsed().as_millis() as u64
    }
}
