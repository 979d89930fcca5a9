//! jigctl - test-jig controller
//!
//! Usage:
//!   jigctl                                  # Run the jig (console panel)
//!   jigctl --simulate-device                # Dry run against a simulated device
//!   jigctl --serve --addr 0.0.0.0:3000      # Also expose the status API
//!   jigctl --config jig.json --print-config # Show the effective configuration

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use jigctl::config::JigConfig;
use jigctl::core::{
    run_server, ApiState, DebouncedPresenceMonitor, Feedback, JigController, LatestValueMailbox,
    RunSupervisor,
};
use jigctl::hardware::firmware::{device_firmware_version, FirmwareCache, UsbMassStorageFlasher};
use jigctl::hardware::midi::RawMidiBus;
use jigctl::hardware::sim::{spawn_keyboard_lever, SimFlasher, SimMidiBus, SimPanel, SimTelemetrySource};
use jigctl::hardware::{FirmwareFlasher, MidiBus};
use jigctl::logging::init_logging;
use jigctl::stages::{build_pipeline, JigHardware, JigSession, MidiSession, SerialLink};
use jigctl::types::TelemetrySample;
use jigctl::{JigError, SCREEN_COLUMNS, UNKNOWN_DEVICE_FIRMWARE, VERSION};

#[derive(Parser, Debug)]
#[command(
    name = "jigctl",
    version = VERSION,
    about = "Test-jig controller - debounced presence, supervised test runs, operator feedback",
    long_about = "Waits for a device to be seated, runs the test pipeline under a hard\n\
                  time budget, shows TEST COMPLETE or ERROR NN and re-arms once the\n\
                  device is removed.\n\n\
                  Result codes:\n  \
                  0      - Success\n  \
                  1..8   - Stage failed (firmware, MIDI, LEDs, serial, sensors)\n  \
                  9      - Lever released mid-run\n  \
                  10     - Time budget exceeded\n  \
                  -1     - Internal fault\n\n\
                  Panel (lever, LCD, RGB) runs on the console: type i / r / Enter."
)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Max seconds per test run
    #[arg(long, env = "JIG_MAX_TEST_TIME")]
    max_test_time: Option<u64>,

    /// Debounce re-sample interval (ms)
    #[arg(long, env = "JIG_DEBOUNCE_MS")]
    debounce_ms: Option<u64>,

    /// Debounce re-samples that must agree
    #[arg(long, env = "JIG_DEBOUNCE_COUNT")]
    debounce_count: Option<u32>,

    /// Directory holding firmware artifacts
    #[arg(long, env = "JIG_FIRMWARE_DIR")]
    firmware_dir: Option<PathBuf>,

    /// Serial device carrying the device logs
    #[arg(long, env = "JIG_SERIAL_PORT")]
    serial_port: Option<PathBuf>,

    /// Directory for session log files
    #[arg(long, env = "JIG_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Simulate the device under test (MIDI, flashing, serial)
    #[arg(long)]
    simulate_device: bool,

    /// Run the status API alongside the jig
    #[arg(short, long)]
    serve: bool,

    /// Server address (default: 127.0.0.1:3000)
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match effective_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    if args.print_config {
        match config.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to render configuration: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if args.no_color {
        colored::control::set_override(false);
    }

    let guard = match init_logging(&config.log_dir, !args.no_color) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging in {}: {}", config.log_dir.display(), e);
            std::process::exit(1);
        }
    };
    info!(version = VERSION, log_file = %guard.file_name, "Jig starting");

    if let Err(e) = run(&args, config).await {
        error!(error = %e, "Jig stopped with an error");
        drop(guard);
        std::process::exit(1);
    }
}

/// Defaults, then the config file, then flags / environment
fn effective_config(args: &Args) -> Result<JigConfig, JigError> {
    let mut config = match &args.config {
        Some(path) => JigConfig::load(path)?,
        None => JigConfig::default(),
    };
    if let Some(v) = args.max_test_time {
        config.max_test_time_secs = v;
    }
    if let Some(v) = args.debounce_ms {
        config.debounce_ms = v;
    }
    if let Some(v) = args.debounce_count {
        config.debounce_count = v;
    }
    if let Some(v) = &args.firmware_dir {
        config.firmware_dir = v.clone();
    }
    if let Some(v) = &args.serial_port {
        config.serial_port = v.clone();
    }
    if let Some(v) = &args.log_dir {
        config.log_dir = v.clone();
    }
    config.validate()?;
    Ok(config)
}

type SerialOpener = Box<dyn Fn() -> Result<Box<dyn BufRead + Send>, JigError> + Send + Sync>;

/// MIDI bus, flasher and serial opener for the real or the simulated device
fn device_adapters(
    args: &Args,
    config: &JigConfig,
    panel: &SimPanel,
) -> (Arc<dyn MidiBus>, Box<dyn FirmwareFlasher>, SerialOpener) {
    if args.simulate_device {
        info!("Simulating the device under test");
        let output = format!("{} MIDI 1", config.midi_device_name);
        let bus: Arc<dyn MidiBus> = Arc::new(SimMidiBus::new(&["Midi Through Port-0", output.as_str()]));
        let serial_panel = panel.clone();
        let opener: SerialOpener = Box::new(move || {
            let source = SimTelemetrySource::new(&serial_panel, Duration::from_millis(50));
            Ok(Box::new(BufReader::new(source)) as Box<dyn BufRead + Send>)
        });
        let flasher: Box<dyn FirmwareFlasher> = Box::new(SimFlasher::new(panel));
        (bus, flasher, opener)
    } else {
        let serial_port = config.serial_port.clone();
        let opener: SerialOpener = Box::new(move || {
            let file = File::open(&serial_port)?;
            info!(port = %serial_port.display(), "Serial port opened");
            Ok(Box::new(BufReader::new(file)) as Box<dyn BufRead + Send>)
        });
        let bus: Arc<dyn MidiBus> = Arc::new(RawMidiBus::default());
        let flasher: Box<dyn FirmwareFlasher> = Box::new(UsbMassStorageFlasher::new(&config.mount_point));
        (bus, flasher, opener)
    }
}

async fn run(args: &Args, config: JigConfig) -> Result<(), JigError> {
    fs::create_dir_all(&config.firmware_dir)?;
    let mut firmware = FirmwareCache::new(&config.firmware_dir);
    let device_firmware = firmware
        .get()?
        .and_then(|path| {
            path.file_name()
                .and_then(|name| device_firmware_version(&name.to_string_lossy()))
        })
        .unwrap_or_else(|| {
            warn!("No firmware artifact, device version unknown");
            UNKNOWN_DEVICE_FIRMWARE.to_string()
        });
    info!(jig = %config.jig_firmware, device = %device_firmware, "Firmware versions");

    let panel = SimPanel::with_echo();
    spawn_keyboard_lever(panel.clone())?;

    let feedback = Arc::new(Mutex::new(Feedback::new(
        Box::new(panel.display()),
        Box::new(panel.indicator()),
        SCREEN_COLUMNS,
        config.jig_firmware.clone(),
        device_firmware,
    )));
    let telemetry: Arc<LatestValueMailbox<TelemetrySample>> = Arc::new(LatestValueMailbox::new());

    let (bus, flasher, opener) = device_adapters(args, &config, &panel);
    let hw = JigHardware::new(
        Box::new(panel.power()),
        Box::new(panel.light_sensors()),
        flasher,
        Arc::clone(&feedback),
        firmware,
        MidiSession::new(bus, config.midi_device_name.clone()),
        SerialLink::new(opener, Arc::clone(&telemetry)),
    );
    let pipeline = Arc::new(build_pipeline(&config, &hw));

    let monitor = DebouncedPresenceMonitor::new(panel.presence(), config.debounce())?;
    let status = Arc::new(LatestValueMailbox::new());
    let api_state = ApiState::new(Arc::clone(&status), Arc::clone(&telemetry));

    let mut controller = JigController::new(
        monitor,
        RunSupervisor::new(config.max_test_time()),
        pipeline,
        feedback,
        Box::new(JigSession::new(hw)),
        config.timing(),
    )
    .with_status(status)
    .with_updates(api_state.updates.clone());

    if args.serve {
        let addr = args.addr.clone();
        tokio::spawn(async move {
            if let Err(e) = run_server(&addr, api_state).await {
                error!(error = %e, "Status API stopped");
            }
        });
    }

    let shutdown = controller.shutdown_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current step");
            shutdown.store(true, Ordering::Release);
        }
    });

    tokio::task::spawn_blocking(move || controller.run())
        .await
        .map_err(|e| JigError::Hardware(format!("controller task failed: {}", e)))?
}
