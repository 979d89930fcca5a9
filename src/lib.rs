//! jigctl: manufacturing test-jig controller
//!
//! Presence lever → DebouncedPresenceMonitor → RunSupervisor (worker thread
//! running the stage Pipeline) → LCD/RGB feedback → wait for removal.

pub mod config;
pub mod core;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod stages;
pub mod types;

pub use error::JigError;

// =============================================================================
// PRESENCE DEBOUNCE
// =============================================================================

/// Delay between debounce re-samples (milliseconds)
pub const DEBOUNCE_TIME_MS: u64 = 50;

/// Number of re-samples that must agree with a new presence level
pub const DEBOUNCE_CHECK_COUNT: u32 = 2;

// =============================================================================
// RUN SUPERVISION
// =============================================================================

/// Hard wall-clock budget for one test run (seconds)
pub const MAX_TEST_TIME_SECS: u64 = 70;

/// Controller loop tick while a run is in progress (milliseconds)
pub const POLL_INTERVAL_MS: u64 = 20;

/// Minimum time the result stays on screen before the jig re-arms (seconds)
pub const REMOVAL_SETTLE_SECS: u64 = 3;

// =============================================================================
// RESULT CODES - operator facing, must never change
// =============================================================================

pub const CODE_SUCCESS: i32 = 0;

/// Highest code a pipeline position can map to
pub const MAX_STAGE_CODE: i32 = 8;

/// Lever released mid-run
pub const CODE_PRESENCE_LOST: i32 = 9;

/// Wall-clock budget exceeded
pub const CODE_TIMEOUT: i32 = 10;

/// Unexpected fault inside a stage or the worker
pub const CODE_INTERNAL_FAULT: i32 = -1;

// =============================================================================
// STAGE THRESHOLDS
// =============================================================================

pub const PHOTORESISTOR_SAMPLES: u32 = 5;
pub const PLANT_SAMPLES: u32 = 5;

/// Photoresistor ADC must drop at least this much with the sensor LED on
pub const PHOTORESISTOR_MIN_DELTA: f64 = 100.0;

/// Generator frequency ceiling with the plant relay open
pub const PLANT_DISCONNECTED_MAX: f64 = 100.0;

/// Generator frequency floor with the plant relay closed
pub const PLANT_CONNECTED_MIN: f64 = 50_000.0;

pub const BLUE_LED_MIN_VOLTS: f64 = 3.2;
pub const GREEN_LED_MIN_VOLTS: f64 = 2.7;

/// Gap between telemetry snapshots when averaging (milliseconds)
pub const SAMPLE_INTERVAL_MS: u64 = 100;

/// Light sensor channels checked per indicator colour
pub const LIGHT_MULTIPLEXERS: u8 = 4;
pub const LIGHT_CHANNELS: u8 = 4;

// =============================================================================
// DEVICE
// =============================================================================

/// SysEx payload prefix / suffix; the byte between selects the command
pub const SYSEX_PREFIX: [u8; 4] = [0xF0, 0x0B, 0x14, 0x0D];
pub const SYSEX_END: u8 = 0xF7;
pub const SYSEX_LED_GREEN: u8 = 0x00;
pub const SYSEX_LED_BLUE: u8 = 0x01;
pub const SYSEX_ENABLE_LOGS: u8 = 0x03;

/// Pause between boot-sequence power steps (milliseconds)
pub const BOOT_STEP_MS: u64 = 1000;

/// Wait for the first log lines after the serial link opens (milliseconds)
pub const SERIAL_SETTLE_MS: u64 = 1000;

/// Time the device needs to reboot after flashing (seconds)
pub const REBOOT_WAIT_SECS: u64 = 5;

pub const DEFAULT_FIRMWARE_DIR: &str = "firmware";
pub const DEFAULT_MOUNT_POINT: &str = "/media/usb";
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";
pub const DEFAULT_MIDI_DEVICE_NAME: &str = "Biotron";
pub const DEFAULT_LOG_DIR: &str = "logs";

// =============================================================================
// PANEL
// =============================================================================

pub const SCREEN_COLUMNS: usize = 16;
pub const SCREEN_ROWS: usize = 2;

pub const JIG_FIRMWARE_VERSION: &str = "A01";

/// Shown until a firmware artifact has been selected
pub const UNKNOWN_DEVICE_FIRMWARE: &str = "0.00.00";

pub const FIRMWARE_PATTERN: &str = r"^playtron-firmware_v\d+\.\d+\.\d+\.uf2$";

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
