//! Production test pipeline
//!
//! | code | stage              |
//! |------|--------------------|
//! | 1    | firmware-load      |
//! | 2    | midi-discovery     |
//! | 3    | midi-log-enable    |
//! | 4    | indicator-blue     |
//! | 5    | indicator-green    |
//! | 6    | midi-teardown      |
//! | 7    | serial-start       |
//! | 8    | sensor-checks      |
//! | 7    | serial-stop        |
//!
//! Every stage gets its hardware through `JigHardware`; nothing is looked
//! up globally.

pub mod firmware;
pub mod leds;
pub mod midi;
pub mod sensors;
pub mod serial;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::JigConfig;
use crate::core::{Feedback, JigLifecycle, Pipeline, Stage};
use crate::error::JigError;
use crate::hardware::firmware::FirmwareCache;
use crate::hardware::{FirmwareFlasher, LightSensors, PowerControl};
use crate::types::{RunResult, StageError};

pub use firmware::BootSequence;
pub use midi::MidiSession;
pub use serial::SerialLink;

pub const STAGE_FIRMWARE_LOAD: &str = "firmware-load";
pub const STAGE_MIDI_DISCOVERY: &str = "midi-discovery";
pub const STAGE_MIDI_LOG_ENABLE: &str = "midi-log-enable";
pub const STAGE_INDICATOR_BLUE: &str = "indicator-blue";
pub const STAGE_INDICATOR_GREEN: &str = "indicator-green";
pub const STAGE_MIDI_TEARDOWN: &str = "midi-teardown";
pub const STAGE_SERIAL_START: &str = "serial-start";
pub const STAGE_SENSOR_CHECKS: &str = "sensor-checks";
pub const STAGE_SERIAL_STOP: &str = "serial-stop";

/// USB port the device is powered from
pub const DEVICE_USB_PORT: u8 = 1;
/// Relay closing the plant electrodes
pub const PLANT_RELAY: u8 = 1;
/// Relay holding the device in bootloader mode while it powers up
pub const BOOT_RELAY: u8 = 2;

/// Lock a shared handle; a poisoned lock still guards a usable driver
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Hardware handles the stages close over
#[derive(Clone)]
pub struct JigHardware {
    pub power: Arc<Mutex<Box<dyn PowerControl>>>,
    pub light_sensors: Arc<Mutex<Box<dyn LightSensors>>>,
    pub flasher: Arc<Mutex<Box<dyn FirmwareFlasher>>>,
    pub feedback: Arc<Mutex<Feedback>>,
    pub firmware: Arc<Mutex<FirmwareCache>>,
    pub midi: Arc<MidiSession>,
    pub serial: Arc<SerialLink>,
}

impl JigHardware {
    pub fn new(
        power: Box<dyn PowerControl>,
        light_sensors: Box<dyn LightSensors>,
        flasher: Box<dyn FirmwareFlasher>,
        feedback: Arc<Mutex<Feedback>>,
        firmware: FirmwareCache,
        midi: MidiSession,
        serial: SerialLink,
    ) -> Self {
        Self {
            power: Arc::new(Mutex::new(power)),
            light_sensors: Arc::new(Mutex::new(light_sensors)),
            flasher: Arc::new(Mutex::new(flasher)),
            feedback,
            firmware: Arc::new(Mutex::new(firmware)),
            midi: Arc::new(midi),
            serial: Arc::new(serial),
        }
    }

    /// FLASH banner; a display error is a fault
    pub(crate) fn show_flashing(&self) -> Result<(), StageError> {
        lock(&self.feedback).show_flashing()?;
        Ok(())
    }

    /// TESTING banner; a display error is a fault
    pub(crate) fn show_testing(&self) -> Result<(), StageError> {
        lock(&self.feedback).show_testing()?;
        Ok(())
    }
}

impl std::fmt::Debug for JigHardware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JigHardware")
            .field("midi", &self.midi)
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

/// Build the production pipeline in its fixed order
pub fn build_pipeline(config: &JigConfig, hw: &JigHardware) -> Pipeline {
    let thresholds = config.thresholds.clone();
    let sample_interval = Duration::from_millis(thresholds.sample_interval_ms);
    let serial_settle = Duration::from_millis(config.serial_settle_ms);
    let boot = BootSequence {
        step: Duration::from_millis(config.boot_step_ms),
        reboot_wait: Duration::from_secs(config.reboot_wait_secs),
    };

    let fw = hw.clone();
    let discovery = hw.clone();
    let logs = hw.clone();
    let blue = hw.clone();
    let blue_min = thresholds.blue_led_min_volts;
    let green = hw.clone();
    let green_min = thresholds.green_led_min_volts;
    let teardown = hw.clone();
    let serial_start = hw.clone();
    let sensing = hw.clone();
    let serial_stop = hw.clone();

    Pipeline::new(vec![
        Stage::new(STAGE_FIRMWARE_LOAD, move |token| firmware::load_firmware(&fw, &boot, token)),
        Stage::new(STAGE_MIDI_DISCOVERY, move |token| {
            discovery.show_testing()?;
            token.check()?;
            discovery.midi.discover()
        }),
        Stage::new(STAGE_MIDI_LOG_ENABLE, move |token| {
            logs.midi.send_sysex(crate::SYSEX_ENABLE_LOGS, token)
        }),
        Stage::new(STAGE_INDICATOR_BLUE, move |token| {
            leds::check_indicator(&blue, crate::SYSEX_LED_BLUE, blue_min, token)
        }),
        Stage::new(STAGE_INDICATOR_GREEN, move |token| {
            leds::check_indicator(&green, crate::SYSEX_LED_GREEN, green_min, token)
        }),
        Stage::new(STAGE_MIDI_TEARDOWN, move |_| teardown.midi.close()),
        Stage::new(STAGE_SERIAL_START, move |token| {
            serial_start.serial.start()?;
            token.sleep(serial_settle)
        }),
        Stage::new(STAGE_SENSOR_CHECKS, move |token| {
            sensors::photoresistor_check(&sensing, &thresholds, sample_interval, token)?;
            sensors::plants_disconnected_check(&sensing, &thresholds, sample_interval, token)?;
            sensors::plants_connected_check(&sensing, &thresholds, sample_interval, token)
        }),
        Stage::new(STAGE_SERIAL_STOP, move |_| serial_stop.serial.stop()).with_code(7),
    ])
}

/// Startup, per-run cleanup and shutdown for the production jig
#[derive(Debug)]
pub struct JigSession {
    hw: JigHardware,
}

impl JigSession {
    pub fn new(hw: JigHardware) -> Self {
        Self { hw }
    }
}

impl JigLifecycle for JigSession {
    fn prepare(&mut self) -> Result<(), JigError> {
        let mut power = lock(&self.hw.power);
        power.set_usb_power(DEVICE_USB_PORT, false)?;
        power.set_relay(PLANT_RELAY, false)?;
        power.set_relay(BOOT_RELAY, false)?;
        power.set_sensor_led(false)?;
        info!("Jig outputs reset");
        Ok(())
    }

    fn after_run(&mut self, result: &RunResult) -> Result<(), JigError> {
        if self.hw.midi.is_open() {
            if let Err(e) = self.hw.midi.close() {
                warn!(error = %e, "Failed to close MIDI port");
            }
        }
        self.hw.serial.shutdown();
        lock(&self.hw.power).set_usb_power(DEVICE_USB_PORT, false)?;
        info!(result = %result.to_parseable_string(), "Device powered down");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), JigError> {
        self.hw.serial.shutdown();
        lock(&self.hw.power).set_usb_power(DEVICE_USB_PORT, true)?;
        Ok(())
    }
}
