//! Hardware boundary
//!
//! Every collaborator the core talks to sits behind one of these traits. Each
//! handle has a single owner: the controller loop, or a stage closure while a
//! run is supervised. Buses behind them are not safe for concurrent access.

pub mod firmware;
pub mod midi;
pub mod sim;

use std::path::Path;

use crate::error::JigError;
use crate::types::{IndicatorColor, PresenceLevel};

/// The device-under-test presence lever (active-low expander pin)
pub trait PresenceInput: Send {
    fn read_presence(&mut self) -> Result<PresenceLevel, JigError>;
}

/// Two-line character LCD
pub trait TextDisplay: Send {
    fn show(&mut self, line1: &str, line2: &str) -> Result<(), JigError>;
}

/// RGB operator indicator
pub trait Indicator: Send {
    fn set_color(&mut self, color: IndicatorColor) -> Result<(), JigError>;
}

/// USB port power, relays and the sensor LED line on the expander
pub trait PowerControl: Send {
    /// `port` is 1..=4
    fn set_usb_power(&mut self, port: u8, on: bool) -> Result<(), JigError>;
    /// `relay` is 1..=4
    fn set_relay(&mut self, relay: u8, on: bool) -> Result<(), JigError>;
    fn set_sensor_led(&mut self, on: bool) -> Result<(), JigError>;
}

/// Light sensors behind the ADC multiplexers
pub trait LightSensors: Send {
    /// Volts on `channel` (0..4) of `multiplexer` (0..4)
    fn read_volts(&mut self, multiplexer: u8, channel: u8) -> Result<f64, JigError>;
}

/// An open MIDI output
pub trait MidiPort: Send {
    fn name(&self) -> &str;
    fn send(&mut self, message: &[u8]) -> Result<(), JigError>;
}

/// Enumerates and opens MIDI outputs
pub trait MidiBus: Send + Sync {
    fn output_names(&self) -> Result<Vec<String>, JigError>;
    fn open(&self, name: &str) -> Result<Box<dyn MidiPort>, JigError>;
}

/// Why flashing did not happen
#[derive(Debug, thiserror::Error)]
pub enum FlashError {
    #[error("no mass-storage device found")]
    DeviceNotFound,
    #[error("copy failed: {0}")]
    Copy(#[source] std::io::Error),
    #[error(transparent)]
    Other(#[from] JigError),
}

/// Puts a firmware artifact onto the device
pub trait FirmwareFlasher: Send {
    fn flash(&mut self, firmware: &Path) -> Result<(), FlashError>;
}
