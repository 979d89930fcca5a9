//! Simulated jig panel and device
//!
//! Stands in for the expander, LCD, RGB LED, ADC multiplexers, MIDI port,
//! mass-storage flasher and serial log stream. Used by the binary for dry
//! runs (console output via `colored`, lever driven from stdin) and by tests.

use std::io::{self, BufRead, Read};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use colored::{Color, Colorize};
use tracing::{info, warn};

use crate::error::JigError;
use crate::hardware::{
    FirmwareFlasher, FlashError, Indicator, LightSensors, MidiBus, MidiPort, PowerControl,
    PresenceInput, TextDisplay,
};
use crate::types::{IndicatorColor, PresenceLevel};

/// Everything the simulated panel knows
#[derive(Debug, Clone, PartialEq)]
pub struct SimState {
    pub presence: PresenceLevel,
    pub lines: (String, String),
    pub color: IndicatorColor,
    pub usb_power: [bool; 4],
    pub relays: [bool; 4],
    pub sensor_led: bool,
    /// Volts every light sensor reports
    pub light_volts: f64,
    /// Print LCD updates to stdout
    pub echo: bool,
    /// Remaining presence reads that fail with a bus error
    pub presence_read_failures: u32,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            presence: PresenceLevel::Absent,
            lines: (String::new(), String::new()),
            color: IndicatorColor::Off,
            usb_power: [true; 4],
            relays: [false; 4],
            sensor_led: false,
            light_volts: 3.3,
            echo: false,
            presence_read_failures: 0,
        }
    }
}

/// Shared handle; every adapter below clones it
#[derive(Debug, Clone, Default)]
pub struct SimPanel {
    state: Arc<Mutex<SimState>>,
}

impl SimPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panel that prints LCD updates to the console
    pub fn with_echo() -> Self {
        let panel = Self::new();
        panel.lock().echo = true;
        panel
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A poisoned panel is still a valid panel
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> SimState {
        self.lock().clone()
    }

    pub fn set_presence(&self, level: PresenceLevel) {
        self.lock().presence = level;
    }

    pub fn set_light_volts(&self, volts: f64) {
        self.lock().light_volts = volts;
    }

    pub fn fail_presence_reads(&self, count: u32) {
        self.lock().presence_read_failures = count;
    }

    pub fn presence(&self) -> SimPresence {
        SimPresence { panel: self.clone() }
    }

    pub fn display(&self) -> SimDisplay {
        SimDisplay { panel: self.clone() }
    }

    pub fn indicator(&self) -> SimIndicator {
        SimIndicator { panel: self.clone() }
    }

    pub fn power(&self) -> SimPower {
        SimPower { panel: self.clone() }
    }

    pub fn light_sensors(&self) -> SimLightSensors {
        SimLightSensors { panel: self.clone() }
    }
}

pub struct SimPresence {
    panel: SimPanel,
}

impl PresenceInput for SimPresence {
    fn read_presence(&mut self) -> Result<PresenceLevel, JigError> {
        let mut state = self.panel.lock();
        if state.presence_read_failures > 0 {
            state.presence_read_failures -= 1;
            return Err(JigError::hardware("simulated expander read failure"));
        }
        Ok(state.presence)
    }
}

pub struct SimDisplay {
    panel: SimPanel,
}

fn console_color(color: IndicatorColor) -> Color {
    match color {
        IndicatorColor::Off => Color::BrightBlack,
        IndicatorColor::Red => Color::Red,
        IndicatorColor::Green => Color::Green,
        IndicatorColor::Blue => Color::Blue,
        IndicatorColor::Yellow => Color::Yellow,
        IndicatorColor::Purple => Color::Magenta,
        IndicatorColor::LightBlue => Color::Cyan,
        IndicatorColor::White => Color::White,
    }
}

impl TextDisplay for SimDisplay {
    fn show(&mut self, line1: &str, line2: &str) -> Result<(), JigError> {
        let mut state = self.panel.lock();
        state.lines = (line1.to_string(), line2.to_string());
        if state.echo {
            let color = console_color(state.color);
            println!("┌────────────────┐");
            println!("│{}│", format!("{:<16}", line1).color(color).bold());
            println!("│{}│", format!("{:<16}", line2).dimmed());
            println!("└────────────────┘");
        }
        Ok(())
    }
}

pub struct SimIndicator {
    panel: SimPanel,
}

impl Indicator for SimIndicator {
    fn set_color(&mut self, color: IndicatorColor) -> Result<(), JigError> {
        let mut state = self.panel.lock();
        state.color = color;
        if state.echo {
            println!("{}", format!("● {}", color).color(console_color(color)));
        }
        Ok(())
    }
}

pub struct SimPower {
    panel: SimPanel,
}

fn slot(index: u8, what: &str) -> Result<usize, JigError> {
    if (1..=4).contains(&index) {
        Ok(index as usize - 1)
    } else {
        Err(JigError::hardware(format!("{} number must be between 1 and 4, got {}", what, index)))
    }
}

impl PowerControl for SimPower {
    fn set_usb_power(&mut self, port: u8, on: bool) -> Result<(), JigError> {
        let i = slot(port, "USB port")?;
        self.panel.lock().usb_power[i] = on;
        Ok(())
    }

    fn set_relay(&mut self, relay: u8, on: bool) -> Result<(), JigError> {
        let i = slot(relay, "Relay")?;
        self.panel.lock().relays[i] = on;
        Ok(())
    }

    fn set_sensor_led(&mut self, on: bool) -> Result<(), JigError> {
        self.panel.lock().sensor_led = on;
        Ok(())
    }
}

pub struct SimLightSensors {
    panel: SimPanel,
}

impl LightSensors for SimLightSensors {
    fn read_volts(&mut self, multiplexer: u8, channel: u8) -> Result<f64, JigError> {
        if multiplexer > 3 || channel > 3 {
            return Err(JigError::hardware(format!(
                "no light sensor at multiplexer {} channel {}",
                multiplexer, channel
            )));
        }
        Ok(self.panel.lock().light_volts)
    }
}

// =============================================================================
// SIMULATED DEVICE
// =============================================================================

/// MIDI bus exposing one device output; records everything sent
#[derive(Debug, Clone)]
pub struct SimMidiBus {
    outputs: Vec<String>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl SimMidiBus {
    pub fn new(outputs: &[&str]) -> Self {
        Self {
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl MidiBus for SimMidiBus {
    fn output_names(&self) -> Result<Vec<String>, JigError> {
        Ok(self.outputs.clone())
    }

    fn open(&self, name: &str) -> Result<Box<dyn MidiPort>, JigError> {
        if !self.outputs.iter().any(|o| o == name) {
            return Err(JigError::Midi(format!("no output named {}", name)));
        }
        Ok(Box::new(SimMidiPort {
            name: name.to_string(),
            sent: Arc::clone(&self.sent),
        }))
    }
}

struct SimMidiPort {
    name: String,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MidiPort for SimMidiPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, message: &[u8]) -> Result<(), JigError> {
        self.sent
            .lock()
            .map_err(|_| JigError::Midi("sent log poisoned".to_string()))?
            .push(message.to_vec());
        Ok(())
    }
}

/// Pretends to copy firmware; fails with `DeviceNotFound` while USB port 1
/// is unpowered
#[derive(Debug, Clone)]
pub struct SimFlasher {
    panel: SimPanel,
    flashed: Arc<Mutex<Vec<String>>>,
}

impl SimFlasher {
    pub fn new(panel: &SimPanel) -> Self {
        Self {
            panel: panel.clone(),
            flashed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn flashed(&self) -> Vec<String> {
        self.flashed.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl FirmwareFlasher for SimFlasher {
    fn flash(&mut self, firmware: &Path) -> Result<(), FlashError> {
        if !self.panel.lock().usb_power[0] {
            return Err(FlashError::DeviceNotFound);
        }
        let name = firmware
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(firmware = %name, "Simulated firmware copy");
        if let Ok(mut flashed) = self.flashed.lock() {
            flashed.push(name);
        }
        Ok(())
    }
}

/// Serial log stream of the simulated device
///
/// Emits one JSON line per `interval` while USB port 1 is powered. The
/// photoresistor reading drops while the sensor LED is on; the generator
/// frequency jumps while plant relay 1 is closed.
pub struct SimTelemetrySource {
    panel: SimPanel,
    interval: Duration,
    pending: Vec<u8>,
    offset: usize,
}

impl SimTelemetrySource {
    pub fn new(panel: &SimPanel, interval: Duration) -> Self {
        Self {
            panel: panel.clone(),
            interval,
            pending: Vec::new(),
            offset: 0,
        }
    }

    fn next_line(&self) -> Option<String> {
        let state = self.panel.lock();
        if !state.usb_power[0] {
            return None;
        }
        let photoresistor = if state.sensor_led { 540 } else { 910 };
        let generator = if state.relays[0] { 61_000 } else { 12 };
        Some(format!(
            "{{\"photoresistor_adc\": {}, \"generator_freq\": {}}}\n",
            photoresistor, generator
        ))
    }
}

impl Read for SimTelemetrySource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset >= self.pending.len() {
            thread::sleep(self.interval);
            match self.next_line() {
                Some(line) => {
                    self.pending = line.into_bytes();
                    self.offset = 0;
                }
                None => return Err(io::Error::new(io::ErrorKind::TimedOut, "device unpowered")),
            }
        }
        let n = buf.len().min(self.pending.len() - self.offset);
        buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

/// Drive the lever from stdin: `i` seats a device, `r` removes it, an empty
/// line toggles.
pub fn spawn_keyboard_lever(panel: SimPanel) -> Result<(), JigError> {
    thread::Builder::new()
        .name("sim-lever".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let next = match line.trim() {
                    "i" | "insert" => PresenceLevel::Present,
                    "r" | "remove" => PresenceLevel::Absent,
                    "" => match panel.state().presence {
                        PresenceLevel::Present => PresenceLevel::Absent,
                        PresenceLevel::Absent => PresenceLevel::Present,
                    },
                    other => {
                        warn!(input = other, "Unknown lever command (i / r / Enter)");
                        continue;
                    }
                };
                info!(level = %next, "Simulated lever moved");
                panel.set_presence(next);
            }
        })
        .map_err(|e| JigError::Spawn("simulated lever", e))?;
    Ok(())
}
