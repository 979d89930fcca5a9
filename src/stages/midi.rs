//! MIDI session with the device under test
//!
//! Discovery opens the first output whose name contains the configured
//! fragment; the port stays open until teardown or post-run cleanup.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::core::CancellationQuery;
use crate::hardware::{MidiBus, MidiPort};
use crate::stages::lock;
use crate::types::StageError;
use crate::{SYSEX_END, SYSEX_PREFIX};

pub const DEVICE_NOT_FOUND: &str = "Device Not Found";
pub const ALREADY_FOUND: &str = "Device has already been Found";

/// Settle time after each SysEx message
const SYSEX_SETTLE: Duration = Duration::from_millis(100);

/// Full SysEx frame for a command byte
pub fn sysex(command: u8) -> Vec<u8> {
    let mut message = SYSEX_PREFIX.to_vec();
    message.push(command);
    message.push(SYSEX_END);
    message
}

pub struct MidiSession {
    bus: Arc<dyn MidiBus>,
    name_fragment: String,
    port: Mutex<Option<Box<dyn MidiPort>>>,
}

impl MidiSession {
    pub fn new(bus: Arc<dyn MidiBus>, name_fragment: impl Into<String>) -> Self {
        Self {
            bus,
            name_fragment: name_fragment.into(),
            port: Mutex::new(None),
        }
    }

    pub fn is_open(&self) -> bool {
        lock(&self.port).is_some()
    }

    pub fn discover(&self) -> Result<(), StageError> {
        let mut port = lock(&self.port);
        if port.is_some() {
            info!("Device has already been initialized");
            return Err(StageError::failed(ALREADY_FOUND));
        }
        let names = self.bus.output_names()?;
        let Some(name) = names.iter().find(|n| n.contains(&self.name_fragment)) else {
            warn!(outputs = ?names, fragment = %self.name_fragment, "MIDI device not found");
            return Err(StageError::failed(DEVICE_NOT_FOUND));
        };
        *port = Some(self.bus.open(name)?);
        info!(output = %name, "MIDI device was found");
        Ok(())
    }

    pub fn send_sysex(&self, command: u8, token: &CancellationQuery) -> Result<(), StageError> {
        {
            let mut port = lock(&self.port);
            let Some(port) = port.as_mut() else {
                warn!("MIDI device is not open");
                return Err(StageError::failed(DEVICE_NOT_FOUND));
            };
            port.send(&sysex(command))?;
        }
        token.sleep(SYSEX_SETTLE)
    }

    pub fn close(&self) -> Result<(), StageError> {
        match lock(&self.port).take() {
            Some(port) => {
                info!(output = port.name(), "MIDI port closed");
                Ok(())
            }
            None => {
                info!("MIDI device is not enabled");
                Err(StageError::failed(DEVICE_NOT_FOUND))
            }
        }
    }
}

impl std::fmt::Debug for MidiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiSession")
            .field("name_fragment", &self.name_fragment)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CancellationToken;
    use crate::hardware::sim::SimMidiBus;

    #[test]
    fn test_sysex_frames() {
        assert_eq!(sysex(crate::SYSEX_ENABLE_LOGS), vec![240, 11, 20, 13, 3, 247]);
        assert_eq!(sysex(crate::SYSEX_LED_BLUE), vec![240, 11, 20, 13, 1, 247]);
    }

    #[test]
    fn test_discover_send_close() {
        let bus = SimMidiBus::new(&["Midi Through", "Biotron MIDI 1"]);
        let session = MidiSession::new(Arc::new(bus.clone()), "Biotron");
        let token = CancellationToken::new().query();

        session.discover().unwrap();
        assert_eq!(session.discover(), Err(StageError::failed(ALREADY_FOUND)));
        session.send_sysex(crate::SYSEX_ENABLE_LOGS, &token).unwrap();
        session.close().unwrap();
        assert_eq!(bus.sent(), vec![vec![240, 11, 20, 13, 3, 247]]);
        assert_eq!(session.close(), Err(StageError::failed(DEVICE_NOT_FOUND)));
    }

    #[test]
    fn test_missing_device_is_stage_failure() {
        let session = MidiSession::new(Arc::new(SimMidiBus::new(&["Midi Through"])), "Biotron");
        assert_eq!(session.discover(), Err(StageError::failed(DEVICE_NOT_FOUND)));
        assert_eq!(
            session.send_sysex(1, &CancellationToken::new().query()),
            Err(StageError::failed(DEVICE_NOT_FOUND))
        );
    }
}
