//! Indicator LED checks
//!
//! The device is switched into a colour test mode over SysEx, then every
//! light sensor channel must read at least the colour's minimum voltage.

use tracing::{info, warn};

use crate::core::CancellationQuery;
use crate::stages::{lock, JigHardware};
use crate::types::StageError;
use crate::{LIGHT_CHANNELS, LIGHT_MULTIPLEXERS};

pub const LED_TEST_FAILED: &str = "LED_TEST_FAILED";

/// First channel below `min_volts`, if any
pub fn find_dim_channel(
    hw: &JigHardware,
    min_volts: f64,
    token: &CancellationQuery,
) -> Result<Option<(u8, u8, f64)>, StageError> {
    for multiplexer in 0..LIGHT_MULTIPLEXERS {
        for channel in 0..LIGHT_CHANNELS {
            token.check()?;
            let volts = lock(&hw.light_sensors).read_volts(multiplexer, channel)?;
            info!(multiplexer, channel, volts, "Light sensor value");
            if volts < min_volts {
                return Ok(Some((multiplexer, channel, volts)));
            }
        }
    }
    Ok(None)
}

pub fn check_indicator(
    hw: &JigHardware,
    command: u8,
    min_volts: f64,
    token: &CancellationQuery,
) -> Result<(), StageError> {
    hw.midi.send_sysex(command, token)?;
    if let Some((multiplexer, channel, volts)) = find_dim_channel(hw, min_volts, token)? {
        warn!(multiplexer, channel, volts, min_volts, "LED test failed");
        return Err(StageError::failed(LED_TEST_FAILED));
    }
    Ok(())
}
