//! Firmware load stage
//!
//! Power-cycles the device into its bootloader (boot relay held while USB
//! power returns), copies the selected artifact onto the mass-storage drive
//! and waits for the device to reboot into the new firmware.

use std::time::Duration;

use tracing::{info, warn};

use crate::core::CancellationQuery;
use crate::hardware::firmware::firmware_digest;
use crate::hardware::FlashError;
use crate::stages::{lock, JigHardware, BOOT_RELAY, DEVICE_USB_PORT};
use crate::types::StageError;

pub const FIRMWARE_NOT_FOUND: &str = "FIRMWARE_NOT_FOUND";
pub const DEVICE_NOT_FOUND: &str = "DEVICE_NOT_FOUND";
pub const CP_FIRMWARE_ERROR: &str = "CP_FIRMWARE_ERROR";

/// Timing of the bootloader power sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootSequence {
    pub step: Duration,
    pub reboot_wait: Duration,
}

impl Default for BootSequence {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(crate::BOOT_STEP_MS),
            reboot_wait: Duration::from_secs(crate::REBOOT_WAIT_SECS),
        }
    }
}

/// USB off, boot relay on, USB on, boot relay off
fn boot_device(
    hw: &JigHardware,
    boot: &BootSequence,
    token: &CancellationQuery,
) -> Result<(), StageError> {
    info!("Boot device");
    lock(&hw.power).set_usb_power(DEVICE_USB_PORT, false)?;
    token.sleep(boot.step)?;

    lock(&hw.power).set_relay(BOOT_RELAY, true)?;
    let held = token
        .sleep(boot.step)
        .and_then(|_| {
            lock(&hw.power).set_usb_power(DEVICE_USB_PORT, true)?;
            token.sleep(boot.step)
        });
    // The boot relay is released on every path
    lock(&hw.power).set_relay(BOOT_RELAY, false)?;
    held?;
    token.sleep(boot.step)
}

pub fn load_firmware(
    hw: &JigHardware,
    boot: &BootSequence,
    token: &CancellationQuery,
) -> Result<(), StageError> {
    hw.show_flashing()?;
    boot_device(hw, boot, token)?;

    let Some(firmware) = lock(&hw.firmware).get()? else {
        warn!("Some problem with loading firmware file");
        return Err(StageError::failed(FIRMWARE_NOT_FOUND));
    };
    match firmware_digest(&firmware) {
        Ok(digest) => info!(file = %firmware.display(), sha256 = %digest, "Firmware has been found"),
        Err(e) => warn!(error = %e, "Could not hash firmware file"),
    }
    token.check()?;

    match lock(&hw.flasher).flash(&firmware) {
        Ok(()) => info!("Firmware has been copied to usb drive"),
        Err(FlashError::DeviceNotFound) => {
            warn!("Cant find any devices");
            return Err(StageError::failed(DEVICE_NOT_FOUND));
        }
        Err(FlashError::Copy(e)) => {
            warn!(error = %e, "Failed to copy firmware file");
            return Err(StageError::failed(CP_FIRMWARE_ERROR));
        }
        Err(FlashError::Other(e)) => return Err(e.into()),
    }

    token.sleep(boot.reboot_wait)
}
