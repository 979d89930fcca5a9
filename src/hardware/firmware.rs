//! Firmware artifact selection and USB mass-storage flashing
//!
//! Artifacts are named `playtron-firmware_v<maj>.<min>.<patch>.uf2`; the
//! lexicographically greatest match in the firmware directory wins. The
//! device enumerates as a mass-storage drive in bootloader mode; flashing is
//! mount, copy, unmount.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::JigError;
use crate::hardware::{FirmwareFlasher, FlashError};
use crate::FIRMWARE_PATTERN;

lazy_static! {
    static ref RE_FIRMWARE: Regex = Regex::new(FIRMWARE_PATTERN).unwrap();
    static ref RE_VERSION: Regex = Regex::new(r"_v(\d+)\.(\d+)\.(\d+)\.uf2$").unwrap();
}

pub fn is_firmware_file_name(name: &str) -> bool {
    RE_FIRMWARE.is_match(name)
}

/// Lexicographic-max firmware file in `dir`, `None` if there is none
pub fn select_firmware(dir: &Path) -> Result<Option<PathBuf>, JigError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(dir = %dir.display(), "Firmware directory does not exist");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_firmware_file_name(&name) {
            names.push(name);
        }
    }

    names.sort();
    match names.pop() {
        Some(name) => {
            info!(file = %name, "Firmware file has been found");
            Ok(Some(dir.join(name)))
        }
        None => {
            warn!(dir = %dir.display(), "Don't see any firmware files");
            Ok(None)
        }
    }
}

/// Two-digit field: zero-padded, or its last two digits
fn two_digits(field: &str) -> String {
    if field.len() < 2 {
        format!("{:0>2}", field)
    } else {
        field[field.len() - 2..].to_string()
    }
}

/// LCD version string `M.mm.pp` derived from an artifact file name
///
/// Major keeps its last digit; minor and patch are zero-padded or
/// truncated to their last two digits.
pub fn device_firmware_version(file_name: &str) -> Option<String> {
    let caps = RE_VERSION.captures(file_name)?;
    let major = &caps[1];
    let major = &major[major.len() - 1..];
    Some(format!("{}.{}.{}", major, two_digits(&caps[2]), two_digits(&caps[3])))
}

/// SHA-256 of the artifact, hex encoded
pub fn firmware_digest(path: &Path) -> Result<String, JigError> {
    let bytes = fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

/// Remembers the selected artifact across runs
#[derive(Debug, Clone)]
pub struct FirmwareCache {
    dir: PathBuf,
    selected: Option<PathBuf>,
}

impl FirmwareCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            selected: None,
        }
    }

    /// Cached artifact if it still exists, otherwise a fresh selection
    pub fn get(&mut self) -> Result<Option<PathBuf>, JigError> {
        if let Some(path) = &self.selected {
            if path.is_file() {
                info!(file = %path.display(), "Use old firmware file");
                return Ok(Some(path.clone()));
            }
        }
        self.selected = select_firmware(&self.dir)?;
        Ok(self.selected.clone())
    }
}

// =============================================================================
// MASS STORAGE
// =============================================================================

/// One row of `lsblk -o NAME,TYPE,MOUNTPOINT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub name: String,
    pub kind: String,
    pub mountpoint: Option<String>,
}

/// Parse lsblk output, dropping the header and tree-drawing prefixes
pub fn parse_lsblk(output: &str) -> Vec<BlockDevice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts
                .next()?
                .trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
                .to_string();
            let kind = parts.next()?.to_string();
            let mountpoint = parts.next().map(str::to_string);
            Some(BlockDevice {
                name,
                kind,
                mountpoint,
            })
        })
        .collect()
}

/// Where the device partition stands relative to the mount point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionState {
    Mounted,
    Unmounted(String),
    Missing,
}

pub fn locate_partition(devices: &[BlockDevice], mount_point: &Path) -> PartitionState {
    let mount = mount_point.to_string_lossy();
    for device in devices.iter().filter(|d| d.kind == "part") {
        match &device.mountpoint {
            Some(mp) if mp.as_str() == mount => return PartitionState::Mounted,
            None => return PartitionState::Unmounted(device.name.clone()),
            Some(_) => {}
        }
    }
    PartitionState::Missing
}

/// Flashes by copying the artifact onto the bootloader's mass-storage drive
#[derive(Debug, Clone)]
pub struct UsbMassStorageFlasher {
    mount_point: PathBuf,
    use_sudo: bool,
}

impl UsbMassStorageFlasher {
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            mount_point: mount_point.into(),
            use_sudo: true,
        }
    }

    pub fn without_sudo(mut self) -> Self {
        self.use_sudo = false;
        self
    }

    fn command(&self, program: &str) -> Command {
        if self.use_sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg(program);
            cmd
        } else {
            Command::new(program)
        }
    }

    fn run(&self, mut cmd: Command, what: &str) -> bool {
        match cmd.status() {
            Ok(status) if status.success() => true,
            Ok(status) => {
                warn!(status = %status, "Failed to {}", what);
                false
            }
            Err(e) => {
                warn!(error = %e, "Failed to {}", what);
                false
            }
        }
    }

    fn mount(&self, device: &str) -> Result<(), JigError> {
        fs::create_dir_all(&self.mount_point)?;
        let mut cmd = self.command("mount");
        cmd.arg(format!("/dev/{}", device)).arg(&self.mount_point);
        if self.run(cmd, "mount") {
            info!(device, mount_point = %self.mount_point.display(), "Mounted");
        }
        Ok(())
    }

    fn unmount(&self) {
        let mut cmd = self.command("umount");
        cmd.arg(&self.mount_point);
        if self.run(cmd, "unmount") {
            info!(mount_point = %self.mount_point.display(), "Unmounted");
        }
    }

    fn device_connected(&self) -> Result<bool, JigError> {
        let output = Command::new("lsblk")
            .args(["-o", "NAME,TYPE,MOUNTPOINT"])
            .output()?;
        let listing = String::from_utf8_lossy(&output.stdout);
        match locate_partition(&parse_lsblk(&listing), &self.mount_point) {
            PartitionState::Mounted => Ok(true),
            PartitionState::Unmounted(device) => {
                self.mount(&device)?;
                Ok(true)
            }
            PartitionState::Missing => Ok(false),
        }
    }
}

impl FirmwareFlasher for UsbMassStorageFlasher {
    fn flash(&mut self, firmware: &Path) -> Result<(), FlashError> {
        if !self.device_connected()? {
            return Err(FlashError::DeviceNotFound);
        }
        let file_name = firmware
            .file_name()
            .ok_or_else(|| FlashError::Other(JigError::Firmware("firmware path has no file name".into())))?;
        let destination = self.mount_point.join(file_name);
        fs::copy(firmware, &destination).map_err(FlashError::Copy)?;
        info!(destination = %destination.display(), "Firmware has been copied to device");
        self.unmount();
        Ok(())
    }
}
