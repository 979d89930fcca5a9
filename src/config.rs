//! Jig configuration
//!
//! Defaults come from the constants in the crate root. An optional JSON file
//! overrides them, and CLI flags / environment variables override the file.
//! Immutable once the controller starts.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{ControllerTiming, DebounceConfig};
use crate::error::JigError;
use crate::{
    BLUE_LED_MIN_VOLTS, BOOT_STEP_MS, DEBOUNCE_CHECK_COUNT, DEBOUNCE_TIME_MS, DEFAULT_FIRMWARE_DIR,
    DEFAULT_LOG_DIR, DEFAULT_MIDI_DEVICE_NAME, DEFAULT_MOUNT_POINT, DEFAULT_SERIAL_PORT,
    GREEN_LED_MIN_VOLTS, JIG_FIRMWARE_VERSION, MAX_TEST_TIME_SECS, PHOTORESISTOR_MIN_DELTA,
    PHOTORESISTOR_SAMPLES, PLANT_CONNECTED_MIN, PLANT_DISCONNECTED_MAX, PLANT_SAMPLES,
    POLL_INTERVAL_MS, REBOOT_WAIT_SECS, REMOVAL_SETTLE_SECS, SAMPLE_INTERVAL_MS, SERIAL_SETTLE_MS,
};

/// Pass/fail limits used by the sensor and indicator stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageThresholds {
    pub photoresistor_samples: u32,
    pub plant_samples: u32,
    /// Minimum drop in photoresistor ADC reading with the sensor LED on
    pub photoresistor_min_delta: f64,
    /// Maximum generator frequency with the plant relay open
    pub plant_disconnected_max: f64,
    /// Minimum generator frequency with the plant relay closed
    pub plant_connected_min: f64,
    pub blue_led_min_volts: f64,
    pub green_led_min_volts: f64,
    /// Gap between telemetry snapshots when averaging
    pub sample_interval_ms: u64,
}

impl Default for StageThresholds {
    fn default() -> Self {
        Self {
            photoresistor_samples: PHOTORESISTOR_SAMPLES,
            plant_samples: PLANT_SAMPLES,
            photoresistor_min_delta: PHOTORESISTOR_MIN_DELTA,
            plant_disconnected_max: PLANT_DISCONNECTED_MAX,
            plant_connected_min: PLANT_CONNECTED_MIN,
            blue_led_min_volts: BLUE_LED_MIN_VOLTS,
            green_led_min_volts: GREEN_LED_MIN_VOLTS,
            sample_interval_ms: SAMPLE_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JigConfig {
    pub debounce_ms: u64,
    pub debounce_count: u32,
    pub max_test_time_secs: u64,
    pub poll_interval_ms: u64,
    pub removal_settle_secs: u64,
    pub firmware_dir: PathBuf,
    pub mount_point: PathBuf,
    pub serial_port: PathBuf,
    /// Fragment matched against MIDI output names
    pub midi_device_name: String,
    pub log_dir: PathBuf,
    pub jig_firmware: String,
    /// Pause after flashing while the device reboots
    pub reboot_wait_secs: u64,
    /// Pause between boot-sequence steps
    pub boot_step_ms: u64,
    /// Wait for the first log lines after the serial link opens
    pub serial_settle_ms: u64,
    pub thresholds: StageThresholds,
}

impl Default for JigConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEBOUNCE_TIME_MS,
            debounce_count: DEBOUNCE_CHECK_COUNT,
            max_test_time_secs: MAX_TEST_TIME_SECS,
            poll_interval_ms: POLL_INTERVAL_MS,
            removal_settle_secs: REMOVAL_SETTLE_SECS,
            firmware_dir: PathBuf::from(DEFAULT_FIRMWARE_DIR),
            mount_point: PathBuf::from(DEFAULT_MOUNT_POINT),
            serial_port: PathBuf::from(DEFAULT_SERIAL_PORT),
            midi_device_name: DEFAULT_MIDI_DEVICE_NAME.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            jig_firmware: JIG_FIRMWARE_VERSION.to_string(),
            reboot_wait_secs: REBOOT_WAIT_SECS,
            boot_step_ms: BOOT_STEP_MS,
            serial_settle_ms: SERIAL_SETTLE_MS,
            thresholds: StageThresholds::default(),
        }
    }
}

impl JigConfig {
    /// Read a JSON file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self, JigError> {
        let text = fs::read_to_string(path)?;
        let config: JigConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), JigError> {
        if self.debounce_count == 0 {
            return Err(JigError::Config("debounce_count must be at least 1".into()));
        }
        if self.max_test_time_secs == 0 {
            return Err(JigError::Config("max_test_time_secs must be positive".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(JigError::Config("poll_interval_ms must be positive".into()));
        }
        if self.thresholds.photoresistor_samples == 0 || self.thresholds.plant_samples == 0 {
            return Err(JigError::Config("sample counts must be at least 1".into()));
        }
        if self.jig_firmware.chars().count() > 3 {
            return Err(JigError::Config(format!(
                "jig_firmware {:?} does not fit the status line",
                self.jig_firmware
            )));
        }
        Ok(())
    }

    pub fn debounce(&self) -> DebounceConfig {
        DebounceConfig {
            interval: Duration::from_millis(self.debounce_ms),
            check_count: self.debounce_count,
        }
    }

    pub fn max_test_time(&self) -> Duration {
        Duration::from_secs(self.max_test_time_secs)
    }

    pub fn timing(&self) -> ControllerTiming {
        ControllerTiming {
            tick: Duration::from_millis(self.poll_interval_ms),
            removal_settle: Duration::from_secs(self.removal_settle_secs),
        }
    }

    pub fn to_json(&self) -> Result<String, JigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_jig() {
        let config = JigConfig::default();
        assert_eq!(config.debounce(), DebounceConfig::default());
        assert_eq!(config.max_test_time(), Duration::from_secs(70));
        assert_eq!(config.thresholds.plant_connected_min, 50_000.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: JigConfig =
            serde_json::from_str(r#"{"max_test_time_secs": 30, "thresholds": {"blue_led_min_volts": 3.0}}"#)
                .unwrap();
        assert_eq!(config.max_test_time_secs, 30);
        assert_eq!(config.thresholds.blue_led_min_volts, 3.0);
        assert_eq!(config.thresholds.green_led_min_volts, 2.7);
        assert_eq!(config.debounce_count, 2);
    }

    #[test]
    fn test_validate_rejects_zero_count() {
        let config = JigConfig {
            debounce_count: 0,
            ..JigConfig::default()
        };
        assert!(matches!(config.validate(), Err(JigError::Config(_))));
    }
}
