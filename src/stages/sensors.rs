//! Photoresistor and plant-input checks over device telemetry
//!
//! Each measurement averages N mailbox snapshots taken `interval` apart. A
//! missing key in any snapshot fails the check with `GET_DATA_FAILED`.

use std::time::Duration;

use tracing::{info, warn};

use crate::config::StageThresholds;
use crate::core::{CancellationQuery, LatestValueMailbox};
use crate::stages::{lock, JigHardware, PLANT_RELAY};
use crate::types::{StageError, TelemetrySample};

pub const GET_DATA_FAILED: &str = "GET_DATA_FAILED";
pub const TEST_FAILED: &str = "TEST_FAILED";

pub const KEY_PHOTORESISTOR: &str = "photoresistor_adc";
pub const KEY_GENERATOR: &str = "generator_freq";

/// Settle time after closing the plant relay
const RELAY_SETTLE: Duration = Duration::from_millis(500);

/// Average of `samples` snapshots of `key`
pub fn average_reading(
    mailbox: &LatestValueMailbox<TelemetrySample>,
    key: &str,
    samples: u32,
    interval: Duration,
    token: &CancellationQuery,
) -> Result<f64, StageError> {
    let mut total = 0.0;
    for _ in 0..samples {
        token.check()?;
        let value = mailbox.snapshot().and_then(|s| s.get_f64(key));
        let Some(value) = value else {
            warn!(key, "Telemetry data missing");
            return Err(StageError::failed(GET_DATA_FAILED));
        };
        total += value;
        token.sleep(interval)?;
    }
    Ok(total / samples.max(1) as f64)
}

/// Run `measure` with an output switched on, switching it off on every path
fn with_output<T>(
    hw: &JigHardware,
    switch: impl Fn(&JigHardware, bool) -> Result<(), StageError>,
    measure: impl FnOnce() -> Result<T, StageError>,
) -> Result<T, StageError> {
    switch(hw, true)?;
    let measured = measure();
    switch(hw, false)?;
    measured
}

fn sensor_led(hw: &JigHardware, on: bool) -> Result<(), StageError> {
    lock(&hw.power).set_sensor_led(on)?;
    Ok(())
}

fn plant_relay(hw: &JigHardware, on: bool) -> Result<(), StageError> {
    lock(&hw.power).set_relay(PLANT_RELAY, on)?;
    Ok(())
}

/// Photoresistor reading must drop by at least the minimum delta with the
/// sensor LED on
pub fn photoresistor_check(
    hw: &JigHardware,
    limits: &StageThresholds,
    interval: Duration,
    token: &CancellationQuery,
) -> Result<(), StageError> {
    let mailbox = hw.serial.mailbox();
    let dark = average_reading(&mailbox, KEY_PHOTORESISTOR, limits.photoresistor_samples, interval, token)?;
    info!(value = dark, "Photoresistor state without leds");

    let lit = with_output(hw, sensor_led, || {
        average_reading(&mailbox, KEY_PHOTORESISTOR, limits.photoresistor_samples, interval, token)
    })?;
    info!(value = lit, "Photoresistor state with leds");

    if dark - lit < limits.photoresistor_min_delta {
        warn!(dark, lit, min_delta = limits.photoresistor_min_delta, "Photoresistor test failed");
        return Err(StageError::failed(TEST_FAILED));
    }
    info!("Photoresistor test complete successfully");
    Ok(())
}

/// Generator frequency must stay low with the plant relay open
pub fn plants_disconnected_check(
    hw: &JigHardware,
    limits: &StageThresholds,
    interval: Duration,
    token: &CancellationQuery,
) -> Result<(), StageError> {
    let value = average_reading(&hw.serial.mailbox(), KEY_GENERATOR, limits.plant_samples, interval, token)?;
    if value > limits.plant_disconnected_max {
        warn!(value, max = limits.plant_disconnected_max, "Too high value without connection");
        return Err(StageError::failed(TEST_FAILED));
    }
    info!(value, "Plant state without connection");
    Ok(())
}

/// Generator frequency must rise above the floor with the plant relay closed
pub fn plants_connected_check(
    hw: &JigHardware,
    limits: &StageThresholds,
    interval: Duration,
    token: &CancellationQuery,
) -> Result<(), StageError> {
    let mailbox = hw.serial.mailbox();
    let value = with_output(hw, plant_relay, || {
        token.sleep(RELAY_SETTLE)?;
        average_reading(&mailbox, KEY_GENERATOR, limits.plant_samples, interval, token)
    })?;
    if value < limits.plant_connected_min {
        warn!(value, min = limits.plant_connected_min, "Too low value with connection");
        return Err(StageError::failed(TEST_FAILED));
    }
    info!(value, "Plant state with connection");
    Ok(())
}
