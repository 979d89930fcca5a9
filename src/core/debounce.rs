//! Debounced presence monitor
//!
//! Not threaded: the owning loop calls `poll()` on its own cadence. A sample
//! that differs from the stable level starts a verification: `check_count`
//! re-samples, `interval` apart, must all agree with the new level before the
//! change is reported. Any disagreement discards the change as noise.
//! Worst-case blocking time is `check_count × interval`.

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::JigError;
use crate::hardware::PresenceInput;
use crate::types::{PresenceChange, PresenceLevel, PresenceSample};
use crate::{DEBOUNCE_CHECK_COUNT, DEBOUNCE_TIME_MS};

/// Debounce window parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    pub interval: Duration,
    pub check_count: u32,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEBOUNCE_TIME_MS),
            check_count: DEBOUNCE_CHECK_COUNT,
        }
    }
}

/// Owns the lever input and its stable state
#[derive(Debug)]
pub struct DebouncedPresenceMonitor<P> {
    input: P,
    config: DebounceConfig,
    stable: PresenceLevel,
    last_stable: Option<PresenceLevel>,
}

impl<P: PresenceInput> DebouncedPresenceMonitor<P> {
    /// Seed the stable level from one direct, undebounced read
    pub fn new(mut input: P, config: DebounceConfig) -> Result<Self, JigError> {
        let stable = input.read_presence()?;
        info!(initial = %stable, "Presence monitor seeded");
        Ok(Self {
            input,
            config,
            stable,
            last_stable: None,
        })
    }

    /// Current confirmed level
    pub fn stable(&self) -> PresenceLevel {
        self.stable
    }

    /// Level before the last confirmed transition
    pub fn last_stable(&self) -> Option<PresenceLevel> {
        self.last_stable
    }

    pub fn config(&self) -> DebounceConfig {
        self.config
    }

    /// One raw read, no filtering
    pub fn sample(&mut self) -> Result<PresenceSample, JigError> {
        Ok(PresenceSample::now(self.input.read_presence()?))
    }

    /// Raw level, for checks that must not block (supervisor ticks)
    pub fn read_raw(&mut self) -> Result<PresenceLevel, JigError> {
        self.input.read_presence()
    }

    /// Sample once and, on a difference, verify it over the debounce window
    pub fn poll(&mut self) -> Result<PresenceChange, JigError> {
        let first = self.sample()?;
        if first.level == self.stable {
            return Ok(PresenceChange::Unchanged);
        }

        info!(from = %self.stable, to = %first.level, "Presence changed, waiting for debounce");
        for check in 0..self.config.check_count {
            thread::sleep(self.config.interval);
            let sample = self.sample()?;
            if sample.level != first.level {
                warn!(check, "Debounce check failed");
                return Ok(PresenceChange::Unchanged);
            }
            debug!(check, level = %sample.level, "Debounce check agreed");
        }

        self.last_stable = Some(self.stable);
        self.stable = first.level;
        info!(level = %self.stable, "Debounce check finished successfully");
        Ok(PresenceChange::Changed(self.stable))
    }

    /// Give back the input, e.g. to hand it to a new monitor
    pub fn into_input(self) -> P {
        self.input
    }
}
