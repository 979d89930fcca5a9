//! Operator feedback on the LCD and RGB indicator
//!
//! Line 1 carries the message. Line 2 is fixed layout:
//! jig firmware at column 0, device firmware at column 4, pass counter
//! (4 digits) right-aligned.

use tracing::{info, warn};

use crate::error::JigError;
use crate::hardware::{Indicator, TextDisplay};
use crate::types::{IndicatorColor, RunResult};

pub const TEXT_WAITING: &str = "CONNECT DEVICE";
pub const TEXT_FLASHING: &str = "FLASH";
pub const TEXT_TESTING: &str = "TESTING";

/// Owns the display and indicator handles
pub struct Feedback {
    display: Box<dyn TextDisplay>,
    indicator: Box<dyn Indicator>,
    columns: usize,
    jig_firmware: String,
    device_firmware: String,
    device_count: u32,
}

impl Feedback {
    pub fn new(
        display: Box<dyn TextDisplay>,
        indicator: Box<dyn Indicator>,
        columns: usize,
        jig_firmware: impl Into<String>,
        device_firmware: impl Into<String>,
    ) -> Self {
        Self {
            display,
            indicator,
            columns,
            jig_firmware: jig_firmware.into(),
            device_firmware: device_firmware.into(),
            device_count: 0,
        }
    }

    pub fn device_count(&self) -> u32 {
        self.device_count
    }

    pub fn jig_firmware(&self) -> &str {
        &self.jig_firmware
    }

    pub fn device_firmware(&self) -> &str {
        &self.device_firmware
    }

    /// Second LCD line
    pub fn status_line(&self) -> String {
        let middle = self.columns.saturating_sub(8);
        let line = format!(
            "{:<4}{:<middle$}{:04}",
            self.jig_firmware,
            self.device_firmware,
            self.device_count % 10_000,
            middle = middle
        );
        line.chars().take(self.columns).collect()
    }

    /// Show `text` and set the indicator. Returns `false` if the text does not
    /// fit on the screen (nothing is written then).
    pub fn show(&mut self, text: &str, color: IndicatorColor) -> Result<bool, JigError> {
        if text.chars().count() > self.columns {
            warn!(text, columns = self.columns, "Text is too long");
            return Ok(false);
        }
        let status = self.status_line();
        self.indicator.set_color(color)?;
        self.display.show(text, &status)?;
        Ok(true)
    }

    pub fn show_waiting(&mut self) -> Result<bool, JigError> {
        let shown = self.show(TEXT_WAITING, IndicatorColor::Blue)?;
        info!("Screen updated to waiting state");
        Ok(shown)
    }

    pub fn show_flashing(&mut self) -> Result<bool, JigError> {
        self.show(TEXT_FLASHING, IndicatorColor::Purple)
    }

    pub fn show_testing(&mut self) -> Result<bool, JigError> {
        self.show(TEXT_TESTING, IndicatorColor::Purple)
    }

    /// Render a resolved run; a pass bumps the counter first
    pub fn show_result(&mut self, result: &RunResult) -> Result<bool, JigError> {
        let color = if result.is_success() {
            self.device_count += 1;
            IndicatorColor::Green
        } else {
            IndicatorColor::Red
        };
        self.show(&result.display_text(), color)
    }
}

impl std::fmt::Debug for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feedback")
            .field("columns", &self.columns)
            .field("jig_firmware", &self.jig_firmware)
            .field("device_firmware", &self.device_firmware)
            .field("device_count", &self.device_count)
            .finish_non_exhaustive()
    }
}
