//! Jig status published to the status API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::RunResult;

/// What the controller loop is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JigPhase {
    /// Waiting for a device to be seated
    Waiting,
    /// Run in progress
    Testing,
    /// Result shown, waiting for the device to be removed
    AwaitingRemoval,
    /// Controller loop has exited
    Stopped,
}

impl std::fmt::Display for JigPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JigPhase::Waiting => "WAITING",
            JigPhase::Testing => "TESTING",
            JigPhase::AwaitingRemoval => "AWAITING_REMOVAL",
            JigPhase::Stopped => "STOPPED",
        };
        write!(f, "{}", name)
    }
}

/// Snapshot of the controller, overwritten on every phase change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JigStatus {
    pub phase: JigPhase,
    /// Devices that passed since start
    pub device_count: u32,
    /// Result of the most recent run only
    pub last_result: Option<RunResult>,
    pub jig_firmware: String,
    pub device_firmware: String,
    pub updated_at: DateTime<Utc>,
}

impl JigStatus {
    pub fn new(
        phase: JigPhase,
        device_count: u32,
        last_result: Option<RunResult>,
        jig_firmware: impl Into<String>,
        device_firmware: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            device_count,
            last_result,
            jig_firmware: jig_firmware.into(),
            device_firmware: device_firmware.into(),
            updated_at: Utc::now(),
        }
    }
}
