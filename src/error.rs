//! Error types for the controller and its collaborators

use std::io;

/// Errors raised outside of stage execution
#[derive(Debug, thiserror::Error)]
pub enum JigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Hardware error: {0}")]
    Hardware(String),
    #[error("Firmware error: {0}")]
    Firmware(String),
    #[error("MIDI error: {0}")]
    Midi(String),
    /// `start()` called while a run is still active
    #[error("A test run is already in progress")]
    RunInProgress,
    #[error("Failed to spawn {0} thread: {1}")]
    Spawn(&'static str, io::Error),
}

impl JigError {
    pub fn hardware(msg: impl Into<String>) -> Self {
        Self::Hardware(msg.into())
    }
}
