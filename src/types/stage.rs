//! Stage failure descriptor

use serde::{Deserialize, Serialize};

use crate::error::JigError;

/// Why a stage did not complete
///
/// The pipeline never interprets the reason string; it is forwarded into
/// logs and the run result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum StageError {
    /// Expected negative outcome of the validation step
    #[error("{0}")]
    Failed(String),
    /// Cancellation observed at a suspension point
    #[error("cancelled")]
    Cancelled,
    /// Unexpected failure (driver error, broken invariant)
    #[error("internal fault: {0}")]
    Fault(String),
}

impl StageError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Driver errors reaching a stage through `?` are unexpected by definition
impl From<JigError> for StageError {
    fn from(err: JigError) -> Self {
        StageError::Fault(err.to_string())
    }
}

impl From<std::io::Error> for StageError {
    fn from(err: std::io::Error) -> Self {
        StageError::Fault(err.to_string())
    }
}
