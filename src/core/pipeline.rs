//! Ordered, abortable stage pipeline
//!
//! Rules:
//! - stages run strictly in declared order on the calling thread
//! - cancellation is checked before and after every stage
//! - first failure wins; later stages are never attempted
//! - a panic or `Fault` inside a stage stops the pipeline as an internal fault
//! - no retries here; a stage that retries owns its own cancellation checks

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, info, warn};

use crate::core::{CancellationQuery, Stage};
use crate::types::{PipelineOutcome, StageError};
use crate::MAX_STAGE_CODE;

/// Immutable stage list, shared read-only across runs
#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Append a stage (construction time only)
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Operator code for the stage at `index`
    pub fn stage_code(&self, index: usize) -> i32 {
        let positional = (index as i32).saturating_add(1);
        self.stages
            .get(index)
            .and_then(Stage::code)
            .unwrap_or(positional)
            .clamp(1, MAX_STAGE_CODE)
    }

    /// Run every stage in order until one fails or cancellation is seen
    pub fn execute(&self, token: &CancellationQuery) -> PipelineOutcome {
        for (index, stage) in self.stages.iter().enumerate() {
            if token.is_cancelled() {
                info!(stage = stage.name(), "Cancellation observed before stage");
                return PipelineOutcome::Cancelled { stage: None };
            }

            debug!(stage = stage.name(), index, "Stage started");
            let result = panic::catch_unwind(AssertUnwindSafe(|| stage.run(token)));

            if token.is_cancelled() {
                info!(stage = stage.name(), "Cancellation observed after stage");
                return PipelineOutcome::Cancelled {
                    stage: Some(stage.name().to_string()),
                };
            }

            match result {
                Ok(Ok(())) => {
                    debug!(stage = stage.name(), "Stage passed");
                }
                Ok(Err(StageError::Failed(reason))) => {
                    let code = self.stage_code(index);
                    warn!(stage = stage.name(), code, reason = %reason, "Stage failed");
                    return PipelineOutcome::StageFailed {
                        index,
                        code,
                        stage: stage.name().to_string(),
                        reason,
                    };
                }
                Ok(Err(StageError::Cancelled)) => {
                    return PipelineOutcome::Cancelled {
                        stage: Some(stage.name().to_string()),
                    };
                }
                Ok(Err(StageError::Fault(detail))) => {
                    error!(stage = stage.name(), detail = %detail, "Stage fault");
                    return PipelineOutcome::Fault {
                        stage: Some(stage.name().to_string()),
                        detail,
                    };
                }
                Err(payload) => {
                    let detail = panic_message(payload.as_ref());
                    error!(stage = stage.name(), detail = %detail, "Stage panicked");
                    return PipelineOutcome::Fault {
                        stage: Some(stage.name().to_string()),
                        detail,
                    };
                }
            }
        }

        if token.is_cancelled() {
            return PipelineOutcome::Cancelled { stage: None };
        }
        info!(stages = self.stages.len(), "All stages passed");
        PipelineOutcome::Success
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panic: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panic: {}", msg)
    } else {
        "panic with non-string payload".to_string()
    }
}
