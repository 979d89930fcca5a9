//! Pipeline outcomes and the run result reported to the operator

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CODE_INTERNAL_FAULT, CODE_PRESENCE_LOST, CODE_SUCCESS, CODE_TIMEOUT};

/// What a pipeline execution ended with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Every stage succeeded
    Success,
    /// First failing stage; later stages were not attempted
    StageFailed {
        /// 0-based position in the pipeline
        index: usize,
        /// Operator-facing code (1..=8)
        code: i32,
        stage: String,
        reason: String,
    },
    /// Cancellation observed; `stage` is the stage that was running, if any
    Cancelled { stage: Option<String> },
    /// Unexpected fault, caught at the pipeline boundary
    Fault { stage: Option<String>, detail: String },
}

impl PipelineOutcome {
    /// Name of the stage the outcome points at
    pub fn stage(&self) -> Option<&str> {
        match self {
            PipelineOutcome::Success => None,
            PipelineOutcome::StageFailed { stage, .. } => Some(stage),
            PipelineOutcome::Cancelled { stage } | PipelineOutcome::Fault { stage, .. } => {
                stage.as_deref()
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineOutcome::Cancelled { .. })
    }
}

/// Terminal supervisor state a run resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunResolution {
    /// Worker finished on its own (success or stage failure)
    Completed,
    /// Wall-clock budget exceeded
    TimedOut,
    /// Lever released mid-run
    Aborted,
    /// Internal fault in a stage or the worker
    Faulted,
}

impl std::fmt::Display for RunResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunResolution::Completed => "COMPLETED",
            RunResolution::TimedOut => "TIMED_OUT",
            RunResolution::Aborted => "ABORTED",
            RunResolution::Faulted => "FAULTED",
        };
        write!(f, "{}", name)
    }
}

/// Produced exactly once per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Operator-facing code: 0, 1..=8, 9, 10 or -1
    pub code: i32,
    pub resolution: RunResolution,
    /// Stage the code points at, when known
    pub stage: Option<String>,
    /// Stage-supplied reason or fault detail
    pub reason: Option<String>,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    fn new(
        code: i32,
        resolution: RunResolution,
        stage: Option<String>,
        reason: Option<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            code,
            resolution,
            stage,
            reason,
            elapsed_ms: elapsed.as_millis() as u64,
            finished_at: Utc::now(),
        }
    }

    /// Map a pipeline that finished on its own
    pub fn completed(outcome: PipelineOutcome, elapsed: Duration) -> Self {
        match outcome {
            PipelineOutcome::Success => {
                Self::new(CODE_SUCCESS, RunResolution::Completed, None, None, elapsed)
            }
            PipelineOutcome::StageFailed {
                code, stage, reason, ..
            } => Self::new(code, RunResolution::Completed, Some(stage), Some(reason), elapsed),
            PipelineOutcome::Fault { stage, detail } => Self::internal_fault(stage, detail, elapsed),
            // Nobody asked for it, so a stage reported cancellation on its own
            PipelineOutcome::Cancelled { stage } => Self::internal_fault(
                stage,
                "stage reported cancellation without a request".to_string(),
                elapsed,
            ),
        }
    }

    pub fn timed_out(stage: Option<String>, elapsed: Duration) -> Self {
        Self::new(CODE_TIMEOUT, RunResolution::TimedOut, stage, None, elapsed)
    }

    pub fn aborted(stage: Option<String>, elapsed: Duration) -> Self {
        Self::new(CODE_PRESENCE_LOST, RunResolution::Aborted, stage, None, elapsed)
    }

    pub fn internal_fault(stage: Option<String>, detail: String, elapsed: Duration) -> Self {
        Self::new(
            CODE_INTERNAL_FAULT,
            RunResolution::Faulted,
            stage,
            Some(detail),
            elapsed,
        )
    }

    pub fn is_success(&self) -> bool {
        self.code == CODE_SUCCESS
    }

    /// First LCD line for this result
    pub fn display_text(&self) -> String {
        if self.is_success() {
            "TEST COMPLETE".to_string()
        } else {
            format!("ERROR {:02}", self.code)
        }
    }

    /// Single-line form for logs
    pub fn to_parseable_string(&self) -> String {
        format!(
            "code={} | resolution={} | stage={} | reason={} | elapsed={:.1}s",
            self.code,
            self.resolution,
            self.stage.as_deref().unwrap_or("-"),
            self.reason.as_deref().unwrap_or("-"),
            self.elapsed_ms as f64 / 1000.0
        )
    }
}
