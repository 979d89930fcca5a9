//! Run supervisor: worker lifecycle, timeout, lever abort
//!
//! Per run: Idle → Running → {Completed | TimedOut | Aborted | Faulted} → Idle
//!
//! The owning loop calls `poll()` every tick. Each tick checks, in this
//! fixed order:
//! 1. elapsed ≥ max test time → cancel, join, TimedOut (code 10)
//! 2. lever reads absent     → cancel, join, Aborted (code 9)
//! 3. worker finished        → join, Completed/Faulted (pipeline code)
//!
//! Cancellation is cooperative. After a timeout or abort decision the
//! supervisor blocks in `join` until the current stage reaches its next
//! suspension point, so a run may outlast the budget by the longest
//! uninterruptible span of one stage. A resolved state is only ever reported
//! after the worker has been joined.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::core::pipeline::panic_message;
use crate::core::{CancellationToken, Pipeline};
use crate::error::JigError;
use crate::types::{PipelineOutcome, PresenceLevel, RunResolution, RunResult};

/// Supervisor state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    TimedOut,
    Aborted,
    Faulted,
}

impl RunState {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, RunState::Idle | RunState::Running)
    }
}

impl From<RunResolution> for RunState {
    fn from(resolution: RunResolution) -> Self {
        match resolution {
            RunResolution::Completed => RunState::Completed,
            RunResolution::TimedOut => RunState::TimedOut,
            RunResolution::Aborted => RunState::Aborted,
            RunResolution::Faulted => RunState::Faulted,
        }
    }
}

/// Worker of the run in progress
#[derive(Debug)]
struct ActiveRun {
    token: CancellationToken,
    handle: JoinHandle<PipelineOutcome>,
    started: Instant,
}

/// Owns the worker thread of at most one run at a time
#[derive(Debug)]
pub struct RunSupervisor {
    max_test_time: Duration,
    state: RunState,
    active: Option<ActiveRun>,
    resolved: Option<RunResult>,
}

impl RunSupervisor {
    pub fn new(max_test_time: Duration) -> Self {
        Self {
            max_test_time,
            state: RunState::Idle,
            active: None,
            resolved: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn max_test_time(&self) -> Duration {
        self.max_test_time
    }

    /// True while a worker thread exists that has not been joined
    pub fn has_live_worker(&self) -> bool {
        self.active.is_some()
    }

    /// Cached result of the last resolved run
    pub fn result(&self) -> Option<&RunResult> {
        self.resolved.as_ref()
    }

    /// Launch `pipeline` on a fresh worker with a fresh cancellation token.
    ///
    /// # Errors
    ///
    /// `RunInProgress` if the previous run has not resolved yet.
    pub fn start(&mut self, pipeline: Arc<Pipeline>) -> Result<(), JigError> {
        if self.state == RunState::Running {
            return Err(JigError::RunInProgress);
        }

        let token = CancellationToken::new();
        let query = token.query();
        let handle = thread::Builder::new()
            .name("jig-run".to_string())
            .spawn(move || pipeline.execute(&query))
            .map_err(|e| JigError::Spawn("test run", e))?;

        info!(max_test_time_s = self.max_test_time.as_secs_f64(), "Test run started");
        self.active = Some(ActiveRun {
            token,
            handle,
            started: Instant::now(),
        });
        self.resolved = None;
        self.state = RunState::Running;
        Ok(())
    }

    /// Advance the run by one tick. Returns the result once resolved, and
    /// the same cached result on every later call.
    pub fn poll(&mut self, presence: PresenceLevel) -> Option<RunResult> {
        if self.state != RunState::Running {
            return self.resolved.clone();
        }
        let run = self.active.as_ref()?;
        let elapsed = run.started.elapsed();
        let finished = run.handle.is_finished();

        let result = if elapsed >= self.max_test_time {
            warn!(elapsed_ms = elapsed.as_millis() as u64, "Test cycle is stuck, cancelling");
            let (outcome, elapsed) = self.cancel_and_join();
            RunResult::timed_out(outcome.and_then(|o| o.stage().map(str::to_string)), elapsed)
        } else if presence == PresenceLevel::Absent {
            warn!("The lever was released, cancelling");
            let (outcome, elapsed) = self.cancel_and_join();
            RunResult::aborted(outcome.and_then(|o| o.stage().map(str::to_string)), elapsed)
        } else if finished {
            self.join_finished()
        } else {
            return None;
        };

        info!(
            code = result.code,
            resolution = %result.resolution,
            stage = result.stage.as_deref().unwrap_or("-"),
            "Test run resolved"
        );
        self.state = result.resolution.into();
        self.resolved = Some(result.clone());
        Some(result)
    }

    /// Start `pipeline` and poll every `tick` until resolved.
    ///
    /// `presence` is sampled once per tick.
    pub fn run_to_resolution<F>(
        &mut self,
        pipeline: Arc<Pipeline>,
        tick: Duration,
        mut presence: F,
    ) -> Result<RunResult, JigError>
    where
        F: FnMut() -> PresenceLevel,
    {
        self.start(pipeline)?;
        loop {
            if let Some(result) = self.poll(presence()) {
                return Ok(result);
            }
            thread::sleep(tick);
        }
    }

    /// Return to Idle, handing back the resolved result
    pub fn finish(&mut self) -> Option<RunResult> {
        if self.state == RunState::Running {
            return None;
        }
        self.state = RunState::Idle;
        self.resolved.take()
    }

    fn cancel_and_join(&mut self) -> (Option<PipelineOutcome>, Duration) {
        let Some(run) = self.active.take() else {
            return (None, Duration::ZERO);
        };
        run.token.cancel();
        let joined = run.handle.join();
        let elapsed = run.started.elapsed();
        match joined {
            Ok(outcome) => (Some(outcome), elapsed),
            Err(payload) => {
                error!(detail = %panic_message(payload.as_ref()), "Worker panicked during cancellation");
                (None, elapsed)
            }
        }
    }

    fn join_finished(&mut self) -> RunResult {
        let Some(run) = self.active.take() else {
            return RunResult::internal_fault(None, "no active worker".to_string(), Duration::ZERO);
        };
        let joined = run.handle.join();
        let elapsed = run.started.elapsed();
        match joined {
            Ok(outcome) => RunResult::completed(outcome, elapsed),
            Err(payload) => {
                let detail = panic_message(payload.as_ref());
                error!(detail = %detail, "Worker panicked");
                RunResult::internal_fault(None, detail, elapsed)
            }
        }
    }
}

impl Drop for RunSupervisor {
    fn drop(&mut self) {
        if let Some(run) = self.active.take() {
            run.token.cancel();
            let _ = run.handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Stage;
    use crate::types::StageError;

    fn single_stage(stage: Stage) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(vec![stage]))
    }

    #[test]
    fn test_idle_poll_returns_none() {
        let mut supervisor = RunSupervisor::new(Duration::from_secs(1));
        assert_eq!(supervisor.poll(PresenceLevel::Present), None);
        assert_eq!(supervisor.state(), RunState::Idle);
    }

    #[test]
    fn test_refuses_second_start_while_running() {
        let mut supervisor = RunSupervisor::new(Duration::from_secs(5));
        let pipeline = single_stage(Stage::new("wait", |token| token.sleep(Duration::from_secs(5))));
        supervisor.start(Arc::clone(&pipeline)).unwrap();
        assert!(matches!(supervisor.start(pipeline), Err(JigError::RunInProgress)));
        // Abort so the test does not wait for the stage
        let result = supervisor.poll(PresenceLevel::Absent).unwrap();
        assert_eq!(result.code, crate::CODE_PRESENCE_LOST);
    }

    #[test]
    fn test_poll_is_idempotent_after_resolution() {
        let mut supervisor = RunSupervisor::new(Duration::from_secs(5));
        let result = supervisor
            .run_to_resolution(
                single_stage(Stage::new("fails", |_| Err(StageError::failed("X")))),
                Duration::from_millis(1),
                || PresenceLevel::Present,
            )
            .unwrap();
        assert_eq!(result.code, 1);
        assert_eq!(supervisor.state(), RunState::Completed);
        // Presence loss after resolution changes nothing
        assert_eq!(supervisor.poll(PresenceLevel::Absent), Some(result.clone()));
        assert_eq!(supervisor.finish(), Some(result));
        assert_eq!(supervisor.state(), RunState::Idle);
    }

    #[test]
    fn test_fault_resolves_faulted() {
        let mut supervisor = RunSupervisor::new(Duration::from_secs(5));
        let result = supervisor
            .run_to_resolution(
                single_stage(Stage::new("bus", |_| Err(StageError::Fault("nack".into())))),
                Duration::from_millis(1),
                || PresenceLevel::Present,
            )
            .unwrap();
        assert_eq!(result.code, crate::CODE_INTERNAL_FAULT);
        assert_eq!(supervisor.state(), RunState::Faulted);
        assert!(!supervisor.has_live_worker());
    }

    #[test]
    fn test_drop_joins_running_worker() {
        let mut supervisor = RunSupervisor::new(Duration::from_secs(60));
        supervisor
            .start(single_stage(Stage::new("long", |token| token.sleep(Duration::from_secs(60)))))
            .unwrap();
        let start = Instant::now();
        drop(supervisor);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
