//! Top-level jig loop
//!
//! Waiting → (debounced insert) → Testing → AwaitingRemoval → (raw absent
//! after the settle delay) → Waiting. The loop never exits on a run outcome
//! or a presence read error; only the shutdown flag ends it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::core::{DebouncedPresenceMonitor, Feedback, LatestValueMailbox, Pipeline, RunSupervisor};
use crate::error::JigError;
use crate::hardware::PresenceInput;
use crate::types::{JigPhase, JigStatus, PresenceChange, PresenceLevel, RunResult};
use crate::{POLL_INTERVAL_MS, REMOVAL_SETTLE_SECS};

/// Hardware housekeeping around runs
pub trait JigLifecycle: Send {
    /// Once, before the first device
    fn prepare(&mut self) -> Result<(), JigError> {
        Ok(())
    }

    /// After every resolved run, before feedback is shown
    fn after_run(&mut self, _result: &RunResult) -> Result<(), JigError> {
        Ok(())
    }

    /// Once, when the loop exits
    fn shutdown(&mut self) -> Result<(), JigError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NoopLifecycle;

impl JigLifecycle for NoopLifecycle {}

/// Loop cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerTiming {
    /// Presence and supervisor poll interval
    pub tick: Duration,
    /// Minimum time the result stays up before re-arming
    pub removal_settle: Duration,
}

impl Default for ControllerTiming {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(POLL_INTERVAL_MS),
            removal_settle: Duration::from_secs(REMOVAL_SETTLE_SECS),
        }
    }
}

pub struct JigController<P> {
    monitor: DebouncedPresenceMonitor<P>,
    supervisor: RunSupervisor,
    pipeline: Arc<Pipeline>,
    feedback: Arc<Mutex<Feedback>>,
    lifecycle: Box<dyn JigLifecycle>,
    timing: ControllerTiming,
    status: Arc<LatestValueMailbox<JigStatus>>,
    updates: Option<broadcast::Sender<JigStatus>>,
    shutdown: Arc<AtomicBool>,
    last_result: Option<RunResult>,
}

impl<P: PresenceInput> JigController<P> {
    pub fn new(
        monitor: DebouncedPresenceMonitor<P>,
        supervisor: RunSupervisor,
        pipeline: Arc<Pipeline>,
        feedback: Arc<Mutex<Feedback>>,
        lifecycle: Box<dyn JigLifecycle>,
        timing: ControllerTiming,
    ) -> Self {
        Self {
            monitor,
            supervisor,
            pipeline,
            feedback,
            lifecycle,
            timing,
            status: Arc::new(LatestValueMailbox::new()),
            updates: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            last_result: None,
        }
    }

    /// Publish status into an existing mailbox (shared with the API)
    pub fn with_status(mut self, status: Arc<LatestValueMailbox<JigStatus>>) -> Self {
        self.status = status;
        self
    }

    /// Also push every status change to live subscribers
    pub fn with_updates(mut self, updates: broadcast::Sender<JigStatus>) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn status(&self) -> Arc<LatestValueMailbox<JigStatus>> {
        Arc::clone(&self.status)
    }

    /// Setting this flag ends `run()`; a run in progress is aborted
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn last_result(&self) -> Option<&RunResult> {
        self.last_result.as_ref()
    }

    pub fn device_count(&self) -> u32 {
        self.feedback().device_count()
    }

    fn feedback(&self) -> MutexGuard<'_, Feedback> {
        self.feedback.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn publish(&self, phase: JigPhase) {
        let status = {
            let fb = self.feedback();
            JigStatus::new(
                phase,
                fb.device_count(),
                self.last_result.clone(),
                fb.jig_firmware(),
                fb.device_firmware(),
            )
        };
        if let Some(updates) = &self.updates {
            // No subscribers is fine
            let _ = updates.send(status.clone());
        }
        self.status.publish(status);
    }

    fn show_waiting(&self) {
        if let Err(e) = self.feedback().show_waiting() {
            error!(error = %e, "Failed to update screen");
        }
        self.publish(JigPhase::Waiting);
    }

    /// Loop until the shutdown flag is set
    pub fn run(&mut self) -> Result<(), JigError> {
        self.lifecycle.prepare()?;
        self.show_waiting();
        info!(stages = ?self.pipeline.stage_names(), "Jig ready");

        while !self.shutting_down() {
            if let Err(e) = self.step() {
                error!(error = %e, "Controller step failed");
            }
            thread::sleep(self.timing.tick);
        }

        if let Err(e) = self.lifecycle.shutdown() {
            error!(error = %e, "Shutdown hook failed");
        }
        self.publish(JigPhase::Stopped);
        info!("Jig stopped");
        Ok(())
    }

    /// One debounced poll. Returns the result if a device was tested.
    pub fn step(&mut self) -> Result<Option<RunResult>, JigError> {
        match self.monitor.poll() {
            Ok(PresenceChange::Changed(PresenceLevel::Present)) => {
                info!("Device connected");
                self.run_device().map(Some)
            }
            Ok(PresenceChange::Changed(PresenceLevel::Absent)) => {
                info!("Device disconnected");
                self.show_waiting();
                Ok(None)
            }
            Ok(PresenceChange::Unchanged) => Ok(None),
            Err(e) => {
                warn!(error = %e, "Failed to read presence");
                Ok(None)
            }
        }
    }

    /// Supervise one run, render its result, wait for removal
    pub fn run_device(&mut self) -> Result<RunResult, JigError> {
        self.publish(JigPhase::Testing);

        let shutdown = Arc::clone(&self.shutdown);
        let monitor = &mut self.monitor;
        let result = self.supervisor.run_to_resolution(
            Arc::clone(&self.pipeline),
            self.timing.tick,
            || {
                if shutdown.load(Ordering::Acquire) {
                    return PresenceLevel::Absent;
                }
                match monitor.read_raw() {
                    Ok(level) => level,
                    Err(e) => {
                        warn!(error = %e, "Presence read failed during run");
                        PresenceLevel::Present
                    }
                }
            },
        )?;
        self.supervisor.finish();

        if let Err(e) = self.lifecycle.after_run(&result) {
            error!(error = %e, "Post-run cleanup failed");
        }
        if result.is_success() {
            info!(elapsed_ms = result.elapsed_ms, "Test finished successfully");
        } else {
            warn!(code = result.code, stage = result.stage.as_deref().unwrap_or("-"), "Test failed");
        }
        if let Err(e) = self.feedback().show_result(&result) {
            error!(error = %e, "Failed to update screen");
        }
        self.last_result = Some(result.clone());
        self.publish(JigPhase::AwaitingRemoval);

        self.wait_for_removal();
        Ok(result)
    }

    /// Block until the settle delay has passed and the lever reads absent
    fn wait_for_removal(&mut self) {
        let settle_until = Instant::now() + self.timing.removal_settle;
        info!("Waiting for device removal");
        while !self.shutting_down() {
            if Instant::now() >= settle_until {
                match self.monitor.read_raw() {
                    Ok(PresenceLevel::Absent) => break,
                    Ok(PresenceLevel::Present) => {}
                    Err(e) => warn!(error = %e, "Failed to read presence"),
                }
            }
            thread::sleep(self.timing.tick);
        }
    }
}

impl<P> std::fmt::Debug for JigController<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JigController")
            .field("supervisor", &self.supervisor)
            .field("pipeline", &self.pipeline)
            .field("timing", &self.timing)
            .field("last_result", &self.last_result)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DebounceConfig, Stage};
    use crate::hardware::sim::{SimPanel, SimPresence};
    use crate::types::{IndicatorColor, StageError};

    /// Pulls the device out as soon as the run is over
    struct RemoveAfterRun(SimPanel);

    impl JigLifecycle for RemoveAfterRun {
        fn after_run(&mut self, _result: &RunResult) -> Result<(), JigError> {
            self.0.set_presence(PresenceLevel::Absent);
            Ok(())
        }
    }

    fn controller(panel: &SimPanel, pipeline: Pipeline) -> JigController<SimPresence> {
        let monitor = DebouncedPresenceMonitor::new(
            panel.presence(),
            DebounceConfig {
                interval: Duration::from_millis(1),
                check_count: 2,
            },
        )
        .unwrap();
        let feedback = Feedback::new(
            Box::new(panel.display()),
            Box::new(panel.indicator()),
            16,
            "A01",
            "1.02.03",
        );
        JigController::new(
            monitor,
            RunSupervisor::new(Duration::from_secs(5)),
            Arc::new(pipeline),
            Arc::new(Mutex::new(feedback)),
            Box::new(RemoveAfterRun(panel.clone())),
            ControllerTiming {
                tick: Duration::from_millis(1),
                removal_settle: Duration::from_millis(5),
            },
        )
    }

    #[test]
    fn test_no_device_no_run() {
        let panel = SimPanel::new();
        let mut jig = controller(&panel, Pipeline::new(vec![]));
        assert_eq!(jig.step().unwrap(), None);
        assert!(jig.last_result().is_none());
    }

    #[test]
    fn test_insert_runs_and_counts_pass() {
        let panel = SimPanel::new();
        let mut jig = controller(&panel, Pipeline::new(vec![Stage::new("ok", |_| Ok(()))]));
        panel.set_presence(PresenceLevel::Present);
        let result = jig.step().unwrap().unwrap();
        assert_eq!(result.code, 0);
        assert_eq!(jig.device_count(), 1);
        assert_eq!(panel.state().lines.0, "TEST COMPLETE");
        assert_eq!(jig.status().snapshot().unwrap().phase, JigPhase::AwaitingRemoval);

        // Removal is debounced back to the waiting screen
        assert_eq!(jig.step().unwrap(), None);
        assert_eq!(panel.state().lines.0, "CONNECT DEVICE");
        assert_eq!(panel.state().color, IndicatorColor::Blue);
    }

    #[test]
    fn test_failure_shown_with_code() {
        let panel = SimPanel::new();
        let pipeline = Pipeline::new(vec![
            Stage::new("a", |_| Ok(())),
            Stage::new("b", |_| Err(StageError::failed("X"))),
        ]);
        let mut jig = controller(&panel, pipeline);
        panel.set_presence(PresenceLevel::Present);
        let result = jig.step().unwrap().unwrap();
        assert_eq!(result.code, 2);
        assert_eq!(panel.state().lines.0, "ERROR 02");
        assert_eq!(panel.state().color, IndicatorColor::Red);
        assert_eq!(jig.device_count(), 0);
    }

    #[test]
    fn test_presence_error_does_not_stop_loop() {
        let panel = SimPanel::new();
        let mut jig = controller(&panel, Pipeline::new(vec![]));
        panel.fail_presence_reads(1);
        assert_eq!(jig.step().unwrap(), None);
    }
}
