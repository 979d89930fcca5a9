//! Integration tests for the controller loop
//!
//! The loop runs on its own thread against the simulated panel; the test
//! plays operator by moving the lever and watching the published status.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use jigctl::core::{
    ControllerTiming, DebounceConfig, DebouncedPresenceMonitor, Feedback, JigController,
    LatestValueMailbox, NoopLifecycle, Pipeline, RunSupervisor, Stage,
};
use jigctl::hardware::sim::SimPanel;
use jigctl::types::{IndicatorColor, JigPhase, JigStatus, PresenceLevel, StageError};
use jigctl::JigError;
use pretty_assertions::assert_eq;

struct Harness {
    panel: SimPanel,
    status: Arc<LatestValueMailbox<JigStatus>>,
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<Result<(), JigError>>,
}

fn start(pipeline: Pipeline, max_test_time: Duration) -> Harness {
    let panel = SimPanel::new();
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
    let mut controller = JigController::new(
        monitor,
        RunSupervisor::new(max_test_time),
        Arc::new(pipeline),
        Arc::new(Mutex::new(feedback)),
        Box::new(NoopLifecycle),
        ControllerTiming {
            tick: Duration::from_millis(2),
            removal_settle: Duration::from_millis(20),
        },
    );
    let status = controller.status();
    let shutdown = controller.shutdown_flag();
    let handle = thread::spawn(move || controller.run());
    Harness {
        panel,
        status,
        shutdown,
        handle,
    }
}

fn wait_for_phase(status: &LatestValueMailbox<JigStatus>, phase: JigPhase) -> JigStatus {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(current) = status.snapshot_cloned() {
            if current.phase == phase {
                return current;
            }
        }
        assert!(Instant::now() < deadline, "never reached {}", phase);
        thread::sleep(Duration::from_millis(2));
    }
}

fn stop(harness: Harness) -> JigStatus {
    harness.shutdown.store(true, Ordering::SeqCst);
    harness.handle.join().unwrap().unwrap();
    harness.status.snapshot_cloned().unwrap()
}

#[test]
fn test_two_devices_pass_then_fail() {
    let fail = Arc::new(AtomicBool::new(false));
    let fail_flag = Arc::clone(&fail);
    let pipeline = Pipeline::new(vec![
        Stage::new("flash", |_| Ok(())),
        Stage::new("check", move |_| {
            if fail_flag.load(Ordering::SeqCst) {
                Err(StageError::failed("TEST_FAILED"))
            } else {
                Ok(())
            }
        }),
    ]);
    let harness = start(pipeline, Duration::from_secs(5));
    wait_for_phase(&harness.status, JigPhase::Waiting);
    assert_eq!(harness.panel.state().lines.0, "CONNECT DEVICE");

    harness.panel.set_presence(PresenceLevel::Present);
    let done = wait_for_phase(&harness.status, JigPhase::AwaitingRemoval);
    assert_eq!(done.device_count, 1);
    assert_eq!(done.last_result.as_ref().map(|r| r.code), Some(0));
    assert_eq!(harness.panel.state().lines, ("TEST COMPLETE".to_string(), "A01 1.02.03 0001".to_string()));

    harness.panel.set_presence(PresenceLevel::Absent);
    wait_for_phase(&harness.status, JigPhase::Waiting);

    fail.store(true, Ordering::SeqCst);
    harness.panel.set_presence(PresenceLevel::Present);
    let done = wait_for_phase(&harness.status, JigPhase::AwaitingRemoval);
    assert_eq!(done.device_count, 1);
    assert_eq!(done.last_result.as_ref().map(|r| r.code), Some(2));
    assert_eq!(harness.panel.state().lines.0, "ERROR 02");
    assert_eq!(harness.panel.state().color, IndicatorColor::Red);

    harness.panel.set_presence(PresenceLevel::Absent);
    wait_for_phase(&harness.status, JigPhase::Waiting);
    assert_eq!(stop(harness).phase, JigPhase::Stopped);
}

#[test]
fn test_lever_released_mid_run_shows_error_09() {
    let pipeline = Pipeline::new(vec![Stage::new("long", |token| token.sleep(Duration::from_secs(30)))]);
    let harness = start(pipeline, Duration::from_secs(60));
    wait_for_phase(&harness.status, JigPhase::Waiting);

    harness.panel.set_presence(PresenceLevel::Present);
    wait_for_phase(&harness.status, JigPhase::Testing);
    harness.panel.set_presence(PresenceLevel::Absent);

    let done = wait_for_phase(&harness.status, JigPhase::AwaitingRemoval);
    assert_eq!(done.last_result.as_ref().map(|r| r.code), Some(9));
    wait_for_phase(&harness.status, JigPhase::Waiting);
    stop(harness);
}

#[test]
fn test_shutdown_aborts_run_in_progress() {
    let pipeline = Pipeline::new(vec![Stage::new("long", |token| token.sleep(Duration::from_secs(30)))]);
    let harness = start(pipeline, Duration::from_secs(60));
    wait_for_phase(&harness.status, JigPhase::Waiting);

    harness.panel.set_presence(PresenceLevel::Present);
    wait_for_phase(&harness.status, JigPhase::Testing);
    let started = Instant::now();
    let last = stop(harness);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(last.phase, JigPhase::Stopped);
    assert_eq!(last.last_result.map(|r| r.code), Some(9));
}

#[test]
fn test_timeout_shows_error_10() {
    let pipeline = Pipeline::new(vec![Stage::new("stuck", |token| token.sleep(Duration::from_secs(30)))]);
    let harness = start(pipeline, Duration::from_millis(100));
    wait_for_phase(&harness.status, JigPhase::Waiting);

    harness.panel.set_presence(PresenceLevel::Present);
    let done = wait_for_phase(&harness.status, JigPhase::AwaitingRemoval);
    assert_eq!(done.last_result.as_ref().map(|r| r.code), Some(10));
    assert_eq!(harness.panel.state().lines.0, "ERROR 10");
    stop(harness);
}
