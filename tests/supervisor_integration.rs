//! Integration tests for the run supervisor
//!
//! End-to-end scenarios with scaled-down durations, and the fixed
//! timeout → presence → completion check order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use jigctl::core::{Pipeline, RunState, RunSupervisor, Stage};
use jigctl::types::{PresenceLevel, RunResolution, StageError};
use jigctl::{CODE_PRESENCE_LOST, CODE_TIMEOUT};
use pretty_assertions::assert_eq;

const TICK: Duration = Duration::from_millis(2);

fn sleeper(name: &str, duration: Duration) -> Stage {
    Stage::new(name, move |token| token.sleep(duration))
}

fn eight_stages(special: usize, stage: Stage) -> Arc<Pipeline> {
    let mut stage = Some(stage);
    let stages = (1..=8)
        .map(|i| {
            if i == special {
                stage.take().unwrap_or_else(|| sleeper("unused", Duration::ZERO))
            } else {
                sleeper(&format!("s{}", i), Duration::from_millis(2))
            }
        })
        .collect();
    Arc::new(Pipeline::new(stages))
}

#[test]
fn test_scenario_a_failure_code_three() {
    let mut supervisor = RunSupervisor::new(Duration::from_secs(5));
    let result = supervisor
        .run_to_resolution(
            eight_stages(3, Stage::new("s3", |_| Err(StageError::failed("X")))),
            TICK,
            || PresenceLevel::Present,
        )
        .unwrap();
    assert_eq!(result.code, 3);
    assert_eq!(result.reason.as_deref(), Some("X"));
    assert_eq!(supervisor.state(), RunState::Completed);
}

#[test]
fn test_scenario_b_all_pass() {
    let mut supervisor = RunSupervisor::new(Duration::from_secs(5));
    let result = supervisor
        .run_to_resolution(
            eight_stages(1, sleeper("s1", Duration::from_millis(2))),
            TICK,
            || PresenceLevel::Present,
        )
        .unwrap();
    assert_eq!(result.code, 0);
    assert_eq!(result.display_text(), "TEST COMPLETE");
    assert!(!supervisor.has_live_worker());
}

#[test]
fn test_scenario_c_stuck_stage_times_out() {
    let mut supervisor = RunSupervisor::new(Duration::from_millis(150));
    let started = Instant::now();
    let result = supervisor
        .run_to_resolution(
            eight_stages(2, sleeper("s2", Duration::from_secs(100))),
            TICK,
            || PresenceLevel::Present,
        )
        .unwrap();
    assert_eq!(result.code, CODE_TIMEOUT);
    assert_eq!(result.resolution, RunResolution::TimedOut);
    assert_eq!(result.stage.as_deref(), Some("s2"));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!supervisor.has_live_worker());

    // Cached from here on
    for _ in 0..3 {
        assert_eq!(supervisor.poll(PresenceLevel::Present), Some(result.clone()));
    }
    assert_eq!(supervisor.state(), RunState::TimedOut);
}

#[test]
fn test_scenario_d_lever_released_during_stage_four() {
    let mut supervisor = RunSupervisor::new(Duration::from_secs(5));
    let released = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&released);
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(80));
        flag.store(true, Ordering::SeqCst);
    });

    let result = supervisor
        .run_to_resolution(
            eight_stages(4, sleeper("s4", Duration::from_secs(30))),
            TICK,
            || {
                if released.load(Ordering::SeqCst) {
                    PresenceLevel::Absent
                } else {
                    PresenceLevel::Present
                }
            },
        )
        .unwrap();
    assert_eq!(result.code, CODE_PRESENCE_LOST);
    assert_eq!(result.stage.as_deref(), Some("s4"));
    assert_eq!(supervisor.state(), RunState::Aborted);
    assert!(!supervisor.has_live_worker());
}

fn wait_for_worker() {
    thread::sleep(Duration::from_millis(50));
}

#[test]
fn test_presence_beats_completion_in_same_tick() {
    let mut supervisor = RunSupervisor::new(Duration::from_secs(5));
    supervisor
        .start(Arc::new(Pipeline::new(vec![Stage::new("quick", |_| Ok(()))])))
        .unwrap();
    wait_for_worker();
    let result = supervisor.poll(PresenceLevel::Absent).unwrap();
    assert_eq!(result.code, CODE_PRESENCE_LOST);
}

#[test]
fn test_timeout_beats_presence_in_same_tick() {
    let mut supervisor = RunSupervisor::new(Duration::from_millis(10));
    supervisor
        .start(Arc::new(Pipeline::new(vec![sleeper("slow", Duration::from_secs(10))])))
        .unwrap();
    wait_for_worker();
    let result = supervisor.poll(PresenceLevel::Absent).unwrap();
    assert_eq!(result.code, CODE_TIMEOUT);
}

#[test]
fn test_back_to_back_runs_get_fresh_tokens() {
    let mut supervisor = RunSupervisor::new(Duration::from_secs(5));
    let first = supervisor
        .run_to_resolution(
            Arc::new(Pipeline::new(vec![sleeper("wait", Duration::from_secs(5))])),
            TICK,
            || PresenceLevel::Absent,
        )
        .unwrap();
    assert_eq!(first.code, CODE_PRESENCE_LOST);
    supervisor.finish();

    // A cancelled previous run must not leak into the next one
    let second = supervisor
        .run_to_resolution(
            Arc::new(Pipeline::new(vec![sleeper("wait", Duration::from_millis(5))])),
            TICK,
            || PresenceLevel::Present,
        )
        .unwrap();
    assert_eq!(second.code, 0);
}
