//! Cooperative cancellation
//!
//! One token per run, owned by the supervisor. It flips false → true at most
//! once. Stages only ever see a `CancellationQuery` and poll it at their
//! suspension points. Nothing is ever interrupted forcibly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::types::StageError;

/// Longest uninterrupted slice of a cancellable sleep
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Write side of a run's cancellation flag
#[derive(Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Read-only view handed to the pipeline and its stages
    pub fn query(&self) -> CancellationQuery {
        CancellationQuery {
            flag: Arc::clone(&self.flag),
        }
    }
}

/// Read side of a run's cancellation flag
#[derive(Debug, Clone)]
pub struct CancellationQuery {
    flag: Arc<AtomicBool>,
}

impl CancellationQuery {
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<(), StageError> {
        if self.is_cancelled() {
            Err(StageError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, returning early with `Err(Cancelled)` if the
    /// token flips. Latency is bounded by one slice.
    pub fn sleep(&self, duration: Duration) -> Result<(), StageError> {
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}
