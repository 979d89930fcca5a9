//! Latest-value mailbox
//!
//! Single slot, overwrite on publish, snapshot on read. Readers get an
//! `Arc` to the whole published value, so a sample is never observed
//! half-written. Slow readers silently skip intermediate values.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// Single-slot broadcast cell
#[derive(Debug)]
pub struct LatestValueMailbox<T> {
    slot: ArcSwapOption<T>,
    generation: AtomicU64,
}

impl<T> Default for LatestValueMailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestValueMailbox<T> {
    /// Empty mailbox
    pub fn new() -> Self {
        Self {
            slot: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
        }
    }

    /// Replace the held value unconditionally
    pub fn publish(&self, value: T) {
        self.slot.store(Some(Arc::new(value)));
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Most recent value, or `None` if nothing was published yet. Never blocks.
    pub fn snapshot(&self) -> Option<Arc<T>> {
        self.slot.load_full()
    }

    /// Drop the held value; readers see the empty sentinel again
    pub fn clear(&self) {
        self.slot.store(None);
    }

    /// Number of publishes so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.slot.load().is_none()
    }
}

impl<T: Clone> LatestValueMailbox<T> {
    /// Owned copy of the most recent value
    pub fn snapshot_cloned(&self) -> Option<T> {
        self.snapshot().map(|value| (*value).clone())
    }
}
