// SPDX-License-Identifier: MIT

//! Wall-clock source for the pipeline.
//!
//! Everything the pipeline stamps is epoch milliseconds: `queued_at` on a
//! [`JobEnvelope`](crate::JobEnvelope), the `x-error-timestamp` header
//! written before a message is dead-lettered, and the start/finish/TTL
//! bookkeeping of validation sessions. The trait carries exactly that one
//! reading so tests can drive time explicitly.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current time in epoch milliseconds.
///
/// `'static` because the worker runtime moves its clock into spawned
/// consumer tasks.
pub trait Clock: Clone + Send + Sync + 'static {
    fn epoch_ms(&self) -> u64;
}

/// System wall clock.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Controllable clock for tests.
///
/// Clones share one reading, so a test can hold a handle while the engine
/// under test holds another and both observe the same advances.
#[derive(Clone)]
pub struct FakeClock {
    epoch_ms: Arc<Mutex<u64>>,
}

impl FakeClock {
    /// Starts at an arbitrary nonzero reading so a zero timestamp in an
    /// envelope or header stands out as a bug.
    pub fn new() -> Self {
        Self {
            epoch_ms: Arc::new(Mutex::new(1_000_000)),
        }
    }

    /// Advance the clock.
    pub fn advance(&self, duration: Duration) {
        *self.epoch_ms.lock() += duration.as_millis() as u64;
    }

    /// Jump to an absolute epoch-milliseconds reading (session TTL tests
    /// pick exact expiry boundaries this way).
    pub fn set_epoch_ms(&self, ms: u64) {
        *self.epoch_ms.lock() = ms;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        *self.epoch_ms.lock()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
