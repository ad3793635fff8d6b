//! Time sources for leases and commit timestamps.
//!
//! The store and the lease registry share one clock so that lease
//! expirations and commit deadlines are judged against the same notion of
//! now. Tests drive a [`ManualClock`]; production uses [`SystemClock`].

use relay_engine::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of commit timestamps.
pub trait Clock: Send + Sync {
    /// The current time. Successive calls never go backwards.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time with a logical component to keep reads monotonic when
/// the wall clock stalls within one nanosecond tick.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: Mutex<Timestamp>,
}

impl SystemClock {
    /// Create a system clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if wall > last.wall_nanos {
            *last = Timestamp::new(wall, 0);
        } else {
            last.logical += 1;
        }
        *last
    }
}

/// A clock driven entirely by the caller, for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Create a clock starting at `start_nanos`.
    pub fn new(start_nanos: u64) -> Self {
        Self {
            nanos: AtomicU64::new(start_nanos),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, nanos: u64) {
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Set the clock to an absolute wall value.
    pub fn set(&self, nanos: u64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.nanos.load(Ordering::SeqCst), 0)
    }
}
