#![forbid(unsafe_code)]

//! Time sources for timers and event timestamps.
//!
//! A [`Clock`] is either the real wall clock or a [`LabClock`] whose time is
//! advanced explicitly. Hosts built on a lab clock are fully deterministic:
//! interval timers fire only when the test moves time forward.
//!
//! # Example
//!
//! ```
//! use vhooks_core::clock::{Clock, LabClock};
//! use web_time::Duration;
//!
//! let lab = LabClock::new();
//! let clock = Clock::Lab(lab.clone());
//! let t0 = clock.now();
//! lab.advance(Duration::from_millis(250));
//! assert_eq!(clock.now().duration_since(t0), Duration::from_millis(250));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use web_time::{Duration, Instant};

/// A manually-advanceable clock for deterministic tests.
///
/// All clones share the same time.
#[derive(Debug, Clone)]
pub struct LabClock {
    epoch: Instant,
    offset_us: Arc<AtomicU64>,
}

impl LabClock {
    /// Create a new lab clock starting at `Instant::now()`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the lab clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let us = delta.as_micros().min(u64::MAX as u128) as u64;
        self.offset_us.fetch_add(us, Ordering::Release);
    }

    /// Move the clock forward to at least `target`. Targets in the past are
    /// ignored.
    ///
    /// The clock ticks in whole microseconds, so sub-microsecond remainders
    /// round up: after this call `now() >= target` always holds.
    pub fn advance_to(&self, target: Instant) {
        if let Some(delta) = target.checked_duration_since(self.now()) {
            let us = delta.as_nanos().div_ceil(1_000).min(u64::MAX as u128) as u64;
            self.offset_us.fetch_add(us, Ordering::Release);
        }
    }

    /// Current lab time.
    #[must_use]
    pub fn now(&self) -> Instant {
        let offset = Duration::from_micros(self.offset_us.load(Ordering::Acquire));
        self.epoch + offset
    }

    /// Total time advanced since construction.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.offset_us.load(Ordering::Acquire))
    }
}

impl Default for LabClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Time source used by a host.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    /// Real wall-clock time.
    #[default]
    Real,
    /// Deterministic lab clock.
    Lab(LabClock),
}

impl Clock {
    #[must_use]
    pub fn now(&self) -> Instant {
        match self {
            Self::Real => Instant::now(),
            Self::Lab(lab) => lab.now(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_lab(&self) -> bool {
        matches!(self, Self::Lab(_))
    }

    /// The lab clock, if this is one.
    #[must_use]
    pub fn as_lab(&self) -> Option<&LabClock> {
        match self {
            Self::Lab(lab) => Some(lab),
            Self::Real => None,
        }
    }
}
