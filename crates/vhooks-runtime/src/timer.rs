#![forbid(unsafe_code)]

//! Repeating timers.
//!
//! [`TimerQueue`] holds interval timers and fires them when the host pumps
//! it with the current time. It never reads a clock itself, which keeps it
//! equally usable on the wall clock and on a [`LabClock`].
//!
//! # Scheduling rules
//!
//! - A timer started at `t` with period `p` is first due at `t + p`, then
//!   every `p` after that.
//! - Due timers fire one at a time, ordered by `(next_due, start order)`.
//!   [`fire_next()`](TimerQueue::fire_next) fires exactly one, so the host
//!   can finish the turn (re-render, run effects) before the next firing.
//! - A timer that fell behind fires at most `max_catch_up` times per pump;
//!   the remaining backlog is coalesced onto the next future deadline.
//! - A zero-period timer fires exactly once per pump.
//! - A timer started during a pump first fires on the next pump, so a pump
//!   always terminates even when callbacks keep restarting timers.
//! - A timer whose next deadline is not representable as an [`Instant`]
//!   (for example a period of `Duration::MAX`) never fires again.
//!
//! [`LabClock`]: vhooks_core::clock::LabClock

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use web_time::{Duration, Instant};

/// Identifies one timer on a [`TimerQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

struct TimerEntry {
    id: TimerId,
    period: Duration,
    /// `None` once the deadline overflows `Instant`: never due.
    next_due: Option<Instant>,
    fired_this_pump: u32,
    /// Cleared at start, set by `begin_pump`.
    armed: bool,
    active: Rc<Cell<bool>>,
    callback: Rc<dyn Fn()>,
}

impl TimerEntry {
    fn is_due(&self, now: Instant, max_catch_up: u32) -> bool {
        if !self.active.get() || !self.armed || self.next_due.is_none_or(|due| due > now) {
            return false;
        }
        if self.period.is_zero() {
            self.fired_this_pump == 0
        } else {
            self.fired_this_pump < max_catch_up
        }
    }
}

#[derive(Default)]
struct TimerQueueInner {
    entries: Vec<TimerEntry>,
    next_id: u64,
    fired_total: u64,
}

impl TimerQueueInner {
    fn remove(&mut self, id: TimerId) {
        self.entries
            .retain(|entry| entry.id != id && entry.active.get());
    }
}

/// Queue of repeating timers.
///
/// Cloning creates a new handle to the same queue.
#[derive(Clone, Default)]
pub struct TimerQueue {
    inner: Rc<RefCell<TimerQueueInner>>,
}

impl fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("TimerQueue")
            .field("timers", &inner.entries.len())
            .field("fired_total", &inner.fired_total)
            .finish()
    }
}

impl TimerQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a repeating timer. The first firing is due at `now + period`.
    #[must_use = "dropping the IntervalGuard stops the timer immediately"]
    pub fn start(
        &self,
        now: Instant,
        period: Duration,
        callback: impl Fn() + 'static,
    ) -> IntervalGuard {
        let active = Rc::new(Cell::new(true));
        let mut inner = self.inner.borrow_mut();
        let id = TimerId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push(TimerEntry {
            id,
            period,
            next_due: now.checked_add(period),
            fired_this_pump: 0,
            armed: false,
            active: Rc::clone(&active),
            callback: Rc::new(callback),
        });
        IntervalGuard {
            queue: Rc::downgrade(&self.inner),
            id,
            period,
            active,
        }
    }

    /// Reset per-pump bookkeeping. Call once before a sequence of
    /// [`fire_next()`](Self::fire_next) calls at one instant.
    pub fn begin_pump(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.entries.retain(|entry| entry.active.get());
        for entry in &mut inner.entries {
            entry.fired_this_pump = 0;
            entry.armed = true;
        }
    }

    /// Fire the earliest due timer, if any. Returns whether one fired.
    ///
    /// The callback runs with no queue borrow held, so it may start or stop
    /// timers. Panics in the callback propagate to the caller.
    pub fn fire_next(&self, now: Instant, max_catch_up: u32) -> bool {
        let max_catch_up = max_catch_up.max(1);
        let callback = {
            let mut inner = self.inner.borrow_mut();
            let Some(entry) = inner
                .entries
                .iter_mut()
                .filter(|entry| entry.is_due(now, max_catch_up))
                .min_by_key(|entry| (entry.next_due, entry.id))
            else {
                return false;
            };

            entry.fired_this_pump += 1;
            let period = entry.period;
            entry.next_due = entry.next_due.and_then(|due| due.checked_add(period));
            if let Some(due) = entry.next_due {
                if !period.is_zero() && entry.fired_this_pump >= max_catch_up && due <= now {
                    let behind = now.duration_since(due);
                    let skipped = behind.as_nanos() / period.as_nanos() + 1;
                    let skipped = u32::try_from(skipped).unwrap_or(u32::MAX);
                    entry.next_due = due.checked_add(period.saturating_mul(skipped));
                    tracing::warn!(
                        message = "timer.coalesced",
                        timer = entry.id.get(),
                        skipped,
                        period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX)
                    );
                }
            }
            let callback = Rc::clone(&entry.callback);
            inner.fired_total += 1;
            callback
        };
        callback();
        true
    }

    /// Earliest deadline among active periodic timers.
    ///
    /// Zero-period timers are excluded: they are due on every pump and never
    /// define a point in time to advance to. So are timers whose deadline
    /// overflowed.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner
            .borrow()
            .entries
            .iter()
            .filter(|entry| entry.active.get() && !entry.period.is_zero())
            .filter_map(|entry| entry.next_due)
            .min()
    }

    /// Number of running timers.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner
            .borrow()
            .entries
            .iter()
            .filter(|entry| entry.active.get())
            .count()
    }

    /// Total firings across all timers.
    #[must_use]
    pub fn fired_total(&self) -> u64 {
        self.inner.borrow().fired_total
    }
}

/// RAII handle to a running timer. Dropping it stops the timer.
pub struct IntervalGuard {
    queue: Weak<RefCell<TimerQueueInner>>,
    id: TimerId,
    period: Duration,
    active: Rc<Cell<bool>>,
}

impl IntervalGuard {
    #[must_use]
    pub fn id(&self) -> TimerId {
        self.id
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop the timer now. Equivalent to dropping the guard.
    pub fn stop(self) {
        drop(self);
    }
}

impl fmt::Debug for IntervalGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalGuard")
            .field("id", &self.id)
            .field("period", &self.period)
            .field("active", &self.active.get())
            .finish()
    }
}

impl Drop for IntervalGuard {
    fn drop(&mut self) {
        self.active.set(false);
        if let Some(queue) = self.queue.upgrade() {
            if let Ok(mut inner) = queue.try_borrow_mut() {
                inner.remove(self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() + 'static) {
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        (count, move || count_clone.set(count_clone.get() + 1))
    }

    fn pump(queue: &TimerQueue, now: Instant, max_catch_up: u32) -> u32 {
        queue.begin_pump();
        let mut fired = 0;
        while queue.fire_next(now, max_catch_up) {
            fired += 1;
        }
        fired
    }

    #[test]
    fn first_firing_is_one_period_after_start() {
        let t0 = Instant::now();
        let queue = TimerQueue::new();
        let (count, cb) = counter();
        let _guard = queue.start(t0, Duration::from_millis(100), cb);

        assert_eq!(queue.next_deadline(), Some(t0 + Duration::from_millis(100)));
        assert_eq!(pump(&queue, t0 + Duration::from_millis(99), 64), 0);
        assert_eq!(pump(&queue, t0 + Duration::from_millis(100), 64), 1);
        assert_eq!(count.get(), 1);
        assert_eq!(queue.next_deadline(), Some(t0 + Duration::from_millis(200)));
    }

    #[test]
    fn late_pump_catches_up() {
        let t0 = Instant::now();
        let queue = TimerQueue::new();
        let (count, cb) = counter();
        let _guard = queue.start(t0, Duration::from_millis(10), cb);

        assert_eq!(pump(&queue, t0 + Duration::from_millis(35), 64), 3);
        assert_eq!(count.get(), 3);
        assert_eq!(queue.next_deadline(), Some(t0 + Duration::from_millis(40)));
    }

    #[test]
    fn catch_up_is_capped_and_coalesced() {
        let t0 = Instant::now();
        let queue = TimerQueue::new();
        let (count, cb) = counter();
        let _guard = queue.start(t0, Duration::from_millis(10), cb);

        assert_eq!(pump(&queue, t0 + Duration::from_millis(1_000), 4), 4);
        assert_eq!(count.get(), 4);
        let next = queue.next_deadline().unwrap();
        assert!(next > t0 + Duration::from_millis(1_000));
        assert_eq!(next, t0 + Duration::from_millis(1_010));
    }

    #[test]
    fn zero_period_fires_once_per_pump() {
        let t0 = Instant::now();
        let queue = TimerQueue::new();
        let (count, cb) = counter();
        let _guard = queue.start(t0, Duration::ZERO, cb);

        assert_eq!(queue.next_deadline(), None);
        assert_eq!(pump(&queue, t0, 64), 1);
        assert_eq!(pump(&queue, t0, 64), 1);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn due_timers_fire_in_deadline_then_start_order() {
        let t0 = Instant::now();
        let queue = TimerQueue::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let o1 = Rc::clone(&order);
        let o2 = Rc::clone(&order);
        let o3 = Rc::clone(&order);
        let _slow = queue.start(t0, Duration::from_millis(20), move || o1.borrow_mut().push("slow"));
        let _fast = queue.start(t0, Duration::from_millis(10), move || o2.borrow_mut().push("fast"));
        let _twin = queue.start(t0, Duration::from_millis(20), move || o3.borrow_mut().push("twin"));

        pump(&queue, t0 + Duration::from_millis(20), 64);
        assert_eq!(*order.borrow(), vec!["fast", "slow", "fast", "twin"]);
    }

    #[test]
    fn stopped_timer_never_fires() {
        let t0 = Instant::now();
        let queue = TimerQueue::new();
        let (count, cb) = counter();
        let guard = queue.start(t0, Duration::from_millis(5), cb);
        assert_eq!(queue.active_count(), 1);

        guard.stop();
        assert_eq!(queue.active_count(), 0);
        assert_eq!(pump(&queue, t0 + Duration::from_millis(50), 64), 0);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn callback_may_stop_its_own_timer() {
        let t0 = Instant::now();
        let queue = TimerQueue::new();
        let slot: Rc<RefCell<Option<IntervalGuard>>> = Rc::new(RefCell::new(None));
        let slot_clone = Rc::clone(&slot);
        let fired = Rc::new(Cell::new(0u32));
        let fired_clone = Rc::clone(&fired);
        *slot.borrow_mut() = Some(queue.start(t0, Duration::from_millis(1), move || {
            fired_clone.set(fired_clone.get() + 1);
            slot_clone.borrow_mut().take();
        }));

        assert_eq!(pump(&queue, t0 + Duration::from_millis(10), 64), 1);
        assert_eq!(fired.get(), 1);
        assert_eq!(queue.active_count(), 0);
    }

    #[test]
    fn unrepresentable_deadline_never_fires() {
        let t0 = Instant::now();
        let queue = TimerQueue::new();
        let (count, cb) = counter();
        let _guard = queue.start(t0, Duration::MAX, cb);

        assert_eq!(queue.active_count(), 1);
        assert_eq!(queue.next_deadline(), None);
        assert_eq!(pump(&queue, t0 + Duration::from_secs(3_600), 64), 0);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn timer_started_mid_pump_waits_for_next_pump() {
        let t0 = Instant::now();
        let queue = TimerQueue::new();
        let started: Rc<RefCell<Vec<IntervalGuard>>> = Rc::new(RefCell::new(Vec::new()));
        let fired = Rc::new(Cell::new(0u32));

        let queue_clone = queue.clone();
        let started_clone = Rc::clone(&started);
        let fired_clone = Rc::clone(&fired);
        let _spawner = queue.start(t0, Duration::ZERO, move || {
            fired_clone.set(fired_clone.get() + 1);
            let fired = Rc::clone(&fired_clone);
            let guard = queue_clone.start(t0, Duration::ZERO, move || fired.set(fired.get() + 1));
            started_clone.borrow_mut().push(guard);
        });

        assert_eq!(pump(&queue, t0, 64), 1);
        assert_eq!(started.borrow().len(), 1);
        // The spawner and the timer it started in the previous pump.
        assert_eq!(pump(&queue, t0, 64), 2);
        assert_eq!(fired.get(), 3);
    }
}
