#![forbid(unsafe_code)]

//! Value hooks: derived values that follow global events or a timer.
//!
//! - [`use_event_value`] / [`use_event_value_or`]: the latest
//!   `transform(event)` for events of one [`EventKind`].
//! - [`use_interval_value`] / [`use_interval_value_or`]: the latest
//!   `transform()`, re-evaluated every `period`.
//!
//! Each hook owns one state cell and one subscription (a listener or a
//! timer). The subscription is keyed on `(kind or period, transform)`:
//! when either changes between renders the old subscription is torn down
//! and a new one started during the same commit, so no event or tick can
//! reach both.
//!
//! # Transform identity
//!
//! A [`Callback`] compares by identity. Building a new one on every render
//! re-subscribes on every render; wrap it in
//! [`Scope::use_callback`](crate::Scope::use_callback) instead. The hooks
//! do not correct this. When a hook re-subscribes on
//! `churn_warning_threshold` consecutive renders a `hook.churn` warning is
//! logged.
//!
//! # Example
//!
//! ```
//! use vhooks_core::event::{Event, EventKind};
//! use vhooks_runtime::{Host, use_event_value};
//! use web_time::Duration;
//!
//! let host = Host::new();
//! let view = host
//!     .mount((), |scope, _| {
//!         let width = scope.use_callback((), |e: &Event| e.viewport().map(|(w, _)| w));
//!         use_event_value(scope, EventKind::Resize, &width).flatten()
//!     })
//!     .unwrap();
//! assert_eq!(view.output(), Some(None));
//!
//! host.dispatch(&Event::resize(Duration::from_millis(4), 120, 40)).unwrap();
//! assert_eq!(view.output(), Some(Some(120)));
//! ```

use vhooks_core::event::{Event, EventKind};
use web_time::Duration;

use crate::callback::Callback;
use crate::component::{ComponentId, Scope, StateSetter};

/// Latest `transform(event)` for events of `kind`, or `None` before the
/// first one.
pub fn use_event_value<T>(
    scope: &mut Scope<'_>,
    kind: EventKind,
    transform: &Callback<Event, T>,
) -> Option<T>
where
    T: Clone + PartialEq + 'static,
{
    let (value, setter) = scope.use_state(|| None::<T>);
    listen(scope, kind, transform, move |next| {
        setter.set(Some(next));
    });
    value
}

/// Latest `transform(event)` for events of `kind`, starting at `initial`.
///
/// `initial` is only used on the first render.
pub fn use_event_value_or<T>(
    scope: &mut Scope<'_>,
    kind: EventKind,
    transform: &Callback<Event, T>,
    initial: T,
) -> T
where
    T: Clone + PartialEq + 'static,
{
    let (value, setter) = scope.use_state(|| initial);
    listen(scope, kind, transform, move |next| {
        setter.set(next);
    });
    value
}

/// Latest `transform()`, re-evaluated every `period`.
///
/// The first value comes from one synchronous `transform()` call during the
/// mount render, so there is always a value.
pub fn use_interval_value<T>(
    scope: &mut Scope<'_>,
    period: Duration,
    transform: &Callback<(), T>,
) -> T
where
    T: Clone + PartialEq + 'static,
{
    let seed = transform.clone();
    let (value, setter) = scope.use_state(move || seed.invoke());
    every(scope, period, transform, setter);
    value
}

/// Latest `transform()`, re-evaluated every `period`, starting at `initial`
/// without calling `transform` at mount.
pub fn use_interval_value_or<T>(
    scope: &mut Scope<'_>,
    period: Duration,
    transform: &Callback<(), T>,
    initial: T,
) -> T
where
    T: Clone + PartialEq + 'static,
{
    let (value, setter) = scope.use_state(|| initial);
    every(scope, period, transform, setter);
    value
}

fn listen<T: 'static>(
    scope: &mut Scope<'_>,
    kind: EventKind,
    transform: &Callback<Event, T>,
    store: impl Fn(T) + 'static,
) {
    let component = scope.id();
    let events = scope.host().events().clone();
    let handler = transform.clone();
    let scheduled = scope.use_effect((kind, transform.clone()), move || {
        tracing::debug!(
            message = "event_value.subscribe",
            component = component.get(),
            kind = kind.as_str()
        );
        let listener = events.add_listener(kind, move |event| store(handler.call(event)));
        (
            listener,
            Unsubscribed {
                component,
                detail: Detail::Kind(kind),
            },
        )
    });
    track_churn(scope, "event_value", scheduled);
}

fn every<T>(
    scope: &mut Scope<'_>,
    period: Duration,
    transform: &Callback<(), T>,
    setter: StateSetter<T>,
) where
    T: Clone + PartialEq + 'static,
{
    let component = scope.id();
    let timers = scope.host().timers().clone();
    let clock = scope.host().clock().clone();
    let tick = transform.clone();
    let scheduled = scope.use_effect((period, transform.clone()), move || {
        tracing::debug!(
            message = "interval_value.start",
            component = component.get(),
            period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX)
        );
        let timer = timers.start(clock.now(), period, move || {
            setter.set(tick.invoke());
        });
        (
            timer,
            Unsubscribed {
                component,
                detail: Detail::Period(period),
            },
        )
    });
    track_churn(scope, "interval_value", scheduled);
}

/// Logs the teardown of a hook subscription. Stored after the guard it
/// describes, so it drops after the guard.
struct Unsubscribed {
    component: ComponentId,
    detail: Detail,
}

enum Detail {
    Kind(EventKind),
    Period(Duration),
}

impl Drop for Unsubscribed {
    fn drop(&mut self) {
        let component = self.component.get();
        match self.detail {
            Detail::Kind(kind) => tracing::debug!(
                message = "event_value.unsubscribe",
                component,
                kind = kind.as_str()
            ),
            Detail::Period(period) => tracing::debug!(
                message = "interval_value.stop",
                component,
                period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX)
            ),
        }
    }
}

#[derive(Default)]
struct ChurnTracker {
    consecutive: u32,
}

fn track_churn(scope: &mut Scope<'_>, hook: &'static str, scheduled: bool) {
    let threshold = scope.host().config().churn_warning_threshold;
    let first_render = scope.is_first_render();
    let tracker = scope.use_ref(ChurnTracker::default);
    let mut tracker = tracker.borrow_mut();
    if !scheduled || first_render {
        tracker.consecutive = 0;
        return;
    }
    tracker.consecutive = tracker.consecutive.saturating_add(1);
    if threshold > 0 && tracker.consecutive == threshold {
        tracing::warn!(
            message = "hook.churn",
            hook,
            component = scope.id().get(),
            renders = threshold,
            hint = "transform identity changes on every render; memoize it with use_callback"
        );
    }
}
