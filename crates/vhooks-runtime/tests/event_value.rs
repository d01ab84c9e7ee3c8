#![forbid(unsafe_code)]

//! Integration tests for `use_event_value`.
//!
//! Validates that:
//! 1. The value is `None` (or the initial value) until the first event.
//! 2. Each event of the subscribed kind replaces the value.
//! 3. Changing the kind or the transform swaps the listener with no overlap.
//! 4. Unmount removes the listener; later events are ignored.
//! 5. Subscribe/unsubscribe and churn diagnostics are emitted via tracing.
//! 6. A panicking transform propagates from dispatch; the host keeps working.

use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use vhooks_core::clock::Clock;
use vhooks_core::event::{Event, EventData, EventKind, KeyEvent};
use vhooks_runtime::{Callback, Host, HostConfig, use_event_value, use_event_value_or};
use web_time::Duration;

// ============================================================================
// Helpers
// ============================================================================

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn focus(at: u64) -> Event {
    Event::new(ms(at), EventData::Focus)
}

/// Props for a component whose kind and transform are chosen by the test.
#[derive(Clone)]
struct Probe {
    kind: EventKind,
    transform: Callback<Event, Duration>,
}

fn stamp() -> Callback<Event, Duration> {
    Callback::new(|e: &Event| e.time_stamp)
}

// ============================================================================
// Value tracking
// ============================================================================

#[test]
fn value_tracks_each_event_time_stamp() {
    let host = Host::new();
    let view = host
        .mount((), |scope, _| {
            let transform = scope.use_callback((), |e: &Event| e.time_stamp);
            use_event_value(scope, EventKind::Resize, &transform)
        })
        .unwrap();

    let mut seen = vec![view.output().unwrap()];
    host.dispatch(&Event::resize(ms(10), 80, 24)).unwrap();
    seen.push(view.output().unwrap());
    host.dispatch(&Event::resize(ms(20), 80, 24)).unwrap();
    seen.push(view.output().unwrap());

    assert_eq!(seen, vec![None, Some(ms(10)), Some(ms(20))]);
}

#[test]
fn initial_value_is_kept_until_first_event() {
    let host = Host::new();
    let view = host
        .mount((), |scope, _| {
            let key = scope.use_callback((), |e: &Event| {
                e.key().map(|k| k.key.clone()).unwrap_or_default()
            });
            use_event_value_or(scope, EventKind::KeyDown, &key, String::from("none"))
        })
        .unwrap();
    assert_eq!(view.output().as_deref(), Some("none"));

    host.dispatch(&Event::key_down(ms(1), KeyEvent::new("q"))).unwrap();
    assert_eq!(view.output().as_deref(), Some("q"));
}

#[test]
fn other_kinds_do_not_touch_the_value() {
    let host = Host::new();
    let view = host
        .mount((), |scope, _| {
            let transform = scope.use_callback((), |e: &Event| e.time_stamp);
            use_event_value(scope, EventKind::Focus, &transform)
        })
        .unwrap();

    host.dispatch(&Event::new(ms(5), EventData::Blur)).unwrap();
    host.dispatch(&Event::resize(ms(6), 1, 1)).unwrap();
    assert_eq!(view.output(), Some(None));
    assert_eq!(view.render_count(), 1);
}

#[test]
fn equal_projection_does_not_rerender() {
    let host = Host::new();
    let view = host
        .mount((), |scope, _| {
            let online = scope.use_callback((), |e: &Event| e.is_online());
            use_event_value(scope, EventKind::Online, &online).flatten()
        })
        .unwrap();

    host.dispatch(&Event::new(ms(1), EventData::Online)).unwrap();
    host.dispatch(&Event::new(ms(2), EventData::Online)).unwrap();
    assert_eq!(view.output(), Some(Some(true)));
    assert_eq!(view.render_count(), 2);
}

#[test]
fn transform_runs_once_per_matching_event() {
    let host = Host::new();
    let calls = Rc::new(Cell::new(0u32));
    let calls_clone = Rc::clone(&calls);
    let _view = host
        .mount((), move |scope, _| {
            let calls = Rc::clone(&calls_clone);
            let transform = scope.use_callback((), move |e: &Event| {
                calls.set(calls.get() + 1);
                e.time_stamp
            });
            use_event_value(scope, EventKind::Focus, &transform)
        })
        .unwrap();

    for at in 0..5 {
        host.dispatch(&focus(at)).unwrap();
    }
    assert_eq!(calls.get(), 5);
}

// ============================================================================
// Re-subscription
// ============================================================================

#[test]
fn kind_change_moves_the_listener() {
    let host = Host::new();
    let view = host
        .mount(
            Probe {
                kind: EventKind::Focus,
                transform: stamp(),
            },
            |scope, probe: &Probe| use_event_value(scope, probe.kind, &probe.transform),
        )
        .unwrap();
    host.dispatch(&focus(3)).unwrap();
    assert_eq!(view.output(), Some(Some(ms(3))));

    view.update_props(|probe| probe.kind = EventKind::Blur).unwrap();
    assert_eq!(host.events().listener_count(EventKind::Focus), 0);
    assert_eq!(host.events().listener_count(EventKind::Blur), 1);

    // The value survives the switch and only the new kind updates it.
    host.dispatch(&focus(4)).unwrap();
    assert_eq!(view.output(), Some(Some(ms(3))));
    host.dispatch(&Event::new(ms(9), EventData::Blur)).unwrap();
    assert_eq!(view.output(), Some(Some(ms(9))));
}

#[test]
fn transform_change_never_double_fires() {
    let host = Host::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let tagged = |tag: &'static str| {
        let log = Rc::clone(&log);
        Callback::new(move |e: &Event| {
            log.borrow_mut().push(tag);
            e.time_stamp
        })
    };
    let view = host
        .mount(
            Probe {
                kind: EventKind::Focus,
                transform: tagged("old"),
            },
            |scope, probe: &Probe| use_event_value(scope, probe.kind, &probe.transform),
        )
        .unwrap();

    host.dispatch(&focus(1)).unwrap();
    let next = tagged("new");
    view.update_props(|probe| probe.transform = next).unwrap();
    host.dispatch(&focus(2)).unwrap();

    assert_eq!(*log.borrow(), vec!["old", "new"]);
    assert_eq!(host.events().listener_count(EventKind::Focus), 1);
    assert_eq!(view.output(), Some(Some(ms(2))));
}

#[test]
fn same_props_keep_the_same_listener() {
    let host = Host::new();
    let probe = Probe {
        kind: EventKind::Focus,
        transform: stamp(),
    };
    let view = host
        .mount(probe.clone(), |scope, probe: &Probe| {
            use_event_value(scope, probe.kind, &probe.transform)
        })
        .unwrap();

    view.set_props(probe.clone()).unwrap();
    host.dispatch(&focus(7)).unwrap();
    view.set_props(probe).unwrap();
    assert_eq!(host.events().listener_count(EventKind::Focus), 1);
    assert_eq!(view.output(), Some(Some(ms(7))));
    assert_eq!(view.render_count(), 4);
}

// ============================================================================
// Unmount
// ============================================================================

#[test]
fn unmount_removes_listener_and_ignores_later_events() {
    let host = Host::new();
    let calls = Rc::new(Cell::new(0u32));
    let calls_clone = Rc::clone(&calls);
    let view = host
        .mount((), move |scope, _| {
            let calls = Rc::clone(&calls_clone);
            let transform = scope.use_callback((), move |e: &Event| {
                calls.set(calls.get() + 1);
                e.time_stamp
            });
            use_event_value(scope, EventKind::Focus, &transform)
        })
        .unwrap();
    assert_eq!(host.events().listener_count(EventKind::Focus), 1);

    view.unmount();
    assert_eq!(host.events().listener_count(EventKind::Focus), 0);
    assert_eq!(host.dispatch(&focus(1)).unwrap(), 0);
    assert_eq!(calls.get(), 0);
    assert_eq!(host.mounted_count(), 0);
}

#[test]
fn two_components_track_independently() {
    let host = Host::new();
    let first = host
        .mount((), |scope, _| {
            let transform = scope.use_callback((), |e: &Event| e.time_stamp);
            use_event_value(scope, EventKind::Focus, &transform)
        })
        .unwrap();
    host.dispatch(&focus(1)).unwrap();
    let second = host
        .mount((), |scope, _| {
            let transform = scope.use_callback((), |e: &Event| e.time_stamp);
            use_event_value(scope, EventKind::Focus, &transform)
        })
        .unwrap();

    assert_eq!(first.output(), Some(Some(ms(1))));
    assert_eq!(second.output(), Some(None));
    assert_eq!(host.dispatch(&focus(2)).unwrap(), 2);
    assert_eq!(first.output(), Some(Some(ms(2))));
    assert_eq!(second.output(), Some(Some(ms(2))));
}

// ============================================================================
// Panics
// ============================================================================

#[test]
fn panicking_transform_propagates_and_host_recovers() {
    let host = Host::new();
    let flaky = host
        .mount((), |scope, _| {
            let transform = scope.use_callback((), |e: &Event| {
                if e.time_stamp == ms(13) {
                    panic!("transform rejected event");
                }
                e.time_stamp
            });
            use_event_value(scope, EventKind::Focus, &transform)
        })
        .unwrap();
    let steady = host
        .mount((), |scope, _| {
            let transform = scope.use_callback((), |e: &Event| e.time_stamp);
            use_event_value(scope, EventKind::Blur, &transform)
        })
        .unwrap();

    let payload = catch_unwind(AssertUnwindSafe(|| host.dispatch(&focus(13))))
        .err()
        .expect("dispatch should panic");
    let message = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str));
    assert_eq!(message, Some("transform rejected event"));
    assert_eq!(flaky.output(), Some(None));

    // Same listener, later event.
    host.dispatch(&focus(14)).unwrap();
    assert_eq!(flaky.output(), Some(Some(ms(14))));
    host.dispatch(&Event::new(ms(15), EventData::Blur)).unwrap();
    assert_eq!(steady.output(), Some(Some(ms(15))));
    assert_eq!(host.flush().unwrap(), 0);
    assert_eq!(host.events().listener_count(EventKind::Focus), 1);
}

// ============================================================================
// Tracing
// ============================================================================

#[derive(Default)]
struct Captured {
    messages: Vec<String>,
}

struct Capture {
    state: Arc<Mutex<Captured>>,
}

impl<S> Layer<S> for Capture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        struct Msg {
            message: Option<String>,
        }
        impl tracing::field::Visit for Msg {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.message = Some(value.to_string());
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.message = Some(format!("{value:?}").trim_matches('"').to_string());
                }
            }
        }
        let mut msg = Msg { message: None };
        event.record(&mut msg);
        if let Some(message) = msg.message {
            self.state.lock().expect("capture lock").messages.push(message);
        }
    }
}

fn count(state: &Arc<Mutex<Captured>>, name: &str) -> usize {
    state
        .lock()
        .expect("capture lock")
        .messages
        .iter()
        .filter(|m| m.as_str() == name)
        .count()
}

#[test]
fn subscribe_and_unsubscribe_are_logged() {
    let state = Arc::new(Mutex::new(Captured::default()));
    let subscriber = tracing_subscriber::registry().with(Capture {
        state: Arc::clone(&state),
    });
    let _guard = tracing::subscriber::set_default(subscriber);

    let host = Host::new();
    let view = host
        .mount((), |scope, _| {
            let transform = scope.use_callback((), |e: &Event| e.time_stamp);
            use_event_value(scope, EventKind::Focus, &transform)
        })
        .unwrap();
    assert_eq!(count(&state, "event_value.subscribe"), 1);
    assert_eq!(count(&state, "event_value.unsubscribe"), 0);

    drop(view);
    assert_eq!(count(&state, "event_value.unsubscribe"), 1);
}

#[test]
fn unmemoized_transform_churns_and_warns_once() {
    let state = Arc::new(Mutex::new(Captured::default()));
    let subscriber = tracing_subscriber::registry().with(Capture {
        state: Arc::clone(&state),
    });
    let _guard = tracing::subscriber::set_default(subscriber);

    let host = Host::with_config(
        HostConfig::default().with_churn_warning_threshold(3),
        Clock::Real,
    )
    .unwrap();
    let view = host
        .mount(0u32, |scope, _| {
            // A fresh callback every render: a new identity every time.
            let transform = Callback::new(|e: &Event| e.time_stamp);
            use_event_value(scope, EventKind::Focus, &transform)
        })
        .unwrap();
    for n in 1..=5 {
        view.set_props(n).unwrap();
    }

    assert_eq!(count(&state, "event_value.subscribe"), 6);
    assert_eq!(count(&state, "hook.churn"), 1);
    assert_eq!(host.events().listener_count(EventKind::Focus), 1);
}
