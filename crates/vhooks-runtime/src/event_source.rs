#![forbid(unsafe_code)]

//! The global event source.
//!
//! [`EventSource`] is the ambient dispatcher for environment-level events.
//! Listeners register per [`EventKind`] and are invoked in registration
//! order. Registration returns a [`ListenerGuard`]; dropping the guard
//! removes the listener.
//!
//! # Invariants
//!
//! 1. A listener is invoked only for events of the kind it registered for.
//! 2. No registry borrow is held while a listener runs. Listeners may add or
//!    remove listeners (including themselves) during dispatch.
//! 3. A listener removed during a dispatch is not invoked for the remainder
//!    of that dispatch, nor for any later one.
//! 4. A listener added during a dispatch first sees the next event.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use vhooks_core::event::{Event, EventKind};

/// Identifies one registration on an [`EventSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

type Handler = dyn Fn(&Event);

struct ListenerEntry {
    id: ListenerId,
    active: Rc<Cell<bool>>,
    handler: Rc<Handler>,
}

#[derive(Default)]
struct EventSourceInner {
    listeners: AHashMap<EventKind, Vec<ListenerEntry>>,
    next_id: u64,
    dispatched: u64,
}

impl EventSourceInner {
    fn remove(&mut self, kind: EventKind, id: ListenerId) {
        if let Some(entries) = self.listeners.get_mut(&kind) {
            entries.retain(|entry| entry.id != id && entry.active.get());
            if entries.is_empty() {
                self.listeners.remove(&kind);
            }
        }
    }
}

/// Dispatcher for global events.
///
/// Cloning creates a new handle to the same registry.
#[derive(Clone, Default)]
pub struct EventSource {
    inner: Rc<RefCell<EventSourceInner>>,
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let total: usize = inner.listeners.values().map(Vec::len).sum();
        f.debug_struct("EventSource")
            .field("listeners", &total)
            .field("dispatched", &inner.dispatched)
            .finish()
    }
}

impl EventSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    #[must_use = "dropping the ListenerGuard removes the listener immediately"]
    pub fn add_listener(&self, kind: EventKind, handler: impl Fn(&Event) + 'static) -> ListenerGuard {
        let active = Rc::new(Cell::new(true));
        let mut inner = self.inner.borrow_mut();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.entry(kind).or_default().push(ListenerEntry {
            id,
            active: Rc::clone(&active),
            handler: Rc::new(handler),
        });
        ListenerGuard {
            source: Rc::downgrade(&self.inner),
            kind,
            id,
            active,
        }
    }

    /// Deliver `event` to every listener registered for its kind.
    ///
    /// Returns the number of listeners invoked. Panics raised by a listener
    /// propagate to the caller; later listeners are skipped for this event.
    pub fn dispatch(&self, event: &Event) -> usize {
        let kind = event.kind();
        let snapshot: Vec<(Rc<Cell<bool>>, Rc<Handler>)> = {
            let mut inner = self.inner.borrow_mut();
            inner.dispatched += 1;
            match inner.listeners.get(&kind) {
                Some(entries) => entries
                    .iter()
                    .map(|entry| (Rc::clone(&entry.active), Rc::clone(&entry.handler)))
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut invoked = 0;
        for (active, handler) in snapshot {
            if !active.get() {
                continue;
            }
            handler(event);
            invoked += 1;
        }
        tracing::trace!(message = "event_source.dispatch", kind = kind.as_str(), invoked);
        invoked
    }

    /// Live listeners for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner
            .borrow()
            .listeners
            .get(&kind)
            .map_or(0, |entries| entries.iter().filter(|e| e.active.get()).count())
    }

    /// Live listeners across all kinds.
    #[must_use]
    pub fn total_listeners(&self) -> usize {
        self.inner
            .borrow()
            .listeners
            .values()
            .flatten()
            .filter(|e| e.active.get())
            .count()
    }

    /// Events dispatched so far.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.inner.borrow().dispatched
    }
}

/// RAII registration on an [`EventSource`].
pub struct ListenerGuard {
    source: Weak<RefCell<EventSourceInner>>,
    kind: EventKind,
    id: ListenerId,
    active: Rc<Cell<bool>>,
}

impl ListenerGuard {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Remove the listener now. Equivalent to dropping the guard.
    pub fn remove(self) {
        drop(self);
    }
}

impl fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("active", &self.active.get())
            .finish()
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.active.set(false);
        // A busy registry keeps the inactive entry; it is pruned on the next removal.
        if let Some(source) = self.source.upgrade() {
            if let Ok(mut inner) = source.try_borrow_mut() {
                inner.remove(self.kind, self.id);
            }
        }
    }
}
