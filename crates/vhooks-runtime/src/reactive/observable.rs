#![forbid(unsafe_code)]

//! Version-tracked shared values with change notification.
//!
//! # Design
//!
//! [`Observable<T>`] keeps its value, a version counter and a list of
//! subscriber callbacks in `Rc<RefCell<..>>`. Subscribers are held as `Weak`
//! pointers; the strong side lives in the [`Subscription`] guard returned by
//! [`subscribe()`](Observable::subscribe), so dropping the guard is all it
//! takes to unsubscribe. Dead entries are pruned during the next
//! notification.
//!
//! # Invariants
//!
//! 1. `version` increments exactly once per `set` that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current one is a no-op.
//! 4. No `RefCell` borrow is held while subscriber callbacks run, so a
//!    callback may read or write the same observable.
//!
//! # Failure Modes
//!
//! - **Subscriber panics**: the value and version are already updated;
//!   subscribers after the panicking one are not notified for this change.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Callback<T> = dyn Fn(&T);

struct ObservableInner<T> {
    value: T,
    version: u64,
    subscribers: Vec<Weak<Callback<T>>>,
}

/// A shared, version-tracked value.
///
/// Cloning an `Observable` creates a new handle to the **same** value.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Access the current value by reference.
    ///
    /// # Panics
    ///
    /// Panics if the closure calls `set()` on the same observable.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Replace the value and notify subscribers.
    ///
    /// Returns `true` if the value changed.
    pub fn set(&self, value: T) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return false;
            }
            inner.value = value;
            inner.version += 1;
        }
        self.notify();
        true
    }

    /// Compute a new value from the current one and store it.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let next = self.with(f);
        self.set(next)
    }

    /// Register a change callback. The callback stays registered for as long
    /// as the returned [`Subscription`] is alive.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: Rc<Callback<T>> = Rc::new(callback);
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&strong));
        Subscription {
            _callback: Box::new(strong),
        }
    }

    /// Number of changes applied so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// A non-owning handle that does not keep the value alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakObservable<T> {
        WeakObservable {
            inner: Rc::downgrade(&self.inner),
        }
    }

    fn notify(&self) {
        let (snapshot, callbacks) = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|w| w.strong_count() > 0);
            let callbacks: Vec<Rc<Callback<T>>> =
                inner.subscribers.iter().filter_map(|w| w.upgrade()).collect();
            (inner.value.clone(), callbacks)
        };
        for callback in callbacks {
            callback(&snapshot);
        }
    }
}

/// Weak handle to an [`Observable`].
pub struct WeakObservable<T> {
    inner: Weak<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for WeakObservable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for WeakObservable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakObservable")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl<T> WeakObservable<T> {
    #[must_use]
    pub fn upgrade(&self) -> Option<Observable<T>> {
        self.inner.upgrade().map(|inner| Observable { inner })
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

/// RAII guard for an [`Observable`] subscription.
///
/// Dropping it unsubscribes the callback.
pub struct Subscription {
    _callback: Box<dyn Any>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
