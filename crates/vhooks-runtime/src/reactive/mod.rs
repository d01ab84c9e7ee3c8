#![forbid(unsafe_code)]

//! Reactive state cells.
//!
//! - [`Observable`]: a shared, version-tracked value wrapper with change
//!   notification via subscriber callbacks.
//! - [`Subscription`]: RAII guard that automatically unsubscribes on drop.
//! - [`WeakObservable`]: non-owning handle, used by state setters so a
//!   destroyed component's cell is not kept alive by stray listeners.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op (no version bump,
//!    no notifications).
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.

pub mod observable;

pub use observable::{Observable, Subscription, WeakObservable};
