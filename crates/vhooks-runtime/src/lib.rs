#![forbid(unsafe_code)]

//! Runtime: component host, reactive state, global events, timers, and the
//! event/interval value hooks.
//!
//! A [`Host`] mounts components. A component is a render function that
//! receives a [`Scope`] and calls hooks on it; the host re-renders it when
//! its state changes and commits its effects after every render.
//!
//! - [`use_event_value`] keeps the latest projection of a global event.
//! - [`use_interval_value`] keeps the latest result of a function that is
//!   re-run on a fixed period.

pub mod callback;
pub mod component;
pub mod config;
pub mod error;
pub mod event_source;
pub mod hooks;
pub mod host;
pub mod reactive;
pub mod timer;

pub use callback::Callback;
pub use component::{ComponentId, Scope, StateSetter};
#[cfg(feature = "host-config")]
pub use config::ConfigError;
pub use config::HostConfig;
pub use error::{HostError, Result};
pub use event_source::{EventSource, ListenerGuard, ListenerId};
pub use hooks::{use_event_value, use_event_value_or, use_interval_value, use_interval_value_or};
pub use host::{ComponentHandle, Host};
pub use reactive::{Observable, Subscription, WeakObservable};
pub use timer::{IntervalGuard, TimerId, TimerQueue};

pub use vhooks_core;
