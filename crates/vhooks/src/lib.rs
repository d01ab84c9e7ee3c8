#![forbid(unsafe_code)]

//! vhooks public facade crate.
//!
//! This crate provides the stable surface area for users.
//!
//! ```
//! use vhooks::prelude::*;
//!
//! let lab = LabClock::new();
//! let host = Host::lab(&lab);
//! let ticks = host
//!     .mount((), |scope, _| {
//!         let count = scope.use_ref(|| 0u32);
//!         let next = scope.use_callback((), move |_: &()| {
//!             *count.borrow_mut() += 1;
//!             *count.borrow()
//!         });
//!         use_interval_value(scope, Duration::from_millis(500), &next)
//!     })
//!     .unwrap();
//!
//! assert_eq!(ticks.output(), Some(1));
//! host.advance(Duration::from_secs(1)).unwrap();
//! assert_eq!(ticks.output(), Some(3));
//! ```

pub use vhooks_core as core;
pub use vhooks_runtime as runtime;

pub mod prelude {
    pub use vhooks_core::clock::{Clock, LabClock};
    pub use vhooks_core::event::{Event, EventData, EventKind, KeyEvent, Modifiers};
    pub use vhooks_runtime::{
        Callback, ComponentHandle, Host, HostConfig, HostError, Scope, StateSetter,
        use_event_value, use_event_value_or, use_interval_value, use_interval_value_or,
    };
    pub use web_time::Duration;
}
