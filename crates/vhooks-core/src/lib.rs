#![forbid(unsafe_code)]

//! Core: the global event vocabulary and the time sources hosts run on.

pub mod clock;
pub mod event;

pub use clock::{Clock, LabClock};
pub use event::{Event, EventData, EventKind, KeyEvent, Modifiers, StorageChange};
