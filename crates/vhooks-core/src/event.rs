#![forbid(unsafe_code)]

//! Canonical global event types.
//!
//! The global event source delivers environment-level events that are not
//! owned by any single component: viewport resizes, focus changes,
//! connectivity changes, keyboard input and so on.
//!
//! # Design
//!
//! The set of recognized event types is closed. [`EventKind`] names a type,
//! [`EventData`] is the sum type of payload shapes (one variant per kind), and
//! [`Event`] pairs a payload with the timestamp at which it was dispatched.
//! Listeners register by [`EventKind`] and receive the full [`Event`].
//!
//! # Invariants
//!
//! 1. `Event::kind()` is a pure function of the payload variant.
//! 2. `EventKind::from_name(kind.as_str()) == Some(kind)` for every kind.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use web_time::Duration;

/// Recognized global event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EventKind {
    Resize,
    Scroll,
    Focus,
    Blur,
    Online,
    Offline,
    KeyDown,
    KeyUp,
    PointerMove,
    VisibilityChange,
    Storage,
    HashChange,
    BeforeUnload,
}

impl EventKind {
    /// Every recognized kind, in declaration order.
    pub const ALL: [EventKind; 13] = [
        EventKind::Resize,
        EventKind::Scroll,
        EventKind::Focus,
        EventKind::Blur,
        EventKind::Online,
        EventKind::Offline,
        EventKind::KeyDown,
        EventKind::KeyUp,
        EventKind::PointerMove,
        EventKind::VisibilityChange,
        EventKind::Storage,
        EventKind::HashChange,
        EventKind::BeforeUnload,
    ];

    /// The lowercase DOM-style event name (`"resize"`, `"keydown"`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resize => "resize",
            Self::Scroll => "scroll",
            Self::Focus => "focus",
            Self::Blur => "blur",
            Self::Online => "online",
            Self::Offline => "offline",
            Self::KeyDown => "keydown",
            Self::KeyUp => "keyup",
            Self::PointerMove => "pointermove",
            Self::VisibilityChange => "visibilitychange",
            Self::Storage => "storage",
            Self::HashChange => "hashchange",
            Self::BeforeUnload => "beforeunload",
        }
    }

    /// Look up a kind by its event name. Unknown names yield `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognized event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind(pub String);

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event kind: {:?}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

bitflags! {
    /// Keyboard modifier state attached to key events.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
        const META  = 0b1000;
    }
}

/// Payload of a key event.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyEvent {
    /// Logical key value, e.g. `"a"` or `"Enter"`.
    pub key: String,
    pub modifiers: Modifiers,
    /// True when the event is an auto-repeat of a held key.
    pub repeat: bool,
}

impl KeyEvent {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            modifiers: Modifiers::empty(),
            repeat: false,
        }
    }

    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// Payload of a storage change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StorageChange {
    /// `None` when the whole store was cleared.
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Payload shapes, one variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventData {
    Resize { width: u32, height: u32 },
    Scroll { x: f64, y: f64 },
    Focus,
    Blur,
    Online,
    Offline,
    KeyDown(KeyEvent),
    KeyUp(KeyEvent),
    PointerMove { x: f64, y: f64 },
    VisibilityChange { visible: bool },
    Storage(StorageChange),
    HashChange { old_url: String, new_url: String },
    BeforeUnload,
}

impl EventData {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Resize { .. } => EventKind::Resize,
            Self::Scroll { .. } => EventKind::Scroll,
            Self::Focus => EventKind::Focus,
            Self::Blur => EventKind::Blur,
            Self::Online => EventKind::Online,
            Self::Offline => EventKind::Offline,
            Self::KeyDown(_) => EventKind::KeyDown,
            Self::KeyUp(_) => EventKind::KeyUp,
            Self::PointerMove { .. } => EventKind::PointerMove,
            Self::VisibilityChange { .. } => EventKind::VisibilityChange,
            Self::Storage(_) => EventKind::Storage,
            Self::HashChange { .. } => EventKind::HashChange,
            Self::BeforeUnload => EventKind::BeforeUnload,
        }
    }
}

/// A dispatched global event.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    /// Time since the event source's origin at which the event was created.
    pub time_stamp: Duration,
    pub data: EventData,
}

impl Event {
    #[must_use]
    pub fn new(time_stamp: Duration, data: EventData) -> Self {
        Self { time_stamp, data }
    }

    #[must_use]
    pub fn resize(time_stamp: Duration, width: u32, height: u32) -> Self {
        Self::new(time_stamp, EventData::Resize { width, height })
    }

    #[must_use]
    pub fn key_down(time_stamp: Duration, key: KeyEvent) -> Self {
        Self::new(time_stamp, EventData::KeyDown(key))
    }

    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.data.kind()
    }

    /// `(width, height)` for resize events.
    #[must_use]
    pub fn viewport(&self) -> Option<(u32, u32)> {
        match self.data {
            EventData::Resize { width, height } => Some((width, height)),
            _ => None,
        }
    }

    /// Key payload for `KeyDown`/`KeyUp` events.
    #[must_use]
    pub fn key(&self) -> Option<&KeyEvent> {
        match &self.data {
            EventData::KeyDown(key) | EventData::KeyUp(key) => Some(key),
            _ => None,
        }
    }

    /// Connectivity implied by an `Online`/`Offline` event.
    #[must_use]
    pub fn is_online(&self) -> Option<bool> {
        match self.data {
            EventData::Online => Some(true),
            EventData::Offline => Some(false),
            _ => None,
        }
    }
}
