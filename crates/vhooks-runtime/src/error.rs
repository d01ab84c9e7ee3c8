#![forbid(unsafe_code)]

//! Host error types.

use thiserror::Error;

use crate::component::ComponentId;

pub type Result<T> = std::result::Result<T, HostError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("hook order changed in component {component} at slot {slot}")]
    HookOrder { component: ComponentId, slot: usize },

    #[error("render loop: more than {limit} renders in a single flush")]
    RenderLoop { limit: usize },

    #[error("host runs on the real clock; advance() needs a lab clock")]
    RealClock,

    #[error("component {component} is unmounted")]
    Unmounted { component: ComponentId },

    #[error("invalid config field `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}
