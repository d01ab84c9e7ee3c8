#![forbid(unsafe_code)]

//! Host configuration.
//!
//! [`HostConfig`] bounds the work a host does in a single turn. Defaults are
//! suitable for interactive use; tests usually keep them.
//!
//! With the `host-config` feature the config can be read from TOML:
//!
//! ```toml
//! max_renders_per_flush = 256
//! max_timer_catch_up = 8
//! churn_warning_threshold = 0
//! ```

use crate::error::HostError;

/// Host limits and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "host-config", derive(serde::Deserialize))]
#[cfg_attr(feature = "host-config", serde(default, deny_unknown_fields))]
pub struct HostConfig {
    /// Renders allowed in one flush before it is aborted with
    /// [`HostError::RenderLoop`]. Default: 1024.
    pub max_renders_per_flush: usize,

    /// Firings a late periodic timer may make in one pump before the rest
    /// of its backlog is coalesced. Default: 64.
    pub max_timer_catch_up: u32,

    /// Consecutive re-subscriptions of a value hook after which a
    /// `hook.churn` warning is logged. 0 disables. Default: 8.
    pub churn_warning_threshold: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_renders_per_flush: 1024,
            max_timer_catch_up: 64,
            churn_warning_threshold: 8,
        }
    }
}

impl HostConfig {
    #[must_use]
    pub fn with_max_renders_per_flush(mut self, limit: usize) -> Self {
        self.max_renders_per_flush = limit;
        self
    }

    #[must_use]
    pub fn with_max_timer_catch_up(mut self, limit: u32) -> Self {
        self.max_timer_catch_up = limit;
        self
    }

    #[must_use]
    pub fn with_churn_warning_threshold(mut self, threshold: u32) -> Self {
        self.churn_warning_threshold = threshold;
        self
    }

    /// Reject limits that would stall the host.
    pub fn validate(&self) -> Result<(), HostError> {
        if self.max_renders_per_flush == 0 {
            return Err(HostError::InvalidConfig {
                field: "max_renders_per_flush",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_timer_catch_up == 0 {
            return Err(HostError::InvalidConfig {
                field: "max_timer_catch_up",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(feature = "host-config")]
mod file {
    use std::path::Path;

    use thiserror::Error;

    use super::HostConfig;
    use crate::error::HostError;

    #[derive(Debug, Error)]
    pub enum ConfigError {
        #[error("I/O error: {0}")]
        Io(#[from] std::io::Error),

        #[error("TOML error: {0}")]
        Toml(#[from] toml::de::Error),

        #[error(transparent)]
        Invalid(#[from] HostError),
    }

    impl HostConfig {
        /// Parse and validate a TOML document. Missing fields keep their
        /// defaults.
        pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
            let config: HostConfig = toml::from_str(source)?;
            config.validate()?;
            Ok(config)
        }

        /// Read and validate a TOML file.
        pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
            let source = std::fs::read_to_string(path)?;
            Self::from_toml_str(&source)
        }
    }
}

#[cfg(feature = "host-config")]
pub use file::ConfigError;
