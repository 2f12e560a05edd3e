//! Configuration structures for prerender.
//!
//! This module defines configuration options for the renderer:
//! - [`RendererConfig`]: Top-level configuration containing all settings
//! - [`PoolOptions`]: Context pool capacity and checkout timeout
//! - [`RenderMode`]: Development or production diagnostics

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RenderError;

/// Top-level renderer configuration.
///
/// This structure can be loaded from files (TOML, JSON) as part of a
/// [`ConfigFile`](crate::config_file::ConfigFile).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RendererConfig {
    /// Context pool configuration.
    #[serde(default)]
    pub pool: PoolOptions,

    /// Diagnostics mode.
    #[serde(default)]
    pub mode: RenderMode,
}

/// Context pool options.
///
/// Unknown keys are rejected so that a misspelled option fails at setup
/// instead of silently falling back to a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolOptions {
    /// Maximum number of execution contexts.
    #[serde(default = "defaults::size")]
    pub size: usize,

    /// Seconds to wait for an idle context before failing.
    #[serde(default = "defaults::timeout")]
    pub timeout: u64,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            size: defaults::size(),
            timeout: defaults::timeout(),
        }
    }
}

impl PoolOptions {
    /// Parse options from a JSON object such as `{"size": 4}`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] for unknown keys, wrong types
    /// or a zero pool size.
    pub fn from_json(value: serde_json::Value) -> Result<Self, RenderError> {
        let options: Self = serde_json::from_value(value)
            .map_err(|e| RenderError::invalid_config(format!("pool options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Check that the options describe a usable pool.
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.size == 0 {
            return Err(RenderError::invalid_config("pool size must be at least 1"));
        }
        Ok(())
    }

    /// Set the pool size.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Set the checkout timeout in seconds.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    /// Get the checkout timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Diagnostics mode.
///
/// In development mode engine stack frames are logged together with the
/// surrounding source lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Log source context for every stack frame.
    Development,
    /// Log only the engine message.
    #[default]
    Production,
}

impl RenderMode {
    /// Returns `true` in development mode.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn size() -> usize {
        10
    }

    pub const fn timeout() -> u64 {
        20
    }
}
