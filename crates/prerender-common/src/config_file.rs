//! Configuration file structures for prerender.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`WrapperConfig`]: Render wrapper template, inline or from a file
//! - [`ComponentEntry`]: A component source file to register

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::RendererConfig;

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [renderer]
/// mode = "development"
///
/// [renderer.pool]
/// size = 4
/// timeout = 5
///
/// [wrapper]
/// template = "function prerender(done) { done(Components.render({{component|json}}, {{props}})); }"
///
/// [core]
/// path = "./build/core.js"
///
/// [[components]]
/// name = "Greeting"
/// path = "./build/greeting.js"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Renderer configuration (pool + mode).
    #[serde(default)]
    pub renderer: RendererConfig,

    /// Render wrapper template.
    #[serde(default)]
    pub wrapper: WrapperConfig,

    /// Shared core library loaded before every component.
    pub core: Option<SourceEntry>,

    /// Components to register.
    #[serde(default)]
    pub components: Vec<ComponentEntry>,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// Relative paths inside the file are resolved against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigFileError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }

    /// Look up a component entry by name.
    pub fn component(&self, name: &str) -> Option<&ComponentEntry> {
        self.components.iter().find(|c| c.name == name)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if let Some(core) = self.core.as_mut() {
            core.path = resolve(base, &core.path);
        }
        if let Some(path) = self.wrapper.path.as_mut() {
            *path = resolve(base, path);
        }
        for component in &mut self.components {
            component.path = resolve(base, &component.path);
        }
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Render wrapper template configuration.
///
/// Exactly one of `template` and `path` must be set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WrapperConfig {
    /// Inline template text.
    pub template: Option<String>,

    /// Path to a template file.
    pub path: Option<PathBuf>,
}

impl WrapperConfig {
    /// Return the template text, reading it from disk if configured by path.
    pub fn load(&self) -> Result<String, ConfigFileError> {
        match (&self.template, &self.path) {
            (Some(template), None) => Ok(template.clone()),
            (None, Some(path)) => read_source(path),
            (Some(_), Some(_)) => Err(ConfigFileError::Invalid {
                message: "wrapper: set either `template` or `path`, not both".into(),
            }),
            (None, None) => Err(ConfigFileError::Invalid {
                message: "wrapper: a template is required".into(),
            }),
        }
    }
}

/// A script source file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SourceEntry {
    /// Path to the script file.
    pub path: PathBuf,
}

impl SourceEntry {
    /// Read the script text.
    pub fn load(&self) -> Result<String, ConfigFileError> {
        read_source(&self.path)
    }
}

/// A component to register.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentEntry {
    /// Component name used in render calls.
    pub name: String,

    /// Path to the component's bundled script.
    pub path: PathBuf,
}

impl ComponentEntry {
    /// Read the component's script text.
    pub fn load(&self) -> Result<String, ConfigFileError> {
        read_source(&self.path)
    }
}

fn read_source(path: &Path) -> Result<String, ConfigFileError> {
    std::fs::read_to_string(path).map_err(|e| ConfigFileError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read a file.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },

    /// The configuration is well-formed but unusable.
    #[error("Invalid config file: {message}")]
    Invalid { message: String },
}
