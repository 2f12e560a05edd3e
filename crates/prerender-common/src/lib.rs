//! Common types, errors, and configuration for prerender.
//!
//! This crate provides shared functionality used across the prerender workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for the renderer and its config file

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{PoolOptions, RenderMode, RendererConfig};
pub use config_file::{ComponentEntry, ConfigFile, ConfigFileError, SourceEntry, WrapperConfig};
pub use error::{EngineError, PrerenderError, RenderError, StackFrame, props_preview};
