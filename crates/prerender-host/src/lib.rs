//! Boa engine binding for prerender.
//!
//! This crate provides the concrete script engine behind
//! [`prerender_core::EngineFactory`]:
//!
//! - [`boa`]: One isolated Boa context per component, JSON value conversion
//!   and error classification
//! - [`console`]: A native `console` object that forwards guest logs to
//!   `tracing`
//!
//! # Error Classification
//!
//! Failures while loading a bundle, and syntax errors while evaluating, are
//! reported as program errors. Anything thrown while evaluating is a runtime
//! error; when the thrown value carries a `stack`, its frames are attached.

pub mod boa;
pub mod console;

pub use boa::{BoaEngine, BoaFactory};
pub use console::{ConsoleHost, LogLevel};
