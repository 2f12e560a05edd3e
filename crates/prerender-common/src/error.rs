//! Error types for prerender.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`RenderError`]: Top-level errors returned by the renderer
//! - [`PrerenderError`]: The public failure for a component that threw or failed to load
//! - [`EngineError`]: Failures reported by a script engine instance

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Serialized props longer than this are truncated in error messages.
pub const PROPS_PREVIEW_LIMIT: usize = 50;

/// Number of characters kept when the props preview is truncated.
const PROPS_PREVIEW_KEEP: usize = 47;

/// Top-level render errors.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The component was never registered.
    #[error("Component not found: {component}")]
    ComponentNotFound {
        /// The name that was looked up.
        component: String,
    },

    /// No execution context became idle before the checkout timeout.
    #[error("Context pool exhausted: no context available after {timeout_ms}ms")]
    PoolExhausted {
        /// The checkout timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The pool was shut down by a reconfiguration.
    #[error("Context pool has been shut down")]
    PoolShutdown,

    /// The component failed inside the script engine.
    #[error(transparent)]
    Prerender(#[from] PrerenderError),

    /// The engine thread backing a context could not be started or has died.
    #[error("Script engine unavailable: {reason}")]
    EngineUnavailable {
        /// Description of the failure.
        reason: String,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// The render wrapper template could not be parsed.
    #[error("Invalid wrapper template: {reason}")]
    InvalidTemplate {
        /// Description of the template error.
        reason: String,
    },

    /// Structured props could not be serialized.
    #[error("Failed to serialize props: {0}")]
    Props(#[from] serde_json::Error),
}

impl RenderError {
    /// Create a new `ComponentNotFound` error.
    pub fn component_not_found(component: impl Into<String>) -> Self {
        Self::ComponentNotFound {
            component: component.into(),
        }
    }

    /// Create a new `PoolExhausted` error.
    pub fn pool_exhausted(timeout: Duration) -> Self {
        Self::PoolExhausted {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create a new `EngineUnavailable` error.
    pub fn engine_unavailable(reason: impl Into<String>) -> Self {
        Self::EngineUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidTemplate` error.
    pub fn invalid_template(reason: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error indicates the component was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ComponentNotFound { .. })
    }

    /// Returns `true` if the same request may succeed when retried later.
    ///
    /// Engine failures are deterministic, so only pool exhaustion qualifies.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }
}

/// A component failed to load or threw while rendering.
///
/// Props are reduced to a bounded preview so the error is safe to log.
#[derive(Error, Debug)]
#[error("Encountered error \"{message}\" when prerendering {component} with {props_preview}")]
pub struct PrerenderError {
    component: String,
    props_preview: String,
    message: String,
    #[source]
    cause: EngineError,
}

impl PrerenderError {
    /// Build a prerender error from the failing component, its serialized props
    /// and the engine error.
    pub fn new(component: impl Into<String>, props: &str, cause: EngineError) -> Self {
        Self {
            component: component.into(),
            props_preview: props_preview(props),
            message: cause.message().to_string(),
            cause,
        }
    }

    /// Name of the component that failed.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Truncated props text.
    pub fn props_preview(&self) -> &str {
        &self.props_preview
    }

    /// The message reported by the engine.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The underlying engine error.
    pub fn cause(&self) -> &EngineError {
        &self.cause
    }
}

/// Truncate serialized props for display.
///
/// Props of up to [`PROPS_PREVIEW_LIMIT`] characters are returned verbatim;
/// longer props keep their first 47 characters followed by `...`.
pub fn props_preview(props: &str) -> String {
    if props.chars().count() > PROPS_PREVIEW_LIMIT {
        let mut preview: String = props.chars().take(PROPS_PREVIEW_KEEP).collect();
        preview.push_str("...");
        preview
    } else {
        props.to_string()
    }
}

/// Failures reported by a script engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The script could not be compiled (syntax error or load failure).
    #[error("{message}")]
    Program {
        /// Engine-reported message.
        message: String,
        /// Position of the parse failure, when the engine reports one.
        frames: Vec<StackFrame>,
    },

    /// The script threw while running.
    #[error("{message}")]
    Runtime {
        /// Engine-reported message.
        message: String,
        /// Stack frames, most recent call first.
        frames: Vec<StackFrame>,
    },

    /// The engine could not be reached.
    #[error("{message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },
}

impl EngineError {
    /// Create a new `Program` error.
    pub fn program(message: impl Into<String>) -> Self {
        Self::Program {
            message: message.into(),
            frames: Vec::new(),
        }
    }

    /// Create a new `Runtime` error without stack frames.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
            frames: Vec::new(),
        }
    }

    /// Create a new `Unavailable` error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// The engine-reported message.
    pub fn message(&self) -> &str {
        match self {
            Self::Program { message, .. }
            | Self::Runtime { message, .. }
            | Self::Unavailable { message } => message,
        }
    }

    /// Stack frames attached to the error, if any.
    pub fn frames(&self) -> &[StackFrame] {
        match self {
            Self::Program { frames, .. } | Self::Runtime { frames, .. } => frames,
            Self::Unavailable { .. } => &[],
        }
    }

    /// Returns `true` if the script failed to compile.
    pub fn is_program(&self) -> bool {
        matches!(self, Self::Program { .. })
    }

    /// Returns `true` if the engine could not be reached or lost its state.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// One frame of an in-engine stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Function name or source location as reported by the engine.
    pub location: String,
    /// 1-based line number in the evaluated source.
    pub line: u32,
    /// 1-based column, when the engine reports one.
    pub column: Option<u32>,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Some(column) => write!(f, "{}:{}:{}", self.location, self.line, column),
            None => write!(f, "{}:{}", self.location, self.line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RenderError::component_not_found("Hello");
        assert_eq!(err.to_string(), "Component not found: Hello");

        let err = RenderError::pool_exhausted(Duration::from_secs(2));
        assert_eq!(
            err.to_string(),
            "Context pool exhausted: no context available after 2000ms"
        );
    }

    #[test]
    fn test_props_preview_short() {
        let props = "a".repeat(50);
        assert_eq!(props_preview(&props), props);
        assert_eq!(props_preview("{}"), "{}");
    }

    #[test]
    fn test_props_preview_truncated() {
        let props = "a".repeat(60);
        let preview = props_preview(&props);
        assert_eq!(preview, format!("{}...", "a".repeat(47)));
        assert_eq!(preview.len(), 50);

        let props = "b".repeat(51);
        assert_eq!(props_preview(&props), format!("{}...", "b".repeat(47)));
    }

    #[test]
    fn test_props_preview_counts_characters() {
        let props = "é".repeat(50);
        assert_eq!(props_preview(&props), props);
    }

    #[test]
    fn test_prerender_error_message() {
        let err = PrerenderError::new(
            "Hello",
            r#"{"name":"world"}"#,
            EngineError::runtime("ReferenceError: foo is not defined"),
        );
        assert_eq!(
            err.to_string(),
            r#"Encountered error "ReferenceError: foo is not defined" when prerendering Hello with {"name":"world"}"#
        );
        assert_eq!(err.component(), "Hello");
        assert!(!err.cause().is_program());
    }

    #[test]
    fn test_prerender_error_from() {
        let err = PrerenderError::new("Hello", "{}", EngineError::program("SyntaxError"));
        let render_err: RenderError = err.into();
        assert!(matches!(render_err, RenderError::Prerender(_)));
        assert!(!render_err.is_retryable());
    }

    #[test]
    fn test_is_retryable() {
        assert!(RenderError::pool_exhausted(Duration::from_millis(5)).is_retryable());
        assert!(!RenderError::component_not_found("x").is_retryable());
        assert!(!RenderError::PoolShutdown.is_retryable());
    }

    #[test]
    fn test_is_not_found() {
        assert!(RenderError::component_not_found("x").is_not_found());
        assert!(!RenderError::PoolShutdown.is_not_found());
    }

    #[test]
    fn test_engine_error_frames() {
        let err = EngineError::Runtime {
            message: "boom".into(),
            frames: vec![StackFrame {
                location: "render".into(),
                line: 12,
                column: Some(4),
            }],
        };
        assert_eq!(err.frames().len(), 1);
        assert_eq!(err.frames()[0].to_string(), "render:12:4");
        assert!(EngineError::program("bad").frames().is_empty());
    }
}
