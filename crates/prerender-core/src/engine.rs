//! Script engine contract.
//!
//! The core never talks to a concrete JavaScript engine. It drives anything
//! implementing [`ScriptEngine`], created on demand by an [`EngineFactory`].
//! Engine instances do not need to be `Send`: they are created and used on a
//! single engine thread (see [`crate::binding`]).

use serde_json::Value;

use prerender_common::{EngineError, StackFrame};

/// One isolated script environment.
///
/// `load` runs a full script in the instance's global scope; `eval` runs an
/// expression and returns its value as JSON.
pub trait ScriptEngine {
    /// Load and run a script in this instance's global scope.
    ///
    /// Failures are reported as [`EngineError::Program`].
    fn load(&mut self, source: &str) -> Result<(), EngineError>;

    /// Evaluate an expression and convert its value to JSON.
    fn eval(&mut self, script: &str) -> Result<Value, EngineError>;
}

/// Creates fresh engine instances.
///
/// The factory is shared across engine threads; each call must return a new
/// instance with an empty global scope.
pub trait EngineFactory: Send + Sync {
    /// Create a new engine instance.
    fn create(&self) -> Result<Box<dyn ScriptEngine>, EngineError>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Result<Box<dyn ScriptEngine>, EngineError> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn ScriptEngine>, EngineError> {
        self()
    }
}

/// Parse a textual stack trace into frames, most recent call first.
///
/// Understands both `at name (file:line:col)` and `name@file:line:col` lines.
/// Lines without a line number (such as the leading `Error: message`) are
/// skipped.
pub fn parse_stack_trace(stack: &str) -> Vec<StackFrame> {
    stack.lines().filter_map(parse_frame).collect()
}

fn parse_frame(line: &str) -> Option<StackFrame> {
    let line = line.trim();
    let (name, location) = if let Some(rest) = line.strip_prefix("at ") {
        match (rest.rfind('('), rest.strip_suffix(')')) {
            (Some(open), Some(inner)) => (Some(rest[..open].trim()), &inner[open + 1..]),
            _ => (None, rest),
        }
    } else if let Some((name, location)) = line.split_once('@') {
        (Some(name), location)
    } else {
        return None;
    };

    let (file, line_number, column) = split_position(location)?;
    let location = match name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => file.to_string(),
    };

    Some(StackFrame {
        location,
        line: line_number,
        column,
    })
}

/// Split `file:line[:col]` into its parts.
fn split_position(location: &str) -> Option<(&str, u32, Option<u32>)> {
    let (head, last) = location.rsplit_once(':')?;
    let last: u32 = last.parse().ok()?;

    if let Some((file, line)) = head.rsplit_once(':') {
        if let Ok(line) = line.parse() {
            return Some((file, line, Some(last)));
        }
    }

    Some((head, last, None))
}
