//! Boa script engine binding.
//!
//! [`BoaEngine`] is one isolated Boa [`Context`]. Loading runs a bundle at
//! global scope; evaluating runs the render wrapper and converts the returned
//! holder to JSON.
//!
//! Boa does not track source positions at run time, so only parse failures
//! carry a stack frame (taken from the position Boa reports for them).

use boa_engine::error::{JsNativeError, JsNativeErrorKind};
use boa_engine::object::JsObject;
use boa_engine::object::builtins::JsArray;
use boa_engine::property::PropertyKey;
use boa_engine::value::JsValue;
use boa_engine::{Context, JsError, JsString, Source, js_string};
use serde_json::{Map, Value};
use tracing::trace;

use prerender_common::{EngineError, StackFrame};
use prerender_core::{EngineFactory, ScriptEngine, parse_stack_trace};

use crate::console;

/// 2^53, the bound of exactly representable integers.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Deepest object nesting converted to JSON.
const MAX_DEPTH: usize = 128;

/// A single Boa context.
pub struct BoaEngine {
    context: Context,
}

impl BoaEngine {
    /// Create a context with the `console` host installed.
    pub fn new() -> Result<Self, EngineError> {
        Self::with_console(true)
    }

    /// Create a context, optionally with the `console` host installed.
    ///
    /// Without it, component code falls back to the no-op console from the
    /// bundle prelude.
    pub fn with_console(console: bool) -> Result<Self, EngineError> {
        let mut context = Context::default();
        if console {
            console::install(&mut context).map_err(|e| {
                EngineError::unavailable(format!("failed to install console: {e}"))
            })?;
        }
        Ok(Self { context })
    }
}

impl ScriptEngine for BoaEngine {
    fn load(&mut self, source: &str) -> Result<(), EngineError> {
        trace!(bytes = source.len(), "Loading script");
        self.context
            .eval(Source::from_bytes(source))
            .map(|_| ())
            .map_err(|e| {
                let (message, _) = describe(&e, &mut self.context);
                let frames = if is_syntax(&e) {
                    parse_position(&message).into_iter().collect()
                } else {
                    Vec::new()
                };
                EngineError::Program { message, frames }
            })
    }

    fn eval(&mut self, script: &str) -> Result<Value, EngineError> {
        let value = self
            .context
            .eval(Source::from_bytes(script))
            .map_err(|e| self.translate(&e))?;

        let mut parents = Vec::new();
        to_json(&value, &mut parents, &mut self.context).map_err(|e| self.translate(&e))
    }
}

impl BoaEngine {
    fn translate(&mut self, err: &JsError) -> EngineError {
        let (message, frames) = describe(err, &mut self.context);

        if is_syntax(err) {
            let frames = parse_position(&message).into_iter().collect();
            EngineError::Program { message, frames }
        } else {
            EngineError::Runtime { message, frames }
        }
    }
}

fn is_syntax(err: &JsError) -> bool {
    err.as_native()
        .is_some_and(|native| matches!(native.kind, JsNativeErrorKind::Syntax))
}

/// The `at line N, col M` suffix Boa appends to parse errors.
fn parse_position(message: &str) -> Option<StackFrame> {
    let (_, position) = message.rsplit_once(" at line ")?;
    let (line, column) = position.split_once(", col ")?;

    Some(StackFrame {
        location: "<parse>".to_string(),
        line: line.trim().parse().ok()?,
        column: column.trim().parse().ok(),
    })
}

impl std::fmt::Debug for BoaEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoaEngine").finish_non_exhaustive()
    }
}

/// Creates [`BoaEngine`] instances.
#[derive(Debug, Clone, Copy)]
pub struct BoaFactory {
    console: bool,
}

impl BoaFactory {
    /// A factory whose engines forward `console` calls to `tracing`.
    pub fn new() -> Self {
        Self { console: true }
    }

    /// A factory whose engines have no host `console`.
    pub fn without_console() -> Self {
        Self { console: false }
    }
}

impl Default for BoaFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFactory for BoaFactory {
    fn create(&self) -> Result<Box<dyn ScriptEngine>, EngineError> {
        Ok(Box::new(BoaEngine::with_console(self.console)?))
    }
}

/// Message and stack frames of a thrown value.
///
/// Error objects are described as `Name: message`; anything else thrown is
/// described by its display form.
fn describe(err: &JsError, context: &mut Context) -> (String, Vec<StackFrame>) {
    let Some(object) = err.as_opaque().and_then(JsValue::as_object) else {
        return (err.to_string(), Vec::new());
    };

    let mut read = |key: JsString| {
        object
            .get(key, context)
            .ok()
            .and_then(|value| value.as_string().map(JsString::to_std_string_escaped))
    };

    let name = read(js_string!("name"));
    let message = read(js_string!("message"));
    let frames = read(js_string!("stack"))
        .map(|stack| parse_stack_trace(&stack))
        .unwrap_or_default();

    let message = match (name, message) {
        (Some(name), Some(message)) if !message.is_empty() => format!("{name}: {message}"),
        (Some(name), _) => name,
        (None, Some(message)) => message,
        (None, None) => err.to_string(),
    };
    (message, frames)
}

/// Convert a script value to JSON.
///
/// `undefined`, symbols and functions become `null`; symbol keys are skipped.
/// `parents` holds the objects being converted above `value`; a value that
/// refers back to one of them, or nests deeper than [`MAX_DEPTH`], fails with
/// a `TypeError` like `JSON.stringify` would.
fn to_json(
    value: &JsValue,
    parents: &mut Vec<JsObject>,
    context: &mut Context,
) -> Result<Value, JsError> {
    if value.is_undefined() || value.is_null() || value.is_symbol() {
        return Ok(Value::Null);
    }

    if let Some(b) = value.as_boolean() {
        return Ok(Value::Bool(b));
    }

    if let Some(n) = value.as_number() {
        // Integral values keep an integer representation.
        if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
            #[allow(clippy::cast_possible_truncation)]
            return Ok(Value::Number((n as i64).into()));
        }
        return Ok(serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number));
    }

    if let Some(s) = value.as_string() {
        return Ok(Value::String(s.to_std_string_escaped()));
    }

    let Some(object) = value.as_object() else {
        return Ok(Value::Null);
    };

    if object.is_callable() {
        return Ok(Value::Null);
    }

    if parents.iter().any(|parent| JsObject::equals(parent, object)) {
        return Err(JsNativeError::typ()
            .with_message("cyclic object value in render output")
            .into());
    }
    if parents.len() >= MAX_DEPTH {
        return Err(JsNativeError::typ()
            .with_message(format!("render output nests deeper than {MAX_DEPTH} levels"))
            .into());
    }

    parents.push(object.clone());
    let converted = object_to_json(object, parents, context);
    parents.pop();
    converted
}

fn object_to_json(
    object: &JsObject,
    parents: &mut Vec<JsObject>,
    context: &mut Context,
) -> Result<Value, JsError> {
    if object.is_array() {
        let array = JsArray::from_object(object.clone())?;
        let length = array.length(context)?;
        let mut items = Vec::new();
        for index in 0..length {
            let item = array.get(index, context)?;
            items.push(to_json(&item, parents, context)?);
        }
        return Ok(Value::Array(items));
    }

    let mut map = Map::new();
    for key in object.own_property_keys(context)? {
        let name = match &key {
            PropertyKey::String(s) => s.to_std_string_escaped(),
            PropertyKey::Index(i) => i.get().to_string(),
            PropertyKey::Symbol(_) => continue,
        };
        let item = object.get(key, context)?;
        map.insert(name, to_json(&item, parents, context)?);
    }
    Ok(Value::Object(map))
}
