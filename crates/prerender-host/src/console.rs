//! Guest `console` host.
//!
//! Component code runs without a browser, but still calls `console.log` and
//! friends. This module installs a native `console` object whose methods
//! forward to `tracing`, tagged with `guest_log = true` so guest output can be
//! filtered apart from the renderer's own logs. The calling render's span
//! (and its `render_id`) is current while the guest runs.

use std::fmt;

use boa_engine::native_function::NativeFunction;
use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::value::JsValue;
use boa_engine::{Context, JsResult, JsString, js_string};
use tracing::{debug, error, info, warn};

/// Severity of a guest log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// The level used by a `console` method, if it is one we forward.
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "debug" | "trace" => Some(Self::Debug),
            "log" | "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Forwards guest log lines to `tracing`.
pub struct ConsoleHost;

impl ConsoleHost {
    /// Emit one guest log line.
    pub fn log(level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => debug!(guest_log = true, "{}", message),
            LogLevel::Info => info!(guest_log = true, "{}", message),
            LogLevel::Warn => warn!(guest_log = true, "{}", message),
            LogLevel::Error => error!(guest_log = true, "{}", message),
        }
    }
}

/// Join console arguments the way browsers print them: strings verbatim,
/// everything else in display form, separated by spaces.
pub fn join_args(args: &[JsValue]) -> String {
    args.iter()
        .map(|arg| match arg.as_string() {
            Some(s) => s.to_std_string_escaped(),
            None => arg.display().to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn forward(level: LogLevel, args: &[JsValue]) -> JsResult<JsValue> {
    ConsoleHost::log(level, &join_args(args));
    Ok(JsValue::undefined())
}

fn console_debug(_this: &JsValue, args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    forward(LogLevel::Debug, args)
}

fn console_info(_this: &JsValue, args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    forward(LogLevel::Info, args)
}

fn console_warn(_this: &JsValue, args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    forward(LogLevel::Warn, args)
}

fn console_error(_this: &JsValue, args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    forward(LogLevel::Error, args)
}

type ConsoleMethod = fn(&JsValue, &[JsValue], &mut Context) -> JsResult<JsValue>;

/// Methods installed on the guest `console`.
pub const CONSOLE_METHODS: [&str; 6] = ["debug", "trace", "log", "info", "warn", "error"];

fn method_for(level: LogLevel) -> ConsoleMethod {
    match level {
        LogLevel::Debug => console_debug,
        LogLevel::Info => console_info,
        LogLevel::Warn => console_warn,
        LogLevel::Error => console_error,
    }
}

/// Register the global `console` object.
pub fn install(context: &mut Context) -> JsResult<()> {
    let mut console = ObjectInitializer::new(context);
    for name in CONSOLE_METHODS {
        if let Some(level) = LogLevel::from_method(name) {
            console.function(
                NativeFunction::from_fn_ptr(method_for(level)),
                JsString::from(name),
                0,
            );
        }
    }
    let console = console.build();

    context.register_global_property(js_string!("console"), console, Attribute::all())
}
