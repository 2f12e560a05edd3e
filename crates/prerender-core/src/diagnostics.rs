//! Translation of engine failures into [`PrerenderError`]s.
//!
//! Every failure is logged with the engine message. In development mode each
//! stack frame is additionally logged with a window of the concatenated
//! source (bundle followed by wrapper script) around the reported line. The
//! dump is best-effort: frames pointing outside the source are skipped.

use tracing::{error, warn};

use prerender_common::{EngineError, PrerenderError, RenderMode};

/// Lines of context shown on each side of a faulting line.
const CONTEXT_LINES: usize = 3;

/// A failed render, as seen by the translator.
///
/// Frame lines are looked up in `bundle` followed by `wrapper`. Engines that
/// evaluate the wrapper as a separate script number its lines from 1, so a
/// frame inside the wrapper is shown against the bundle line of the same
/// number.
#[derive(Debug)]
pub struct FailedRender<'a> {
    /// Component that failed.
    pub component: &'a str,
    /// Request path.
    pub url_path: &'a str,
    /// Serialized props.
    pub props: &'a str,
    /// The component's bundle source.
    pub bundle: &'a str,
    /// The wrapper script that was evaluated.
    pub wrapper: &'a str,
}

/// Converts engine errors into prerender errors, logging diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct ErrorTranslator {
    mode: RenderMode,
}

impl ErrorTranslator {
    /// Create a translator for the given mode.
    pub fn new(mode: RenderMode) -> Self {
        Self { mode }
    }

    /// Log the failure and build the public error.
    pub fn translate(&self, failed: &FailedRender<'_>, cause: EngineError) -> PrerenderError {
        let kind = if cause.is_program() { "program" } else { "runtime" };
        error!(
            component = failed.component,
            url_path = failed.url_path,
            kind,
            message = cause.message(),
            "JavaScript error during prerender"
        );

        if self.mode.is_development() && !cause.frames().is_empty() {
            dump_frames(failed, &cause);
        }

        PrerenderError::new(failed.component, failed.props, cause)
    }
}

fn dump_frames(failed: &FailedRender<'_>, cause: &EngineError) {
    let source = format!("{}\n{}", failed.bundle, failed.wrapper);

    warn!(
        component = failed.component,
        frames = cause.frames().len(),
        "Stack trace with context (most recent call first)"
    );

    for (index, frame) in cause.frames().iter().enumerate() {
        match source_window(&source, frame.line) {
            Some(window) => warn!(frame = index, location = %frame, "\n{window}"),
            None => warn!(frame = index, location = %frame, "<no source at this line>"),
        }
    }
}

/// Render the lines around `line` (1-based), marking the line itself.
///
/// Returns `None` if `line` is outside the source.
pub fn source_window(source: &str, line: u32) -> Option<String> {
    let lines: Vec<&str> = source.lines().collect();
    let target = usize::try_from(line).ok()?.checked_sub(1)?;
    if target >= lines.len() {
        return None;
    }

    let start = target.saturating_sub(CONTEXT_LINES);
    let end = (target + CONTEXT_LINES).min(lines.len() - 1);
    let width = (end + 1).to_string().len();

    let mut out = format!("<lines {} through {}>:\n", start + 1, end + 1);
    for (index, text) in lines.iter().enumerate().take(end + 1).skip(start) {
        let marker = if index == target { ">>" } else { "  " };
        out.push_str(&format!("{marker} {:>width$} | {text}\n", index + 1));
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prerender_common::StackFrame;

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_window_in_middle() {
        let window = source_window(&numbered(20), 10).unwrap();
        let lines: Vec<&str> = window.lines().collect();

        assert_eq!(lines[0], "<lines 7 through 13>:");
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[4], ">> 10 | line 10");
        assert_eq!(lines[1], "    7 | line 7");
        assert_eq!(lines[7], "   13 | line 13");
    }

    #[test]
    fn test_window_clamped_at_edges() {
        let window = source_window(&numbered(4), 1).unwrap();
        assert!(window.starts_with("<lines 1 through 4>:"));
        assert!(window.contains(">> 1 | line 1"));

        let window = source_window(&numbered(4), 4).unwrap();
        assert!(window.starts_with("<lines 1 through 4>:"));
        assert!(window.contains(">> 4 | line 4"));
    }

    #[test]
    fn test_window_out_of_range() {
        assert!(source_window(&numbered(5), 0).is_none());
        assert!(source_window(&numbered(5), 6).is_none());
        assert!(source_window("", 1).is_none());
    }

    #[test]
    fn test_translate_truncates_props() {
        let props = "a".repeat(60);
        let failed = FailedRender {
            component: "Hello",
            url_path: "/",
            props: &props,
            bundle: "var a;",
            wrapper: "boom()",
        };
        let err = ErrorTranslator::new(RenderMode::Production)
            .translate(&failed, EngineError::runtime("ReferenceError: boom is not defined"));

        assert_eq!(err.component(), "Hello");
        assert_eq!(err.props_preview(), format!("{}...", "a".repeat(47)));
        assert_eq!(err.message(), "ReferenceError: boom is not defined");
    }

    #[test]
    fn test_translate_survives_bad_frames() {
        let failed = FailedRender {
            component: "Hello",
            url_path: "/",
            props: "{}",
            bundle: "var a;\nvar b;",
            wrapper: "boom()",
        };
        let cause = EngineError::Runtime {
            message: "boom".into(),
            frames: vec![
                StackFrame {
                    location: "render".into(),
                    line: 3,
                    column: None,
                },
                StackFrame {
                    location: "nowhere".into(),
                    line: 9_999,
                    column: None,
                },
                StackFrame {
                    location: "zero".into(),
                    line: 0,
                    column: None,
                },
            ],
        };

        let err = ErrorTranslator::new(RenderMode::Development).translate(&failed, cause);
        assert_eq!(err.message(), "boom");
        assert_eq!(err.cause().frames().len(), 3);
    }
}
