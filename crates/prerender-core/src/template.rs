//! Render wrapper templates.
//!
//! The wrapper script is a fixed harness around a user-supplied snippet. The
//! harness declares a no-op `prerender(done)` entry point, splices the
//! rendered snippet in (which is expected to redefine `prerender`), then calls
//! it with a completion callback that stores the produced markup in
//! `outputValue`. If the call throws, the error's stack (or the error itself)
//! is stored in `outputValue` and the exception is re-raised.
//!
//! Snippet placeholders:
//!
//! | Placeholder            | Inserted text                      |
//! |------------------------|------------------------------------|
//! | `{{component}}`        | component name, raw                |
//! | `{{url_path}}`         | request path, raw                  |
//! | `{{props}}`            | serialized props, raw              |
//! | `{{<name>\|json}}`     | the value as a quoted JS string    |

use prerender_common::RenderError;

const HARNESS_HEAD: &str = "(function () {
  var __output__ = { outputValue: null };
  var __done__ = function (value) {
    __output__.outputValue = value;
  };

  function prerender(done) {}

";

const HARNESS_TAIL: &str = "

  try {
    prerender(__done__);
  } catch (e) {
    __output__.outputValue = (e && e.stack) ? String(e.stack) : String(e);
    throw e;
  }
  return __output__;
})()";

/// Values available to a template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateVars<'a> {
    /// Component being rendered.
    pub component: &'a str,
    /// Request path the component renders for.
    pub url_path: &'a str,
    /// Serialized props.
    pub props: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variable {
    Component,
    UrlPath,
    Props,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    Raw,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Var(Variable, Filter),
}

/// A parsed wrapper template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperTemplate {
    segments: Vec<Segment>,
}

impl WrapperTemplate {
    /// Parse a snippet.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidTemplate`] for unterminated tags and
    /// unknown variables or filters.
    pub fn parse(snippet: &str) -> Result<Self, RenderError> {
        let mut segments = Vec::new();
        let mut rest = snippet;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Text(rest[..open].to_string()));
            }
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| {
                RenderError::invalid_template(format!(
                    "unterminated placeholder at byte {}",
                    snippet.len() - rest.len() + open
                ))
            })?;
            segments.push(parse_placeholder(&after[..close])?);
            rest = &after[close + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Render the snippet with the given values.
    pub fn render(&self, vars: &TemplateVars<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Var(var, filter) => {
                    let value = match var {
                        Variable::Component => vars.component,
                        Variable::UrlPath => vars.url_path,
                        Variable::Props => vars.props,
                    };
                    match filter {
                        Filter::Raw => out.push_str(value),
                        Filter::Json => out.push_str(&js_string_literal(value)),
                    }
                }
            }
        }
        out
    }

    /// Build the complete wrapper script for one render.
    pub fn wrapper_script(&self, vars: &TemplateVars<'_>) -> String {
        let snippet = self.render(vars);
        let mut script = String::with_capacity(HARNESS_HEAD.len() + snippet.len() + HARNESS_TAIL.len());
        script.push_str(HARNESS_HEAD);
        script.push_str(&snippet);
        script.push_str(HARNESS_TAIL);
        script
    }
}

fn parse_placeholder(tag: &str) -> Result<Segment, RenderError> {
    let (name, filter) = match tag.split_once('|') {
        Some((name, filter)) => (name.trim(), Some(filter.trim())),
        None => (tag.trim(), None),
    };

    let variable = match name {
        "component" => Variable::Component,
        "url_path" => Variable::UrlPath,
        "props" => Variable::Props,
        other => {
            return Err(RenderError::invalid_template(format!(
                "unknown variable '{other}'"
            )));
        }
    };

    let filter = match filter {
        None => Filter::Raw,
        Some("json") => Filter::Json,
        Some(other) => {
            return Err(RenderError::invalid_template(format!(
                "unknown filter '{other}'"
            )));
        }
    };

    Ok(Segment::Var(variable, filter))
}

fn js_string_literal(value: &str) -> String {
    // JSON string syntax is valid JavaScript string syntax.
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: TemplateVars<'static> = TemplateVars {
        component: "Greeting",
        url_path: "/hello?name=\"x\"",
        props: r#"{"name":"world"}"#,
    };

    #[test]
    fn test_render_raw() {
        let template = WrapperTemplate::parse(
            "function prerender(done) { done(render({{component}}, {{ props }})); }",
        )
        .unwrap();

        assert_eq!(
            template.render(&VARS),
            r#"function prerender(done) { done(render(Greeting, {"name":"world"})); }"#
        );
    }

    #[test]
    fn test_render_json_filter() {
        let template = WrapperTemplate::parse("var path = {{url_path|json}};").unwrap();
        assert_eq!(template.render(&VARS), r#"var path = "/hello?name=\"x\"";"#);
    }

    #[test]
    fn test_plain_text() {
        let template = WrapperTemplate::parse("no placeholders").unwrap();
        assert_eq!(template.render(&VARS), "no placeholders");
    }

    #[test]
    fn test_unknown_variable() {
        let err = WrapperTemplate::parse("{{ name }}").unwrap_err();
        assert!(matches!(err, RenderError::InvalidTemplate { .. }));
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_unknown_filter() {
        assert!(WrapperTemplate::parse("{{props|upper}}").is_err());
    }

    #[test]
    fn test_unterminated() {
        let err = WrapperTemplate::parse("abc {{props").unwrap_err();
        assert!(err.to_string().contains("byte 4"));
    }

    #[test]
    fn test_wrapper_script_structure() {
        let template = WrapperTemplate::parse("function prerender(done) { done('ok'); }").unwrap();
        let script = template.wrapper_script(&VARS);

        let fallback = script.find("function prerender(done) {}").unwrap();
        let snippet = script.find("done('ok')").unwrap();
        let call = script.find("prerender(__done__)").unwrap();

        assert!(fallback < snippet && snippet < call);
        assert!(script.contains("throw e;"));
        assert!(script.trim_end().ends_with("})()"));
    }
}
