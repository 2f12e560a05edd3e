//! End-to-end renders through Boa.
//!
//! These tests run real JavaScript through the full pipeline:
//! - Bundle prelude and core library
//! - Wrapper template and entry point
//! - Error classification and context reuse

use serde_json::json;

use prerender_common::{PoolOptions, RenderError, RenderMode};
use prerender_core::{Renderer, RendererSetup, StaticRegistry};
use prerender_host::BoaFactory;

const WRAPPER: &str = "function prerender(done) {
    done(renderToString({{component}}, {{props}}, {{url_path|json}}));
  }";

const CORE: &str = "function renderToString(component, props, url) {
  return component(props, url);
}";

fn registry() -> StaticRegistry {
    StaticRegistry::new()
        .with("Core", CORE)
        .with(
            "Hello",
            "function Hello(props, url) {
               console.log('rendering Hello for', url);
               return '<h1>Hello ' + props.name + '</h1><p>' + url + '</p>';
             }",
        )
        .with(
            "List",
            "function List(props) {
               return '<ul>' + props.items.map(function (i) { return '<li>' + i + '</li>'; }).join('') + '</ul>';
             }",
        )
        .with(
            "Shims",
            "function Shims() {
               var v = 0;
               setTimeout(function () { v = 1; }, 10);
               return String(v) + ' ' + typeof window + ' ' + typeof document + ' ' + typeof localStorage;
             }",
        )
        .with(
            "Throws",
            "function Throws(props) { throw new Error('cannot render ' + props.id); }",
        )
        .with("Broken", "function Broken( {")
        .with("Typo", "function Typo() {\n  var = 1;\n}\n")
        .with("Window", "function Window() { return window; }")
        .with(
            "Tree",
            "function Tree() { var root = { children: [] }; root.children.push({ parent: root }); return root; }",
        )
}

fn renderer(size: usize) -> Renderer {
    let setup = RendererSetup::new(BoaFactory::new(), registry(), WRAPPER)
        .with_pool(PoolOptions::default().with_size(size).with_timeout_secs(5))
        .with_mode(RenderMode::Development);
    Renderer::new(&setup).unwrap()
}

#[test]
fn test_render_component() {
    let renderer = renderer(1);

    let html = renderer
        .render("Hello", "/greet", json!({"name": "Ada"}))
        .unwrap();
    assert_eq!(html.as_str(), "<h1>Hello Ada</h1><p>/greet</p>");
}

#[test]
fn test_render_structured_props() {
    let renderer = renderer(1);

    let html = renderer
        .render("List", "/", json!({"items": ["a", "b"]}))
        .unwrap();
    assert_eq!(html.as_str(), "<ul><li>a</li><li>b</li></ul>");
}

#[test]
fn test_render_with_browser_shims() {
    let renderer = renderer(1);

    let html = renderer.render("Shims", "/", "{}").unwrap();
    assert_eq!(html.as_str(), "1 object object object");
}

#[test]
fn test_runtime_error() {
    let renderer = renderer(1);

    let err = renderer.render("Throws", "/", json!({"id": 42})).unwrap_err();
    let RenderError::Prerender(err) = err else {
        panic!("expected a prerender error, got {err:?}");
    };
    assert_eq!(err.component(), "Throws");
    assert!(err.message().contains("cannot render 42"));
    assert!(!err.cause().is_program());

    // The same context keeps serving.
    assert!(renderer.render("Hello", "/", json!({"name": "x"})).is_ok());
}

#[test]
fn test_syntax_error_fails_only_that_component() {
    let renderer = renderer(1);

    let err = renderer.render("Broken", "/", "{}").unwrap_err();
    let RenderError::Prerender(err) = err else {
        panic!("expected a prerender error, got {err:?}");
    };
    assert_eq!(err.component(), "Broken");
    assert!(err.cause().is_program());
    assert!(err.to_string().starts_with("Encountered error"));

    let html = renderer.render("Hello", "/", json!({"name": "still here"})).unwrap();
    assert!(html.as_str().contains("still here"));
}

#[test]
fn test_syntax_error_reports_position() {
    let renderer = renderer(1);

    let RenderError::Prerender(err) = renderer.render("Typo", "/", "{}").unwrap_err() else {
        panic!("expected a prerender error");
    };
    assert!(err.cause().is_program());

    let frames = err.cause().frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].line > 1);
    assert!(frames[0].column.is_some());
}

#[test]
fn test_cyclic_output_is_a_render_error() {
    let renderer = renderer(1);

    for component in ["Window", "Tree"] {
        let err = renderer.render(component, "/", "{}").unwrap_err();
        let RenderError::Prerender(err) = err else {
            panic!("expected a prerender error, got {err:?}");
        };
        assert_eq!(err.component(), component);
        assert!(err.message().contains("cyclic"), "{}", err.message());
    }

    assert!(renderer.render("Hello", "/", json!({"name": "x"})).is_ok());
}

#[test]
fn test_components_are_isolated() {
    let registry = StaticRegistry::new()
        .with("Writer", "var leaked = 'yes'; function Writer() { return leaked; }")
        .with("Reader", "function Reader() { return typeof leaked; }");
    let setup = RendererSetup::new(
        BoaFactory::without_console(),
        registry,
        "function prerender(done) { done({{component}}()); }",
    )
    .with_pool(PoolOptions::default().with_size(1));
    let renderer = Renderer::new(&setup).unwrap();

    assert_eq!(renderer.render("Writer", "/", "{}").unwrap().as_str(), "yes");
    assert_eq!(renderer.render("Reader", "/", "{}").unwrap().as_str(), "undefined");
}

#[test]
fn test_entry_point_without_output() {
    let setup = RendererSetup::new(
        BoaFactory::new(),
        registry(),
        "// no entry point override",
    )
    .with_pool(PoolOptions::default().with_size(1));
    let renderer = Renderer::new(&setup).unwrap();

    let RenderError::Prerender(err) = renderer.render("Hello", "/", "{}").unwrap_err() else {
        panic!("expected a prerender error");
    };
    assert_eq!(err.message(), "render entry point produced no output");
}
