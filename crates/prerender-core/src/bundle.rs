//! Per-component code cache.
//!
//! A [`CodeBundle`] is the full script loaded into an engine instance before a
//! component can render: a shim prelude stubbing browser-only globals, the
//! shared core library, then the component's own code. Bundles are immutable
//! and published as `Arc`s, so a rebuild replaces the entry wholesale and
//! readers never observe a partially built bundle.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use prerender_common::RenderError;

/// Registry key of the shared library loaded before every component.
pub const CORE_COMPONENT: &str = "Core";

/// Stubs for globals that component code may touch but that do not exist
/// outside a browser.
pub const SHIM_PRELUDE: &str = r"var global = global || this;
var self = self || this;
var window = window || this;

function setTimeout(fn, ms) {
  fn();
  return 0;
}
function clearTimeout() {}

var localStorage = {};
var document = {};

var console = global.console || {};
['error', 'log', 'info', 'warn'].forEach(function (fn) {
  if (!(fn in console)) {
    console[fn] = function () {};
  }
});
";

/// Supplies component sources.
///
/// The registry is asked again every time a bundle is built, so it may return
/// freshly reloaded sources.
pub trait ComponentRegistry: Send + Sync {
    /// All known sources keyed by component name, including [`CORE_COMPONENT`].
    fn sources(&self) -> HashMap<String, String>;
}

impl<F> ComponentRegistry for F
where
    F: Fn() -> HashMap<String, String> + Send + Sync,
{
    fn sources(&self) -> HashMap<String, String> {
        self()
    }
}

/// A registry with a fixed set of sources.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    sources: HashMap<String, String>,
}

impl StaticRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a source.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.insert(name.into(), source.into());
        self
    }
}

impl ComponentRegistry for StaticRegistry {
    fn sources(&self) -> HashMap<String, String> {
        self.sources.clone()
    }
}

/// The complete script for one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBundle {
    component: String,
    source: String,
    generation: u64,
}

impl CodeBundle {
    /// Create a bundle from already assembled source text.
    pub fn new(component: impl Into<String>, source: String, generation: u64) -> Self {
        Self {
            component: component.into(),
            source,
            generation,
        }
    }

    /// Assemble prelude, core library and component source.
    fn assemble(component: &str, core: &str, source: &str, generation: u64) -> Self {
        let mut text = String::with_capacity(SHIM_PRELUDE.len() + core.len() + source.len() + 8);
        text.push_str(SHIM_PRELUDE);
        text.push('\n');
        text.push_str(core);
        text.push_str(";\n");
        text.push_str(source);
        text.push_str(";\n");

        Self::new(component, text, generation)
    }

    /// Name of the component this bundle renders.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Full script text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Build number; a newer bundle for the same component has a larger one.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Cache of built bundles, one per registered component.
pub struct CodeCache {
    registry: Arc<dyn ComponentRegistry>,
    core_library: String,
    bundles: DashMap<String, Arc<CodeBundle>>,
    generation: AtomicU64,
    write_lock: Mutex<()>,
}

impl CodeCache {
    /// Create an empty cache.
    ///
    /// `core_library` is used when the registry has no [`CORE_COMPONENT`] entry.
    pub fn new(registry: Arc<dyn ComponentRegistry>, core_library: impl Into<String>) -> Self {
        Self {
            registry,
            core_library: core_library.into(),
            bundles: DashMap::new(),
            generation: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    /// Build a bundle for every component the registry currently provides.
    ///
    /// Returns the number of bundles built.
    #[instrument(skip(self))]
    pub fn build_all(&self) -> usize {
        let _writer = self.write_lock.lock();
        let sources = self.registry.sources();
        let core = self.core_source(&sources);

        let mut built = 0;
        for (name, source) in &sources {
            if name == CORE_COMPONENT {
                continue;
            }
            self.publish(name, core, source);
            built += 1;
        }

        info!(components = built, "Code cache built");
        built
    }

    /// Rebuild the bundle for `name` from the registry's current sources.
    ///
    /// Invalidating [`CORE_COMPONENT`] rebuilds every cached bundle.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::ComponentNotFound`] if the registry does not
    /// provide `name`; the cache is left unchanged.
    #[instrument(skip(self))]
    pub fn invalidate(&self, name: &str) -> Result<(), RenderError> {
        let _writer = self.write_lock.lock();
        let sources = self.registry.sources();
        let core = self.core_source(&sources);

        if name == CORE_COMPONENT {
            let cached: Vec<String> = self.bundles.iter().map(|e| e.key().clone()).collect();
            for component in cached {
                if let Some(source) = sources.get(&component) {
                    self.publish(&component, core, source);
                }
            }
            return Ok(());
        }

        let source = sources
            .get(name)
            .ok_or_else(|| RenderError::component_not_found(name))?;
        self.publish(name, core, source);
        Ok(())
    }

    /// Get the current bundle for `name`.
    pub fn get(&self, name: &str) -> Result<Arc<CodeBundle>, RenderError> {
        self.bundles
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RenderError::component_not_found(name))
    }

    /// Names of all cached components, sorted.
    pub fn components(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bundles.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn core_source<'a>(&'a self, sources: &'a HashMap<String, String>) -> &'a str {
        sources
            .get(CORE_COMPONENT)
            .map_or(self.core_library.as_str(), String::as_str)
    }

    fn publish(&self, name: &str, core: &str, source: &str) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let bundle = Arc::new(CodeBundle::assemble(name, core, source, generation));
        debug!(component = name, generation, bytes = bundle.source.len(), "Bundle published");
        self.bundles.insert(name.to_string(), bundle);
    }
}

impl std::fmt::Debug for CodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeCache")
            .field("bundles", &self.bundles.len())
            .finish_non_exhaustive()
    }
}
