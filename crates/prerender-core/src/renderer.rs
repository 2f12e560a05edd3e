//! The renderer.
//!
//! [`Renderer`] owns the code cache and the context pool built from one
//! [`RendererSetup`]. Renders read the current state through a short-lived
//! read lock; [`Renderer::reconfigure`] builds a complete new state, shuts the
//! old pool down and installs the replacement under the write lock. Renders
//! already holding a context finish on it; renders still waiting on the old
//! pool retry once against the new one.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use prerender_common::{EngineError, PoolOptions, RenderError, RenderMode, RendererConfig};

use crate::bundle::{CodeBundle, CodeCache, ComponentRegistry};
use crate::context::ExecutionContext;
use crate::diagnostics::{ErrorTranslator, FailedRender};
use crate::engine::EngineFactory;
use crate::markup::SafeHtml;
use crate::pool::{ContextPool, PoolStatus};
use crate::props::Props;
use crate::template::{TemplateVars, WrapperTemplate};

/// Everything needed to build a renderer.
#[derive(Clone)]
pub struct RendererSetup {
    engine: Arc<dyn EngineFactory>,
    registry: Arc<dyn ComponentRegistry>,
    wrapper: String,
    core_library: String,
    config: RendererConfig,
}

impl RendererSetup {
    /// Create a setup with default options and an empty core library.
    pub fn new(
        engine: impl EngineFactory + 'static,
        registry: impl ComponentRegistry + 'static,
        wrapper: impl Into<String>,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            registry: Arc::new(registry),
            wrapper: wrapper.into(),
            core_library: String::new(),
            config: RendererConfig::default(),
        }
    }

    /// Use `core_library` when the registry has no `Core` entry.
    #[must_use]
    pub fn with_core_library(mut self, core_library: impl Into<String>) -> Self {
        self.core_library = core_library.into();
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn with_config(mut self, config: RendererConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the pool options.
    #[must_use]
    pub fn with_pool(mut self, pool: PoolOptions) -> Self {
        self.config.pool = pool;
        self
    }

    /// Set the diagnostics mode.
    #[must_use]
    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// The configuration this setup will apply.
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }
}

impl std::fmt::Debug for RendererSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererSetup")
            .field("config", &self.config)
            .field("wrapper_bytes", &self.wrapper.len())
            .field("core_library_bytes", &self.core_library.len())
            .finish_non_exhaustive()
    }
}

struct RendererState {
    cache: CodeCache,
    pool: ContextPool,
    template: WrapperTemplate,
    translator: ErrorTranslator,
    mode: RenderMode,
}

impl RendererState {
    fn build(setup: &RendererSetup) -> Result<Self, RenderError> {
        let template = WrapperTemplate::parse(&setup.wrapper)?;
        setup.config.pool.validate()?;

        let cache = CodeCache::new(Arc::clone(&setup.registry), setup.core_library.clone());
        cache.build_all();

        let engine = Arc::clone(&setup.engine);
        let pool = ContextPool::new(&setup.config.pool, move |id| {
            ExecutionContext::new(id, Arc::clone(&engine))
                .map_err(|e| RenderError::engine_unavailable(e.message()))
        })?;

        Ok(Self {
            cache,
            pool,
            template,
            translator: ErrorTranslator::new(setup.config.mode),
            mode: setup.config.mode,
        })
    }

    fn render(&self, component: &str, url_path: &str, props: &str) -> Result<SafeHtml, RenderError> {
        let bundle = self.cache.get(component)?;
        let wrapper = self.template.wrapper_script(&TemplateVars {
            component,
            url_path,
            props,
        });

        let outcome = {
            let mut context = self.pool.acquire()?;
            context
                .ensure_loaded(&bundle)
                .and_then(|_| context.evaluate(component, &wrapper))
        };

        match outcome.and_then(extract_output) {
            Ok(markup) => Ok(SafeHtml::new(markup)),
            Err(cause) => Err(self.fail(&bundle, url_path, props, &wrapper, cause)),
        }
    }

    fn load(&self, component: &str) -> Result<bool, RenderError> {
        let bundle = self.cache.get(component)?;
        let loaded = {
            let mut context = self.pool.acquire()?;
            context.ensure_loaded(&bundle)
        };
        loaded.map_err(|cause| self.fail(&bundle, "", "", "", cause))
    }

    fn fail(
        &self,
        bundle: &CodeBundle,
        url_path: &str,
        props: &str,
        wrapper: &str,
        cause: EngineError,
    ) -> RenderError {
        if let EngineError::Unavailable { message } = cause {
            return RenderError::engine_unavailable(message);
        }

        let failed = FailedRender {
            component: bundle.component(),
            url_path,
            props,
            bundle: bundle.source(),
            wrapper,
        };
        self.translator.translate(&failed, cause).into()
    }
}

/// Pooled server-side renderer for script components.
pub struct Renderer {
    state: RwLock<Arc<RendererState>>,
}

impl Renderer {
    /// Build the code cache and the pool described by `setup`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidTemplate`] or [`RenderError::InvalidConfig`]
    /// if the setup is rejected.
    pub fn new(setup: &RendererSetup) -> Result<Self, RenderError> {
        let state = RendererState::build(setup)?;
        info!(
            components = state.cache.components().len(),
            pool_size = state.pool.size(),
            mode = ?state.mode,
            "Renderer ready"
        );

        Ok(Self {
            state: RwLock::new(Arc::new(state)),
        })
    }

    /// Replace the cache and pool with ones built from `setup`.
    ///
    /// The old pool is shut down before the new one is installed. If `setup`
    /// is rejected the current state stays in place.
    pub fn reconfigure(&self, setup: &RendererSetup) -> Result<(), RenderError> {
        let fresh = Arc::new(RendererState::build(setup)?);

        let mut current = self.state.write();
        current.pool.shutdown();
        *current = fresh;

        info!(
            components = current.cache.components().len(),
            pool_size = current.pool.size(),
            "Renderer reconfigured"
        );
        Ok(())
    }

    /// Render `component` for `url_path` with `props`.
    ///
    /// # Errors
    ///
    /// - [`RenderError::ComponentNotFound`] if the component is not registered
    /// - [`RenderError::PoolExhausted`] if no context became idle in time
    /// - [`RenderError::Prerender`] if the component failed to load or threw
    #[instrument(skip(self, props), fields(render_id = %Uuid::new_v4()))]
    pub fn render(
        &self,
        component: &str,
        url_path: &str,
        props: impl Into<Props>,
    ) -> Result<SafeHtml, RenderError> {
        let props = props.into().into_text()?;
        let start = Instant::now();

        let mut result = self.current().render(component, url_path, &props);
        if matches!(result, Err(RenderError::PoolShutdown)) {
            debug!("Pool was replaced while waiting, retrying on the current pool");
            result = self.current().render(component, url_path, &props);
        }

        if let Ok(markup) = &result {
            debug!(
                bytes = markup.len(),
                duration_ms = start.elapsed().as_millis(),
                "Render complete"
            );
        }
        result
    }

    /// Render on the blocking thread pool of the current tokio runtime.
    pub async fn render_async(
        self: Arc<Self>,
        component: String,
        url_path: String,
        props: Props,
    ) -> Result<SafeHtml, RenderError> {
        tokio::task::spawn_blocking(move || self.render(&component, &url_path, props))
            .await
            .map_err(|e| RenderError::engine_unavailable(format!("render task failed: {e}")))?
    }

    /// Load `component` into an idle context without rendering it.
    ///
    /// Returns `true` if the bundle had to be loaded.
    pub fn load(&self, component: &str) -> Result<bool, RenderError> {
        self.current().load(component)
    }

    /// Rebuild the bundle for a component whose source changed.
    ///
    /// Contexts pick up the new bundle on their next render of it.
    pub fn component_changed(&self, component: &str) -> Result<(), RenderError> {
        self.current().cache.invalidate(component)?;
        info!(component, "Component bundle rebuilt");
        Ok(())
    }

    /// Names of all renderable components, sorted.
    pub fn components(&self) -> Vec<String> {
        self.current().cache.components()
    }

    /// Occupancy of the current pool.
    pub fn pool_status(&self) -> PoolStatus {
        self.current().pool.status()
    }

    /// Current diagnostics mode.
    pub fn mode(&self) -> RenderMode {
        self.current().mode
    }

    /// Shut down the current pool. Later renders fail with
    /// [`RenderError::PoolShutdown`] until the renderer is reconfigured.
    pub fn shutdown(&self) {
        self.current().pool.shutdown();
    }

    fn current(&self) -> Arc<RendererState> {
        Arc::clone(&self.state.read())
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.current();
        f.debug_struct("Renderer")
            .field("cache", &state.cache)
            .field("pool", &state.pool)
            .field("mode", &state.mode)
            .finish()
    }
}

fn extract_output(holder: Value) -> Result<String, EngineError> {
    let mut holder = match holder {
        Value::Object(holder) => holder,
        other => {
            return Err(EngineError::runtime(format!(
                "render wrapper returned {other} instead of an output holder"
            )));
        }
    };

    match holder.remove("outputValue") {
        Some(Value::String(markup)) => Ok(markup),
        Some(Value::Null) | None => Err(EngineError::runtime(
            "render entry point produced no output",
        )),
        Some(other) => Ok(other.to_string()),
    }
}
