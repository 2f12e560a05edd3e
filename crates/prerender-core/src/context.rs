//! Execution contexts.
//!
//! An [`ExecutionContext`] is one pool slot: an engine thread plus a record of
//! which component bundles (and which generation of each) that thread has
//! loaded. Loading is paid once per (context, component) pair; a context that
//! sees a newer bundle generation for a component reloads it once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use prerender_common::EngineError;

use crate::binding::EngineThread;
use crate::bundle::CodeBundle;
use crate::engine::EngineFactory;

/// A long-lived engine thread and its load-state cache.
///
/// Only one caller uses a context at a time (the pool guarantees this), so it
/// needs no internal locking.
#[derive(Debug)]
pub struct ExecutionContext {
    id: usize,
    engine: EngineThread,
    loaded: HashMap<String, u64>,
    renders: u64,
}

impl ExecutionContext {
    /// Start a new context with its own engine thread.
    pub fn new(id: usize, factory: Arc<dyn EngineFactory>) -> Result<Self, EngineError> {
        let engine = EngineThread::spawn(id, factory)?;
        info!(context_id = id, "Execution context created");

        Ok(Self {
            id,
            engine,
            loaded: HashMap::new(),
            renders: 0,
        })
    }

    /// Context identifier, unique within its pool.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Number of evaluations run on this context.
    pub fn renders(&self) -> u64 {
        self.renders
    }

    /// Returns `true` if the given component is loaded at any generation.
    pub fn is_loaded(&self, component: &str) -> bool {
        self.loaded.contains_key(component)
    }

    /// Generation of the bundle loaded for `component`, if any.
    pub fn loaded_generation(&self, component: &str) -> Option<u64> {
        self.loaded.get(component).copied()
    }

    /// Load the bundle unless this context already holds that generation.
    ///
    /// Returns `true` if the bundle was loaded by this call.
    #[instrument(skip(self, bundle), fields(context_id = self.id, component = bundle.component()))]
    pub fn ensure_loaded(&mut self, bundle: &Arc<CodeBundle>) -> Result<bool, EngineError> {
        let previous = self.loaded_generation(bundle.component());
        if previous == Some(bundle.generation()) {
            return Ok(false);
        }

        if let Some(stale) = previous {
            debug!(
                stale_generation = stale,
                generation = bundle.generation(),
                "Reloading updated bundle"
            );
            self.loaded.remove(bundle.component());
        }

        let start = Instant::now();
        let job_bundle = Arc::clone(bundle);
        let loaded = self
            .engine
            .run(move |scopes| scopes.load(&job_bundle))
            .and_then(|loaded| loaded);
        self.settle(loaded)?;

        self.loaded
            .insert(bundle.component().to_string(), bundle.generation());

        debug!(
            generation = bundle.generation(),
            duration_ms = start.elapsed().as_millis(),
            "Bundle loaded"
        );
        Ok(true)
    }

    /// Evaluate a script in the component's scope.
    pub fn evaluate(&mut self, component: &str, script: &str) -> Result<Value, EngineError> {
        self.renders += 1;
        let component = component.to_string();
        let script = script.to_string();
        let value = self
            .engine
            .run(move |scopes| scopes.evaluate(&component, &script))
            .and_then(|value| value);
        self.settle(value)
    }

    /// Forget every loaded component when the engine thread lost its state,
    /// so the next render reloads instead of reusing a dead scope.
    fn settle<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        if let Err(e) = &result {
            if e.is_unavailable() && !self.loaded.is_empty() {
                warn!(
                    context_id = self.id,
                    components = self.loaded.len(),
                    error = %e,
                    "Engine state lost, components will be reloaded"
                );
                self.loaded.clear();
            }
        }
        result
    }

    /// Stop the engine thread. Errors are logged and otherwise ignored.
    pub fn shutdown(self) {
        debug!(context_id = self.id, renders = self.renders, "Execution context shut down");
        self.engine.shutdown();
    }
}
