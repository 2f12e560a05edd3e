//! Engine threads.
//!
//! Script engines are generally not `Send`, so every execution context owns a
//! dedicated OS thread that creates and exclusively owns its engine
//! instances. Work is shipped to the thread as closures over [`EngineScopes`]
//! and the result is sent back over a channel. The calling thread blocks until
//! the job completes; there is no mid-job cancellation.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use serde_json::Value;
use tracing::{Span, debug, error, warn};

use prerender_common::EngineError;

use crate::bundle::CodeBundle;
use crate::engine::{EngineFactory, ScriptEngine};

type Job = Box<dyn FnOnce(&mut EngineScopes) + Send>;

/// Engine instances owned by one engine thread, one per loaded component.
///
/// Each component gets its own instance so that components never share a
/// global scope.
pub struct EngineScopes {
    factory: Arc<dyn EngineFactory>,
    engines: HashMap<String, Box<dyn ScriptEngine>>,
}

impl EngineScopes {
    fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            engines: HashMap::new(),
        }
    }

    /// Create a fresh instance for the bundle's component and load the bundle
    /// into it, replacing any previous instance for that component.
    ///
    /// On failure the previous instance (if any) is discarded as well.
    pub fn load(&mut self, bundle: &CodeBundle) -> Result<(), EngineError> {
        self.engines.remove(bundle.component());

        let mut engine = self.factory.create()?;
        engine.load(bundle.source())?;
        self.engines.insert(bundle.component().to_string(), engine);
        Ok(())
    }

    /// Evaluate a script in the component's instance.
    pub fn evaluate(&mut self, component: &str, script: &str) -> Result<Value, EngineError> {
        let engine = self.engines.get_mut(component).ok_or_else(|| {
            EngineError::unavailable(format!("component '{component}' is not loaded"))
        })?;
        engine.eval(script)
    }

    /// Number of components with a live instance.
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Returns `true` if no component is loaded.
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

/// Handle to a dedicated engine thread.
pub struct EngineThread {
    id: usize,
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl EngineThread {
    /// Spawn a new engine thread.
    ///
    /// No engine instance is created until the first component is loaded.
    pub fn spawn(id: usize, factory: Arc<dyn EngineFactory>) -> Result<Self, EngineError> {
        let (jobs, queue) = mpsc::channel::<Job>();

        let handle = thread::Builder::new()
            .name(format!("prerender-engine-{id}"))
            .spawn(move || {
                let mut scopes = EngineScopes::new(factory);
                for job in queue {
                    if catch_unwind(AssertUnwindSafe(|| job(&mut scopes))).is_err() {
                        // Engine state may be inconsistent after a panic.
                        error!(context_id = id, "Engine job panicked, discarding loaded components");
                        scopes.engines.clear();
                    }
                }
                debug!(context_id = id, "Engine thread stopped");
            })
            .map_err(|e| EngineError::unavailable(format!("failed to spawn engine thread: {e}")))?;

        debug!(context_id = id, "Engine thread started");

        Ok(Self {
            id,
            jobs: Some(jobs),
            handle: Some(handle),
        })
    }

    /// Run a closure on the engine thread and wait for its result.
    ///
    /// The closure runs inside the caller's current tracing span.
    pub fn run<R, F>(&self, f: F) -> Result<R, EngineError>
    where
        R: Send + 'static,
        F: FnOnce(&mut EngineScopes) -> R + Send + 'static,
    {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| EngineError::unavailable("engine thread has been stopped"))?;

        let (reply, result) = mpsc::sync_channel(1);
        let span = Span::current();
        let job: Job = Box::new(move |scopes| {
            let _entered = span.enter();
            let _ = reply.send(f(scopes));
        });

        jobs.send(job)
            .map_err(|_| EngineError::unavailable("engine thread has exited"))?;

        result
            .recv()
            .map_err(|_| EngineError::unavailable("engine job aborted"))
    }

    /// Stop the thread and wait for it to exit.
    ///
    /// Best-effort: a thread that panicked is logged and otherwise ignored.
    pub fn shutdown(mut self) {
        self.stop(true);
    }

    fn stop(&mut self, join: bool) {
        drop(self.jobs.take());

        if let Some(handle) = self.handle.take() {
            if join && handle.join().is_err() {
                warn!(context_id = self.id, "Engine thread panicked during shutdown");
            }
        }
    }
}

impl Drop for EngineThread {
    fn drop(&mut self) {
        // Closing the queue is enough for the thread to exit on its own.
        self.stop(false);
    }
}

impl std::fmt::Debug for EngineThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineThread")
            .field("id", &self.id)
            .field("running", &self.jobs.is_some())
            .finish()
    }
}
