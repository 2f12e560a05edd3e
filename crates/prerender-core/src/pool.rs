//! Blocking, fixed-capacity pool of execution contexts.
//!
//! Contexts are created lazily by a factory, up to `size`. [`ContextPool::acquire`]
//! blocks the calling thread until a context is idle or the checkout timeout
//! elapses. The returned [`PooledContext`] guard gives exclusive access to one
//! context and hands it back when dropped, on every exit path.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use prerender_common::{PoolOptions, RenderError};

use crate::context::ExecutionContext;

type ContextFactory = dyn Fn(usize) -> Result<ExecutionContext, RenderError> + Send + Sync;

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Configured capacity.
    pub size: usize,
    /// Contexts created so far and not yet torn down.
    pub created: usize,
    /// Contexts waiting in the pool.
    pub idle: usize,
    /// Contexts currently checked out.
    pub in_use: usize,
}

struct PoolState {
    idle: Vec<ExecutionContext>,
    created: usize,
    next_id: usize,
    closed: bool,
}

struct PoolInner {
    state: Mutex<PoolState>,
    available: Condvar,
    size: usize,
    timeout: Duration,
    factory: Box<ContextFactory>,
}

impl PoolInner {
    fn release(&self, context: ExecutionContext) {
        let mut state = self.state.lock();
        if state.closed {
            state.created -= 1;
            drop(state);
            context.shutdown();
            return;
        }

        state.idle.push(context);
        drop(state);
        self.available.notify_one();
    }
}

/// A fixed-capacity pool of [`ExecutionContext`]s.
#[derive(Clone)]
pub struct ContextPool {
    inner: Arc<PoolInner>,
}

impl ContextPool {
    /// Create a pool. No context is built until the first checkout.
    pub fn new<F>(options: &PoolOptions, factory: F) -> Result<Self, RenderError>
    where
        F: Fn(usize) -> Result<ExecutionContext, RenderError> + Send + Sync + 'static,
    {
        options.validate()?;

        info!(
            size = options.size,
            timeout_secs = options.timeout,
            "Context pool created"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    idle: Vec::with_capacity(options.size),
                    created: 0,
                    next_id: 0,
                    closed: false,
                }),
                available: Condvar::new(),
                size: options.size,
                timeout: options.timeout(),
                factory: Box::new(factory),
            }),
        })
    }

    /// Check out a context, waiting up to the configured timeout.
    pub fn acquire(&self) -> Result<PooledContext, RenderError> {
        self.acquire_timeout(self.inner.timeout)
    }

    /// Check out a context, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// - [`RenderError::PoolExhausted`] if no context became idle in time
    /// - [`RenderError::PoolShutdown`] if the pool was shut down
    /// - any error returned by the context factory
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<PooledContext, RenderError> {
        // A timeout too large to represent as an instant waits indefinitely.
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.inner.state.lock();

        loop {
            if state.closed {
                return Err(RenderError::PoolShutdown);
            }

            if let Some(context) = state.idle.pop() {
                return Ok(self.checkout(context));
            }

            if state.created < self.inner.size {
                state.created += 1;
                let id = state.next_id;
                state.next_id += 1;
                drop(state);

                return match (self.inner.factory)(id) {
                    Ok(context) => Ok(self.checkout(context)),
                    Err(e) => {
                        warn!(context_id = id, error = %e, "Failed to create execution context");
                        self.inner.state.lock().created -= 1;
                        self.inner.available.notify_one();
                        Err(e)
                    }
                };
            }

            let Some(deadline) = deadline else {
                self.inner.available.wait(&mut state);
                continue;
            };

            if self
                .inner
                .available
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                if state.closed {
                    return Err(RenderError::PoolShutdown);
                }
                if let Some(context) = state.idle.pop() {
                    return Ok(self.checkout(context));
                }

                warn!(
                    size = self.inner.size,
                    timeout_ms = timeout.as_millis(),
                    "Context pool exhausted"
                );
                return Err(RenderError::pool_exhausted(timeout));
            }
        }
    }

    /// Close the pool and tear down every idle context.
    ///
    /// Contexts still checked out are torn down when their guard is dropped.
    /// Waiting callers fail with [`RenderError::PoolShutdown`].
    pub fn shutdown(&self) {
        let drained = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let drained = std::mem::take(&mut state.idle);
            state.created -= drained.len();
            drained
        };
        self.inner.available.notify_all();

        let count = drained.len();
        for context in drained {
            context.shutdown();
        }

        info!(drained = count, "Context pool shut down");
    }

    /// Returns `true` once [`ContextPool::shutdown`] has been called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Current occupancy.
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            size: self.inner.size,
            created: state.created,
            idle: state.idle.len(),
            in_use: state.created - state.idle.len(),
        }
    }

    /// Configured capacity.
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Configured checkout timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    fn checkout(&self, context: ExecutionContext) -> PooledContext {
        debug!(context_id = context.id(), "Context checked out");
        PooledContext {
            context: Some(context),
            pool: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for ContextPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextPool")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Exclusive access to one pooled context.
///
/// The context goes back to the pool when the guard is dropped, whether or
/// not the render using it succeeded.
pub struct PooledContext {
    context: Option<ExecutionContext>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledContext {
    type Target = ExecutionContext;

    fn deref(&self) -> &Self::Target {
        self.context
            .as_ref()
            .expect("pooled context is present until drop")
    }
}

impl DerefMut for PooledContext {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
            .as_mut()
            .expect("pooled context is present until drop")
    }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            debug!(context_id = context.id(), "Context released");
            self.pool.release(context);
        }
    }
}

impl std::fmt::Debug for PooledContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledContext")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineFactory, ScriptEngine};
    use prerender_common::EngineError;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct Null;

    impl ScriptEngine for Null {
        fn load(&mut self, _source: &str) -> Result<(), EngineError> {
            Ok(())
        }

        fn eval(&mut self, _script: &str) -> Result<Value, EngineError> {
            Ok(Value::Null)
        }
    }

    fn pool(size: usize, built: Arc<AtomicUsize>) -> ContextPool {
        let engine: Arc<dyn EngineFactory> =
            Arc::new(|| -> Result<Box<dyn ScriptEngine>, EngineError> { Ok(Box::new(Null)) });
        let options = PoolOptions::default().with_size(size).with_timeout_secs(1);

        ContextPool::new(&options, move |id| {
            built.fetch_add(1, Ordering::SeqCst);
            ExecutionContext::new(id, Arc::clone(&engine))
                .map_err(|e| RenderError::engine_unavailable(e.to_string()))
        })
        .unwrap()
    }

    #[test]
    fn test_zero_size_rejected() {
        let options = PoolOptions::default().with_size(0);
        let result = ContextPool::new(&options, |_| Err(RenderError::PoolShutdown));
        assert!(matches!(result, Err(RenderError::InvalidConfig { .. })));
    }

    #[test]
    fn test_lazy_creation_and_reuse() {
        let built = Arc::new(AtomicUsize::new(0));
        let pool = pool(3, built.clone());
        assert_eq!(built.load(Ordering::SeqCst), 0);

        let first_id = {
            let ctx = pool.acquire().unwrap();
            ctx.id()
        };
        let ctx = pool.acquire().unwrap();

        assert_eq!(ctx.id(), first_id);
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_never_exceeds_size() {
        let pool = pool(2, Arc::default());
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a.id(), b.id());

        let err = pool.acquire_timeout(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, RenderError::PoolExhausted { timeout_ms: 20 }));
        assert_eq!(pool.status().in_use, 2);
    }

    #[test]
    fn test_waiter_gets_released_context() {
        let pool = pool(1, Arc::default());
        let held = pool.acquire().unwrap();
        let held_id = held.id();

        let waiter_pool = pool.clone();
        let waiter = thread::spawn(move || {
            waiter_pool
                .acquire_timeout(Duration::from_secs(5))
                .map(|ctx| ctx.id())
        });

        thread::sleep(Duration::from_millis(20));
        drop(held);

        assert_eq!(waiter.join().unwrap().unwrap(), held_id);
    }

    #[test]
    fn test_unbounded_timeout_waits_for_release() {
        let engine: Arc<dyn EngineFactory> =
            Arc::new(|| -> Result<Box<dyn ScriptEngine>, EngineError> { Ok(Box::new(Null)) });
        let options = PoolOptions::default().with_size(1).with_timeout_secs(u64::MAX);
        options.validate().unwrap();
        let pool = ContextPool::new(&options, move |id| {
            ExecutionContext::new(id, Arc::clone(&engine))
                .map_err(|e| RenderError::engine_unavailable(e.to_string()))
        })
        .unwrap();

        let held = pool.acquire().unwrap();
        let held_id = held.id();

        let waiter_pool = pool.clone();
        let waiter = thread::spawn(move || waiter_pool.acquire().map(|ctx| ctx.id()));

        thread::sleep(Duration::from_millis(20));
        drop(held);

        assert_eq!(waiter.join().unwrap().unwrap(), held_id);
    }

    #[test]
    fn test_factory_failure_frees_capacity() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let options = PoolOptions::default().with_size(1);
        let pool = ContextPool::new(&options, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(RenderError::engine_unavailable("no engine"))
        })
        .unwrap();

        assert!(pool.acquire().is_err());
        assert!(pool.acquire().is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(pool.status().created, 0);
    }

    #[test]
    fn test_shutdown_drains_and_rejects() {
        let pool = pool(2, Arc::default());
        let held = pool.acquire().unwrap();
        drop(pool.acquire().unwrap());
        assert_eq!(pool.status().idle, 1);

        pool.shutdown();
        assert!(pool.is_shutdown());
        assert_eq!(pool.status().idle, 0);
        assert!(matches!(pool.acquire(), Err(RenderError::PoolShutdown)));

        // The in-flight context is torn down on release, not returned.
        drop(held);
        assert_eq!(pool.status().created, 0);
        assert_eq!(pool.status().idle, 0);
    }

    #[test]
    fn test_shutdown_wakes_waiters() {
        let pool = pool(1, Arc::default());
        let held = pool.acquire().unwrap();

        let waiter_pool = pool.clone();
        let waiter = thread::spawn(move || waiter_pool.acquire_timeout(Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(20));
        pool.shutdown();

        assert!(matches!(waiter.join().unwrap(), Err(RenderError::PoolShutdown)));
        drop(held);
    }

    #[test]
    fn test_concurrent_checkouts_are_exclusive() {
        let pool = pool(3, Arc::default());
        let in_use = Arc::new(Mutex::new(Vec::<usize>::new()));

        let workers: Vec<_> = (0..12)
            .map(|_| {
                let pool = pool.clone();
                let in_use = Arc::clone(&in_use);
                thread::spawn(move || {
                    for _ in 0..10 {
                        let ctx = pool.acquire().unwrap();
                        {
                            let mut ids = in_use.lock();
                            assert!(!ids.contains(&ctx.id()), "context handed out twice");
                            assert!(ids.len() < 3);
                            ids.push(ctx.id());
                        }
                        thread::sleep(Duration::from_millis(1));
                        in_use.lock().retain(|id| *id != ctx.id());
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        let status = pool.status();
        assert_eq!(status.in_use, 0);
        assert!(status.created <= 3);
    }
}
