//! Core prerendering machinery.
//!
//! This crate renders script components to markup on the server:
//! - [`Renderer`]: Owns the code cache and the context pool, renders components
//! - [`CodeCache`]: Per-component script bundles (prelude + core library + component)
//! - [`ContextPool`]: Fixed-capacity blocking pool of execution contexts
//! - [`ExecutionContext`]: One engine thread and the components it has loaded
//! - [`ErrorTranslator`]: Turns engine failures into [`PrerenderError`]s
//!
//! The concrete script engine is supplied through [`EngineFactory`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       Renderer                          │
//! │  (Shared across all callers, reconfigurable)            │
//! │  - Wrapper template                                     │
//! │  - Error translator                                     │
//! └─────────────────────────────────────────────────────────┘
//!               │                            │
//!               ▼                            ▼
//! ┌───────────────────────────┐ ┌───────────────────────────┐
//! │        CodeCache          │ │       ContextPool         │
//! │  (Immutable Arc bundles)  │ │  (Mutex + Condvar)        │
//! │  - Replace-then-publish   │ │  - Lazy creation          │
//! │  - Generation numbers     │ │  - Scoped checkout guard  │
//! └───────────────────────────┘ └───────────────────────────┘
//!                                            │
//!                                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                  ExecutionContext                       │
//! │  (One per pool slot, one render at a time)              │
//! │  - Dedicated engine thread                              │
//! │  - One isolated engine instance per component           │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! [`PrerenderError`]: prerender_common::PrerenderError

pub mod binding;
pub mod bundle;
pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod markup;
pub mod pool;
pub mod props;
pub mod renderer;
pub mod template;

pub use binding::{EngineScopes, EngineThread};
pub use bundle::{CORE_COMPONENT, CodeBundle, CodeCache, ComponentRegistry, StaticRegistry};
pub use context::ExecutionContext;
pub use diagnostics::{ErrorTranslator, FailedRender, source_window};
pub use engine::{EngineFactory, ScriptEngine, parse_stack_trace};
pub use markup::SafeHtml;
pub use pool::{ContextPool, PoolStatus, PooledContext};
pub use props::Props;
pub use renderer::{Renderer, RendererSetup};
pub use template::{TemplateVars, WrapperTemplate};
