//! usdproxy - proxy-shape node for composed stages.
//!
//! A [`ProxyShape`] holds a shared, composed stage inside a pull-based
//! dependency graph, caches bounds per time code and turns stage change
//! notices into deferred invalidation.

// Stage library: paths, layers, composition
pub mod usd;

// Core engine (notice bus, event queue, stage arena, graph)
pub mod core;

// Nodes and their parts
pub mod entities;

// App modules
pub mod cli;
pub mod config;
pub mod error;

// Re-export commonly used types from core
pub use core::event_bus::{downcast_event, BoxedEvent, EventBus, EventEmitter};
pub use core::graph::DependencyGraph;
pub use core::notice_bus::NoticeBus;
pub use core::stage_cache::StageCache;

// Re-export entities
pub use entities::{AttrValue, Attrs, Plug, ProxyHooks, ProxyShape, StageEnv, StageStatus};
pub use error::{ProxyError, ResolveError};
