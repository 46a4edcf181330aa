//! Core engine modules - notice bus, host event queue, stage arena, graph.
//!
//! These are independent of any one node type.

pub mod event_bus;
pub mod graph;
pub mod notice_bus;
pub mod stage_cache;

// Re-exports for convenience
pub use event_bus::{EventBus, EventEmitter, ShapeEventEmitter};
pub use graph::{DependencyGraph, SceneResetEvent};
pub use notice_bus::{Notice, NoticeBus, NoticeKind, StageId, SubscriptionToken};
pub use stage_cache::{CacheStatsSnapshot, StageCache, StageHandle, StageKey};
