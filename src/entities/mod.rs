//! Entities - attributes, plugs and the proxy shape node.
//!
//! Dependency direction: entities use `usd` and the `core` buses/arena;
//! `core::graph` drives entities through [`ShapeNode`] and [`ProxyShape`].

pub mod attr_schemas;
pub mod attrs;
pub mod bbox_cache;
pub mod keys;
pub mod listener;
pub mod node;
pub mod plug;
pub mod proxy_shape;
pub mod shape_events;
pub mod stage_data;
pub mod traits;

pub use attrs::{AttrValue, Attrs};
pub use bbox_cache::{BoundingBoxCache, CachedBounds};
pub use listener::{ListenerState, StageNoticeListener};
pub use node::{ComputeStatus, SelectionMask, ShapeNode};
pub use plug::{DirtyState, Plug};
pub use proxy_shape::{ProxyShape, RenderAttributes, StageStatus, PROXY_NODE_TYPE};
pub use stage_data::{DrawFlags, StageData};
pub use traits::{
    BoundsIntersector, ClosestPointStrategy, EmptyBoundsPolicy, OutputTimePolicy, PersistentSessionLayer, ProxyHooks,
    SessionLayerProvider, SoftSelectPolicy, StageEnv, StageInputs, SurfaceHit,
};
