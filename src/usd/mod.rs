//! In-process stage library: the scene-description side of the bridge.
//!
//! Paths, time codes, bounds, layers, composed stages, asset resolution
//! and composition. The proxy node only talks to this module through
//! [`AssetResolver`], [`StageComposer`], [`Stage`] and [`Prim`].

pub mod composer;
pub mod geom;
pub mod layer;
pub mod path;
pub mod resolver;
pub mod stage;
pub mod time;

pub use composer::{JsonComposer, StageComposer};
pub use geom::{BBox3, Purpose, PurposeFilter, Ray};
pub use layer::{ExtentSample, LayerData, PrimSpec, SessionLayer};
pub use path::PrimPath;
pub use resolver::{AssetResolver, FsResolver, MemoryResolver, ResolvedAsset};
pub use stage::{ComposedPrim, Prim, Stage, StageContents, StageEdit};
pub use time::TimeCode;
