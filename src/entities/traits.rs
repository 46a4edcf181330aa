//! Strategy traits the proxy node is parameterized with.
//!
//! Dependency inversion: the node only sees these interfaces. Concrete
//! strategies are handed over when a node type is registered (see
//! `DependencyGraph::register_type`) or when a node is built directly.
//! Plain closures implement the single-method traits.

use std::fmt;
use std::sync::Arc;

use glam::DVec3;

use crate::core::stage_cache::StageCache;
use crate::usd::{AssetResolver, BBox3, FsResolver, JsonComposer, PrimPath, Ray, SessionLayer, StageComposer, TimeCode};

use super::proxy_shape::ProxyShape;

/// Inputs visible to strategies when the stage is (re)opened.
#[derive(Debug, Clone, Copy)]
pub struct StageInputs<'a> {
    pub file_path: &'a str,
    pub excludes: &'a [PrimPath],
}

/// Supplies the session layer the stage is composed with.
/// Returning the same layer keeps the stage shared in the arena.
pub trait SessionLayerProvider: Send + Sync {
    fn session_layer(&self, inputs: &StageInputs<'_>) -> Option<Arc<SessionLayer>>;
}

impl<F> SessionLayerProvider for F
where
    F: Fn(&StageInputs<'_>) -> Option<Arc<SessionLayer>> + Send + Sync,
{
    fn session_layer(&self, inputs: &StageInputs<'_>) -> Option<Arc<SessionLayer>> {
        self(inputs)
    }
}

/// No session layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSessionLayer;

impl SessionLayerProvider for NoSessionLayer {
    fn session_layer(&self, _inputs: &StageInputs<'_>) -> Option<Arc<SessionLayer>> {
        None
    }
}

/// One session layer for every stage the node opens.
#[derive(Debug, Clone)]
pub struct PersistentSessionLayer(pub Arc<SessionLayer>);

impl SessionLayerProvider for PersistentSessionLayer {
    fn session_layer(&self, _inputs: &StageInputs<'_>) -> Option<Arc<SessionLayer>> {
        Some(Arc::clone(&self.0))
    }
}

/// Adjusts the box reported for a prim with no extent. The box arrives
/// seeded with `BBox3::ZERO`.
pub trait EmptyBoundsPolicy: Send + Sync {
    fn seed_empty(&self, bbox: &mut BBox3);
}

impl<F> EmptyBoundsPolicy for F
where
    F: Fn(&mut BBox3) + Send + Sync,
{
    fn seed_empty(&self, bbox: &mut BBox3) {
        self(bbox)
    }
}

/// Keep the zero box.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeepZeroBounds;

impl EmptyBoundsPolicy for KeepZeroBounds {
    fn seed_empty(&self, _bbox: &mut BBox3) {}
}

/// Maps the input time to the time the stage is evaluated at.
pub trait OutputTimePolicy: Send + Sync {
    fn output_time(&self, time: TimeCode) -> TimeCode;
}

impl<F> OutputTimePolicy for F
where
    F: Fn(TimeCode) -> TimeCode + Send + Sync,
{
    fn output_time(&self, time: TimeCode) -> TimeCode {
        self(time)
    }
}

/// Output time equals input time.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputTime;

impl OutputTimePolicy for InputTime {
    fn output_time(&self, time: TimeCode) -> TimeCode {
        time
    }
}

/// Intersection point and surface normal, in shape space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    pub point: DVec3,
    pub normal: DVec3,
}

/// Ray query against the shape's geometry.
pub trait ClosestPointStrategy: Send + Sync {
    fn closest_point(&self, shape: &ProxyShape, ray: &Ray) -> Option<SurfaceHit>;
}

/// Intersects the ray with the shape's bounding box.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoundsIntersector;

impl ClosestPointStrategy for BoundsIntersector {
    fn closest_point(&self, shape: &ProxyShape, ray: &Ray) -> Option<SurfaceHit> {
        if !shape.is_stage_valid() {
            return None;
        }
        let bbox = shape.bounding_box();
        if bbox.is_empty() || bbox.is_degenerate() {
            return None;
        }
        bbox.intersect(ray).map(|(t, normal)| SurfaceHit {
            point: ray.at(t),
            normal,
        })
    }
}

/// Soft-selection behaviour.
pub trait SoftSelectPolicy: Send + Sync {
    /// Whether the shape takes part in soft selection at all.
    fn can_be_soft_selected(&self) -> bool;
    /// Whether soft selection is currently switched on in the host.
    fn soft_select_enabled(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoSoftSelect;

impl SoftSelectPolicy for NoSoftSelect {
    fn can_be_soft_selected(&self) -> bool {
        false
    }

    fn soft_select_enabled(&self) -> bool {
        false
    }
}

/// Strategy bundle for one node type.
#[derive(Clone)]
pub struct ProxyHooks {
    pub session_layer: Arc<dyn SessionLayerProvider>,
    pub empty_bounds: Arc<dyn EmptyBoundsPolicy>,
    pub output_time: Arc<dyn OutputTimePolicy>,
    /// None: the node does not answer ray queries.
    pub closest_point: Option<Arc<dyn ClosestPointStrategy>>,
    pub soft_select: Arc<dyn SoftSelectPolicy>,
}

impl Default for ProxyHooks {
    fn default() -> Self {
        Self {
            session_layer: Arc::new(NoSessionLayer),
            empty_bounds: Arc::new(KeepZeroBounds),
            output_time: Arc::new(InputTime),
            closest_point: None,
            soft_select: Arc::new(NoSoftSelect),
        }
    }
}

impl fmt::Debug for ProxyHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHooks")
            .field("closest_point", &self.closest_point.is_some())
            .finish_non_exhaustive()
    }
}

impl ProxyHooks {
    pub fn with_session_layer(mut self, provider: impl SessionLayerProvider + 'static) -> Self {
        self.session_layer = Arc::new(provider);
        self
    }

    pub fn with_empty_bounds(mut self, policy: impl EmptyBoundsPolicy + 'static) -> Self {
        self.empty_bounds = Arc::new(policy);
        self
    }

    pub fn with_output_time(mut self, policy: impl OutputTimePolicy + 'static) -> Self {
        self.output_time = Arc::new(policy);
        self
    }

    pub fn with_closest_point(mut self, strategy: impl ClosestPointStrategy + 'static) -> Self {
        self.closest_point = Some(Arc::new(strategy));
        self
    }

    pub fn with_soft_select(mut self, policy: impl SoftSelectPolicy + 'static) -> Self {
        self.soft_select = Arc::new(policy);
        self
    }
}

/// Where stages come from: resolver, composer and the shared arena.
#[derive(Clone)]
pub struct StageEnv {
    pub resolver: Arc<dyn AssetResolver>,
    pub composer: Arc<dyn StageComposer>,
    pub cache: StageCache,
}

impl Default for StageEnv {
    fn default() -> Self {
        Self {
            resolver: Arc::new(FsResolver::new()),
            composer: Arc::new(JsonComposer::default()),
            cache: StageCache::global(),
        }
    }
}

impl fmt::Debug for StageEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageEnv").field("cache", &self.cache).finish_non_exhaustive()
    }
}

impl StageEnv {
    pub fn new(resolver: Arc<dyn AssetResolver>, composer: Arc<dyn StageComposer>, cache: StageCache) -> Self {
        Self {
            resolver,
            composer,
            cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closures_as_hooks() {
        let hooks = ProxyHooks::default()
            .with_output_time(|t: TimeCode| TimeCode::new(t.value() * 2.0))
            .with_empty_bounds(|b: &mut BBox3| *b = BBox3::from_arrays([-1.0; 3], [1.0; 3]));
        assert_eq!(hooks.output_time.output_time(TimeCode::new(3.0)), TimeCode::new(6.0));

        let mut b = BBox3::ZERO;
        hooks.empty_bounds.seed_empty(&mut b);
        assert_eq!(b.size(), DVec3::splat(2.0));
    }

    #[test]
    fn test_default_hooks() {
        let hooks = ProxyHooks::default();
        let inputs = StageInputs {
            file_path: "a.json",
            excludes: &[],
        };
        assert!(hooks.session_layer.session_layer(&inputs).is_none());
        assert!(hooks.closest_point.is_none());
        assert!(!hooks.soft_select.can_be_soft_selected());
        assert_eq!(hooks.output_time.output_time(TimeCode::new(4.0)), TimeCode::new(4.0));
    }
}
