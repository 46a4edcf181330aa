//! ProxyShape - host node presenting one prim of a composed stage.
//!
//! Pull pipeline (each step runs only when its plug is dirty):
//!
//! ```text
//! file_path, exclude_prim_paths ─► inStageData        open/share stage via arena
//! prim_path, time ───────────────► inStageDataCached  re-resolve prim, no recompose
//! complexity, purposes ──────────► outStageData       attach draw flags
//!                                  boundingBox        per-time cache lookup
//! ```
//!
//! Every consumer goes through `usd_prim()` (or a query built on it), which
//! brings the chain up to date first.
//!
//! Stage edits made anywhere reach the node through its notice listener.
//! The listener callback only flips atomics and posts a `ShapeDirtyEvent`;
//! the actual recompute happens on the next pull. At most one dirty event
//! per node is pending in the host queue: further ones are dropped until
//! the host acknowledges it (`acknowledge_dirty()`).
//!
//! # Locking
//!
//! - `pipeline` (Mutex): held for the whole pull. Never touched from notice
//!   delivery.
//! - `attrs` (RwLock): short reads during a pull, writes from `set_attr()`
//!   which releases it before propagating dirtiness.
//! - `events` (RwLock): written once on registration.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard};

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{DEFAULT_COMPLEXITY, DEFAULT_TIME, MAX_COMPLEXITY};
use crate::core::event_bus::ShapeEventEmitter;
use crate::core::notice_bus::{Notice, StageId};
use crate::core::stage_cache::{StageHandle, StageKey};
use crate::error::ProxyError;
use crate::usd::path::parse_path_list;
use crate::usd::{BBox3, Prim, PrimPath, PurposeFilter, Ray, Stage, StageEdit, TimeCode};

use super::attr_schemas::PROXY_SCHEMA;
use super::attrs::{AttrValue, Attrs, SetOutcome};
use super::bbox_cache::{BoundingBoxCache, CachedBounds};
use super::keys::*;
use super::listener::{ChangeCallback, StageNoticeListener};
use super::node::{ComputeStatus, SelectionMask, ShapeNode};
use super::plug::{DirtyState, Plug};
use super::shape_events::{BoundsCacheClearedEvent, DirtyReason, ShapeDirtyEvent, StageReplacedEvent, StageStatusEvent};
use super::stage_data::{DrawFlags, StageData};
use super::traits::{ProxyHooks, StageEnv, StageInputs, SurfaceHit};

/// Type name the built-in proxy registers under.
pub const PROXY_NODE_TYPE: &str = "ProxyShape";

/// What the node can currently show.
#[derive(Debug, Clone, PartialEq)]
pub enum StageStatus {
    /// No file path set.
    Empty,
    Ready,
    /// Prim path names nothing; the pseudo-root is shown instead.
    PrimNotFound { path: String },
    /// Last stage open failed. With `CompositionError` the previous stage
    /// (if any) is still shown.
    Failed(ProxyError),
}

impl StageStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, StageStatus::Ready)
    }

    pub fn error(&self) -> Option<ProxyError> {
        match self {
            StageStatus::Failed(e) => Some(e.clone()),
            StageStatus::PrimNotFound { path } => PrimPath::parse(path).map(|path| ProxyError::PrimNotFound { path }),
            _ => None,
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Empty => f.write_str("empty"),
            StageStatus::Ready => f.write_str("ready"),
            StageStatus::PrimNotFound { path } => write!(f, "prim not found: {}", path),
            StageStatus::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Everything a render adapter needs to draw the proxy.
#[derive(Debug, Clone)]
pub struct RenderAttributes {
    pub prim: Prim,
    pub exclude_prim_paths: Vec<PrimPath>,
    pub complexity: i32,
    pub time: TimeCode,
    pub draw_render_purpose: bool,
    pub draw_proxy_purpose: bool,
    pub draw_guide_purpose: bool,
}

#[derive(Default)]
struct Pipeline {
    input: Option<StageHandle>,
    input_error: Option<ProxyError>,
    cached: Option<StageData>,
    output: Option<StageData>,
    bounds: BoundingBoxCache,
}

/// Persisted form: identity plus storable attributes.
#[derive(Serialize, Deserialize)]
struct ProxyShapeDoc {
    uuid: Uuid,
    node_type: String,
    attrs: Attrs,
}

pub struct ProxyShape {
    // Declared first so it unsubscribes before the pipeline drops its stage.
    listener: StageNoticeListener,
    uuid: Uuid,
    node_type: String,
    attrs: RwLock<Attrs>,
    dirty: Arc<DirtyState>,
    pipeline: Mutex<Pipeline>,
    env: StageEnv,
    hooks: ProxyHooks,
    events: Arc<RwLock<ShapeEventEmitter>>,
    dirty_pending: Arc<AtomicBool>,
}

/// Queue a dirty event unless one is already waiting for the host.
fn post_dirty(events: &RwLock<ShapeEventEmitter>, pending: &AtomicBool, node: Uuid, reason: DirtyReason) {
    let events = events.read().unwrap_or_else(|e| e.into_inner());
    if events.is_connected() && !pending.swap(true, Ordering::AcqRel) {
        events.post(ShapeDirtyEvent { node, reason });
    }
}

impl fmt::Debug for ProxyShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyShape")
            .field("uuid", &self.uuid)
            .field("node_type", &self.node_type)
            .field("attrs", &*self.attrs())
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

impl ProxyShape {
    pub fn new(name: &str, env: StageEnv, hooks: ProxyHooks) -> Self {
        Self::with_type(PROXY_NODE_TYPE, name, env, hooks)
    }

    /// Build under a registered node type name.
    pub fn with_type(node_type: &str, name: &str, env: StageEnv, hooks: ProxyHooks) -> Self {
        let mut attrs = Attrs::with_schema(&PROXY_SCHEMA);
        let purposes = PurposeFilter::default();
        attrs.set(A_NAME, name.into());
        attrs.set(A_FILE_PATH, "".into());
        attrs.set(A_PRIM_PATH, "".into());
        attrs.set(A_EXCLUDE_PRIM_PATHS, "".into());
        attrs.set(A_TIME, DEFAULT_TIME.into());
        attrs.set(A_COMPLEXITY, DEFAULT_COMPLEXITY.into());
        attrs.set(A_DRAW_RENDER_PURPOSE, purposes.render.into());
        attrs.set(A_DRAW_PROXY_PURPOSE, purposes.proxy.into());
        attrs.set(A_DRAW_GUIDE_PURPOSE, purposes.guide.into());
        Self::from_parts(Uuid::new_v4(), node_type, attrs, env, hooks)
    }

    fn from_parts(uuid: Uuid, node_type: &str, attrs: Attrs, env: StageEnv, hooks: ProxyHooks) -> Self {
        let dirty = Arc::new(DirtyState::new());
        let events = Arc::new(RwLock::new(ShapeEventEmitter::dummy()));
        let dirty_pending = Arc::new(AtomicBool::new(false));
        let listener = StageNoticeListener::new(Self::change_callback(uuid, &dirty, &events, &dirty_pending));
        Self {
            listener,
            uuid,
            node_type: node_type.to_string(),
            attrs: RwLock::new(attrs),
            dirty,
            pipeline: Mutex::new(Pipeline::default()),
            env,
            hooks,
            events,
            dirty_pending,
        }
    }

    /// Runs inside notice delivery: atomics and a queued event only.
    fn change_callback(
        uuid: Uuid,
        dirty: &Arc<DirtyState>,
        events: &Arc<RwLock<ShapeEventEmitter>>,
        pending: &Arc<AtomicBool>,
    ) -> ChangeCallback {
        let dirty = Arc::clone(dirty);
        let events = Arc::clone(events);
        let pending = Arc::clone(pending);
        Arc::new(move |_notice: &Notice| {
            dirty.mark_contents_changed();
            post_dirty(&events, &pending, uuid, DirtyReason::StageContentsChanged);
        })
    }

    /// Connect to the host's invalidation queue.
    pub fn set_event_emitter(&self, emitter: ShapeEventEmitter) {
        *self.events.write().unwrap_or_else(|e| e.into_inner()) = emitter;
        self.dirty_pending.store(false, Ordering::Release);
    }

    /// Host took the pending dirty event; the next change posts a new one.
    pub fn acknowledge_dirty(&self) {
        self.dirty_pending.store(false, Ordering::Release);
    }

    /// A dirty event is queued and not yet acknowledged.
    pub fn has_pending_dirty(&self) -> bool {
        self.dirty_pending.load(Ordering::Acquire)
    }

    fn post_dirty(&self, reason: DirtyReason) {
        post_dirty(&self.events, &self.dirty_pending, self.uuid, reason);
    }

    fn post<E: crate::core::event_bus::Event>(&self, event: E) {
        self.events.read().unwrap_or_else(|e| e.into_inner()).post(event);
    }

    fn lock_pipeline(&self) -> MutexGuard<'_, Pipeline> {
        self.pipeline.lock().unwrap_or_else(|e| e.into_inner())
    }

    // === Identity & attributes ===

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> String {
        self.attrs().get_str_or(A_NAME, "").to_string()
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn hooks(&self) -> &ProxyHooks {
        &self.hooks
    }

    pub fn env(&self) -> &StageEnv {
        &self.env
    }

    pub fn attrs(&self) -> RwLockReadGuard<'_, Attrs> {
        self.attrs.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Set an attribute and propagate dirtiness. Returns the computed plugs
    /// that went dirty.
    pub fn set_attr(&self, key: &str, value: AttrValue) -> Vec<Plug> {
        let value = match (key, value) {
            (A_COMPLEXITY, AttrValue::Int(v)) => AttrValue::Int(v.clamp(0, MAX_COMPLEXITY)),
            (_, v) => v,
        };
        let outcome = self.attrs.write().unwrap_or_else(|e| e.into_inner()).set(key, value);
        match outcome {
            SetOutcome::Rejected => {
                warn!("{}: rejected attribute '{}'", self.name(), key);
                Vec::new()
            }
            SetOutcome::DirtyDependents => match Plug::from_attr(key) {
                Some(plug) => {
                    let affected = self.set_dependents_dirty(plug);
                    self.post_dirty(DirtyReason::AttributeChanged);
                    affected
                }
                None => Vec::new(),
            },
            SetOutcome::Stored | SetOutcome::Unchanged => Vec::new(),
        }
    }

    /// Mark everything downstream of `plug` dirty. Inputs that change the
    /// stage, the prim or the purpose filter also drop every cached box.
    pub fn set_dependents_dirty(&self, plug: Plug) -> Vec<Plug> {
        let affected = self.dirty.mark_with_dependents(plug);
        trace!("{}: {} dirties {:?}", self.name(), plug, affected);
        if plug.invalidates_bounds() {
            self.clear_bounding_box_cache();
        }
        affected
    }

    pub fn file_path(&self) -> String {
        self.attrs().get_str_or(A_FILE_PATH, "").trim().to_string()
    }

    /// Prim path attribute as entered.
    pub fn prim_path(&self) -> String {
        self.attrs().get_str_or(A_PRIM_PATH, "").trim().to_string()
    }

    pub fn get_exclude_prim_paths(&self) -> Vec<PrimPath> {
        let attrs = self.attrs();
        parse_path_list(attrs.get_str_or(A_EXCLUDE_PRIM_PATHS, "").split(',').map(str::trim))
    }

    pub fn get_complexity(&self) -> i32 {
        self.attrs()
            .get_i32(A_COMPLEXITY)
            .unwrap_or(DEFAULT_COMPLEXITY)
            .clamp(0, MAX_COMPLEXITY)
    }

    pub fn get_time(&self) -> TimeCode {
        TimeCode::new(self.attrs().get_f64(A_TIME).unwrap_or(DEFAULT_TIME))
    }

    /// Time the stage is evaluated at (output-time hook applied).
    pub fn output_time(&self) -> TimeCode {
        self.hooks.output_time.output_time(self.get_time())
    }

    pub fn purposes(&self) -> PurposeFilter {
        let attrs = self.attrs();
        let d = PurposeFilter::default();
        PurposeFilter {
            render: attrs.get_bool_or(A_DRAW_RENDER_PURPOSE, d.render),
            proxy: attrs.get_bool_or(A_DRAW_PROXY_PURPOSE, d.proxy),
            guide: attrs.get_bool_or(A_DRAW_GUIDE_PURPOSE, d.guide),
        }
    }

    // === Pipeline ===

    /// Bring computed plugs up to `target` (inclusive), in chain order.
    fn pull_locked(&self, p: &mut Pipeline, target: Plug) -> ComputeStatus {
        let mut status = ComputeStatus::Clean;
        for plug in Plug::CHAIN {
            if self.dirty.is_dirty(plug) {
                // Clean first: a notice landing mid-compute re-marks it.
                self.dirty.clean(plug);
                let s = match plug {
                    Plug::InStageData => self.compute_input(p),
                    Plug::InStageDataCached => self.compute_cached(p),
                    _ => self.compute_output(p),
                };
                trace!("{}: computed {} -> {:?}", self.uuid, plug, s);
                status = status.merge(s);
            }
            if plug == target {
                break;
            }
        }
        status
    }

    fn compute_input(&self, p: &mut Pipeline) -> ComputeStatus {
        let file_path = self.file_path();
        let excludes = self.get_exclude_prim_paths();
        if file_path.is_empty() {
            self.replace_input(p, None);
            self.set_input_error(p, None);
            return ComputeStatus::Computed;
        }

        let asset = match self.env.resolver.resolve(&file_path) {
            Ok(asset) => asset,
            Err(e) => {
                let err = e.into_invalid_asset(&file_path);
                warn!("{}: {}", self.name(), err);
                self.replace_input(p, None);
                self.set_input_error(p, Some(err));
                return ComputeStatus::Failed;
            }
        };

        let inputs = StageInputs {
            file_path: &file_path,
            excludes: &excludes,
        };
        let session = self.hooks.session_layer.session_layer(&inputs);
        let key = StageKey::new(asset.identifier.clone(), excludes.clone(), session.as_ref().map(|s| s.id()));
        let opened = self
            .env
            .cache
            .get_or_open(key, || self.env.composer.open_stage(&asset, session, &excludes));
        match opened {
            Ok(handle) => {
                self.replace_input(p, Some(handle));
                self.set_input_error(p, None);
                ComputeStatus::Computed
            }
            Err(err) => {
                warn!("{}: {} (keeping previous stage)", self.name(), err);
                self.set_input_error(p, Some(err));
                ComputeStatus::Failed
            }
        }
    }

    /// Swap the input stage. On an actual change the listener is re-pointed
    /// before the old handle goes and every cached box is dropped.
    fn replace_input(&self, p: &mut Pipeline, next: Option<StageHandle>) {
        let old_id = p.input.as_ref().map(|h| h.stage().id());
        let new_id = next.as_ref().map(|h| h.stage().id());
        if old_id == new_id {
            p.input = next;
            return;
        }

        self.listener.observe(next.as_ref().map(|h| h.stage()));
        let old = std::mem::replace(&mut p.input, next);
        p.cached = None;
        p.output = None;
        drop(old);

        self.dirty.mark_with_dependents(Plug::InStageDataCached);
        self.clear_bounds_locked(p);
        debug!("{}: stage {:?} -> {:?}", self.name(), old_id, new_id);
        self.post(StageReplacedEvent {
            node: self.uuid,
            old: old_id,
            new: new_id,
        });
    }

    fn set_input_error(&self, p: &mut Pipeline, err: Option<ProxyError>) {
        if p.input_error == err {
            return;
        }
        p.input_error = err;
        let status = Self::status_locked(p);
        self.post(StageStatusEvent { node: self.uuid, status });
    }

    fn compute_cached(&self, p: &mut Pipeline) -> ComputeStatus {
        let Some(handle) = p.input.clone() else {
            p.cached = None;
            return ComputeStatus::Computed;
        };
        let requested = self.prim_path();
        let time = self.output_time();

        let (resolved, fallback) = if requested.is_empty() {
            (PrimPath::root(), false)
        } else {
            match PrimPath::parse(&requested) {
                Some(path) if path.is_root() || handle.stage().contents().contains(&path) => (path, false),
                Some(path) => {
                    warn!("{}: {}, using pseudo-root", self.name(), ProxyError::PrimNotFound { path });
                    (PrimPath::root(), true)
                }
                None => {
                    warn!("{}: invalid prim path {:?}, using pseudo-root", self.name(), requested);
                    (PrimPath::root(), true)
                }
            }
        };

        let data = StageData::new(handle, resolved, requested, fallback, time);
        if p.cached.as_ref().is_some_and(|c| c.same_source(&data) && c.is_fallback() == fallback) {
            return ComputeStatus::Clean;
        }
        let status_changed = p.cached.as_ref().map(|c| c.is_fallback()) != Some(fallback);
        p.cached = Some(data);
        if status_changed {
            let status = Self::status_locked(p);
            self.post(StageStatusEvent { node: self.uuid, status });
        }
        ComputeStatus::Computed
    }

    fn compute_output(&self, p: &mut Pipeline) -> ComputeStatus {
        let flags = DrawFlags {
            complexity: self.get_complexity(),
            purposes: self.purposes(),
        };
        p.output = p.cached.clone().map(|c| c.with_flags(flags));
        ComputeStatus::Computed
    }

    fn status_locked(p: &Pipeline) -> StageStatus {
        if let Some(err) = &p.input_error {
            return StageStatus::Failed(err.clone());
        }
        match (&p.input, &p.cached) {
            (None, _) => StageStatus::Empty,
            (Some(_), Some(c)) if c.is_fallback() => StageStatus::PrimNotFound {
                path: c.requested().to_string(),
            },
            _ => StageStatus::Ready,
        }
    }

    fn clear_bounds_locked(&self, p: &mut Pipeline) {
        let entries = p.bounds.clear();
        if entries > 0 {
            debug!("{}: cleared {} cached bounds", self.uuid, entries);
            self.post(BoundsCacheClearedEvent { node: self.uuid, entries });
        }
    }

    /// Bounds at the current output time, from the cache or freshly
    /// computed. None when there is no stage.
    fn current_bounds(&self) -> Option<CachedBounds> {
        let mut p = self.lock_pipeline();
        if self.dirty.take_contents_changed() {
            self.clear_bounds_locked(&mut p);
        }
        self.pull_locked(&mut p, Plug::OutStageData);
        self.dirty.clean(Plug::BoundingBox);

        let output = p.output.as_ref()?;
        let (time, purposes, prim) = (output.time(), output.flags().purposes, output.prim());
        if let Some(hit) = p.bounds.get(time) {
            return Some(hit);
        }

        let extent = prim.compute_extent(time, purposes);
        let bounds = if extent.is_empty() {
            let mut bbox = BBox3::ZERO;
            self.hooks.empty_bounds.seed_empty(&mut bbox);
            CachedBounds { bbox, valid: false }
        } else {
            CachedBounds { bbox: extent, valid: true }
        };
        p.bounds.insert(time, bounds);
        trace!("{}: bounds at {} = {:?}", self.uuid, time, bounds.bbox);
        Some(bounds)
    }

    // === Queries ===

    /// Prim reflecting the latest output. The only sanctioned way to reach
    /// the stage: brings the whole chain up to date first.
    pub fn usd_prim(&self) -> Prim {
        let mut p = self.lock_pipeline();
        self.pull_locked(&mut p, Plug::OutStageData);
        p.output.as_ref().map(|o| o.prim()).unwrap_or_default()
    }

    /// Latest output stage data.
    pub fn out_stage_data(&self) -> Option<StageData> {
        let mut p = self.lock_pipeline();
        self.pull_locked(&mut p, Plug::OutStageData);
        p.output.clone()
    }

    /// Stage currently held, after bringing the input up to date.
    pub fn stage(&self) -> Option<Arc<Stage>> {
        let mut p = self.lock_pipeline();
        self.pull_locked(&mut p, Plug::InStageData);
        p.input.as_ref().map(|h| Arc::clone(h.stage()))
    }

    pub fn stage_id(&self) -> Option<StageId> {
        self.stage().map(|s| s.id())
    }

    pub fn is_stage_valid(&self) -> bool {
        let mut p = self.lock_pipeline();
        self.pull_locked(&mut p, Plug::InStageDataCached);
        p.cached.is_some()
    }

    pub fn status(&self) -> StageStatus {
        let mut p = self.lock_pipeline();
        self.pull_locked(&mut p, Plug::InStageDataCached);
        Self::status_locked(&p)
    }

    /// Pull one plug. Input plugs are not computed here.
    pub fn compute(&self, plug: Plug) -> ComputeStatus {
        match plug {
            Plug::InStageData | Plug::InStageDataCached | Plug::OutStageData => {
                let mut p = self.lock_pipeline();
                self.pull_locked(&mut p, plug)
            }
            Plug::BoundingBox => {
                let was_dirty = self.dirty.is_dirty(Plug::BoundingBox);
                match self.current_bounds() {
                    Some(_) if was_dirty => ComputeStatus::Computed,
                    _ => ComputeStatus::Clean,
                }
            }
            _ => ComputeStatus::Unknown,
        }
    }

    /// Bounds at the output time. `BBox3::ZERO` (uncached) without a stage.
    pub fn bounding_box(&self) -> BBox3 {
        self.current_bounds().map(|b| b.bbox).unwrap_or(BBox3::ZERO)
    }

    pub fn clear_bounding_box_cache(&self) {
        let mut p = self.lock_pipeline();
        self.clear_bounds_locked(&mut p);
    }

    pub fn bounds_cache_len(&self) -> usize {
        self.lock_pipeline().bounds.len()
    }

    pub fn bounds_cache_times(&self) -> Vec<TimeCode> {
        self.lock_pipeline().bounds.times().collect()
    }

    /// (hits, misses) of the bounds cache.
    pub fn bounds_cache_stats(&self) -> (u64, u64) {
        self.lock_pipeline().bounds.stats()
    }

    /// Selectable components: none without a stage, on prim fallback, or
    /// when nothing drawable resolves.
    pub fn get_shape_selection_mask(&self) -> SelectionMask {
        let fallback = {
            let mut p = self.lock_pipeline();
            self.pull_locked(&mut p, Plug::OutStageData);
            match &p.output {
                Some(o) => o.is_fallback(),
                None => return SelectionMask::NONE,
            }
        };
        if fallback {
            return SelectionMask::NONE;
        }
        match self.current_bounds() {
            Some(b) if b.valid => SelectionMask::MESHES,
            _ => SelectionMask::NONE,
        }
    }

    /// Ray query through the configured strategy. Without one there is
    /// never a hit.
    pub fn closest_point(&self, ray: &Ray) -> Option<SurfaceHit> {
        let strategy = self.hooks.closest_point.as_ref()?;
        strategy.closest_point(self, ray)
    }

    pub fn render_attributes(&self) -> Option<RenderAttributes> {
        let data = self.out_stage_data()?;
        let prim = data.prim();
        if !prim.is_valid() {
            return None;
        }
        let flags = data.flags();
        Some(RenderAttributes {
            prim,
            exclude_prim_paths: self.get_exclude_prim_paths(),
            complexity: flags.complexity,
            time: data.time(),
            draw_render_purpose: flags.purposes.render,
            draw_proxy_purpose: flags.purposes.proxy,
            draw_guide_purpose: flags.purposes.guide,
        })
    }

    pub fn is_bounded(&self) -> bool {
        self.is_stage_valid()
    }

    /// Proxies are never used as live surfaces.
    pub fn can_make_live(&self) -> bool {
        false
    }

    pub fn can_be_soft_selected(&self) -> bool {
        self.hooks.soft_select.can_be_soft_selected()
    }

    pub fn soft_select_enabled(&self) -> bool {
        self.hooks.soft_select.soft_select_enabled()
    }

    pub fn listener(&self) -> &StageNoticeListener {
        &self.listener
    }

    pub fn dirty_plugs(&self) -> Vec<Plug> {
        self.dirty.dirty_plugs()
    }

    // === Stage lifecycle ===

    /// Edit the held stage (session layer if it has one). Observers,
    /// including this node, are notified by the stage.
    pub fn edit_stage(&self, edit: StageEdit) -> Result<(), ProxyError> {
        let stage = self.stage().ok_or_else(|| ProxyError::InvalidAsset {
            path: self.file_path(),
            reason: "no stage to edit".to_string(),
        })?;
        stage.apply_edit(edit)
    }

    /// Re-open from source: the shared identity is dropped from the arena
    /// so the next pull composes a fresh stage.
    pub fn reload(&self) {
        let mut p = self.lock_pipeline();
        if let Some(handle) = p.input.as_ref() {
            self.env.cache.evict(handle.key());
            info!("{}: reloading {}", self.name(), handle.key());
        }
        self.dirty.mark_with_dependents(Plug::InStageData);
        self.clear_bounds_locked(&mut p);
    }

    /// Drop the stage and every derived value. The next pull re-opens.
    pub fn release_stage(&self) {
        let mut p = self.lock_pipeline();
        self.listener.teardown();
        let old = p.input.take().map(|h| h.stage().id());
        p.cached = None;
        p.output = None;
        p.input_error = None;
        self.clear_bounds_locked(&mut p);
        self.dirty.mark_all();
        drop(p);

        if old.is_some() {
            debug!("{}: released stage {:?}", self.name(), old);
            self.post(StageReplacedEvent {
                node: self.uuid,
                old,
                new: None,
            });
        }
        self.post_dirty(DirtyReason::StageReleased);
    }

    // === Persistence ===

    /// Storable attributes and identity. Caches and the stage are not saved.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let doc = ProxyShapeDoc {
            uuid: self.uuid,
            node_type: self.node_type.clone(),
            attrs: self.attrs().storable(),
        };
        serde_json::to_string_pretty(&doc)
    }

    pub fn from_json(json: &str, env: StageEnv, hooks: ProxyHooks) -> serde_json::Result<ProxyShape> {
        let mut doc: ProxyShapeDoc = serde_json::from_str(json)?;
        doc.attrs.attach_schema(&PROXY_SCHEMA);
        if let Some(c) = doc.attrs.get_i32(A_COMPLEXITY) {
            doc.attrs.set(A_COMPLEXITY, c.clamp(0, MAX_COMPLEXITY).into());
        }
        Ok(Self::from_parts(doc.uuid, &doc.node_type, doc.attrs, env, hooks))
    }
}

impl ShapeNode for ProxyShape {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn name(&self) -> String {
        ProxyShape::name(self)
    }

    fn node_type(&self) -> &str {
        &self.node_type
    }

    fn compute(&self, plug: Plug) -> ComputeStatus {
        ProxyShape::compute(self, plug)
    }

    fn set_dependents_dirty(&self, plug: Plug) -> Vec<Plug> {
        ProxyShape::set_dependents_dirty(self, plug)
    }

    fn is_bounded(&self) -> bool {
        ProxyShape::is_bounded(self)
    }

    fn bounding_box(&self) -> BBox3 {
        ProxyShape::bounding_box(self)
    }

    fn selection_mask(&self) -> SelectionMask {
        self.get_shape_selection_mask()
    }

    fn closest_point(&self, ray: &Ray) -> Option<SurfaceHit> {
        ProxyShape::closest_point(self, ray)
    }

    fn is_dirty(&self) -> bool {
        self.dirty.any_dirty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::notice_bus::NoticeBus;
    use crate::core::stage_cache::StageCache;
    use crate::usd::{JsonComposer, MemoryResolver};
    use glam::DVec3;

    const SCENE: &str = r#"{
        "default_prim": "World",
        "prims": [
            { "path": "/World", "type": "Xform" },
            { "path": "/World/Geo", "type": "Mesh",
              "samples": [
                { "time": 1.0, "min": [0, 0, 0], "max": [1, 1, 1] },
                { "time": 2.0, "min": [0, 0, 0], "max": [2, 2, 2] }
              ] },
            { "path": "/World/Guide", "type": "Mesh", "purpose": "guide",
              "extent": [[-5, -5, -5], [5, 5, 5]] },
            { "path": "/World/Empty", "type": "Scope" }
        ]
    }"#;

    fn env() -> (Arc<MemoryResolver>, StageEnv) {
        let resolver = Arc::new(MemoryResolver::new());
        resolver.insert("scene.json", SCENE);
        let env = StageEnv::new(
            resolver.clone(),
            Arc::new(JsonComposer::new(NoticeBus::new())),
            StageCache::new(),
        );
        (resolver, env)
    }

    fn shape(prim: &str) -> ProxyShape {
        let (_, env) = env();
        let s = ProxyShape::new("proxy1", env, ProxyHooks::default());
        s.set_attr(A_FILE_PATH, "scene.json".into());
        s.set_attr(A_PRIM_PATH, prim.into());
        s
    }

    #[test]
    fn test_defaults() {
        let (_, env) = env();
        let s = ProxyShape::new("p", env, ProxyHooks::default());
        assert_eq!(s.get_complexity(), 0);
        assert_eq!(s.get_time(), TimeCode::ZERO);
        assert_eq!(s.purposes(), PurposeFilter::default());
        assert_eq!(s.status(), StageStatus::Empty);
        assert!(!s.is_stage_valid());
        assert_eq!(s.bounding_box(), BBox3::ZERO);
        assert!(!s.listener().is_subscribed());
    }

    #[test]
    fn test_bounds_follow_time() {
        let s = shape("/World/Geo");
        s.set_attr(A_TIME, 1.0.into());
        assert_eq!(s.bounding_box().max, DVec3::ONE);
        s.set_attr(A_TIME, 2.0.into());
        assert_eq!(s.bounding_box().max, DVec3::splat(2.0));
        assert_eq!(s.bounds_cache_len(), 2);
    }

    #[test]
    fn test_complexity_clamped() {
        let s = shape("/World/Geo");
        s.set_attr(A_COMPLEXITY, 42.into());
        assert_eq!(s.get_complexity(), MAX_COMPLEXITY);
        s.set_attr(A_COMPLEXITY, (-3).into());
        assert_eq!(s.get_complexity(), 0);
    }

    #[test]
    fn test_purpose_change_clears_bounds() {
        let s = shape("/World");
        s.set_attr(A_TIME, 1.0.into());
        let without_guide = s.bounding_box();
        assert_eq!(without_guide.max, DVec3::ONE);

        s.set_attr(A_DRAW_GUIDE_PURPOSE, true.into());
        assert_eq!(s.bounds_cache_len(), 0);
        assert_eq!(s.bounding_box().max, DVec3::splat(5.0));
    }

    #[test]
    fn test_empty_prim_seeds_hook() {
        let (_, env) = env();
        let hooks = ProxyHooks::default().with_empty_bounds(|b: &mut BBox3| *b = BBox3::from_arrays([-1.0; 3], [1.0; 3]));
        let s = ProxyShape::new("p", env, hooks);
        s.set_attr(A_FILE_PATH, "scene.json".into());
        s.set_attr(A_PRIM_PATH, "/World/Empty".into());
        assert_eq!(s.bounding_box().min, DVec3::splat(-1.0));
        assert_eq!(s.get_shape_selection_mask(), SelectionMask::NONE);
    }

    #[test]
    fn test_output_time_hook_keys_cache() {
        let (_, env) = env();
        let hooks = ProxyHooks::default().with_output_time(|t: TimeCode| TimeCode::new(t.value() + 1.0));
        let s = ProxyShape::new("p", env, hooks);
        s.set_attr(A_FILE_PATH, "scene.json".into());
        s.set_attr(A_PRIM_PATH, "/World/Geo".into());
        s.set_attr(A_TIME, 1.0.into());
        assert_eq!(s.bounding_box().max, DVec3::splat(2.0));
        assert_eq!(s.bounds_cache_times(), vec![TimeCode::new(2.0)]);
    }

    #[test]
    fn test_stage_edit_invalidates_bounds() {
        let s = shape("/World/Geo");
        s.set_attr(A_TIME, 1.0.into());
        assert_eq!(s.bounding_box().max, DVec3::ONE);

        let path = PrimPath::parse("/World/Geo").unwrap();
        s.edit_stage(StageEdit::SetSample {
            path,
            time: TimeCode::new(1.0),
            bbox: BBox3::from_arrays([0.0; 3], [3.0; 3]),
        })
        .unwrap();
        assert!(s.dirty_plugs().contains(&Plug::OutStageData));
        assert_eq!(s.bounding_box().max, DVec3::splat(3.0));
    }

    #[test]
    fn test_render_attributes() {
        let s = shape("/World/Geo");
        s.set_attr(A_COMPLEXITY, 3.into());
        let ra = s.render_attributes().unwrap();
        assert_eq!(ra.prim.path().as_str(), "/World/Geo");
        assert_eq!(ra.complexity, 3);
        assert!(ra.draw_proxy_purpose);

        let (_, env) = env();
        let empty = ProxyShape::new("p", env, ProxyHooks::default());
        assert!(empty.render_attributes().is_none());
    }

    #[test]
    fn test_reload_reopens() {
        let s = shape("/World/Geo");
        let before = s.stage_id().unwrap();
        s.bounding_box();
        s.reload();
        assert_eq!(s.bounds_cache_len(), 0);
        let after = s.stage_id().unwrap();
        assert_ne!(before, after);
        assert_eq!(s.listener().stage(), Some(after));
    }

    #[test]
    fn test_release_stage() {
        let s = shape("/World/Geo");
        assert!(s.is_stage_valid());
        s.release_stage();
        assert!(!s.listener().is_subscribed());
        assert_eq!(s.bounds_cache_len(), 0);
        // Next pull re-opens.
        assert!(s.is_stage_valid());
        assert!(s.listener().is_subscribed());
    }

    #[test]
    fn test_json_roundtrip_keeps_config() {
        let s = shape("/World/Geo");
        s.set_attr(A_TIME, 2.0.into());
        let json = s.to_json().unwrap();

        let (_, env) = env();
        let back = ProxyShape::from_json(&json, env, ProxyHooks::default()).unwrap();
        assert_eq!(back.uuid(), s.uuid());
        assert_eq!(back.prim_path(), "/World/Geo");
        assert_eq!(back.get_time(), TimeCode::new(2.0));
        assert_eq!(back.bounding_box().max, DVec3::splat(2.0));
    }

    #[test]
    fn test_compute_unknown_for_inputs() {
        let s = shape("/World/Geo");
        assert_eq!(s.compute(Plug::Time), ComputeStatus::Unknown);
        assert_eq!(s.compute(Plug::OutStageData), ComputeStatus::Computed);
        assert_eq!(s.compute(Plug::OutStageData), ComputeStatus::Clean);
    }
}
