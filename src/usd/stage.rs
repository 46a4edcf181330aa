//! Composed stages and prim handles.
//!
//! A [`Stage`] is the result of composing a root layer, an optional
//! session layer and a population mask (excluded subtrees). Its identity
//! (`id()`) never changes; edits swap the composed contents in place and
//! send `StageContentsChanged` / `ObjectsChanged` through the notice bus.

use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::core::notice_bus::{Notice, NoticeBus, StageId};
use crate::error::ProxyError;

use super::geom::{BBox3, Purpose, PurposeFilter};
use super::layer::{LayerData, PrimSpec, SessionLayer};
use super::path::PrimPath;
use super::time::TimeCode;

static NEXT_STAGE_ID: AtomicU64 = AtomicU64::new(1);

/// A prim after composition.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPrim {
    pub path: PrimPath,
    pub type_name: String,
    pub purpose: Purpose,
    pub active: bool,
    extent: Option<BBox3>,
    samples: Vec<(TimeCode, BBox3)>,
}

impl ComposedPrim {
    fn from_spec(spec: &PrimSpec) -> Self {
        let mut samples: Vec<(TimeCode, BBox3)> = spec.samples.iter().map(|s| (s.time, s.bbox())).collect();
        samples.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            path: spec.path.clone(),
            type_name: spec.type_name.clone().unwrap_or_default(),
            purpose: spec.purpose.unwrap_or_default(),
            active: spec.active.unwrap_or(true),
            extent: spec.extent.map(|[min, max]| BBox3::from_arrays(min, max)),
            samples,
        }
    }

    fn implicit(path: PrimPath) -> Self {
        Self {
            path,
            type_name: String::new(),
            purpose: Purpose::Default,
            active: true,
            extent: None,
            samples: Vec::new(),
        }
    }

    pub fn is_time_varying(&self) -> bool {
        self.samples.len() > 1
    }

    /// Extent at `time`: linear between bracketing samples, held outside
    /// the sampled range, static extent when unsampled.
    pub fn extent_at(&self, time: TimeCode) -> Option<BBox3> {
        if self.samples.is_empty() {
            return self.extent;
        }
        let idx = self.samples.partition_point(|(t, _)| *t <= time);
        if idx == 0 {
            return Some(self.samples[0].1);
        }
        let (t0, b0) = self.samples[idx - 1];
        match self.samples.get(idx) {
            Some((t1, b1)) => Some(b0.lerp(b1, time.alpha(t0, *t1))),
            None => Some(b0),
        }
    }
}

/// Immutable snapshot of a stage's composed prims.
#[derive(Debug, Clone, Default)]
pub struct StageContents {
    prims: BTreeMap<PrimPath, ComposedPrim>,
    default_prim: Option<PrimPath>,
    revision: u64,
}

impl StageContents {
    /// Compose root + session opinions, dropping excluded subtrees.
    pub fn compose(root: &LayerData, session: Option<&LayerData>, excludes: &[PrimPath]) -> Result<Self, ProxyError> {
        let mut specs: BTreeMap<PrimPath, PrimSpec> = BTreeMap::new();
        for spec in &root.prims {
            if spec.path.is_root() {
                return Err(ProxyError::CompositionError("Cannot author opinions on the pseudo-root".into()));
            }
            if specs.insert(spec.path.clone(), spec.clone()).is_some() {
                return Err(ProxyError::CompositionError(format!("Duplicate prim spec: {}", spec.path)));
            }
        }
        if let Some(session) = session {
            for over in &session.prims {
                match specs.get_mut(&over.path) {
                    Some(spec) => spec.apply_override(over),
                    // Session-only specs need a type to define a prim
                    None if over.type_name.is_some() => {
                        specs.insert(over.path.clone(), over.clone());
                    }
                    None => {}
                }
            }
        }

        let mut prims = BTreeMap::new();
        for (path, spec) in &specs {
            if excludes.iter().any(|ex| path.has_prefix(ex)) {
                continue;
            }
            validate_spec(spec)?;
            // Ancestors without specs exist implicitly
            let mut parent = path.parent();
            while let Some(p) = parent {
                if p.is_root() {
                    break;
                }
                prims.entry(p.clone()).or_insert_with(|| ComposedPrim::implicit(p.clone()));
                parent = p.parent();
            }
            prims.insert(path.clone(), ComposedPrim::from_spec(spec));
        }

        let default_prim = root
            .default_prim
            .as_deref()
            .and_then(|name| PrimPath::root().child(name))
            .filter(|p| prims.contains_key(p));

        Ok(Self {
            prims,
            default_prim,
            revision: 0,
        })
    }

    pub fn get(&self, path: &PrimPath) -> Option<&ComposedPrim> {
        self.prims.get(path)
    }

    pub fn contains(&self, path: &PrimPath) -> bool {
        path.is_root() || self.prims.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.prims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prims.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn default_prim(&self) -> Option<&PrimPath> {
        self.default_prim.as_ref()
    }

    /// `path` and all prims beneath it, parents first.
    pub fn subtree<'a>(&'a self, path: &'a PrimPath) -> impl Iterator<Item = &'a ComposedPrim> + 'a {
        self.prims
            .range(path.clone()..)
            .take_while(move |(p, _)| p.has_prefix(path))
            .map(|(_, prim)| prim)
    }

    /// Active unless the prim or any ancestor is deactivated.
    fn is_effectively_active(&self, prim: &ComposedPrim) -> bool {
        let mut cur = Some(prim.path.clone());
        while let Some(p) = cur {
            if let Some(c) = self.prims.get(&p) {
                if !c.active {
                    return false;
                }
            }
            cur = p.parent();
        }
        true
    }

    /// Purpose inherited from the nearest ancestor with a non-default one.
    fn effective_purpose(&self, prim: &ComposedPrim) -> Purpose {
        let mut cur = Some(prim.path.clone());
        while let Some(p) = cur {
            if let Some(c) = self.prims.get(&p) {
                if c.purpose != Purpose::Default {
                    return c.purpose;
                }
            }
            cur = p.parent();
        }
        Purpose::Default
    }

    /// Union of the extents beneath `path` at `time` for the enabled
    /// purposes. `BBox3::EMPTY` when nothing contributes.
    pub fn compute_extent(&self, path: &PrimPath, time: TimeCode, purposes: PurposeFilter) -> BBox3 {
        let mut bbox = BBox3::EMPTY;
        for prim in self.subtree(path) {
            let Some(extent) = prim.extent_at(time) else {
                continue;
            };
            if !self.is_effectively_active(prim) || !purposes.includes(self.effective_purpose(prim)) {
                continue;
            }
            bbox = bbox.union(&extent);
        }
        bbox
    }
}

/// Change applied through [`Stage::apply_edit`].
#[derive(Debug, Clone, PartialEq)]
pub enum StageEdit {
    SetExtent { path: PrimPath, bbox: BBox3 },
    SetSample { path: PrimPath, time: TimeCode, bbox: BBox3 },
    SetPurpose { path: PrimPath, purpose: Purpose },
    SetActive { path: PrimPath, active: bool },
    Define(PrimSpec),
}

impl StageEdit {
    pub fn path(&self) -> &PrimPath {
        match self {
            StageEdit::SetExtent { path, .. }
            | StageEdit::SetSample { path, .. }
            | StageEdit::SetPurpose { path, .. }
            | StageEdit::SetActive { path, .. } => path,
            StageEdit::Define(spec) => &spec.path,
        }
    }

    fn apply(&self, layer: &mut LayerData) {
        match self {
            StageEdit::SetExtent { path, bbox } => {
                layer.spec_mut(path).extent = Some([bbox.min.to_array(), bbox.max.to_array()]);
            }
            StageEdit::SetSample { path, time, bbox } => layer.spec_mut(path).set_sample(*time, *bbox),
            StageEdit::SetPurpose { path, purpose } => layer.spec_mut(path).purpose = Some(*purpose),
            StageEdit::SetActive { path, active } => layer.spec_mut(path).active = Some(*active),
            StageEdit::Define(spec) => {
                let target = layer.spec_mut(&spec.path);
                target.apply_override(spec);
                if target.type_name.is_none() {
                    target.type_name = Some(String::new());
                }
            }
        }
    }
}

fn validate_spec(spec: &PrimSpec) -> Result<(), ProxyError> {
    let finite = |v: &[f64; 3]| v.iter().all(|c| c.is_finite());
    if let Some([min, max]) = &spec.extent {
        if !finite(min) || !finite(max) {
            return Err(ProxyError::CompositionError(format!("Non-finite extent on {}", spec.path)));
        }
    }
    for s in &spec.samples {
        if !s.time.value().is_finite() || !finite(&s.min) || !finite(&s.max) {
            return Err(ProxyError::CompositionError(format!("Non-finite extent sample on {}", spec.path)));
        }
    }
    Ok(())
}

/// Composed stage. Shared via `Arc<Stage>`.
pub struct Stage {
    id: StageId,
    identifier: String,
    root: RwLock<LayerData>,
    session: Option<Arc<SessionLayer>>,
    excludes: Vec<PrimPath>,
    contents: RwLock<Arc<StageContents>>,
    bus: NoticeBus,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("session", &self.session.as_ref().map(|s| s.identifier().to_string()))
            .field("excludes", &self.excludes)
            .finish()
    }
}

impl Stage {
    /// Compose a new stage. Fails with `CompositionError`.
    pub fn open(
        identifier: impl Into<String>,
        root: LayerData,
        session: Option<Arc<SessionLayer>>,
        excludes: Vec<PrimPath>,
        bus: NoticeBus,
    ) -> Result<Stage, ProxyError> {
        let session_data = session.as_ref().map(|s| s.data());
        let contents = StageContents::compose(&root, session_data.as_ref(), &excludes)?;
        let stage = Stage {
            id: NEXT_STAGE_ID.fetch_add(1, Ordering::Relaxed),
            identifier: identifier.into(),
            root: RwLock::new(root),
            session,
            excludes,
            contents: RwLock::new(Arc::new(contents)),
            bus,
        };
        debug!("Stage {} opened: {} ({} prims)", stage.id, stage.identifier, stage.contents().len());
        Ok(stage)
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    /// Identifier of the root layer.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn session_layer(&self) -> Option<&Arc<SessionLayer>> {
        self.session.as_ref()
    }

    pub fn excludes(&self) -> &[PrimPath] {
        &self.excludes
    }

    pub fn bus(&self) -> &NoticeBus {
        &self.bus
    }

    /// Current composed contents. The snapshot stays valid after edits.
    pub fn contents(&self) -> Arc<StageContents> {
        Arc::clone(&self.contents.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn revision(&self) -> u64 {
        self.contents().revision()
    }

    pub fn pseudo_root(self: &Arc<Self>) -> Prim {
        Prim {
            stage: Some(Arc::clone(self)),
            path: PrimPath::root(),
        }
    }

    /// Prim at `path`, None if the composed stage has no such prim.
    pub fn prim_at(self: &Arc<Self>, path: &PrimPath) -> Option<Prim> {
        if !self.contents().contains(path) {
            return None;
        }
        Some(Prim {
            stage: Some(Arc::clone(self)),
            path: path.clone(),
        })
    }

    /// Apply an edit to the session layer (or the in-memory root layer when
    /// the stage has none), recompose, then notify observers.
    ///
    /// Locks are released before notices go out, so observers may read the
    /// stage from their callbacks.
    pub fn apply_edit(&self, edit: StageEdit) -> Result<(), ProxyError> {
        let path = edit.path().clone();
        {
            let mut contents = self.contents.write().unwrap_or_else(|e| e.into_inner());
            let next_revision = contents.revision() + 1;
            let mut root = self.root.write().unwrap_or_else(|e| e.into_inner());

            let composed = match &self.session {
                Some(session) => {
                    let mut trial = session.data();
                    edit.apply(&mut trial);
                    let composed = StageContents::compose(&root, Some(&trial), &self.excludes)?;
                    session.edit(|data| *data = trial);
                    composed
                }
                None => {
                    let mut trial = root.clone();
                    edit.apply(&mut trial);
                    let composed = StageContents::compose(&trial, None, &self.excludes)?;
                    *root = trial;
                    composed
                }
            };
            *contents = Arc::new(StageContents {
                revision: next_revision,
                ..composed
            });
        }

        debug!("Stage {} edited at {}", self.id, path);
        self.bus.send(&Notice::ObjectsChanged {
            stage: self.id,
            paths: vec![path],
        });
        self.bus.send(&Notice::StageContentsChanged { stage: self.id });
        Ok(())
    }

    /// Tell observers the stage changed without editing it.
    pub fn notify_changed(&self) -> usize {
        self.bus.send(&Notice::StageContentsChanged { stage: self.id })
    }
}

/// Handle to a prim on a stage. Invalid when it refers to no stage.
///
/// Equality is identity: same stage object, same path.
#[derive(Clone, Default)]
pub struct Prim {
    stage: Option<Arc<Stage>>,
    path: PrimPath,
}

impl Prim {
    /// The invalid prim.
    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.stage.is_some()
    }

    pub fn is_pseudo_root(&self) -> bool {
        self.is_valid() && self.path.is_root()
    }

    pub fn path(&self) -> &PrimPath {
        &self.path
    }

    pub fn stage(&self) -> Option<&Arc<Stage>> {
        self.stage.as_ref()
    }

    pub fn type_name(&self) -> String {
        self.stage
            .as_ref()
            .and_then(|s| s.contents().get(&self.path).map(|p| p.type_name.clone()))
            .unwrap_or_default()
    }

    /// Untransformed bounds of this prim's subtree.
    pub fn compute_extent(&self, time: TimeCode, purposes: PurposeFilter) -> BBox3 {
        match &self.stage {
            Some(stage) => stage.contents().compute_extent(&self.path, time, purposes),
            None => BBox3::EMPTY,
        }
    }
}

impl PartialEq for Prim {
    fn eq(&self, other: &Self) -> bool {
        let same_stage = match (&self.stage, &other.stage) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        same_stage && self.path == other.path
    }
}

impl fmt::Debug for Prim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.stage {
            Some(stage) => write!(f, "Prim(stage {}, {})", stage.id(), self.path),
            None => write!(f, "Prim(invalid)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> PrimPath {
        PrimPath::parse(s).unwrap()
    }

    fn layer() -> LayerData {
        LayerData {
            default_prim: Some("World".into()),
            prims: vec![
                PrimSpec::new(path("/World"), "Xform"),
                PrimSpec::new(path("/World/Geo"), "Mesh")
                    .with_sample(1.0, BBox3::from_arrays([0.0; 3], [1.0; 3]))
                    .with_sample(3.0, BBox3::from_arrays([0.0; 3], [3.0; 3])),
                PrimSpec::new(path("/World/Guide"), "Mesh")
                    .with_purpose(Purpose::Guide)
                    .with_extent(BBox3::from_arrays([-5.0; 3], [-4.0; 3])),
            ],
        }
    }

    fn open(excludes: Vec<PrimPath>) -> Arc<Stage> {
        Arc::new(Stage::open("test", layer(), None, excludes, NoticeBus::new()).unwrap())
    }

    #[test]
    fn test_extent_interpolation() {
        let stage = open(vec![]);
        let geo = stage.prim_at(&path("/World/Geo")).unwrap();
        let purposes = PurposeFilter::default();
        assert_eq!(geo.compute_extent(TimeCode::new(2.0), purposes).max.x, 2.0);
        // Held outside the sampled range
        assert_eq!(geo.compute_extent(TimeCode::new(0.0), purposes).max.x, 1.0);
        assert_eq!(geo.compute_extent(TimeCode::new(10.0), purposes).max.x, 3.0);
    }

    #[test]
    fn test_purpose_filter_applies() {
        let stage = open(vec![]);
        let world = stage.prim_at(&path("/World")).unwrap();
        let no_guide = PurposeFilter { render: false, proxy: true, guide: false };
        let with_guide = PurposeFilter { guide: true, ..no_guide };
        assert_eq!(world.compute_extent(TimeCode::new(1.0), no_guide).min.x, 0.0);
        assert_eq!(world.compute_extent(TimeCode::new(1.0), with_guide).min.x, -5.0);
    }

    #[test]
    fn test_excluded_subtree_missing() {
        let stage = open(vec![path("/World/Geo")]);
        assert!(stage.prim_at(&path("/World/Geo")).is_none());
        assert!(stage.prim_at(&path("/World")).is_some());
        let extent = stage.pseudo_root().compute_extent(TimeCode::ZERO, PurposeFilter::default());
        assert!(extent.is_empty());
    }

    #[test]
    fn test_duplicate_spec_is_composition_error() {
        let mut l = layer();
        l.prims.push(PrimSpec::new(path("/World"), "Xform"));
        let err = Stage::open("dup", l, None, vec![], NoticeBus::new()).unwrap_err();
        assert!(matches!(err, ProxyError::CompositionError(_)));
    }

    #[test]
    fn test_implicit_ancestors() {
        let l = LayerData {
            default_prim: None,
            prims: vec![PrimSpec::new(path("/A/B/C"), "Mesh")],
        };
        let stage = Arc::new(Stage::open("implicit", l, None, vec![], NoticeBus::new()).unwrap());
        assert!(stage.prim_at(&path("/A/B")).is_some());
        assert_eq!(stage.contents().len(), 3);
    }

    #[test]
    fn test_session_edit_keeps_identity_and_notifies() {
        let bus = NoticeBus::new();
        let session = Arc::new(SessionLayer::new("session"));
        let stage = Arc::new(Stage::open("edit", layer(), Some(Arc::clone(&session)), vec![], bus.clone()).unwrap());
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe(
            stage.id(),
            crate::core::notice_bus::NoticeKind::StageContentsChanged,
            Arc::new(move |_, _| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let id = stage.id();
        stage
            .apply_edit(StageEdit::SetActive { path: path("/World/Geo"), active: false })
            .unwrap();
        assert_eq!(stage.id(), id);
        assert_eq!(stage.revision(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        // The opinion landed on the session layer, not the root
        assert_eq!(session.data().prims.len(), 1);
        let geo = stage.prim_at(&path("/World/Geo")).unwrap();
        assert!(geo.compute_extent(TimeCode::new(1.0), PurposeFilter::default()).is_empty());
    }

    #[test]
    fn test_failed_edit_keeps_contents() {
        let stage = open(vec![]);
        let bad = BBox3 {
            min: glam::DVec3::splat(f64::NAN),
            max: glam::DVec3::ONE,
        };
        let err = stage.apply_edit(StageEdit::SetExtent { path: path("/World/Geo"), bbox: bad });
        assert!(err.is_err());
        assert_eq!(stage.revision(), 0);
    }

    #[test]
    fn test_prim_identity() {
        let stage = open(vec![]);
        let a = stage.prim_at(&path("/World")).unwrap();
        let b = stage.prim_at(&path("/World")).unwrap();
        assert_eq!(a, b);
        let other = open(vec![]);
        assert_ne!(a, other.prim_at(&path("/World")).unwrap());
        assert!(!Prim::invalid().is_valid());
    }
}
