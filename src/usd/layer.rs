//! Layer documents: the authored opinions a stage is composed from.
//!
//! Layers are parsed from the JSON scene description:
//!
//! ```json
//! { "default_prim": "World",
//!   "prims": [
//!     { "path": "/World", "type": "Xform" },
//!     { "path": "/World/Geo", "type": "Mesh",
//!       "extent": [[-1, -1, -1], [1, 1, 1]],
//!       "samples": [ { "time": 1.0, "min": [0, 0, 0], "max": [1, 1, 1] } ] }
//!   ] }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::geom::{BBox3, Purpose};
use super::path::PrimPath;
use super::time::TimeCode;

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// One time sample of a prim's extent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtentSample {
    pub time: TimeCode,
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl ExtentSample {
    pub fn bbox(&self) -> BBox3 {
        BBox3::from_arrays(self.min, self.max)
    }
}

/// Authored opinions for a single prim.
///
/// In the root layer a spec defines the prim. In a session layer every
/// `Some`/non-empty field overrides the weaker opinion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimSpec {
    pub path: PrimPath,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<Purpose>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<[[f64; 3]; 2]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<ExtentSample>,
}

impl PrimSpec {
    pub fn new(path: PrimPath, type_name: &str) -> Self {
        Self {
            path,
            type_name: Some(type_name.to_string()),
            ..Default::default()
        }
    }

    pub fn with_extent(mut self, bbox: BBox3) -> Self {
        self.extent = Some([bbox.min.to_array(), bbox.max.to_array()]);
        self
    }

    pub fn with_sample(mut self, time: f64, bbox: BBox3) -> Self {
        self.set_sample(TimeCode::new(time), bbox);
        self
    }

    pub fn with_purpose(mut self, purpose: Purpose) -> Self {
        self.purpose = Some(purpose);
        self
    }

    /// Insert or overwrite the sample at `time`, keeping samples sorted.
    pub fn set_sample(&mut self, time: TimeCode, bbox: BBox3) {
        let sample = ExtentSample {
            time,
            min: bbox.min.to_array(),
            max: bbox.max.to_array(),
        };
        match self.samples.binary_search_by(|s| s.time.cmp(&time)) {
            Ok(idx) => self.samples[idx] = sample,
            Err(idx) => self.samples.insert(idx, sample),
        }
    }

    /// Merge a stronger opinion over this one.
    pub fn apply_override(&mut self, over: &PrimSpec) {
        if over.type_name.is_some() {
            self.type_name = over.type_name.clone();
        }
        if over.purpose.is_some() {
            self.purpose = over.purpose;
        }
        if over.active.is_some() {
            self.active = over.active;
        }
        if over.extent.is_some() {
            self.extent = over.extent;
        }
        if !over.samples.is_empty() {
            self.samples = over.samples.clone();
        }
    }
}

/// Parsed layer document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_prim: Option<String>,
    #[serde(default)]
    pub prims: Vec<PrimSpec>,
}

impl LayerData {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let mut layer: LayerData = serde_json::from_str(text)?;
        for spec in &mut layer.prims {
            spec.samples.sort_by(|a, b| a.time.cmp(&b.time));
        }
        Ok(layer)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn spec(&self, path: &PrimPath) -> Option<&PrimSpec> {
        self.prims.iter().find(|s| &s.path == path)
    }

    /// Spec for `path`, created empty if missing.
    pub fn spec_mut(&mut self, path: &PrimPath) -> &mut PrimSpec {
        let idx = match self.prims.iter().position(|s| &s.path == path) {
            Some(idx) => idx,
            None => {
                self.prims.push(PrimSpec {
                    path: path.clone(),
                    ..Default::default()
                });
                self.prims.len() - 1
            }
        };
        &mut self.prims[idx]
    }
}

/// In-memory, never-saved layer composed over the root layer.
///
/// Owned by whoever created it (usually a proxy node's session-layer hook).
/// Two stages share a session layer only if they share this object.
#[derive(Debug)]
pub struct SessionLayer {
    id: u64,
    identifier: String,
    data: RwLock<LayerData>,
}

impl SessionLayer {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self::with_data(identifier, LayerData::default())
    }

    pub fn with_data(identifier: impl Into<String>, data: LayerData) -> Self {
        Self {
            id: NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed),
            identifier: identifier.into(),
            data: RwLock::new(data),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Snapshot of the current opinions.
    pub fn data(&self) -> LayerData {
        self.data.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn edit<R>(&self, f: impl FnOnce(&mut LayerData) -> R) -> R {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        f(&mut data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layer() {
        let json = r#"{
            "default_prim": "World",
            "prims": [
                { "path": "/World", "type": "Xform" },
                { "path": "/World/Geo", "type": "Mesh", "purpose": "proxy",
                  "extent": [[-1, -1, -1], [1, 1, 1]],
                  "samples": [
                    { "time": 2.0, "min": [0, 0, 0], "max": [2, 2, 2] },
                    { "time": 1.0, "min": [0, 0, 0], "max": [1, 1, 1] }
                  ] }
            ]
        }"#;
        let layer = LayerData::from_json(json).unwrap();
        assert_eq!(layer.prims.len(), 2);
        let geo = layer.spec(&PrimPath::parse("/World/Geo").unwrap()).unwrap();
        assert_eq!(geo.purpose, Some(Purpose::Proxy));
        // Samples are sorted on load
        assert_eq!(geo.samples[0].time, TimeCode::new(1.0));
    }

    #[test]
    fn test_bad_path_rejected() {
        let json = r#"{ "prims": [ { "path": "World" } ] }"#;
        assert!(LayerData::from_json(json).is_err());
    }

    #[test]
    fn test_override_merge() {
        let path = PrimPath::parse("/A").unwrap();
        let mut base = PrimSpec::new(path.clone(), "Mesh").with_extent(BBox3::from_arrays([0.0; 3], [1.0; 3]));
        let over = PrimSpec {
            path,
            active: Some(false),
            ..Default::default()
        };
        base.apply_override(&over);
        assert_eq!(base.active, Some(false));
        assert_eq!(base.type_name.as_deref(), Some("Mesh"));
        assert!(base.extent.is_some());
    }

    #[test]
    fn test_session_layer_ids_unique() {
        let a = SessionLayer::new("a");
        let b = SessionLayer::new("b");
        assert_ne!(a.id(), b.id());
    }
}
