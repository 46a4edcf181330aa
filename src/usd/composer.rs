//! Stage composition from resolved assets.

use std::sync::Arc;

use crate::core::notice_bus::NoticeBus;
use crate::error::ProxyError;

use super::layer::{LayerData, SessionLayer};
use super::path::PrimPath;
use super::resolver::ResolvedAsset;
use super::stage::Stage;

/// Opens stages from resolved root layers.
pub trait StageComposer: Send + Sync {
    fn open_stage(
        &self,
        root: &ResolvedAsset,
        session: Option<Arc<SessionLayer>>,
        excludes: &[PrimPath],
    ) -> Result<Stage, ProxyError>;
}

/// Composer for the JSON scene description. Stages it opens send their
/// notices through `bus`.
#[derive(Debug, Clone)]
pub struct JsonComposer {
    bus: NoticeBus,
}

impl JsonComposer {
    pub fn new(bus: NoticeBus) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &NoticeBus {
        &self.bus
    }
}

impl Default for JsonComposer {
    fn default() -> Self {
        Self::new(NoticeBus::global())
    }
}

impl StageComposer for JsonComposer {
    fn open_stage(
        &self,
        root: &ResolvedAsset,
        session: Option<Arc<SessionLayer>>,
        excludes: &[PrimPath],
    ) -> Result<Stage, ProxyError> {
        let layer = LayerData::from_json(&root.contents)
            .map_err(|e| ProxyError::CompositionError(format!("{}: {}", root.identifier, e)))?;
        Stage::open(root.identifier.clone(), layer, session, excludes.to_vec(), self.bus.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_failure_is_composition_error() {
        let composer = JsonComposer::new(NoticeBus::new());
        let asset = ResolvedAsset {
            identifier: "bad".into(),
            contents: "{ not json".into(),
        };
        assert!(matches!(composer.open_stage(&asset, None, &[]), Err(ProxyError::CompositionError(_))));
    }

    #[test]
    fn test_open_with_excludes() {
        let composer = JsonComposer::new(NoticeBus::new());
        let asset = ResolvedAsset {
            identifier: "ok".into(),
            contents: r#"{ "prims": [ { "path": "/A", "type": "Mesh" }, { "path": "/B", "type": "Mesh" } ] }"#.into(),
        };
        let excludes = vec![PrimPath::parse("/B").unwrap()];
        let stage = composer.open_stage(&asset, None, &excludes).unwrap();
        assert_eq!(stage.contents().len(), 1);
        assert_eq!(stage.excludes(), excludes.as_slice());
    }
}
