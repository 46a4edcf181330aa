//! Plugs of the proxy node and their dependency table.
//!
//! Inputs are attribute-backed; computed plugs form the pull chain
//! `InStageData → InStageDataCached → OutStageData → BoundingBox`.
//! Dirty bits live in an atomic word so the stage notice callback can
//! mark them without touching the compute lock.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::keys::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Plug {
    // Inputs
    FilePath,
    ExcludePrimPaths,
    PrimPath,
    Time,
    Complexity,
    DrawRenderPurpose,
    DrawProxyPurpose,
    DrawGuidePurpose,
    // Computed
    InStageData,
    InStageDataCached,
    OutStageData,
    BoundingBox,
}

impl Plug {
    pub const ALL: [Plug; 12] = [
        Plug::FilePath,
        Plug::ExcludePrimPaths,
        Plug::PrimPath,
        Plug::Time,
        Plug::Complexity,
        Plug::DrawRenderPurpose,
        Plug::DrawProxyPurpose,
        Plug::DrawGuidePurpose,
        Plug::InStageData,
        Plug::InStageDataCached,
        Plug::OutStageData,
        Plug::BoundingBox,
    ];

    /// Computed plugs in pull order.
    pub const CHAIN: [Plug; 3] = [Plug::InStageData, Plug::InStageDataCached, Plug::OutStageData];

    fn bit(self) -> u32 {
        1 << (self as u32)
    }

    pub fn name(self) -> &'static str {
        match self {
            Plug::FilePath => "filePath",
            Plug::ExcludePrimPaths => "excludePrimPaths",
            Plug::PrimPath => "primPath",
            Plug::Time => "time",
            Plug::Complexity => "complexity",
            Plug::DrawRenderPurpose => "drawRenderPurpose",
            Plug::DrawProxyPurpose => "drawProxyPurpose",
            Plug::DrawGuidePurpose => "drawGuidePurpose",
            Plug::InStageData => "inStageData",
            Plug::InStageDataCached => "inStageDataCached",
            Plug::OutStageData => "outStageData",
            Plug::BoundingBox => "boundingBox",
        }
    }

    /// Input plug backed by an attribute key.
    pub fn from_attr(key: &str) -> Option<Plug> {
        Some(match key {
            A_FILE_PATH => Plug::FilePath,
            A_EXCLUDE_PRIM_PATHS => Plug::ExcludePrimPaths,
            A_PRIM_PATH => Plug::PrimPath,
            A_TIME => Plug::Time,
            A_COMPLEXITY => Plug::Complexity,
            A_DRAW_RENDER_PURPOSE => Plug::DrawRenderPurpose,
            A_DRAW_PROXY_PURPOSE => Plug::DrawProxyPurpose,
            A_DRAW_GUIDE_PURPOSE => Plug::DrawGuidePurpose,
            _ => return None,
        })
    }

    pub fn from_name(name: &str) -> Option<Plug> {
        Plug::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn is_computed(self) -> bool {
        matches!(
            self,
            Plug::InStageData | Plug::InStageDataCached | Plug::OutStageData | Plug::BoundingBox
        )
    }

    /// A change to this plug forces every cached bounding volume out.
    pub fn invalidates_bounds(self) -> bool {
        matches!(
            self,
            Plug::FilePath
                | Plug::ExcludePrimPaths
                | Plug::PrimPath
                | Plug::DrawRenderPurpose
                | Plug::DrawProxyPurpose
                | Plug::DrawGuidePurpose
        )
    }

    /// Direct dependents.
    pub fn affects(self) -> &'static [Plug] {
        match self {
            Plug::FilePath | Plug::ExcludePrimPaths => &[Plug::InStageData],
            Plug::PrimPath | Plug::InStageData => &[Plug::InStageDataCached],
            Plug::Time => &[Plug::InStageDataCached, Plug::OutStageData],
            Plug::Complexity
            | Plug::DrawRenderPurpose
            | Plug::DrawProxyPurpose
            | Plug::DrawGuidePurpose
            | Plug::InStageDataCached => &[Plug::OutStageData],
            Plug::OutStageData => &[Plug::BoundingBox],
            Plug::BoundingBox => &[],
        }
    }

    /// Transitive dependents, excluding `self`.
    pub fn downstream(self) -> Vec<Plug> {
        let mut out: Vec<Plug> = Vec::new();
        let mut stack: Vec<Plug> = self.affects().to_vec();
        while let Some(p) = stack.pop() {
            if !out.contains(&p) {
                out.push(p);
                stack.extend_from_slice(p.affects());
            }
        }
        out.sort();
        out
    }
}

impl fmt::Display for Plug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dirty bits for computed plugs plus the "stage contents changed" latch.
#[derive(Debug)]
pub struct DirtyState {
    plugs: AtomicU32,
    contents_changed: AtomicBool,
}

impl Default for DirtyState {
    fn default() -> Self {
        Self::new()
    }
}

impl DirtyState {
    /// Everything computed starts dirty.
    pub fn new() -> Self {
        let bits = Plug::ALL.iter().filter(|p| p.is_computed()).fold(0, |acc, p| acc | p.bit());
        Self {
            plugs: AtomicU32::new(bits),
            contents_changed: AtomicBool::new(false),
        }
    }

    pub fn is_dirty(&self, plug: Plug) -> bool {
        self.plugs.load(Ordering::Acquire) & plug.bit() != 0
    }

    pub fn any_dirty(&self) -> bool {
        self.plugs.load(Ordering::Acquire) != 0
    }

    pub fn mark(&self, plug: Plug) {
        self.plugs.fetch_or(plug.bit(), Ordering::AcqRel);
    }

    /// Mark `plug` (if computed) and everything downstream of it.
    /// Returns the affected computed plugs.
    pub fn mark_with_dependents(&self, plug: Plug) -> Vec<Plug> {
        let mut affected = plug.downstream();
        if plug.is_computed() {
            affected.insert(0, plug);
        }
        let bits = affected.iter().fold(0, |acc, p| acc | p.bit());
        self.plugs.fetch_or(bits, Ordering::AcqRel);
        affected
    }

    pub fn mark_all(&self) {
        for plug in Plug::CHAIN {
            self.mark_with_dependents(plug);
        }
    }

    pub fn clean(&self, plug: Plug) {
        self.plugs.fetch_and(!plug.bit(), Ordering::AcqRel);
    }

    pub fn dirty_plugs(&self) -> Vec<Plug> {
        let bits = self.plugs.load(Ordering::Acquire);
        Plug::ALL.into_iter().filter(|p| bits & p.bit() != 0).collect()
    }

    /// Called from notice delivery. The prim is re-resolved against the new
    /// contents (no recompose); output and bounds go stale.
    pub fn mark_contents_changed(&self) {
        self.contents_changed.store(true, Ordering::Release);
        self.mark_with_dependents(Plug::InStageDataCached);
    }

    /// Consume the contents-changed latch.
    pub fn take_contents_changed(&self) -> bool {
        self.contents_changed.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downstream_of_inputs() {
        assert_eq!(
            Plug::FilePath.downstream(),
            vec![Plug::InStageData, Plug::InStageDataCached, Plug::OutStageData, Plug::BoundingBox]
        );
        assert_eq!(
            Plug::Time.downstream(),
            vec![Plug::InStageDataCached, Plug::OutStageData, Plug::BoundingBox]
        );
        assert_eq!(Plug::Complexity.downstream(), vec![Plug::OutStageData, Plug::BoundingBox]);
    }

    #[test]
    fn test_time_never_reaches_stage_input() {
        assert!(!Plug::Time.downstream().contains(&Plug::InStageData));
        assert!(!Plug::PrimPath.downstream().contains(&Plug::InStageData));
    }

    #[test]
    fn test_attr_mapping() {
        assert_eq!(Plug::from_attr(A_TIME), Some(Plug::Time));
        assert_eq!(Plug::from_attr("name"), None);
        assert_eq!(Plug::from_name("outStageData"), Some(Plug::OutStageData));
    }

    #[test]
    fn test_dirty_state() {
        let d = DirtyState::new();
        assert!(d.is_dirty(Plug::InStageData));
        for p in Plug::CHAIN {
            d.clean(p);
        }
        d.clean(Plug::BoundingBox);
        assert!(!d.any_dirty());

        let affected = d.mark_with_dependents(Plug::PrimPath);
        assert_eq!(affected, vec![Plug::InStageDataCached, Plug::OutStageData, Plug::BoundingBox]);
        assert!(!d.is_dirty(Plug::InStageData));

        d.mark_contents_changed();
        assert!(d.take_contents_changed());
        assert!(!d.take_contents_changed());
    }

    #[test]
    fn test_contents_changed_reresolves_prim() {
        let d = DirtyState::new();
        for p in Plug::CHAIN {
            d.clean(p);
        }
        d.clean(Plug::BoundingBox);

        d.mark_contents_changed();
        assert!(!d.is_dirty(Plug::InStageData));
        assert_eq!(d.dirty_plugs(), vec![Plug::InStageDataCached, Plug::OutStageData, Plug::BoundingBox]);
    }
}
