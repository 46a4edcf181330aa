//! Value carried on the proxy's stage data plugs.
//!
//! Copying a `StageData` shares the stage (the handle keeps it alive in the
//! arena) and copies the resolved prim path and draw flags.

use std::fmt;

use crate::core::stage_cache::StageHandle;
use crate::usd::{Prim, PrimPath, PurposeFilter, TimeCode};

/// Output-only draw settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawFlags {
    pub complexity: i32,
    pub purposes: PurposeFilter,
}

#[derive(Clone)]
pub struct StageData {
    handle: StageHandle,
    /// Path the prim resolved to (pseudo-root on fallback).
    prim_path: PrimPath,
    /// Prim path attribute as the user typed it.
    requested: String,
    /// `requested` named no prim and the pseudo-root stands in for it.
    fallback: bool,
    time: TimeCode,
    flags: DrawFlags,
}

impl StageData {
    pub fn new(handle: StageHandle, prim_path: PrimPath, requested: impl Into<String>, fallback: bool, time: TimeCode) -> Self {
        Self {
            handle,
            prim_path,
            requested: requested.into(),
            fallback,
            time,
            flags: DrawFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: DrawFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn handle(&self) -> &StageHandle {
        &self.handle
    }

    pub fn prim_path(&self) -> &PrimPath {
        &self.prim_path
    }

    pub fn requested(&self) -> &str {
        &self.requested
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn time(&self) -> TimeCode {
        self.time
    }

    pub fn flags(&self) -> DrawFlags {
        self.flags
    }

    /// Prim handle. Invalid if the prim vanished from the stage since the
    /// path was resolved.
    pub fn prim(&self) -> Prim {
        let stage = self.handle.stage();
        if self.prim_path.is_root() {
            return stage.pseudo_root();
        }
        stage.prim_at(&self.prim_path).unwrap_or_default()
    }

    /// Same stage, same resolved prim, same time.
    pub fn same_source(&self, other: &StageData) -> bool {
        self.handle.same_stage(&other.handle) && self.prim_path == other.prim_path && self.time == other.time
    }
}

impl fmt::Debug for StageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageData")
            .field("stage", &self.handle.stage().id())
            .field("prim_path", &self.prim_path)
            .field("requested", &self.requested)
            .field("fallback", &self.fallback)
            .field("time", &self.time)
            .field("flags", &self.flags)
            .finish()
    }
}
