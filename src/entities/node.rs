//! Node trait - capability interface the dependency graph drives.
//!
//! A shape node answers:
//! - `compute(plug)`: bring a computed plug up to date (pull-based)
//! - `set_dependents_dirty(plug)`: propagate an input change
//! - `bounding_box()`, `selection_mask()`, `closest_point()`: drawing queries
//!
//! Compute never returns an error: failures become the node's status and
//! the host keeps evaluating.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::usd::{BBox3, Ray};

use super::plug::Plug;
use super::traits::SurfaceHit;

/// Outcome of `compute()` for one plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeStatus {
    /// Already up to date, nothing ran.
    Clean,
    /// Recomputed.
    Computed,
    /// Ran and failed; the node status carries the error.
    Failed,
    /// Not a plug this node computes.
    Unknown,
}

impl ComputeStatus {
    /// Fold statuses along a pull chain: a failure anywhere wins.
    pub fn merge(self, other: ComputeStatus) -> ComputeStatus {
        use ComputeStatus::*;
        match (self, other) {
            (Failed, _) | (_, Failed) => Failed,
            (Unknown, x) | (x, Unknown) => x,
            (Computed, _) | (_, Computed) => Computed,
            _ => Clean,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ComputeStatus::Clean | ComputeStatus::Computed)
    }
}

/// Component types the host may select on this shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct SelectionMask(u32);

impl SelectionMask {
    pub const NONE: SelectionMask = SelectionMask(0);
    pub const MESHES: SelectionMask = SelectionMask(1 << 0);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: SelectionMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl fmt::Display for SelectionMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("none")
        } else if self.contains(SelectionMask::MESHES) {
            f.write_str("meshes")
        } else {
            write!(f, "{:#x}", self.0)
        }
    }
}

pub trait ShapeNode: Send + Sync {
    fn uuid(&self) -> Uuid;

    fn name(&self) -> String;

    /// Registered type name
    fn node_type(&self) -> &str;

    fn compute(&self, plug: Plug) -> ComputeStatus;

    /// Mark everything downstream of `plug` dirty. Returns the affected
    /// computed plugs.
    fn set_dependents_dirty(&self, plug: Plug) -> Vec<Plug>;

    /// Whether `bounding_box()` is meaningful.
    fn is_bounded(&self) -> bool;

    fn bounding_box(&self) -> BBox3;

    fn selection_mask(&self) -> SelectionMask;

    fn closest_point(&self, ray: &Ray) -> Option<SurfaceHit>;

    /// Any computed plug awaiting recompute.
    fn is_dirty(&self) -> bool;
}
