//! Events proxy shapes put on the host's invalidation queue.

use uuid::Uuid;

use crate::core::notice_bus::StageId;

use super::proxy_shape::StageStatus;

/// Why a shape asks to be redrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyReason {
    /// The observed stage's contents changed.
    StageContentsChanged,
    /// An input attribute changed.
    AttributeChanged,
    /// The node dropped its stage (scene reset, node removal).
    StageReleased,
}

/// Shape needs redraw. Posted from notice delivery, so it only runs when
/// the host polls.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeDirtyEvent {
    pub node: Uuid,
    pub reason: DirtyReason,
}

/// Node switched to another stage object (or lost its stage).
#[derive(Debug, Clone, PartialEq)]
pub struct StageReplacedEvent {
    pub node: Uuid,
    pub old: Option<StageId>,
    pub new: Option<StageId>,
}

/// Stage status changed (e.g. became invalid).
#[derive(Debug, Clone, PartialEq)]
pub struct StageStatusEvent {
    pub node: Uuid,
    pub status: StageStatus,
}

/// Cached bounds were dropped wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundsCacheClearedEvent {
    pub node: Uuid,
    pub entries: usize,
}
