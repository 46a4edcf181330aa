//! Stage change notification bus.
//!
//! Stages send notices here after an edit; observers subscribe per
//! (stage, notice kind) and get back a token to unsubscribe with.
//!
//! Delivery holds the subscription table's read lock, so a notice is never
//! delivered to a subscription after `unsubscribe()`/`replace()` returned.
//! The flip side: callbacks must not subscribe or unsubscribe from inside
//! delivery (that would deadlock). Post a message and react later instead.
//!
//! Callback order: FIFO (first-subscribed, first-called) per stage.

use indexmap::IndexMap;
use log::trace;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::usd::path::PrimPath;

/// Process-unique stage identity.
pub type StageId = u64;

/// Kind of notice, used to filter subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    /// Anything in the composed stage changed.
    StageContentsChanged,
    /// Specific prims changed (sent alongside `StageContentsChanged`).
    ObjectsChanged,
}

/// Notice payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    StageContentsChanged { stage: StageId },
    ObjectsChanged { stage: StageId, paths: Vec<PrimPath> },
}

impl Notice {
    pub fn kind(&self) -> NoticeKind {
        match self {
            Notice::StageContentsChanged { .. } => NoticeKind::StageContentsChanged,
            Notice::ObjectsChanged { .. } => NoticeKind::ObjectsChanged,
        }
    }

    pub fn stage(&self) -> StageId {
        match self {
            Notice::StageContentsChanged { stage } => *stage,
            Notice::ObjectsChanged { stage, .. } => *stage,
        }
    }
}

/// Registration handle returned by `subscribe()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

impl SubscriptionToken {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Notice callback. Receives the token it was registered under.
pub type NoticeCallback = Arc<dyn Fn(&Notice, SubscriptionToken) + Send + Sync>;

struct Subscription {
    stage: StageId,
    kind: NoticeKind,
    callback: NoticeCallback,
}

/// What to register in `replace()`.
pub struct SubscribeRequest {
    pub stage: StageId,
    pub kind: NoticeKind,
    pub callback: NoticeCallback,
}

static GLOBAL_BUS: Lazy<NoticeBus> = Lazy::new(NoticeBus::new);

/// Notification bus. Cheap to clone; clones share subscriptions.
#[derive(Clone)]
pub struct NoticeBus {
    subs: Arc<RwLock<IndexMap<SubscriptionToken, Subscription>>>,
    next_token: Arc<AtomicU64>,
    delivered: Arc<AtomicU64>,
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NoticeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoticeBus")
            .field("subscriptions", &self.len())
            .field("delivered", &self.delivered())
            .finish()
    }
}

impl NoticeBus {
    pub fn new() -> Self {
        Self {
            subs: Arc::new(RwLock::new(IndexMap::new())),
            next_token: Arc::new(AtomicU64::new(1)),
            delivered: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Process-wide bus used when nothing else is injected.
    pub fn global() -> NoticeBus {
        GLOBAL_BUS.clone()
    }

    /// Both handles share one subscription table.
    pub fn same_bus(&self, other: &NoticeBus) -> bool {
        Arc::ptr_eq(&self.subs, &other.subs)
    }

    fn alloc_token(&self) -> SubscriptionToken {
        SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    pub fn subscribe(&self, stage: StageId, kind: NoticeKind, callback: NoticeCallback) -> SubscriptionToken {
        self.replace(None, Some(SubscribeRequest { stage, kind, callback }))
            .unwrap_or(SubscriptionToken(0))
    }

    /// Remove a subscription. Returns false if the token was not live.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let removed = self
            .subs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .shift_remove(&token)
            .is_some();
        trace!("NoticeBus unsubscribe {} (live: {})", token, removed);
        removed
    }

    /// Swap one subscription for another under a single write lock.
    ///
    /// No delivery can observe both the old and the new registration, or
    /// neither of them.
    pub fn replace(&self, old: Option<SubscriptionToken>, new: Option<SubscribeRequest>) -> Option<SubscriptionToken> {
        let mut subs = self.subs.write().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = old {
            subs.shift_remove(&old);
        }
        new.map(|req| {
            let token = self.alloc_token();
            subs.insert(
                token,
                Subscription {
                    stage: req.stage,
                    kind: req.kind,
                    callback: req.callback,
                },
            );
            trace!("NoticeBus subscribe {} -> stage {} {:?}", token, req.stage, req.kind);
            token
        })
    }

    /// Deliver a notice to every matching subscription. Returns the number
    /// of callbacks invoked.
    pub fn send(&self, notice: &Notice) -> usize {
        let subs = self.subs.read().unwrap_or_else(|e| e.into_inner());
        let mut count = 0;
        for (token, sub) in subs.iter() {
            if sub.stage == notice.stage() && sub.kind == notice.kind() {
                (sub.callback)(notice, *token);
                count += 1;
            }
        }
        self.delivered.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    pub fn is_subscribed(&self, token: SubscriptionToken) -> bool {
        self.subs.read().unwrap_or_else(|e| e.into_inner()).contains_key(&token)
    }

    /// Number of live subscriptions for a stage.
    pub fn count_for(&self, stage: StageId) -> usize {
        self.subs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|s| s.stage == stage)
            .count()
    }

    pub fn len(&self) -> usize {
        self.subs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total callbacks invoked since creation.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}
