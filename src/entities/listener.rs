//! Per-node stage notice listener.
//!
//! Observes `StageContentsChanged` on exactly one stage at a time and
//! forwards each delivery to the owner's change callback. Re-pointing to
//! another stage swaps the subscription under one bus lock, so there is no
//! window with two live subscriptions and none where a notice for the new
//! stage could be missed once `observe()` returned.
//!
//! The change callback runs inside notice delivery: it must only flip
//! atomics or queue messages (see `NoticeBus`).

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error, trace};

use crate::core::notice_bus::{Notice, NoticeBus, NoticeCallback, NoticeKind, StageId, SubscribeRequest, SubscriptionToken};
use crate::error::ProxyError;
use crate::usd::Stage;

/// Owner-supplied reaction to a stage change.
pub type ChangeCallback = Arc<dyn Fn(&Notice) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Unsubscribed,
    Subscribed { stage: StageId, token: SubscriptionToken },
}

struct Active {
    bus: NoticeBus,
    stage: StageId,
    token: SubscriptionToken,
    retired: Arc<AtomicBool>,
}

pub struct StageNoticeListener {
    slot: Mutex<Option<Active>>,
    on_change: ChangeCallback,
    stale: Arc<AtomicU64>,
}

impl fmt::Debug for StageNoticeListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageNoticeListener")
            .field("state", &self.state())
            .field("stale_deliveries", &self.stale_deliveries())
            .finish()
    }
}

impl StageNoticeListener {
    pub fn new(on_change: ChangeCallback) -> Self {
        Self {
            slot: Mutex::new(None),
            on_change,
            stale: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> ListenerState {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(a) => ListenerState::Subscribed {
                stage: a.stage,
                token: a.token,
            },
            None => ListenerState::Unsubscribed,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        matches!(self.state(), ListenerState::Subscribed { .. })
    }

    /// Observed stage, if any.
    pub fn stage(&self) -> Option<StageId> {
        match self.state() {
            ListenerState::Subscribed { stage, .. } => Some(stage),
            ListenerState::Unsubscribed => None,
        }
    }

    /// Notices that arrived through a subscription after it was retired.
    pub fn stale_deliveries(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }

    /// Point the listener at `stage` (or nowhere). No-op if already there.
    pub fn observe(&self, stage: Option<&Arc<Stage>>) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().map(|a| a.stage) == stage.map(|s| s.id()) {
            return;
        }
        let old = slot.take();

        let next = stage.map(|stage| {
            let retired = Arc::new(AtomicBool::new(false));
            let request = SubscribeRequest {
                stage: stage.id(),
                kind: NoticeKind::StageContentsChanged,
                callback: self.make_callback(Arc::clone(&retired)),
            };
            (stage.bus().clone(), stage.id(), retired, request)
        });

        match (old, next) {
            (None, None) => {}
            (Some(old), None) => {
                old.bus.unsubscribe(old.token);
                old.retired.store(true, Ordering::Release);
                debug!("Listener unsubscribed {} from stage {}", old.token, old.stage);
            }
            (old, Some((bus, stage, retired, request))) => {
                let same_bus = old.as_ref().is_some_and(|o| o.bus.same_bus(&bus));
                let token = if same_bus {
                    bus.replace(old.as_ref().map(|o| o.token), Some(request))
                } else {
                    if let Some(o) = old.as_ref() {
                        o.bus.unsubscribe(o.token);
                    }
                    Some(bus.subscribe(request.stage, request.kind, request.callback))
                };
                if let Some(o) = old {
                    o.retired.store(true, Ordering::Release);
                    debug!("Listener retired {} (stage {})", o.token, o.stage);
                }
                if let Some(token) = token {
                    debug!("Listener subscribed {} to stage {}", token, stage);
                    *slot = Some(Active {
                        bus,
                        stage,
                        token,
                        retired,
                    });
                }
            }
        }
    }

    /// Drop the subscription. Safe to call repeatedly.
    pub fn teardown(&self) {
        self.observe(None);
    }

    fn make_callback(&self, retired: Arc<AtomicBool>) -> NoticeCallback {
        let on_change = Arc::clone(&self.on_change);
        let stale = Arc::clone(&self.stale);
        Arc::new(move |notice: &Notice, token: SubscriptionToken| {
            if retired.load(Ordering::Acquire) {
                stale.fetch_add(1, Ordering::Relaxed);
                let err = ProxyError::StaleSubscription { token };
                error!("{}", err);
                debug_assert!(false, "{}", err);
                return;
            }
            trace!("Listener {} got {:?}", token, notice.kind());
            on_change(notice);
        })
    }
}

impl Drop for StageNoticeListener {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usd::layer::LayerData;

    fn stage(bus: &NoticeBus, name: &str) -> Arc<Stage> {
        Arc::new(Stage::open(name, LayerData::default(), None, vec![], bus.clone()).unwrap())
    }

    fn counting() -> (Arc<AtomicU64>, StageNoticeListener) {
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        let listener = StageNoticeListener::new(Arc::new(move |_: &Notice| {
            h.fetch_add(1, Ordering::Relaxed);
        }));
        (hits, listener)
    }

    #[test]
    fn test_observe_and_deliver() {
        let bus = NoticeBus::new();
        let s = stage(&bus, "a");
        let (hits, listener) = counting();
        assert_eq!(listener.state(), ListenerState::Unsubscribed);

        listener.observe(Some(&s));
        assert_eq!(listener.stage(), Some(s.id()));
        s.notify_changed();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_repoint_keeps_single_subscription() {
        let bus = NoticeBus::new();
        let a = stage(&bus, "a");
        let b = stage(&bus, "b");
        let (hits, listener) = counting();

        listener.observe(Some(&a));
        listener.observe(Some(&b));
        assert_eq!(bus.len(), 1);
        assert_eq!(bus.count_for(a.id()), 0);

        a.notify_changed();
        assert_eq!(hits.load(Ordering::Relaxed), 0);
        b.notify_changed();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert_eq!(listener.stale_deliveries(), 0);
    }

    #[test]
    fn test_same_stage_is_noop() {
        let bus = NoticeBus::new();
        let a = stage(&bus, "a");
        let (_, listener) = counting();
        listener.observe(Some(&a));
        let before = listener.state();
        listener.observe(Some(&a));
        assert_eq!(listener.state(), before);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = NoticeBus::new();
        let a = stage(&bus, "a");
        let (hits, listener) = counting();
        listener.observe(Some(&a));
        drop(listener);
        assert!(bus.is_empty());
        a.notify_changed();
        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_cross_bus_repoint() {
        let bus1 = NoticeBus::new();
        let bus2 = NoticeBus::new();
        let a = stage(&bus1, "a");
        let b = stage(&bus2, "b");
        let (_, listener) = counting();
        listener.observe(Some(&a));
        listener.observe(Some(&b));
        assert!(bus1.is_empty());
        assert_eq!(bus2.len(), 1);
    }
}
