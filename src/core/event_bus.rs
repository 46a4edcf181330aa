//! Host invalidation queue: pub/sub event bus with deferred processing.
//!
//! Two ways in:
//! - `emit()`: invoke subscribers immediately AND queue for `poll()`
//! - `post()`: queue only, nothing runs until the host polls
//!
//! Stage notice callbacks use `post()`: they may run in whatever context
//! the stage was edited from, so they must not run host code inline.
//!
//! Callback order: FIFO within one event type. Cross-type order undefined.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use log::warn;

/// Maximum events in queue before oldest are evicted
const MAX_QUEUE_SIZE: usize = 1000;

/// Marker trait for events. Events must be Send + Sync + 'static.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;
type Subscribers = Arc<RwLock<HashMap<TypeId, Vec<Callback>>>>;
type Queue = Arc<Mutex<Vec<BoxedEvent>>>;

/// Boxed event for queue storage
pub type BoxedEvent = Box<dyn Event>;

fn invoke(subscribers: &Subscribers, type_id: TypeId, event: &dyn Any) {
    if let Some(cbs) = subscribers.read().unwrap_or_else(|e| e.into_inner()).get(&type_id) {
        for cb in cbs {
            cb(event);
        }
    }
}

fn enqueue(queue: &Queue, event: BoxedEvent) {
    let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
    if queue.len() >= MAX_QUEUE_SIZE {
        let evict_count = queue.len() / 2;
        warn!("EventBus queue full ({} events), evicting oldest {}", queue.len(), evict_count);
        queue.drain(0..evict_count);
    }
    queue.push(event);
}

/// Pub/Sub event bus owned by the host graph.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Subscribers,
    queue: Queue,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            queue: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribe to events of type E. Invoked synchronously by `emit()`.
    pub fn subscribe<E, F>(&self, callback: F)
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    /// Invoke subscribers now, then queue for `poll()`.
    pub fn emit<E: Event>(&self, event: E) {
        invoke(&self.subscribers, TypeId::of::<E>(), &event);
        enqueue(&self.queue, Box::new(event));
    }

    /// Queue for `poll()` without invoking anyone.
    pub fn post<E: Event>(&self, event: E) {
        enqueue(&self.queue, Box::new(event));
    }

    /// Take all queued events.
    pub fn poll(&self) -> Vec<BoxedEvent> {
        std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Emitter handle for nodes.
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            queue: Arc::clone(&self.queue),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Lightweight emitter handle for nodes: queue only. Clones share the bus.
#[derive(Clone)]
pub struct EventEmitter {
    queue: Queue,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("queue_len", &self.queue.lock().map(|q| q.len()).unwrap_or(0))
            .finish()
    }
}

impl EventEmitter {
    pub fn post<E: Event>(&self, event: E) {
        enqueue(&self.queue, Box::new(event));
    }
}

/// Node-side emitter: no-op until the node is registered with a graph.
#[derive(Clone, Default, Debug)]
pub struct ShapeEventEmitter {
    inner: Option<EventEmitter>,
}

impl ShapeEventEmitter {
    pub fn dummy() -> Self {
        Self { inner: None }
    }

    pub fn from_emitter(emitter: EventEmitter) -> Self {
        Self { inner: Some(emitter) }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_some()
    }

    pub fn post<E: Event>(&self, event: E) {
        if let Some(ref emitter) = self.inner {
            emitter.post(event);
        }
    }
}

/// Downcast a queued event.
///
/// Derefs to `dyn Event` first: calling `as_any()` on the Box itself would
/// hit the blanket impl for `Box<dyn Event>` and never match.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}
