//! Dependency graph host: node registry, attribute edits, invalidation
//! queue processing and scene reset.
//!
//! Node types are registered with the strategies their instances get
//! (see [`ProxyHooks`]). Stage notices never call into the graph directly:
//! shapes post [`ShapeDirtyEvent`]s, and `process_events()` turns them into
//! redraw requests on the host's schedule.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use indexmap::{IndexMap, IndexSet};
use log::{debug, info, trace};
use uuid::Uuid;

use crate::entities::attrs::AttrValue;
use crate::entities::node::{ComputeStatus, ShapeNode};
use crate::entities::plug::Plug;
use crate::entities::proxy_shape::{PROXY_NODE_TYPE, ProxyShape};
use crate::entities::shape_events::{ShapeDirtyEvent, StageReplacedEvent, StageStatusEvent};
use crate::entities::traits::{ProxyHooks, StageEnv};

use super::event_bus::{EventBus, ShapeEventEmitter, downcast_event};

/// Broadcast when the host scene is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneResetEvent {
    pub nodes: usize,
}

pub struct DependencyGraph {
    env: StageEnv,
    types: HashMap<String, ProxyHooks>,
    nodes: IndexMap<Uuid, Arc<ProxyShape>>,
    bus: EventBus,
    redraw: IndexSet<Uuid>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new(StageEnv::default())
    }
}

impl DependencyGraph {
    /// Graph with the built-in proxy type registered with default hooks.
    pub fn new(env: StageEnv) -> Self {
        let mut graph = Self {
            env,
            types: HashMap::new(),
            nodes: IndexMap::new(),
            bus: EventBus::new(),
            redraw: IndexSet::new(),
        };
        graph.register_type(PROXY_NODE_TYPE, ProxyHooks::default());
        graph
    }

    pub fn env(&self) -> &StageEnv {
        &self.env
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Register (or re-register) a node type with its strategies.
    pub fn register_type(&mut self, type_name: &str, hooks: ProxyHooks) {
        debug!("Registered node type {}", type_name);
        self.types.insert(type_name.to_string(), hooks);
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn create_node(&mut self, type_name: &str, name: &str) -> Result<Uuid> {
        let hooks = self
            .types
            .get(type_name)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown node type: {}", type_name))?;
        let shape = ProxyShape::with_type(type_name, name, self.env.clone(), hooks);
        Ok(self.add_node(shape))
    }

    /// Adopt an already built node (e.g. loaded from JSON).
    pub fn add_node(&mut self, shape: ProxyShape) -> Uuid {
        shape.set_event_emitter(ShapeEventEmitter::from_emitter(self.bus.emitter()));
        let uuid = shape.uuid();
        info!("Added {} '{}' ({})", shape.node_type(), shape.name(), uuid);
        self.nodes.insert(uuid, Arc::new(shape));
        uuid
    }

    /// Remove a node. Its stage is released once the last outside
    /// reference drops.
    pub fn remove_node(&mut self, uuid: Uuid) -> bool {
        match self.nodes.shift_remove(&uuid) {
            Some(shape) => {
                shape.release_stage();
                self.redraw.shift_remove(&uuid);
                true
            }
            None => false,
        }
    }

    /// Shape registered under `uuid`.
    pub fn shape_at(&self, uuid: Uuid) -> Option<Arc<ProxyShape>> {
        self.nodes.get(&uuid).cloned()
    }

    /// First shape with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<ProxyShape>> {
        self.nodes.values().find(|s| s.name() == name).cloned()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<ProxyShape>> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Set an attribute. Returns the computed plugs that went dirty.
    pub fn set_attr(&mut self, uuid: Uuid, key: &str, value: AttrValue) -> Result<Vec<Plug>> {
        let shape = self.nodes.get(&uuid).ok_or_else(|| anyhow!("No node {}", uuid))?;
        if !shape.attrs().schema().is_some_and(|s| s.get(key).is_some()) {
            bail!("{} has no attribute '{}'", shape.node_type(), key);
        }
        let affected = shape.set_attr(key, value);
        if !affected.is_empty() {
            self.redraw.insert(uuid);
        }
        Ok(affected)
    }

    /// Pull a plug on a node.
    pub fn evaluate(&self, uuid: Uuid, plug: Plug) -> Result<ComputeStatus> {
        let shape = self.nodes.get(&uuid).ok_or_else(|| anyhow!("No node {}", uuid))?;
        Ok(shape.compute(plug))
    }

    /// Drain the invalidation queue. Returns nodes that need a redraw, in
    /// the order they were first invalidated.
    ///
    /// Must be called regularly: each shape keeps at most one dirty event
    /// queued and posts no further ones until this acknowledges it.
    pub fn process_events(&mut self) -> Vec<Uuid> {
        for event in self.bus.poll() {
            if let Some(e) = downcast_event::<ShapeDirtyEvent>(&event) {
                trace!("Shape {} dirty: {:?}", e.node, e.reason);
                if let Some(shape) = self.nodes.get(&e.node) {
                    // Ack before the redraw so later changes queue a new event.
                    shape.acknowledge_dirty();
                    self.redraw.insert(e.node);
                }
            } else if let Some(e) = downcast_event::<StageReplacedEvent>(&event) {
                debug!("Shape {} stage {:?} -> {:?}", e.node, e.old, e.new);
            } else if let Some(e) = downcast_event::<StageStatusEvent>(&event) {
                debug!("Shape {} status: {}", e.node, e.status);
            }
        }
        self.redraw.drain(..).collect()
    }

    /// Scene reset: every shape drops its stage, subscription and caches.
    /// Stages come back on the next pull.
    pub fn scene_reset(&mut self) {
        let nodes = self.nodes.len();
        for shape in self.nodes.values() {
            shape.release_stage();
        }
        let purged = self.env.cache.purge();
        info!("Scene reset: {} nodes released, {} stale arena entries purged", nodes, purged);
        self.bus.emit(SceneResetEvent { nodes });
    }

    /// Shapes, as the capability interface.
    pub fn shape_nodes(&self) -> impl Iterator<Item = Arc<dyn ShapeNode>> + '_ {
        self.nodes.values().map(|s| Arc::clone(s) as Arc<dyn ShapeNode>)
    }
}
