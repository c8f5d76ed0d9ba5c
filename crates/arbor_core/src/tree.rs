//! Node tree
//!
//! Every node lives in a single arena owned by [`NodeTree`] and is addressed by
//! a [`NodeId`]. A node owns its value, an ordered list of subscribers and an
//! ordered list of children, and has at most one parent.
//!
//! Changes bubble: when a node commits a change, its subscribers run, then the
//! subscribers of its parent, grandparent and so on up to the root. Each
//! ancestor is notified exactly once per committed change.
//!
//! Subscribers receive `&mut NodeTree`, so they may read or mutate any node
//! (including the one that is currently notifying). Subscriber lists are
//! snapshotted before iteration; re-entrant mutations run to completion before
//! the outer cascade resumes.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashSet;
use serde_json::Value;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use tracing::trace;

use crate::container::{ArrayData, MapData};
use crate::error::{NodeError, Result};
use crate::machine::MachineData;
use crate::state::StateData;
use crate::value::Primitive;

new_key_type! {
    /// Unique identifier for a node in a [`NodeTree`]
    pub struct NodeId;
}

/// A change callback, invoked with the tree and the id of the subscribed node
pub type Subscriber = Rc<dyn Fn(&mut NodeTree, NodeId)>;

/// Token returned by [`NodeTree::subscribe`], used to cancel the subscription
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    node: NodeId,
    key: u64,
}

impl Subscription {
    /// The node this subscription observes
    pub fn node(&self) -> NodeId {
        self.node
    }
}

/// The kind of value a node holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Number,
    Text,
    Boolean,
    Natural,
    Json,
    Array,
    Map,
    State,
    Machine,
}

pub(crate) enum NodeData {
    Leaf(Primitive),
    Json(Value),
    Array(ArrayData),
    Map(MapData),
    State(Box<StateData>),
    Machine(MachineData),
}

impl NodeData {
    fn is_natural(&self) -> bool {
        matches!(self, NodeData::Leaf(Primitive::Natural(_)))
    }
}

struct NodeEntry {
    data: NodeData,
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 4]>,
    subscribers: SmallVec<[(u64, Subscriber); 2]>,
    /// Pinned nodes never change owner (count nodes, nested states, machine roots)
    pinned: bool,
}

/// Former owners of nodes that were moved elsewhere, with whether their
/// element count changed
#[derive(Default)]
pub(crate) struct Detached(SmallVec<[(NodeId, bool); 2]>);

impl Detached {
    pub(crate) fn note(&mut self, owner: NodeId, count_changed: bool) {
        match self.0.iter_mut().find(|(id, _)| *id == owner) {
            Some((_, changed)) => *changed |= count_changed,
            None => self.0.push((owner, count_changed)),
        }
    }

    /// Bubble one change from `origin`, then from every former owner.
    /// Ancestors shared by several chains are notified once.
    pub(crate) fn settle(self, tree: &mut NodeTree, origin: NodeId) {
        let mut visited = FxHashSet::default();
        tree.bubble_unvisited(origin, &mut visited);
        for (owner, count_changed) in self.0 {
            let origin = tree.change_origin(owner, count_changed);
            tree.bubble_unvisited(origin, &mut visited);
        }
    }
}

/// Arena that owns every node
pub struct NodeTree {
    nodes: SlotMap<NodeId, NodeEntry>,
    next_subscription: u64,
}

impl NodeTree {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            next_subscription: 0,
        }
    }

    /// Get the number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the tree holds no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check if a node is still alive
    pub fn contains(&self, id: impl Into<NodeId>) -> bool {
        self.nodes.contains_key(id.into())
    }

    pub fn kind(&self, id: impl Into<NodeId>) -> Option<NodeKind> {
        let kind = match &self.nodes.get(id.into())?.data {
            NodeData::Leaf(primitive) => primitive.kind(),
            NodeData::Json(_) => NodeKind::Json,
            NodeData::Array(_) => NodeKind::Array,
            NodeData::Map(_) => NodeKind::Map,
            NodeData::State(_) => NodeKind::State,
            NodeData::Machine(_) => NodeKind::Machine,
        };
        Some(kind)
    }

    /// Get the parent of a node
    pub fn parent(&self, id: impl Into<NodeId>) -> Option<NodeId> {
        self.nodes.get(id.into())?.parent
    }

    /// Get the children of a node, in insertion order
    pub fn children(&self, id: impl Into<NodeId>) -> &[NodeId] {
        self.nodes
            .get(id.into())
            .map(|entry| entry.children.as_slice())
            .unwrap_or(&[])
    }

    /// Check if a node is pinned to its owner
    pub fn is_pinned(&self, id: impl Into<NodeId>) -> bool {
        self.nodes.get(id.into()).is_some_and(|entry| entry.pinned)
    }

    /// Register a subscriber and invoke it once with the current state
    pub fn subscribe<F>(&mut self, id: impl Into<NodeId>, subscriber: F) -> Result<Subscription>
    where
        F: Fn(&mut NodeTree, NodeId) + 'static,
    {
        let id = id.into();
        let entry = self.nodes.get_mut(id).ok_or(NodeError::UnknownNode)?;
        let key = self.next_subscription;
        self.next_subscription += 1;

        let subscriber: Subscriber = Rc::new(subscriber);
        entry.subscribers.push((key, Rc::clone(&subscriber)));
        subscriber(self, id);

        Ok(Subscription { node: id, key })
    }

    /// Cancel a subscription. Returns `false` if it was already cancelled or
    /// the node no longer exists.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let Some(entry) = self.nodes.get_mut(subscription.node) else {
            return false;
        };
        let before = entry.subscribers.len();
        entry.subscribers.retain(|(key, _)| *key != subscription.key);
        entry.subscribers.len() != before
    }

    /// Append children to a node
    ///
    /// Children owned by another node are detached from it first. The call is
    /// validated up front, so an error leaves the tree untouched. Appending to
    /// a natural number is a no-op. On a container this attaches children
    /// outside its indexed elements; use `push` or `insert` to add elements.
    pub fn append(&mut self, parent: impl Into<NodeId>, children: &[NodeId]) -> Result<()> {
        let parent = parent.into();
        let entry = self.nodes.get(parent).ok_or(NodeError::UnknownNode)?;
        if entry.data.is_natural() || children.is_empty() {
            return Ok(());
        }

        let children = unique(children);
        for &child in &children {
            if self.parent(child) != Some(parent) {
                self.check_insertable(parent, child)?;
            }
        }

        let mut detached = Detached::default();
        for &child in &children {
            if self.parent(child) == Some(parent) {
                continue;
            }
            if let Some((owner, count_changed)) = self.unlink(child) {
                detached.note(owner, count_changed);
            }
            self.link(parent, child);
        }
        trace!("append: {:?} <- {} node(s)", parent, children.len());

        // Children see the settled membership before anything bubbles
        for &child in &children {
            self.notify(child);
        }
        detached.settle(self, parent);
        Ok(())
    }

    /// Remove children from a node
    ///
    /// Nodes that are not children of `parent`, and pinned children, are
    /// ignored. Returns the number of removed children.
    pub fn remove(&mut self, parent: impl Into<NodeId>, children: &[NodeId]) -> usize {
        let parent = parent.into();
        match self.nodes.get(parent) {
            Some(entry) if !entry.data.is_natural() => {}
            _ => return 0,
        }

        let mut removed: SmallVec<[NodeId; 4]> = SmallVec::new();
        let mut count_changed = false;
        for child in unique(children) {
            let owned = self
                .nodes
                .get(child)
                .is_some_and(|entry| entry.parent == Some(parent) && !entry.pinned);
            if !owned {
                continue;
            }
            if let Some((_, changed)) = self.unlink(child) {
                count_changed |= changed;
                removed.push(child);
            }
        }

        if removed.is_empty() {
            return 0;
        }
        trace!("remove: {:?} -> {} node(s)", parent, removed.len());

        for &child in &removed {
            self.notify(child);
        }
        let origin = self.change_origin(parent, count_changed);
        self.bubble(origin);
        removed.len()
    }

    /// Detach a node from its parent and free it together with its subtree
    ///
    /// Pinned nodes are freed only with their owner; destroying one directly
    /// returns `false`.
    pub fn destroy(&mut self, id: impl Into<NodeId>) -> bool {
        let id = id.into();
        let Some(entry) = self.nodes.get(id) else {
            return false;
        };
        if entry.pinned {
            return false;
        }
        if let Some(parent) = entry.parent {
            self.remove(parent, &[id]);
        }
        self.free(id);
        true
    }

    /// Serializable snapshot of a node
    pub fn to_json(&self, id: impl Into<NodeId>) -> Option<Value> {
        let json = match &self.nodes.get(id.into())?.data {
            NodeData::Leaf(primitive) => primitive.to_json(),
            NodeData::Json(value) => value.clone(),
            NodeData::Array(data) => self.array_json(data),
            NodeData::Map(data) => self.map_json(data),
            NodeData::State(data) => self.state_json(data),
            NodeData::Machine(data) => self.machine_json(data),
        };
        Some(json)
    }

    // =========================================================================
    // Crate internals
    // =========================================================================

    pub(crate) fn insert(&mut self, data: NodeData) -> NodeId {
        self.nodes.insert(NodeEntry {
            data,
            parent: None,
            children: SmallVec::new(),
            subscribers: SmallVec::new(),
            pinned: false,
        })
    }

    pub(crate) fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id).map(|entry| &entry.data)
    }

    pub(crate) fn data_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id).map(|entry| &mut entry.data)
    }

    pub(crate) fn pin(&mut self, id: NodeId) {
        if let Some(entry) = self.nodes.get_mut(id) {
            entry.pinned = true;
        }
    }

    /// Validate that `child` may be moved beneath `parent`
    pub(crate) fn check_insertable(&self, parent: NodeId, child: NodeId) -> Result<()> {
        let entry = self.nodes.get(child).ok_or(NodeError::UnknownNode)?;
        if entry.pinned {
            return Err(NodeError::Pinned);
        }
        let mut current = Some(parent);
        while let Some(node) = current {
            if node == child {
                return Err(NodeError::Cycle);
            }
            current = self.parent(node);
        }
        Ok(())
    }

    /// Attach `child` to `parent` without notifying anyone
    pub(crate) fn link(&mut self, parent: NodeId, child: NodeId) {
        if let Some(entry) = self.nodes.get_mut(child) {
            entry.parent = Some(parent);
        }
        if let Some(entry) = self.nodes.get_mut(parent) {
            if !entry.children.contains(&child) {
                entry.children.push(child);
            }
        }
    }

    /// Clear the parent link of `child` without touching container storage
    pub(crate) fn release(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get_mut(child)?.parent.take()?;
        if let Some(entry) = self.nodes.get_mut(parent) {
            entry.children.retain(|id| *id != child);
        }
        Some(parent)
    }

    /// Detach `child` from its parent, dropping it from the parent's container
    /// storage. Returns the former parent and whether its count changed.
    pub(crate) fn unlink(&mut self, child: NodeId) -> Option<(NodeId, bool)> {
        let parent = self.release(child)?;
        let count_changed = self.forget_element(parent, child);
        Some((parent, count_changed))
    }

    /// Invoke the subscribers of a single node
    pub(crate) fn notify(&mut self, id: NodeId) {
        let Some(entry) = self.nodes.get(id) else {
            return;
        };
        let subscribers: SmallVec<[Subscriber; 4]> = entry
            .subscribers
            .iter()
            .map(|(_, subscriber)| Rc::clone(subscriber))
            .collect();
        for subscriber in subscribers {
            subscriber(self, id);
        }
    }

    /// Notify a node and then every ancestor, once each
    pub(crate) fn bubble(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(node) = current {
            self.notify(node);
            current = self.parent(node);
        }
    }

    /// Like [`bubble`](Self::bubble), skipping nodes already in `visited`
    pub(crate) fn bubble_unvisited(&mut self, id: NodeId, visited: &mut FxHashSet<NodeId>) {
        let mut current = Some(id);
        while let Some(node) = current {
            if visited.insert(node) {
                self.notify(node);
            }
            current = self.parent(node);
        }
    }

    /// Free a node and its subtree without notifying anyone
    pub(crate) fn free(&mut self, id: NodeId) {
        if let Some(entry) = self.nodes.remove(id) {
            if let Some(parent) = entry.parent {
                if let Some(owner) = self.nodes.get_mut(parent) {
                    owner.children.retain(|child| *child != id);
                }
            }
            for child in entry.children {
                self.free(child);
            }
        }
    }
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTree")
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

pub(crate) fn unique(ids: &[NodeId]) -> SmallVec<[NodeId; 8]> {
    let mut seen = FxHashSet::default();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
