//! Container nodes
//!
//! [`Array`] and [`Map`] own their elements as children and keep one pinned
//! [`Natural`] count node in sync with the number of elements. Every public
//! operation reports one change per ancestor: bubbling starts at the count
//! node when the count moved, otherwise at the container itself.
//!
//! Setting an array's `length` directly grows it with vacant slots or
//! truncates it. Lengths above [`MAX_ARRAY_LENGTH`] are reverted. A map's
//! `size` cannot be forced; such writes are reverted too.

use indexmap::IndexMap;
use serde_json::Value;
use smallvec::SmallVec;
use tracing::trace;

use crate::error::{NodeError, Result};
use crate::tree::{unique, Detached, NodeData, NodeId, NodeTree};
use crate::value::{Natural, Primitive};

/// Largest length an array accepts, `2^32 - 1`
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

pub(crate) struct ArrayData {
    items: Vec<Option<NodeId>>,
    length: NodeId,
}

pub(crate) struct MapData {
    entries: IndexMap<String, NodeId>,
    size: NodeId,
}

/// Handle to an ordered sequence of nodes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Array(NodeId);

impl Array {
    /// Create an array owning `values`, moving them from any previous owner
    pub fn new(tree: &mut NodeTree, values: &[NodeId]) -> Result<Self> {
        let length = tree.insert(NodeData::Leaf(Primitive::Natural(0)));
        let id = tree.insert(NodeData::Array(ArrayData {
            items: Vec::new(),
            length,
        }));
        tree.link(id, length);
        tree.pin(length);

        let array = Array(id);
        if let Err(err) = array.push(tree, values) {
            tree.free(id);
            return Err(err);
        }
        Ok(array)
    }

    pub fn from_id(id: NodeId) -> Self {
        Array(id)
    }

    pub fn id(&self) -> NodeId {
        self.0
    }

    /// Append values to the end. Returns the new length.
    pub fn push(&self, tree: &mut NodeTree, values: &[NodeId]) -> Result<usize> {
        let before = self.data(tree).ok_or(NodeError::UnknownNode)?.items.len();
        let values = unique(values);
        for &value in &values {
            tree.check_insertable(self.0, value)?;
        }
        if values.is_empty() {
            return Ok(before);
        }

        let mut detached = Detached::default();
        for &value in &values {
            // Moving an element within the same array drops its old slot
            if let Some((owner, count_changed)) = tree.unlink(value) {
                if owner != self.0 {
                    detached.note(owner, count_changed);
                }
            }
            tree.link(self.0, value);
            if let Some(NodeData::Array(data)) = tree.data_mut(self.0) {
                data.items.push(Some(value));
            }
        }
        let (length, after) = tree.write_count(self.0).ok_or(NodeError::UnknownNode)?;
        trace!("push: {:?} {} -> {}", self.0, before, after);

        for &value in &values {
            tree.notify(value);
        }
        detached.settle(tree, if after != before { length } else { self.0 });
        Ok(after)
    }

    /// Remove and return the last element
    ///
    /// Returns `None` for an empty array, and also for a vacant trailing slot
    /// (which is still removed).
    pub fn pop(&self, tree: &mut NodeTree) -> Option<NodeId> {
        let last = *self.data(tree)?.items.last()?;
        if let Some(node) = last {
            tree.release(node);
        }
        if let Some(NodeData::Array(data)) = tree.data_mut(self.0) {
            data.items.pop();
        }
        let (length, _) = tree.write_count(self.0)?;

        if let Some(node) = last {
            tree.notify(node);
        }
        tree.bubble(length);
        last
    }

    /// Element at `index`; negative indices count from the end
    pub fn at(&self, tree: &NodeTree, index: isize) -> Option<NodeId> {
        let items = &self.data(tree)?.items;
        let index = if index < 0 {
            items.len().checked_sub(index.unsigned_abs())?
        } else {
            index as usize
        };
        items.get(index).copied().flatten()
    }

    /// Snapshot of the backing sequence; vacant slots are `None`
    pub fn items(&self, tree: &NodeTree) -> Vec<Option<NodeId>> {
        self.data(tree)
            .map(|data| data.items.clone())
            .unwrap_or_default()
    }

    /// The count node mirroring this array's length
    pub fn length(&self, tree: &NodeTree) -> Option<Natural> {
        self.data(tree).map(|data| Natural::from_id(data.length))
    }

    pub fn len(&self, tree: &NodeTree) -> usize {
        self.data(tree).map_or(0, |data| data.items.len())
    }

    pub fn is_empty(&self, tree: &NodeTree) -> bool {
        self.len(tree) == 0
    }

    fn data<'t>(&self, tree: &'t NodeTree) -> Option<&'t ArrayData> {
        match tree.data(self.0)? {
            NodeData::Array(data) => Some(data),
            _ => None,
        }
    }
}

impl From<Array> for NodeId {
    fn from(array: Array) -> Self {
        array.0
    }
}

/// Handle to a string-keyed map of nodes, kept in insertion order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Map(NodeId);

impl Map {
    /// Create a map owning the given entries
    pub fn new<K, I>(tree: &mut NodeTree, entries: I) -> Result<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, NodeId)>,
    {
        let entries: Vec<(String, NodeId)> = entries
            .into_iter()
            .map(|(key, node)| (key.into(), node))
            .collect();

        let size = tree.insert(NodeData::Leaf(Primitive::Natural(0)));
        let id = tree.insert(NodeData::Map(MapData {
            entries: IndexMap::new(),
            size,
        }));
        tree.link(id, size);
        tree.pin(size);

        for (_, node) in &entries {
            if let Err(err) = tree.check_insertable(id, *node) {
                tree.free(id);
                return Err(err);
            }
        }

        let map = Map(id);
        for (key, node) in entries {
            map.insert(tree, key, node)?;
        }
        Ok(map)
    }

    pub fn from_id(id: NodeId) -> Self {
        Map(id)
    }

    pub fn id(&self) -> NodeId {
        self.0
    }

    /// Insert or replace the node stored under `key`
    ///
    /// A replaced node is detached and returned.
    pub fn insert(
        &self,
        tree: &mut NodeTree,
        key: impl Into<String>,
        node: NodeId,
    ) -> Result<Option<NodeId>> {
        let key = key.into();
        let data = self.data(tree).ok_or(NodeError::UnknownNode)?;
        let before = data.entries.len();
        if data.entries.get(&key) == Some(&node) {
            return Ok(None);
        }
        tree.check_insertable(self.0, node)?;

        let mut detached = Detached::default();
        if let Some((owner, count_changed)) = tree.unlink(node) {
            if owner != self.0 {
                detached.note(owner, count_changed);
            }
        }
        let replaced = match tree.data_mut(self.0) {
            Some(NodeData::Map(data)) => data.entries.insert(key, node),
            _ => None,
        };
        if let Some(old) = replaced {
            tree.release(old);
        }
        tree.link(self.0, node);
        let (size, after) = tree.write_count(self.0).ok_or(NodeError::UnknownNode)?;

        tree.notify(node);
        if let Some(old) = replaced {
            tree.notify(old);
        }
        detached.settle(tree, if after != before { size } else { self.0 });
        Ok(replaced)
    }

    pub fn get(&self, tree: &NodeTree, key: &str) -> Option<NodeId> {
        self.data(tree)?.entries.get(key).copied()
    }

    /// Remove the node stored under `key`, detaching it. Returns whether
    /// anything was removed.
    pub fn delete(&self, tree: &mut NodeTree, key: &str) -> bool {
        let removed = match tree.data_mut(self.0) {
            Some(NodeData::Map(data)) => data.entries.shift_remove(key),
            _ => None,
        };
        let Some(node) = removed else {
            return false;
        };
        tree.release(node);
        let Some((size, _)) = tree.write_count(self.0) else {
            return true;
        };

        tree.notify(node);
        tree.bubble(size);
        true
    }

    /// The count node mirroring this map's size
    pub fn size(&self, tree: &NodeTree) -> Option<Natural> {
        self.data(tree).map(|data| Natural::from_id(data.size))
    }

    pub fn len(&self, tree: &NodeTree) -> usize {
        self.data(tree).map_or(0, |data| data.entries.len())
    }

    pub fn is_empty(&self, tree: &NodeTree) -> bool {
        self.len(tree) == 0
    }

    pub fn contains_key(&self, tree: &NodeTree, key: &str) -> bool {
        self.get(tree, key).is_some()
    }

    pub fn keys(&self, tree: &NodeTree) -> Vec<String> {
        self.data(tree)
            .map(|data| data.entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the entries in insertion order
    pub fn entries(&self, tree: &NodeTree) -> Vec<(String, NodeId)> {
        self.data(tree)
            .map(|data| {
                data.entries
                    .iter()
                    .map(|(key, node)| (key.clone(), *node))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn data<'t>(&self, tree: &'t NodeTree) -> Option<&'t MapData> {
        match tree.data(self.0)? {
            NodeData::Map(data) => Some(data),
            _ => None,
        }
    }
}

impl From<Map> for NodeId {
    fn from(map: Map) -> Self {
        map.0
    }
}

enum CountOwner {
    Array,
    Map,
}

impl NodeTree {
    /// The count node of a container
    pub(crate) fn count_node(&self, container: NodeId) -> Option<NodeId> {
        match self.data(container)? {
            NodeData::Array(data) => Some(data.length),
            NodeData::Map(data) => Some(data.size),
            _ => None,
        }
    }

    /// Where a change to `owner` starts bubbling
    pub(crate) fn change_origin(&self, owner: NodeId, count_changed: bool) -> NodeId {
        match self.count_node(owner) {
            Some(count) if count_changed => count,
            _ => owner,
        }
    }

    /// Store the backing length in the count node without notifying.
    /// Returns the count node and the new length.
    pub(crate) fn write_count(&mut self, container: NodeId) -> Option<(NodeId, usize)> {
        let (count, len) = match self.data(container)? {
            NodeData::Array(data) => (data.length, data.items.len()),
            NodeData::Map(data) => (data.size, data.entries.len()),
            _ => return None,
        };
        if let Some(NodeData::Leaf(primitive)) = self.data_mut(count) {
            *primitive = Primitive::Natural(len);
        }
        Some((count, len))
    }

    /// Drop `child` from a container's backing storage. Returns whether the
    /// element count changed.
    pub(crate) fn forget_element(&mut self, container: NodeId, child: NodeId) -> bool {
        let removed = match self.data_mut(container) {
            Some(NodeData::Array(data)) => {
                let before = data.items.len();
                data.items.retain(|slot| *slot != Some(child));
                data.items.len() != before
            }
            Some(NodeData::Map(data)) => {
                let before = data.entries.len();
                data.entries.retain(|_, node| *node != child);
                data.entries.len() != before
            }
            _ => false,
        };
        if removed {
            self.write_count(container);
        }
        removed
    }

    /// Apply a direct write to a natural number that may be a container's
    /// count node.
    ///
    /// Returns the elements dropped by truncation, or `None` if the write was
    /// reverted.
    pub(crate) fn settle_count(&mut self, natural: NodeId) -> Option<SmallVec<[NodeId; 4]>> {
        let mut dropped = SmallVec::new();
        let Some(NodeData::Leaf(Primitive::Natural(value))) = self.data(natural) else {
            return Some(dropped);
        };
        let value = *value;
        let Some(owner) = self.parent(natural) else {
            return Some(dropped);
        };
        let role = match self.data(owner) {
            Some(NodeData::Array(data)) if data.length == natural => CountOwner::Array,
            Some(NodeData::Map(data)) if data.size == natural => CountOwner::Map,
            _ => return Some(dropped),
        };

        match role {
            CountOwner::Array => {
                let mut resized = true;
                if let Some(NodeData::Array(data)) = self.data_mut(owner) {
                    let len = data.items.len();
                    if value < len {
                        dropped.extend(data.items.drain(value..).flatten());
                    } else if value <= MAX_ARRAY_LENGTH && data.items.try_reserve(value - len).is_ok() {
                        data.items.resize(value, None);
                    } else {
                        resized = false;
                    }
                }
                if !resized {
                    self.write_count(owner);
                    trace!("length: {:?} cannot grow to {}, ignoring write", owner, value);
                    return None;
                }
                for &node in &dropped {
                    self.release(node);
                }
                trace!("length: {:?} resized to {}", owner, value);
                Some(dropped)
            }
            CountOwner::Map => {
                let actual = self.write_count(owner).map_or(value, |(_, len)| len);
                if actual == value {
                    return Some(dropped);
                }
                trace!("size: {:?} is {}, ignoring write of {}", owner, actual, value);
                None
            }
        }
    }

    pub(crate) fn array_json(&self, data: &ArrayData) -> Value {
        Value::Array(
            data.items
                .iter()
                .map(|slot| slot.and_then(|node| self.to_json(node)).unwrap_or(Value::Null))
                .collect(),
        )
    }

    pub(crate) fn map_json(&self, data: &MapData) -> Value {
        let mut object = serde_json::Map::new();
        for (key, node) in &data.entries {
            object.insert(key.clone(), self.to_json(*node).unwrap_or(Value::Null));
        }
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Number;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn numbers(tree: &mut NodeTree, values: &[f64]) -> Vec<NodeId> {
        values
            .iter()
            .map(|value| Number::new(tree, *value).id())
            .collect()
    }

    fn counter(tree: &mut NodeTree, id: NodeId) -> Rc<RefCell<usize>> {
        let count = Rc::new(RefCell::new(0));
        let count_clone = Rc::clone(&count);
        tree.subscribe(id, move |_, _| *count_clone.borrow_mut() += 1)
            .unwrap();
        count
    }

    #[test]
    fn test_array_accepts_values() {
        let mut tree = NodeTree::new();
        let values = numbers(&mut tree, &[1.0, 2.0, 3.0]);
        let array = Array::new(&mut tree, &values).unwrap();

        let items = array.items(&tree);
        assert_eq!(items.len(), 3);
        for (slot, value) in items.iter().zip(&values) {
            assert_eq!(*slot, Some(*value));
            assert_eq!(tree.parent(*value), Some(array.id()));
        }
        let length = array.length(&tree).unwrap();
        assert_eq!(tree.parent(length), Some(array.id()));
        assert!(tree.is_pinned(length));
    }

    #[test]
    fn test_array_at() {
        let mut tree = NodeTree::new();
        let values = numbers(&mut tree, &[1.0, 2.0, 3.0]);
        let array = Array::new(&mut tree, &values).unwrap();

        assert_eq!(array.at(&tree, 0), Some(values[0]));
        assert_eq!(array.at(&tree, 2), Some(values[2]));
        assert_eq!(array.at(&tree, -1), Some(values[2]));
        assert_eq!(array.at(&tree, -3), Some(values[0]));
        assert_eq!(array.at(&tree, -4), None);
        assert_eq!(array.at(&tree, 3), None);
    }

    #[test]
    fn test_push_and_pop_track_length() {
        let mut tree = NodeTree::new();
        let values = numbers(&mut tree, &[1.0, 2.0, 3.0]);
        let array = Array::new(&mut tree, &values).unwrap();
        let length = array.length(&tree).unwrap();
        assert_eq!(tree.get(length), Some(3));

        let extra = Number::new(&mut tree, 42);
        assert_eq!(array.push(&mut tree, &[extra.id()]).unwrap(), 4);
        assert_eq!(tree.get(length), Some(4));
        assert_eq!(array.at(&tree, 3), Some(extra.id()));

        assert_eq!(array.pop(&mut tree), Some(extra.id()));
        assert_eq!(tree.parent(extra), None);
        assert_eq!(array.pop(&mut tree), Some(values[2]));
        assert_eq!(tree.get(length), Some(2));
        assert_eq!(array.len(&tree), 2);
    }

    #[test]
    fn test_pop_empty_is_absent() {
        let mut tree = NodeTree::new();
        let array = Array::new(&mut tree, &[]).unwrap();
        let calls = counter(&mut tree, array.id());

        assert_eq!(array.pop(&mut tree), None);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_length_set_grows_and_truncates() {
        let mut tree = NodeTree::new();
        let values = numbers(&mut tree, &[1.0, 2.0, 3.0]);
        let array = Array::new(&mut tree, &values).unwrap();
        let length = array.length(&tree).unwrap();
        let calls = counter(&mut tree, array.id());

        assert!(tree.set(length, 10usize));
        assert_eq!(array.len(&tree), 10);
        assert_eq!(*calls.borrow(), 2);
        assert_eq!(
            tree.to_json(array),
            Some(json!([1, 2, 3, null, null, null, null, null, null, null]))
        );

        // Popping a vacant slot still shrinks the array
        assert_eq!(array.pop(&mut tree), None);
        assert_eq!(array.len(&tree), 9);
        let extra = Number::new(&mut tree, 42);
        array.push(&mut tree, &[extra.id()]).unwrap();
        assert_eq!(array.len(&tree), 10);
        assert_eq!(*calls.borrow(), 4);

        assert!(tree.set(length, 1usize));
        assert_eq!(array.items(&tree), vec![Some(values[0])]);
        assert_eq!(tree.parent(values[1]), None);
        assert_eq!(tree.parent(extra), None);
        assert_eq!(*calls.borrow(), 5);
    }

    #[test]
    fn test_length_subscriber_not_called_for_element_changes() {
        let mut tree = NodeTree::new();
        let values = numbers(&mut tree, &[1.0]);
        let array = Array::new(&mut tree, &values).unwrap();
        let length = array.length(&tree).unwrap();
        let length_calls = counter(&mut tree, length.id());
        let array_calls = counter(&mut tree, array.id());

        tree.set(Number::from_id(values[0]), 5);
        assert_eq!(*length_calls.borrow(), 1);
        assert_eq!(*array_calls.borrow(), 2);
    }

    #[test]
    fn test_push_moves_from_other_array() {
        let mut tree = NodeTree::new();
        let values = numbers(&mut tree, &[1.0, 2.0]);
        let first = Array::new(&mut tree, &values).unwrap();
        let second = Array::new(&mut tree, &[]).unwrap();
        let first_calls = counter(&mut tree, first.id());

        second.push(&mut tree, &[values[0]]).unwrap();

        assert_eq!(tree.parent(values[0]), Some(second.id()));
        assert_eq!(first.items(&tree), vec![Some(values[1])]);
        assert_eq!(tree.get(first.length(&tree).unwrap()), Some(1));
        assert_eq!(*first_calls.borrow(), 2);
    }

    #[test]
    fn test_push_between_arrays_notifies_common_map_once() {
        let mut tree = NodeTree::new();
        let values = numbers(&mut tree, &[1.0, 2.0]);
        let first = Array::new(&mut tree, &values).unwrap();
        let second = Array::new(&mut tree, &[]).unwrap();
        let map = Map::new(&mut tree, [("first", first.id()), ("second", second.id())]).unwrap();
        let map_calls = counter(&mut tree, map.id());

        second.push(&mut tree, &values).unwrap();

        assert!(first.items(&tree).is_empty());
        assert_eq!(second.len(&tree), 2);
        assert_eq!(*map_calls.borrow(), 2);
    }

    #[test]
    fn test_length_write_above_limit_is_reverted() {
        let mut tree = NodeTree::new();
        let values = numbers(&mut tree, &[1.0, 2.0]);
        let array = Array::new(&mut tree, &values).unwrap();
        let length = array.length(&tree).unwrap();
        let array_calls = counter(&mut tree, array.id());
        let length_calls = counter(&mut tree, length.id());

        assert!(!tree.set_coerced(length, &json!(1e19)));
        assert!(!tree.set_coerced(length, &json!(MAX_ARRAY_LENGTH as f64 + 1.0)));
        assert_eq!(tree.get(length), Some(2));
        assert_eq!(array.items(&tree), vec![Some(values[0]), Some(values[1])]);
        assert_eq!(*array_calls.borrow(), 1);
        assert_eq!(*length_calls.borrow(), 1);
    }

    #[test]
    fn test_count_nodes_are_pinned() {
        let mut tree = NodeTree::new();
        let array = Array::new(&mut tree, &[]).unwrap();
        let other = Array::new(&mut tree, &[]).unwrap();
        let length = array.length(&tree).unwrap();

        assert!(matches!(
            other.push(&mut tree, &[length.id()]),
            Err(NodeError::Pinned)
        ));
        assert_eq!(tree.remove(array, &[length.id()]), 0);
        assert_eq!(tree.parent(length), Some(array.id()));
    }

    #[test]
    fn test_map_get_insert_delete() {
        let mut tree = NodeTree::new();
        let values = numbers(&mut tree, &[1.0, 2.0, 3.0]);
        let map = Map::new(
            &mut tree,
            values.iter().enumerate().map(|(i, v)| ((i + 1).to_string(), *v)),
        )
        .unwrap();

        assert_eq!(map.get(&tree, "1"), Some(values[0]));
        assert_eq!(map.get(&tree, "3"), Some(values[2]));
        assert_eq!(map.len(&tree), 3);

        let four = Number::new(&mut tree, 4);
        assert_eq!(map.insert(&mut tree, "4", four.id()).unwrap(), None);
        assert_eq!(map.get(&tree, "4"), Some(four.id()));
        assert_eq!(tree.get(map.size(&tree).unwrap()), Some(4));

        assert_eq!(tree.parent(values[0]), Some(map.id()));
        assert!(map.delete(&mut tree, "1"));
        assert!(!map.delete(&mut tree, "1"));
        assert_eq!(tree.parent(values[0]), None);
        assert_eq!(tree.get(map.size(&tree).unwrap()), Some(3));
        assert_eq!(map.keys(&tree), vec!["2", "3", "4"]);
    }

    #[test]
    fn test_map_replace_detaches_previous() {
        let mut tree = NodeTree::new();
        let old = Number::new(&mut tree, 1);
        let new = Number::new(&mut tree, 2);
        let map = Map::new(&mut tree, [("a", old.id())]).unwrap();
        let size_id = map.size(&tree).unwrap().id();
        let size_calls = counter(&mut tree, size_id);

        assert_eq!(map.insert(&mut tree, "a", new.id()).unwrap(), Some(old.id()));
        assert_eq!(tree.parent(old), None);
        assert_eq!(tree.parent(new), Some(map.id()));
        assert_eq!(*size_calls.borrow(), 1);
    }

    #[test]
    fn test_map_to_json() {
        let mut tree = NodeTree::new();
        let values = numbers(&mut tree, &[1.0, 2.0, 3.0]);
        let map = Map::new(
            &mut tree,
            values.iter().enumerate().map(|(i, v)| ((i + 1).to_string(), *v)),
        )
        .unwrap();
        let four_hundred = Number::new(&mut tree, 400);
        map.insert(&mut tree, "four-hundred", four_hundred.id())
            .unwrap();

        assert_eq!(
            tree.to_json(map),
            Some(json!({"1": 1, "2": 2, "3": 3, "four-hundred": 400}))
        );
    }

    #[test]
    fn test_map_size_unchanged_by_element_changes() {
        let mut tree = NodeTree::new();
        let values = numbers(&mut tree, &[1.0, 2.0, 3.0]);
        let map = Map::new(&mut tree, [("1", values[0]), ("2", values[1]), ("3", values[2])])
            .unwrap();
        let map_calls = counter(&mut tree, map.id());
        let size_id = map.size(&tree).unwrap().id();
        let size_calls = counter(&mut tree, size_id);

        let first = Number::from_id(values[0]);
        tree.set(first, 12);
        tree.set(first, 13);
        tree.set(first, 14);

        assert_eq!(*map_calls.borrow(), 4);
        assert_eq!(*size_calls.borrow(), 1);
    }

    #[test]
    fn test_map_size_write_is_reverted() {
        let mut tree = NodeTree::new();
        let one = Number::new(&mut tree, 1);
        let map = Map::new(&mut tree, [("one", one.id())]).unwrap();
        let size = map.size(&tree).unwrap();
        let map_calls = counter(&mut tree, map.id());

        assert!(!tree.set(size, 7usize));
        assert_eq!(tree.get(size), Some(1));
        assert_eq!(*map_calls.borrow(), 1);
    }

    #[test]
    fn test_nested_maps_bubble() {
        let mut tree = NodeTree::new();
        let number = Number::new(&mut tree, 1);
        let child = Map::new(&mut tree, [("number", number.id())]).unwrap();
        let parent = Map::new(&mut tree, [("child", child.id())]).unwrap();
        let grandparent = Map::new(&mut tree, [("parent", parent.id())]).unwrap();

        let grandparent_calls = counter(&mut tree, grandparent.id());
        let parent_calls = counter(&mut tree, parent.id());
        let child_calls = counter(&mut tree, child.id());

        tree.set(number, 3);
        tree.set(number, 0);

        assert_eq!(*grandparent_calls.borrow(), 3);
        assert_eq!(*parent_calls.borrow(), 3);
        assert_eq!(*child_calls.borrow(), 3);
    }
}
