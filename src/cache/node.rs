//! Node Module
//!
//! A shared, mutable handle onto a JSON tree. Clones of a `Node` are the
//! long-lived references the rendering layer holds: updates made through any
//! clone (or by reconciliation) are visible through all of them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::cache::merge;

#[derive(Debug)]
pub(crate) enum Slot {
    /// Any non-composite value
    Leaf(Value),
    Object(BTreeMap<String, Node>),
    Array(Vec<Node>),
}

impl Slot {
    pub(crate) fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Slot::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Node::new(v)))
                    .collect(),
            ),
            Value::Array(items) => Slot::Array(items.into_iter().map(Node::new).collect()),
            leaf => Slot::Leaf(leaf),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Slot::Leaf(value) => value.clone(),
            Slot::Object(children) => Value::Object(
                children
                    .iter()
                    .map(|(k, node)| (k.clone(), node.to_value()))
                    .collect::<Map<String, Value>>(),
            ),
            Slot::Array(items) => Value::Array(items.iter().map(Node::to_value).collect()),
        }
    }
}

// == Node ==
/// Nodes can only be built from plain values, so a tree never contains a
/// cycle or a node shared between two parents.
#[derive(Clone)]
pub struct Node(Arc<RwLock<Slot>>);

impl Node {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(RwLock::new(Slot::from_value(value))))
    }

    /// True when both handles refer to the same node.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Deep copy of the current contents.
    pub fn to_value(&self) -> Value {
        self.0.read().to_value()
    }

    pub fn is_composite(&self) -> bool {
        !matches!(*self.0.read(), Slot::Leaf(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(*self.0.read(), Slot::Leaf(Value::Null))
    }

    /// Number of fields or items; zero for leaves.
    pub fn len(&self) -> usize {
        match &*self.0.read() {
            Slot::Leaf(_) => 0,
            Slot::Object(children) => children.len(),
            Slot::Array(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Field names of an object node.
    pub fn keys(&self) -> Vec<String> {
        match &*self.0.read() {
            Slot::Object(children) => children.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    // == Navigation ==
    /// Child of an object by name, or of an array by decimal index.
    pub fn get(&self, field: &str) -> Option<Node> {
        match &*self.0.read() {
            Slot::Object(children) => children.get(field).cloned(),
            Slot::Array(items) => field.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
            Slot::Leaf(_) => None,
        }
    }

    pub fn at(&self, index: usize) -> Option<Node> {
        match &*self.0.read() {
            Slot::Array(items) => items.get(index).cloned(),
            _ => None,
        }
    }

    /// Follows `path` from this node.
    pub fn path(&self, path: &[&str]) -> Option<Node> {
        path.iter()
            .try_fold(self.clone(), |node, field| node.get(field))
    }

    /// Leaf value, `None` for composites.
    pub fn leaf(&self) -> Option<Value> {
        match &*self.0.read() {
            Slot::Leaf(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.leaf().and_then(|v| v.as_i64())
    }

    // == Mutation ==
    /// Replaces the whole contents. Existing handles to this node see the
    /// new value; handles to its former children are detached.
    pub fn assign(&self, value: Value) {
        *self.0.write() = Slot::from_value(value);
    }

    /// Reference-preserving merge of `incoming` into this node.
    pub fn merge(&self, incoming: &Value) {
        merge::merge(self, incoming);
    }

    /// Sets a field of an object node. Returns `None` if this is not an object.
    pub fn set_field(&self, field: &str, value: Value) -> Option<Node> {
        match &mut *self.0.write() {
            Slot::Object(children) => {
                let node = Node::new(value);
                children.insert(field.to_string(), node.clone());
                Some(node)
            }
            _ => None,
        }
    }

    /// Returns the named field, inserting `default` first when it is missing.
    /// Returns `None` if this is not an object.
    pub fn entry(&self, field: &str, default: Value) -> Option<Node> {
        match &mut *self.0.write() {
            Slot::Object(children) => Some(
                children
                    .entry(field.to_string())
                    .or_insert_with(|| Node::new(default))
                    .clone(),
            ),
            _ => None,
        }
    }

    pub fn remove(&self, field: &str) -> Option<Node> {
        match &mut *self.0.write() {
            Slot::Object(children) => children.remove(field),
            _ => None,
        }
    }

    /// Appends to an array node. Returns `None` if this is not an array.
    pub fn push(&self, value: Value) -> Option<Node> {
        match &mut *self.0.write() {
            Slot::Array(items) => {
                let node = Node::new(value);
                items.push(node.clone());
                Some(node)
            }
            _ => None,
        }
    }

    pub(crate) fn slot(&self) -> &RwLock<Slot> {
        &self.0
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::new(value)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.to_value())
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
