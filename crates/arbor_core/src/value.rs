//! Value nodes
//!
//! Typed leaves over [`Primitive`] values. Input is coerced the way a dynamic
//! host would coerce it (`"3"` becomes `3.0` for a number, `0` becomes `false`
//! for a boolean) and a `set` that leaves the value unchanged notifies nobody.
//!
//! ```rust
//! use arbor_core::{NodeTree, Number};
//!
//! let mut tree = NodeTree::new();
//! let count = Number::new(&mut tree, 1);
//!
//! assert!(tree.set(count, 2));
//! assert!(!tree.set(count, 2));
//! assert_eq!(tree.get(count), Some(2.0));
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::tree::{NodeData, NodeId, NodeKind, NodeTree};

/// The value held by a leaf node
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Non-negative integer, used by containers to mirror their element count
    Natural(usize),
}

impl Primitive {
    pub fn kind(&self) -> NodeKind {
        match self {
            Primitive::Number(_) => NodeKind::Number,
            Primitive::Text(_) => NodeKind::Text,
            Primitive::Boolean(_) => NodeKind::Boolean,
            Primitive::Natural(_) => NodeKind::Natural,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Primitive::Number(number) => number_to_json(*number),
            Primitive::Text(text) => Value::String(text.clone()),
            Primitive::Boolean(flag) => Value::Bool(*flag),
            Primitive::Natural(count) => Value::from(*count as u64),
        }
    }
}

/// Formats like a host string conversion: `3` rather than `3.0`, `NaN`, `Infinity`
impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Number(number) => f.write_str(&format_number(*number)),
            Primitive::Text(text) => f.write_str(text),
            Primitive::Boolean(flag) => write!(f, "{flag}"),
            Primitive::Natural(count) => write!(f, "{count}"),
        }
    }
}

/// A Rust type that can live in a leaf node
pub trait Scalar: Clone + PartialEq + 'static {
    /// Convert arbitrary input into this type
    fn coerce(value: &Value) -> Self;

    fn into_primitive(self) -> Primitive;

    fn from_primitive(primitive: &Primitive) -> Option<&Self>;
}

impl Scalar for f64 {
    fn coerce(value: &Value) -> Self {
        match value {
            Value::Null => 0.0,
            Value::Bool(flag) => f64::from(u8::from(*flag)),
            Value::Number(number) => number.as_f64().unwrap_or(f64::NAN),
            Value::String(text) => parse_number(text),
            Value::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => f64::coerce(single),
                _ => f64::NAN,
            },
            Value::Object(_) => f64::NAN,
        }
    }

    fn into_primitive(self) -> Primitive {
        Primitive::Number(self)
    }

    fn from_primitive(primitive: &Primitive) -> Option<&Self> {
        match primitive {
            Primitive::Number(number) => Some(number),
            _ => None,
        }
    }
}

impl Scalar for String {
    fn coerce(value: &Value) -> Self {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(flag) => flag.to_string(),
            Value::Number(number) => format_number(number.as_f64().unwrap_or(f64::NAN)),
            Value::String(text) => text.clone(),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Null => String::new(),
                    other => String::coerce(other),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
        }
    }

    fn into_primitive(self) -> Primitive {
        Primitive::Text(self)
    }

    fn from_primitive(primitive: &Primitive) -> Option<&Self> {
        match primitive {
            Primitive::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl Scalar for bool {
    fn coerce(value: &Value) -> Self {
        match value {
            Value::Null => false,
            Value::Bool(flag) => *flag,
            Value::Number(number) => number
                .as_f64()
                .is_some_and(|number| number != 0.0 && !number.is_nan()),
            Value::String(text) => !text.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    fn into_primitive(self) -> Primitive {
        Primitive::Boolean(self)
    }

    fn from_primitive(primitive: &Primitive) -> Option<&Self> {
        match primitive {
            Primitive::Boolean(flag) => Some(flag),
            _ => None,
        }
    }
}

impl Scalar for usize {
    fn coerce(value: &Value) -> Self {
        // `as` saturates and maps NaN to zero
        f64::coerce(value).max(0.0) as usize
    }

    fn into_primitive(self) -> Primitive {
        Primitive::Natural(self)
    }

    fn from_primitive(primitive: &Primitive) -> Option<&Self> {
        match primitive {
            Primitive::Natural(count) => Some(count),
            _ => None,
        }
    }
}

/// Typed handle to a leaf node
pub struct Leaf<T> {
    id: NodeId,
    _marker: PhantomData<fn() -> T>,
}

pub type Number = Leaf<f64>;
pub type Text = Leaf<String>;
pub type Boolean = Leaf<bool>;
/// Non-negative integer leaf; `append` and `remove` on it are no-ops
pub type Natural = Leaf<usize>;

impl<T: Scalar> Leaf<T> {
    /// Create an unattached leaf
    pub fn new(tree: &mut NodeTree, value: impl Into<T>) -> Self {
        let value: T = value.into();
        Self::from_id(tree.insert(NodeData::Leaf(value.into_primitive())))
    }

    /// Create an unattached leaf from arbitrary input
    pub fn coerced(tree: &mut NodeTree, value: &Value) -> Self {
        Self::new(tree, T::coerce(value))
    }

    /// Create an unattached leaf holding a coerced copy of another node's value
    pub fn from_node(tree: &mut NodeTree, source: impl Into<NodeId>) -> Option<Self> {
        let value = tree.to_json(source)?;
        Some(Self::coerced(tree, &value))
    }
}

impl<T> Leaf<T> {
    /// Wrap a raw id. Reads through a handle of the wrong type return `None`.
    pub fn from_id(id: NodeId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl<T> Clone for Leaf<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Leaf<T> {}

impl<T> PartialEq for Leaf<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Leaf<T> {}

impl<T> Hash for Leaf<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Leaf<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Leaf").field(&self.id).finish()
    }
}

impl<T> From<Leaf<T>> for NodeId {
    fn from(leaf: Leaf<T>) -> Self {
        leaf.id
    }
}

/// Handle to a node holding an arbitrary serializable value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Json(NodeId);

impl Json {
    /// Create an unattached node from a deep copy of `value`
    ///
    /// Fails with [`NodeError::NotSerializable`](crate::NodeError::NotSerializable)
    /// if the value has no JSON representation.
    pub fn new<S: Serialize + ?Sized>(tree: &mut NodeTree, value: &S) -> Result<Self> {
        let value = serde_json::to_value(value)?;
        Ok(Json(tree.insert(NodeData::Json(value))))
    }

    pub fn id(&self) -> NodeId {
        self.0
    }
}

impl From<Json> for NodeId {
    fn from(node: Json) -> Self {
        node.0
    }
}

impl NodeTree {
    /// Get the value of a leaf
    pub fn get<T: Scalar>(&self, leaf: Leaf<T>) -> Option<T> {
        match self.data(leaf.id)? {
            NodeData::Leaf(primitive) => T::from_primitive(primitive).cloned(),
            _ => None,
        }
    }

    /// Get the primitive value of any leaf
    pub fn primitive(&self, id: impl Into<NodeId>) -> Option<&Primitive> {
        match self.data(id.into())? {
            NodeData::Leaf(primitive) => Some(primitive),
            _ => None,
        }
    }

    /// Set the value of a leaf, bubbling the change if the value differs
    ///
    /// Returns whether a change was committed.
    pub fn set<T: Scalar>(&mut self, leaf: Leaf<T>, value: impl Into<T>) -> bool {
        let value: T = value.into();
        let Some(NodeData::Leaf(primitive)) = self.data_mut(leaf.id) else {
            return false;
        };
        match T::from_primitive(primitive) {
            Some(current) if *current != value => {}
            _ => return false,
        }
        *primitive = value.into_primitive();
        self.commit_leaf(leaf.id)
    }

    /// Coerce arbitrary input into the leaf's type, then [`set`](Self::set) it
    pub fn set_coerced<T: Scalar>(&mut self, leaf: Leaf<T>, value: &Value) -> bool {
        self.set(leaf, T::coerce(value))
    }

    pub fn toggle(&mut self, flag: Boolean) -> bool {
        match self.get(flag) {
            Some(current) => self.set(flag, !current),
            None => false,
        }
    }

    pub fn set_true(&mut self, flag: Boolean) -> bool {
        self.set(flag, true)
    }

    pub fn set_false(&mut self, flag: Boolean) -> bool {
        self.set(flag, false)
    }

    /// Borrow the contents of a text leaf
    pub fn text(&self, leaf: Text) -> Option<TextView<'_>> {
        match self.data(leaf.id)? {
            NodeData::Leaf(Primitive::Text(text)) => Some(TextView { text }),
            _ => None,
        }
    }

    pub fn get_json(&self, node: Json) -> Option<&Value> {
        match self.data(node.0)? {
            NodeData::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Replace the value of a structured node, bubbling if it differs
    pub fn set_json<S: Serialize + ?Sized>(&mut self, node: Json, value: &S) -> Result<bool> {
        let value = serde_json::to_value(value)?;
        let Some(NodeData::Json(current)) = self.data_mut(node.0) else {
            return Ok(false);
        };
        if *current == value {
            return Ok(false);
        }
        *current = value;
        self.bubble(node.0);
        Ok(true)
    }

    fn commit_leaf(&mut self, id: NodeId) -> bool {
        let Some(dropped) = self.settle_count(id) else {
            return false;
        };
        for node in dropped {
            self.notify(node);
        }
        self.bubble(id);
        true
    }
}

/// Read-only view of a text leaf with string helpers
///
/// Indices count characters, except [`char_code_at`](Self::char_code_at)
/// which counts UTF-16 units.
#[derive(Clone, Copy, Debug)]
pub struct TextView<'a> {
    text: &'a str,
}

impl<'a> TextView<'a> {
    pub fn as_str(&self) -> &'a str {
        self.text
    }

    /// Number of characters
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Character at `index`; negative indices count from the end
    pub fn at(&self, index: isize) -> Option<char> {
        let index = if index < 0 {
            self.len().checked_sub(index.unsigned_abs())?
        } else {
            index as usize
        };
        self.char_at(index)
    }

    pub fn char_at(&self, index: usize) -> Option<char> {
        self.text.chars().nth(index)
    }

    pub fn char_code_at(&self, index: usize) -> Option<u16> {
        self.text.encode_utf16().nth(index)
    }

    pub fn code_point_at(&self, index: usize) -> Option<u32> {
        self.char_at(index).map(u32::from)
    }

    pub fn includes(&self, pattern: &str) -> bool {
        self.text.contains(pattern)
    }

    pub fn starts_with(&self, pattern: &str) -> bool {
        self.text.starts_with(pattern)
    }

    pub fn ends_with(&self, pattern: &str) -> bool {
        self.text.ends_with(pattern)
    }

    pub fn index_of(&self, pattern: &str) -> Option<usize> {
        let byte = self.text.find(pattern)?;
        Some(self.text[..byte].chars().count())
    }

    pub fn last_index_of(&self, pattern: &str) -> Option<usize> {
        let byte = self.text.rfind(pattern)?;
        Some(self.text[..byte].chars().count())
    }
}

impl fmt::Display for TextView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text)
    }
}

/// Integral numbers serialize as JSON integers, non-finite ones as `null`
pub(crate) fn number_to_json(number: f64) -> Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if number.fract() == 0.0 && number.abs() <= MAX_SAFE {
        Value::from(number as i64)
    } else {
        serde_json::Number::from_f64(number)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn format_number(number: f64) -> String {
    if number.is_nan() {
        "NaN".to_string()
    } else if number.is_infinite() {
        let sign = if number > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if number == 0.0 {
        "0".to_string()
    } else {
        format!("{number}")
    }
}

fn parse_number(text: &str) -> f64 {
    let text = text.trim();
    match text {
        "" => return 0.0,
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16)
            .map(|number| number as f64)
            .unwrap_or(f64::NAN);
    }
    // Rust accepts "inf" and "nan" spellings that a host conversion rejects
    let lowered = text.to_ascii_lowercase();
    if lowered.contains("inf") || lowered.contains("nan") {
        return f64::NAN;
    }
    text.parse().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    #[test]
    fn test_number_coercion() {
        let mut tree = NodeTree::new();
        let number = Number::coerced(&mut tree, &json!("3"));
        assert_eq!(tree.get(number), Some(3.0));

        assert_eq!(f64::coerce(&json!(" 42 ")), 42.0);
        assert_eq!(f64::coerce(&json!("")), 0.0);
        assert_eq!(f64::coerce(&json!(true)), 1.0);
        assert_eq!(f64::coerce(&json!(null)), 0.0);
        assert_eq!(f64::coerce(&json!("0x1F")), 31.0);
        assert!(f64::coerce(&json!("abc")).is_nan());
        assert!(f64::coerce(&json!("inf")).is_nan());
        assert!(f64::coerce(&json!({})).is_nan());
    }

    #[test]
    fn test_text_coercion() {
        assert_eq!(String::coerce(&json!(3)), "3");
        assert_eq!(String::coerce(&json!(1.5)), "1.5");
        assert_eq!(String::coerce(&json!(false)), "false");
        assert_eq!(String::coerce(&json!([1, null, "a"])), "1,,a");
        assert_eq!(String::coerce(&json!({"a": 1})), "[object Object]");
    }

    #[test]
    fn test_boolean_coercion() {
        assert!(bool::coerce(&json!(3)));
        assert!(!bool::coerce(&json!(0)));
        assert!(bool::coerce(&json!("false")));
        assert!(!bool::coerce(&json!("")));
        assert!(bool::coerce(&json!([])));
    }

    #[test]
    fn test_natural_clamps() {
        assert_eq!(usize::coerce(&json!(-4)), 0);
        assert_eq!(usize::coerce(&json!(3.9)), 3);
        assert_eq!(usize::coerce(&json!("nope")), 0);
    }

    #[test]
    fn test_set_suppresses_equal_values() {
        let mut tree = NodeTree::new();
        let flag = Boolean::coerced(&mut tree, &json!(3));
        let calls = Rc::new(RefCell::new(String::new()));

        let calls_clone = Rc::clone(&calls);
        tree.subscribe(flag, move |tree, id| {
            let text = tree.primitive(id).unwrap().to_string();
            calls_clone.borrow_mut().push_str(&text);
        })
        .unwrap();
        assert_eq!(*calls.borrow(), "true");

        assert!(!tree.set(flag, true));
        assert!(!tree.set_coerced(flag, &json!("yes")));
        assert_eq!(*calls.borrow(), "true");

        assert!(tree.toggle(flag));
        assert_eq!(*calls.borrow(), "truefalse");
    }

    #[test]
    fn test_primitive_conversion() {
        let mut tree = NodeTree::new();
        let number = Number::coerced(&mut tree, &json!("3"));
        assert_eq!(format!("{}abc", tree.primitive(number).unwrap()), "3abc");
        assert_eq!(tree.to_json(number), Some(json!(3)));

        let fraction = Number::new(&mut tree, 0.5);
        assert_eq!(tree.to_json(fraction), Some(json!(0.5)));

        let nan = Number::new(&mut tree, f64::NAN);
        assert_eq!(tree.to_json(nan), Some(Value::Null));
        assert_eq!(tree.primitive(nan).unwrap().to_string(), "NaN");
    }

    #[test]
    fn test_from_node_copies() {
        let mut tree = NodeTree::new();
        let original = Number::coerced(&mut tree, &json!("1"));
        let copy = Number::from_node(&mut tree, original).unwrap();

        assert_ne!(original, copy);
        assert_eq!(tree.get(copy), Some(1.0));

        let label = Text::from_node(&mut tree, original).unwrap();
        assert_eq!(tree.get(label).as_deref(), Some("1"));
    }

    #[test]
    fn test_wrong_handle_type_reads_nothing() {
        let mut tree = NodeTree::new();
        let number = Number::new(&mut tree, 1);
        let as_text = Text::from_id(number.id());

        assert_eq!(tree.get(as_text), None);
        assert!(!tree.set(as_text, "x"));
        assert_eq!(tree.kind(number), Some(NodeKind::Number));
    }

    #[test]
    fn test_text_view() {
        let mut tree = NodeTree::new();
        let text = Text::new(&mut tree, "héllo world");
        let view = tree.text(text).unwrap();

        assert_eq!(view.len(), 11);
        assert_eq!(view.at(-1), Some('d'));
        assert_eq!(view.at(-12), None);
        assert_eq!(view.char_at(1), Some('é'));
        assert_eq!(view.char_code_at(0), Some(104));
        assert_eq!(view.code_point_at(1), Some(0xE9));
        assert!(view.includes("lo w"));
        assert!(view.starts_with("hé"));
        assert!(view.ends_with("world"));
        assert_eq!(view.index_of("o"), Some(4));
        assert_eq!(view.last_index_of("o"), Some(7));
        assert_eq!(view.index_of("z"), None);
    }

    #[test]
    fn test_json_node() {
        let mut tree = NodeTree::new();
        let node = Json::new(&mut tree, &json!({"a": [1, 2]})).unwrap();
        let calls = Rc::new(RefCell::new(0));

        let calls_clone = Rc::clone(&calls);
        tree.subscribe(node, move |_, _| *calls_clone.borrow_mut() += 1)
            .unwrap();

        assert!(!tree.set_json(node, &json!({"a": [1, 2]})).unwrap());
        assert!(tree.set_json(node, &json!({"a": [3]})).unwrap());
        assert_eq!(*calls.borrow(), 2);
        assert_eq!(tree.get_json(node), Some(&json!({"a": [3]})));
    }

    #[test]
    fn test_json_rejects_unrepresentable_values() {
        let mut tree = NodeTree::new();
        let mut keyed = BTreeMap::new();
        keyed.insert(vec![1u8, 2], "value");

        assert!(matches!(
            Json::new(&mut tree, &keyed),
            Err(crate::NodeError::NotSerializable(_))
        ));
        assert!(tree.is_empty());
    }
}
