//! Core type definitions
//!
//! Key design principles:
//! 1. Nodes are addressed by a small `Copy` handle, never by pointer
//! 2. Node kinds form a closed enum; every dispatch is an exhaustive match
//! 3. Use SmallVec for attribute lists (most elements carry a handful)

use crate::error::{Result, TreeError};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use uuid::Uuid;

/// Arena handle.
///
/// The generation changes whenever the slot is disposed, so a stale handle
/// can never alias a node created later in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeKind {
    Document = 0,
    Element = 1,
    Text = 2,
    Comment = 3,
}

impl NodeKind {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(NodeKind::Document),
            1 => Ok(NodeKind::Element),
            2 => Ok(NodeKind::Text),
            3 => Ok(NodeKind::Comment),
            other => Err(TreeError::InvalidNodeType(other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Document => "#document",
            NodeKind::Element => "Element",
            NodeKind::Text => "Text",
            NodeKind::Comment => "Comment",
        }
    }

    /// Text and comment nodes carry content and only accept children of
    /// their own kind.
    pub fn is_content(&self) -> bool {
        matches!(self, NodeKind::Text | NodeKind::Comment)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Text(text) => f.write_str(text),
            AttrValue::Int(value) => write!(f, "{}", value),
            AttrValue::Bool(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(value as i64)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

/// One key/value attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attr {
    pub key: String,
    pub value: AttrValue,
}

impl Attr {
    pub fn new(key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Attributes in insertion order, keys unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrList {
    attrs: SmallVec<[Attr; 4]>,
}

impl AttrList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute. An existing key keeps its position.
    pub fn set(&mut self, attr: Attr) {
        match self.attrs.iter_mut().find(|existing| existing.key == attr.key) {
            Some(existing) => existing.value = attr.value,
            None => self.attrs.push(attr),
        }
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attrs
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| &attr.value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Attr> {
        let position = self.attrs.iter().position(|attr| attr.key == key)?;
        Some(self.attrs.remove(position))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attr> {
        self.attrs.iter()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn clear(&mut self) {
        self.attrs.clear();
    }

    /// Set equality: same keys with same values, order ignored.
    pub fn match_attrs(&self, other: &AttrList) -> bool {
        self.len() == other.len()
            && self
                .attrs
                .iter()
                .all(|attr| other.get(&attr.key) == Some(&attr.value))
    }
}

impl FromIterator<Attr> for AttrList {
    fn from_iter<I: IntoIterator<Item = Attr>>(iter: I) -> Self {
        let mut list = AttrList::new();
        for attr in iter {
            list.set(attr);
        }
        list
    }
}

/// Snapshot of a node slated for disposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetiredNode {
    pub handle: NodeId,
    pub ref_id: Uuid,
    pub node_id: String,
    pub name: String,
    pub kind: NodeKind,
}

/// Nodes retired under one parent, keyed by handle
#[derive(Debug, Clone, Default)]
pub struct RetiredSet {
    nodes: AHashMap<NodeId, RetiredNode>,
}

impl RetiredSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: RetiredNode) {
        self.nodes.insert(node.handle, node);
    }

    pub fn remove(&mut self, handle: NodeId) -> Option<RetiredNode> {
        self.nodes.remove(&handle)
    }

    pub fn contains(&self, handle: NodeId) -> bool {
        self.nodes.contains_key(&handle)
    }

    pub fn get(&self, handle: NodeId) -> Option<&RetiredNode> {
        self.nodes.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RetiredNode> {
        self.nodes.values()
    }

    /// Retired handles in a stable order.
    pub fn handles(&self) -> Vec<NodeId> {
        let mut handles: Vec<NodeId> = self.nodes.keys().copied().collect();
        handles.sort();
        handles
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn drain(&mut self) -> Vec<RetiredNode> {
        let mut drained: Vec<RetiredNode> = self.nodes.drain().map(|(_, node)| node).collect();
        drained.sort_by_key(|node| node.handle);
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_from_u8() {
        assert_eq!(NodeKind::from_u8(1).unwrap(), NodeKind::Element);
        assert_eq!(NodeKind::from_u8(3).unwrap(), NodeKind::Comment);
        assert!(matches!(
            NodeKind::from_u8(9),
            Err(TreeError::InvalidNodeType(9))
        ));
    }

    #[test]
    fn test_attr_list_set_keeps_position() {
        let mut attrs: AttrList = [Attr::new("a", 1), Attr::new("b", "x")].into_iter().collect();
        attrs.set(Attr::new("a", 2));

        let keys: Vec<&str> = attrs.iter().map(|attr| attr.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(attrs.get("a"), Some(&AttrValue::Int(2)));
    }

    #[test]
    fn test_match_attrs_ignores_order() {
        let left: AttrList = [Attr::new("a", 1), Attr::new("b", true)].into_iter().collect();
        let right: AttrList = [Attr::new("b", true), Attr::new("a", 1)].into_iter().collect();
        let other: AttrList = [Attr::new("a", 1), Attr::new("b", false)].into_iter().collect();

        assert!(left.match_attrs(&right));
        assert!(right.match_attrs(&left));
        assert!(!left.match_attrs(&other));
        assert!(!left.match_attrs(&AttrList::new()));
    }

    #[test]
    fn test_retired_node_serializes() {
        let node = RetiredNode {
            handle: NodeId::new(3, 1),
            ref_id: Uuid::nil(),
            node_id: "p1".to_string(),
            name: "p".to_string(),
            kind: NodeKind::Element,
        };

        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["kind"], "Element");
        assert_eq!(json["handle"]["index"], 3);

        let back: RetiredNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }
}
