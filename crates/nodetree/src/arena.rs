//! Arena-based node storage
//!
//! "Bad programmers worry about the code. Good programmers worry about
//! data structures and their relationships."
//!
//! Nodes live in one `Vec` of generational slots and refer to each other by
//! [`NodeId`]. The parent link is a plain handle: it never owns anything and
//! a disposed parent simply stops resolving.
//!
//! ## Memory Layout
//!
//! ```text
//! slots: [gen|Node][gen|Node][gen|  -  ][gen|Node]...
//!                               ↑ free list, reused with gen + 1
//! children: OrderedList<ChildRef>  (ChildRef shares the child's Links)
//! ```

use crate::error::{Result, TreeError};
use crate::events::EventRegistry;
use crate::list::{Linked, Links, OrderedList};
use crate::types::{Attr, AttrList, AttrValue, NodeId, NodeKind, RetiredNode, RetiredSet};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Arena configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Node slots reserved up front.
    pub initial_capacity: usize,
    /// Child slots reserved per node; zero defers allocation to the first
    /// append.
    pub child_capacity: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 256,
            child_capacity: 0,
        }
    }
}

/// Entry in a parent's children list.
///
/// The links are the same allocation the child holds as its position, so the
/// child always knows which slot of its parent's list it occupies.
#[derive(Debug, Clone)]
pub(crate) struct ChildRef {
    pub(crate) id: NodeId,
    links: Arc<Links>,
}

impl Linked for ChildRef {
    fn links(&self) -> &Links {
        &self.links
    }
}

/// One tree entity
#[derive(Debug)]
pub struct Node {
    kind: NodeKind,
    ref_id: Uuid,
    node_id: String,
    name: String,
    pub(crate) content: Option<String>,
    pub(crate) attrs: AttrList,
    pub(crate) parent: Option<NodeId>,
    pub(crate) position: Arc<Links>,
    pub(crate) children: OrderedList<ChildRef>,
    pub(crate) text_nodes: AHashSet<NodeId>,
    pub(crate) retired: RetiredSet,
    pub(crate) events: EventRegistry,
}

impl Node {
    /// Both `name` and `node_id` must be non-empty: the name tells the
    /// renderer what the node is, the id is how swaps and retirement refer
    /// to it.
    fn new(kind: NodeKind, name: String, node_id: String, child_capacity: usize) -> Self {
        assert!(!name.is_empty(), "node name can not be empty");
        assert!(!node_id.is_empty(), "node id can not be empty");

        Self {
            kind,
            ref_id: Uuid::new_v4(),
            node_id,
            name,
            content: None,
            attrs: AttrList::new(),
            parent: None,
            position: Arc::new(Links::new()),
            children: OrderedList::with_capacity(child_capacity),
            text_nodes: AHashSet::new(),
            retired: RetiredSet::new(),
            events: EventRegistry::new(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Process-unique reference id.
    pub fn ref_id(&self) -> Uuid {
        self.ref_id
    }

    /// Caller-supplied id.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Text payload, empty for nodes without content.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn attrs(&self) -> &AttrList {
        &self.attrs
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    pub fn retired(&self) -> &RetiredSet {
        &self.retired
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn has_text_child(&self, child: NodeId) -> bool {
        self.text_nodes.contains(&child)
    }

    pub fn text_child_count(&self) -> usize {
        self.text_nodes.len()
    }

    /// Slot this node occupies in its parent's list.
    pub fn position(&self) -> Option<usize> {
        let index = self.position.index();
        (index >= 0).then_some(index as usize)
    }

    /// Structural equality used by reconciliation; children are not compared.
    pub fn matches(&self, other: &Node) -> bool {
        if self.kind != other.kind {
            return false;
        }

        match self.kind {
            NodeKind::Document | NodeKind::Element => {
                self.name == other.name && self.attrs.match_attrs(&other.attrs)
            }
            NodeKind::Text | NodeKind::Comment => self.text() == other.text(),
        }
    }

    fn summary(&self, handle: NodeId) -> RetiredNode {
        RetiredNode {
            handle,
            ref_id: self.ref_id,
            node_id: self.node_id.clone(),
            name: self.name.clone(),
            kind: self.kind,
        }
    }

    fn child_ids(&self) -> Vec<NodeId> {
        self.children.iter().map(|child| child.id).collect()
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena owning every node of one or more trees
///
/// Design:
/// - Single Vec of slots, reused through a free list
/// - Handles carry a generation, so disposal invalidates them
/// - Mutation takes `&mut self`; there is exactly one writer
#[derive(Debug)]
pub struct NodeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    config: ArenaConfig,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::with_config(ArenaConfig::default())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(ArenaConfig {
            initial_capacity: capacity,
            ..ArenaConfig::default()
        })
    }

    pub fn with_config(config: ArenaConfig) -> Self {
        Self {
            slots: Vec::with_capacity(config.initial_capacity),
            free: Vec::new(),
            live: 0,
            config,
        }
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Creates a detached node.
    ///
    /// # Panics
    ///
    /// Panics if `name` or `node_id` is empty.
    pub fn create_node(
        &mut self,
        kind: NodeKind,
        name: impl Into<String>,
        node_id: impl Into<String>,
    ) -> NodeId {
        let node = Node::new(kind, name.into(), node_id.into(), self.config.child_capacity);
        self.insert(node)
    }

    fn insert(&mut self, node: Node) -> NodeId {
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId::new(index, 0)
            }
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_ok()
    }

    pub fn get(&self, id: NodeId) -> Result<&Node> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
            .ok_or(TreeError::NodeNotFound(id))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
            .ok_or(TreeError::NodeNotFound(id))
    }

    /// Replaces the content of a text or comment node.
    pub fn set_content(&mut self, id: NodeId, content: impl Into<String>) -> Result<()> {
        let node = self.get_mut(id)?;
        if !node.kind.is_content() {
            return Err(TreeError::InvalidOperation(
                "only text and comment nodes carry content",
            ));
        }
        node.content = Some(content.into());
        Ok(())
    }

    pub fn set_attr(&mut self, id: NodeId, attr: Attr) -> Result<()> {
        if attr.key.is_empty() {
            return Err(TreeError::ValueCannotBeNil("attribute key"));
        }
        self.get_mut(id)?.attrs.set(attr);
        Ok(())
    }

    pub fn attr(&self, id: NodeId, key: &str) -> Result<Option<&AttrValue>> {
        Ok(self.get(id)?.attrs.get(key))
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(id)?.parent)
    }

    /// True when `ancestor` appears on the parent chain of `node`.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> Result<bool> {
        let mut current = self.get(node)?.parent;
        while let Some(id) = current {
            if id == ancestor {
                return Ok(true);
            }
            current = self.get(id)?.parent;
        }
        Ok(false)
    }

    /// Adds `kid` as the last child of `parent`.
    ///
    /// Text and comment nodes only accept children of their own kind. The
    /// kid is cross-registered for every event the parent fans out.
    pub fn append_child(&mut self, parent: NodeId, kid: NodeId) -> Result<()> {
        if parent == kid {
            return Err(TreeError::InvalidOperation("node can not be its own child"));
        }

        let parent_kind = self.get(parent)?.kind;
        let links = self.check_attachable(parent_kind, parent, kid)?;
        let kid_kind = self.get(kid)?.kind;

        let fan_out = {
            let node = self.get_mut(parent)?;
            node.children.add(ChildRef { id: kid, links });
            if kid_kind == NodeKind::Text {
                node.text_nodes.insert(kid);
            }
            let types = node.events.fan_out_types();
            for event_type in &types {
                node.events.add_child_listener(event_type, kid);
            }
            types
        };

        let child = self.get_mut(kid)?;
        child.parent = Some(parent);
        for event_type in &fan_out {
            child.events.subscribe(event_type);
        }
        Ok(())
    }

    /// Validates that `kid` may be attached under `parent` and returns the
    /// kid's links.
    fn check_attachable(
        &self,
        parent_kind: NodeKind,
        parent: NodeId,
        kid: NodeId,
    ) -> Result<Arc<Links>> {
        let child = self.get(kid)?;
        if child.parent.is_some() {
            return Err(TreeError::InvalidOperation("node already has a parent"));
        }
        if parent_kind.is_content() && child.kind != parent_kind {
            return Err(TreeError::InvalidOperation(
                "text and comment nodes only accept children of their own kind",
            ));
        }
        if self.is_ancestor(kid, parent)? {
            return Err(TreeError::InvalidOperation("append would create a cycle"));
        }
        Ok(child.position.clone())
    }

    /// Detaches `node` from its parent. The parent keeps it in its retired
    /// set until disposed.
    pub fn remove(&mut self, node: NodeId) -> Result<()> {
        let parent = self.detach(node)?;
        let summary = self.get(node)?.summary(node);
        self.get_mut(parent)?.retired.add(summary);
        tracing::debug!(node = %node, parent = %parent, "retired removed node");
        Ok(())
    }

    /// Unlinks `node` from its parent without retiring it.
    fn detach(&mut self, node: NodeId) -> Result<NodeId> {
        let (parent, index) = {
            let current = self.get(node)?;
            let parent = current
                .parent
                .ok_or(TreeError::InvalidOperation("node has no parent"))?;
            let index = current
                .position()
                .ok_or(TreeError::InvalidOperation("node is not linked into its parent"))?;
            (parent, index)
        };

        let removed = self.get_mut(parent)?.children.remove_and_swap(index)?;
        debug_assert_eq!(removed.id, node);

        let subscriptions = {
            let current = self.get_mut(node)?;
            current.parent = None;
            current.events.take_subscriptions()
        };

        let owner = self.get_mut(parent)?;
        for event_type in &subscriptions {
            owner.events.remove_child_listener(event_type, node);
        }
        owner.text_nodes.remove(&node);
        Ok(parent)
    }

    /// Puts `replacement` where `node` sits in its parent's list.
    pub fn swap_node(&mut self, node: NodeId, replacement: NodeId) -> Result<()> {
        let (parent, index) = self.parent_slot(node)?;
        self.swap_child_at(parent, index, replacement, false)?;
        Ok(())
    }

    /// Like [`swap_node`](Self::swap_node), and `replacement` also takes over
    /// `node`'s children.
    pub fn swap_all(&mut self, node: NodeId, replacement: NodeId) -> Result<()> {
        let (parent, index) = self.parent_slot(node)?;
        self.swap_child_at(parent, index, replacement, true)?;
        Ok(())
    }

    fn parent_slot(&self, node: NodeId) -> Result<(NodeId, usize)> {
        let current = self.get(node)?;
        let parent = current
            .parent
            .ok_or(TreeError::InvalidOperation("node has no parent"))?;
        let index = current
            .position()
            .ok_or(TreeError::InvalidOperation("node is not linked into its parent"))?;
        Ok((parent, index))
    }

    /// Replaces the child in slot `index` of `parent` with `replacement`,
    /// keeping the slot's links. With `carry_children` the children sets of
    /// the two nodes are exchanged. The displaced node is retired under
    /// `parent` and returned.
    pub fn swap_child_at(
        &mut self,
        parent: NodeId,
        index: usize,
        replacement: NodeId,
        carry_children: bool,
    ) -> Result<NodeId> {
        if parent == replacement {
            return Err(TreeError::InvalidOperation("node can not be its own child"));
        }
        let parent_kind = self.get(parent)?.kind;
        let links = self.check_attachable(parent_kind, parent, replacement)?;
        let replacement_kind = self.get(replacement)?.kind;

        if carry_children {
            let current = self.get(parent)?.children.get(index)?.id;
            let current_kind = self.get(current)?.kind;
            if !self.accepts_children(replacement_kind, current)?
                || !self.accepts_children(current_kind, replacement)?
            {
                return Err(TreeError::InvalidOperation(
                    "text and comment nodes only accept children of their own kind",
                ));
            }
        }

        let old = self
            .get_mut(parent)?
            .children
            .swap_node(index, ChildRef {
                id: replacement,
                links,
            })?
            .id;

        let subscriptions = {
            let displaced = self.get_mut(old)?;
            displaced.parent = None;
            displaced.events.take_subscriptions()
        };

        let (fan_out, summary) = {
            let summary = self.get(old)?.summary(old);
            let owner = self.get_mut(parent)?;
            for event_type in &subscriptions {
                owner.events.remove_child_listener(event_type, old);
            }
            owner.text_nodes.remove(&old);
            if replacement_kind == NodeKind::Text {
                owner.text_nodes.insert(replacement);
            }
            let types = owner.events.fan_out_types();
            for event_type in &types {
                owner.events.add_child_listener(event_type, replacement);
            }
            (types, summary)
        };

        {
            let incoming = self.get_mut(replacement)?;
            incoming.parent = Some(parent);
            for event_type in &fan_out {
                incoming.events.subscribe(event_type);
            }
        }

        if carry_children {
            self.exchange_children(old, replacement)?;
        }

        self.get_mut(parent)?.retired.add(summary);
        tracing::debug!(
            parent = %parent,
            old = %old,
            replacement = %replacement,
            carry_children,
            "swapped child"
        );
        Ok(old)
    }

    /// Exchanges the children lists of two nodes and repoints every moved
    /// child at its new parent.
    fn exchange_children(&mut self, a: NodeId, b: NodeId) -> Result<()> {
        let (first, second) = self.pair_mut(a, b)?;
        std::mem::swap(&mut first.children, &mut second.children);
        std::mem::swap(&mut first.text_nodes, &mut second.text_nodes);

        for owner in [a, b] {
            let (kids, fan_out) = {
                let node = self.get_mut(owner)?;
                let kids = node.child_ids();
                let fan_out = node.events.fan_out_types();
                node.events.reset_child_listeners();
                for event_type in &fan_out {
                    for kid in &kids {
                        node.events.add_child_listener(event_type, *kid);
                    }
                }
                (kids, fan_out)
            };
            for kid in kids {
                let child = self.get_mut(kid)?;
                child.parent = Some(owner);
                child.events.take_subscriptions();
                for event_type in &fan_out {
                    child.events.subscribe(event_type);
                }
            }
        }
        Ok(())
    }

    /// Whether a node of `kind` could hold every current child of `donor`.
    fn accepts_children(&self, kind: NodeKind, donor: NodeId) -> Result<bool> {
        if !kind.is_content() {
            return Ok(true);
        }
        let donor = self.get(donor)?;
        for child in donor.children.iter() {
            if self.get(child.id)?.kind != kind {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn pair_mut(&mut self, a: NodeId, b: NodeId) -> Result<(&mut Node, &mut Node)> {
        if a.index() == b.index() {
            return Err(TreeError::InvalidOperation("can not pair a node with itself"));
        }
        self.get(a)?;
        self.get(b)?;

        let (ia, ib) = (a.index() as usize, b.index() as usize);
        let (low, high) = (ia.min(ib), ia.max(ib));
        let (head, tail) = self.slots.split_at_mut(high);
        let low_node = head[low].node.as_mut();
        let high_node = tail[0].node.as_mut();

        match (low_node, high_node) {
            (Some(low_node), Some(high_node)) if ia < ib => Ok((low_node, high_node)),
            (Some(low_node), Some(high_node)) => Ok((high_node, low_node)),
            _ => Err(TreeError::NodeNotFound(a)),
        }
    }

    /// Structural equality of two nodes (see [`Node::matches`]).
    pub fn matches(&self, a: NodeId, b: NodeId) -> Result<bool> {
        Ok(self.get(a)?.matches(self.get(b)?))
    }

    /// Child in physical slot `index`. Positional only when the children
    /// list is balanced.
    pub fn get_child(&self, parent: NodeId, index: usize) -> Result<NodeId> {
        Ok(self.get(parent)?.children.get(index)?.id)
    }

    pub fn first_child(&self, parent: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(parent)?.children.first().map(|child| child.id))
    }

    pub fn last_child(&self, parent: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(parent)?.children.last().map(|child| child.id))
    }

    pub fn next_sibling(&self, node: NodeId) -> Result<Option<NodeId>> {
        let (parent, index) = self.parent_slot(node)?;
        Ok(self
            .get(parent)?
            .children
            .next_of(index)?
            .map(|child| child.id))
    }

    pub fn previous_sibling(&self, node: NodeId) -> Result<Option<NodeId>> {
        let (parent, index) = self.parent_slot(node)?;
        Ok(self
            .get(parent)?
            .children
            .previous_of(index)?
            .map(|child| child.id))
    }

    /// Children in logical order.
    pub fn children(&self, parent: NodeId) -> Result<Vec<NodeId>> {
        Ok(self.get(parent)?.child_ids())
    }

    pub fn child_count(&self, parent: NodeId) -> Result<usize> {
        Ok(self.get(parent)?.children.len())
    }

    /// Restores positional order of `parent`'s children after removals.
    pub fn balance(&mut self, parent: NodeId) -> Result<()> {
        self.get_mut(parent)?.children.sort_list();
        Ok(())
    }

    pub fn summary(&self, id: NodeId) -> Result<RetiredNode> {
        Ok(self.get(id)?.summary(id))
    }

    pub fn retired(&self, id: NodeId) -> Result<&RetiredSet> {
        Ok(&self.get(id)?.retired)
    }

    /// Hands the retired set over to the caller, leaving it empty.
    pub fn take_retired(&mut self, id: NodeId) -> Result<Vec<RetiredNode>> {
        Ok(self.get_mut(id)?.retired.drain())
    }

    /// Clears a node's own state: attributes, events and retired set.
    /// Children and the parent link are kept.
    pub fn reset_node(&mut self, id: NodeId) -> Result<()> {
        let kids = {
            let node = self.get_mut(id)?;
            node.attrs.clear();
            node.retired.clear();
            node.events.reset_own();
            node.child_ids()
        };
        for kid in kids {
            self.get_mut(kid)?.events.take_subscriptions();
        }
        Ok(())
    }

    /// Resets `root` and every descendant, children before parents, calling
    /// `visit` for each node once it is cleared. `root` is detached from its
    /// parent first.
    pub fn reset_tree<F>(&mut self, root: NodeId, mut visit: F) -> Result<()>
    where
        F: FnMut(NodeId),
    {
        if self.get(root)?.parent.is_some() {
            self.detach(root)?;
        }

        for id in self.post_order(root)? {
            let node = self.get_mut(id)?;
            node.attrs.clear();
            node.retired.clear();
            node.events.reset();
            node.text_nodes.clear();
            node.children.clear();
            node.parent = None;
            node.position.reset();
            visit(id);
        }
        Ok(())
    }

    /// Nodes of the subtree under `root`, every child listed before its
    /// parent.
    fn post_order(&self, root: NodeId) -> Result<Vec<NodeId>> {
        let mut stack = vec![root];
        let mut order = Vec::new();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.get(id)?.children.iter().map(|child| child.id));
        }
        order.reverse();
        Ok(order)
    }

    /// Resets the subtree under `root` and frees its slots, along with
    /// every detached subtree retired anywhere inside it. Returns the
    /// number of nodes released.
    pub fn dispose_tree(&mut self, root: NodeId) -> Result<usize> {
        let mut retired = Vec::new();
        for id in self.post_order(root)? {
            let node = self.get_mut(id)?;
            retired.extend(node.retired.drain().into_iter().map(|entry| entry.handle));
        }

        let mut released = Vec::new();
        self.reset_tree(root, |id| released.push(id))?;

        for id in &released {
            let slot = &mut self.slots[id.index() as usize];
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.index());
        }
        self.live -= released.len();
        tracing::debug!(root = %root, released = released.len(), "disposed tree");

        // Retired nodes still attached elsewhere belong to that tree.
        let mut total = released.len();
        for handle in retired {
            if self.get(handle).map_or(false, |node| node.parent.is_none()) {
                total += self.dispose_tree(handle)?;
            }
        }
        Ok(total)
    }

    /// Disposes every subtree in `id`'s retired set. Entries whose handle
    /// is already gone are skipped.
    pub fn dispose_retired(&mut self, id: NodeId) -> Result<usize> {
        let mut released = 0;
        for retired in self.take_retired(id)? {
            if self.contains(retired.handle) {
                released += self.dispose_tree(retired.handle)?;
            }
        }
        Ok(released)
    }

    /// Deep copy of the subtree under `root`. Copies get fresh reference ids
    /// and no parent; handlers are shared with the source.
    pub fn clone_tree(&mut self, root: NodeId) -> Result<NodeId> {
        let (copy, kids) = {
            let source = self.get(root)?;
            let mut node = Node::new(
                source.kind,
                source.name.clone(),
                source.node_id.clone(),
                self.config.child_capacity,
            );
            node.content = source.content.clone();
            node.attrs = source.attrs.clone();
            node.events = source.events.clone_registrations();
            (node, source.child_ids())
        };

        let copy = self.insert(copy);
        for kid in kids {
            let kid_copy = self.clone_tree(kid)?;
            self.append_child(copy, kid_copy)?;
        }
        Ok(copy)
    }
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new()
    }
}
