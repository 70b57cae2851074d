//! Declarative tree construction
//!
//! A [`Mount`] is one deferred operation applied to a freshly created node:
//! attach a child, attach a batch of children, set an attribute, register a
//! handler. Constructors run their mounts in order and treat a failing mount
//! as a bug in the tree definition, so they panic instead of returning it.
//!
//! ```text
//! arena.element("ul", "menu", [
//!     attr("class", "nav"),
//!     Mount::from(first_item),
//!     on("click", handler),
//! ])
//! ```

use crate::arena::NodeArena;
use crate::error::Result;
use crate::events::{Event, EventHandler};
use crate::types::{Attr, AttrValue, NodeId, NodeKind};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Name given to documents built with [`NodeArena::document`].
pub const DOCUMENT_NAME: &str = "doc";

/// Id given to every document.
pub const DOCUMENT_ID: &str = "#document";

type MountFn = Box<dyn FnOnce(&mut NodeArena, NodeId) -> Result<()>>;

/// Deferred operation applied to a parent node
pub struct Mount(MountFn);

impl Mount {
    pub fn new<F>(apply: F) -> Self
    where
        F: FnOnce(&mut NodeArena, NodeId) -> Result<()> + 'static,
    {
        Self(Box::new(apply))
    }

    /// Runs the operation against `parent`.
    pub fn apply(self, arena: &mut NodeArena, parent: NodeId) -> Result<()> {
        (self.0)(arena, parent)
    }
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mount(..)")
    }
}

impl From<NodeId> for Mount {
    fn from(kid: NodeId) -> Self {
        Mount::new(move |arena, parent| arena.append_child(parent, kid))
    }
}

/// Children attached in order by a single mount
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeList(pub Vec<NodeId>);

impl From<Vec<NodeId>> for NodeList {
    fn from(nodes: Vec<NodeId>) -> Self {
        Self(nodes)
    }
}

impl From<NodeList> for Mount {
    fn from(list: NodeList) -> Self {
        Mount::new(move |arena, parent| {
            for kid in list.0 {
                arena.append_child(parent, kid)?;
            }
            Ok(())
        })
    }
}

impl From<Attr> for Mount {
    fn from(attr: Attr) -> Self {
        Mount::new(move |arena, parent| arena.set_attr(parent, attr))
    }
}

pub fn attr(key: impl Into<String>, value: impl Into<AttrValue>) -> Mount {
    Mount::from(Attr::new(key, value))
}

/// Registers `handler` on the mounted node.
pub fn on<F>(event_type: impl Into<String>, handler: F) -> Mount
where
    F: Fn(&Event, NodeId) + Send + Sync + 'static,
{
    let event_type = event_type.into();
    let handler: EventHandler = Arc::new(handler);
    Mount::new(move |arena, parent| arena.add_event_listener(parent, &event_type, handler))
}

/// Makes the mounted node fan `event_type` out to its children.
pub fn fan_out(event_type: impl Into<String>) -> Mount {
    let event_type = event_type.into();
    Mount::new(move |arena, parent| arena.fan_out_event(parent, &event_type))
}

/// Short random id for nodes that are not addressed by the caller.
fn generated_id(kind: NodeKind) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", kind.as_str().to_lowercase(), &id[..8])
}

impl NodeArena {
    /// Document root named `doc`, rendered as its children only.
    pub fn document(&mut self, mounts: impl IntoIterator<Item = Mount>) -> NodeId {
        self.document_named(DOCUMENT_NAME, mounts)
    }

    /// Document root with an explicit name. A name equal to the renderer's
    /// root marker is rendered as a wrapping tag.
    pub fn document_named(
        &mut self,
        name: impl Into<String>,
        mounts: impl IntoIterator<Item = Mount>,
    ) -> NodeId {
        let node = self.create_node(NodeKind::Document, name, DOCUMENT_ID);
        self.mount_all(node, mounts);
        node
    }

    pub fn element(
        &mut self,
        name: impl Into<String>,
        node_id: impl Into<String>,
        mounts: impl IntoIterator<Item = Mount>,
    ) -> NodeId {
        let node = self.create_node(NodeKind::Element, name, node_id);
        self.mount_all(node, mounts);
        node
    }

    pub fn text(
        &mut self,
        content: impl Into<String>,
        mounts: impl IntoIterator<Item = Mount>,
    ) -> NodeId {
        self.content_node(NodeKind::Text, content.into(), mounts)
    }

    pub fn comment(
        &mut self,
        content: impl Into<String>,
        mounts: impl IntoIterator<Item = Mount>,
    ) -> NodeId {
        self.content_node(NodeKind::Comment, content.into(), mounts)
    }

    fn content_node(
        &mut self,
        kind: NodeKind,
        content: String,
        mounts: impl IntoIterator<Item = Mount>,
    ) -> NodeId {
        let node = self.create_node(kind, kind.as_str(), generated_id(kind));
        if let Ok(created) = self.get_mut(node) {
            created.content = Some(content);
        }
        self.mount_all(node, mounts);
        node
    }

    /// # Panics
    ///
    /// Panics on the first mount that fails.
    fn mount_all(&mut self, node: NodeId, mounts: impl IntoIterator<Item = Mount>) {
        for mount in mounts {
            if let Err(err) = mount.apply(self, node) {
                panic!("failed to mount into {}: {}", node, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TreeError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_constructors_set_identity() {
        let mut arena = NodeArena::new();
        let doc = arena.document([]);
        let html = arena.document_named("html", []);
        let text = arena.text("hi", []);
        let note = arena.comment("later", []);

        let node = arena.get(doc).unwrap();
        assert_eq!(node.kind(), NodeKind::Document);
        assert_eq!(node.name(), "doc");
        assert_eq!(node.node_id(), "#document");
        let node = arena.get(html).unwrap();
        assert_eq!(node.name(), "html");
        assert_eq!(node.node_id(), "#document");

        let node = arena.get(text).unwrap();
        assert_eq!(node.kind(), NodeKind::Text);
        assert_eq!(node.name(), "Text");
        assert_eq!(node.text(), "hi");
        assert!(node.node_id().starts_with("text-"));

        let node = arena.get(note).unwrap();
        assert_eq!(node.name(), "Comment");
        assert_eq!(node.content(), Some("later"));
    }

    #[test]
    fn test_generated_ids_differ() {
        let mut arena = NodeArena::new();
        let a = arena.text("same", []);
        let b = arena.text("same", []);
        assert_ne!(
            arena.get(a).unwrap().node_id(),
            arena.get(b).unwrap().node_id()
        );
    }

    #[test]
    fn test_mounts_run_in_order() {
        let mut arena = NodeArena::new();
        let a = arena.element("li", "a", []);
        let b = arena.element("li", "b", []);
        let c = arena.element("li", "c", []);
        let ul = arena.element(
            "ul",
            "list",
            [
                attr("class", "nav"),
                Mount::from(a),
                Mount::from(NodeList(vec![b, c])),
                attr("class", "menu"),
            ],
        );

        assert_eq!(arena.children(ul).unwrap(), vec![a, b, c]);
        assert_eq!(
            arena.attr(ul, "class").unwrap(),
            Some(&AttrValue::from("menu"))
        );
        assert_eq!(arena.get(ul).unwrap().attrs().len(), 1);
    }

    #[test]
    fn test_custom_mount() {
        let mut arena = NodeArena::new();
        let div = arena.element(
            "div",
            "d",
            [Mount::new(|arena, parent| {
                let kid = arena.text("made inside", []);
                arena.append_child(parent, kid)
            })],
        );

        let kid = arena.first_child(div).unwrap().unwrap();
        assert_eq!(arena.get(kid).unwrap().text(), "made inside");
    }

    #[test]
    fn test_on_and_fan_out_mounts() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let mut arena = NodeArena::new();
        let button = arena.element(
            "button",
            "b",
            [on("click", move |_event, _node| {
                counter.fetch_add(1, Ordering::SeqCst);
            })],
        );
        let form = arena.element("form", "f", [fan_out("click"), Mount::from(button)]);

        assert_eq!(
            arena.get(form).unwrap().events().child_listeners("click"),
            vec![button]
        );
        arena.dispatch(form, &Event::new("click").stopped()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_mount_is_reported() {
        let mut arena = NodeArena::new();
        let div = arena.element("div", "d", []);
        let result = attr("", 1).apply(&mut arena, div);
        assert!(matches!(result, Err(TreeError::ValueCannotBeNil(_))));
    }

    #[test]
    #[should_panic(expected = "failed to mount")]
    fn test_constructor_panics_on_mount_failure() {
        let mut arena = NodeArena::new();
        let element = arena.element("b", "b", []);
        arena.text("words", [Mount::from(element)]);
    }
}
