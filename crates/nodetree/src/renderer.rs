//! Markup renderer
//!
//! Depth-first, single pass, read-only. Dispatch is an exhaustive match on
//! [`NodeKind`]:
//! - Document: wrapping `<html>` tag when named after the root marker,
//!   otherwise children only
//! - Element: `<name attrs events>children</name>`
//! - Text: raw content
//! - Comment: `<!-- content -->`
//!
//! Children of text and comment nodes are never rendered.

use crate::arena::{Node, NodeArena};
use crate::error::Result;
use crate::types::{Attr, NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use std::io;

const COMMENT_BEGIN: &str = "<!-- ";
const COMMENT_END: &str = " -->";

/// Encoder for one attribute-like entry of an opening tag.
///
/// Implementations write their own leading space, so an element without
/// entries renders as a bare `<name>`.
pub trait AttrEncode {
    fn encode_attr(&self, out: &mut dyn fmt::Write) -> fmt::Result;
}

impl AttrEncode for Attr {
    fn encode_attr(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, " {}=\"", self.key)?;
        escape_into(out, &self.value.to_string())?;
        out.write_char('"')
    }
}

/// Marker emitted for an event type a node handles: `data-event-<type>`
/// pointing at the node id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAttr<'a> {
    pub event_type: &'a str,
    pub node_id: &'a str,
}

impl AttrEncode for EventAttr<'_> {
    fn encode_attr(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, " data-event-{}=\"", self.event_type)?;
        escape_into(out, self.node_id)?;
        out.write_char('"')
    }
}

fn escape_into(out: &mut dyn fmt::Write, value: &str) -> fmt::Result {
    for ch in value.chars() {
        match ch {
            '&' => out.write_str("&amp;")?,
            '<' => out.write_str("&lt;")?,
            '"' => out.write_str("&quot;")?,
            other => out.write_char(other)?,
        }
    }
    Ok(())
}

/// Renderer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Document name rendered as a wrapping tag.
    pub root_marker: String,
    /// Spaces per depth level. `None` renders everything on one line.
    pub indent: Option<usize>,
    /// Emit `data-event-*` markers for active event types.
    pub render_events: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            root_marker: "html".to_string(),
            indent: None,
            render_events: true,
        }
    }
}

/// Tree to markup renderer
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    config: RenderConfig,
}

impl Renderer {
    pub fn new() -> Self {
        Self::with_config(RenderConfig::default())
    }

    pub fn with_config(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn render(&self, arena: &NodeArena, node: NodeId) -> Result<String> {
        let mut output = String::with_capacity(256);
        self.render_to(arena, node, &mut output)?;
        Ok(output)
    }

    pub fn render_to(&self, arena: &NodeArena, node: NodeId, out: &mut dyn fmt::Write) -> Result<()> {
        self.render_node(arena, node, 0, out)
    }

    fn render_node(
        &self,
        arena: &NodeArena,
        id: NodeId,
        depth: usize,
        out: &mut dyn fmt::Write,
    ) -> Result<()> {
        let node = arena.get(id)?;

        match node.kind() {
            NodeKind::Document if node.name() == self.config.root_marker => {
                self.render_tag(arena, node, &self.config.root_marker, depth, out)?;
            }
            NodeKind::Document => self.render_children(arena, node, depth, out)?,
            NodeKind::Element => self.render_tag(arena, node, node.name(), depth, out)?,
            NodeKind::Text => {
                if let Some(content) = node.content().filter(|content| !content.is_empty()) {
                    self.pad(depth, out)?;
                    out.write_str(content)?;
                    self.line_end(out)?;
                }
            }
            NodeKind::Comment => {
                if let Some(content) = node.content() {
                    self.pad(depth, out)?;
                    out.write_str(COMMENT_BEGIN)?;
                    out.write_str(content)?;
                    out.write_str(COMMENT_END)?;
                    self.line_end(out)?;
                }
            }
        }
        Ok(())
    }

    fn render_tag(
        &self,
        arena: &NodeArena,
        node: &Node,
        tag: &str,
        depth: usize,
        out: &mut dyn fmt::Write,
    ) -> Result<()> {
        self.pad(depth, out)?;
        write!(out, "<{}", tag)?;
        for attr in node.attrs().iter() {
            attr.encode_attr(out)?;
        }
        if self.config.render_events {
            for event_type in node.events().active_types() {
                EventAttr {
                    event_type,
                    node_id: node.node_id(),
                }
                .encode_attr(out)?;
            }
        }
        out.write_char('>')?;
        self.line_end(out)?;

        self.render_children(arena, node, depth + 1, out)?;

        self.pad(depth, out)?;
        write!(out, "</{}>", tag)?;
        self.line_end(out)?;
        Ok(())
    }

    fn render_children(
        &self,
        arena: &NodeArena,
        node: &Node,
        depth: usize,
        out: &mut dyn fmt::Write,
    ) -> Result<()> {
        for child in node.children.iter() {
            self.render_node(arena, child.id, depth, out)?;
        }
        Ok(())
    }

    fn pad(&self, depth: usize, out: &mut dyn fmt::Write) -> fmt::Result {
        if let Some(width) = self.config.indent {
            for _ in 0..depth * width {
                out.write_char(' ')?;
            }
        }
        Ok(())
    }

    fn line_end(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        if self.config.indent.is_some() {
            out.write_char('\n')?;
        }
        Ok(())
    }
}

impl NodeArena {
    /// Renders the subtree under `node` with the default configuration.
    pub fn render_node(&self, node: NodeId) -> Result<String> {
        Renderer::new().render(self, node)
    }

    pub fn render_node_to(&self, node: NodeId, sink: &mut dyn fmt::Write) -> Result<()> {
        Renderer::new().render_to(self, node, sink)
    }

    /// Renders into a byte sink. Nothing is written if rendering fails.
    pub fn render_node_io<W: io::Write>(&self, node: NodeId, mut writer: W) -> Result<()> {
        let markup = self.render_node(node)?;
        writer.write_all(markup.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::{attr, on, Mount, NodeList};

    #[test]
    fn test_paragraph_renders_exactly() {
        let mut arena = NodeArena::new();
        let hello = arena.text("hello", []);
        let p = arena.element("p", "p1", [Mount::from(hello)]);

        assert_eq!(arena.render_node(p).unwrap(), "<p>hello</p>");
    }

    #[test]
    fn test_document_renders_children_only() {
        let mut arena = NodeArena::new();
        let a = arena.element("a", "a", []);
        let b = arena.element("b", "b", []);
        let doc = arena.document([Mount::from(NodeList(vec![a, b]))]);

        assert_eq!(arena.render_node(doc).unwrap(), "<a></a><b></b>");
    }

    #[test]
    fn test_root_marker_document() {
        let mut arena = NodeArena::new();
        let body = arena.element("body", "body", []);
        let doc = arena.document_named("html", [attr("lang", "en"), Mount::from(body)]);

        assert_eq!(
            arena.render_node(doc).unwrap(),
            "<html lang=\"en\"><body></body></html>"
        );

        let renderer = Renderer::with_config(RenderConfig {
            root_marker: "page".to_string(),
            ..RenderConfig::default()
        });
        assert_eq!(renderer.render(&arena, doc).unwrap(), "<body></body>");
    }

    #[test]
    fn test_comments() {
        let mut arena = NodeArena::new();
        let inner = arena.comment("second", []);
        let note = arena.comment("first", [Mount::from(inner)]);
        let empty = arena.comment("", []);
        let div = arena.element("div", "d", [Mount::from(note), Mount::from(empty)]);

        assert_eq!(
            arena.render_node(div).unwrap(),
            "<div><!-- first --><!--  --></div>"
        );
    }

    #[test]
    fn test_text_children_are_not_rendered() {
        let mut arena = NodeArena::new();
        let world = arena.text("world", []);
        let hello = arena.text("hello", [Mount::from(world)]);
        let p = arena.element("p", "p", [Mount::from(hello)]);

        assert_eq!(arena.render_node(p).unwrap(), "<p>hello</p>");
    }

    #[test]
    fn test_comment_without_content_is_skipped() {
        let mut arena = NodeArena::new();
        let bare = arena.create_node(NodeKind::Comment, "Comment", "c1");
        let div = arena.element("div", "d", [Mount::from(bare)]);

        assert_eq!(arena.render_node(div).unwrap(), "<div></div>");
    }

    #[test]
    fn test_attributes_in_insertion_order_and_escaped() {
        let mut arena = NodeArena::new();
        let div = arena.element(
            "div",
            "d",
            [
                attr("title", "a \"quoted\" <b> & c"),
                attr("tabindex", 2),
                attr("hidden", true),
            ],
        );

        assert_eq!(
            arena.render_node(div).unwrap(),
            "<div title=\"a &quot;quoted&quot; &lt;b> &amp; c\" tabindex=\"2\" hidden=\"true\"></div>"
        );
    }

    #[test]
    fn test_event_markers() {
        let mut arena = NodeArena::new();
        let button = arena.element(
            "button",
            "save",
            [attr("type", "submit"), on("click", |_event, _node| {})],
        );

        assert_eq!(
            arena.render_node(button).unwrap(),
            "<button type=\"submit\" data-event-click=\"save\"></button>"
        );

        let quiet = Renderer::with_config(RenderConfig {
            render_events: false,
            ..RenderConfig::default()
        });
        assert_eq!(
            quiet.render(&arena, button).unwrap(),
            "<button type=\"submit\"></button>"
        );
    }

    #[test]
    fn test_indented_output() {
        let mut arena = NodeArena::new();
        let hello = arena.text("hello", []);
        let p = arena.element("p", "p", [Mount::from(hello)]);
        let div = arena.element("div", "d", [Mount::from(p)]);

        let renderer = Renderer::with_config(RenderConfig {
            indent: Some(2),
            ..RenderConfig::default()
        });
        assert_eq!(
            renderer.render(&arena, div).unwrap(),
            "<div>\n  <p>\n    hello\n  </p>\n</div>\n"
        );
    }

    #[test]
    fn test_render_follows_logical_order_of_dirty_list() {
        let mut arena = NodeArena::new();
        let items: Vec<NodeId> = (0..4)
            .map(|i| arena.element("li", format!("li{}", i), []))
            .collect();
        let ul = arena.element("ul", "u", [Mount::from(NodeList(items.clone()))]);
        arena.remove(items[0]).unwrap();

        assert_eq!(
            arena.render_node(ul).unwrap(),
            "<ul><li></li><li></li><li></li></ul>"
        );
        let last = arena.last_child(ul).unwrap().unwrap();
        assert_eq!(last, items[3]);
    }

    #[test]
    fn test_render_to_sinks() {
        let mut arena = NodeArena::new();
        let text = arena.text("a < b", []);
        let span = arena.element("span", "s", [Mount::from(text)]);

        let mut buffer = String::from("> ");
        arena.render_node_to(span, &mut buffer).unwrap();
        assert_eq!(buffer, "> <span>a < b</span>");

        let mut bytes = Vec::new();
        arena.render_node_io(span, &mut bytes).unwrap();
        assert_eq!(bytes, b"<span>a < b</span>");
    }

    #[test]
    fn test_config_serializes() {
        let config = RenderConfig {
            indent: Some(4),
            ..RenderConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: RenderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
        assert_eq!(back.root_marker, "html");
    }

    #[test]
    fn test_rendering_stale_handle_fails() {
        let mut arena = NodeArena::new();
        let p = arena.element("p", "p", []);
        arena.dispose_tree(p).unwrap();
        assert!(arena.render_node(p).is_err());
    }
}
