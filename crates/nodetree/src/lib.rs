//! Node tree library
//!
//! Mutable trees of document, element, text and comment nodes with
//! declarative construction, structural mutation, reconciliation against a
//! previous version and markup rendering.
//!
//! ## Philosophy
//!
//! - **Data structures first**: one arena, small `Copy` handles, no pointers
//! - **No special cases**: a closed node enum, every dispatch is a `match`
//! - **Cheap removal**: children live in a slot-reusing list that keeps
//!   logical order in per-entry links and re-sorts lazily
//!
//! ## Core Design
//!
//! ```text
//! Mount ops → NodeArena (Vec<Slot>) → reconcile(new, old) → RetiredSet
//!                 ↓                            ↓
//!          NodeId {index, gen}          Renderer → markup
//! ```

pub mod arena;
pub mod error;
pub mod events;
pub mod list;
pub mod mount;
pub mod reconcile;
pub mod renderer;
pub mod types;

pub use arena::{ArenaConfig, Node, NodeArena};
pub use error::{Result, TreeError};
pub use events::{Event, EventHandler, EventRegistry};
pub use list::{Linked, Links, OrderedList};
pub use mount::{attr, fan_out, on, Mount, NodeList};
pub use renderer::{AttrEncode, EventAttr, RenderConfig, Renderer};
pub use types::*;
