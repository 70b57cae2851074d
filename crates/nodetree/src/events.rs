//! Per-node event registrations
//!
//! Design: each node owns its handlers, the event types it fans out to its
//! children, and the children cross-registered under it. Subscription state
//! is rebuilt on attach/detach by the arena, never patched from outside.
//! Bubbling itself lives in [`crate::NodeArena::dispatch`].

use crate::arena::NodeArena;
use crate::error::{Result, TreeError};
use crate::types::NodeId;
use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Event callback. Receives the event and the node whose registration fired.
pub type EventHandler = Arc<dyn Fn(&Event, NodeId) + Send + Sync>;

/// Event descriptor passed through a dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub event_type: String,
    /// Node the dispatch started from; filled in by the arena when unset.
    pub target: Option<NodeId>,
    pub stop_propagation: bool,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            target: None,
            stop_propagation: false,
        }
    }

    /// Keep the event at the dispatching node and its cross-registered
    /// children.
    pub fn stopped(mut self) -> Self {
        self.stop_propagation = true;
        self
    }
}

#[derive(Clone, Default)]
pub struct EventRegistry {
    handlers: SmallVec<[(String, SmallVec<[EventHandler; 2]>); 2]>,
    fan_out: AHashSet<String>,
    child_listeners: AHashMap<String, AHashSet<NodeId>>,
    subscriptions: AHashSet<String>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, event_type: &str, handler: EventHandler) {
        match self.handlers.iter_mut().find(|(kind, _)| kind == event_type) {
            Some((_, handlers)) => handlers.push(handler),
            None => {
                let mut handlers = SmallVec::new();
                handlers.push(handler);
                self.handlers.push((event_type.to_string(), handlers));
            }
        }
    }

    /// Drops every handler for `event_type`, returning how many there were.
    pub fn remove_handlers(&mut self, event_type: &str) -> usize {
        match self.handlers.iter().position(|(kind, _)| kind == event_type) {
            Some(position) => self.handlers.remove(position).1.len(),
            None => 0,
        }
    }

    pub fn handlers(&self, event_type: &str) -> &[EventHandler] {
        self.handlers
            .iter()
            .find(|(kind, _)| kind == event_type)
            .map(|(_, handlers)| handlers.as_slice())
            .unwrap_or(&[])
    }

    /// Event types with at least one handler, in registration order.
    pub fn active_types(&self) -> impl Iterator<Item = &str> {
        self.handlers
            .iter()
            .filter(|(_, handlers)| !handlers.is_empty())
            .map(|(kind, _)| kind.as_str())
    }

    /// Runs this node's own handlers for the event.
    pub fn emit(&self, event: &Event, node: NodeId) -> usize {
        let handlers = self.handlers(&event.event_type);
        for handler in handlers {
            handler(event, node);
        }
        handlers.len()
    }

    pub fn add_fan_out(&mut self, event_type: &str) -> bool {
        self.fan_out.insert(event_type.to_string())
    }

    pub fn fans_out(&self, event_type: &str) -> bool {
        self.fan_out.contains(event_type)
    }

    pub fn fan_out_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.fan_out.iter().cloned().collect();
        types.sort();
        types
    }

    pub fn add_child_listener(&mut self, event_type: &str, child: NodeId) {
        self.child_listeners
            .entry(event_type.to_string())
            .or_default()
            .insert(child);
    }

    pub fn remove_child_listener(&mut self, event_type: &str, child: NodeId) {
        if let Some(children) = self.child_listeners.get_mut(event_type) {
            children.remove(&child);
        }
    }

    /// Children cross-registered for `event_type`, in handle order.
    pub fn child_listeners(&self, event_type: &str) -> Vec<NodeId> {
        let mut children: Vec<NodeId> = self
            .child_listeners
            .get(event_type)
            .map(|children| children.iter().copied().collect())
            .unwrap_or_default();
        children.sort();
        children
    }

    pub(crate) fn subscribe(&mut self, event_type: &str) {
        self.subscriptions.insert(event_type.to_string());
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.iter().map(String::as_str)
    }

    pub(crate) fn take_subscriptions(&mut self) -> Vec<String> {
        self.subscriptions.drain().collect()
    }

    pub(crate) fn reset_child_listeners(&mut self) {
        self.child_listeners.clear();
    }

    /// Clears everything except the node's own cross-subscriptions, which
    /// belong to its parent's fan-out.
    pub(crate) fn reset_own(&mut self) {
        self.handlers.clear();
        self.fan_out.clear();
        self.child_listeners.clear();
    }

    /// Handlers and fan-out types, without any child or parent bookkeeping.
    pub(crate) fn clone_registrations(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
            fan_out: self.fan_out.clone(),
            ..Self::default()
        }
    }

    pub fn reset(&mut self) {
        self.handlers.clear();
        self.fan_out.clear();
        self.child_listeners.clear();
        self.subscriptions.clear();
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("active", &self.active_types().collect::<Vec<_>>())
            .field("fan_out", &self.fan_out)
            .field("child_listeners", &self.child_listeners)
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

impl NodeArena {
    pub fn add_event_listener(
        &mut self,
        node: NodeId,
        event_type: &str,
        handler: EventHandler,
    ) -> Result<()> {
        if event_type.is_empty() {
            return Err(TreeError::ValueCannotBeNil("event type"));
        }
        self.get_mut(node)?.events.add_handler(event_type, handler);
        Ok(())
    }

    pub fn remove_event_listeners(&mut self, node: NodeId, event_type: &str) -> Result<usize> {
        Ok(self.get_mut(node)?.events.remove_handlers(event_type))
    }

    /// Cross-registers `node`'s current and future children for
    /// `event_type`, so a dispatch on `node` also reaches them.
    pub fn fan_out_event(&mut self, node: NodeId, event_type: &str) -> Result<()> {
        if event_type.is_empty() {
            return Err(TreeError::ValueCannotBeNil("event type"));
        }

        let kids = self.children(node)?;
        let owner = self.get_mut(node)?;
        if !owner.events.add_fan_out(event_type) {
            return Ok(());
        }
        for kid in &kids {
            owner.events.add_child_listener(event_type, *kid);
        }
        for kid in kids {
            self.get_mut(kid)?.events.subscribe(event_type);
        }
        Ok(())
    }

    /// Delivers `event` to `node`, its cross-registered children, then each
    /// ancestor in turn until the root or until the event stops
    /// propagation.
    ///
    /// Fan-out during bubbling skips the child the event came up from, so
    /// each node's handlers run at most once per dispatch.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, node: NodeId, event: &Event) -> Result<usize> {
        let mut event = event.clone();
        if event.target.is_none() {
            event.target = Some(node);
        }

        let mut fired = 0;
        let mut from = None;
        let mut current = Some(node);
        while let Some(id) = current {
            let target = self.get(id)?;
            fired += target.events.emit(&event, id);

            for kid in target.events.child_listeners(&event.event_type) {
                if Some(kid) == from {
                    continue;
                }
                fired += self.get(kid)?.events.emit(&event, kid);
            }

            if event.stop_propagation {
                break;
            }
            from = Some(id);
            current = target.parent;
        }

        tracing::trace!(node = %node, event = %event.event_type, fired, "dispatched event");
        Ok(fired)
    }
}
