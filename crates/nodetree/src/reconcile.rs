//! Tree reconciliation
//!
//! Index-paired diff of a new tree against the previous version of the same
//! tree. Nothing is moved or copied: the outcome is bookkeeping, each stale
//! subtree recorded in the retired set of its immediate parent.
//!
//! ```text
//! new:  div ─┬─ p(a)        old:  div ─┬─ p(a)
//!            └─ p(b)                   ├─ span      ← mismatch, retired
//!                                      └─ p(c)      ← no counterpart, retired
//! ```
//!
//! Reordering is not detected as a move. Every position from the first
//! reordered child onward mismatches.

use crate::arena::NodeArena;
use crate::error::Result;
use crate::types::NodeId;

impl NodeArena {
    /// Reconciles `node` against `previous`.
    ///
    /// Returns `true` when the two do not match and `previous` has to be
    /// replaced wholesale. In that case `node`'s parent, if any, records
    /// `previous` in its retired set and nothing below is visited.
    pub fn reconcile(&mut self, node: NodeId, previous: NodeId) -> Result<bool> {
        let needs_swap = self.reconcile_subtree(node, previous)?;
        if needs_swap {
            if let Some(parent) = self.get(node)?.parent {
                let summary = self.summary(previous)?;
                self.get_mut(parent)?.retired.add(summary);
            }
        }
        Ok(needs_swap)
    }

    fn reconcile_subtree(&mut self, node: NodeId, previous: NodeId) -> Result<bool> {
        if node == previous {
            return Ok(false);
        }
        if !self.matches(node, previous)? {
            tracing::debug!(node = %node, previous = %previous, "reconcile mismatch");
            return Ok(true);
        }

        self.balance(node)?;
        self.balance(previous)?;

        let kids = self.children(node)?;
        let old_kids = self.children(previous)?;

        for (index, old_kid) in old_kids.into_iter().enumerate() {
            let stale = match kids.get(index) {
                Some(&kid) => self.reconcile_subtree(kid, old_kid)?,
                None => true,
            };
            if stale {
                let summary = self.summary(old_kid)?;
                self.get_mut(node)?.retired.add(summary);
                tracing::debug!(parent = %node, retired = %old_kid, index, "retired stale child");
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use crate::arena::NodeArena;
    use crate::mount::{attr, Mount, NodeList};
    use crate::types::NodeId;

    fn list(arena: &mut NodeArena, id: &str, items: &[&str]) -> NodeId {
        let kids: Vec<NodeId> = items
            .iter()
            .map(|item| {
                let label = arena.text(*item, []);
                arena.element("li", *item, [Mount::from(label)])
            })
            .collect();
        arena.element("ul", id, [Mount::from(NodeList(kids))])
    }

    fn retired_everywhere(arena: &NodeArena, root: NodeId) -> usize {
        let mut total = arena.retired(root).unwrap().len();
        for kid in arena.children(root).unwrap() {
            total += retired_everywhere(arena, kid);
        }
        total
    }

    #[test]
    fn test_reconcile_against_copy_retires_nothing() {
        let mut arena = NodeArena::new();
        let items = list(&mut arena, "menu", &["a", "b", "c"]);
        let note = arena.comment("nav", []);
        let tree = arena.element(
            "nav",
            "top",
            [attr("class", "main"), Mount::from(note), Mount::from(items)],
        );
        let copy = arena.clone_tree(tree).unwrap();

        assert!(!arena.reconcile(copy, tree).unwrap());
        assert_eq!(retired_everywhere(&arena, copy), 0);
        assert_eq!(retired_everywhere(&arena, tree), 0);
    }

    #[test]
    fn test_changed_text_retires_only_the_text() {
        let mut arena = NodeArena::new();
        let x = arena.text("x", []);
        let old = arena.element("div", "d", [attr("a", 1), Mount::from(x)]);
        let y = arena.text("y", []);
        let new = arena.element("div", "d", [attr("a", 1), Mount::from(y)]);

        assert!(!arena.reconcile(new, old).unwrap());

        let retired = arena.retired(new).unwrap();
        assert_eq!(retired.handles(), vec![x]);
        assert!(!retired.contains(old));
        assert!(arena.retired(old).unwrap().is_empty());
    }

    #[test]
    fn test_mismatched_root_is_reported_to_parent() {
        let mut arena = NodeArena::new();
        let old = arena.element("section", "s", []);
        let new = arena.element("article", "s", []);

        assert!(arena.reconcile(new, old).unwrap());
        assert!(arena.retired(new).unwrap().is_empty());

        let fresh = arena.element("article", "s2", []);
        let host = arena.element("main", "m", [Mount::from(fresh)]);
        assert!(arena.reconcile(fresh, old).unwrap());
        assert!(arena.retired(host).unwrap().contains(old));
    }

    #[test]
    fn test_mismatch_does_not_descend() {
        let mut arena = NodeArena::new();
        let deep = arena.text("deep", []);
        let old = arena.element("div", "d", [attr("v", 1), Mount::from(deep)]);
        let other = arena.text("other", []);
        let new = arena.element("div", "d", [attr("v", 2), Mount::from(other)]);

        assert!(arena.reconcile(new, old).unwrap());
        assert!(arena.retired(new).unwrap().is_empty());
        assert!(arena.retired(old).unwrap().is_empty());
    }

    #[test]
    fn test_missing_counterparts_are_retired() {
        let mut arena = NodeArena::new();
        let old = list(&mut arena, "menu", &["a", "b", "c"]);
        let new = list(&mut arena, "menu", &["a"]);
        let old_kids = arena.children(old).unwrap();

        assert!(!arena.reconcile(new, old).unwrap());
        assert_eq!(arena.retired(new).unwrap().handles(), old_kids[1..].to_vec());
    }

    #[test]
    fn test_reordering_cascades() {
        let mut arena = NodeArena::new();
        let old = list(&mut arena, "menu", &["a", "b", "c"]);
        let new = list(&mut arena, "menu", &["a", "c", "b"]);
        let old_kids = arena.children(old).unwrap();

        assert!(!arena.reconcile(new, old).unwrap());

        // li elements match by name, so the mismatch surfaces in the labels
        let new_kids = arena.children(new).unwrap();
        assert!(arena.retired(new).unwrap().is_empty());
        assert!(arena.retired(new_kids[0]).unwrap().is_empty());
        for index in 1..3 {
            let old_label = arena.first_child(old_kids[index]).unwrap().unwrap();
            assert_eq!(
                arena.retired(new_kids[index]).unwrap().handles(),
                vec![old_label]
            );
        }
    }

    #[test]
    fn test_reconcile_sorts_dirty_lists() {
        let mut arena = NodeArena::new();
        let old = list(&mut arena, "menu", &["gone", "a", "b", "c"]);
        let first = arena.first_child(old).unwrap().unwrap();
        arena.remove(first).unwrap();
        arena.take_retired(old).unwrap();
        assert!(arena.get(old).unwrap().children.is_dirty());

        let new = list(&mut arena, "menu", &["a", "b", "c"]);
        assert!(!arena.reconcile(new, old).unwrap());
        assert_eq!(arena.retired(new).unwrap().len(), 0);
        assert!(!arena.get(old).unwrap().children.is_dirty());
    }
}
