//! Visible-set computation and diffing.
//!
//! The engine owns the set of nodes a hierarchical view currently shows. Each
//! recompute walks the whole tree once, post-order, and compares the result
//! with the previous set. The events it returns are ordered so that an
//! observer mirroring them never sees a child before its parent is added, or
//! a parent removed before its children.

use std::cmp::Reverse;
use std::collections::HashSet;

use crate::node::NodeId;
use crate::tree::Tree;

/// Separator used when matching the filter against a full path.
pub const PATH_SEPARATOR: &str = "/";

/// One change to the visible hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEvent {
    /// `node` became visible under `parent` (`None` for roots).
    Added {
        parent: Option<NodeId>,
        node: NodeId,
    },
    /// `node` left the view.
    Removed {
        parent: Option<NodeId>,
        node: NodeId,
    },
    /// The row for `node` must be redrawn.
    Changed(NodeId),
    /// Everything was dropped.
    Cleared,
}

impl ViewEvent {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::Added { node, .. } | Self::Removed { node, .. } => Some(*node),
            Self::Changed(node) => Some(*node),
            Self::Cleared => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VisibilityEngine {
    /// Trimmed and lower-cased.
    filter: String,
    show_failures_only: bool,
    visible: HashSet<NodeId>,
}

impl VisibilityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Store a new filter. Returns `false` when the normalised text equals the
    /// current one, in which case nothing needs recomputing.
    pub fn set_filter(&mut self, text: &str) -> bool {
        let normalized = normalize_filter(text);
        if normalized == self.filter {
            return false;
        }
        self.filter = normalized;
        true
    }

    pub fn show_failures_only(&self) -> bool {
        self.show_failures_only
    }

    /// Returns `false` when the flag already had this value.
    pub fn set_show_failures_only(&mut self, enabled: bool) -> bool {
        if enabled == self.show_failures_only {
            return false;
        }
        self.show_failures_only = enabled;
        true
    }

    /// True when either the text filter or the failures-only flag is active.
    pub fn is_filtering(&self) -> bool {
        !self.filter.is_empty() || self.show_failures_only
    }

    pub fn is_visible(&self, id: NodeId) -> bool {
        self.visible.contains(&id)
    }

    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }

    /// Leaf-name highlight: the filter is a substring of the node's own name.
    pub fn matches_highlight(&self, name: &str) -> bool {
        !self.filter.is_empty() && name.to_lowercase().contains(&self.filter)
    }

    /// Evaluate visibility of a single node against the current filters,
    /// without touching the stored set.
    pub fn should_be_visible(&self, tree: &Tree, id: NodeId) -> bool {
        if tree.node(id).is_none() {
            return false;
        }
        let prefix = match tree.node(id).and_then(|n| n.parent()) {
            Some(parent) => tree.full_path(parent, PATH_SEPARATOR).to_lowercase(),
            None => String::new(),
        };
        let mut scratch = HashSet::new();
        self.visit(tree, id, &prefix, &mut scratch)
    }

    /// The set of nodes that should be shown right now.
    pub fn compute_visible(&self, tree: &Tree) -> HashSet<NodeId> {
        let mut out = HashSet::new();
        for &root in tree.roots() {
            self.visit(tree, root, "", &mut out);
        }
        out
    }

    /// Recompute the visible set and return the events that move an observer
    /// from the previous set to the new one.
    ///
    /// Events come out as removals (deepest first), then additions
    /// (shallowest first), then changes. `value_changed` and every node of
    /// `force_refresh` get a change event if still visible and not just
    /// added; `refresh_all` extends that to every visible node.
    pub fn recompute_and_diff(
        &mut self,
        tree: &Tree,
        value_changed: Option<NodeId>,
        force_refresh: &[NodeId],
        refresh_all: bool,
    ) -> Vec<ViewEvent> {
        let next = self.compute_visible(tree);
        let mut events = Vec::new();

        let mut removed: Vec<(usize, NodeId)> = self
            .visible
            .iter()
            .filter(|id| !next.contains(id))
            .map(|&id| (tree.depth(id), id))
            .collect();
        removed.sort_by_key(|&(depth, id)| (Reverse(depth), id));
        for (_, id) in removed {
            events.push(ViewEvent::Removed {
                parent: tree.node(id).and_then(|n| n.parent()),
                node: id,
            });
        }

        // Pre-order already puts parents first; the stable sort groups by depth.
        let mut added: Vec<(usize, NodeId)> = tree
            .preorder()
            .into_iter()
            .filter(|id| next.contains(id) && !self.visible.contains(id))
            .map(|id| (tree.depth(id), id))
            .collect();
        added.sort_by_key(|&(depth, _)| depth);

        let mut covered: HashSet<NodeId> = HashSet::with_capacity(added.len());
        for &(_, id) in &added {
            covered.insert(id);
            events.push(ViewEvent::Added {
                parent: tree.node(id).and_then(|n| n.parent()),
                node: id,
            });
        }

        let mut touch = |id: NodeId, events: &mut Vec<ViewEvent>| {
            if next.contains(&id) && covered.insert(id) {
                events.push(ViewEvent::Changed(id));
            }
        };
        if let Some(id) = value_changed {
            touch(id, &mut events);
        }
        for &id in force_refresh {
            touch(id, &mut events);
        }
        if refresh_all {
            for id in tree.preorder() {
                touch(id, &mut events);
            }
        }

        log::debug!(
            "visibility recompute: {} -> {} visible, {} event(s)",
            self.visible.len(),
            next.len(),
            events.len()
        );
        self.visible = next;
        events
    }

    /// Record `id` as shown without a recompute. Used by callers that have
    /// already proven the node is visible under the current filters.
    pub(crate) fn mark_visible(&mut self, id: NodeId) {
        self.visible.insert(id);
    }

    pub fn clear(&mut self) {
        self.visible.clear();
    }

    /// Post-order visit. `parent_path` is the lower-cased full path of the
    /// parent, or empty for roots.
    fn visit(
        &self,
        tree: &Tree,
        id: NodeId,
        parent_path: &str,
        out: &mut HashSet<NodeId>,
    ) -> bool {
        let Some(node) = tree.node(id) else {
            return false;
        };
        let lowered = node.name().to_lowercase();
        let full_path = if parent_path.is_empty() {
            lowered
        } else {
            format!("{parent_path}{PATH_SEPARATOR}{lowered}")
        };

        let mut child_visible = false;
        for &child in node.children() {
            // No short-circuit: every visible descendant must land in `out`.
            child_visible |= self.visit(tree, child, &full_path, out);
        }

        let visible = if self.show_failures_only && !node.is_failed() && !child_visible {
            false
        } else if self.filter.is_empty() {
            true
        } else {
            full_path.contains(&self.filter) || child_visible
        };

        if visible {
            out.insert(id);
        }
        visible
    }
}

pub(crate) fn normalize_filter(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn insert(tree: &mut Tree, path: &[&str], value: f64, failed: bool) -> NodeId {
        let id = tree.find_or_create_path(path).unwrap().node;
        tree.node_mut(id)
            .unwrap()
            .set_value(Value::from(value), None, None, failed, None);
        id
    }

    fn sample_tree() -> Tree {
        let mut tree = Tree::new();
        insert(&mut tree, &["A", "B", "C"], 1.0, false);
        insert(&mut tree, &["A", "D"], 2.0, false);
        insert(&mut tree, &["E"], 3.0, false);
        tree
    }

    #[test]
    fn test_no_filter_shows_everything() {
        let tree = sample_tree();
        let engine = VisibilityEngine::new();
        assert_eq!(engine.compute_visible(&tree).len(), tree.len());
    }

    #[test]
    fn test_filter_pulls_in_ancestors() {
        let tree = sample_tree();
        let mut engine = VisibilityEngine::new();
        engine.set_filter("c");
        let a = tree.find_node_by_path(&["A"]).unwrap().unwrap();
        let b = tree.find_node_by_path(&["A", "B"]).unwrap().unwrap();
        let c = tree.find_node_by_path(&["A", "B", "C"]).unwrap().unwrap();
        let d = tree.find_node_by_path(&["A", "D"]).unwrap().unwrap();
        assert!(engine.should_be_visible(&tree, a));
        assert!(engine.should_be_visible(&tree, b));
        assert!(engine.should_be_visible(&tree, c));
        assert!(!engine.should_be_visible(&tree, d));
    }

    #[test]
    fn test_filter_matches_full_path_case_insensitively() {
        let tree = sample_tree();
        let mut engine = VisibilityEngine::new();
        engine.set_filter("  a/B ");
        assert_eq!(engine.filter(), "a/b");
        let visible = engine.compute_visible(&tree);
        let c = tree.find_node_by_path(&["A", "B", "C"]).unwrap().unwrap();
        let e = tree.find_node_by_path(&["E"]).unwrap().unwrap();
        assert!(visible.contains(&c));
        assert!(!visible.contains(&e));
    }

    #[test]
    fn test_failures_only_keeps_failed_chain() {
        let mut tree = sample_tree();
        let c = insert(&mut tree, &["A", "B", "C"], 9.0, true);
        let mut engine = VisibilityEngine::new();
        engine.set_show_failures_only(true);
        let visible = engine.compute_visible(&tree);
        assert_eq!(visible.len(), 3);
        assert!(visible.contains(&c));
    }

    #[test]
    fn test_node_without_value_is_never_failed() {
        let mut tree = Tree::new();
        tree.find_or_create_path(&["Empty"]).unwrap();
        let mut engine = VisibilityEngine::new();
        engine.set_show_failures_only(true);
        assert!(engine.compute_visible(&tree).is_empty());
    }

    #[test]
    fn test_unchanged_filter_reports_no_change() {
        let mut engine = VisibilityEngine::new();
        assert!(engine.set_filter("Temp"));
        assert!(!engine.set_filter(" temp "));
        assert!(!engine.set_show_failures_only(false));
        assert!(engine.set_show_failures_only(true));
    }

    #[test]
    fn test_first_recompute_adds_shallowest_first() {
        let tree = sample_tree();
        let mut engine = VisibilityEngine::new();
        let events = engine.recompute_and_diff(&tree, None, &[], false);
        assert_eq!(events.len(), tree.len());
        let depths: Vec<usize> = events
            .iter()
            .map(|e| tree.depth(e.node().unwrap()))
            .collect();
        let mut sorted = depths.clone();
        sorted.sort();
        assert_eq!(depths, sorted);
    }

    #[test]
    fn test_removal_is_deepest_first() {
        let tree = sample_tree();
        let mut engine = VisibilityEngine::new();
        engine.recompute_and_diff(&tree, None, &[], false);
        engine.set_filter("e");
        let events = engine.recompute_and_diff(&tree, None, &[], true);

        let removed: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ViewEvent::Removed { node, .. } => Some(tree.depth(*node)),
                _ => None,
            })
            .collect();
        assert_eq!(removed, vec![2, 1, 1, 0]);
        // E stays and is refreshed.
        let e = tree.find_node_by_path(&["E"]).unwrap().unwrap();
        assert_eq!(events.last(), Some(&ViewEvent::Changed(e)));
    }

    #[test]
    fn test_changed_not_emitted_for_new_rows() {
        let tree = sample_tree();
        let mut engine = VisibilityEngine::new();
        let c = tree.find_node_by_path(&["A", "B", "C"]).unwrap().unwrap();
        let events = engine.recompute_and_diff(&tree, Some(c), &[c], true);
        assert!(!events.iter().any(|e| matches!(e, ViewEvent::Changed(_))));

        let again = engine.recompute_and_diff(&tree, Some(c), &[], false);
        assert_eq!(again, vec![ViewEvent::Changed(c)]);
    }

    #[test]
    fn test_highlight_uses_leaf_name() {
        let mut engine = VisibilityEngine::new();
        assert!(!engine.matches_highlight("Temp"));
        engine.set_filter("emp");
        assert!(engine.matches_highlight("Temperature"));
        engine.set_filter("cpu/temp");
        assert!(!engine.matches_highlight("Temperature"));
    }
}
