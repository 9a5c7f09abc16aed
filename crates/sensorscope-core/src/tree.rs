//! Path-indexed node arena.
//!
//! Nodes are created lazily, the first time a path segment is seen, and are
//! never removed one by one; [`Tree::clear`] drops everything at once. Roots
//! and children keep first-seen order, which is also display order.

use crate::error::{ModelError, Result};
use crate::node::{DEFAULT_HISTORY_LIMIT, Node, NodeId};

/// A parent→child link created while resolving a path.
///
/// `parent` is `None` when the created node is a root. `parent_was_leaf`
/// tells observers that a former leaf has just become a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedEdge {
    pub parent: Option<NodeId>,
    pub child: NodeId,
    pub parent_was_leaf: bool,
}

/// Outcome of [`Tree::find_or_create_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInsert {
    pub node: NodeId,
    pub structure_changed: bool,
    /// Edges in creation order, which is root-to-leaf.
    pub created_edges: Vec<CreatedEdge>,
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    history_limit: usize,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Tree whose nodes retain at most `limit` samples each.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            history_limit: limit,
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Apply a new history capacity to every existing and future node.
    pub fn set_history_limit(&mut self, limit: usize) {
        self.history_limit = limit;
        for node in &mut self.nodes {
            node.set_history_limit(limit);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    /// Children of `parent`, or the roots when `parent` is `None`.
    pub fn children_of(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            Some(id) => self.node(id).map(Node::children).unwrap_or(&[]),
            None => &self.roots,
        }
    }

    pub fn find_root(&self, name: &str) -> Option<NodeId> {
        self.roots
            .iter()
            .copied()
            .find(|id| self.nodes[id.0].name() == name)
    }

    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.node(parent)?
            .children()
            .iter()
            .copied()
            .find(|id| self.nodes[id.0].name() == name)
    }

    /// Resolve `path`, creating every missing segment.
    ///
    /// Calling this again with a path that fully exists creates nothing and
    /// returns the same terminal node.
    pub fn find_or_create_path<S: AsRef<str>>(&mut self, path: &[S]) -> Result<PathInsert> {
        validate_path(path)?;

        let mut created_edges = Vec::new();
        let first = path[0].as_ref();
        let mut current = match self.find_root(first) {
            Some(id) => id,
            None => {
                let id = self.alloc(first, None);
                self.roots.push(id);
                log::debug!("created root {first:?} as {id}");
                created_edges.push(CreatedEdge {
                    parent: None,
                    child: id,
                    parent_was_leaf: false,
                });
                id
            }
        };

        for segment in &path[1..] {
            let segment = segment.as_ref();
            current = match self.find_child(current, segment) {
                Some(child) => child,
                None => {
                    let parent_was_leaf = self.nodes[current.0].is_leaf();
                    let child = self.alloc(segment, Some(current));
                    self.nodes[current.0].push_child(child);
                    created_edges.push(CreatedEdge {
                        parent: Some(current),
                        child,
                        parent_was_leaf,
                    });
                    child
                }
            };
        }

        if !created_edges.is_empty() {
            log::debug!(
                "path {} added {} node(s)",
                join_path(path, "/"),
                created_edges.len()
            );
        }

        Ok(PathInsert {
            node: current,
            structure_changed: !created_edges.is_empty(),
            created_edges,
        })
    }

    /// Pure lookup; `Ok(None)` when any segment is missing.
    pub fn find_node_by_path<S: AsRef<str>>(&self, path: &[S]) -> Result<Option<NodeId>> {
        validate_path(path)?;
        let Some(mut current) = self.find_root(path[0].as_ref()) else {
            return Ok(None);
        };
        for segment in &path[1..] {
            match self.find_child(current, segment.as_ref()) {
                Some(child) => current = child,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Names from the root down to `id`.
    pub fn path(&self, id: NodeId) -> Vec<String> {
        let mut path = Vec::new();
        let mut cursor = self.node(id).map(|_| id);
        while let Some(current) = cursor {
            let node = &self.nodes[current.0];
            path.push(node.name().to_string());
            cursor = node.parent();
        }
        path.reverse();
        path
    }

    pub fn full_path(&self, id: NodeId, separator: &str) -> String {
        self.path(id).join(separator)
    }

    /// Number of ancestors; roots have depth 0.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cursor = self.node(id).and_then(Node::parent);
        while let Some(parent) = cursor {
            depth += 1;
            cursor = self.nodes[parent.0].parent();
        }
        depth
    }

    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cursor = self.node(id).and_then(Node::parent);
        while let Some(parent) = cursor {
            if parent == ancestor {
                return true;
            }
            cursor = self.nodes[parent.0].parent();
        }
        false
    }

    /// All nodes below `id`, pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(node) = self.node(id) {
            for &child in node.children() {
                self.collect_preorder(child, &mut out);
            }
        }
        out
    }

    /// Leaves in the subtree rooted at `id` (the node itself if it is a leaf).
    pub fn leaf_nodes(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if self.node(id).is_some() {
            self.collect_leaves(id, &mut out);
        }
        out
    }

    /// Every node, pre-order over the roots.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for &root in &self.roots {
            self.collect_preorder(root, &mut out);
        }
        out
    }

    /// Drop every node. Previously handed out ids become dangling.
    pub fn clear(&mut self) {
        log::debug!("clearing tree with {} node(s)", self.nodes.len());
        self.nodes.clear();
        self.roots.clear();
    }

    fn alloc(&mut self, name: &str, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(name, parent, self.history_limit));
        id
    }

    fn collect_preorder(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        for &child in self.nodes[id.0].children() {
            self.collect_preorder(child, out);
        }
    }

    fn collect_leaves(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let node = &self.nodes[id.0];
        if node.is_leaf() {
            out.push(id);
        } else {
            for &child in node.children() {
                self.collect_leaves(child, out);
            }
        }
    }
}

fn validate_path<S: AsRef<str>>(path: &[S]) -> Result<()> {
    if path.is_empty() {
        return Err(ModelError::MalformedPath {
            reason: "empty path",
        });
    }
    if path.iter().any(|s| s.as_ref().is_empty()) {
        return Err(ModelError::MalformedPath {
            reason: "empty path segment",
        });
    }
    Ok(())
}

/// Join path segments with `separator`.
pub fn join_path<S: AsRef<str>>(path: &[S], separator: &str) -> String {
    let mut out = String::new();
    for (i, segment) in path.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        out.push_str(segment.as_ref());
    }
    out
}

/// Split a `/`-separated display path, dropping empty segments.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_creates_intermediate_nodes() {
        let mut tree = Tree::new();
        let insert = tree
            .find_or_create_path(&["Server1", "CPU", "Temp"])
            .unwrap();
        assert!(insert.structure_changed);
        assert_eq!(insert.created_edges.len(), 3);
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.roots().len(), 1);
        assert_eq!(tree.full_path(insert.node, "/"), "Server1/CPU/Temp");
        assert_eq!(tree.depth(insert.node), 2);
    }

    #[test]
    fn test_created_edges_record_parent_was_leaf() {
        let mut tree = Tree::new();
        tree.find_or_create_path(&["A", "B"]).unwrap();
        let insert = tree.find_or_create_path(&["A", "B", "C"]).unwrap();
        assert_eq!(insert.created_edges.len(), 1);
        let edge = insert.created_edges[0];
        assert_eq!(tree.node(edge.parent.unwrap()).unwrap().name(), "B");
        assert!(edge.parent_was_leaf);

        let insert = tree.find_or_create_path(&["A", "D"]).unwrap();
        assert!(!insert.created_edges[0].parent_was_leaf);
    }

    #[test]
    fn test_root_edge_has_no_parent() {
        let mut tree = Tree::new();
        let insert = tree.find_or_create_path(&["Solo"]).unwrap();
        assert_eq!(
            insert.created_edges,
            vec![CreatedEdge {
                parent: None,
                child: insert.node,
                parent_was_leaf: false,
            }]
        );
    }

    #[test]
    fn test_existing_path_is_idempotent() {
        let mut tree = Tree::new();
        let first = tree.find_or_create_path(&["A", "B"]).unwrap();
        let second = tree.find_or_create_path(&["A", "B"]).unwrap();
        assert_eq!(first.node, second.node);
        assert!(!second.structure_changed);
        assert!(second.created_edges.is_empty());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_empty_path_is_rejected() {
        let mut tree = Tree::new();
        let empty: [&str; 0] = [];
        assert!(matches!(
            tree.find_or_create_path(&empty),
            Err(ModelError::MalformedPath { .. })
        ));
        assert!(matches!(
            tree.find_node_by_path(&empty),
            Err(ModelError::MalformedPath { .. })
        ));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_empty_segment_leaves_tree_untouched() {
        let mut tree = Tree::new();
        tree.find_or_create_path(&["A", "B"]).unwrap();
        assert!(tree.find_or_create_path(&["A", "", "C"]).is_err());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_lookup_does_not_create() {
        let mut tree = Tree::new();
        tree.find_or_create_path(&["A", "B"]).unwrap();
        assert!(tree.find_node_by_path(&["A", "B"]).unwrap().is_some());
        assert!(tree.find_node_by_path(&["A", "X"]).unwrap().is_none());
        assert!(tree.find_node_by_path(&["Z"]).unwrap().is_none());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_roots_and_children_keep_insertion_order() {
        let mut tree = Tree::new();
        tree.find_or_create_path(&["Zeta", "b"]).unwrap();
        tree.find_or_create_path(&["Alpha"]).unwrap();
        tree.find_or_create_path(&["Zeta", "a"]).unwrap();

        let roots: Vec<&str> = tree
            .roots()
            .iter()
            .map(|&id| tree.node(id).unwrap().name())
            .collect();
        assert_eq!(roots, vec!["Zeta", "Alpha"]);

        let zeta = tree.find_root("Zeta").unwrap();
        let children: Vec<&str> = tree
            .children_of(Some(zeta))
            .iter()
            .map(|&id| tree.node(id).unwrap().name())
            .collect();
        assert_eq!(children, vec!["b", "a"]);
    }

    #[test]
    fn test_descendants_and_leaves() {
        let mut tree = Tree::new();
        tree.find_or_create_path(&["R", "A", "x"]).unwrap();
        tree.find_or_create_path(&["R", "A", "y"]).unwrap();
        tree.find_or_create_path(&["R", "B"]).unwrap();
        let root = tree.find_root("R").unwrap();

        let names = |ids: Vec<NodeId>| -> Vec<String> {
            ids.into_iter().map(|id| tree.full_path(id, "/")).collect()
        };
        assert_eq!(
            names(tree.descendants(root)),
            vec!["R/A", "R/A/x", "R/A/y", "R/B"]
        );
        assert_eq!(names(tree.leaf_nodes(root)), vec!["R/A/x", "R/A/y", "R/B"]);
        assert_eq!(tree.preorder().len(), 5);
    }

    #[test]
    fn test_is_ancestor() {
        let mut tree = Tree::new();
        let leaf = tree.find_or_create_path(&["R", "A", "x"]).unwrap().node;
        let root = tree.find_root("R").unwrap();
        assert!(tree.is_ancestor(root, leaf));
        assert!(!tree.is_ancestor(leaf, root));
        assert!(!tree.is_ancestor(leaf, leaf));
    }

    #[test]
    fn test_history_limit_applies_to_all_nodes() {
        let mut tree = Tree::with_history_limit(8);
        let id = tree.find_or_create_path(&["S"]).unwrap().node;
        for i in 0..8_i64 {
            tree.node_mut(id)
                .unwrap()
                .set_value(Value::from(i), None, None, false, None);
        }
        tree.set_history_limit(2);
        assert_eq!(tree.node(id).unwrap().history().len(), 2);
        let later = tree.find_or_create_path(&["T"]).unwrap().node;
        assert_eq!(tree.node(later).unwrap().history_limit(), 2);
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut tree = Tree::new();
        let id = tree.find_or_create_path(&["A", "B"]).unwrap().node;
        tree.clear();
        assert!(tree.is_empty());
        assert!(tree.roots().is_empty());
        assert!(tree.node(id).is_none());
    }

    #[test]
    fn test_split_and_join_path() {
        assert_eq!(split_path("/a//b/c/"), vec!["a", "b", "c"]);
        assert!(split_path("").is_empty());
        assert_eq!(join_path(&["a", "b"], "/"), "a/b");
    }
}
