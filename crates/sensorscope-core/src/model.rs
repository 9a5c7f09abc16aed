//! View-facing sensor model.
//!
//! [`SensorModel`] combines the [`Tree`] with the [`VisibilityEngine`] and
//! answers the questions a hierarchical table view asks: which children are
//! shown, what text goes in each cell, and which rows changed after a sample.

use std::time::Instant;

use crate::error::Result;
use crate::node::{DEFAULT_HISTORY_LIMIT, Node, NodeId};
use crate::tree::Tree;
use crate::value::Value;
use crate::visibility::{ViewEvent, VisibilityEngine};

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// One reading as delivered by a producer.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub path: Vec<String>,
    pub value: Value,
    pub lower_threshold: Option<Value>,
    pub upper_threshold: Option<Value>,
    pub failed: bool,
    /// Arrival time; `None` means "when applied".
    pub timestamp: Option<Instant>,
}

impl Sample {
    pub fn new<I, S>(path: I, value: impl Into<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            value: value.into(),
            lower_threshold: None,
            upper_threshold: None,
            failed: false,
            timestamp: None,
        }
    }

    pub fn with_thresholds(mut self, lower: Option<Value>, upper: Option<Value>) -> Self {
        self.lower_threshold = lower;
        self.upper_threshold = upper;
        self
    }

    pub fn with_failed(mut self, failed: bool) -> Self {
        self.failed = failed;
        self
    }

    pub fn at(mut self, timestamp: Instant) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn display_path(&self) -> String {
        self.path.join("/")
    }
}

// ---------------------------------------------------------------------------
// Columns and row attributes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Name,
    Value,
    LowerThreshold,
    UpperThreshold,
    LastUpdated,
    Updates,
}

impl Column {
    pub const ALL: [Column; 6] = [
        Column::Name,
        Column::Value,
        Column::LowerThreshold,
        Column::UpperThreshold,
        Column::LastUpdated,
        Column::Updates,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::Value => "Value",
            Self::LowerThreshold => "Lower Threshold",
            Self::UpperThreshold => "Upper Threshold",
            Self::LastUpdated => "Last Updated (s)",
            Self::Updates => "Updates",
        }
    }
}

/// Rendering hints for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowAttr {
    /// The filter text occurs in the node's own name.
    pub highlighted: bool,
    pub failed: bool,
    /// Failed nodes anywhere below this one.
    pub failed_descendants: usize,
}

/// A row of the flattened visible tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleRow {
    pub node: NodeId,
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Samples retained per node; 0 disables history.
    pub history_limit: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

type ExpansionQuery = Box<dyn Fn(NodeId) -> bool>;

// ---------------------------------------------------------------------------
// SensorModel
// ---------------------------------------------------------------------------

pub struct SensorModel {
    tree: Tree,
    visibility: VisibilityEngine,
    expansion_query: Option<ExpansionQuery>,
}

impl Default for SensorModel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SensorModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorModel")
            .field("nodes", &self.tree.len())
            .field("visible", &self.visibility.visible_count())
            .field("filter", &self.visibility.filter())
            .field("failures_only", &self.visibility.show_failures_only())
            .finish()
    }
}

impl SensorModel {
    pub fn new() -> Self {
        Self::with_config(ModelConfig::default())
    }

    pub fn with_config(config: ModelConfig) -> Self {
        Self {
            tree: Tree::with_history_limit(config.history_limit),
            visibility: VisibilityEngine::new(),
            expansion_query: None,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.tree.node(id)
    }

    pub fn find<S: AsRef<str>>(&self, path: &[S]) -> Result<Option<NodeId>> {
        self.tree.find_node_by_path(path)
    }

    pub fn set_history_limit(&mut self, limit: usize) {
        self.tree.set_history_limit(limit);
    }

    /// Apply one sample and return the view events it caused.
    pub fn add_sample(&mut self, sample: &Sample) -> Result<Vec<ViewEvent>> {
        self.apply(
            &sample.path,
            sample.value.clone(),
            sample.lower_threshold.clone(),
            sample.upper_threshold.clone(),
            sample.failed,
            sample.timestamp,
        )
    }

    pub fn add_data_sample<S: AsRef<str>>(
        &mut self,
        path: &[S],
        value: Value,
        lower_threshold: Option<Value>,
        upper_threshold: Option<Value>,
        failed: bool,
    ) -> Result<Vec<ViewEvent>> {
        self.apply(path, value, lower_threshold, upper_threshold, failed, None)
    }

    fn apply<S: AsRef<str>>(
        &mut self,
        path: &[S],
        value: Value,
        lower_threshold: Option<Value>,
        upper_threshold: Option<Value>,
        failed: bool,
        timestamp: Option<Instant>,
    ) -> Result<Vec<ViewEvent>> {
        let insert = self.tree.find_or_create_path(path)?;
        let id = insert.node;

        let Some(node) = self.tree.node_mut(id) else {
            return Ok(Vec::new());
        };
        let was_failed = node.is_failed();
        node.set_value(value, lower_threshold, upper_threshold, failed, timestamp);
        let failure_flipped = was_failed != node.is_failed();

        let created: Vec<NodeId> = insert.created_edges.iter().map(|e| e.child).collect();
        // Former leaves that just gained a child, plus ancestors whose failure
        // summary moved. Nodes created by this insert are covered by `Added`.
        let mut refresh: Vec<NodeId> = insert
            .created_edges
            .iter()
            .filter(|e| e.parent_was_leaf)
            .filter_map(|e| e.parent)
            .filter(|p| !created.contains(p))
            .collect();
        if failure_flipped {
            refresh.extend(self.ancestors(id).into_iter().filter(|a| !created.contains(a)));
        }

        let visibility_stable = !insert.structure_changed
            && (!failure_flipped || !self.visibility.show_failures_only());
        if visibility_stable {
            let mut events = Vec::new();
            for node in std::iter::once(id).chain(refresh) {
                if self.visibility.is_visible(node) {
                    events.push(ViewEvent::Changed(node));
                }
            }
            return Ok(events);
        }

        if !self.visibility.is_filtering() {
            let mut events = Vec::with_capacity(created.len() + refresh.len());
            for edge in &insert.created_edges {
                self.visibility.mark_visible(edge.child);
                events.push(ViewEvent::Added {
                    parent: edge.parent,
                    node: edge.child,
                });
            }
            for node in refresh {
                if self.visibility.is_visible(node) {
                    events.push(ViewEvent::Changed(node));
                }
            }
            return Ok(events);
        }

        Ok(self
            .visibility
            .recompute_and_diff(&self.tree, Some(id), &refresh, false))
    }

    // -- filters -----------------------------------------------------------

    pub fn filter(&self) -> &str {
        self.visibility.filter()
    }

    /// Change the text filter. An unchanged filter (after trim and
    /// lower-casing) yields no events.
    pub fn set_filter(&mut self, text: &str) -> Vec<ViewEvent> {
        if !self.visibility.set_filter(text) {
            return Vec::new();
        }
        log::debug!("filter set to {:?}", self.visibility.filter());
        self.visibility
            .recompute_and_diff(&self.tree, None, &[], true)
    }

    pub fn is_showing_failures_only(&self) -> bool {
        self.visibility.show_failures_only()
    }

    pub fn set_show_failures_only(&mut self, enabled: bool) -> Vec<ViewEvent> {
        if !self.visibility.set_show_failures_only(enabled) {
            return Vec::new();
        }
        log::debug!("failures-only set to {enabled}");
        self.visibility
            .recompute_and_diff(&self.tree, None, &[], true)
    }

    pub fn is_node_visible(&self, id: NodeId) -> bool {
        self.visibility.is_visible(id)
    }

    /// Rebuild the visible set from scratch, e.g. after attaching a view.
    pub fn refresh_visibility(&mut self) -> Vec<ViewEvent> {
        self.visibility
            .recompute_and_diff(&self.tree, None, &[], false)
    }

    // -- hierarchy ---------------------------------------------------------

    /// Visible children of `parent` (visible roots for `None`), insertion order.
    pub fn children(&self, parent: Option<NodeId>) -> Vec<NodeId> {
        self.tree
            .children_of(parent)
            .iter()
            .copied()
            .filter(|&id| self.visibility.is_visible(id))
            .collect()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.tree.node(id).and_then(Node::parent)
    }

    /// The invisible root (`None`) is always a container.
    pub fn is_container(&self, id: Option<NodeId>) -> bool {
        match id {
            None => true,
            Some(id) => self.tree.node(id).is_some_and(|n| !n.is_leaf()),
        }
    }

    /// Flatten the visible tree in display order, descending only into nodes
    /// for which `expanded` holds.
    pub fn visible_rows(&self, expanded: impl Fn(NodeId) -> bool) -> Vec<VisibleRow> {
        let mut rows = Vec::with_capacity(self.visibility.visible_count());
        let mut stack: Vec<VisibleRow> = self
            .children(None)
            .into_iter()
            .rev()
            .map(|node| VisibleRow { node, depth: 0 })
            .collect();
        while let Some(row) = stack.pop() {
            rows.push(row);
            if expanded(row.node) {
                for child in self.children(Some(row.node)).into_iter().rev() {
                    stack.push(VisibleRow {
                        node: child,
                        depth: row.depth + 1,
                    });
                }
            }
        }
        rows
    }

    /// Drop every node.
    pub fn clear(&mut self) -> Vec<ViewEvent> {
        self.tree.clear();
        self.visibility.clear();
        vec![ViewEvent::Cleared]
    }

    /// `Changed` for every visible node so the age column can be redrawn.
    pub fn refresh_elapsed_times(&self) -> Vec<ViewEvent> {
        self.tree
            .preorder()
            .into_iter()
            .filter(|&id| self.visibility.is_visible(id))
            .map(ViewEvent::Changed)
            .collect()
    }

    // -- presentation ------------------------------------------------------

    /// Install the view's "is this row expanded" predicate.
    pub fn set_expansion_query(&mut self, query: impl Fn(NodeId) -> bool + 'static) {
        self.expansion_query = Some(Box::new(query));
    }

    pub fn clear_expansion_query(&mut self) {
        self.expansion_query = None;
    }

    fn is_expanded(&self, id: NodeId) -> Option<bool> {
        self.expansion_query.as_ref().map(|query| query(id))
    }

    pub fn failed_descendants(&self, id: NodeId) -> usize {
        self.tree
            .descendants(id)
            .into_iter()
            .filter(|&d| self.tree.node(d).is_some_and(Node::is_failed))
            .count()
    }

    pub fn row_attr(&self, id: NodeId) -> Option<RowAttr> {
        let node = self.tree.node(id)?;
        Some(RowAttr {
            highlighted: self.visibility.matches_highlight(node.name()),
            failed: node.is_failed(),
            failed_descendants: if node.is_leaf() {
                0
            } else {
                self.failed_descendants(id)
            },
        })
    }

    /// Text shown in `column` for `id`. Empty for unknown nodes.
    pub fn cell_text(&self, id: NodeId, column: Column, now: Instant) -> String {
        let Some(node) = self.tree.node(id) else {
            return String::new();
        };
        match column {
            Column::Name => node.name().to_string(),
            Column::Value => match node.value() {
                Some(value) => value.to_string(),
                None if !node.is_leaf() && self.is_expanded(id) == Some(false) => {
                    match self.failed_descendants(id) {
                        0 => String::new(),
                        n => format!("{n} failed"),
                    }
                }
                None => String::new(),
            },
            Column::LowerThreshold => node
                .lower_threshold()
                .map(Value::to_string)
                .unwrap_or_default(),
            Column::UpperThreshold => node
                .upper_threshold()
                .map(Value::to_string)
                .unwrap_or_default(),
            Column::LastUpdated if node.has_value() => {
                format!("{:.1}", node.seconds_since_update(now))
            }
            Column::Updates if node.has_value() => node.update_count().to_string(),
            Column::LastUpdated | Column::Updates => String::new(),
        }
    }

    fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.parent(id);
        while let Some(parent) = cursor {
            out.push(parent);
            cursor = self.parent(parent);
        }
        out
    }
}
