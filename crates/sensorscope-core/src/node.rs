//! A single named entry in the sensor hierarchy.
//!
//! Nodes live in the [`Tree`](crate::Tree) arena and refer to each other by
//! [`NodeId`]. The parent link is a plain index, so there is no ownership
//! cycle between a parent and the children it owns.

use std::collections::VecDeque;
use std::time::Instant;

use crate::value::Value;

/// Default number of samples retained per node.
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// Stable handle to a node for as long as the tree is not cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Arena slot of this node. Ids are handed out in creation order.
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One historical reading.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedSample {
    pub timestamp: Instant,
    pub value: Value,
    pub failed: bool,
}

#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,

    value: Option<Value>,
    lower_threshold: Option<Value>,
    upper_threshold: Option<Value>,
    failed: bool,
    last_update: Option<Instant>,
    history: VecDeque<TimedSample>,
    history_limit: usize,
    update_count: u64,
}

impl Node {
    pub(crate) fn new(name: &str, parent: Option<NodeId>, history_limit: usize) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            value: None,
            lower_threshold: None,
            upper_threshold: None,
            failed: false,
            last_update: None,
            history: VecDeque::new(),
            history_limit,
            update_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in first-seen order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub(crate) fn push_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn lower_threshold(&self) -> Option<&Value> {
        self.lower_threshold.as_ref()
    }

    pub fn upper_threshold(&self) -> Option<&Value> {
        self.upper_threshold.as_ref()
    }

    /// Failed only once a sample exists and that sample was flagged.
    pub fn is_failed(&self) -> bool {
        self.value.is_some() && self.failed
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Store a new sample on this node.
    ///
    /// Thresholds are replaced wholesale: passing `None` clears the previous
    /// one. The sample is appended to the history (every value type is kept)
    /// and the oldest entries are evicted once the limit is exceeded.
    pub fn set_value(
        &mut self,
        value: Value,
        lower_threshold: Option<Value>,
        upper_threshold: Option<Value>,
        failed: bool,
        timestamp: Option<Instant>,
    ) {
        let timestamp = timestamp.unwrap_or_else(Instant::now);

        if self.history_limit > 0 {
            self.history.push_back(TimedSample {
                timestamp,
                value: value.clone(),
                failed,
            });
            self.evict_overflow();
        }

        self.value = Some(value);
        self.lower_threshold = lower_threshold;
        self.upper_threshold = upper_threshold;
        self.failed = failed;
        self.last_update = Some(timestamp);
        self.update_count += 1;
    }

    /// Seconds since the last sample, or `0.0` if there never was one.
    pub fn seconds_since_update(&self, now: Instant) -> f64 {
        self.last_update
            .map(|t| now.saturating_duration_since(t).as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Samples, oldest first.
    pub fn history(&self) -> &VecDeque<TimedSample> {
        &self.history
    }

    pub fn has_history(&self) -> bool {
        !self.history.is_empty()
    }

    /// True if any retained sample can be drawn on the numeric axis.
    pub fn has_numeric_history(&self) -> bool {
        self.history.iter().any(|s| s.value.is_numeric())
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Change the capacity. A limit of 0 disables history and drops what is held.
    pub fn set_history_limit(&mut self, limit: usize) {
        self.history_limit = limit;
        self.evict_overflow();
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    fn evict_overflow(&mut self) {
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn leaf() -> Node {
        Node::new("Temp", None, DEFAULT_HISTORY_LIMIT)
    }

    #[test]
    fn test_new_node_has_no_value() {
        let node = leaf();
        assert!(!node.has_value());
        assert!(node.value().is_none());
        assert!(node.last_update().is_none());
        assert_eq!(node.update_count(), 0);
        assert!(!node.is_failed());
        assert!(node.is_leaf());
        assert!(node.is_root());
    }

    #[test]
    fn test_set_value_overwrites_fields() {
        let mut node = leaf();
        let t0 = Instant::now();
        node.set_value(
            Value::from(42.0),
            Some(Value::from(10.0)),
            Some(Value::from(50.0)),
            false,
            Some(t0),
        );
        node.set_value(Value::from(55.0), None, Some(Value::from(50.0)), true, None);

        assert_eq!(node.value(), Some(&Value::from(55.0)));
        assert!(node.lower_threshold().is_none());
        assert_eq!(node.upper_threshold(), Some(&Value::from(50.0)));
        assert!(node.is_failed());
        assert_eq!(node.update_count(), 2);
        assert!(node.last_update().unwrap() >= t0);
    }

    #[test]
    fn test_history_keeps_most_recent_samples() {
        let mut node = Node::new("Load", None, 4);
        let base = Instant::now();
        for i in 0..10_i64 {
            node.set_value(
                Value::from(i),
                None,
                None,
                false,
                Some(base + Duration::from_millis(i as u64)),
            );
        }
        let kept: Vec<i64> = node
            .history()
            .iter()
            .map(|s| s.value.as_integer().unwrap())
            .collect();
        assert_eq!(kept, vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_history_stores_every_value_type() {
        let mut node = leaf();
        node.set_value(Value::from("Idle"), None, None, false, None);
        node.set_value(Value::from(true), None, None, true, None);
        node.set_value(Value::from(3_i64), None, None, false, None);
        assert_eq!(node.history().len(), 3);
        assert!(node.history()[1].failed);
        assert!(node.has_numeric_history());
    }

    #[test]
    fn test_shrinking_limit_evicts_oldest() {
        let mut node = leaf();
        for i in 0..8_i64 {
            node.set_value(Value::from(i), None, None, false, None);
        }
        node.set_history_limit(3);
        assert_eq!(node.history().len(), 3);
        assert_eq!(node.history()[0].value, Value::from(5_i64));
    }

    #[test]
    fn test_zero_limit_disables_history() {
        let mut node = Node::new("Status", None, 0);
        node.set_value(Value::from(1.0), None, None, false, None);
        assert!(!node.has_history());
        assert_eq!(node.update_count(), 1);
        assert!(node.has_value());
    }

    #[test]
    fn test_seconds_since_update() {
        let mut node = leaf();
        let t0 = Instant::now();
        assert_eq!(node.seconds_since_update(t0), 0.0);
        node.set_value(Value::from(1.0), None, None, false, Some(t0));
        let later = t0 + Duration::from_millis(1500);
        assert!((node.seconds_since_update(later) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_clear_history() {
        let mut node = leaf();
        node.set_value(Value::from(1.0), None, None, false, None);
        node.clear_history();
        assert!(!node.has_history());
        assert!(node.has_value());
    }
}
