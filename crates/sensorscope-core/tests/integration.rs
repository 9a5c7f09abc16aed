//! Integration tests for sensorscope-core.
//!
//! These drive the public API end to end:
//! samples → model → view events, and history → plot data.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use proptest::test_runner::Config;
use sensorscope_core::{
    ClipPolicy, NodeId, PlotManager, PlotOptions, PlotStatus, Sample, SensorModel, SeriesSpec,
    TimeWindow, Tree, Value, ViewEvent, VisibilityEngine, prepare_plot,
};

fn path(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|s| s.to_string()).collect()
}

/// Mirror of what a hierarchical view would hold after replaying events.
/// Panics if an event arrives in an order a real view could not apply.
#[derive(Default)]
struct MirrorView {
    rows: HashSet<NodeId>,
}

impl MirrorView {
    fn apply(&mut self, model: &SensorModel, events: &[ViewEvent]) {
        for event in events {
            match *event {
                ViewEvent::Added { parent, node } => {
                    if let Some(p) = parent {
                        assert!(self.rows.contains(&p), "child {node} added before parent {p}");
                    }
                    assert!(self.rows.insert(node), "{node} added twice");
                }
                ViewEvent::Removed { node, .. } => {
                    let tree = model.tree();
                    for &child in tree.node(node).unwrap().children() {
                        assert!(
                            !self.rows.contains(&child),
                            "{node} removed while child {child} is still shown"
                        );
                    }
                    assert!(self.rows.remove(&node), "{node} removed but not shown");
                }
                ViewEvent::Changed(node) => {
                    assert!(self.rows.contains(&node), "change for hidden {node}");
                }
                ViewEvent::Cleared => self.rows.clear(),
            }
        }
    }

    fn matches(&self, model: &SensorModel) -> bool {
        model
            .tree()
            .preorder()
            .into_iter()
            .all(|id| self.rows.contains(&id) == model.is_node_visible(id))
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_two_leaves_under_shared_containers() {
    let mut model = SensorModel::new();
    model
        .add_sample(&Sample::new(["Server1", "CPU", "Temp"], 42.0))
        .unwrap();
    model
        .add_sample(&Sample::new(["Server1", "CPU", "Load"], 80_i64))
        .unwrap();

    let tree = model.tree();
    assert_eq!(tree.len(), 4);
    let server = tree.find_root("Server1").unwrap();
    let cpu = tree.find_child(server, "CPU").unwrap();
    assert_eq!(tree.node(server).unwrap().children(), &[cpu]);
    assert_eq!(tree.node(cpu).unwrap().children().len(), 2);
    assert!(!tree.node(cpu).unwrap().has_value());

    let load = tree.find_child(cpu, "Load").unwrap();
    assert_eq!(tree.node(load).unwrap().value().unwrap().as_numeric().unwrap(), 80.0);
}

#[test]
fn scenario_b_failures_only_with_nothing_failed() {
    let mut model = SensorModel::new();
    model.add_sample(&Sample::new(["A", "B"], 1.0)).unwrap();
    model.add_sample(&Sample::new(["C"], 2.0)).unwrap();

    let mut fresh = SensorModel::new();
    let first = fresh.set_show_failures_only(true);
    assert!(first.is_empty());

    let events = model.set_show_failures_only(true);
    assert!(events.iter().all(|e| matches!(e, ViewEvent::Removed { .. })));
    assert_eq!(events.len(), 3);
    assert!(model.children(None).is_empty());
}

#[test]
fn scenario_c_failure_on_fifth_sample_adds_chain_root_first() {
    let mut model = SensorModel::new();
    model.add_sample(&Sample::new(["Site", "Other"], 1.0)).unwrap();
    model.set_show_failures_only(true);

    let leaf = ["Site", "Rack", "Node", "Temp"];
    for _ in 0..4 {
        let events = model.add_sample(&Sample::new(leaf, 50.0)).unwrap();
        assert!(events.is_empty());
    }
    let events = model
        .add_sample(&Sample::new(leaf, 95.0).with_failed(true))
        .unwrap();

    let added: Vec<String> = events
        .iter()
        .map(|e| match e {
            ViewEvent::Added { node, .. } => model.tree().full_path(*node, "/"),
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(
        added,
        vec!["Site", "Site/Rack", "Site/Rack/Node", "Site/Rack/Node/Temp"]
    );
}

#[test]
fn scenario_d_window_selects_recent_samples() {
    let now = Instant::now() + Duration::from_secs(60);
    let mut tree = Tree::new();
    let id = tree.find_or_create_path(&["S"]).unwrap().node;
    for (ago, v) in [(30, 500.0), (15, 1.0), (5, 2.0)] {
        tree.node_mut(id).unwrap().set_value(
            Value::from(v),
            None,
            None,
            false,
            Some(now - Duration::from_secs(ago)),
        );
    }
    let specs = [SeriesSpec::new(path(&["S"]))];

    let strict = prepare_plot(&tree, &specs, TimeWindow::Last20Seconds, now, &PlotOptions::default());
    assert_eq!(strict.series[0].points.len(), 2);
    assert_eq!((strict.value_min, strict.value_max), (1.0, 2.0));

    let anchored = prepare_plot(
        &tree,
        &specs,
        TimeWindow::Last20Seconds,
        now,
        &PlotOptions {
            clip_policy: ClipPolicy::Anchored,
            ..PlotOptions::default()
        },
    );
    assert_eq!(anchored.series[0].points.len(), 3);
    assert_eq!(anchored.value_max, 500.0);
}

// ---------------------------------------------------------------------------
// Properties with fixed inputs
// ---------------------------------------------------------------------------

#[test]
fn p1_same_path_twice_reuses_node() {
    let mut model = SensorModel::new();
    model.add_sample(&Sample::new(["A", "B"], 1_i64)).unwrap();
    let first = model.find(&["A", "B"]).unwrap().unwrap();
    model.add_sample(&Sample::new(["A", "B"], "two")).unwrap();
    let second = model.find(&["A", "B"]).unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(model.tree().len(), 2);
    assert_eq!(model.node(first).unwrap().value(), Some(&Value::from("two")));
}

#[test]
fn p3_filter_keeps_ancestor_chain() {
    let mut tree = Tree::new();
    tree.find_or_create_path(&["A", "B", "C"]).unwrap();
    tree.find_or_create_path(&["A", "X"]).unwrap();
    let mut engine = VisibilityEngine::new();
    engine.set_filter("c");
    for p in [&["A"][..], &["A", "B"], &["A", "B", "C"]] {
        let id = tree.find_node_by_path(p).unwrap().unwrap();
        assert!(engine.should_be_visible(&tree, id));
    }
    engine.set_filter("");
    let x = tree.find_node_by_path(&["A", "X"]).unwrap().unwrap();
    assert!(engine.should_be_visible(&tree, x));
}

#[test]
fn p4_subtree_removed_deepest_first_and_added_back_shallowest_first() {
    let mut model = SensorModel::new();
    model.add_sample(&Sample::new(["A", "B", "C", "D"], 1.0)).unwrap();
    model.add_sample(&Sample::new(["Keep"], 1.0)).unwrap();

    let depth = |model: &SensorModel, e: &ViewEvent| model.tree().depth(e.node().unwrap());

    let removed = model.set_filter("keep");
    let depths: Vec<usize> = removed
        .iter()
        .filter(|e| matches!(e, ViewEvent::Removed { .. }))
        .map(|e| depth(&model, e))
        .collect();
    assert_eq!(depths, vec![3, 2, 1, 0]);

    let added = model.set_filter("");
    let depths: Vec<usize> = added
        .iter()
        .filter(|e| matches!(e, ViewEvent::Added { .. }))
        .map(|e| depth(&model, e))
        .collect();
    assert_eq!(depths, vec![0, 1, 2, 3]);
}

#[test]
fn p5_repeated_filter_is_silent() {
    let mut model = SensorModel::new();
    model.add_sample(&Sample::new(["Srv", "Temp"], 1.0)).unwrap();
    assert!(!model.set_filter("Temp").is_empty());
    assert!(model.set_filter("  tEMP\t").is_empty());
}

#[test]
fn p6_single_value_axis_is_padded() {
    let now = Instant::now();
    let mut tree = Tree::new();
    let id = tree.find_or_create_path(&["S"]).unwrap().node;
    tree.node_mut(id)
        .unwrap()
        .set_value(Value::from(5.0), None, None, false, Some(now));
    let data = prepare_plot(
        &tree,
        &[SeriesSpec::new(path(&["S"]))],
        TimeWindow::All,
        now,
        &PlotOptions::default(),
    );
    assert_eq!(data.status, PlotStatus::Ready);
    assert_eq!((data.value_min, data.value_max), (4.0, 6.0));
}

#[test]
fn restored_plot_picks_up_late_sensor() {
    let mut model = SensorModel::new();
    let mut plots = PlotManager::new();
    let configs = vec![sensorscope_core::PlotConfiguration {
        name: "Fans".into(),
        sensors: vec!["Rack/Fan".into()],
    }];
    let report = plots.restore_configurations(model.tree(), &configs);
    assert_eq!(report.created, 1);

    let plot = plots.plot("fans").unwrap();
    let before = plot.render(model.tree(), Instant::now(), &PlotOptions::default());
    assert_eq!(before.status, PlotStatus::WaitingForSamples);

    model.add_sample(&Sample::new(["Rack", "Fan"], 1200_i64)).unwrap();
    let after = plot.render(model.tree(), Instant::now(), &PlotOptions::default());
    assert_eq!(after.status, PlotStatus::Ready);
}

// ---------------------------------------------------------------------------
// Generated properties
// ---------------------------------------------------------------------------

fn segment() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "ab", "bc"]).prop_map(str::to_string)
}

fn sample_path() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(segment(), 1..5)
}

#[derive(Debug, Clone)]
enum Op {
    Sample(Vec<String>, bool),
    Filter(String),
    FailuresOnly(bool),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (sample_path(), any::<bool>()).prop_map(|(p, f)| Op::Sample(p, f)),
        2 => prop::sample::select(vec!["", "a", "b/c", "ab", "zz"])
            .prop_map(|f| Op::Filter(f.to_string())),
        1 => any::<bool>().prop_map(Op::FailuresOnly),
    ]
}

proptest! {
    #![proptest_config(Config::with_cases(128))]

    #[test]
    fn path_insert_is_idempotent(p in sample_path()) {
        let mut tree = Tree::new();
        let first = tree.find_or_create_path(&p).unwrap();
        let len = tree.len();
        let second = tree.find_or_create_path(&p).unwrap();
        prop_assert_eq!(first.node, second.node);
        prop_assert!(!second.structure_changed);
        prop_assert_eq!(tree.len(), len);
        prop_assert_eq!(tree.path(first.node), p);
    }

    #[test]
    fn history_keeps_most_recent(capacity in 1_usize..64, n in 0_usize..200) {
        let mut tree = Tree::with_history_limit(capacity);
        let id = tree.find_or_create_path(&["S"]).unwrap().node;
        for i in 0..n {
            tree.node_mut(id).unwrap().set_value(Value::from(i as i64), None, None, false, None);
        }
        let kept: Vec<i64> = tree
            .node(id)
            .unwrap()
            .history()
            .iter()
            .map(|s| s.value.as_integer().unwrap())
            .collect();
        let expected: Vec<i64> = (n.saturating_sub(capacity)..n).map(|i| i as i64).collect();
        prop_assert_eq!(kept, expected);
    }

    #[test]
    fn view_events_keep_a_mirror_consistent(ops in prop::collection::vec(op(), 1..40)) {
        let mut model = SensorModel::new();
        let mut mirror = MirrorView::default();
        for op in ops {
            let events = match op {
                Op::Sample(p, failed) => model
                    .add_sample(&Sample::new(p, 1.0).with_failed(failed))
                    .unwrap(),
                Op::Filter(f) => model.set_filter(&f),
                Op::FailuresOnly(on) => model.set_show_failures_only(on),
            };
            mirror.apply(&model, &events);
            prop_assert!(mirror.matches(&model));
        }
    }
}
