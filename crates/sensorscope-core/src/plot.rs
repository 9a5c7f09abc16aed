//! Plot data preparation.
//!
//! Turns the histories of a set of leaf paths into normalised point series on
//! one shared value axis. Numbers are plotted as-is; booleans and strings get
//! categorical slots so a status sensor can share a chart with a temperature.
//!
//! All time arithmetic happens in seconds relative to a reference instant
//! (non-positive for the past), which keeps the maths free of `Instant`
//! underflow when a window reaches back before the first sample.

use std::time::{Duration, Instant};

use crate::node::{NodeId, TimedSample};
use crate::tree::Tree;
use crate::value::Value;

const EPSILON: f64 = 1e-9;

/// Default number of ticks per axis, both ends included.
pub const DEFAULT_TICK_COUNT: usize = 6;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Look-back window of a plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeWindow {
    Last20Seconds,
    #[default]
    Last1Minute,
    Last5Minutes,
    Last10Minutes,
    All,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 5] = [
        TimeWindow::Last20Seconds,
        TimeWindow::Last1Minute,
        TimeWindow::Last5Minutes,
        TimeWindow::Last10Minutes,
        TimeWindow::All,
    ];

    /// `None` means the whole retained history.
    pub fn duration(self) -> Option<Duration> {
        match self {
            Self::Last20Seconds => Some(Duration::from_secs(20)),
            Self::Last1Minute => Some(Duration::from_secs(60)),
            Self::Last5Minutes => Some(Duration::from_secs(5 * 60)),
            Self::Last10Minutes => Some(Duration::from_secs(10 * 60)),
            Self::All => None,
        }
    }

    /// Short selector label.
    pub fn short_label(self) -> &'static str {
        match self {
            Self::Last20Seconds => "20s",
            Self::Last1Minute => "1m",
            Self::Last5Minutes => "5m",
            Self::Last10Minutes => "10m",
            Self::All => "All",
        }
    }

    /// Following window, wrapping after `All`.
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|w| *w == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

/// What to do with the history just outside a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipPolicy {
    /// Only samples inside the window.
    #[default]
    Strict,
    /// Also keep the last sample before the window, pinned to the window
    /// start, so the line reaches the left edge.
    Anchored,
}

#[derive(Debug, Clone)]
pub struct PlotOptions {
    pub clip_policy: ClipPolicy,
    /// Ticks per axis; values below 2 are treated as 2.
    pub tick_count: usize,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            clip_policy: ClipPolicy::default(),
            tick_count: DEFAULT_TICK_COUNT,
        }
    }
}

// ---------------------------------------------------------------------------
// Input and output
// ---------------------------------------------------------------------------

/// A series request: which leaf to plot and how to name it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSpec {
    pub path: Vec<String>,
    pub label: String,
}

impl SeriesSpec {
    pub fn new(path: Vec<String>) -> Self {
        let label = path.join("/");
        Self { path, label }
    }

    pub fn with_label(path: Vec<String>, label: impl Into<String>) -> Self {
        Self {
            path,
            label: label.into(),
        }
    }
}

/// Per-series outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesStatus {
    /// The path does not resolve to a node yet.
    Missing,
    /// Resolved, but nothing falls inside the window.
    Empty,
    Ready,
}

/// Normalised point: both coordinates in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotPoint {
    pub x: f64,
    pub y: f64,
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSeries {
    pub label: String,
    pub node: Option<NodeId>,
    pub status: SeriesStatus,
    pub points: Vec<PlotPoint>,
    /// Most recent in-window value, for legends.
    pub latest: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    /// Normalised position along the axis.
    pub position: f64,
    pub label: String,
}

/// Overall outcome of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotStatus {
    /// No series requested.
    NoSeries,
    /// None of the resolved series has any history yet.
    WaitingForSamples,
    /// History exists, but none of it falls inside the window.
    NoSamplesInWindow,
    Ready,
}

impl PlotStatus {
    /// Placeholder text for an empty chart.
    pub fn message(self) -> Option<&'static str> {
        match self {
            Self::NoSeries => Some("No sensors selected for plotting."),
            Self::WaitingForSamples => Some("Waiting for samples..."),
            Self::NoSamplesInWindow => Some("No samples in selected timescale."),
            Self::Ready => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlotData {
    pub status: PlotStatus,
    pub series: Vec<PreparedSeries>,
    /// Time axis bounds in seconds relative to the reference instant.
    pub time_start: f64,
    pub time_end: f64,
    pub value_min: f64,
    pub value_max: f64,
    pub time_ticks: Vec<Tick>,
    pub value_ticks: Vec<Tick>,
    /// Labels of the categorical slots, slot order.
    pub categories: Vec<String>,
    pub range_label: String,
}

impl PlotData {
    fn empty(status: PlotStatus, series: Vec<PreparedSeries>, window: TimeWindow) -> Self {
        Self {
            status,
            series,
            time_start: 0.0,
            time_end: 0.0,
            value_min: 0.0,
            value_max: 0.0,
            time_ticks: Vec::new(),
            value_ticks: Vec::new(),
            categories: Vec::new(),
            range_label: window_label(window, 0.0),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == PlotStatus::Ready
    }
}

// ---------------------------------------------------------------------------
// Preparation
// ---------------------------------------------------------------------------

/// A collected sample, time relative to the reference instant.
struct Collected<'a> {
    seconds: f64,
    sample: &'a TimedSample,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Category {
    Bool(bool),
    Text(String),
}

/// Slot assignment for non-numeric values, first-seen order.
#[derive(Debug, Default)]
struct CategoryMap {
    slots: Vec<Category>,
}

impl CategoryMap {
    fn slot(&mut self, value: &Value) -> Option<usize> {
        let key = match value {
            Value::Boolean(b) => Category::Bool(*b),
            Value::String(s) => Category::Text(s.clone()),
            Value::Integer(_) | Value::Double(_) => return None,
        };
        if let Some(idx) = self.slots.iter().position(|c| *c == key) {
            return Some(idx);
        }
        if matches!(key, Category::Bool(_)) {
            // Booleans take two adjacent slots, false below true.
            self.slots.push(Category::Bool(false));
            self.slots.push(Category::Bool(true));
            return self.slots.iter().position(|c| *c == key);
        }
        self.slots.push(key);
        Some(self.slots.len() - 1)
    }

    fn labels(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|c| match c {
                Category::Bool(b) => b.to_string(),
                Category::Text(s) => s.clone(),
            })
            .collect()
    }
}

/// Seconds from `reference` back to `t`, as a non-positive number.
fn relative_seconds(reference: Instant, t: Instant) -> f64 {
    if t >= reference {
        t.duration_since(reference).as_secs_f64()
    } else {
        -reference.duration_since(t).as_secs_f64()
    }
}

/// Prepare one chart from the current state of `tree`.
///
/// The reference instant is the later of `now` and the newest sample among
/// the resolved series, so the freshest data is always inside the window.
pub fn prepare_plot(
    tree: &Tree,
    specs: &[SeriesSpec],
    window: TimeWindow,
    now: Instant,
    options: &PlotOptions,
) -> PlotData {
    let resolved: Vec<Option<NodeId>> = specs
        .iter()
        .map(|spec| tree.find_node_by_path(&spec.path).ok().flatten())
        .collect();

    let mut series: Vec<PreparedSeries> = specs
        .iter()
        .zip(&resolved)
        .map(|(spec, node)| PreparedSeries {
            label: spec.label.clone(),
            node: *node,
            status: if node.is_some() {
                SeriesStatus::Empty
            } else {
                SeriesStatus::Missing
            },
            points: Vec::new(),
            latest: None,
        })
        .collect();

    if specs.is_empty() {
        return PlotData::empty(PlotStatus::NoSeries, series, window);
    }

    let newest = resolved
        .iter()
        .flatten()
        .filter_map(|&id| tree.node(id)?.history().back().map(|s| s.timestamp))
        .max();
    let Some(newest) = newest else {
        return PlotData::empty(PlotStatus::WaitingForSamples, series, window);
    };
    let reference = now.max(newest);
    let window_start = window.duration().map(|d| -d.as_secs_f64());

    // Collect per series.
    let collected: Vec<Vec<Collected<'_>>> = resolved
        .iter()
        .map(|node| {
            let Some(node) = node.and_then(|id| tree.node(id)) else {
                return Vec::new();
            };
            collect_window(node.history().iter(), reference, window_start, options.clip_policy)
        })
        .collect();

    if collected.iter().all(Vec::is_empty) {
        return PlotData::empty(PlotStatus::NoSamplesInWindow, series, window);
    }

    // Value axis.
    let mut categories = CategoryMap::default();
    let mut has_numeric = false;
    let mut numeric_min = f64::INFINITY;
    let mut numeric_max = f64::NEG_INFINITY;
    let mut positions: Vec<Vec<f64>> = Vec::with_capacity(collected.len());
    for bucket in &collected {
        let mut ys = Vec::with_capacity(bucket.len());
        for c in bucket {
            let y = match c.sample.value.as_numeric() {
                Ok(v) => {
                    has_numeric = true;
                    if v.is_finite() {
                        numeric_min = numeric_min.min(v);
                        numeric_max = numeric_max.max(v);
                    }
                    v
                }
                Err(_) => categories.slot(&c.sample.value).unwrap_or(0) as f64,
            };
            ys.push(y);
        }
        positions.push(ys);
    }

    let slot_count = categories.slots.len();
    let (mut value_min, mut value_max) = (numeric_min, numeric_max);
    if slot_count > 0 {
        value_min = value_min.min(-0.5);
        value_max = value_max.max(slot_count as f64 - 0.5);
    }
    // Only NaN or infinite samples.
    if !value_min.is_finite() || !value_max.is_finite() {
        value_min = -1.0;
        value_max = 1.0;
    }
    if value_min == value_max {
        value_min -= 1.0;
        value_max += 1.0;
    }

    // Time axis.
    let earliest = collected
        .iter()
        .flatten()
        .map(|c| c.seconds)
        .fold(0.0_f64, f64::min);
    let latest = collected
        .iter()
        .flatten()
        .map(|c| c.seconds)
        .fold(f64::NEG_INFINITY, f64::max);
    let time_start = window_start.unwrap_or(earliest);
    let time_end = 0.0;

    let time_range = (time_end - time_start).max(EPSILON);
    let value_range = (value_max - value_min).max(EPSILON);

    for ((prepared, bucket), ys) in series.iter_mut().zip(&collected).zip(&positions) {
        if bucket.is_empty() {
            continue;
        }
        prepared.status = SeriesStatus::Ready;
        prepared.latest = bucket.last().map(|c| c.sample.value.clone());
        // NaN has no position; infinities pin to the axis edges.
        prepared.points = bucket
            .iter()
            .zip(ys)
            .filter(|(_, y)| !y.is_nan())
            .map(|(c, &y)| PlotPoint {
                x: ((c.seconds - time_start) / time_range).clamp(0.0, 1.0),
                y: ((y - value_min) / value_range).clamp(0.0, 1.0),
                failed: c.sample.failed,
            })
            .collect();
    }

    let ticks = options.tick_count.max(2);
    let time_ticks = (0..ticks)
        .map(|i| {
            let fraction = i as f64 / (ticks - 1) as f64;
            Tick {
                position: fraction,
                label: format_elapsed(fraction * time_range),
            }
        })
        .collect();

    let labels = categories.labels();
    let category_ticks: Vec<Tick> = labels
        .iter()
        .enumerate()
        .map(|(slot, label)| Tick {
            position: (slot as f64 - value_min) / value_range,
            label: label.clone(),
        })
        .collect();
    let value_ticks = if has_numeric {
        // A numeric tick closer than half a step to a category slot gives
        // way to the category label.
        let half_step = 0.5 / (ticks - 1) as f64;
        let mut merged: Vec<Tick> = (0..ticks)
            .map(|i| {
                let fraction = i as f64 / (ticks - 1) as f64;
                Tick {
                    position: fraction,
                    label: format_axis_value(value_min + fraction * (value_max - value_min)),
                }
            })
            .filter(|tick| {
                category_ticks
                    .iter()
                    .all(|c| (c.position - tick.position).abs() >= half_step)
            })
            .collect();
        merged.extend(category_ticks);
        merged.sort_by(|a, b| a.position.total_cmp(&b.position));
        merged
    } else {
        category_ticks
    };

    PlotData {
        status: PlotStatus::Ready,
        series,
        time_start,
        time_end,
        value_min,
        value_max,
        time_ticks,
        value_ticks,
        categories: labels,
        range_label: window_label(window, (latest - earliest).max(0.0)),
    }
}

fn collect_window<'a>(
    history: impl Iterator<Item = &'a TimedSample>,
    reference: Instant,
    window_start: Option<f64>,
    policy: ClipPolicy,
) -> Vec<Collected<'a>> {
    let mut out = Vec::new();
    let mut anchor: Option<&'a TimedSample> = None;
    for sample in history {
        let seconds = relative_seconds(reference, sample.timestamp);
        match window_start {
            Some(start) if seconds < start => anchor = Some(sample),
            Some(start) => {
                if let Some(prev) = anchor.take() {
                    if policy == ClipPolicy::Anchored {
                        out.push(Collected {
                            seconds: start,
                            sample: prev,
                        });
                    }
                }
                out.push(Collected { seconds, sample });
            }
            None => out.push(Collected { seconds, sample }),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Label formatting
// ---------------------------------------------------------------------------

/// Elapsed-time tick label: `0.25s`, `12.5s`, `3m 07s`, `1h 05m`.
pub fn format_elapsed(seconds: f64) -> String {
    if seconds < 1.0 {
        return format!("{seconds:.2}s");
    }
    if seconds < 60.0 {
        return format!("{seconds:.1}s");
    }
    let total = seconds.round() as u64;
    let minutes = total / 60;
    if minutes < 60 {
        return format!("{minutes}m {:02}s", total % 60);
    }
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}

/// Value tick label with precision shrinking as magnitude grows.
pub fn format_axis_value(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1000.0 {
        format!("{value:.0}")
    } else if magnitude >= 100.0 {
        format!("{value:.1}")
    } else {
        format!("{value:.2}")
    }
}

/// Caption above the chart. `span` is the covered history in seconds and is
/// only used for [`TimeWindow::All`].
pub fn window_label(window: TimeWindow, span: f64) -> String {
    match window.duration() {
        Some(d) if d.as_secs_f64() >= 60.0 => {
            format!("Last {:.1} min", d.as_secs_f64() / 60.0)
        }
        Some(d) => format!("Last {:.0} s", d.as_secs_f64()),
        None => format!("Entire history ({span:.1} s span)"),
    }
}
