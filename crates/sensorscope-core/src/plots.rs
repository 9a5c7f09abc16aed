//! Named plots and their persisted configuration.
//!
//! A [`Plot`] is a list of series (leaf paths plus a colour) and a time
//! window. Series are tracked by path, not by node, so a plot restored before
//! its sensors have reported simply shows them as missing until data arrives.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::node::NodeId;
use crate::plot::{PlotData, PlotOptions, SeriesSpec, TimeWindow, prepare_plot};
use crate::tree::{Tree, join_path, split_path};

// ---------------------------------------------------------------------------
// Colours
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Colour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Colour {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

const PALETTE: [Colour; 8] = [
    Colour::rgb(57, 106, 177),
    Colour::rgb(218, 124, 48),
    Colour::rgb(62, 150, 81),
    Colour::rgb(204, 37, 41),
    Colour::rgb(148, 103, 189),
    Colour::rgb(255, 187, 120),
    Colour::rgb(140, 86, 75),
    Colour::rgb(31, 119, 180),
];

/// Colour of the `index`-th series of a plot. The first eight come from a
/// fixed palette, later ones are spread deterministically over `[30, 230)`.
pub fn series_colour(index: usize) -> Colour {
    if let Some(colour) = PALETTE.get(index) {
        return *colour;
    }
    let channel = |step: usize| ((index * step) % 200 + 30) as u8;
    Colour::rgb(channel(47), channel(67), channel(89))
}

// ---------------------------------------------------------------------------
// Plot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotSeries {
    pub path: Vec<String>,
    pub display_path: String,
    pub colour: Colour,
}

#[derive(Debug, Clone)]
pub struct Plot {
    name: String,
    series: Vec<PlotSeries>,
    window: TimeWindow,
    next_colour: usize,
}

impl Plot {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            series: Vec::new(),
            window: TimeWindow::default(),
            next_colour: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn series(&self) -> &[PlotSeries] {
        &self.series
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn set_window(&mut self, window: TimeWindow) {
        self.window = window;
    }

    pub fn cycle_window(&mut self) -> TimeWindow {
        self.window = self.window.next();
        self.window
    }

    /// Track `path`. Returns `false` if it is already part of the plot.
    pub fn add_sensor_path(&mut self, path: Vec<String>, display_path: String) -> bool {
        if path.is_empty() || self.series.iter().any(|s| s.path == path) {
            return false;
        }
        let colour = series_colour(self.next_colour);
        self.next_colour += 1;
        self.series.push(PlotSeries {
            path,
            display_path,
            colour,
        });
        true
    }

    /// Track each leaf in `nodes`; containers are ignored. Returns `true` if
    /// at least one series was appended.
    pub fn add_nodes(&mut self, tree: &Tree, nodes: &[NodeId]) -> bool {
        let mut appended = false;
        for &id in nodes {
            if !tree.node(id).is_some_and(|n| n.is_leaf()) {
                continue;
            }
            let path = tree.path(id);
            let display = join_path(&path, "/");
            appended |= self.add_sensor_path(path, display);
        }
        appended
    }

    pub fn specs(&self) -> Vec<SeriesSpec> {
        self.series
            .iter()
            .map(|s| SeriesSpec::with_label(s.path.clone(), s.display_path.clone()))
            .collect()
    }

    pub fn render(&self, tree: &Tree, now: Instant, options: &PlotOptions) -> PlotData {
        prepare_plot(tree, &self.specs(), self.window, now, options)
    }

    fn configuration(&self) -> PlotConfiguration {
        PlotConfiguration {
            name: self.name.clone(),
            sensors: self.series.iter().map(|s| s.display_path.clone()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration persistence
// ---------------------------------------------------------------------------

/// Persisted form of one plot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotConfiguration {
    pub name: String,
    #[serde(default)]
    pub sensors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotConfigFile {
    #[serde(default)]
    pub plots: Vec<PlotConfiguration>,
}

pub fn load_plot_configurations(path: &Path) -> Result<Vec<PlotConfiguration>> {
    let text = std::fs::read_to_string(path)?;
    let file: PlotConfigFile = serde_json::from_str(&text)?;
    log::info!(
        "loaded {} plot configuration(s) from {}",
        file.plots.len(),
        path.display()
    );
    Ok(file.plots)
}

pub fn save_plot_configurations(path: &Path, plots: &[PlotConfiguration]) -> Result<()> {
    let file = PlotConfigFile {
        plots: plots.to_vec(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    std::fs::write(path, json)?;
    log::info!("saved {} plot configuration(s) to {}", plots.len(), path.display());
    Ok(())
}

/// Outcome of [`PlotManager::restore_configurations`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Plots that did not exist before the restore.
    pub created: usize,
    pub warnings: Vec<String>,
}

/// Leaves from a selection that can be plotted, and why the rest cannot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlotSelection {
    pub nodes: Vec<NodeId>,
    pub skipped: Vec<String>,
}

/// Filter `selection` down to leaves that carry a value or history.
pub fn collect_plot_eligible(tree: &Tree, selection: &[NodeId]) -> PlotSelection {
    let mut out = PlotSelection::default();
    let mut seen = HashSet::new();
    for &id in selection {
        let Some(node) = tree.node(id) else {
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        let path = tree.full_path(id, "/");
        if !node.is_leaf() {
            out.skipped.push(format!("{path} (not a sensor)"));
        } else if !node.has_value() && !node.has_history() {
            out.skipped.push(format!("{path} (no data)"));
        } else {
            out.nodes.push(id);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// PlotManager
// ---------------------------------------------------------------------------

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Plots keyed by normalised name (trimmed, lower-cased).
#[derive(Debug, Clone, Default)]
pub struct PlotManager {
    plots: BTreeMap<String, Plot>,
    created: usize,
}

impl PlotManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.plots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }

    pub fn has_plot(&self, name: &str) -> bool {
        self.plots.contains_key(&normalize_name(name))
    }

    pub fn plot(&self, name: &str) -> Option<&Plot> {
        self.plots.get(&normalize_name(name))
    }

    pub fn plot_mut(&mut self, name: &str) -> Option<&mut Plot> {
        self.plots.get_mut(&normalize_name(name))
    }

    /// Create `name` seeded with `nodes`, or return the existing plot
    /// untouched if one with the same normalised name exists.
    pub fn create_plot(&mut self, tree: &Tree, name: &str, nodes: &[NodeId]) -> &mut Plot {
        let key = normalize_name(name);
        let created = &mut self.created;
        self.plots.entry(key).or_insert_with(|| {
            *created += 1;
            let mut plot = Plot::new(name);
            plot.add_nodes(tree, nodes);
            log::debug!("created plot {:?} with {} series", plot.name(), plot.series().len());
            plot
        })
    }

    /// Append `nodes` to an existing plot. `false` if the plot is unknown or
    /// nothing new was added.
    pub fn add_sensors_to_plot(&mut self, tree: &Tree, name: &str, nodes: &[NodeId]) -> bool {
        match self.plot_mut(name) {
            Some(plot) => plot.add_nodes(tree, nodes),
            None => false,
        }
    }

    /// Display names, sorted.
    pub fn plot_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plots.values().map(|p| p.name.clone()).collect();
        names.sort();
        names
    }

    pub fn remove_plot(&mut self, name: &str) -> bool {
        self.plots.remove(&normalize_name(name)).is_some()
    }

    pub fn close_all(&mut self) {
        self.plots.clear();
    }

    /// First free `Plot N`, counting from the number of plots created so far.
    pub fn next_default_name(&self) -> String {
        let mut n = self.created + 1;
        loop {
            let name = format!("Plot {n}");
            if !self.has_plot(&name) {
                return name;
            }
            n += 1;
        }
    }

    /// Persistable form of every plot, sorted case-insensitively by name.
    pub fn configurations(&self) -> Vec<PlotConfiguration> {
        let mut configs: Vec<PlotConfiguration> =
            self.plots.values().map(Plot::configuration).collect();
        configs.sort_by_key(|c| c.name.to_lowercase());
        configs
    }

    /// Recreate plots from saved configurations.
    ///
    /// Paths that do not resolve yet are kept as pending series. Paths naming
    /// a container are dropped. A configuration that ends up with no series
    /// is skipped entirely.
    pub fn restore_configurations(
        &mut self,
        tree: &Tree,
        configs: &[PlotConfiguration],
    ) -> RestoreReport {
        let mut report = RestoreReport::default();

        for cfg in configs {
            if cfg.sensors.is_empty() {
                report
                    .warnings
                    .push(format!("Plot '{}' skipped (no sensors listed).", cfg.name));
                continue;
            }

            let mut pending: Vec<(Vec<String>, String)> = Vec::new();
            let mut seen = HashSet::new();
            for raw in &cfg.sensors {
                let segments = split_path(raw);
                if segments.is_empty() || !seen.insert(join_path(&segments, "/")) {
                    continue;
                }
                match tree.find_node_by_path(&segments).ok().flatten() {
                    Some(id) if tree.node(id).is_some_and(|n| !n.is_leaf()) => {
                        report.warnings.push(format!(
                            "Plot '{}': path '{raw}' is not a sensor.",
                            cfg.name
                        ));
                    }
                    Some(id) => pending.push((tree.path(id), tree.full_path(id, "/"))),
                    None => {
                        log::warn!("plot {:?}: sensor {raw:?} not found yet", cfg.name);
                        report.warnings.push(format!(
                            "Plot '{}': sensor '{raw}' not found (awaiting data).",
                            cfg.name
                        ));
                        pending.push((segments, raw.clone()));
                    }
                }
            }

            if pending.is_empty() {
                report
                    .warnings
                    .push(format!("Plot '{}' skipped (no matching sensors).", cfg.name));
                continue;
            }

            let existed = self.has_plot(&cfg.name);
            let plot = self.create_plot(tree, &cfg.name, &[]);
            for (path, display) in pending {
                plot.add_sensor_path(path, display);
            }
            if !existed {
                report.created += 1;
            }
        }

        log::info!(
            "restored {} plot(s), {} warning(s)",
            report.created,
            report.warnings.len()
        );
        report
    }
}
