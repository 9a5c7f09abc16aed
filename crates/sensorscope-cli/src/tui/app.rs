//! Dashboard state and event loop.
//!
//! The app owns the model. Samples arrive from the producer thread over a
//! channel and are drained on every tick; nothing here is shared across
//! threads except the producer's pause flag.

use std::cell::RefCell;
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;
use ratatui::widgets::TableState;
use sensorscope_core::{
    ModelConfig, NodeId, Plot, PlotManager, PlotOptions, RecorderConfig, Sample, SampleRecorder,
    SensorModel, ViewEvent, VisibleRow, collect_plot_eligible, load_plot_configurations,
    save_plot_configurations,
};

use crate::generator::ProducerEvent;

/// Upper bound on samples applied per tick so input stays responsive under
/// a flooding producer.
const MAX_SAMPLES_PER_TICK: usize = 5_000;

const DEFAULT_PLOT_CONFIG: &str = "plots.json";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub refresh: Duration,
    pub history: usize,
    pub filter: Option<String>,
    pub failures_only: bool,
    pub plot_config: Option<PathBuf>,
    /// `None` disables recording.
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            refresh: Duration::from_millis(250),
            history: sensorscope_core::DEFAULT_HISTORY_LIMIT,
            filter: None,
            failures_only: false,
            plot_config: None,
            log_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Input mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Editing the filter. The filter is applied on every keystroke; `previous`
    /// is restored on Esc.
    Filter { buffer: String, previous: String },
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct App {
    model: SensorModel,
    plots: PlotManager,
    plot_options: PlotOptions,
    active_plot: Option<String>,
    expanded: Rc<RefCell<HashSet<NodeId>>>,
    rows: Vec<VisibleRow>,
    cursor: usize,
    table_state: TableState,
    mode: InputMode,
    refresh_rate: Duration,
    running: bool,
    rx: Receiver<ProducerEvent>,
    producer_active: Arc<AtomicBool>,
    connected: bool,
    samples_applied: u64,
    samples_rejected: u64,
    plot_config: PathBuf,
    log_dir: Option<PathBuf>,
    recorder: Option<SampleRecorder>,
    /// Last finished log, printed after the terminal is restored.
    last_log: Option<PathBuf>,
    status: Option<String>,
}

impl App {
    pub fn new(
        config: AppConfig,
        rx: Receiver<ProducerEvent>,
        producer_active: Arc<AtomicBool>,
    ) -> Self {
        let mut model = SensorModel::with_config(ModelConfig {
            history_limit: config.history,
        });
        let expanded = Rc::new(RefCell::new(HashSet::new()));
        let query = Rc::clone(&expanded);
        model.set_expansion_query(move |id| query.borrow().contains(&id));
        if let Some(filter) = &config.filter {
            model.set_filter(filter);
        }
        model.set_show_failures_only(config.failures_only);

        let mut app = Self {
            model,
            plots: PlotManager::new(),
            plot_options: PlotOptions::default(),
            active_plot: None,
            expanded,
            rows: Vec::new(),
            cursor: 0,
            table_state: TableState::default().with_selected(Some(0)),
            mode: InputMode::Normal,
            refresh_rate: config.refresh,
            running: true,
            rx,
            producer_active,
            connected: false,
            samples_applied: 0,
            samples_rejected: 0,
            plot_config: config
                .plot_config
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PLOT_CONFIG)),
            log_dir: config.log_dir,
            recorder: None,
            last_log: None,
            status: None,
        };

        if config.plot_config.as_ref().is_some_and(|p| p.exists()) {
            app.load_plots();
        }
        if app.log_dir.is_some() {
            app.start_log();
        }
        app
    }

    pub fn run(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // Restore the terminal before the panic message is printed.
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
            original_hook(info);
        }));

        let result = self.run_loop(&mut terminal);

        let _ = std::panic::take_hook();
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            crossterm::cursor::Show
        )?;

        self.stop_log();
        if let Some(path) = &self.last_log {
            println!("Sample log saved to {}", path.display());
        }

        result
    }

    fn run_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
        self.tick();
        let mut last_tick = Instant::now();

        while self.running {
            terminal.draw(|f| super::ui::draw(f, self))?;

            if event::poll(Duration::from_millis(50))?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                self.handle_key(key.code);
            }

            if last_tick.elapsed() >= self.refresh_rate {
                self.tick();
                last_tick = Instant::now();
            }
        }

        Ok(())
    }

    /// Drain pending producer events into the model.
    pub fn tick(&mut self) {
        for _ in 0..MAX_SAMPLES_PER_TICK {
            match self.rx.try_recv() {
                Ok(ProducerEvent::Sample(sample)) => self.apply_sample(&sample),
                Ok(ProducerEvent::Connected(connected)) => {
                    self.connected = connected;
                    self.status = Some(if connected {
                        "Producer connected".to_string()
                    } else {
                        "Producer disconnected".to_string()
                    });
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.connected = false;
                    break;
                }
            }
        }
    }

    fn apply_sample(&mut self, sample: &Sample) {
        match self.model.add_sample(sample) {
            Ok(events) => {
                self.samples_applied += 1;
                self.apply_events(events);
            }
            Err(e) => {
                self.samples_rejected += 1;
                log::warn!("rejected sample for {}: {e}", sample.display_path());
                self.status = Some(format!("Rejected {}: {e}", sample.display_path()));
                return;
            }
        }

        if let Some(recorder) = self.recorder.as_mut()
            && let Err(e) = recorder.record(sample)
        {
            log::warn!("sample log write failed: {e}");
            self.status = Some(format!("Logging stopped: {e}"));
            self.recorder = None;
        }
    }

    /// Structural events rebuild the row list; new nodes start expanded.
    fn apply_events(&mut self, events: Vec<ViewEvent>) {
        let mut structural = false;
        for event in events {
            match event {
                ViewEvent::Added { node, .. } => {
                    self.expanded.borrow_mut().insert(node);
                    structural = true;
                }
                ViewEvent::Removed { .. } => structural = true,
                ViewEvent::Cleared => {
                    self.expanded.borrow_mut().clear();
                    structural = true;
                }
                ViewEvent::Changed(_) => {}
            }
        }
        if structural {
            self.rebuild_rows();
        }
    }

    fn rebuild_rows(&mut self) {
        let selected = self.selected_node();
        let expanded = Rc::clone(&self.expanded);
        self.rows = self
            .model
            .visible_rows(|id| expanded.borrow().contains(&id));
        self.cursor = selected
            .and_then(|id| self.rows.iter().position(|r| r.node == id))
            .unwrap_or_else(|| self.cursor.min(self.rows.len().saturating_sub(1)));
        self.table_state.select(Some(self.cursor));
    }

    pub fn handle_key(&mut self, key: KeyCode) {
        if let InputMode::Filter { .. } = self.mode {
            self.handle_filter_key(key);
            return;
        }

        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Up | KeyCode::Char('k') => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.table_state.select(Some(self.cursor));
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.cursor < self.rows.len().saturating_sub(1) {
                    self.cursor += 1;
                    self.table_state.select(Some(self.cursor));
                }
            }
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(id) = self.selected_node() {
                    let expanded = self.expanded.borrow().contains(&id);
                    self.set_expanded(id, !expanded);
                }
            }
            KeyCode::Right => {
                if let Some(id) = self.selected_node() {
                    self.set_expanded(id, true);
                }
            }
            KeyCode::Left => {
                if let Some(id) = self.selected_node() {
                    self.set_expanded(id, false);
                }
            }
            KeyCode::Char('+') => {
                self.expanded
                    .borrow_mut()
                    .extend(self.model.tree().preorder());
                self.rebuild_rows();
            }
            KeyCode::Char('-') => {
                self.expanded.borrow_mut().clear();
                self.rebuild_rows();
            }
            KeyCode::Char('/') => {
                let current = self.model.filter().to_string();
                self.mode = InputMode::Filter {
                    buffer: current.clone(),
                    previous: current,
                };
            }
            KeyCode::Char('f') => {
                let enabled = !self.model.is_showing_failures_only();
                let events = self.model.set_show_failures_only(enabled);
                self.apply_events(events);
                self.status = Some(if enabled {
                    "Showing failed sensors only".to_string()
                } else {
                    "Showing all sensors".to_string()
                });
            }
            KeyCode::Char('p') => self.plot_selection(true),
            KeyCode::Char('a') => self.plot_selection(false),
            KeyCode::Tab => self.cycle_plot(),
            KeyCode::Char('x') => self.close_active_plot(),
            KeyCode::Char('w') => {
                if let Some(plot) = self.active_plot_mut() {
                    let window = plot.cycle_window();
                    self.status = Some(format!("Time window: {}", window.short_label()));
                }
            }
            KeyCode::Char('g') => {
                let was_active = self.producer_active.load(Ordering::SeqCst);
                self.producer_active.store(!was_active, Ordering::SeqCst);
                self.status = Some(if was_active {
                    "Producer paused".to_string()
                } else {
                    "Producer resumed".to_string()
                });
            }
            KeyCode::Char('l') => self.rotate_log(),
            KeyCode::Char('c') => {
                let events = self.model.clear();
                self.apply_events(events);
                self.status = Some("Cleared all sensors".to_string());
            }
            KeyCode::Char('s') => self.save_plots(),
            KeyCode::Char('o') => self.load_plots(),
            _ => {}
        }
    }

    fn handle_filter_key(&mut self, key: KeyCode) {
        let InputMode::Filter { buffer, previous } = &mut self.mode else {
            return;
        };
        let text = match key {
            KeyCode::Enter => {
                self.mode = InputMode::Normal;
                return;
            }
            KeyCode::Esc => {
                let restore = std::mem::take(previous);
                self.mode = InputMode::Normal;
                restore
            }
            KeyCode::Backspace => {
                buffer.pop();
                buffer.clone()
            }
            KeyCode::Char(c) => {
                buffer.push(c);
                buffer.clone()
            }
            _ => return,
        };
        let events = self.model.set_filter(&text);
        self.apply_events(events);
    }

    fn set_expanded(&mut self, id: NodeId, expanded: bool) {
        if !self.model.is_container(Some(id)) {
            return;
        }
        let changed = if expanded {
            self.expanded.borrow_mut().insert(id)
        } else {
            self.expanded.borrow_mut().remove(&id)
        };
        if changed {
            self.rebuild_rows();
        }
    }

    // -- plots -------------------------------------------------------------

    /// The cursor row, or every leaf below it for a container.
    fn selection(&self) -> Vec<NodeId> {
        match self.selected_node() {
            Some(id) => self.model.tree().leaf_nodes(id),
            None => Vec::new(),
        }
    }

    fn plot_selection(&mut self, new_plot: bool) {
        let picked = collect_plot_eligible(self.model.tree(), &self.selection());
        if picked.nodes.is_empty() {
            self.status = Some(if picked.skipped.is_empty() {
                "Nothing selected to plot".to_string()
            } else {
                format!("Nothing to plot: {}", picked.skipped.join(", "))
            });
            return;
        }

        let target = match (&self.active_plot, new_plot) {
            (Some(name), false) if self.plots.has_plot(name) => name.clone(),
            _ => self.plots.next_default_name(),
        };
        let message = if self.plots.has_plot(&target) {
            if self
                .plots
                .add_sensors_to_plot(self.model.tree(), &target, &picked.nodes)
            {
                format!("Added {} sensor(s) to {target}", picked.nodes.len())
            } else {
                format!("Already plotted in {target}")
            }
        } else {
            let plot = self
                .plots
                .create_plot(self.model.tree(), &target, &picked.nodes);
            format!("Created {} with {} sensor(s)", plot.name(), plot.series().len())
        };
        self.active_plot = Some(target);
        self.status = Some(if picked.skipped.is_empty() {
            message
        } else {
            format!("{message}; skipped {}", picked.skipped.join(", "))
        });
    }

    fn cycle_plot(&mut self) {
        let names = self.plots.plot_names();
        if names.is_empty() {
            self.status = Some("No plots".to_string());
            return;
        }
        let next = self
            .active_plot
            .as_ref()
            .and_then(|active| names.iter().position(|n| n == active))
            .map_or(0, |i| (i + 1) % names.len());
        self.active_plot = Some(names[next].clone());
    }

    fn close_active_plot(&mut self) {
        if let Some(name) = self.active_plot.take()
            && self.plots.remove_plot(&name)
        {
            self.status = Some(format!("Closed {name}"));
        }
        self.active_plot = self.plots.plot_names().into_iter().next();
    }

    fn save_plots(&mut self) {
        let configs = self.plots.configurations();
        self.status = Some(
            match save_plot_configurations(&self.plot_config, &configs) {
                Ok(()) => format!(
                    "Saved {} plot(s) to {}",
                    configs.len(),
                    self.plot_config.display()
                ),
                Err(e) => format!("Saving plots failed: {e}"),
            },
        );
    }

    fn load_plots(&mut self) {
        let configs = match load_plot_configurations(&self.plot_config) {
            Ok(configs) => configs,
            Err(e) => {
                log::warn!("loading {} failed: {e}", self.plot_config.display());
                self.status = Some(format!("Loading plots failed: {e}"));
                return;
            }
        };
        let report = self
            .plots
            .restore_configurations(self.model.tree(), &configs);
        for warning in &report.warnings {
            log::warn!("{warning}");
        }
        if self.active_plot.is_none() {
            self.active_plot = configs
                .iter()
                .find(|c| self.plots.has_plot(&c.name))
                .and_then(|c| self.plots.plot(&c.name))
                .map(|p| p.name().to_string());
        }
        self.status = Some(match report.warnings.first() {
            Some(first) => format!(
                "Restored {} plot(s), {} warning(s): {first}",
                report.created,
                report.warnings.len()
            ),
            None => format!("Restored {} plot(s)", report.created),
        });
    }

    // -- sample log --------------------------------------------------------

    fn start_log(&mut self) {
        let Some(dir) = self.log_dir.clone() else {
            return;
        };
        match SampleRecorder::new(&RecorderConfig { output_dir: dir }) {
            Ok(recorder) => {
                self.status = Some(format!("Logging to {}", recorder.path().display()));
                self.recorder = Some(recorder);
            }
            Err(e) => {
                log::warn!("could not open sample log: {e}");
                self.status = Some(format!("Logging failed: {e}"));
            }
        }
    }

    fn stop_log(&mut self) {
        if let Some(recorder) = self.recorder.take() {
            match recorder.finish() {
                Ok(path) => self.last_log = Some(path),
                Err(e) => self.status = Some(format!("Closing sample log failed: {e}")),
            }
        }
    }

    fn rotate_log(&mut self) {
        if self.log_dir.is_none() {
            self.status = Some("Logging is disabled".to_string());
            return;
        }
        self.stop_log();
        self.start_log();
    }

    // -- accessors for the renderer ----------------------------------------

    pub fn model(&self) -> &SensorModel {
        &self.model
    }

    pub fn rows(&self) -> &[VisibleRow] {
        &self.rows
    }

    pub fn table_state(&self) -> &TableState {
        &self.table_state
    }

    pub fn selected_node(&self) -> Option<NodeId> {
        self.rows.get(self.cursor).map(|r| r.node)
    }

    pub fn is_expanded(&self, id: NodeId) -> bool {
        self.expanded.borrow().contains(&id)
    }

    pub fn mode(&self) -> &InputMode {
        &self.mode
    }

    pub fn active_plot(&self) -> Option<&Plot> {
        self.active_plot.as_deref().and_then(|n| self.plots.plot(n))
    }

    fn active_plot_mut(&mut self) -> Option<&mut Plot> {
        let name = self.active_plot.clone()?;
        self.plots.plot_mut(&name)
    }

    pub fn plot_count(&self) -> usize {
        self.plots.len()
    }

    pub fn plot_options(&self) -> &PlotOptions {
        &self.plot_options
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_paused(&self) -> bool {
        !self.producer_active.load(Ordering::SeqCst)
    }

    pub fn samples_applied(&self) -> u64 {
        self.samples_applied
    }

    pub fn samples_rejected(&self) -> u64 {
        self.samples_rejected
    }

    pub fn recording(&self) -> Option<&SampleRecorder> {
        self.recorder.as_ref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}
