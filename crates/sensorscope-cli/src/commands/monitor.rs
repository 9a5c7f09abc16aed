//! `sensorscope monitor`: interactive dashboard over the demo producer.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::generator::spawn_producer;
use crate::tui::app::{App, AppConfig};

pub struct MonitorOptions {
    pub refresh_ms: u64,
    pub sample_interval_ms: u64,
    pub history: usize,
    pub filter: Option<String>,
    pub failures_only: bool,
    pub plot_config: Option<String>,
    /// `None` when recording is disabled.
    pub log_dir: Option<String>,
    pub seed: Option<u64>,
}

pub fn run(options: MonitorOptions) {
    let active = Arc::new(AtomicBool::new(true));
    let running = Arc::new(AtomicBool::new(true));
    let (rx, handle) = spawn_producer(
        Duration::from_millis(options.sample_interval_ms.max(1)),
        options.seed,
        active.clone(),
        running.clone(),
    );

    let config = AppConfig {
        refresh: Duration::from_millis(options.refresh_ms.max(10)),
        history: options.history,
        filter: options.filter,
        failures_only: options.failures_only,
        plot_config: options.plot_config.map(PathBuf::from),
        log_dir: options.log_dir.map(PathBuf::from),
    };
    let mut app = App::new(config, rx, active);
    let result = app.run();

    // Dropping the app drops the receiver, which also ends the producer.
    drop(app);
    running.store(false, Ordering::SeqCst);
    if handle.join().is_err() {
        log::warn!("producer thread panicked");
    }

    if let Err(e) = result {
        eprintln!("TUI error: {e}");
        std::process::exit(1);
    }
}
