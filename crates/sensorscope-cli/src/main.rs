//! CLI for sensorscope: a live sensor tree with failure tracking and plots.

mod commands;
mod generator;
mod tui;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sensorscope")]
#[command(about = "sensorscope: watch a live sensor hierarchy, record it, replay it")]
#[command(version = sensorscope_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive dashboard fed by the demo producer
    Monitor {
        /// UI refresh interval in milliseconds
        #[arg(long, default_value = "250")]
        refresh_ms: u64,

        /// Delay between demo samples in milliseconds
        #[arg(long, default_value = "100")]
        sample_interval_ms: u64,

        /// Samples kept per sensor
        #[arg(long, default_value_t = sensorscope_core::DEFAULT_HISTORY_LIMIT)]
        history: usize,

        /// Initial filter text (case-insensitive, matched against full paths)
        #[arg(long)]
        filter: Option<String>,

        /// Start with only failed sensors shown
        #[arg(long)]
        failures_only: bool,

        /// Restore plots from this JSON configuration on start
        #[arg(long)]
        plot_config: Option<String>,

        /// Directory for sample logs
        #[arg(long, default_value = "logs")]
        log_dir: String,

        /// Do not record samples
        #[arg(long)]
        no_log: bool,

        /// Seed for the demo producer (reproducible runs)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Record demo samples to a log without the dashboard
    Record {
        /// How long to record: "30s", "5m", "1h", "500ms". Default: until Ctrl+C
        #[arg(long)]
        duration: Option<String>,

        /// Directory for the sample log
        #[arg(long, default_value = "logs")]
        log_dir: String,

        /// Seed for the demo producer
        #[arg(long)]
        seed: Option<u64>,

        /// Delay between samples in milliseconds
        #[arg(long, default_value = "100")]
        sample_interval_ms: u64,
    },

    /// Replay a recorded sample log and print the resulting tree
    Inspect {
        /// Path to a sample log written by `record` or `monitor`
        log: String,

        /// Only show nodes whose path contains this text
        #[arg(long)]
        filter: Option<String>,

        /// Only show failed sensors and their ancestors
        #[arg(long)]
        failures_only: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Monitor {
            refresh_ms,
            sample_interval_ms,
            history,
            filter,
            failures_only,
            plot_config,
            log_dir,
            no_log,
            seed,
        } => commands::monitor::run(commands::monitor::MonitorOptions {
            refresh_ms,
            sample_interval_ms,
            history,
            filter,
            failures_only,
            plot_config,
            log_dir: (!no_log).then_some(log_dir),
            seed,
        }),
        Commands::Record {
            duration,
            log_dir,
            seed,
            sample_interval_ms,
        } => commands::record::run(duration.as_deref(), &log_dir, seed, sample_interval_ms),
        Commands::Inspect {
            log,
            filter,
            failures_only,
        } => commands::inspect::run(&log, filter.as_deref(), failures_only),
    }
}
