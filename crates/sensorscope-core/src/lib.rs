//! # sensorscope-core
//!
//! Model layer for a live sensor dashboard: a hierarchy of named readings
//! that grows as samples arrive, a filterable view of it that reports
//! minimal add/remove/change events, and chart data built from each
//! sensor's bounded history.
//!
//! ## Quick Start
//!
//! ```
//! use sensorscope_core::{Sample, SensorModel, Value, ViewEvent};
//!
//! let mut model = SensorModel::new();
//! let events = model
//!     .add_sample(&Sample::new(["Server1", "CPU", "Temp"], 42.0))
//!     .unwrap();
//! // Server1, CPU and Temp appear, parents first.
//! assert_eq!(events.len(), 3);
//! assert!(matches!(events[0], ViewEvent::Added { parent: None, .. }));
//!
//! let temp = model.find(&["Server1", "CPU", "Temp"]).unwrap().unwrap();
//! assert_eq!(model.node(temp).unwrap().value(), Some(&Value::from(42.0)));
//! ```
//!
//! ## Architecture
//!
//! Samples → [`Tree`] (creates or updates nodes) → [`VisibilityEngine`]
//! (recomputes the visible set, emits [`ViewEvent`]s) → view.
//!
//! Independently, [`prepare_plot`] resolves series paths against the tree and
//! maps their histories onto one normalised coordinate space. [`PlotManager`]
//! keeps named plots and their persisted configuration, and
//! [`SampleRecorder`] mirrors applied samples into a JSON log.
//!
//! All mutation happens on one thread. Producers hand [`Sample`]s over a
//! queue; nothing in this crate locks.

pub mod error;
pub mod model;
pub mod node;
pub mod plot;
pub mod plots;
pub mod recorder;
pub mod tree;
pub mod value;
pub mod visibility;

pub use error::{ModelError, Result};
pub use model::{Column, ModelConfig, RowAttr, Sample, SensorModel, VisibleRow};
pub use node::{DEFAULT_HISTORY_LIMIT, Node, NodeId, TimedSample};
pub use plot::{
    ClipPolicy, PlotData, PlotOptions, PlotPoint, PlotStatus, PreparedSeries, SeriesSpec,
    SeriesStatus, Tick, TimeWindow, format_axis_value, format_elapsed, prepare_plot,
    window_label,
};
pub use plots::{
    Colour, Plot, PlotConfigFile, PlotConfiguration, PlotManager, PlotSelection, PlotSeries,
    RestoreReport, collect_plot_eligible, load_plot_configurations, save_plot_configurations,
    series_colour,
};
pub use recorder::{RecordedSample, RecorderConfig, SampleLog, SampleRecorder, read_sample_log};
pub use tree::{CreatedEdge, PathInsert, Tree, join_path, split_path};
pub use value::{Value, ValueKind};
pub use visibility::{PATH_SEPARATOR, ViewEvent, VisibilityEngine};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
