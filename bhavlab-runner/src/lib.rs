//! BhavLab Runner: configuration, acquisition driver, deltas, signals, exports.
//!
//! This crate builds on `bhavlab-core` to provide:
//! - `bhavlab.toml` configuration with per-section defaults
//! - The acquisition loop over candidate locations with exhausted-window reporting
//! - Day-over-day deltas keyed by full contract identity
//! - Feature extraction and the threshold signal classifier
//! - JSON/CSV/text export of a run's signals

pub mod config;
pub mod delta;
pub mod export;
pub mod features;
pub mod pipeline;
pub mod signal;

pub use config::{BhavlabConfig, ConfigError, HolidayConfig, SourceConfig, StoreConfig};
pub use delta::{diff, DeltaRecord, MetricDelta, TRACKED_METRICS};
pub use export::{render_summary, save_artifacts, SignalReport};
pub use features::{Features, Momentum, VolumeBaseline};
pub use pipeline::{build_calendar, Attempt, Pipeline, PreviousData, RunError, RunOutput};
pub use signal::{
    Action, Confidence, LabelStyle, Setup, Signal, SignalClassifier, SignalSettings,
    SignalThresholds,
};
