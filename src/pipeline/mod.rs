//! Fan-out/fan-in orchestration of unit processing.

mod cancel;
mod collector;
mod controller;
mod metrics;
mod scheduler;
mod state;


pub use cancel::CancelSignal;
pub use collector::{error_marker, Collector};
pub use controller::{Controller, FailedUnit, PipelinePhase, PipelineReport};
pub use metrics::{Metrics, MetricsReporter, MetricsSnapshot};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerEvent, SchedulerStats};
pub use state::{PipelineState, UnitOutcome, UnitResult};
