//! Pipeline lifecycle: segment, dispatch, collect, reassemble.

use super::{
    CancelSignal, Metrics, MetricsReporter, MetricsSnapshot, PipelineState, Scheduler,
    SchedulerConfig, SchedulerEvent,
};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, UnitError};
use crate::inference::{CallConfig, InferenceClient};
use crate::segment::{Segmenter, Unit};
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Phases of a pipeline run. The last four are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Idle,
    Segmented,
    Dispatching,
    Collecting,
    Complete,
    PartialComplete,
    Cancelled,
    Failed,
}

impl PipelinePhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelinePhase::Complete
                | PipelinePhase::PartialComplete
                | PipelinePhase::Cancelled
                | PipelinePhase::Failed
        )
    }

    pub fn can_transition_to(self, next: PipelinePhase) -> bool {
        use PipelinePhase::*;

        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Idle, Segmented)
                | (Idle, Failed)
                | (Segmented, Dispatching)
                | (Segmented, Failed)
                | (Dispatching, Collecting)
                | (Collecting, Complete)
                | (Collecting, PartialComplete)
                | (_, Cancelled)
        )
    }
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::Segmented => "segmented",
            PipelinePhase::Dispatching => "dispatching",
            PipelinePhase::Collecting => "collecting",
            PipelinePhase::Complete => "complete",
            PipelinePhase::PartialComplete => "partially complete",
            PipelinePhase::Cancelled => "cancelled",
            PipelinePhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// A unit that produced no text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUnit {
    pub index: usize,
    pub error: UnitError,
    pub message: String,
}

/// Outcome of a run that reached a terminal phase other than `Failed`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub status: PipelinePhase,
    pub total_units: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedUnit>,
    /// Per-unit outputs in index order; failed units hold an error marker.
    #[serde(skip)]
    pub outputs: Vec<String>,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub metrics: MetricsSnapshot,
}

impl PipelineReport {
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failed.iter().map(|f| f.index).collect()
    }

    pub fn cancelled_count(&self) -> usize {
        self.failed.iter().filter(|f| f.error.is_cancelled()).count()
    }
}

impl std::fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Status: {}, Units: {}, Succeeded: {}, Failed: {}, Elapsed: {:.1}s",
            self.status,
            self.total_units,
            self.succeeded,
            self.failed.len(),
            self.elapsed.as_secs_f64()
        )
    }
}

/// Drives one pipeline run. A controller runs once; build a new one per run.
pub struct Controller {
    segmenter: Segmenter,
    client: Arc<dyn InferenceClient>,
    call_config: Arc<CallConfig>,
    config: PipelineConfig,
    metrics: Arc<Metrics>,
    progress_interval: Option<u64>,
    phase: PipelinePhase,
}

impl Controller {
    /// Create a controller in the `Idle` phase with fresh metrics.
    pub fn new(
        segmenter: Segmenter,
        client: Arc<dyn InferenceClient>,
        call_config: CallConfig,
        config: PipelineConfig,
    ) -> Self {
        Self {
            segmenter,
            client,
            call_config: Arc::new(call_config),
            config,
            metrics: Metrics::new(),
            progress_interval: None,
            phase: PipelinePhase::Idle,
        }
    }

    /// Log progress every `secs` seconds while units are in flight.
    pub fn with_progress_interval(mut self, secs: u64) -> Self {
        self.progress_interval = Some(secs);
        self
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    fn transition(&mut self, next: PipelinePhase) -> bool {
        if self.phase.can_transition_to(next) {
            tracing::debug!("Pipeline {} -> {}", self.phase, next);
            self.phase = next;
            true
        } else {
            tracing::warn!("Ignoring pipeline transition {} -> {}", self.phase, next);
            false
        }
    }

    fn fail(&mut self, error: PipelineError) -> PipelineError {
        tracing::error!("Pipeline failed: {}", error);
        self.transition(PipelinePhase::Failed);
        error
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        if self.phase != PipelinePhase::Idle {
            return Err(PipelineError::Config(format!(
                "controller already ran (phase: {})",
                self.phase
            )));
        }
        self.config.validate().map_err(|e| self.fail(e))
    }

    /// Segment `text` and process every unit.
    ///
    /// Configuration and segmentation errors are returned before any call is
    /// made. Per-unit failures never surface here; they are reported in the
    /// [`PipelineReport`].
    pub async fn run(
        &mut self,
        text: &str,
        cancel: &CancelSignal,
    ) -> Result<PipelineReport, PipelineError> {
        self.start()?;
        let units = self
            .segmenter
            .segment(text, self.config.unit_size)
            .map_err(|e| self.fail(e))?;
        self.process(units, cancel).await
    }

    /// Process pre-built units. Indices must be contiguous from 0.
    pub async fn run_units(
        &mut self,
        units: Vec<Unit>,
        cancel: &CancelSignal,
    ) -> Result<PipelineReport, PipelineError> {
        self.start()?;
        if let Some((pos, unit)) = units.iter().enumerate().find(|(i, u)| u.index() != *i) {
            return Err(self.fail(PipelineError::Segmentation(format!(
                "unit at position {} has index {}",
                pos,
                unit.index()
            ))));
        }
        self.process(units, cancel).await
    }

    async fn process(
        &mut self,
        units: Vec<Unit>,
        cancel: &CancelSignal,
    ) -> Result<PipelineReport, PipelineError> {
        let started = Instant::now();
        self.transition(PipelinePhase::Segmented);

        let state = PipelineState::new(units, self.config.max_concurrent);
        let total = state.len();
        tracing::info!(
            "Processing {} units ({} concurrent, {} sentences per unit)",
            total,
            state.max_concurrent(),
            self.config.unit_size
        );

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let reporter_handle = match self.progress_interval {
            Some(secs) if total > 0 => {
                let reporter = MetricsReporter::new(self.metrics.clone(), secs, total as u64);
                Some(tokio::spawn(reporter.run(shutdown_rx)))
            }
            _ => {
                drop(shutdown_rx);
                None
            }
        };

        let scheduler = Scheduler::new(
            self.client.clone(),
            self.call_config.clone(),
            self.metrics.clone(),
            SchedulerConfig::from(&self.config),
        );
        let (events_tx, mut events_rx) = mpsc::channel(total + 1);

        self.transition(PipelinePhase::Dispatching);

        let dispatch = scheduler.run(state.units(), cancel, events_tx);
        let collect = async {
            let collector = state.collector();
            while let Some(event) = events_rx.recv().await {
                match event {
                    SchedulerEvent::DispatchComplete { dispatched, total } => {
                        tracing::debug!("Dispatch finished: {}/{} units issued", dispatched, total);
                        if !cancel.is_cancelled() {
                            self.transition(PipelinePhase::Collecting);
                        }
                    }
                    SchedulerEvent::Result(result) => {
                        let index = result.index;
                        if let Err(e) = collector.record(result) {
                            tracing::error!("Dropping result for unit {}: {}", index, e);
                            continue;
                        }
                        tracing::debug!("Unit {} done ({}/{})", index, collector.recorded(), total);
                    }
                }
            }
        };
        let (stats, ()) = tokio::join!(dispatch, collect);
        tracing::debug!("Scheduler: {}", stats);

        let _ = shutdown_tx.send(()).await;
        if let Some(handle) = reporter_handle {
            let _ = handle.await;
        }

        let collector = state.collector();
        let cancelled = cancel.is_cancelled();
        if !state.is_terminal() {
            let fill = if cancelled {
                UnitError::Cancelled
            } else {
                UnitError::Provider("unit task ended without a result".to_string())
            };
            let marked = collector.mark_unresolved(fill);
            tracing::warn!("Marked {} unresolved units as failed", marked.len());
        }

        let terminal = if cancelled {
            PipelinePhase::Cancelled
        } else if collector.failure_count() == 0 {
            PipelinePhase::Complete
        } else {
            PipelinePhase::PartialComplete
        };
        self.transition(terminal);

        let outputs = collector.reassemble()?;
        let failed: Vec<FailedUnit> = collector
            .failures()
            .into_iter()
            .map(|(index, error)| FailedUnit {
                index,
                message: error.to_string(),
                error,
            })
            .collect();

        let report = PipelineReport {
            status: self.phase,
            total_units: total,
            succeeded: total - failed.len(),
            failed,
            outputs,
            elapsed: started.elapsed(),
            metrics: self.metrics.snapshot(),
        };
        tracing::info!("{}", report);
        Ok(report)
    }
}
