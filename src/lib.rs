//! chunkmill
//!
//! Rewrites a large text with a language model by splitting it into ordered
//! units, sending the units to an inference backend under a hard concurrency
//! cap, and reassembling the per-unit outputs in their original order.
//!
//! # Architecture
//!
//! - **Segment**: sentence detection and grouping into prompt-wrapped units
//! - **Inference**: the async client trait plus HTTP and offline backends
//! - **Pipeline**: semaphore-gated scheduler, collector, controller state machine, metrics
//! - **I/O**: source loading, ordered output sink and JSON run report
//!
//! # Usage
//!
//! ```no_run
//! use chunkmill::{run_pipeline, CancelSignal, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file(&"chunkmill.yaml".into())?;
//!     let report = run_pipeline(config, CancelSignal::new()).await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod inference;
pub mod io;
pub mod pipeline;
pub mod segment;

pub use config::{Config, PipelineConfig, ProviderKind};
pub use error::{PipelineError, UnitError};
pub use inference::{client_from_config, CallConfig, InferenceClient, ProviderError};
pub use io::{load_source, FileSink, OutputSink};
pub use pipeline::{CancelSignal, Controller, MetricsReporter, PipelinePhase, PipelineReport};
pub use segment::{PromptTemplate, SegmentStats, Segmenter, Unit};

use anyhow::{Context, Result};

/// Segmenter configured from the input section (system prompt file or the
/// default directive).
pub fn segmenter_from_config(config: &Config) -> Segmenter {
    let template = PromptTemplate::load(config.input.system_prompt_path.as_deref());
    Segmenter::with_template(template)
}

/// Segment the configured input without dispatching anything.
pub async fn analyze(config: &Config) -> Result<SegmentStats> {
    config.validate()?;
    let text = load_source(&config.input.path).await?;
    let units = segmenter_from_config(config).segment(&text, config.processing.unit_size)?;
    Ok(SegmentStats::from_units(&units))
}

/// Run the full pipeline: load, segment, dispatch, reassemble, write.
///
/// The reassembled document is written for every terminal state except
/// `Failed`, so a cancelled or partially failed run still leaves its
/// best-effort output behind.
pub async fn run_pipeline(config: Config, cancel: CancelSignal) -> Result<PipelineReport> {
    config.validate()?;

    tracing::info!("Starting chunkmill pipeline");
    let text = load_source(&config.input.path).await?;

    let client = client_from_config(&config.provider).context("Failed to create inference client")?;
    tracing::info!("Using {:?} backend ({})", config.provider.kind, client.name());

    let call_config = CallConfig::default().merged(&config.call_config);
    let mut controller = Controller::new(
        segmenter_from_config(&config),
        client,
        call_config,
        config.pipeline_config(),
    );
    if config.processing.enable_metrics {
        controller = controller.with_progress_interval(config.processing.metrics_interval_secs);
    }
    let metrics = controller.metrics();

    let report = controller.run(&text, &cancel).await?;

    FileSink::new(&config.output.path)
        .write(&report.outputs)
        .await
        .with_context(|| format!("Failed to write {}", config.output.path.display()))?;

    if let Some(path) = &config.output.report_path {
        io::write_report(&report, path).await?;
    }

    if config.processing.enable_metrics {
        MetricsReporter::new(
            metrics.clone(),
            config.processing.metrics_interval_secs,
            report.total_units as u64,
        )
        .print_summary();

        if let Some(path) = &config.processing.metrics_output_path {
            if let Err(e) = metrics.snapshot().save_to_file(path) {
                tracing::warn!("Failed to save metrics to {}: {}", path.display(), e);
            }
        }
    }

    tracing::info!("Pipeline finished: {}", report);
    Ok(report)
}

/// Build a Tokio runtime with the specified configuration.
pub fn build_runtime(worker_threads: Option<usize>) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    builder.enable_all();

    Ok(builder.build()?)
}
