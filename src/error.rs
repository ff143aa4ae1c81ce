//! Error taxonomy for the rewrite pipeline.
//!
//! Two levels exist. [`PipelineError`] is fatal and surfaces to the caller
//! before (or instead of) a report. [`UnitError`] belongs to a single unit and
//! is absorbed into that unit's result; it never aborts sibling units.

use serde::Serialize;
use thiserror::Error;

/// Pipeline-level failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid `max_concurrent`, `unit_size` or related settings. Raised
    /// before any dispatch.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The source could not be read or holds nothing to segment.
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// Reassembly was requested before every unit had a result.
    #[error("Reassembly requested with {recorded} of {expected} results recorded")]
    AggregateIncomplete { recorded: usize, expected: usize },

    /// A second result arrived for an index that already has one.
    #[error("Result for unit {0} was already recorded")]
    DuplicateResult(usize),

    /// A result arrived for an index outside `[0, N)`.
    #[error("Result for unknown unit {0}")]
    UnknownIndex(usize),

    /// Writing the reassembled document or report failed.
    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
}

/// Why a single unit has no transformed text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UnitError {
    /// The inference backend rejected or failed the call.
    #[error("provider error: {0}")]
    Provider(String),

    /// The call did not return within the per-call timeout, in milliseconds.
    #[error("call timed out after {:.1}s", millis_as_secs(.0))]
    Timeout(u64),

    /// Never dispatched, or cut short, because the pipeline was cancelled.
    #[error("cancelled")]
    Cancelled,
}

fn millis_as_secs(millis: &u64) -> f64 {
    *millis as f64 / 1000.0
}

impl UnitError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UnitError::Cancelled)
    }
}
