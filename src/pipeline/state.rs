use super::Collector;
use crate::error::UnitError;
use crate::segment::Unit;

/// Outcome of one unit's call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Success(String),
    Failure(UnitError),
}

impl UnitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UnitOutcome::Success(_))
    }

    pub fn error(&self) -> Option<&UnitError> {
        match self {
            UnitOutcome::Success(_) => None,
            UnitOutcome::Failure(e) => Some(e),
        }
    }
}

/// A unit's outcome tagged with its position in the original ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitResult {
    pub index: usize,
    pub outcome: UnitOutcome,
}

impl UnitResult {
    pub fn success(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            outcome: UnitOutcome::Success(text.into()),
        }
    }

    pub fn failure(index: usize, error: UnitError) -> Self {
        Self {
            index,
            outcome: UnitOutcome::Failure(error),
        }
    }
}

/// Everything one pipeline run works on: the ordered units, the result slots
/// and the concurrency cap. Owned by the controller for the run's lifetime;
/// the scheduler reads units and results flow in through the collector.
pub struct PipelineState {
    units: Vec<Unit>,
    collector: Collector,
    max_concurrent: usize,
}

impl PipelineState {
    /// Take ownership of the units and open one result slot per unit.
    pub fn new(units: Vec<Unit>, max_concurrent: usize) -> Self {
        let collector = Collector::new(units.len());
        Self {
            units,
            collector,
            max_concurrent,
        }
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// True once every unit has a result.
    pub fn is_terminal(&self) -> bool {
        self.collector.is_complete()
    }
}
