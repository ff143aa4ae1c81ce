//! Order-independent result accumulation and index-ordered reassembly.

use super::{UnitOutcome, UnitResult};
use crate::error::{PipelineError, UnitError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Text placed in the reassembled document where a unit failed.
pub fn error_marker(index: usize, error: &UnitError) -> String {
    format!("[chunkmill: unit {index} failed: {error}]")
}

/// Result slots keyed by unit index.
///
/// Each slot is written at most once. The mutex only guards the slot vector's
/// bookkeeping; completion is tracked by an atomic counter so `is_complete`
/// never contends with `record`.
pub struct Collector {
    slots: Mutex<Vec<Option<UnitOutcome>>>,
    recorded: AtomicUsize,
    failed: AtomicUsize,
}

impl Collector {
    /// Create a collector with one empty slot per expected unit.
    pub fn new(expected: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; expected]),
            recorded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Option<UnitOutcome>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one unit's result. A second result for the same index is
    /// rejected and the first one kept.
    pub fn record(&self, result: UnitResult) -> Result<(), PipelineError> {
        let mut slots = self.slots();
        let slot = slots
            .get_mut(result.index)
            .ok_or(PipelineError::UnknownIndex(result.index))?;

        if slot.is_some() {
            return Err(PipelineError::DuplicateResult(result.index));
        }
        if !result.outcome.is_success() {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        *slot = Some(result.outcome);
        self.recorded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Number of units the collector waits for.
    pub fn expected(&self) -> usize {
        self.slots().len()
    }

    /// Results recorded so far, successes and failures alike.
    pub fn recorded(&self) -> usize {
        self.recorded.load(Ordering::SeqCst)
    }

    /// Recorded results that carry an error.
    pub fn failure_count(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// True once every slot holds a result.
    pub fn is_complete(&self) -> bool {
        self.recorded() == self.expected()
    }

    /// Failed indices with their errors, in index order.
    pub fn failures(&self) -> Vec<(usize, UnitError)> {
        self.slots()
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Some(UnitOutcome::Failure(e)) => Some((i, e.clone())),
                _ => None,
            })
            .collect()
    }

    /// Fill every slot that still has no result with `error`. Returns the
    /// indices that were filled.
    pub fn mark_unresolved(&self, error: UnitError) -> Vec<usize> {
        let mut slots = self.slots();
        let mut marked = Vec::new();
        for (i, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(UnitOutcome::Failure(error.clone()));
                marked.push(i);
            }
        }
        self.failed.fetch_add(marked.len(), Ordering::SeqCst);
        self.recorded.fetch_add(marked.len(), Ordering::SeqCst);
        marked
    }

    /// Outputs ordered by index. Failed slots hold an [`error_marker`].
    pub fn reassemble(&self) -> Result<Vec<String>, PipelineError> {
        let slots = self.slots();
        let recorded = slots.iter().filter(|s| s.is_some()).count();
        if recorded != slots.len() {
            return Err(PipelineError::AggregateIncomplete {
                recorded,
                expected: slots.len(),
            });
        }

        Ok(slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                slot.as_ref().map(|outcome| match outcome {
                    UnitOutcome::Success(text) => text.clone(),
                    UnitOutcome::Failure(e) => error_marker(i, e),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_record_out_of_order_reassembles_in_order() {
        let collector = Collector::new(3);
        collector.record(UnitResult::success(2, "c")).unwrap();
        collector.record(UnitResult::success(0, "a")).unwrap();
        assert!(!collector.is_complete());
        collector.record(UnitResult::success(1, "b")).unwrap();

        assert!(collector.is_complete());
        assert_eq!(collector.reassemble().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_is_rejected_and_first_kept() {
        let collector = Collector::new(1);
        collector.record(UnitResult::success(0, "first")).unwrap();

        let err = collector.record(UnitResult::success(0, "second")).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateResult(0)));
        assert_eq!(collector.recorded(), 1);
        assert_eq!(collector.reassemble().unwrap(), vec!["first"]);
    }

    #[test]
    fn test_unknown_index_is_rejected() {
        let collector = Collector::new(2);
        let err = collector.record(UnitResult::success(5, "x")).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownIndex(5)));
        assert_eq!(collector.recorded(), 0);
    }

    #[test]
    fn test_reassemble_before_complete_fails() {
        let collector = Collector::new(2);
        collector.record(UnitResult::success(0, "a")).unwrap();

        match collector.reassemble() {
            Err(PipelineError::AggregateIncomplete { recorded, expected }) => {
                assert_eq!(recorded, 1);
                assert_eq!(expected, 2);
            }
            other => panic!("expected AggregateIncomplete, got {:?}", other),
        }
    }

    #[test]
    fn test_failures_become_markers() {
        let collector = Collector::new(3);
        collector.record(UnitResult::success(0, "a")).unwrap();
        collector
            .record(UnitResult::failure(1, UnitError::Provider("503".into())))
            .unwrap();
        collector.record(UnitResult::success(2, "c")).unwrap();

        let out = collector.reassemble().unwrap();
        assert_eq!(out[0], "a");
        assert_eq!(out[1], "[chunkmill: unit 1 failed: provider error: 503]");
        assert_eq!(out[2], "c");
        assert_eq!(collector.failure_count(), 1);
        assert_eq!(
            collector.failures(),
            vec![(1, UnitError::Provider("503".into()))]
        );
    }

    #[test]
    fn test_mark_unresolved() {
        let collector = Collector::new(3);
        collector.record(UnitResult::success(1, "b")).unwrap();

        let marked = collector.mark_unresolved(UnitError::Cancelled);
        assert_eq!(marked, vec![0, 2]);
        assert!(collector.is_complete());
        assert_eq!(collector.failure_count(), 2);
        assert!(collector.mark_unresolved(UnitError::Cancelled).is_empty());
    }

    #[test]
    fn test_empty_collector_is_complete() {
        let collector = Collector::new(0);
        assert!(collector.is_complete());
        assert!(collector.reassemble().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_record() {
        let collector = Arc::new(Collector::new(64));
        let handles: Vec<_> = (0..64)
            .map(|i| {
                let collector = collector.clone();
                std::thread::spawn(move || {
                    collector.record(UnitResult::success(i, i.to_string())).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(collector.is_complete());
        let expected: Vec<String> = (0..64).map(|i| i.to_string()).collect();
        assert_eq!(collector.reassemble().unwrap(), expected);
    }
}
