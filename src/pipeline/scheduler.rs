//! Bounded-concurrency dispatch of units to the inference client.
//!
//! A semaphore of `max_concurrent` permits gates every call. The dispatch loop
//! acquires a permit, spawns the call on a [`JoinSet`] and immediately moves
//! on to the next unit, so up to `max_concurrent` calls run at once. Each task
//! sends its [`UnitResult`] as soon as the call resolves, then holds its permit
//! for the pacing delay before releasing it.

use super::{CancelSignal, Metrics, UnitOutcome, UnitResult};
use crate::config::PipelineConfig;
use crate::error::UnitError;
use crate::inference::{CallConfig, InferenceClient};
use crate::segment::Unit;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum calls in flight
    pub max_concurrent: usize,

    /// How long a permit stays held after its call returns
    pub pacing_delay: Duration,

    /// Upper bound on a single call
    pub call_timeout: Duration,

    /// How long in-flight calls may still finish after cancellation
    pub cancel_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for SchedulerConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            pacing_delay: config.pacing_delay,
            call_timeout: config.call_timeout,
            cancel_grace: config.cancel_grace,
        }
    }
}

/// What the scheduler streams back to the collecting side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// One unit resolved.
    Result(UnitResult),

    /// The dispatch loop has stopped issuing calls. `dispatched` units were
    /// handed to the client; the rest were resolved as cancelled.
    DispatchComplete { dispatched: usize, total: usize },
}

/// Issues inference calls for a batch of units under the concurrency cap.
pub struct Scheduler {
    client: Arc<dyn InferenceClient>,
    call_config: Arc<CallConfig>,
    metrics: Arc<Metrics>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(
        client: Arc<dyn InferenceClient>,
        call_config: Arc<CallConfig>,
        metrics: Arc<Metrics>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            client,
            call_config,
            metrics,
            config,
        }
    }

    /// Dispatch every unit exactly once, streaming one result per unit into
    /// `events`, followed (in some order) by a single
    /// [`SchedulerEvent::DispatchComplete`]. Returns after every spawned call
    /// has finished.
    ///
    /// Once `cancel` fires no further permits are acquired; units not yet
    /// dispatched resolve as [`UnitError::Cancelled`].
    pub async fn run(
        &self,
        units: &[Unit],
        cancel: &CancelSignal,
        events: mpsc::Sender<SchedulerEvent>,
    ) -> SchedulerStats {
        let total = units.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let mut tasks = JoinSet::new();
        let mut dispatched = 0;

        tracing::info!(
            "Dispatching {} units to {} ({} concurrent)",
            total,
            self.client.name(),
            self.config.max_concurrent
        );

        for unit in units {
            if cancel.is_cancelled() {
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            tasks.spawn(run_unit(
                UnitCall {
                    client: self.client.clone(),
                    call_config: self.call_config.clone(),
                    metrics: self.metrics.clone(),
                    config: self.config.clone(),
                    cancel: cancel.clone(),
                    events: events.clone(),
                },
                unit.index(),
                unit.content().to_string(),
                permit,
            ));
            dispatched += 1;
        }

        let not_dispatched = &units[dispatched..];
        if !not_dispatched.is_empty() {
            tracing::warn!(
                "Cancelled before dispatch: {} of {} units",
                not_dispatched.len(),
                total
            );
            self.metrics.add_cancelled(not_dispatched.len() as u64);
            for unit in not_dispatched {
                let result = UnitResult::failure(unit.index(), UnitError::Cancelled);
                if events.send(SchedulerEvent::Result(result)).await.is_err() {
                    tracing::warn!("Result receiver dropped, stopping dispatch");
                    break;
                }
            }
        }

        let _ = events
            .send(SchedulerEvent::DispatchComplete { dispatched, total })
            .await;
        drop(events);

        let mut stats = SchedulerStats {
            total_units: total,
            dispatched,
            not_dispatched: total - dispatched,
            ..Default::default()
        };

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!("Unit task ended abnormally: {}", e);
                stats.task_errors += 1;
            }
        }

        stats
    }
}

/// Everything a spawned call needs, cloned per unit.
struct UnitCall {
    client: Arc<dyn InferenceClient>,
    call_config: Arc<CallConfig>,
    metrics: Arc<Metrics>,
    config: SchedulerConfig,
    cancel: CancelSignal,
    events: mpsc::Sender<SchedulerEvent>,
}

async fn run_unit(call: UnitCall, index: usize, content: String, permit: OwnedSemaphorePermit) {
    let UnitCall {
        client,
        call_config,
        metrics,
        config,
        cancel,
        events,
    } = call;

    metrics.call_started(content.chars().count());
    let started = Instant::now();

    let request = AssertUnwindSafe(client.transform(&content, &call_config)).catch_unwind();
    let cut_off = async {
        cancel.cancelled().await;
        tokio::time::sleep(config.cancel_grace).await;
    };

    let outcome = tokio::select! {
        biased;
        response = tokio::time::timeout(config.call_timeout, request) => match response {
            Ok(Ok(Ok(text))) => UnitOutcome::Success(text),
            Ok(Ok(Err(e))) => UnitOutcome::Failure(UnitError::Provider(e.to_string())),
            Ok(Err(panic)) => UnitOutcome::Failure(UnitError::Provider(format!(
                "call panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Err(_) => UnitOutcome::Failure(UnitError::Timeout(
                u64::try_from(config.call_timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        },
        _ = cut_off => UnitOutcome::Failure(UnitError::Cancelled),
    };

    metrics.call_finished(started.elapsed());
    match &outcome {
        UnitOutcome::Success(text) => metrics.add_success(text.chars().count()),
        UnitOutcome::Failure(UnitError::Cancelled) => metrics.add_cancelled(1),
        UnitOutcome::Failure(e) => {
            tracing::warn!("Unit {} failed: {}", index, e);
            metrics.add_failure();
        }
    }

    if events
        .send(SchedulerEvent::Result(UnitResult { index, outcome }))
        .await
        .is_err()
    {
        tracing::warn!("Result receiver dropped before unit {} was recorded", index);
    }

    if !config.pacing_delay.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(config.pacing_delay) => {}
            _ = cancel.cancelled() => {}
        }
    }
    drop(permit);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Statistics from a scheduler run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Units handed to the scheduler
    pub total_units: usize,

    /// Units whose call was issued
    pub dispatched: usize,

    /// Units resolved as cancelled without a call
    pub not_dispatched: usize,

    /// Spawned tasks that ended without completing (aborted or panicked
    /// outside the call)
    pub task_errors: usize,
}

impl std::fmt::Display for SchedulerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Dispatched: {}, Not dispatched: {}, Task errors: {}, Total: {}",
            self.dispatched, self.not_dispatched, self.task_errors, self.total_units
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{EchoClient, ProviderError};
    use async_trait::async_trait;

    fn units(n: usize) -> Vec<Unit> {
        (0..n).map(|i| Unit::new(i, format!("unit-{i}"))).collect()
    }

    fn fast_config(max_concurrent: usize) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent,
            pacing_delay: Duration::ZERO,
            call_timeout: Duration::from_secs(5),
            cancel_grace: Duration::ZERO,
        }
    }

    async fn drain(mut rx: mpsc::Receiver<SchedulerEvent>) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn results(events: &[SchedulerEvent]) -> Vec<UnitResult> {
        let mut results: Vec<UnitResult> = events
            .iter()
            .filter_map(|e| match e {
                SchedulerEvent::Result(r) => Some(r.clone()),
                _ => None,
            })
            .collect();
        results.sort_by_key(|r| r.index);
        results
    }

    struct PanickingClient;

    #[async_trait]
    impl InferenceClient for PanickingClient {
        async fn transform(&self, text: &str, _: &CallConfig) -> Result<String, ProviderError> {
            if text == "unit-1" {
                panic!("boom");
            }
            Ok(text.to_uppercase())
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    #[test]
    fn test_scheduler_config_from_pipeline_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_concurrent, 5);
        assert_eq!(config.pacing_delay, Duration::from_millis(100));
        assert_eq!(config.call_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_scheduler_stats_display() {
        let stats = SchedulerStats {
            total_units: 10,
            dispatched: 7,
            not_dispatched: 3,
            task_errors: 0,
        };
        let display = format!("{}", stats);
        assert!(display.contains("Dispatched: 7"));
        assert!(display.contains("Not dispatched: 3"));
    }

    #[tokio::test]
    async fn test_every_unit_resolves_once() {
        let scheduler = Scheduler::new(
            Arc::new(EchoClient::new()),
            Arc::new(CallConfig::default()),
            Metrics::new(),
            fast_config(3),
        );
        let units = units(10);
        let (tx, rx) = mpsc::channel(units.len() + 1);

        let stats = scheduler.run(&units, &CancelSignal::new(), tx).await;
        let events = drain(rx).await;

        assert_eq!(stats.dispatched, 10);
        assert_eq!(stats.not_dispatched, 0);
        let results = results(&events);
        assert_eq!(results.len(), 10);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(*r, UnitResult::success(i, format!("unit-{i}")));
        }
        assert!(events.contains(&SchedulerEvent::DispatchComplete {
            dispatched: 10,
            total: 10
        }));
    }

    #[tokio::test]
    async fn test_panicking_call_is_isolated() {
        let metrics = Metrics::new();
        let scheduler = Scheduler::new(
            Arc::new(PanickingClient),
            Arc::new(CallConfig::default()),
            metrics.clone(),
            fast_config(2),
        );
        let units = units(3);
        let (tx, rx) = mpsc::channel(4);

        scheduler.run(&units, &CancelSignal::new(), tx).await;
        let results = results(&drain(rx).await);

        assert_eq!(results[0], UnitResult::success(0, "UNIT-0"));
        match &results[1].outcome {
            UnitOutcome::Failure(UnitError::Provider(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected provider failure, got {:?}", other),
        }
        assert_eq!(results[2], UnitResult::success(2, "UNIT-2"));
        assert_eq!(metrics.snapshot().units_failed, 1);
    }

    struct StalledClient;

    #[async_trait]
    impl InferenceClient for StalledClient {
        async fn transform(&self, _: &str, _: &CallConfig) -> Result<String, ProviderError> {
            std::future::pending().await
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_second_timeout_keeps_millis() {
        let scheduler = Scheduler::new(
            Arc::new(StalledClient),
            Arc::new(CallConfig::default()),
            Metrics::new(),
            SchedulerConfig {
                call_timeout: Duration::from_millis(500),
                ..fast_config(1)
            },
        );
        let (tx, rx) = mpsc::channel(2);

        scheduler.run(&units(1), &CancelSignal::new(), tx).await;
        let results = results(&drain(rx).await);

        let error = results[0].outcome.error().unwrap();
        assert_eq!(*error, UnitError::Timeout(500));
        assert_eq!(error.to_string(), "call timed out after 0.5s");
    }

    #[tokio::test]
    async fn test_cancelled_before_start_dispatches_nothing() {
        let metrics = Metrics::new();
        let scheduler = Scheduler::new(
            Arc::new(EchoClient::new()),
            Arc::new(CallConfig::default()),
            metrics.clone(),
            fast_config(2),
        );
        let cancel = CancelSignal::new();
        cancel.cancel();

        let units = units(4);
        let (tx, rx) = mpsc::channel(5);
        let stats = scheduler.run(&units, &cancel, tx).await;
        let results = results(&drain(rx).await);

        assert_eq!(stats.dispatched, 0);
        assert_eq!(stats.not_dispatched, 4);
        assert!(results
            .iter()
            .all(|r| r.outcome == UnitOutcome::Failure(UnitError::Cancelled)));
        assert_eq!(metrics.snapshot().units_dispatched, 0);
        assert_eq!(metrics.snapshot().units_cancelled, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_delays_next_acquisition() {
        let scheduler = Scheduler::new(
            Arc::new(EchoClient::new()),
            Arc::new(CallConfig::default()),
            Metrics::new(),
            SchedulerConfig {
                pacing_delay: Duration::from_millis(100),
                ..fast_config(1)
            },
        );
        let units = units(3);
        let (tx, rx) = mpsc::channel(4);

        let started = tokio::time::Instant::now();
        scheduler.run(&units, &CancelSignal::new(), tx).await;

        // One permit: each of the three calls holds it for the pacing delay.
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(results(&drain(rx).await).len(), 3);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
