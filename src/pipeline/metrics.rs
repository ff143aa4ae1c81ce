//! Call accounting and periodic progress reporting.

use serde::{Serialize, Serializer};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Metrics for one pipeline run.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Units handed to the inference client
    pub units_dispatched: AtomicU64,

    /// Units whose call returned text
    pub units_succeeded: AtomicU64,

    /// Units whose call failed or timed out
    pub units_failed: AtomicU64,

    /// Units never dispatched or cut short by cancellation
    pub units_cancelled: AtomicU64,

    /// Calls currently in flight
    pub in_flight: AtomicU64,

    /// Highest number of calls ever in flight at once
    pub peak_in_flight: AtomicU64,

    /// Summed wall time of all calls (microseconds)
    pub call_time_us: AtomicU64,

    /// Characters sent to the inference client
    pub chars_sent: AtomicU64,

    /// Characters received back
    pub chars_received: AtomicU64,

    start_time: Option<Instant>,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        })
    }

    /// A call is about to be issued with `chars` characters of input.
    pub fn call_started(&self, chars: usize) {
        self.units_dispatched.fetch_add(1, Ordering::Relaxed);
        self.chars_sent.fetch_add(chars as u64, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    /// A call returned, was cut off, or timed out.
    pub fn call_finished(&self, duration: Duration) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.call_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn add_success(&self, chars: usize) {
        self.units_succeeded.fetch_add(1, Ordering::Relaxed);
        self.chars_received.fetch_add(chars as u64, Ordering::Relaxed);
    }

    pub fn add_failure(&self) {
        self.units_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_cancelled(&self, count: u64) {
        self.units_cancelled.fetch_add(count, Ordering::Relaxed);
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Resolved units (any outcome) per second.
    pub fn units_per_second(&self) -> f64 {
        let resolved = self.units_succeeded.load(Ordering::Relaxed)
            + self.units_failed.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            resolved as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let units_succeeded = self.units_succeeded.load(Ordering::Relaxed);
        let units_failed = self.units_failed.load(Ordering::Relaxed);
        let call_secs = self.call_time_us.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let calls_finished = units_succeeded + units_failed;

        MetricsSnapshot {
            units_dispatched: self.units_dispatched.load(Ordering::Relaxed),
            units_succeeded,
            units_failed,
            units_cancelled: self.units_cancelled.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
            chars_sent: self.chars_sent.load(Ordering::Relaxed),
            chars_received: self.chars_received.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            units_per_second: self.units_per_second(),
            call_secs,
            avg_call_secs: if calls_finished > 0 {
                call_secs / calls_finished as f64
            } else {
                0.0
            },
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub units_dispatched: u64,
    pub units_succeeded: u64,
    pub units_failed: u64,
    pub units_cancelled: u64,
    pub in_flight: u64,
    pub peak_in_flight: u64,
    pub chars_sent: u64,
    pub chars_received: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub units_per_second: f64,
    /// Total time spent inside calls (seconds, summed across concurrent calls)
    pub call_secs: f64,
    pub avg_call_secs: f64,
}

impl MetricsSnapshot {
    pub fn resolved(&self) -> u64 {
        self.units_succeeded + self.units_failed + self.units_cancelled
    }

    /// Save metrics to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Metrics saved to {}", path.display());
        Ok(())
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Units: {} ok, {} failed, {} cancelled | In flight: {} (peak {}) | \
             Rate: {:.2} units/s | Avg call: {:.2}s | Chars: {} in, {} out | Elapsed: {:.1}s",
            self.units_succeeded,
            self.units_failed,
            self.units_cancelled,
            self.in_flight,
            self.peak_in_flight,
            self.units_per_second,
            self.avg_call_secs,
            self.chars_sent,
            self.chars_received,
            self.elapsed.as_secs_f64(),
        )
    }
}

/// Periodic progress reporter.
pub struct MetricsReporter {
    metrics: Arc<Metrics>,
    interval_secs: u64,
    total_units: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<Metrics>, interval_secs: u64, total_units: u64) -> Self {
        Self {
            metrics,
            interval_secs,
            total_units,
        }
    }

    /// Log progress every interval until `shutdown` fires.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.metrics.snapshot();
                    let progress = if self.total_units > 0 {
                        snapshot.resolved() as f64 / self.total_units as f64 * 100.0
                    } else {
                        100.0
                    };
                    tracing::info!("[{:.1}%] {}", progress, snapshot);
                }
                _ = shutdown.recv() => {
                    tracing::info!("Final: {}", self.metrics.snapshot());
                    break;
                }
            }
        }
    }

    pub fn print_summary(&self) {
        let snapshot = self.metrics.snapshot();

        println!("\n=== Pipeline Metrics ===");
        println!("Total time: {:.1}s", snapshot.elapsed.as_secs_f64());
        println!("Units total: {}", self.total_units);
        println!("Units dispatched: {}", snapshot.units_dispatched);
        println!("Units succeeded: {}", snapshot.units_succeeded);
        println!("Units failed: {}", snapshot.units_failed);
        println!("Units cancelled: {}", snapshot.units_cancelled);
        println!("Peak in flight: {}", snapshot.peak_in_flight);
        println!("Processing rate: {:.2} units/s", snapshot.units_per_second);
        println!(
            "Call time: {:.1}s total, {:.2}s average",
            snapshot.call_secs, snapshot.avg_call_secs
        );
        println!(
            "Characters: {} sent, {} received",
            snapshot.chars_sent, snapshot.chars_received
        );
        println!("========================\n");
    }
}
