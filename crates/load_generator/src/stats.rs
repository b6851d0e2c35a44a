//! Running call statistics and the aggregator task that feeds them.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::{caller::CallResult, internal_event::CallCompleted, pipeline::ResultReceiver};

/// Point-in-time view of the aggregated results.
///
/// `latency` is `None` until at least one result has been aggregated; that is the explicit
/// "no data" state, so no average is ever computed over zero calls.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Results aggregated. Lower than the dispatched call count when results were dropped.
    pub count: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub latency: Option<LatencySummary>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LatencySummary {
    #[serde(with = "crate::millis")]
    pub min: Duration,
    #[serde(with = "crate::millis")]
    pub max: Duration,
    #[serde(with = "crate::millis")]
    pub average: Duration,
    #[serde(with = "crate::millis")]
    pub total: Duration,
}

impl StatsSnapshot {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Order-independent accumulator over call results.
#[derive(Clone, Debug, Default)]
pub struct Statistics {
    count: u64,
    succeeded: u64,
    min: Option<Duration>,
    max: Duration,
    total: Duration,
}

impl Statistics {
    pub fn record(&mut self, result: &CallResult) {
        self.count += 1;
        if result.is_success() {
            self.succeeded += 1;
        }
        self.min = Some(self.min.map_or(result.elapsed, |min| min.min(result.elapsed)));
        self.max = self.max.max(result.elapsed);
        self.total = self.total.saturating_add(result.elapsed);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let latency = self.min.map(|min| LatencySummary {
            min,
            max: self.max,
            average: average(self.total, self.count),
            total: self.total,
        });

        StatsSnapshot {
            count: self.count,
            succeeded: self.succeeded,
            failed: self.count - self.succeeded,
            latency,
        }
    }
}

// Only reachable with count > 0.
fn average(total: Duration, count: u64) -> Duration {
    let nanos = total.as_nanos() / u128::from(count);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Drains `receiver` until the pipeline is closed and empty.
///
/// Publishes a fresh snapshot on `live` after every result and returns the final one.
pub(crate) async fn aggregate(
    mut receiver: ResultReceiver,
    live: &watch::Sender<StatsSnapshot>,
) -> StatsSnapshot {
    let completed = CallCompleted::register();
    let mut stats = Statistics::default();

    while let Some(result) = receiver.recv().await {
        completed.emit(&result);
        stats.record(&result);
        live.send_replace(stats.snapshot());
    }

    let snapshot = stats.snapshot();
    match &snapshot.latency {
        Some(latency) => info!(
            message = "Aggregation finished.",
            count = snapshot.count,
            failed = snapshot.failed,
            min_ms = latency.min.as_secs_f64() * 1_000.0,
            max_ms = latency.max.as_secs_f64() * 1_000.0,
            average_ms = latency.average.as_secs_f64() * 1_000.0,
        ),
        None => info!(message = "Aggregation finished with no results."),
    }
    snapshot
}
