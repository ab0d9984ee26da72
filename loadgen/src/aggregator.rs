use crate::config::AGGREGATION_WINDOW;
use crate::data::{ResultRecord, RunSnapshot};
use crate::sink::SnapshotSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Run-lifetime counters, returned when the aggregator finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub requests: u64,
    pub errors: u64,
}

/// Rolls result records into fixed one-second windows and publishes one
/// snapshot per window. Window counters reset each tick; lifetime counters
/// never do. Results are aggregated in arrival order.
pub struct Aggregator {
    results: mpsc::Receiver<ResultRecord>,
    sink: Arc<dyn SnapshotSink>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Window {
    count: u64,
    errors: u64,
    latency_sum: Duration,
}

impl Window {
    fn mean_latency_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.latency_sum.as_secs_f64() * 1_000.0 / self.count as f64
    }

    fn error_rate(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.errors as f64 / self.count as f64 * 100.0
    }
}

impl Aggregator {
    pub fn new(
        results: mpsc::Receiver<ResultRecord>,
        sink: Arc<dyn SnapshotSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            results,
            sink,
            cancel,
        }
    }

    /// Consumes the result stream until it closes (all workers exited) or the
    /// run is cancelled, publishing one snapshot per window. Returns the
    /// lifetime totals; the terminal snapshot itself is the controller's job.
    pub async fn run(mut self) -> Totals {
        let mut ticker = tokio::time::interval(AGGREGATION_WINDOW);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes instantly.
        ticker.tick().await;

        let mut window = Window::default();
        let mut totals = Totals::default();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    // Count whatever already arrived before shutting down, so
                    // produced records are never lost to a stop request.
                    while let Ok(record) = self.results.try_recv() {
                        Self::absorb(&mut window, &mut totals, record);
                    }
                    break;
                }
                _ = ticker.tick() => {
                    self.sink.publish(RunSnapshot {
                        rps: window.count,
                        latency_ms: window.mean_latency_ms(),
                        error_rate: window.error_rate(),
                        total_reqs: totals.requests,
                        total_errors: totals.errors,
                        is_running: true,
                    });
                    window = Window::default();
                }
                record = self.results.recv() => match record {
                    Some(record) => Self::absorb(&mut window, &mut totals, record),
                    None => break,
                },
            }
        }

        debug!(
            requests = totals.requests,
            errors = totals.errors,
            "aggregation finished"
        );
        totals
    }

    fn absorb(window: &mut Window, totals: &mut Totals, record: ResultRecord) {
        totals.requests += 1;
        window.count += 1;
        window.latency_sum += record.latency;
        if record.outcome.is_error() {
            totals.errors += 1;
            window.errors += 1;
        }
    }
}
