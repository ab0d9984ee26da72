use serde::Serialize;
use std::time::Duration;

/// One unit of work: the fully-formed URL for a single outbound call.
/// Created by the dispatcher, consumed exactly once by one worker.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub url: String,
}

/// Terminal classification of one outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// 4xx. Classified separately but excluded from the error rate; only
    /// 5xx and transport failures count as errors.
    ClientError,
    /// 5xx.
    ServerError,
    /// The call never produced a status: connect failure, timeout, etc.
    Transport,
}

impl Outcome {
    pub fn from_status(status: u16) -> Self {
        match status {
            500.. => Outcome::ServerError,
            400..=499 => Outcome::ClientError,
            _ => Outcome::Success,
        }
    }

    /// Whether this outcome counts towards the error rate.
    pub fn is_error(self) -> bool {
        matches!(self, Outcome::ServerError | Outcome::Transport)
    }
}

/// Produced exactly once per dispatched [`WorkItem`].
#[derive(Debug, Clone, Copy)]
pub struct ResultRecord {
    pub outcome: Outcome,
    pub latency: Duration,
}

impl ResultRecord {
    pub fn new(outcome: Outcome, latency: Duration) -> Self {
        Self { outcome, latency }
    }
}

/// Immutable statistics snapshot, published once per aggregation window and
/// once at run end (with `is_running = false`). Serializes with the wire
/// field names observers expect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunSnapshot {
    /// Requests completed in the last window.
    pub rps: u64,
    /// Mean latency over the last window, in milliseconds.
    #[serde(rename = "latency")]
    pub latency_ms: f64,
    /// Error percentage over the last window (0-100).
    #[serde(rename = "errorRate")]
    pub error_rate: f64,
    /// Cumulative requests since the run started. Monotone within a run.
    #[serde(rename = "totalReqs")]
    pub total_reqs: u64,
    /// Cumulative errors since the run started. Monotone within a run.
    #[serde(rename = "totalErrors")]
    pub total_errors: u64,
    #[serde(rename = "isRunning")]
    pub is_running: bool,
}
