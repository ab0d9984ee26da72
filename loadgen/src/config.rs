use serde::Deserialize;
use std::time::Duration;

/// Capacity of the bounded work queue feeding the worker pool.
pub const WORK_QUEUE_CAPACITY: usize = 10_000;

/// Capacity of the result stream between workers and the aggregator.
pub const RESULT_QUEUE_CAPACITY: usize = 10_000;

/// Upper bound on the worker pool size.
pub const MAX_WORKERS: usize = 1_000;

/// Fixed ramp window for the `line` profile.
pub const LINE_RAMP_WINDOW: Duration = Duration::from_secs(10);

/// Per-call timeout for outbound requests.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Width of one aggregation window.
pub const AGGREGATION_WINDOW: Duration = Duration::from_secs(1);

/// Named traffic shape, as it appears on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    Const,
    Line,
    Step,
    Once,
    Unlimited,
}

/// Configuration for a single load run. Immutable once the run starts.
///
/// Field names mirror the control API payload. Rate fields are accepted
/// as-is; out-of-range values resolve to defined degenerate behavior when the
/// profile is built (see [`RunConfig::profile`]).
#[derive(Clone, Debug, Deserialize)]
pub struct RunConfig {
    #[serde(rename = "backendAddress", default)]
    pub backend_address: String,
    #[serde(rename = "maxRps", default)]
    pub max_rps: i64,
    #[serde(rename = "loadProfile")]
    pub load_profile: ProfileKind,
    #[serde(rename = "fromRPS", default)]
    pub from_rps: i64,
    #[serde(rename = "toRPS", default)]
    pub to_rps: i64,
    #[serde(rename = "stepRps", default)]
    pub step_rps: i64,
    /// Seconds each `step` plateau is held.
    #[serde(rename = "stepDuration", default)]
    pub step_duration: i64,
    #[serde(rename = "onceCount", default)]
    pub once_count: i64,
}

/// Fully-resolved traffic shape. Closed set; an unrecognized profile name is
/// a deserialization error, never a silent fallthrough.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadProfile {
    /// Fixed pacing at `rate` emissions per second until cancelled.
    Const { rate: u32 },
    /// Linear ramp from `from` to `to` over [`LINE_RAMP_WINDOW`], then holds
    /// the terminal rate indefinitely until cancelled.
    Line { from: f64, to: f64 },
    /// Plateaus of `hold` each, starting at `from` and increasing by `step`
    /// until the rate would exceed `to`.
    Step { from: i64, to: i64, step: i64, hold: Duration },
    /// Exactly `count` unpaced emissions, then done.
    Once { count: u64 },
    /// Unpaced emissions until cancelled; the queue gates the effective rate.
    Unlimited,
}

impl RunConfig {
    /// Resolves the wire config into a [`LoadProfile`], clamping degenerate
    /// rate values rather than failing.
    pub fn profile(&self) -> LoadProfile {
        match self.load_profile {
            ProfileKind::Const => LoadProfile::Const {
                rate: clamp_rate(self.max_rps),
            },
            ProfileKind::Line => LoadProfile::Line {
                from: self.from_rps as f64,
                to: self.to_rps as f64,
            },
            ProfileKind::Step => LoadProfile::Step {
                from: self.from_rps,
                to: self.to_rps,
                step: self.step_rps,
                hold: Duration::from_secs(self.step_duration.max(0) as u64),
            },
            ProfileKind::Once => LoadProfile::Once {
                count: self.once_count.max(0) as u64,
            },
            ProfileKind::Unlimited => LoadProfile::Unlimited,
        }
    }

    /// Worker pool size: `min(max-rate, 1000)`, or 1000 when max-rate is
    /// unbounded or non-positive.
    pub fn worker_count(&self) -> usize {
        if self.max_rps > 0 {
            (self.max_rps as usize).min(MAX_WORKERS)
        } else {
            MAX_WORKERS
        }
    }
}

/// Clamps a requested rate to at least 1 emission per second.
pub(crate) fn clamp_rate(rate: i64) -> u32 {
    rate.clamp(1, u32::MAX as i64) as u32
}

/// Pacing period for a given rate.
pub(crate) fn period(rate: u32) -> Duration {
    Duration::from_secs(1) / rate.max(1)
}
