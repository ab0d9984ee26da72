//! Core load-generation engine.
//!
//! Turns a declarative traffic shape into a time-varying stream of outbound
//! GET requests executed by a bounded worker pool, with live per-second
//! aggregation streamed to observers and cooperative cancellation throughout.
//!
//! The pipeline is: [`shaper::Shaper`] paces emissions, the
//! [`dispatcher::Dispatcher`] turns each emission into a [`WorkItem`] on a
//! bounded queue, the [`worker::WorkerPool`] executes the calls, and the
//! [`aggregator::Aggregator`] rolls results into [`RunSnapshot`]s published
//! through a [`SnapshotSink`]. A [`RunController`] owns the lifecycle.

pub mod aggregator;
pub mod config;
pub mod controller;
pub mod data;
pub mod dispatcher;
pub mod shaper;
pub mod sink;
pub mod target_pool;
pub mod worker;

pub use config::{LoadProfile, ProfileKind, RunConfig};
pub use controller::{RunController, RunState, StartError};
pub use data::{Outcome, ResultRecord, RunSnapshot, WorkItem};
pub use sink::{BroadcastSink, SnapshotSink};
pub use target_pool::{PoolError, TargetPool};
pub use worker::{BackendCaller, HttpCaller, TransportError};
