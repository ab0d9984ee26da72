use crate::aggregator::{Aggregator, Totals};
use crate::config::{RunConfig, RESULT_QUEUE_CAPACITY, WORK_QUEUE_CAPACITY};
use crate::data::RunSnapshot;
use crate::dispatcher::Dispatcher;
use crate::shaper::Shaper;
use crate::sink::SnapshotSink;
use crate::target_pool::TargetPool;
use crate::worker::{BackendCaller, HttpCaller, WorkerPool};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Lifecycle of the single allowed run. Transitions are serialized by the
/// controller's lock, never concurrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopping,
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("a run is already active")]
    AlreadyRunning,
}

struct ControlBlock {
    state: RunState,
    cancel: Option<CancellationToken>,
}

struct Inner<C> {
    block: Mutex<ControlBlock>,
    pool: Arc<TargetPool>,
    caller: Arc<C>,
    sink: Arc<dyn SnapshotSink>,
}

impl<C> Inner<C> {
    fn block(&self) -> MutexGuard<'_, ControlBlock> {
        // The block is a plain state flag; recover it rather than wedging
        // every later start/stop on a poisoned lock.
        self.block.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the lifecycle of a single run: start-exclusivity, cancellation
/// propagation, graceful drain, and the terminal snapshot.
pub struct RunController<C = HttpCaller> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for RunController<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl RunController<HttpCaller> {
    pub fn new(
        pool: Arc<TargetPool>,
        sink: Arc<dyn SnapshotSink>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self::with_caller(Arc::new(HttpCaller::new()?), pool, sink))
    }
}

impl<C> RunController<C>
where
    C: BackendCaller + Sync + 'static,
{
    pub fn with_caller(
        caller: Arc<C>,
        pool: Arc<TargetPool>,
        sink: Arc<dyn SnapshotSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                block: Mutex::new(ControlBlock {
                    state: RunState::Idle,
                    cancel: None,
                }),
                pool,
                caller,
                sink,
            }),
        }
    }

    /// Atomically claims the Idle -> Running transition and spawns the run.
    /// Rejected while another run is active; the active run is untouched.
    pub fn start(&self, config: RunConfig) -> Result<(), StartError> {
        let cancel = CancellationToken::new();
        {
            let mut block = self.inner.block();
            if block.state != RunState::Idle {
                return Err(StartError::AlreadyRunning);
            }
            block.state = RunState::Running;
            block.cancel = Some(cancel.clone());
        }

        info!(profile = ?config.load_profile, max_rps = config.max_rps, "run starting");
        let inner = self.inner.clone();
        tokio::spawn(run_engine(inner, config, cancel));
        Ok(())
    }

    /// Signals cancellation to every stage of the active run. Idempotent; a
    /// no-op when idle. Does not wait for the drain, the run task publishes
    /// the terminal snapshot and returns to Idle on its own.
    pub fn stop(&self) {
        let mut block = self.inner.block();
        if block.state == RunState::Running {
            block.state = RunState::Stopping;
            if let Some(cancel) = block.cancel.take() {
                cancel.cancel();
            }
            info!("stop requested");
        }
    }

    pub fn state(&self) -> RunState {
        self.inner.block().state
    }
}

#[instrument(name = "run", skip_all)]
async fn run_engine<C>(inner: Arc<Inner<C>>, config: RunConfig, cancel: CancellationToken)
where
    C: BackendCaller + Sync + 'static,
{
    let (work_tx, work_rx) = async_channel::bounded(WORK_QUEUE_CAPACITY);
    let (result_tx, result_rx) = mpsc::channel(RESULT_QUEUE_CAPACITY);

    let aggregator = Aggregator::new(result_rx, inner.sink.clone(), cancel.clone());
    let aggregation = tokio::spawn(aggregator.run());

    let workers = WorkerPool::spawn(
        config.worker_count(),
        inner.caller.clone(),
        work_rx,
        result_tx,
        cancel.clone(),
    );

    let shaper = Shaper::new(config.profile(), cancel.clone());
    let dispatcher = Dispatcher::new(
        inner.pool.clone(),
        config.backend_address.clone(),
        work_tx,
        cancel.clone(),
    );

    // The dispatcher returning closes the work queue; the workers draining
    // it closes the result stream; the aggregator then hands back totals.
    dispatcher.run(shaper).await;
    workers.join().await;

    let totals = match aggregation.await {
        Ok(totals) => totals,
        Err(err) => {
            error!(%err, "aggregator task failed");
            Totals::default()
        }
    };

    inner.sink.publish(RunSnapshot {
        rps: 0,
        latency_ms: 0.0,
        error_rate: 0.0,
        total_reqs: totals.requests,
        total_errors: totals.errors,
        is_running: false,
    });

    {
        let mut block = inner.block();
        block.state = RunState::Idle;
        block.cancel = None;
    }
    info!(
        requests = totals.requests,
        errors = totals.errors,
        "run complete"
    );
}
