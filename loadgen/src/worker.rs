use crate::config::CALL_TIMEOUT;
use crate::data::{Outcome, ResultRecord, WorkItem};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// The call never produced an HTTP status.
#[derive(Debug, Error)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

/// Seam for the outbound call, so the pool can be exercised without a network.
#[trait_variant::make(BackendCaller: Send)]
pub trait LocalBackendCaller {
    async fn call(&self, url: &str) -> Result<u16, TransportError>;
}

/// Production caller: plain unauthenticated GET with a bounded timeout and a
/// connection pool sized for the worker count.
pub struct HttpCaller {
    client: reqwest::Client,
}

impl HttpCaller {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .pool_max_idle_per_host(1_000)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self { client })
    }
}

impl BackendCaller for HttpCaller {
    async fn call(&self, url: &str) -> Result<u16, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| TransportError(err.to_string()))?;
        Ok(response.status().as_u16())
    }
}

/// Fixed-size set of concurrent executors pulling from the bounded work
/// queue. Each dequeued item yields exactly one [`ResultRecord`]; failed
/// calls are recorded, never retried.
pub struct WorkerPool {
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn<C>(
        count: usize,
        caller: Arc<C>,
        queue: async_channel::Receiver<WorkItem>,
        results: mpsc::Sender<ResultRecord>,
        cancel: CancellationToken,
    ) -> Self
    where
        C: BackendCaller + Sync + 'static,
    {
        debug!(count, "spawning worker pool");
        let tasks = (0..count)
            .map(|_| {
                tokio::spawn(worker_loop(
                    caller.clone(),
                    queue.clone(),
                    results.clone(),
                    cancel.clone(),
                ))
            })
            .collect();
        Self { tasks }
    }

    /// Waits for every worker to exit (queue closed or cancellation).
    pub async fn join(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

async fn worker_loop<C>(
    caller: Arc<C>,
    queue: async_channel::Receiver<WorkItem>,
    results: mpsc::Sender<ResultRecord>,
    cancel: CancellationToken,
) where
    C: BackendCaller + Sync,
{
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = queue.recv() => match item {
                Ok(item) => item,
                // Queue closed and drained: natural completion.
                Err(_) => break,
            },
        };

        // An in-flight call runs to its own timeout before the token is
        // re-checked; cancellation is cooperative, not preemptive.
        let start = Instant::now();
        let outcome = match caller.call(&item.url).await {
            Ok(status) => {
                let outcome = Outcome::from_status(status);
                if outcome == Outcome::ServerError {
                    debug!(status, url = %item.url, "server error response");
                }
                outcome
            }
            Err(err) => {
                debug!(%err, url = %item.url, "transport failure");
                Outcome::Transport
            }
        };

        let record = ResultRecord::new(outcome, start.elapsed());
        if results.send(record).await.is_err() {
            break;
        }
    }
}
