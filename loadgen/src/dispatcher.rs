use crate::data::WorkItem;
use crate::shaper::Shaper;
use crate::target_pool::TargetPool;
use rand::{rngs::SmallRng, SeedableRng};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Turns shaper emissions into queued [`WorkItem`]s.
///
/// Enqueueing blocks when the queue is full, so under saturation the worker
/// pool's processing rate gates the effective request rate instead of work
/// piling up unbounded.
pub struct Dispatcher {
    pool: Arc<TargetPool>,
    backend_address: String,
    queue: async_channel::Sender<WorkItem>,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        pool: Arc<TargetPool>,
        backend_address: String,
        queue: async_channel::Sender<WorkItem>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pool,
            backend_address,
            queue,
            cancel,
        }
    }

    /// Drives the shaper until it is exhausted or the run is cancelled.
    /// Dropping the queue sender on return is what closes the work queue.
    pub async fn run(self, mut shaper: Shaper) {
        if self.pool.is_empty() {
            warn!("no targets loaded, ending run without dispatching");
            return;
        }

        info!(targets = self.pool.len(), "dispatching against target pool");
        let mut rng = SmallRng::from_entropy();

        while shaper.next().await {
            let Some(client_id) = self.pool.pick(&mut rng) else {
                break;
            };
            let item = WorkItem {
                url: format!("{}/ads?client_id={}", self.backend_address, client_id),
            };
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                res = self.queue.send(item) => {
                    if res.is_err() {
                        // All workers are gone; nothing left to feed.
                        break;
                    }
                }
            }
        }
    }
}
