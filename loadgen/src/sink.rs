use crate::data::RunSnapshot;
use tokio::sync::broadcast;

/// Default buffer depth for each snapshot observer.
pub const SNAPSHOT_BUFFER: usize = 64;

/// Destination for published snapshots. Implementations must not block the
/// aggregator: a slow observer loses snapshots, it never stalls publication.
pub trait SnapshotSink: Send + Sync {
    fn publish(&self, snapshot: RunSnapshot);
}

/// Fan-out over a bounded broadcast channel. Observers that fall more than
/// the buffer depth behind skip the missed snapshots and continue from the
/// newest one.
pub struct BroadcastSink {
    tx: broadcast::Sender<RunSnapshot>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunSnapshot> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(SNAPSHOT_BUFFER)
    }
}

impl SnapshotSink for BroadcastSink {
    fn publish(&self, snapshot: RunSnapshot) {
        // A send error only means there is no observer right now.
        let _ = self.tx.send(snapshot);
    }
}
