use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct ClientRecord {
    client_id: String,
}

/// Immutable pool of target identifiers, loaded once at startup and shared
/// read-only across all components of a run.
#[derive(Debug, Clone, Default)]
pub struct TargetPool {
    ids: Vec<String>,
}

impl TargetPool {
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }

    /// Loads client identifiers from a JSON fixture of client records.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PoolError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        let content = std::fs::read(path).map_err(|source| PoolError::Io {
            path: path_str.clone(),
            source,
        })?;
        let records: Vec<ClientRecord> =
            serde_json::from_slice(&content).map_err(|source| PoolError::Parse {
                path: path_str.clone(),
                source,
            })?;

        let ids: Vec<String> = records.into_iter().map(|r| r.client_id).collect();
        info!(targets = ids.len(), path = %path_str, "target pool loaded");
        Ok(Self { ids })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Uniform random pick. `None` only when the pool is empty.
    pub fn pick(&self, rng: &mut impl Rng) -> Option<&str> {
        if self.ids.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..self.ids.len());
        Some(&self.ids[idx])
    }
}
