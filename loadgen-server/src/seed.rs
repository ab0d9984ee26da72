//! Pushes the local mock fixtures into the backend and verifies they landed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

const SEED_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend rejected {url} with status {status}")]
    Backend { url: String, status: u16 },
}

#[derive(Deserialize)]
struct ClientRef {
    client_id: String,
}

#[derive(Deserialize)]
struct AdvertiserRef {
    advertiser_id: String,
}

#[derive(Deserialize)]
struct CampaignEntry {
    advertiser_id: String,
    campaign_data: Value,
}

/// Per-fixture verdict returned by the check endpoint.
#[derive(Debug, Serialize)]
pub struct MockStatus {
    pub clients: bool,
    pub advertisers: bool,
    pub campaigns: bool,
    pub ml_scores: bool,
}

pub struct Seeder {
    client: reqwest::Client,
    backend_address: String,
    mocks_dir: PathBuf,
}

impl Seeder {
    pub fn new(backend_address: String, mocks_dir: PathBuf) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(SEED_TIMEOUT).build()?;
        Ok(Self {
            client,
            backend_address,
            mocks_dir,
        })
    }

    /// Loads every fixture file and posts it to the backend. Clients and
    /// advertisers go in one bulk request each and abort the load on failure;
    /// campaigns and ML scores are posted one by one, failures logged and
    /// skipped.
    pub async fn load_and_post(&self) -> Result<(), SeedError> {
        let clients: Value = self.read_fixture("bulk_clients.json")?;
        let count = clients.as_array().map(Vec::len).unwrap_or(0);
        self.post(&format!("{}/clients/bulk", self.backend_address), &clients)
            .await?;
        info!(count, "posted bulk clients");

        let advertisers: Value = self.read_fixture("bulk_advertisers.json")?;
        let count = advertisers.as_array().map(Vec::len).unwrap_or(0);
        self.post(
            &format!("{}/advertisers/bulk", self.backend_address),
            &advertisers,
        )
        .await?;
        info!(count, "posted bulk advertisers");

        let campaigns: Vec<CampaignEntry> = self.read_fixture("campaigns.json")?;
        let count = campaigns.len();
        for entry in campaigns {
            let url = format!(
                "{}/advertisers/{}/campaigns",
                self.backend_address, entry.advertiser_id
            );
            if let Err(err) = self.post(&url, &entry.campaign_data).await {
                warn!(advertiser = %entry.advertiser_id, %err, "failed to post campaign");
            }
        }
        info!(count, "posted campaigns");

        let scores: Vec<Value> = self.read_fixture("ml_scores.json")?;
        let count = scores.len();
        for score in &scores {
            let url = format!("{}/ml-scores", self.backend_address);
            if let Err(err) = self.post(&url, score).await {
                warn!(%err, "failed to post ml score");
            }
        }
        info!(count, "posted ml scores");

        Ok(())
    }

    /// Probes the backend for a sample of the seeded records (first, middle
    /// and last id of each fixture) and reports per-fixture verdicts.
    pub async fn check(&self) -> MockStatus {
        let client_ids = self
            .read_fixture::<Vec<ClientRef>>("bulk_clients.json")
            .map(|refs| refs.into_iter().map(|r| r.client_id).collect::<Vec<_>>())
            .unwrap_or_else(|err| {
                warn!(%err, "could not read client fixture for check");
                Vec::new()
            });
        let advertiser_ids = self
            .read_fixture::<Vec<AdvertiserRef>>("bulk_advertisers.json")
            .map(|refs| refs.into_iter().map(|r| r.advertiser_id).collect::<Vec<_>>())
            .unwrap_or_else(|err| {
                warn!(%err, "could not read advertiser fixture for check");
                Vec::new()
            });

        let mut clients = !client_ids.is_empty();
        for id in sample(&client_ids) {
            clients &= self
                .probe(&format!("{}/clients/{}", self.backend_address, id))
                .await
                .is_some();
        }

        let mut advertisers = !advertiser_ids.is_empty();
        let mut campaigns = !advertiser_ids.is_empty();
        for id in sample(&advertiser_ids) {
            advertisers &= self
                .probe(&format!("{}/advertisers/{}", self.backend_address, id))
                .await
                .is_some();
            // A campaign listing only counts when it is a non-empty array.
            campaigns &= self
                .probe(&format!(
                    "{}/advertisers/{}/campaigns",
                    self.backend_address, id
                ))
                .await
                .and_then(|body| serde_json::from_str::<Vec<Value>>(&body).ok())
                .map(|list| !list.is_empty())
                .unwrap_or(false);
        }

        let ml_scores = self.mocks_dir.join("ml_scores.json").is_file();
        MockStatus {
            clients,
            advertisers,
            campaigns,
            ml_scores,
        }
    }

    fn read_fixture<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, SeedError> {
        let path = self.mocks_dir.join(name);
        let content = std::fs::read(&path).map_err(|source| SeedError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&content).map_err(|source| SeedError::Parse { path, source })
    }

    async fn post(&self, url: &str, body: &Value) -> Result<(), SeedError> {
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SeedError::Backend {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// GET the url and return the body on a 2xx response.
    async fn probe(&self, url: &str) -> Option<String> {
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => response.text().await.ok(),
            Ok(response) => {
                debug!(url, status = %response.status(), "check probe rejected");
                None
            }
            Err(err) => {
                debug!(url, %err, "check probe failed");
                None
            }
        }
    }
}

/// First, middle and last element, deduplicated for short inputs.
fn sample(ids: &[String]) -> Vec<&String> {
    let mut picks = Vec::new();
    for idx in [0, ids.len() / 2, ids.len().saturating_sub(1)] {
        if let Some(id) = ids.get(idx) {
            if !picks.contains(&id) {
                picks.push(id);
            }
        }
    }
    picks
}
