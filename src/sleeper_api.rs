use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::http_client::http_client;

/// Issues a single GET for an API path and hands back the raw body.
pub trait RemoteFetch: Sync {
    fn fetch(&self, path: &str) -> Result<Vec<u8>>;
}

/// Sleeper API client with a fixed pause before every request.
///
/// The response status is not checked: whatever body comes back is
/// returned, so error pages end up cached like any other payload.
pub struct SleeperApi {
    client: Client,
    base_url: String,
    delay: Duration,
}

impl SleeperApi {
    pub fn new(client: Client, base_url: &str, delay: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            delay,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let client = http_client(config.request_timeout_secs)?;
        Ok(Self::new(
            client,
            &config.api_base,
            Duration::from_millis(config.request_delay_ms),
        ))
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl RemoteFetch for SleeperApi {
    fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        thread::sleep(self.delay);
        let url = self.url_for(path);
        let resp = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("request failed: {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            warn!(%url, %status, "non-success response will be cached as-is");
        }
        let body = resp
            .bytes()
            .with_context(|| format!("failed reading body: {url}"))?;
        Ok(body.to_vec())
    }
}

pub fn week_query(dataset: &str, position: &str, season: i32, week: i32) -> String {
    format!("/{dataset}/nfl/{season}/{week}?season_type=regular&position={position}")
}

pub fn players_query() -> String {
    "/v1/players/nfl".to_string()
}

pub fn league_users_query(league_id: &str) -> String {
    format!("/v1/league/{league_id}/users")
}

pub fn league_rosters_query(league_id: &str) -> String {
    format!("/v1/league/{league_id}/rosters")
}
