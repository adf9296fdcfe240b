use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::models::Scoreboard;
use super::provider::UpstreamFetcher;
use super::ScoreEvent;
use crate::error::UpstreamError;

/// Scoreboard fetcher for ESPN's public site API.
/// No API key required; endpoints look like
/// `https://site.api.espn.com/apis/site/v2/sports/basketball/nba/scoreboard`.
#[derive(Clone)]
pub struct EspnScoreboard {
    http: Client,
}

impl EspnScoreboard {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(EspnScoreboard { http })
    }
}

#[async_trait]
impl UpstreamFetcher for EspnScoreboard {
    fn name(&self) -> &str {
        "ESPN"
    }

    async fn fetch(&self, endpoint: &str) -> Result<Vec<ScoreEvent>, UpstreamError> {
        debug!("Fetching scoreboard from {}", endpoint);

        let resp = self
            .http
            .get(endpoint)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(endpoint, e))?;

        if !resp.status().is_success() {
            return Err(UpstreamError::Status {
                endpoint: endpoint.to_string(),
                status: resp.status(),
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| UpstreamError::from_reqwest(endpoint, e))?;

        let scoreboard: Scoreboard =
            serde_json::from_slice(&body).map_err(|source| UpstreamError::Malformed {
                endpoint: endpoint.to_string(),
                source,
            })?;

        Ok(scoreboard.events)
    }
}
