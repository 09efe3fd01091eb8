//! FPL API client.
//!
//! Every request goes through the [`AdmissionGate`], so no more than the
//! configured number of requests are outstanding at once regardless of how
//! many ids a caller asks for. Failures are logged here and handed back as
//! [`FetchError`] values; nothing in this module retries.

use anyhow::{Context, Result};
use futures::future::join_all;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::ApiConfig;
use crate::gate::AdmissionGate;
use crate::models::{Bootstrap, ElementSummary};

/// Base path of the public FPL API.
pub const FPL_BASE_URL: &str = "https://fantasy.premierleague.com/api";

/// Simultaneous in-flight requests allowed by default.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

const USER_AGENT: &str = concat!("fpl-ingestion/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed payload from {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Status { url, .. }
            | FetchError::Transport { url, .. }
            | FetchError::Malformed { url, .. } => url,
        }
    }

    /// Not-found, server-side or network trouble: the resource may well be
    /// fine on the next run.
    pub fn is_transient(&self) -> bool {
        !self.is_malformed()
    }

    /// The upstream answered 200 but the body was not what we expect.
    pub fn is_malformed(&self) -> bool {
        matches!(self, FetchError::Malformed { .. })
    }
}

/// FPL API client. Owns the run's HTTP session.
pub struct FplClient {
    http: reqwest::Client,
    base_url: String,
    gate: AdmissionGate,
}

impl FplClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(config.max_concurrency);

        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            gate: AdmissionGate::new(config.max_concurrency),
        })
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Fetch every team and player in one payload.
    pub async fn fetch_bootstrap(&self) -> Result<Bootstrap, FetchError> {
        info!("Fetching bootstrap data");
        self.get("bootstrap-static/").await
    }

    /// Fetch one player's gameweek history.
    pub async fn fetch_player_history(&self, player_id: i32) -> Result<ElementSummary, FetchError> {
        self.get(&format!("element-summary/{}/", player_id)).await
    }

    /// Fetch histories for all `player_ids` concurrently, bounded by the
    /// gate. Results line up with the input order.
    pub async fn fetch_all_players_history(
        &self,
        player_ids: &[i32],
    ) -> Vec<Result<ElementSummary, FetchError>> {
        info!(count = player_ids.len(), "Fetching player histories");
        join_all(player_ids.iter().map(|&id| self.fetch_player_history(id))).await
    }

    /// End the HTTP session.
    pub fn close(self) {
        info!(peak_in_flight = self.gate.peak(), "HTTP session closed");
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, FetchError> {
        let _admission = self.gate.admit().await;
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(url = %url, in_flight = self.gate.in_flight(), "GET");

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                error!(url = %url, error = %e, "Request failed");
                return Err(FetchError::Transport { url, source: e });
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            error!(url = %url, status = status.as_u16(), "API error");
            return Err(FetchError::Status { url, status });
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                error!(url = %url, error = %e, "Failed to read response body");
                return Err(FetchError::Transport { url, source: e });
            }
        };

        serde_json::from_str(&body).map_err(|e| {
            error!(url = %url, error = %e, "Failed to parse response body");
            FetchError::Malformed { url, source: e }
        })
    }
}
