//! Orchestration of a full ingestion run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::ops::Range;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::client::{FetchError, FplClient};
use crate::config::Config;
use crate::db::{Database, StatStore, StoreError};
use crate::models::{ElementSummary, GameweekRecord};

/// Player ids per history chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    BootstrapUnavailable,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::BootstrapUnavailable => f.write_str("could_not_fetch_bootstrap_data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunSummary),
    Aborted(AbortReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub teams: usize,
    pub players: usize,
    pub chunks: usize,
    /// History records handed to the store.
    pub history_records: usize,
    /// Rows the store reported as newly inserted.
    pub history_rows_inserted: u64,
    pub failed_history_fetches: usize,
}

/// One ingestion run over a client and a store.
pub struct EtlJob<'a, S> {
    client: &'a FplClient,
    store: &'a S,
    chunk_size: usize,
}

impl<'a, S: StatStore> EtlJob<'a, S> {
    pub fn new(client: &'a FplClient, store: &'a S, chunk_size: usize) -> Self {
        Self {
            client,
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Fetch, normalize, upsert. Store errors end the run; fetch errors do
    /// not, except for the bootstrap.
    pub async fn run(&self) -> Result<RunOutcome, StoreError> {
        let started_at = Utc::now();

        let bootstrap = match self.client.fetch_bootstrap().await {
            Ok(bootstrap) if !bootstrap.is_empty() => bootstrap,
            Ok(_) | Err(_) => {
                let reason = AbortReason::BootstrapUnavailable;
                error!(reason = %reason, "ETL failed");
                return Ok(RunOutcome::Aborted(reason));
            }
        };

        self.store.upsert_teams(&bootstrap.teams).await?;
        self.store.upsert_players(&bootstrap.elements).await?;

        let player_ids = bootstrap.player_ids();
        info!(count = player_ids.len(), "Fetching history for players");

        let mut summary = RunSummary {
            started_at,
            finished_at: started_at,
            teams: bootstrap.teams.len(),
            players: bootstrap.elements.len(),
            chunks: 0,
            history_records: 0,
            history_rows_inserted: 0,
            failed_history_fetches: 0,
        };

        for range in chunk_ranges(player_ids.len(), self.chunk_size) {
            let histories = self
                .client
                .fetch_all_players_history(&player_ids[range.clone()])
                .await;
            let (records, failed) = flatten_histories(histories);

            if !records.is_empty() {
                summary.history_rows_inserted += self.store.upsert_gameweek_history(&records).await?;
            }

            info!(
                start = range.start,
                end = range.end,
                records = records.len(),
                failed,
                "Processed chunk"
            );
            summary.chunks += 1;
            summary.history_records += records.len();
            summary.failed_history_fetches += failed;
        }

        summary.finished_at = Utc::now();
        Ok(RunOutcome::Completed(summary))
    }
}

/// Split `0..len` into consecutive ranges of at most `size`.
pub fn chunk_ranges(len: usize, size: usize) -> impl Iterator<Item = Range<usize>> {
    let size = size.max(1);
    (0..len).step_by(size).map(move |start| start..(start + size).min(len))
}

/// Concatenate the `history` lists in input order, along with the number of
/// failed fetches. Failures and payloads without history contribute no
/// records.
pub fn flatten_histories(
    results: Vec<Result<ElementSummary, FetchError>>,
) -> (Vec<GameweekRecord>, usize) {
    let mut records = Vec::new();
    let mut failed = 0;

    for result in results {
        match result {
            Ok(ElementSummary {
                history: Some(history),
            }) => records.extend(history),
            Ok(_) => {}
            Err(_) => failed += 1,
        }
    }

    (records, failed)
}

/// Full lifecycle: connect, run, close the HTTP session, disconnect.
pub async fn run_etl(config: &Config) -> Result<RunOutcome> {
    let clock = Instant::now();
    let db = Database::connect(&config.database)
        .await
        .context("Failed to connect to database")?;

    let result = run_with_store(config, &db).await;
    db.disconnect().await;

    match &result {
        Ok(RunOutcome::Completed(summary)) => info!(
            teams = summary.teams,
            players = summary.players,
            chunks = summary.chunks,
            history_records = summary.history_records,
            history_rows_inserted = summary.history_rows_inserted,
            failed_history_fetches = summary.failed_history_fetches,
            elapsed_ms = clock.elapsed().as_millis() as u64,
            "ETL complete"
        ),
        Ok(RunOutcome::Aborted(reason)) => warn!(reason = %reason, "ETL aborted"),
        Err(e) => {
            let cause = format!("{:#}", e);
            error!(error = %cause, "ETL failed");
        }
    }

    result
}

async fn run_with_store<S: StatStore>(config: &Config, store: &S) -> Result<RunOutcome> {
    let client = FplClient::new(&config.api)?;
    let outcome = EtlJob::new(&client, store, config.history_chunk_size)
        .run()
        .await;
    client.close();
    Ok(outcome?)
}
