//! Fantasy Premier League ingestion job.
//!
//! Pulls teams, players and per-gameweek player history from the public FPL
//! API and upserts them into PostgreSQL. A run is fetch, normalize, upsert;
//! see [`etl::run_etl`].

pub mod client;
pub mod config;
pub mod db;
pub mod etl;
pub mod gate;
pub mod models;
pub mod telemetry;

pub use client::{FetchError, FplClient};
pub use config::Config;
pub use db::{Database, StatStore, StoreError};
pub use etl::{run_etl, EtlJob, RunOutcome, RunSummary};
