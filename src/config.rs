//! Process configuration, read from the environment.

use anyhow::{anyhow, bail, Context, Result};
use sqlx::postgres::PgConnectOptions;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::client::{DEFAULT_MAX_CONCURRENCY, FPL_BASE_URL};
use crate::etl::DEFAULT_CHUNK_SIZE;

/// Configuration
#[derive(Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    /// Player ids per history chunk.
    pub history_chunk_size: usize,
    pub log_format: LogFormat,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    /// Full connection string. Takes precedence over the individual parts.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub max_connections: u32,
    pub connect_retries: u32,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub max_concurrency: usize,
    /// No timeout unless configured.
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" => Ok(LogFormat::Text),
            other => Err(anyhow!("unknown log format '{}' (expected json or text)", other)),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: FPL_BASE_URL.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            request_timeout: None,
        }
    }
}

impl Config {
    /// Load from the process environment, after folding in a `.env` file if
    /// one is present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Unset and blank are treated the same.
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database = DatabaseConfig {
            url: var("DATABASE_URL"),
            host: var("DB_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_or(&var, "DB_PORT", 5432)?,
            name: var("DB_NAME"),
            user: var("DB_USER"),
            password: var("DB_PASSWORD"),
            max_connections: parse_or(&var, "DB_MAX_CONNECTIONS", 5)?,
            connect_retries: parse_or(&var, "DB_CONNECT_RETRIES", 3)?,
        };

        let api = ApiConfig {
            base_url: var("FPL_BASE_URL").unwrap_or_else(|| FPL_BASE_URL.to_string()),
            max_concurrency: parse_or(&var, "FPL_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY)?,
            request_timeout: var("FPL_REQUEST_TIMEOUT_SECS")
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .map(Duration::from_secs)
                        .with_context(|| format!("FPL_REQUEST_TIMEOUT_SECS is not a number: {}", v))
                })
                .transpose()?,
        };

        let history_chunk_size = parse_or(&var, "HISTORY_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;

        let log_format = match var("LOG_FORMAT") {
            Some(v) => v.parse()?,
            None => LogFormat::Json,
        };

        if api.max_concurrency == 0 {
            bail!("FPL_MAX_CONCURRENCY must be at least 1");
        }
        if history_chunk_size == 0 {
            bail!("HISTORY_CHUNK_SIZE must be at least 1");
        }
        if database.max_connections == 0 {
            bail!("DB_MAX_CONNECTIONS must be at least 1");
        }

        Ok(Self {
            database,
            api,
            history_chunk_size,
            log_format,
        })
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        if let Some(url) = &self.url {
            return url
                .parse::<PgConnectOptions>()
                .context("DATABASE_URL is not a valid PostgreSQL connection string");
        }

        let mut options = PgConnectOptions::new().host(&self.host).port(self.port);
        if let Some(name) = &self.name {
            options = options.database(name);
        }
        if let Some(user) = &self.user {
            options = options.username(user);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        Ok(options)
    }

    /// Where we are connecting, without credentials.
    pub fn describe(&self) -> String {
        match &self.url {
            Some(_) => "DATABASE_URL".to_string(),
            None => format!(
                "{}:{}/{}",
                self.host,
                self.port,
                self.name.as_deref().unwrap_or("")
            ),
        }
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} is invalid ({}): {}", key, raw, e)),
        None => Ok(default),
    }
}
