use std::str::FromStr;

use crate::errors::AppError;

const DEFAULT_CRATE_URL: &str = "http://db-crate:4200";
const DEFAULT_ENTITY_ID: &str = "Joselito";
const DEFAULT_SOURCE_TABLE: &str = "doc.etvariables";
const DEFAULT_SYNC_PAGE_SIZE: i64 = 10_000;
const DEFAULT_FORECAST_HORIZON: usize = 24;
const DEFAULT_FOREST_TREES: usize = 100;
const DEFAULT_RANDOM_SEED: u64 = 123;

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Job configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Base URL of the CrateDB HTTP endpoint (the `_sql` path is appended).
    pub crate_url: String,
    pub entity_id: String,
    pub source_table: String,
    /// Upper bound on rows pulled from the source in one sync run.
    pub sync_page_size: i64,
    pub forecast_horizon: usize,
    pub forest_trees: usize,
    pub random_seed: u64,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// `from_env` delegates here so tests can feed values without touching
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| AppError::Config("DATABASE_URL must be set".to_string()))?;

        let sync_page_size: i64 = parse_or(&lookup, "SYNC_PAGE_SIZE", DEFAULT_SYNC_PAGE_SIZE)?;
        if sync_page_size <= 0 {
            return Err(AppError::Config(
                "SYNC_PAGE_SIZE must be positive".to_string(),
            ));
        }

        let forecast_horizon = parse_or(&lookup, "FORECAST_HORIZON", DEFAULT_FORECAST_HORIZON)?;
        if forecast_horizon == 0 {
            return Err(AppError::Config(
                "FORECAST_HORIZON must be at least 1".to_string(),
            ));
        }

        let forest_trees = parse_or(&lookup, "FOREST_TREES", DEFAULT_FOREST_TREES)?;
        if forest_trees == 0 {
            return Err(AppError::Config("FOREST_TREES must be at least 1".to_string()));
        }

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "LOG_FORMAT must be 'text' or 'json', got '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            database_url,
            crate_url: lookup("CRATE_URL").unwrap_or_else(|| DEFAULT_CRATE_URL.to_string()),
            entity_id: lookup("ENTITY_ID").unwrap_or_else(|| DEFAULT_ENTITY_ID.to_string()),
            source_table: lookup("SOURCE_TABLE")
                .unwrap_or_else(|| DEFAULT_SOURCE_TABLE.to_string()),
            sync_page_size,
            forecast_horizon,
            forest_trees,
            random_seed: parse_or(&lookup, "RANDOM_SEED", DEFAULT_RANDOM_SEED)?,
            log_format,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{} is invalid ('{}'): {}", key, raw, e))),
    }
}
