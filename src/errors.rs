use std::fmt;

use crate::db::models::Variable;

/// The two stores a job talks to, named in every I/O error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    /// Upstream append-only time-series store (CrateDB).
    Telemetry,
    /// Relational store holding mirrored readings and forecast results (PostgreSQL).
    Relational,
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Store::Telemetry => write!(f, "telemetry store"),
            Store::Relational => write!(f, "relational store"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{store} unreachable: {source}")]
    Connectivity {
        store: Store,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{store} query failed ({query}): {source}")]
    Query {
        store: Store,
        query: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("No {variable} readings available to resample")]
    InsufficientData { variable: Variable },

    #[error("Series of {len} hourly points is too short for a train/test split")]
    DegenerateSplit { len: usize },

    #[error("Publish failed ({query}): {source}")]
    Write {
        query: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Malformed telemetry payload: {0}")]
    Source(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),
}

impl AppError {
    /// Wrap a sqlx error raised by a relational read or ingest statement.
    ///
    /// Pool and I/O failures are classified as connectivity problems so the
    /// log line says the store was unreachable rather than blaming the query.
    pub fn relational(query: &'static str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => AppError::Connectivity {
                store: Store::Relational,
                source: Box::new(err),
            },
            other => AppError::Query {
                store: Store::Relational,
                query,
                source: Box::new(other),
            },
        }
    }

    /// Wrap a sqlx error raised while publishing forecast results.
    pub fn write(query: &'static str, err: sqlx::Error) -> Self {
        AppError::Write { query, source: err }
    }

    /// Whether the error means a store could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, AppError::Connectivity { .. })
    }
}
