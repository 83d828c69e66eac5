//! Incremental sync of upstream telemetry into the per-variable tables.
//!
//! The watermark is never stored: it is recomputed on every run as the
//! earlier of the two tables' latest timestamps. Because the batch commits
//! atomically, the watermark always reflects fully ingested data, and the
//! strict `>` comparison upstream makes re-runs safe without deduplication.

use chrono::NaiveDateTime;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::models::{TelemetryRow, Variable};
use crate::db::queries;
use crate::errors::AppError;
use crate::services::telemetry::{CrateClient, TelemetrySource};

/// Relational destination for mirrored readings.
#[allow(async_fn_in_trait)]
pub trait ReadingSink {
    /// Latest timestamp already stored for `variable`, `None` when empty.
    async fn latest_timestamp(&mut self, variable: Variable)
        -> Result<Option<NaiveDateTime>, AppError>;

    /// Store every row into both variable tables as one all-or-nothing batch.
    /// Returns the number of upstream rows written.
    async fn append_batch(&mut self, rows: &[TelemetryRow]) -> Result<u64, AppError>;
}

/// PostgreSQL-backed sink writing the `temperature` and `humidity` tables.
pub struct PgReadingSink<'a> {
    pool: &'a PgPool,
}

impl<'a> PgReadingSink<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }
}

impl ReadingSink for PgReadingSink<'_> {
    async fn latest_timestamp(
        &mut self,
        variable: Variable,
    ) -> Result<Option<NaiveDateTime>, AppError> {
        queries::max_timestamp(self.pool, variable)
            .await
            .map_err(|e| AppError::relational("select max(timestamp)", e))
    }

    async fn append_batch(&mut self, rows: &[TelemetryRow]) -> Result<u64, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::relational("begin sync transaction", e))?;

        // Dropping `tx` on an early return rolls the whole batch back.
        let temperature = queries::insert_readings(&mut *tx, Variable::Temperature, rows)
            .await
            .map_err(|e| AppError::relational("insert temperature readings", e))?;
        let humidity = queries::insert_readings(&mut *tx, Variable::Humidity, rows)
            .await
            .map_err(|e| AppError::relational("insert humidity readings", e))?;

        tx.commit()
            .await
            .map_err(|e| AppError::relational("commit sync transaction", e))?;

        debug_assert_eq!(temperature, humidity);
        Ok(temperature)
    }
}

/// What one sync run did.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub watermark_before: Option<NaiveDateTime>,
    pub watermark_after: Option<NaiveDateTime>,
    pub rows_pulled: usize,
    pub rows_inserted: u64,
}

/// The earlier of the two per-table watermarks.
///
/// An empty table has no watermark, which forces a pull from the beginning
/// so that neither variable falls behind the other.
pub fn effective_watermark(
    temperature: Option<NaiveDateTime>,
    humidity: Option<NaiveDateTime>,
) -> Option<NaiveDateTime> {
    match (temperature, humidity) {
        (Some(t), Some(h)) => Some(t.min(h)),
        _ => None,
    }
}

/// Pull rows newer than the watermark and mirror them into the sink.
pub async fn sync<S, K>(source: &S, sink: &mut K, page_size: i64) -> Result<SyncOutcome, AppError>
where
    S: TelemetrySource,
    K: ReadingSink,
{
    let temperature = sink.latest_timestamp(Variable::Temperature).await?;
    let humidity = sink.latest_timestamp(Variable::Humidity).await?;
    let watermark = effective_watermark(temperature, humidity);

    tracing::info!(
        "Sync watermark: {} (temperature: {:?}, humidity: {:?})",
        watermark
            .map(|w| w.to_string())
            .unwrap_or_else(|| "none".to_string()),
        temperature,
        humidity,
    );

    let mut rows = source.fetch_since(watermark, page_size).await?;
    let rows_pulled = rows.len();

    // Hold the strict-greater invariant even if the source returns stragglers.
    if let Some(w) = watermark {
        rows.retain(|r| r.timestamp > w);
        if rows.len() < rows_pulled {
            tracing::warn!(
                "Dropped {} source rows at or before the watermark",
                rows_pulled - rows.len()
            );
        }
    }
    rows.sort_by_key(|r| r.timestamp);

    if rows.is_empty() {
        tracing::info!("No new telemetry since watermark");
        return Ok(SyncOutcome {
            watermark_before: watermark,
            watermark_after: watermark,
            rows_pulled,
            rows_inserted: 0,
        });
    }

    if rows_pulled as i64 >= page_size {
        tracing::info!(
            "Pulled a full page of {} rows; remaining rows follow on the next run",
            page_size
        );
    }

    let rows_inserted = sink.append_batch(&rows).await?;
    let watermark_after = rows.last().map(|r| r.timestamp).max(watermark);

    tracing::info!(
        "Synced {} rows into {} and {}",
        rows_inserted,
        Variable::Temperature,
        Variable::Humidity
    );

    Ok(SyncOutcome {
        watermark_before: watermark,
        watermark_after,
        rows_pulled,
        rows_inserted,
    })
}

/// Sync the configured entity from CrateDB into the relational store.
pub async fn run_sync(pool: &PgPool, config: &AppConfig) -> Result<SyncOutcome, AppError> {
    let source = CrateClient::new(&config.crate_url, &config.source_table, &config.entity_id)?;
    let mut sink = PgReadingSink::new(pool);
    sync(&source, &mut sink, config.sync_page_size).await
}
