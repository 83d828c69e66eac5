//! Publishing forecasts and accuracy records to the relational store.
//!
//! The prediction table is cleared and refilled inside the same transaction
//! as the accuracy inserts, so a failed publish leaves the previous forecast
//! in place.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use sqlx::PgPool;

use crate::db::models::{AccuracyRecord, ForecastRecord};
use crate::db::queries;
use crate::errors::AppError;

/// What one publish wrote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishOutcome {
    /// Whether the prediction table was replaced.
    pub replaced_predictions: bool,
    pub predictions_cleared: u64,
    pub predictions_written: u64,
    pub accuracy_written: u64,
}

/// Inner join of the two variable forecasts on hour, ordered by hour.
///
/// Hours forecast for only one variable are dropped.
pub fn join_forecasts(
    temperature: &[(NaiveDateTime, f64)],
    humidity: &[(NaiveDateTime, f64)],
) -> Vec<ForecastRecord> {
    let humidity_by_hour: BTreeMap<NaiveDateTime, f64> = humidity.iter().copied().collect();
    let mut joined: Vec<ForecastRecord> = temperature
        .iter()
        .filter_map(|(hour, t)| {
            humidity_by_hour.get(hour).map(|h| ForecastRecord {
                hour: *hour,
                predicted_temperature: *t,
                predicted_humidity: *h,
            })
        })
        .collect();
    joined.sort_by_key(|r| r.hour);
    joined.dedup_by_key(|r| r.hour);

    let dropped = temperature.len().max(humidity.len()) - joined.len();
    if dropped > 0 {
        tracing::warn!(
            "{} forecast hours lacked a counterpart in the other variable and were dropped",
            dropped
        );
    }
    joined
}

/// Replace the forecast (when given) and append accuracy rows in one transaction.
///
/// With `predictions == None` the prediction table is left untouched.
pub async fn publish(
    pool: &PgPool,
    predictions: Option<&[ForecastRecord]>,
    accuracy: &[AccuracyRecord],
) -> Result<PublishOutcome, AppError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::write("begin publish transaction", e))?;

    let mut outcome = PublishOutcome::default();

    if let Some(rows) = predictions {
        outcome.predictions_cleared = queries::clear_predictions(&mut *tx)
            .await
            .map_err(|e| AppError::write("delete from prediction", e))?;
        outcome.predictions_written = queries::insert_predictions(&mut *tx, rows)
            .await
            .map_err(|e| AppError::write("insert into prediction", e))?;
        outcome.replaced_predictions = true;
    }

    outcome.accuracy_written = queries::insert_accuracy(&mut *tx, accuracy)
        .await
        .map_err(|e| AppError::write("insert into model_accuracy", e))?;

    tx.commit()
        .await
        .map_err(|e| AppError::write("commit publish transaction", e))?;

    tracing::info!(
        "Published: predictions {} ({} cleared, {} written), {} accuracy rows",
        if outcome.replaced_predictions {
            "replaced"
        } else {
            "kept"
        },
        outcome.predictions_cleared,
        outcome.predictions_written,
        outcome.accuracy_written,
    );

    Ok(outcome)
}
