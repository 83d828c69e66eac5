//! Chronological train/test evaluation of the forecaster.

use chrono::NaiveDateTime;

use crate::db::models::{AccuracyRecord, Variable};
use crate::errors::AppError;
use crate::helpers::{finite_or_none, opt_finite_or_none};
use crate::services::forecaster::{select_lags, AutoregForecaster};
use crate::services::forest::Regressor;
use crate::services::resample::ResampledSeries;

/// Share of the series used for training, in tenths; the rest is held out.
const TRAIN_TENTHS: usize = 7;

/// Held-out accuracy of one forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyMetrics {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    /// Mean absolute percentage error over the non-zero actuals, in percent
    /// (`12.5` means 12.5%); `None` when every actual is zero.
    pub mape: Option<f64>,
}

/// Result of evaluating one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Lags validated on the training segment, reused for the production fit.
    pub lags: usize,
    pub train_len: usize,
    pub test_len: usize,
    pub metrics: AccuracyMetrics,
}

/// Index at which the series is split: the first 70% trains.
pub fn split_index(n: usize) -> usize {
    n * TRAIN_TENTHS / 10
}

/// Mean absolute percentage error in percent, skipping points whose actual value is zero.
pub fn mape(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    let (sum, count) = actual
        .iter()
        .zip(predicted)
        .filter(|(a, _)| **a != 0.0)
        .fold((0.0, 0usize), |(sum, count), (a, p)| {
            (sum + ((a - p) / a).abs(), count + 1)
        });
    (count > 0).then(|| sum / count as f64 * 100.0)
}

/// MAE, MSE, RMSE and MAPE. `None` for empty or mismatched inputs.
pub fn accuracy_metrics(actual: &[f64], predicted: &[f64]) -> Option<AccuracyMetrics> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }
    let n = actual.len() as f64;
    let mae = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / n;
    let mse = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / n;

    Some(AccuracyMetrics {
        mae,
        mse,
        rmse: mse.sqrt(),
        mape: mape(actual, predicted),
    })
}

/// Fit on the first 70% of the series and score a walk-forward forecast of the rest.
///
/// Fails with `DegenerateSplit` when either segment is too short to fit or score.
pub fn evaluate<R: Regressor>(
    series: &ResampledSeries,
    regressor: R,
) -> Result<Evaluation, AppError> {
    let (train, test) = series.split_at(split_index(series.len()));
    let degenerate = AppError::DegenerateSplit { len: series.len() };
    if test.is_empty() {
        return Err(degenerate);
    }
    let Some(lags) = select_lags(train.len()) else {
        return Err(degenerate);
    };

    let mut forecaster = AutoregForecaster::new(regressor, lags);
    forecaster.fit(train.values())?;
    let predicted = forecaster.predict(test.len())?;
    let metrics = accuracy_metrics(test.values(), &predicted).ok_or(degenerate)?;

    tracing::info!(
        "Evaluated {} ({}): train={} test={} lags={} mae={:.4} rmse={:.4} mape={}",
        series.variable,
        forecaster.regressor_name(),
        train.len(),
        test.len(),
        forecaster.lags(),
        metrics.mae,
        metrics.rmse,
        metrics
            .mape
            .map(|m| format!("{:.2}%", m))
            .unwrap_or_else(|| "n/a".to_string()),
    );

    Ok(Evaluation {
        lags,
        train_len: train.len(),
        test_len: test.len(),
        metrics,
    })
}

/// Model label stored in `model_accuracy`.
pub fn model_label(regressor_name: &str, variable: Variable) -> String {
    format!("{}-{}", regressor_name, variable)
}

/// Accuracy row for one variable; unavailable metrics become NULL.
pub fn accuracy_record(
    model: String,
    metrics: Option<&AccuracyMetrics>,
    timestamp: NaiveDateTime,
) -> AccuracyRecord {
    match metrics {
        Some(m) => AccuracyRecord {
            mae: finite_or_none(m.mae, "mae"),
            mape: opt_finite_or_none(m.mape, "mape"),
            mse: finite_or_none(m.mse, "mse"),
            rmse: finite_or_none(m.rmse, "rmse"),
            model,
            timestamp,
        },
        None => AccuracyRecord {
            model,
            mae: None,
            mape: None,
            mse: None,
            rmse: None,
            timestamp,
        },
    }
}
