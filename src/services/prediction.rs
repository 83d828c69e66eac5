//! One prediction run: resample, evaluate, forecast and publish both variables.

use chrono::NaiveDateTime;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::models::{AccuracyRecord, ForecastRecord, Variable};
use crate::db::queries;
use crate::errors::AppError;
use crate::services::evaluate::{accuracy_record, evaluate, model_label, AccuracyMetrics};
use crate::services::forecaster::{forecast, select_lags};
use crate::services::forest::{ForestParams, Regressor};
use crate::services::publish::{join_forecasts, publish, PublishOutcome};
use crate::services::resample::{readings_from_hourly, resample, ResampledSeries};

/// Evaluation and production forecast of one variable.
#[derive(Debug, Clone)]
pub struct VariableForecast {
    pub variable: Variable,
    pub model: String,
    pub lags: usize,
    /// `None` when the series was too short for a train/test split.
    pub metrics: Option<AccuracyMetrics>,
    pub forecast: Vec<(NaiveDateTime, f64)>,
}

/// Rows to hand to the publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishPlan {
    /// `None` unless both variables were forecast.
    pub predictions: Option<Vec<ForecastRecord>>,
    pub accuracy: Vec<AccuracyRecord>,
}

/// Evaluate on a 70/30 split, then refit a fresh forest on the whole series.
pub fn forecast_variable(
    series: &ResampledSeries,
    params: ForestParams,
    horizon: usize,
) -> Result<VariableForecast, AppError> {
    let evaluation = match evaluate(series, params.build()) {
        Ok(evaluation) => Some(evaluation),
        Err(AppError::DegenerateSplit { len }) => {
            tracing::warn!(
                "Skipping {} evaluation: {} hourly points cannot be split",
                series.variable,
                len
            );
            None
        }
        Err(e) => return Err(e),
    };

    let lags = match &evaluation {
        Some(e) => e.lags,
        None => select_lags(series.len()).ok_or(AppError::InsufficientData {
            variable: series.variable,
        })?,
    };

    let regressor = params.build();
    let model = model_label(regressor.name(), series.variable);
    let forecast = forecast(series, regressor, lags, horizon)?;

    Ok(VariableForecast {
        variable: series.variable,
        model,
        lags,
        metrics: evaluation.map(|e| e.metrics),
        forecast,
    })
}

impl PublishPlan {
    /// Build the publish rows from whichever variables produced a forecast.
    pub fn from_forecasts(forecasts: &[VariableForecast], evaluated_at: NaiveDateTime) -> Self {
        let find = |variable: Variable| forecasts.iter().find(|f| f.variable == variable);

        let predictions = match (find(Variable::Temperature), find(Variable::Humidity)) {
            (Some(t), Some(h)) => Some(join_forecasts(&t.forecast, &h.forecast)),
            _ => None,
        };

        let accuracy = forecasts
            .iter()
            .map(|f| accuracy_record(f.model.clone(), f.metrics.as_ref(), evaluated_at))
            .collect();

        Self {
            predictions,
            accuracy,
        }
    }
}

async fn load_series(pool: &PgPool, variable: Variable) -> Result<ResampledSeries, AppError> {
    let rows = queries::hourly_averages(pool, variable)
        .await
        .map_err(|e| AppError::relational("select hourly averages", e))?;
    tracing::debug!("Loaded {} hourly {} averages", rows.len(), variable);
    resample(variable, &readings_from_hourly(variable, &rows))
}

/// Run the whole prediction job against the relational store.
///
/// A variable without readings is skipped; every other error aborts the run.
pub async fn run_prediction(pool: &PgPool, config: &AppConfig) -> Result<PublishOutcome, AppError> {
    let params = ForestParams::new(config.forest_trees, config.random_seed);
    let mut forecasts = Vec::with_capacity(Variable::ALL.len());

    for variable in Variable::ALL {
        let result = load_series(pool, variable)
            .await
            .and_then(|series| forecast_variable(&series, params, config.forecast_horizon));
        match result {
            Ok(f) => forecasts.push(f),
            Err(e @ AppError::InsufficientData { .. }) => {
                tracing::warn!("{}; not forecasting {}", e, variable);
            }
            Err(e) => return Err(e),
        }
    }

    let plan = PublishPlan::from_forecasts(&forecasts, chrono::Utc::now().naive_utc());
    if plan.predictions.is_none() {
        tracing::warn!("Keeping the previous forecast: not every variable could be forecast");
    }
    publish(pool, plan.predictions.as_deref(), &plan.accuracy).await
}
