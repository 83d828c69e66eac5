//! Autoregressive, recursive multi-step forecasting.
//!
//! The value at hour `t` is regressed on the `lags` values before it
//! (`lag_1` = `t-1` first). Forecasting walks forward one hour at a time,
//! feeding each prediction back in as `lag_1` for the next step.

use chrono::{Duration, NaiveDateTime};

use crate::errors::AppError;
use crate::helpers::all_finite;
use crate::services::forest::Regressor;
use crate::services::resample::ResampledSeries;

/// Upper bound on autoregressive lags: one full day of hourly history.
pub const MAX_LAGS: usize = 24;

/// Number of lags for a series of `n` points: `min(24, n - 1)`.
///
/// Used for both the evaluation and the production fit. Returns `None`
/// when the series cannot yield a single (lags, target) sample.
pub fn select_lags(n: usize) -> Option<usize> {
    let lags = MAX_LAGS.min(n.saturating_sub(1));
    (lags >= 1).then_some(lags)
}

/// Lag feature rows and their targets for a series.
pub fn lag_matrix(values: &[f64], lags: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    if lags == 0 || values.len() <= lags {
        return (Vec::new(), Vec::new());
    }
    (lags..values.len())
        .map(|t| {
            let row: Vec<f64> = (1..=lags).map(|k| values[t - k]).collect();
            (row, values[t])
        })
        .unzip()
}

/// A regressor wrapped into a recursive forecaster over hourly values.
#[derive(Debug, Clone)]
pub struct AutoregForecaster<R> {
    regressor: R,
    lags: usize,
    /// The most recent `lags` observed values, oldest first.
    window: Vec<f64>,
}

impl<R: Regressor> AutoregForecaster<R> {
    pub fn new(regressor: R, lags: usize) -> Self {
        Self {
            regressor,
            lags,
            window: Vec::new(),
        }
    }

    pub fn lags(&self) -> usize {
        self.lags
    }

    pub fn regressor_name(&self) -> &'static str {
        self.regressor.name()
    }

    pub fn fit(&mut self, values: &[f64]) -> Result<(), AppError> {
        if self.lags == 0 {
            return Err(AppError::Model("lags must be at least 1".to_string()));
        }
        if values.len() <= self.lags {
            return Err(AppError::Model(format!(
                "{} lags need more than {} observations",
                self.lags,
                values.len()
            )));
        }

        let (features, targets) = lag_matrix(values, self.lags);
        self.regressor.fit(&features, &targets)?;
        self.window = values[values.len() - self.lags..].to_vec();
        Ok(())
    }

    /// Predict `steps` values following the fitted series.
    pub fn predict(&self, steps: usize) -> Result<Vec<f64>, AppError> {
        if self.window.len() != self.lags {
            return Err(AppError::Model("predict called before fit".to_string()));
        }

        let mut history = self.window.clone();
        let mut predictions = Vec::with_capacity(steps);
        for _ in 0..steps {
            let row: Vec<f64> = history.iter().rev().take(self.lags).copied().collect();
            let next = self.regressor.predict(&row)?;
            predictions.push(next);
            history.push(next);
        }
        Ok(predictions)
    }
}

/// Fit on the whole series and forecast `horizon` hours past its last hour.
pub fn forecast<R: Regressor>(
    series: &ResampledSeries,
    regressor: R,
    lags: usize,
    horizon: usize,
) -> Result<Vec<(NaiveDateTime, f64)>, AppError> {
    let last_hour = series.last_hour().ok_or(AppError::InsufficientData {
        variable: series.variable,
    })?;

    let mut forecaster = AutoregForecaster::new(regressor, lags);
    forecaster.fit(series.values())?;
    let values = forecaster.predict(horizon)?;
    if !all_finite(&values) {
        return Err(AppError::Model(format!(
            "{} forecast produced non-finite values",
            series.variable
        )));
    }

    tracing::info!(
        "Forecast {}: {} steps from {} using {} lags on {} points",
        series.variable,
        values.len(),
        last_hour + Duration::hours(1),
        lags,
        series.len(),
    );

    Ok(values
        .into_iter()
        .enumerate()
        .map(|(i, v)| (last_hour + Duration::hours(i as i64 + 1), v))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Variable;
    use crate::services::forest::ForestParams;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    fn daily_cycle(days: usize) -> Vec<f64> {
        (0..days * 24)
            .map(|h| 20.0 + 5.0 * ((h % 24) as f64 / 24.0 * std::f64::consts::TAU).sin())
            .collect()
    }

    /// Predicts `lag_1 + 1`, which makes recursion easy to verify.
    #[derive(Debug, Default)]
    struct PlusOne {
        fitted_rows: usize,
    }

    impl Regressor for PlusOne {
        fn fit(&mut self, features: &[Vec<f64>], _targets: &[f64]) -> Result<(), AppError> {
            self.fitted_rows = features.len();
            Ok(())
        }

        fn predict(&self, row: &[f64]) -> Result<f64, AppError> {
            Ok(row[0] + 1.0)
        }

        fn name(&self) -> &'static str {
            "PlusOne"
        }
    }

    #[test]
    fn test_select_lags_caps_at_one_day() {
        assert_eq!(select_lags(1000), Some(24));
        assert_eq!(select_lags(25), Some(24));
    }

    #[test]
    fn test_select_lags_shrinks_for_short_series() {
        // Same min(24, n - 1) policy on the evaluation and production paths.
        assert_eq!(select_lags(16), Some(15));
        assert_eq!(select_lags(2), Some(1));
        assert_eq!(select_lags(1), None);
        assert_eq!(select_lags(0), None);
    }

    #[test]
    fn test_lag_matrix_most_recent_first() {
        let (x, y) = lag_matrix(&[1.0, 2.0, 3.0, 4.0, 5.0], 2);
        assert_eq!(x, vec![vec![2.0, 1.0], vec![3.0, 2.0], vec![4.0, 3.0]]);
        assert_eq!(y, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_lag_matrix_too_short_is_empty() {
        let (x, y) = lag_matrix(&[1.0, 2.0], 2);
        assert!(x.is_empty() && y.is_empty());
    }

    #[test]
    fn test_predictions_feed_back_recursively() {
        let mut f = AutoregForecaster::new(PlusOne::default(), 3);
        f.fit(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(f.regressor.fitted_rows, 2);
        assert_eq!(f.predict(4).unwrap(), vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_fit_requires_more_points_than_lags() {
        let mut f = AutoregForecaster::new(PlusOne::default(), 3);
        assert!(f.fit(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let f = AutoregForecaster::new(PlusOne::default(), 3);
        assert!(f.predict(1).is_err());
    }

    #[test]
    fn test_single_day_forecasts_next_day() {
        let series = ResampledSeries::new(
            Variable::Temperature,
            ts("2024-01-01T00:00:00"),
            daily_cycle(1),
        );
        let lags = select_lags(series.len()).unwrap();
        let out = forecast(&series, ForestParams::new(10, 123).build(), lags, 24).unwrap();

        assert_eq!(out.len(), 24);
        assert_eq!(out[0].0, ts("2024-01-02T00:00:00"));
        assert_eq!(out[23].0, ts("2024-01-02T23:00:00"));
        assert!(out.iter().all(|(_, v)| v.is_finite()));
    }

    #[test]
    fn test_forecast_is_deterministic_for_fixed_seed() {
        let series = ResampledSeries::new(
            Variable::Humidity,
            ts("2024-01-01T00:00:00"),
            daily_cycle(3),
        );
        let lags = select_lags(series.len()).unwrap();
        let a = forecast(&series, ForestParams::new(8, 123).build(), lags, 24).unwrap();
        let b = forecast(&series, ForestParams::new(8, 123).build(), lags, 24).unwrap();

        let bits = |v: &[(NaiveDateTime, f64)]| {
            v.iter().map(|(_, x)| x.to_bits()).collect::<Vec<_>>()
        };
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn test_forecast_tracks_daily_cycle() {
        let series = ResampledSeries::new(
            Variable::Temperature,
            ts("2024-01-01T00:00:00"),
            daily_cycle(4),
        );
        let out = forecast(&series, ForestParams::new(10, 123).build(), 24, 24).unwrap();

        // Every value stays inside the observed range of the cycle.
        assert!(out.iter().all(|(_, v)| (14.9..=25.1).contains(v)));
        // The peak of the cycle (hour 6) should be forecast well above the trough (hour 18).
        assert!(out[6].1 > out[18].1 + 2.0, "peak {} trough {}", out[6].1, out[18].1);
    }
}
