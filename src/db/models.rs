use chrono::NaiveDateTime;
use sqlx::FromRow;
use std::fmt;

/// The two monitored variables. Each one is mirrored into its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    Temperature,
    Humidity,
}

impl Variable {
    pub const ALL: [Variable; 2] = [Variable::Temperature, Variable::Humidity];

    /// Destination table in the relational store.
    pub fn table(self) -> &'static str {
        match self {
            Variable::Temperature => "temperature",
            Variable::Humidity => "humidity",
        }
    }

    pub fn as_str(self) -> &'static str {
        self.table()
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single time-stamped reading of one variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub variable: Variable,
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

/// A row pulled from the upstream source: one instant, both variables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryRow {
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub humidity: f64,
}

impl TelemetryRow {
    /// Split into one reading per variable, in `Variable::ALL` order.
    pub fn readings(&self) -> [Reading; 2] {
        [
            Reading {
                variable: Variable::Temperature,
                timestamp: self.timestamp,
                value: self.temperature,
            },
            Reading {
                variable: Variable::Humidity,
                timestamp: self.timestamp,
                value: self.humidity,
            },
        ]
    }
}

/// Hourly mean of one variable, as aggregated by the relational store.
#[derive(Debug, Clone, FromRow)]
pub struct HourlyAverage {
    pub hour: NaiveDateTime,
    pub avg_value: f64,
}

/// One published forecast hour. The whole set is replaced on every run.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ForecastRecord {
    #[sqlx(rename = "timestamp")]
    pub hour: NaiveDateTime,
    #[sqlx(rename = "temperature")]
    pub predicted_temperature: f64,
    #[sqlx(rename = "humidity")]
    pub predicted_humidity: f64,
}

/// Held-out accuracy of one variable's model for one run (append-only log).
///
/// Metric columns are NULL when the run could not compute them
/// (degenerate split, or MAPE with no non-zero actuals).
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct AccuracyRecord {
    pub model: String,
    pub mae: Option<f64>,
    /// Percent, e.g. `12.5` for 12.5%.
    pub mape: Option<f64>,
    pub mse: Option<f64>,
    pub rmse: Option<f64>,
    pub timestamp: NaiveDateTime,
}
