//! Hourly resampling of raw readings.
//!
//! Readings are averaged into hour buckets, laid onto a dense grid of 24
//! slots per calendar day (naive clock) from the first to the last observed
//! date, and the empty slots are filled by linear interpolation with the
//! nearest known value extended over both edges.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::db::models::{HourlyAverage, Reading, Variable};
use crate::errors::AppError;

const HOURS_PER_DAY: i64 = 24;

/// One grid slot before gap filling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourlyPoint {
    pub hour: NaiveDateTime,
    pub value: Option<f64>,
}

/// A gap-free hourly series: `values[i]` belongs to `start + i hours`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledSeries {
    pub variable: Variable,
    start: NaiveDateTime,
    values: Vec<f64>,
}

impl ResampledSeries {
    pub fn new(variable: Variable, start: NaiveDateTime, values: Vec<f64>) -> Self {
        Self {
            variable,
            start,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn hour_at(&self, index: usize) -> NaiveDateTime {
        self.start + Duration::hours(index as i64)
    }

    /// Hour of the last point, `None` for an empty series.
    pub fn last_hour(&self) -> Option<NaiveDateTime> {
        self.len().checked_sub(1).map(|i| self.hour_at(i))
    }

    pub fn points(&self) -> impl Iterator<Item = (NaiveDateTime, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (self.hour_at(i), *v))
    }

    /// Split chronologically: `[0, at)` and `[at, len)`.
    pub fn split_at(&self, at: usize) -> (ResampledSeries, ResampledSeries) {
        let at = at.min(self.len());
        let (head, tail) = self.values.split_at(at);
        (
            ResampledSeries::new(self.variable, self.start, head.to_vec()),
            ResampledSeries::new(self.variable, self.hour_at(at), tail.to_vec()),
        )
    }
}

/// Floor a timestamp to the start of its hour.
pub fn floor_to_hour(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_hms_opt(ts.hour(), 0, 0).unwrap_or(ts)
}

/// Hourly store aggregates as readings, so they flow through the same path.
pub fn readings_from_hourly(variable: Variable, rows: &[HourlyAverage]) -> Vec<Reading> {
    rows.iter()
        .map(|r| Reading {
            variable,
            timestamp: r.hour,
            value: r.avg_value,
        })
        .collect()
}

/// Average finite readings per hour bucket.
fn hourly_means(readings: &[Reading]) -> BTreeMap<NaiveDateTime, f64> {
    let mut buckets: BTreeMap<NaiveDateTime, (f64, u32)> = BTreeMap::new();
    for r in readings.iter().filter(|r| r.value.is_finite()) {
        let entry = buckets.entry(floor_to_hour(r.timestamp)).or_insert((0.0, 0));
        entry.0 += r.value;
        entry.1 += 1;
    }
    buckets
        .into_iter()
        .map(|(hour, (sum, count))| (hour, sum / count as f64))
        .collect()
}

/// Left-join the dense grid for `[first_day, last_day]` against the hourly means.
pub fn hourly_grid(
    first_day: NaiveDate,
    last_day: NaiveDate,
    means: &BTreeMap<NaiveDateTime, f64>,
) -> Vec<HourlyPoint> {
    let days = (last_day - first_day).num_days().max(0) + 1;
    let start = first_day.and_time(chrono::NaiveTime::MIN);
    (0..days * HOURS_PER_DAY)
        .map(|i| {
            let hour = start + Duration::hours(i);
            HourlyPoint {
                hour,
                value: means.get(&hour).copied(),
            }
        })
        .collect()
}

/// Fill interior gaps linearly and edge gaps with the nearest known value.
///
/// Returns `None` when there is no known value at all.
pub fn fill_gaps(slots: &[Option<f64>]) -> Option<Vec<f64>> {
    let known: Vec<usize> = slots
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|_| i))
        .collect();
    let first = *known.first()?;
    let last = *known.last()?;

    let mut filled = vec![0.0; slots.len()];
    let first_value = slots[first]?;
    let last_value = slots[last]?;

    for slot in filled.iter_mut().take(first) {
        *slot = first_value;
    }
    for pair in known.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        let (lo_v, hi_v) = (slots[lo]?, slots[hi]?);
        let span = (hi - lo) as f64;
        for (step, slot) in filled[lo..hi].iter_mut().enumerate() {
            *slot = lo_v + (hi_v - lo_v) * step as f64 / span;
        }
    }
    filled[last] = last_value;
    for slot in filled.iter_mut().skip(last + 1) {
        *slot = last_value;
    }

    Some(filled)
}

/// Resample one variable's readings into a gap-free hourly series.
pub fn resample(variable: Variable, readings: &[Reading]) -> Result<ResampledSeries, AppError> {
    debug_assert!(readings.iter().all(|r| r.variable == variable));

    let means = hourly_means(readings);
    let (first, last) = match (means.keys().next(), means.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(AppError::InsufficientData { variable }),
    };

    let grid = hourly_grid(first.date(), last.date(), &means);
    let slots: Vec<Option<f64>> = grid.iter().map(|p| p.value).collect();
    let values = fill_gaps(&slots).ok_or(AppError::InsufficientData { variable })?;

    let start = grid.first().map(|p| p.hour).unwrap_or(first);
    tracing::info!(
        "Resampled {}: {} readings -> {} hourly points ({} filled) from {}",
        variable,
        readings.len(),
        values.len(),
        slots.iter().filter(|v| v.is_none()).count(),
        start,
    );

    Ok(ResampledSeries::new(variable, start, values))
}
