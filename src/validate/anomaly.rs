//! Spike detection against a trailing rolling mean.
//!
//! Only values above `floor` are considered. Each value is compared to the
//! time-windowed mean that ends on the previous considered row; where that
//! mean is undefined (too few points) the raw value stands in, giving a ratio
//! of one.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValueError};
use crate::series::{Metric, Series};
use crate::validate::skip::SkipList;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalySettings {
    pub enabled: bool,
    pub threshold: f64,
    pub floor: u64,
    pub window_days: u32,
    pub min_periods: usize,
}

impl Default for AnomalySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 6.0,
            floor: 10_000,
            window_days: 7,
            min_periods: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Anomaly {
    pub date: NaiveDate,
    pub value: u64,
    pub rolling_mean: f64,
    pub ratio: f64,
}

pub fn detect_anomalies(series: &Series, metric: Metric, settings: &AnomalySettings) -> Vec<Anomaly> {
    let points: Vec<(NaiveDate, u64)> = series
        .values(metric)
        .into_iter()
        .filter(|(_, value)| *value > settings.floor)
        .collect();

    let means = rolling_means(&points, settings.window_days, settings.min_periods);

    let mut anomalies = Vec::new();
    for (index, (date, value)) in points.iter().enumerate() {
        let trailing = index
            .checked_sub(1)
            .and_then(|prev| means[prev])
            .unwrap_or(*value as f64);
        let ratio = *value as f64 / (trailing + EPSILON);
        if ratio > settings.threshold {
            anomalies.push(Anomaly {
                date: *date,
                value: *value,
                rolling_mean: trailing,
                ratio,
            });
        }
    }
    anomalies
}

/// Fails unless every flagged `(date, metric)` is in `skip`.
pub fn check_anomalies(
    series: &Series,
    metric: Metric,
    settings: &AnomalySettings,
    skip: &SkipList,
) -> Result<()> {
    let flagged = detect_anomalies(series, metric, settings);
    if flagged.iter().all(|a| skip.contains(a.date, metric)) {
        return Ok(());
    }
    Err(ValueError::Anomaly {
        location: series.location.clone(),
        metric,
        rows: flagged
            .into_iter()
            .filter(|a| !skip.contains(a.date, metric))
            .map(|a| (a.date, a.value, a.ratio))
            .collect(),
    }
    .into())
}

/// Mean over points dated within `window_days` up to and including each point.
fn rolling_means(points: &[(NaiveDate, u64)], window_days: u32, min_periods: usize) -> Vec<Option<f64>> {
    let mut means = Vec::with_capacity(points.len());
    let mut start = 0;
    let mut sum = 0.0;
    for (end, (date, value)) in points.iter().enumerate() {
        sum += *value as f64;
        let cutoff = date.checked_sub_days(Days::new(u64::from(window_days)));
        while start < end && cutoff.is_some_and(|cutoff| points[start].0 <= cutoff) {
            sum -= points[start].1 as f64;
            start += 1;
        }
        let count = end + 1 - start;
        means.push((count >= min_periods.max(1)).then(|| sum / count as f64));
    }
    means
}
