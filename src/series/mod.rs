//! Per-location vaccination time series: metrics, observations and rows.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub mod io;

pub use io::{read_series, series_path, write_series};

/// Cumulative counters tracked per location, in output column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TotalVaccinations,
    PeopleVaccinated,
    PeoplePartlyVaccinated,
    PeopleFullyVaccinated,
    TotalBoosters,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::TotalVaccinations,
        Metric::PeopleVaccinated,
        Metric::PeoplePartlyVaccinated,
        Metric::PeopleFullyVaccinated,
        Metric::TotalBoosters,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TotalVaccinations => "total_vaccinations",
            Self::PeopleVaccinated => "people_vaccinated",
            Self::PeoplePartlyVaccinated => "people_partly_vaccinated",
            Self::PeopleFullyVaccinated => "people_fully_vaccinated",
            Self::TotalBoosters => "total_boosters",
        }
    }

    /// Partly vaccinated people move on to fully vaccinated, so that count may fall.
    pub fn is_cumulative(&self) -> bool {
        !matches!(self, Self::PeoplePartlyVaccinated)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|metric| metric.as_str() == s.trim())
            .ok_or_else(|| format!("unknown metric '{s}'"))
    }
}

/// Nullable counter values, one slot per [`Metric`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricValues {
    values: [Option<u64>; 5],
}

impl MetricValues {
    pub fn get(&self, metric: Metric) -> Option<u64> {
        self.values[metric as usize]
    }

    pub fn set(&mut self, metric: Metric, value: Option<u64>) {
        self.values[metric as usize] = value;
    }

    pub fn with(mut self, metric: Metric, value: u64) -> Self {
        self.set(metric, Some(value));
        self
    }

    /// Metrics holding a value.
    pub fn present(&self) -> impl Iterator<Item = Metric> + '_ {
        Metric::ALL
            .into_iter()
            .filter(|metric| self.get(*metric).is_some())
    }
}

/// A validated, dated record of one or more cumulative counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub location: String,
    pub date: NaiveDate,
    pub vaccine: String,
    pub source_url: String,
    pub metrics: MetricValues,
    /// Increment over the previous total, for sources that only publish deltas.
    pub daily_change: Option<u64>,
}

/// One persisted line of a series file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub location: String,
    pub date: NaiveDate,
    pub vaccine: String,
    pub source_url: String,
    pub metrics: MetricValues,
}

impl Row {
    pub fn get(&self, metric: Metric) -> Option<u64> {
        self.metrics.get(metric)
    }
}

impl From<&Observation> for Row {
    fn from(obs: &Observation) -> Self {
        Self {
            location: obs.location.clone(),
            date: obs.date,
            vaccine: obs.vaccine.clone(),
            source_url: obs.source_url.clone(),
            metrics: obs.metrics,
        }
    }
}

/// Ordered rows for a single location plus the metric columns it carries.
///
/// A column can be present and still null on every row; absent columns are
/// not written at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Series {
    pub location: String,
    pub rows: Vec<Row>,
    pub columns: BTreeSet<Metric>,
}

impl Series {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            rows: Vec::new(),
            columns: BTreeSet::new(),
        }
    }

    pub fn from_rows(location: impl Into<String>, rows: Vec<Row>) -> Self {
        let mut series = Self::new(location);
        for row in &rows {
            series.columns.extend(row.metrics.present());
        }
        series.rows = rows;
        series.sort();
        series
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, metric: Metric) -> bool {
        self.columns.contains(&metric)
    }

    /// Present metric columns in canonical order.
    pub fn metric_columns(&self) -> Vec<Metric> {
        self.columns.iter().copied().collect()
    }

    pub fn max_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|row| row.date).max()
    }

    pub fn max_value(&self, metric: Metric) -> Option<u64> {
        self.rows.iter().filter_map(|row| row.get(metric)).max()
    }

    pub fn last(&self) -> Option<&Row> {
        self.rows.last()
    }

    /// Stable sort by date; rows sharing a date keep their relative order.
    pub fn sort(&mut self) {
        self.rows.sort_by_key(|row| row.date);
    }

    /// `(date, value)` for rows where `metric` is non-null, in row order.
    pub fn values(&self, metric: Metric) -> Vec<(NaiveDate, u64)> {
        self.rows
            .iter()
            .filter_map(|row| row.get(metric).map(|value| (row.date, value)))
            .collect()
    }
}
