//! Error taxonomy for series validation and merging.
//!
//! Shape problems in an incoming record are [`Error::Type`]; semantically invalid
//! data (unknown vaccine, broken inequality, anomaly, duplicate dates) is
//! [`Error::Value`]. Everything else is plumbing.

use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

use crate::series::Metric;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Type,
    Value,
    Io,
    Parse,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Value => "value",
            Self::Io => "io",
            Self::Parse => "parse",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("check `{field}` type: should be {expected}, found {found} (value was {value})")]
    Type {
        field: String,
        expected: &'static str,
        found: &'static str,
        value: String,
    },

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("io error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Type { .. } => ErrorKind::Type,
            Self::Value(_) => ErrorKind::Value,
            Self::Io { .. } => ErrorKind::Io,
            Self::Csv(_) | Self::Json(_) | Self::Yaml(_) => ErrorKind::Parse,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Semantic violations. Each variant names the location (where one is known)
/// and the rows that triggered it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("check `date`: '{value}' exceeds tomorrow's date ({tomorrow})")]
    DateInFuture { value: String, tomorrow: NaiveDate },

    #[error("check `{field}`: {value} is not a non-negative integer")]
    InvalidCount { field: String, value: String },

    #[error("`total_vaccinations` can't be null if no value for `daily_change` is provided")]
    MissingTotal,

    #[error("check `{field}`: value can't be empty")]
    EmptyRecordField { field: &'static str },

    #[error("source registered for {expected} returned data for '{found}'")]
    LocationMismatch { expected: String, found: String },

    #[error("{location} -- invalid vaccine detected! check {names:?}")]
    UnknownVaccine { location: String, names: Vec<String> },

    #[error("{location} -- series missing column(s): {columns:?}")]
    MissingColumns {
        location: String,
        columns: Vec<String>,
    },

    #[error("{location} -- invalid {field}! empty values on {}", fmt_dates(.dates))]
    EmptyField {
        location: String,
        field: &'static str,
        dates: Vec<NaiveDate>,
    },

    #[error("{location} -- invalid dates! {date} is before {min_date}")]
    DateTooEarly {
        location: String,
        date: NaiveDate,
        min_date: NaiveDate,
    },

    #[error("{location} -- date in the future: {date}")]
    FutureRows { location: String, date: NaiveDate },

    #[error("{location} -- check `date` field, there are duplicates: {}", fmt_dates(.dates))]
    DuplicateDates {
        location: String,
        dates: Vec<NaiveDate>,
    },

    #[error("more than one location found: {locations:?}")]
    MultipleLocations { locations: Vec<String> },

    #[error("{location} -- column {metric} must be monotonically increasing! check {}", fmt_dates(.dates))]
    NonMonotonic {
        location: String,
        metric: Metric,
        dates: Vec<NaiveDate>,
    },

    #[error(
        "{location} -- making {metric} monotonic would remove {would_remove} rows (max {max_removed})"
    )]
    MonotonicCapExceeded {
        location: String,
        metric: Metric,
        would_remove: usize,
        max_removed: usize,
    },

    #[error("{location} -- {greater} can't be < {lesser}! check {}", fmt_dates(.dates))]
    Inequality {
        location: String,
        greater: Metric,
        lesser: Metric,
        dates: Vec<NaiveDate>,
    },

    #[error("{location} -- potential anomalies found in {metric}: {}", fmt_anomalies(.rows))]
    Anomaly {
        location: String,
        metric: Metric,
        rows: Vec<(NaiveDate, u64, f64)>,
    },

    #[error("{location} -- negative values found in `{column}`! check {}", fmt_dates(.dates))]
    NegativeValues {
        location: String,
        column: &'static str,
        dates: Vec<NaiveDate>,
    },
}

impl ValueError {
    /// Dates of the rows that triggered the failure, if it is tied to rows.
    pub fn dates(&self) -> Vec<NaiveDate> {
        match self {
            Self::EmptyField { dates, .. }
            | Self::DuplicateDates { dates, .. }
            | Self::NonMonotonic { dates, .. }
            | Self::Inequality { dates, .. }
            | Self::NegativeValues { dates, .. } => dates.clone(),
            Self::DateTooEarly { date, .. } | Self::FutureRows { date, .. } => vec![*date],
            Self::Anomaly { rows, .. } => rows.iter().map(|(date, _, _)| *date).collect(),
            _ => Vec::new(),
        }
    }
}

fn fmt_dates(dates: &[NaiveDate]) -> String {
    dates
        .iter()
        .map(|date| date.format("%Y-%m-%d").to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn fmt_anomalies(rows: &[(NaiveDate, u64, f64)]) -> String {
    rows.iter()
        .map(|(date, value, ratio)| format!("{date} value={value} ratio={ratio:.1}"))
        .collect::<Vec<_>>()
        .join("; ")
}
