//! Findings of a full country check pass, tied back to the rows behind them.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::Error;
use crate::series::Metric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Failed,
    /// Would have failed, but every offending row is on a skip list.
    Skipped,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub verdict: Verdict,
    pub check: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<Metric>,
    pub dates: Vec<NaiveDate>,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.verdict, self.check, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesReport {
    pub location: String,
    pub findings: Vec<Finding>,
}

impl SeriesReport {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            findings: Vec::new(),
        }
    }

    /// Record a failed check; row dates are taken from the error when it has them.
    pub fn fail(&mut self, check: impl Into<String>, metric: Option<Metric>, err: &Error) {
        let dates = match err {
            Error::Value(value) => value.dates(),
            _ => Vec::new(),
        };
        self.findings.push(Finding {
            verdict: Verdict::Failed,
            check: check.into(),
            metric,
            dates,
            message: err.to_string(),
        });
    }

    pub fn skip(
        &mut self,
        check: impl Into<String>,
        metric: Metric,
        dates: Vec<NaiveDate>,
        message: impl Into<String>,
    ) {
        self.findings.push(Finding {
            verdict: Verdict::Skipped,
            check: check.into(),
            metric: Some(metric),
            dates,
            message: message.into(),
        });
    }

    pub fn failures(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|finding| finding.verdict == Verdict::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// Dates of every row a failed check points at, oldest first.
    pub fn failing_dates(&self) -> BTreeSet<NaiveDate> {
        self.failures()
            .flat_map(|finding| finding.dates.iter().copied())
            .collect()
    }
}
