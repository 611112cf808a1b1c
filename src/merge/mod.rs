//! Merge new observations into a location's persisted series.

use tracing::debug;

use crate::error::{Result, ValueError};
use crate::series::{Metric, Observation, Row, Series};
use crate::validate::fields::DAILY_CHANGE_FIELD;

pub mod monotonic;

pub use monotonic::{is_monotonic, make_monotonic, make_series_monotonic, DEFAULT_MAX_REMOVED_ROWS};

/// What [`increment`] did with the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Created,
    Appended,
    Corrected,
    Unchanged,
}

/// Merge one observation into `current` (or start a new series).
///
/// The candidate is dropped when its total does not exceed the current
/// maximum or its date precedes the latest date. A candidate on the latest
/// date overwrites that row; a newer one is appended.
pub fn increment(current: Option<&Series>, obs: &Observation) -> Result<(Series, MergeOutcome)> {
    let Some(current) = current.filter(|series| !series.is_empty()) else {
        let mut row = Row::from(obs);
        row.metrics.set(Metric::TotalVaccinations, resolve_total(None, obs)?);
        let mut series = Series::from_rows(obs.location.clone(), vec![row]);
        if let Some(existing) = current {
            series.columns.extend(existing.columns.iter().copied());
        }
        return Ok((series, MergeOutcome::Created));
    };

    let max_total = current.max_value(Metric::TotalVaccinations);
    let total = resolve_total(max_total, obs)?;
    let max_date = current.max_date();

    let regressed = matches!((total, max_total), (Some(t), Some(max)) if t <= max);
    let stale = max_date.is_some_and(|max| obs.date < max);
    if regressed || stale {
        debug!(
            location = %obs.location,
            date = %obs.date,
            ?total,
            ?max_total,
            "candidate regresses the series, keeping current data"
        );
        return Ok((current.clone(), MergeOutcome::Unchanged));
    }

    let mut merged = current.clone();
    merged.columns.extend(obs.metrics.present());
    if total.is_some() {
        merged.columns.insert(Metric::TotalVaccinations);
    }

    if max_date == Some(obs.date) {
        for row in merged.rows.iter_mut().filter(|row| row.date == obs.date) {
            row.metrics.set(Metric::TotalVaccinations, total);
            for metric in [
                Metric::PeopleVaccinated,
                Metric::PeopleFullyVaccinated,
                Metric::TotalBoosters,
            ] {
                row.metrics.set(metric, obs.metrics.get(metric));
            }
            if let Some(partly) = obs.metrics.get(Metric::PeoplePartlyVaccinated) {
                row.metrics.set(Metric::PeoplePartlyVaccinated, Some(partly));
            }
            row.source_url = obs.source_url.clone();
        }
        merged.sort();
        return Ok((merged, MergeOutcome::Corrected));
    }

    let mut row = Row::from(obs);
    row.metrics.set(Metric::TotalVaccinations, total);
    merged.rows.push(row);
    merged.sort();
    Ok((merged, MergeOutcome::Appended))
}

/// Replace rows of `current` that share a date with `new`, keep the rest.
pub fn merge_with_current(new: &Series, current: Option<&Series>) -> Series {
    let Some(current) = current else {
        return new.clone();
    };
    let mut rows: Vec<Row> = new.rows.clone();
    rows.extend(
        current
            .rows
            .iter()
            .filter(|row| !new.rows.iter().any(|fresh| fresh.date == row.date))
            .cloned(),
    );
    let mut merged = Series::from_rows(new.location.clone(), rows);
    merged.columns.extend(new.columns.iter().copied());
    merged.columns.extend(current.columns.iter().copied());
    merged
}

/// Explicit total, or `current max + daily_change` for delta-only sources.
fn resolve_total(max_total: Option<u64>, obs: &Observation) -> Result<Option<u64>> {
    if let Some(total) = obs.metrics.get(Metric::TotalVaccinations) {
        return Ok(Some(total));
    }
    let Some(delta) = obs.daily_change else {
        return Ok(None);
    };
    let base = max_total.unwrap_or(0);
    base.checked_add(delta).map(Some).ok_or_else(|| {
        ValueError::InvalidCount {
            field: DAILY_CHANGE_FIELD.to_string(),
            value: format!("{delta} on top of total {base}"),
        }
        .into()
    })
}
