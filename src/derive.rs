//! Daily figures derived from a cumulative series.
//!
//! Reported rows keep their day-over-day change in `new_vaccinations`. Gaps
//! between reports are filled with a daily grid on which the cumulative
//! counters are linearly interpolated; the per-day steps are then averaged
//! over a trailing window of [`SMOOTHING_ROWS`] rows.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result, ValueError};
use crate::series::{Metric, Row, Series};

pub const SMOOTHING_ROWS: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRow {
    pub location: String,
    pub date: NaiveDate,
    pub total_vaccinations: Option<u64>,
    pub people_vaccinated: Option<u64>,
    pub new_vaccinations: Option<i64>,
    #[serde(skip)]
    pub new_vaccinations_interpolated: Option<f64>,
    pub new_vaccinations_smoothed: Option<i64>,
    #[serde(skip)]
    pub new_people_vaccinated_interpolated: Option<f64>,
    pub new_people_vaccinated_smoothed: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSeries {
    pub location: String,
    pub rows: Vec<DailyRow>,
}

impl DerivedSeries {
    pub fn get(&self, date: NaiveDate) -> Option<&DailyRow> {
        self.rows.iter().find(|row| row.date == date)
    }
}

pub fn derive_daily(series: &Series) -> DerivedSeries {
    let reported: BTreeMap<NaiveDate, &Row> =
        series.rows.iter().map(|row| (row.date, row)).collect();
    let changes = daily_changes(&reported);
    let total_steps = interpolated_steps(series, Metric::TotalVaccinations);
    let people_steps = interpolated_steps(series, Metric::PeopleVaccinated);

    let mut grid: BTreeSet<NaiveDate> = reported.keys().copied().collect();
    for metric in [Metric::TotalVaccinations, Metric::PeopleVaccinated] {
        if let Some((first, last)) = value_range(series, metric) {
            grid.extend(first.iter_days().take_while(|day| *day <= last));
        }
    }
    debug!(
        location = %series.location,
        reported = reported.len(),
        days = grid.len(),
        "interpolating daily metrics"
    );

    let mut rows: Vec<DailyRow> = grid
        .into_iter()
        .map(|date| {
            let row = reported.get(&date);
            DailyRow {
                location: series.location.clone(),
                date,
                total_vaccinations: row.and_then(|r| r.get(Metric::TotalVaccinations)),
                people_vaccinated: row.and_then(|r| r.get(Metric::PeopleVaccinated)),
                new_vaccinations: changes.get(&date).copied().flatten(),
                new_vaccinations_interpolated: total_steps.get(&date).copied(),
                new_vaccinations_smoothed: None,
                new_people_vaccinated_interpolated: people_steps.get(&date).copied(),
                new_people_vaccinated_smoothed: None,
            }
        })
        .collect();

    let total_smoothed = smooth(&rows, |row| row.new_vaccinations_interpolated);
    let people_smoothed = smooth(&rows, |row| row.new_people_vaccinated_interpolated);
    for ((row, total), people) in rows.iter_mut().zip(total_smoothed).zip(people_smoothed) {
        row.new_vaccinations_smoothed = total;
        row.new_people_vaccinated_smoothed = people;
    }

    DerivedSeries {
        location: series.location.clone(),
        rows,
    }
}

/// Change in total over the previous reported row; null across a gap of more than one day.
fn daily_changes(reported: &BTreeMap<NaiveDate, &Row>) -> BTreeMap<NaiveDate, Option<i64>> {
    let mut changes = BTreeMap::new();
    let mut previous: Option<(NaiveDate, Option<u64>)> = None;
    for (date, row) in reported {
        let total = row.get(Metric::TotalVaccinations);
        let change = previous.and_then(|(prev_date, prev_total)| {
            if (*date - prev_date).num_days() > 1 {
                return None;
            }
            let (total, prev_total) = (total?, prev_total?);
            Some(total as i64 - prev_total as i64)
        });
        changes.insert(*date, change);
        previous = Some((*date, total));
    }
    changes
}

fn value_range(series: &Series, metric: Metric) -> Option<(NaiveDate, NaiveDate)> {
    let values = series.values(metric);
    let first = values.iter().map(|(date, _)| *date).min()?;
    let last = values.iter().map(|(date, _)| *date).max()?;
    Some((first, last))
}

/// Per-day step of the linear interpolation between known values of `metric`.
///
/// The first known day has no step.
fn interpolated_steps(series: &Series, metric: Metric) -> BTreeMap<NaiveDate, f64> {
    let known: BTreeMap<NaiveDate, u64> = series.values(metric).into_iter().collect();
    let mut steps = BTreeMap::new();
    for ((from, start), (to, end)) in known.iter().zip(known.iter().skip(1)) {
        let days = (*to - *from).num_days();
        let step = (*end as f64 - *start as f64) / days as f64;
        for day in from.iter_days().skip(1).take_while(|day| day <= to) {
            steps.insert(day, step);
        }
    }
    steps
}

/// Trailing mean over the last [`SMOOTHING_ROWS`] rows, skipping nulls, rounded half to even.
///
/// Rows with no value of their own stay null.
fn smooth(rows: &[DailyRow], value: impl Fn(&DailyRow) -> Option<f64>) -> Vec<Option<i64>> {
    (0..rows.len())
        .map(|idx| {
            value(&rows[idx])?;
            let window = &rows[(idx + 1).saturating_sub(SMOOTHING_ROWS)..=idx];
            let values: Vec<f64> = window.iter().filter_map(&value).collect();
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            Some(mean.round_ties_even() as i64)
        })
        .collect()
}

/// Smoothed daily doses can only go negative when the cumulative total fell.
pub fn check_derived(derived: &DerivedSeries) -> Result<()> {
    let dates: Vec<NaiveDate> = derived
        .rows
        .iter()
        .filter(|row| row.new_vaccinations_smoothed.is_some_and(|value| value < 0))
        .map(|row| row.date)
        .collect();
    if !dates.is_empty() {
        return Err(ValueError::NegativeValues {
            location: derived.location.clone(),
            column: "new_vaccinations_smoothed",
            dates,
        }
        .into());
    }
    info!(location = %derived.location, rows = derived.rows.len(), "derived metrics passed");
    Ok(())
}

pub fn write_derived<W: Write>(writer: W, derived: &DerivedSeries) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in &derived.rows {
        writer.serialize(row)?;
    }
    writer
        .flush()
        .map_err(|err| Error::io("csv writer", err))?;
    Ok(())
}
