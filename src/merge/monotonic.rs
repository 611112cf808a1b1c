//! Rewrite cumulative columns to be non-decreasing by dropping rows.

use std::collections::BTreeSet;

use tracing::warn;

use crate::error::{Result, ValueError};
use crate::series::{Metric, Series};

pub const DEFAULT_MAX_REMOVED_ROWS: usize = 10;

/// Drop the fewest rows so `metric` never decreases between consecutive
/// non-null entries. Rows where `metric` is null are kept.
///
/// Fails when more than `max_removed_rows` rows would have to go.
pub fn make_monotonic(series: &Series, metric: Metric, max_removed_rows: usize) -> Result<Series> {
    let drop = rows_to_drop(series, metric);
    check_cap(series, metric, drop.len(), max_removed_rows)?;
    Ok(without_rows(series, &drop, metric))
}

/// Apply [`make_monotonic`] to every present cumulative column. The cap bounds
/// the total number of rows removed across columns.
pub fn make_series_monotonic(series: &Series, max_removed_rows: usize) -> Result<Series> {
    let mut current = series.clone();
    let mut removed = 0;
    for metric in series.metric_columns().into_iter().filter(Metric::is_cumulative) {
        let drop = rows_to_drop(&current, metric);
        removed += drop.len();
        check_cap(series, metric, removed, max_removed_rows)?;
        current = without_rows(&current, &drop, metric);
    }
    Ok(current)
}

/// Whether `metric` is non-decreasing over its non-null values.
pub fn is_monotonic(series: &Series, metric: Metric) -> bool {
    series
        .values(metric)
        .windows(2)
        .all(|pair| pair[0].1 <= pair[1].1)
}

fn check_cap(series: &Series, metric: Metric, would_remove: usize, max_removed: usize) -> Result<()> {
    if would_remove > max_removed {
        return Err(ValueError::MonotonicCapExceeded {
            location: series.location.clone(),
            metric,
            would_remove,
            max_removed,
        }
        .into());
    }
    Ok(())
}

fn without_rows(series: &Series, drop: &BTreeSet<usize>, metric: Metric) -> Series {
    if drop.is_empty() {
        return series.clone();
    }
    let dates: Vec<_> = drop.iter().map(|idx| series.rows[*idx].date).collect();
    warn!(location = %series.location, %metric, ?dates, "dropping rows to keep series monotonic");
    Series {
        location: series.location.clone(),
        rows: series
            .rows
            .iter()
            .enumerate()
            .filter(|(idx, _)| !drop.contains(idx))
            .map(|(_, row)| row.clone())
            .collect(),
        columns: series.columns.clone(),
    }
}

/// Row indices outside a longest non-decreasing subsequence of the non-null values.
fn rows_to_drop(series: &Series, metric: Metric) -> BTreeSet<usize> {
    let indexed: Vec<(usize, u64)> = series
        .rows
        .iter()
        .enumerate()
        .filter_map(|(idx, row)| row.get(metric).map(|value| (idx, value)))
        .collect();
    let values: Vec<u64> = indexed.iter().map(|(_, value)| *value).collect();
    let keep: BTreeSet<usize> = longest_non_decreasing(&values).into_iter().collect();
    indexed
        .iter()
        .enumerate()
        .filter(|(pos, _)| !keep.contains(pos))
        .map(|(_, (idx, _))| *idx)
        .collect()
}

/// Positions of one longest non-decreasing subsequence. On ties the later
/// value wins, so an interior spike is dropped rather than the correction after it.
fn longest_non_decreasing(values: &[u64]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; values.len()];
    for (i, value) in values.iter().enumerate() {
        let pos = tails.partition_point(|&t| values[t] <= *value);
        if pos > 0 {
            prev[i] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }

    let mut keep = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        keep.push(i);
        cursor = prev[i];
    }
    keep.reverse();
    keep
}
