//! Update runs: validate, merge and persist each location independently.
//!
//! A failing location is logged and reported; it never aborts the others.

use std::path::PathBuf;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::adapter::{AdapterOutput, AdapterRegistry, Context, SourceAdapter};
use crate::error::{Result, ValueError};
use crate::merge::{increment, make_series_monotonic, merge_with_current, MergeOutcome};
use crate::parallel::WorkerPool;
use crate::process::normalize_location;
use crate::series::{read_series, series_path, write_series, Series};
use crate::validate::{check_inequalities, country_sanity_checks, validate_fields};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Appended,
    Corrected,
    Unchanged,
    Merged,
    Failed,
}

impl From<MergeOutcome> for Outcome {
    fn from(outcome: MergeOutcome) -> Self {
        match outcome {
            MergeOutcome::Created => Self::Created,
            MergeOutcome::Appended => Self::Appended,
            MergeOutcome::Corrected => Self::Corrected,
            MergeOutcome::Unchanged => Self::Unchanged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationReport {
    pub location: String,
    pub outcome: Outcome,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateReport {
    pub today: NaiveDate,
    pub locations: Vec<LocationReport>,
}

impl UpdateReport {
    pub fn failed(&self) -> impl Iterator<Item = &LocationReport> {
        self.locations
            .iter()
            .filter(|report| report.outcome == Outcome::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }
}

/// Path of a location's persisted series under the configured output dir.
pub fn location_path(ctx: &Context, location: &str) -> PathBuf {
    series_path(&ctx.config.output_dir, location)
}

fn load_current(ctx: &Context, location: &str) -> Result<Option<Series>> {
    let path = location_path(ctx, location);
    if !path.exists() {
        return Ok(None);
    }
    read_series(&path).map(Some)
}

/// Validate one record and merge it into its location's series file.
///
/// `force_monotonic` rewrites the series monotonic even when the location is
/// not configured for it.
pub fn increment_location(
    ctx: &Context,
    record: &Map<String, Value>,
    force_monotonic: bool,
) -> Result<(Series, MergeOutcome)> {
    let obs = validate_fields(record, ctx.today)?;
    let current = load_current(ctx, &obs.location)?;
    let (mut merged, outcome) = increment(current.as_ref(), &obs)?;
    if outcome == MergeOutcome::Unchanged {
        info!(location = %obs.location, date = %obs.date, "no new data");
        return Ok((merged, outcome));
    }

    if force_monotonic || ctx.config.monotonic_for(&obs.location) {
        merged = make_series_monotonic(&merged, ctx.config.max_removed_rows)?;
    }
    check_inequalities(&merged)?;

    write_series(&location_path(ctx, &obs.location), &merged)?;
    info!(
        location = %obs.location,
        date = %obs.date,
        ?outcome,
        rows = merged.len(),
        "series updated"
    );
    Ok((merged, outcome))
}

/// Normalize a whole series from a batch source, merge it over the persisted
/// one, repair it when the location asks for that, then check the result.
pub fn apply_series(ctx: &Context, series: &Series) -> Result<Series> {
    let normalized = normalize_location(series, ctx.today)?;
    let current = load_current(ctx, &normalized.location)?;
    let mut merged = merge_with_current(&normalized, current.as_ref());
    if ctx.config.monotonic_for(&merged.location) {
        merged = make_series_monotonic(&merged, ctx.config.max_removed_rows)?;
    }
    let checks = ctx.config.location(&merged.location);
    country_sanity_checks(&merged, &ctx.config.checks, &checks)?;

    write_series(&location_path(ctx, &merged.location), &merged)?;
    info!(location = %merged.location, rows = merged.len(), "series replaced from batch source");
    Ok(merged)
}

/// Adapters may only write to their own location's file.
fn ensure_location(adapter: &dyn SourceAdapter, found: &str) -> Result<()> {
    if found.trim() == adapter.location() {
        return Ok(());
    }
    Err(ValueError::LocationMismatch {
        expected: adapter.location().to_string(),
        found: found.to_string(),
    }
    .into())
}

fn update_one(ctx: &Context, adapter: &dyn SourceAdapter) -> Result<LocationReport> {
    let doc = adapter.fetch(ctx)?;
    let (outcome, rows) = match adapter.parse(doc)? {
        AdapterOutput::Record(record) => {
            // Non-string locations are left to the field validator.
            if let Some(found) = record.get("location").and_then(Value::as_str) {
                ensure_location(adapter, found)?;
            }
            let (series, outcome) = increment_location(ctx, &record, false)?;
            (Outcome::from(outcome), series.len())
        }
        AdapterOutput::Series(series) => {
            ensure_location(adapter, &series.location)?;
            let merged = apply_series(ctx, &series)?;
            (Outcome::Merged, merged.len())
        }
    };
    Ok(LocationReport {
        location: adapter.location().to_string(),
        outcome,
        rows,
        error_kind: None,
        error: None,
    })
}

/// Run every registered adapter on the worker pool.
pub fn run_update(ctx: &Context, registry: &AdapterRegistry, pool: &WorkerPool) -> Result<UpdateReport> {
    let adapters: Vec<&dyn SourceAdapter> = registry.adapters().collect();
    info!(locations = adapters.len(), today = %ctx.today, "starting update run");

    let locations = pool.install(|| {
        adapters
            .par_iter()
            .map(|adapter| {
                update_one(ctx, *adapter).unwrap_or_else(|err| {
                    warn!(location = adapter.location(), kind = %err.kind(), "update skipped: {err}");
                    LocationReport {
                        location: adapter.location().to_string(),
                        outcome: Outcome::Failed,
                        rows: 0,
                        error_kind: Some(err.kind().to_string()),
                        error: Some(err.to_string()),
                    }
                })
            })
            .collect::<Vec<_>>()
    })?;

    let report = UpdateReport {
        today: ctx.today,
        locations,
    };
    let failed = report.failed().count();
    info!(
        updated = report.locations.len() - failed,
        failed,
        "update run finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::adapter::JsonDropAdapter;
    use crate::config::PipelineConfig;
    use crate::series::{Metric, MetricValues, Row};
    use crate::validate::LocationChecks;

    fn ctx(dir: &std::path::Path) -> Context {
        let config = PipelineConfig {
            output_dir: dir.to_path_buf(),
            ..PipelineConfig::default()
        };
        Context::with_today(config, NaiveDate::from_ymd_opt(2022, 1, 10).unwrap())
    }

    fn record(date: &str, total: u64, people: u64) -> Map<String, Value> {
        json!({
            "location": "Hungary",
            "date": date,
            "vaccine": "Sputnik V",
            "source_url": "https://koronavirus.gov.hu",
            "total_vaccinations": total,
            "people_vaccinated": people,
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn increment_creates_then_appends_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());

        let (_, first) = increment_location(&ctx, &record("2022-01-04", 900, 500), false).unwrap();
        assert_eq!(first, MergeOutcome::Created);
        let (_, second) = increment_location(&ctx, &record("2022-01-05", 1000, 550), false).unwrap();
        assert_eq!(second, MergeOutcome::Appended);

        let persisted = read_series(&location_path(&ctx, "Hungary")).unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted.last().unwrap().get(Metric::TotalVaccinations), Some(1000));
    }

    #[test]
    fn inconsistent_merge_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        increment_location(&ctx, &record("2022-01-04", 900, 500), false).unwrap();

        let err = increment_location(&ctx, &record("2022-01-05", 1000, 2000), false).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Value);
        let persisted = read_series(&location_path(&ctx, "Hungary")).unwrap();
        assert_eq!(persisted.len(), 1);
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, d).unwrap()
    }

    fn sheet(location: &str, totals: &[(u32, u64)]) -> Series {
        let rows = totals
            .iter()
            .map(|(d, total)| Row {
                location: location.to_string(),
                date: day(*d),
                vaccine: "Sinovac".to_string(),
                source_url: "https://www.minsal.cl".to_string(),
                metrics: MetricValues::default().with(Metric::TotalVaccinations, *total),
            })
            .collect();
        Series::from_rows(location, rows)
    }

    fn monotonic_location(ctx: &mut Context, location: &str) {
        ctx.config.locations.insert(
            location.to_string(),
            LocationChecks {
                make_monotonic: Some(true),
                ..LocationChecks::default()
            },
        );
    }

    fn totals_on_disk(ctx: &Context, location: &str) -> Vec<(NaiveDate, u64)> {
        read_series(&location_path(ctx, location))
            .unwrap()
            .values(Metric::TotalVaccinations)
    }

    #[test]
    fn batch_sheet_is_repaired_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ctx(dir.path());
        let chile = sheet("Chile", &[(1, 20_000), (2, 25_000), (3, 24_000), (4, 30_000)]);

        let err = apply_series(&ctx, &chile).unwrap_err();
        assert!(matches!(err, crate::error::Error::Value(ValueError::NonMonotonic { .. })));
        assert!(!location_path(&ctx, "Chile").exists());

        monotonic_location(&mut ctx, "Chile");
        let merged = apply_series(&ctx, &chile).unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(
            totals_on_disk(&ctx, "Chile"),
            vec![(day(1), 20_000), (day(3), 24_000), (day(4), 30_000)]
        );
    }

    #[test]
    fn batch_checks_run_on_the_merged_series() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        write_series(&location_path(&ctx, "Chile"), &sheet("Chile", &[(1, 90_000)])).unwrap();

        // Clean on its own, but lower than what is already persisted.
        let fresh = sheet("Chile", &[(2, 20_000), (3, 25_000)]);
        let err = apply_series(&ctx, &fresh).unwrap_err();
        assert!(matches!(err, crate::error::Error::Value(ValueError::NonMonotonic { .. })));
        assert_eq!(totals_on_disk(&ctx, "Chile"), vec![(day(1), 90_000)]);
    }

    #[test]
    fn increment_repairs_when_forced_or_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ctx(dir.path());
        let persisted = sheet("Hungary", &[(3, 900), (4, 1_200), (5, 1_100)]);

        write_series(&location_path(&ctx, "Hungary"), &persisted).unwrap();
        increment_location(&ctx, &record("2022-01-06", 1_300, 500), false).unwrap();
        assert_eq!(totals_on_disk(&ctx, "Hungary").len(), 4);

        write_series(&location_path(&ctx, "Hungary"), &persisted).unwrap();
        let (merged, _) = increment_location(&ctx, &record("2022-01-06", 1_300, 500), true).unwrap();
        assert_eq!(merged.len(), 3);
        assert!(!totals_on_disk(&ctx, "Hungary").iter().any(|(date, _)| *date == day(4)));

        write_series(&location_path(&ctx, "Hungary"), &persisted).unwrap();
        monotonic_location(&mut ctx, "Hungary");
        increment_location(&ctx, &record("2022-01-06", 1_300, 500), false).unwrap();
        assert_eq!(totals_on_disk(&ctx, "Hungary").len(), 3);
    }

    #[test]
    fn adapter_cannot_write_another_location() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let drop_path = dir.path().join("Malta.json");
        std::fs::write(
            &drop_path,
            json!({
                "location": "Aruba",
                "date": "2022-01-05",
                "vaccine": "Pfizer/BioNTech",
                "source_url": "https://deputyprimeminister.gov.mt",
                "total_vaccinations": 999_999,
            })
            .to_string(),
        )
        .unwrap();

        let mut registry = AdapterRegistry::new();
        registry.register(Box::new(JsonDropAdapter::new("Malta", drop_path)));
        let report = run_update(&ctx, &registry, &WorkerPool::default()).unwrap();

        let malta = &report.locations[0];
        assert_eq!(malta.outcome, Outcome::Failed);
        assert_eq!(malta.error_kind.as_deref(), Some("value"));
        assert!(malta.error.as_deref().unwrap_or_default().contains("Aruba"));
        assert!(!location_path(&ctx, "Aruba").exists());
        assert!(!location_path(&ctx, "Malta").exists());
    }
}
