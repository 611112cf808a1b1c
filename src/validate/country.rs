//! Full sanity check of one location's series before it is published.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ValueError};
use crate::series::{Metric, Row, Series};
use crate::validate::anomaly::{check_anomalies, detect_anomalies, AnomalySettings};
use crate::validate::consistency::{check_inequality, INEQUALITIES};
use crate::validate::skip::{SkipEntry, SkipList};
use crate::validate::vaccines::unknown_vaccines;
use crate::validate::report::SeriesReport;

/// Thresholds shared by every location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckSettings {
    /// Earliest plausible vaccination date.
    pub min_date: NaiveDate,
    pub anomaly: AnomalySettings,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            min_date: NaiveDate::from_ymd_opt(2020, 12, 1).unwrap_or(NaiveDate::MIN),
            anomaly: AnomalySettings::default(),
        }
    }
}

/// Per-location overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationChecks {
    pub make_monotonic: Option<bool>,
    pub anomalies: Option<bool>,
    pub monotonic_check_skip: Vec<SkipEntry>,
    pub anomaly_check_skip: Vec<SkipEntry>,
}

pub fn country_sanity_checks(
    series: &Series,
    settings: &CheckSettings,
    checks: &LocationChecks,
) -> Result<()> {
    CountryChecker::new(series, settings, checks).run()
}

pub struct CountryChecker<'a> {
    series: &'a Series,
    settings: &'a CheckSettings,
    anomalies: bool,
    monotonic_skip: SkipList,
    anomaly_skip: SkipList,
}

impl<'a> CountryChecker<'a> {
    pub fn new(series: &'a Series, settings: &'a CheckSettings, checks: &LocationChecks) -> Self {
        Self {
            series,
            settings,
            anomalies: checks.anomalies.unwrap_or(settings.anomaly.enabled),
            monotonic_skip: SkipList::from_entries(&checks.monotonic_check_skip),
            anomaly_skip: SkipList::from_entries(&checks.anomaly_check_skip),
        }
    }

    fn location(&self) -> String {
        self.series.location.clone()
    }

    /// Cumulative columns present in the series.
    fn metrics_present(&self) -> Vec<Metric> {
        self.series
            .metric_columns()
            .into_iter()
            .filter(Metric::is_cumulative)
            .collect()
    }

    pub fn check_column_names(&self) -> Result<()> {
        if self.series.has_column(Metric::TotalVaccinations) {
            return Ok(());
        }
        Err(ValueError::MissingColumns {
            location: self.location(),
            columns: vec![Metric::TotalVaccinations.to_string()],
        }
        .into())
    }

    pub fn check_source_url(&self) -> Result<()> {
        self.check_non_empty("source_url", |row| row.source_url.as_str())
    }

    pub fn check_vaccine(&self) -> Result<()> {
        self.check_non_empty("vaccine", |row| row.vaccine.as_str())?;
        let mut unknown: Vec<String> = self
            .series
            .rows
            .iter()
            .flat_map(|row| unknown_vaccines(&row.vaccine))
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }
        unknown.sort();
        unknown.dedup();
        Err(ValueError::UnknownVaccine {
            location: self.location(),
            names: unknown,
        }
        .into())
    }

    pub fn check_date(&self) -> Result<()> {
        if let Some(earliest) = self.series.rows.iter().map(|row| row.date).min() {
            if earliest < self.settings.min_date {
                return Err(ValueError::DateTooEarly {
                    location: self.location(),
                    date: earliest,
                    min_date: self.settings.min_date,
                }
                .into());
            }
        }

        let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for row in &self.series.rows {
            *counts.entry(row.date).or_default() += 1;
        }
        let duplicates: Vec<NaiveDate> = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(date, _)| date)
            .collect();
        if duplicates.is_empty() {
            return Ok(());
        }
        Err(ValueError::DuplicateDates {
            location: self.location(),
            dates: duplicates,
        }
        .into())
    }

    pub fn check_location(&self) -> Result<()> {
        let mut locations: Vec<String> = self
            .series
            .rows
            .iter()
            .map(|row| row.location.clone())
            .collect();
        locations.sort();
        locations.dedup();
        if locations.iter().any(|location| location.is_empty()) {
            return self.check_non_empty("location", |row| row.location.as_str());
        }
        if locations.len() > 1 || locations.iter().any(|l| *l != self.series.location) {
            return Err(ValueError::MultipleLocations { locations }.into());
        }
        Ok(())
    }

    pub fn check_metrics(&self) -> Result<()> {
        for metric in self.metrics_present() {
            self.check_monotonic(metric)?;
        }
        for (greater, lesser) in INEQUALITIES {
            check_inequality(self.series, greater, lesser)?;
        }
        if self.anomalies {
            for metric in self.metrics_present() {
                check_anomalies(self.series, metric, &self.settings.anomaly, &self.anomaly_skip)?;
            }
        }
        Ok(())
    }

    /// Fails unless every decreasing row is whitelisted.
    pub fn check_monotonic(&self, metric: Metric) -> Result<()> {
        let dates = decreasing_dates(self.series, metric);
        if dates
            .iter()
            .all(|date| self.monotonic_skip.contains(*date, metric))
        {
            return Ok(());
        }
        Err(ValueError::NonMonotonic {
            location: self.location(),
            metric,
            dates,
        }
        .into())
    }

    pub fn run(&self) -> Result<()> {
        self.check_column_names()?;
        self.check_source_url()?;
        self.check_vaccine()?;
        self.check_date()?;
        self.check_location()?;
        self.check_metrics()?;
        info!(location = %self.series.location, rows = self.series.len(), "sanity checks passed");
        Ok(())
    }

    /// Run every check and collect all failures instead of stopping at the first.
    pub fn report(&self) -> SeriesReport {
        let mut report = SeriesReport::new(self.series.location.clone());

        let structural: [(&str, Result<()>); 5] = [
            ("columns", self.check_column_names()),
            ("source_url", self.check_source_url()),
            ("vaccine", self.check_vaccine()),
            ("date", self.check_date()),
            ("location", self.check_location()),
        ];
        for (check, outcome) in structural {
            if let Err(err) = outcome {
                report.fail(check, None, &err);
            }
        }

        for metric in self.metrics_present() {
            if let Err(err) = self.check_monotonic(metric) {
                report.fail("monotonic", Some(metric), &err);
            }
            let whitelisted: Vec<NaiveDate> = decreasing_dates(self.series, metric)
                .into_iter()
                .filter(|date| self.monotonic_skip.contains(*date, metric))
                .collect();
            if !whitelisted.is_empty() {
                report.skip(
                    "monotonic",
                    metric,
                    whitelisted,
                    format!("{metric} decrease skipped by monotonic_check_skip"),
                );
            }
        }

        for (greater, lesser) in INEQUALITIES {
            if let Err(err) = check_inequality(self.series, greater, lesser) {
                report.fail(format!("{greater}>={lesser}"), Some(greater), &err);
            }
        }

        if self.anomalies {
            for metric in self.metrics_present() {
                let outcome =
                    check_anomalies(self.series, metric, &self.settings.anomaly, &self.anomaly_skip);
                if let Err(err) = outcome {
                    report.fail("anomaly", Some(metric), &err);
                }
                for anomaly in detect_anomalies(self.series, metric, &self.settings.anomaly) {
                    if self.anomaly_skip.contains(anomaly.date, metric) {
                        report.skip(
                            "anomaly",
                            metric,
                            vec![anomaly.date],
                            format!(
                                "{metric} spike (ratio {:.1}) skipped by anomaly_check_skip",
                                anomaly.ratio
                            ),
                        );
                    }
                }
            }
        }
        report
    }

    fn check_non_empty(&self, field: &'static str, get: impl Fn(&Row) -> &str) -> Result<()> {
        let dates: Vec<NaiveDate> = self
            .series
            .rows
            .iter()
            .filter(|row| get(*row).trim().is_empty())
            .map(|row| row.date)
            .collect();
        if dates.is_empty() {
            return Ok(());
        }
        Err(ValueError::EmptyField {
            location: self.location(),
            field,
            dates,
        }
        .into())
    }
}

/// Dates whose value is below the previous non-null value.
fn decreasing_dates(series: &Series, metric: Metric) -> Vec<NaiveDate> {
    series
        .values(metric)
        .windows(2)
        .filter(|pair| pair[1].1 < pair[0].1)
        .map(|pair| pair[1].0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::series::MetricValues;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, m, d).unwrap()
    }

    fn row(date: NaiveDate, total: u64, people: u64) -> Row {
        Row {
            location: "Greece".to_string(),
            date,
            vaccine: "Moderna, Pfizer/BioNTech".to_string(),
            source_url: "https://emvolio.gov.gr".to_string(),
            metrics: MetricValues::default()
                .with(Metric::TotalVaccinations, total)
                .with(Metric::PeopleVaccinated, people),
        }
    }

    fn healthy() -> Series {
        Series::from_rows(
            "Greece",
            vec![
                row(day(3, 1), 100_000, 80_000),
                row(day(3, 2), 110_000, 85_000),
                row(day(3, 3), 120_000, 90_000),
            ],
        )
    }

    fn settings() -> CheckSettings {
        CheckSettings::default()
    }

    #[test]
    fn healthy_series_passes() {
        let series = healthy();
        let settings = settings();
        let checker = CountryChecker::new(&series, &settings, &LocationChecks::default());
        assert!(checker.run().is_ok());
        assert!(!checker.report().has_failures());
    }

    #[test]
    fn duplicate_dates_fail() {
        let mut series = healthy();
        series.rows.push(row(day(3, 3), 130_000, 95_000));
        let err = country_sanity_checks(&series, &settings(), &LocationChecks::default()).unwrap_err();
        assert!(matches!(err, Error::Value(ValueError::DuplicateDates { .. })));
    }

    #[test]
    fn dates_before_campaign_start_fail() {
        let mut series = healthy();
        series.rows.insert(0, row(NaiveDate::from_ymd_opt(2020, 11, 30).unwrap(), 1, 1));
        let err = country_sanity_checks(&series, &settings(), &LocationChecks::default()).unwrap_err();
        assert!(matches!(err, Error::Value(ValueError::DateTooEarly { .. })));
    }

    #[test]
    fn mixed_locations_fail() {
        let mut series = healthy();
        series.rows[1].location = "Cyprus".to_string();
        let err = country_sanity_checks(&series, &settings(), &LocationChecks::default()).unwrap_err();
        assert!(matches!(err, Error::Value(ValueError::MultipleLocations { .. })));
    }

    #[test]
    fn decrease_fails_unless_whitelisted() {
        let mut series = healthy();
        series.rows[2].metrics.set(Metric::TotalVaccinations, Some(105_000));
        let err = country_sanity_checks(&series, &settings(), &LocationChecks::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Value(ValueError::NonMonotonic { metric: Metric::TotalVaccinations, .. })
        ));

        let checks = LocationChecks {
            monotonic_check_skip: vec![SkipEntry {
                date: day(3, 3),
                metrics: crate::validate::SkipMetrics::One(Metric::TotalVaccinations),
            }],
            ..LocationChecks::default()
        };
        let settings = settings();
        let checker = CountryChecker::new(&series, &settings, &checks);
        assert!(checker.run().is_ok());
        let report = checker.report();
        assert!(!report.has_failures());
        let skipped = &report.findings[0];
        assert_eq!(skipped.verdict, crate::validate::Verdict::Skipped);
        assert_eq!(skipped.metric, Some(Metric::TotalVaccinations));
        assert_eq!(skipped.dates, vec![day(3, 3)]);
    }

    #[test]
    fn partly_vaccinated_may_decrease() {
        let mut series = healthy();
        series.rows[0].metrics.set(Metric::PeoplePartlyVaccinated, Some(50));
        series.rows[1].metrics.set(Metric::PeoplePartlyVaccinated, Some(40));
        series.columns.insert(Metric::PeoplePartlyVaccinated);
        assert!(country_sanity_checks(&series, &settings(), &LocationChecks::default()).is_ok());
    }

    #[test]
    fn report_collects_every_failure() {
        let mut series = healthy();
        series.rows[0].vaccine = "Vaxzilla".to_string();
        series.rows[1].source_url = String::new();
        series.rows[2].metrics.set(Metric::PeopleVaccinated, Some(300_000));
        let report = CountryChecker::new(&series, &settings(), &LocationChecks::default()).report();
        // Unknown vaccine, empty url, inequality.
        assert_eq!(report.failure_count(), 3);
        let checks: Vec<&str> = report.failures().map(|f| f.check.as_str()).collect();
        assert_eq!(checks, vec!["source_url", "vaccine", "total_vaccinations>=people_vaccinated"]);
        assert!(report.failing_dates().contains(&day(3, 3)));
    }

    #[test]
    fn anomaly_check_can_be_disabled_per_location() {
        let mut series = healthy();
        series.rows.push(row(day(3, 4), 9_000_000, 95_000));
        assert!(country_sanity_checks(&series, &settings(), &LocationChecks::default()).is_err());

        let checks = LocationChecks {
            anomalies: Some(false),
            ..LocationChecks::default()
        };
        assert!(country_sanity_checks(&series, &settings(), &checks).is_ok());
    }
}
