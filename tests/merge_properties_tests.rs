//! Properties every merge and repair of a location series must keep.

use chrono::NaiveDate;

use vaxseries::merge::{increment, is_monotonic, make_monotonic, MergeOutcome};
use vaxseries::validate::{check_anomalies, check_inequalities, detect_anomalies, AnomalySettings, SkipList};
use vaxseries::{Error, Metric, MetricValues, Observation, Row, Series, ValueError};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 4, d).expect("valid date")
}

fn obs(d: u32, total: u64, people: u64) -> Observation {
    Observation {
        location: "Aruba".to_string(),
        date: day(d),
        vaccine: "Pfizer/BioNTech".to_string(),
        source_url: "https://coronavirus.aw".to_string(),
        metrics: MetricValues::default()
            .with(Metric::TotalVaccinations, total)
            .with(Metric::PeopleVaccinated, people),
        daily_change: None,
    }
}

fn totals(values: &[(u32, u64)]) -> Series {
    let rows = values
        .iter()
        .map(|(d, total)| Row {
            location: "Aruba".to_string(),
            date: day(*d),
            vaccine: "Pfizer/BioNTech".to_string(),
            source_url: "https://coronavirus.aw".to_string(),
            metrics: MetricValues::default().with(Metric::TotalVaccinations, *total),
        })
        .collect();
    Series::from_rows("Aruba", rows)
}

#[test]
fn merging_into_nothing_yields_single_row() {
    let (series, outcome) = increment(None, &obs(3, 500, 400)).expect("merge");
    assert_eq!(outcome, MergeOutcome::Created);
    assert_eq!(series.len(), 1);
    assert_eq!(series.rows[0].date, day(3));
    assert!(series.has_column(Metric::PeopleVaccinated));
}

#[test]
fn repeating_an_increment_is_idempotent() {
    let (once, _) = increment(None, &obs(3, 500, 400)).expect("merge");
    let (twice, outcome) = increment(Some(&once), &obs(3, 500, 400)).expect("merge");
    assert_eq!(outcome, MergeOutcome::Unchanged);
    assert_eq!(once, twice);
}

#[test]
fn regressions_never_reach_the_series() {
    let (current, _) = increment(None, &obs(5, 1_000, 800)).expect("merge");

    let (lower, outcome) = increment(Some(&current), &obs(6, 900, 700)).expect("merge");
    assert_eq!(outcome, MergeOutcome::Unchanged);
    assert_eq!(lower, current);

    let (older, outcome) = increment(Some(&current), &obs(4, 1_500, 900)).expect("merge");
    assert_eq!(outcome, MergeOutcome::Unchanged);
    assert_eq!(older, current);
}

#[test]
fn same_day_update_replaces_the_row() {
    let (current, _) = increment(None, &obs(5, 1_000, 800)).expect("merge");
    let (corrected, outcome) = increment(Some(&current), &obs(5, 1_200, 850)).expect("merge");
    assert_eq!(outcome, MergeOutcome::Corrected);
    assert_eq!(corrected.len(), 1);
    assert_eq!(corrected.rows[0].get(Metric::TotalVaccinations), Some(1_200));
    assert_eq!(corrected.rows[0].get(Metric::PeopleVaccinated), Some(850));
}

#[test]
fn appended_rows_stay_in_date_order() {
    let (first, _) = increment(None, &obs(5, 1_000, 800)).expect("merge");
    let (second, outcome) = increment(Some(&first), &obs(9, 1_400, 900)).expect("merge");
    assert_eq!(outcome, MergeOutcome::Appended);
    let dates: Vec<_> = second.rows.iter().map(|row| row.date).collect();
    assert_eq!(dates, vec![day(5), day(9)]);
}

#[test]
fn enforcer_drops_the_fewest_rows() {
    let series = totals(&[(1, 10), (2, 20), (3, 15), (4, 30), (5, 25), (6, 40)]);
    let fixed = make_monotonic(&series, Metric::TotalVaccinations, 3).expect("within cap");
    assert!(is_monotonic(&fixed, Metric::TotalVaccinations));
    assert_eq!(fixed.len(), 4);
    assert_eq!(fixed.rows.first().map(|row| row.date), Some(day(1)));
    assert_eq!(fixed.rows.last().map(|row| row.date), Some(day(6)));
}

#[test]
fn enforcer_refuses_to_exceed_its_cap() {
    let series = totals(&[(1, 10), (2, 20), (3, 15), (4, 30), (5, 25), (6, 40)]);
    let err = make_monotonic(&series, Metric::TotalVaccinations, 1).unwrap_err();
    match err {
        Error::Value(ValueError::MonotonicCapExceeded {
            would_remove,
            max_removed,
            ..
        }) => {
            assert_eq!(would_remove, 2);
            assert_eq!(max_removed, 1);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn people_above_total_fails_consistency() {
    let (current, _) = increment(None, &obs(5, 1_000, 800)).expect("merge");
    assert!(check_inequalities(&current).is_ok());

    let (bad, _) = increment(Some(&current), &obs(6, 1_100, 1_300)).expect("merge");
    let err = check_inequalities(&bad).unwrap_err();
    assert!(err.to_string().contains("total_vaccinations can't be < people_vaccinated"));
}

#[test]
fn spike_is_flagged_unless_whitelisted() {
    let series = totals(&[(1, 100), (2, 105), (3, 110), (4, 50_000)]);
    let settings = AnomalySettings {
        floor: 0,
        ..AnomalySettings::default()
    };

    let flagged = detect_anomalies(&series, Metric::TotalVaccinations, &settings);
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].date, day(4));
    assert!((flagged[0].ratio - 50_000.0 / 105.0).abs() < 1e-3);

    assert!(check_anomalies(&series, Metric::TotalVaccinations, &settings, &SkipList::default()).is_err());
    let skip: SkipList = [(day(4), Metric::TotalVaccinations)].into_iter().collect();
    assert!(check_anomalies(&series, Metric::TotalVaccinations, &settings, &skip).is_ok());
}
