//! Cross-metric inequalities between cumulative counters.

use crate::error::{Result, ValueError};
use crate::series::{Metric, Series};

/// `(greater, lesser)` pairs that hold by definition.
pub const INEQUALITIES: [(Metric, Metric); 4] = [
    (Metric::TotalVaccinations, Metric::PeopleVaccinated),
    (Metric::TotalVaccinations, Metric::PeopleFullyVaccinated),
    (Metric::TotalVaccinations, Metric::TotalBoosters),
    (Metric::PeopleVaccinated, Metric::PeopleFullyVaccinated),
];

/// Check one pair on every row where both values are non-null.
pub fn check_inequality(series: &Series, greater: Metric, lesser: Metric) -> Result<()> {
    let dates: Vec<_> = series
        .rows
        .iter()
        .filter(|row| matches!((row.get(greater), row.get(lesser)), (Some(g), Some(l)) if g < l))
        .map(|row| row.date)
        .collect();
    if dates.is_empty() {
        return Ok(());
    }
    Err(ValueError::Inequality {
        location: series.location.clone(),
        greater,
        lesser,
        dates,
    }
    .into())
}

pub fn check_inequalities(series: &Series) -> Result<()> {
    for (greater, lesser) in INEQUALITIES {
        check_inequality(series, greater, lesser)?;
    }
    Ok(())
}
