//! Normalize a whole series delivered by a batch source, then sanity-check it.

use chrono::{Days, NaiveDate};
use tracing::debug;

use crate::error::{Result, ValueError};
use crate::series::Series;
use crate::validate::{country_sanity_checks, CheckSettings, LocationChecks};

/// Rows dated `today` or later are dropped as partial reporting; anything
/// past tomorrow is an error. Text fields are trimmed and rows sorted.
pub fn normalize_location(series: &Series, today: NaiveDate) -> Result<Series> {
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
    if let Some(max_date) = series.max_date().filter(|max| *max > tomorrow) {
        return Err(ValueError::FutureRows {
            location: series.location.clone(),
            date: max_date,
        }
        .into());
    }

    let mut processed = series.clone();
    let before = processed.len();
    processed.rows.retain(|row| row.date < today);
    if processed.len() != before {
        debug!(
            location = %series.location,
            dropped = before - processed.len(),
            "dropping rows reported today or later"
        );
    }
    for row in &mut processed.rows {
        row.location = row.location.trim().to_string();
        row.vaccine = row.vaccine.trim().to_string();
        row.source_url = row.source_url.trim().to_string();
    }
    processed.location = processed.location.trim().to_string();
    processed.sort();
    Ok(processed)
}

/// [`normalize_location`] followed by the full country sanity check.
pub fn process_location(
    series: &Series,
    today: NaiveDate,
    settings: &CheckSettings,
    checks: &LocationChecks,
) -> Result<Series> {
    let processed = normalize_location(series, today)?;
    country_sanity_checks(&processed, settings, checks)?;
    Ok(processed)
}
