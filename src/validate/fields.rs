//! Shape and format checks for a single adapter record before it is merged.

use chrono::{Days, NaiveDate};
use serde_json::{Map, Value};

use crate::error::{Error, Result, ValueError};
use crate::series::{Metric, MetricValues, Observation};
use crate::validate::vaccines::{join_vaccines, split_vaccines, unknown_vaccines};

pub const DAILY_CHANGE_FIELD: &str = "daily_change";

/// Validate a raw record and build the typed [`Observation`].
///
/// Dates may be at most one day after `today`.
pub fn validate_fields(record: &Map<String, Value>, today: NaiveDate) -> Result<Observation> {
    let location = require_str(record, "location")?;
    let vaccine = require_str(record, "vaccine")?;
    let source_url = require_str(record, "source_url")?;

    let mut metrics = MetricValues::default();
    for metric in Metric::ALL {
        metrics.set(metric, optional_count(record, metric.as_str())?);
    }
    let daily_change = optional_count(record, DAILY_CHANGE_FIELD)?;
    if metrics.get(Metric::TotalVaccinations).is_none() && daily_change.is_none() {
        return Err(ValueError::MissingTotal.into());
    }

    let date = validate_date(record.get("date"), today)?;

    let unknown = unknown_vaccines(vaccine);
    if !unknown.is_empty() {
        return Err(ValueError::UnknownVaccine {
            location: location.to_string(),
            names: unknown,
        }
        .into());
    }

    Ok(Observation {
        location: location.trim().to_string(),
        date,
        vaccine: join_vaccines(split_vaccines(vaccine)),
        source_url: source_url.trim().to_string(),
        metrics,
        daily_change,
    })
}

/// A string field holding something other than whitespace.
fn require_str<'a>(record: &'a Map<String, Value>, field: &'static str) -> Result<&'a str> {
    match record.get(field) {
        Some(Value::String(value)) if value.trim().is_empty() => {
            Err(ValueError::EmptyRecordField { field }.into())
        }
        Some(Value::String(value)) => Ok(value.as_str()),
        other => Err(type_error(field, "a string", other)),
    }
}

/// Numbers and nulls pass; anything else is a type error. Numbers must be
/// non-negative integers (integral floats are accepted).
fn optional_count(record: &Map<String, Value>, field: &str) -> Result<Option<u64>> {
    let Some(value) = record.get(field) else {
        return Ok(None);
    };
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => {
            if let Some(count) = number.as_u64() {
                return Ok(Some(count));
            }
            match number.as_f64() {
                Some(float) if float >= 0.0 && float.fract() == 0.0 && float.is_finite() => {
                    Ok(Some(float as u64))
                }
                _ => Err(ValueError::InvalidCount {
                    field: field.to_string(),
                    value: number.to_string(),
                }
                .into()),
            }
        }
        other => Err(type_error(field, "numeric", Some(other))),
    }
}

fn validate_date(value: Option<&Value>, today: NaiveDate) -> Result<NaiveDate> {
    let raw = match value {
        Some(Value::String(raw)) => raw,
        other => return Err(type_error("date", "a YYYY-MM-DD string", other)),
    };
    let well_formed = raw.len() == 10
        && raw
            .char_indices()
            .all(|(i, ch)| if i == 4 || i == 7 { ch == '-' } else { ch.is_ascii_digit() });
    let parsed = well_formed
        .then(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        .flatten();
    let Some(date) = parsed else {
        return Err(type_error("date", "a YYYY-MM-DD string", value));
    };

    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
    if date > tomorrow {
        return Err(ValueError::DateInFuture {
            value: raw.clone(),
            tomorrow,
        }
        .into());
    }
    Ok(date)
}

fn type_error(field: &str, expected: &'static str, found: Option<&Value>) -> Error {
    Error::Type {
        field: field.to_string(),
        expected,
        found: json_type_name(found),
        value: found.map(Value::to_string).unwrap_or_else(|| "missing".to_string()),
    }
}

fn json_type_name(value: Option<&Value>) -> &'static str {
    match value {
        None => "nothing",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "bool",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
}
