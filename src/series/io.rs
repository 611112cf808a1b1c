//! Series files: one CSV per location, read whole and rewritten whole.
//!
//! Column order on write is `location,date,vaccine,source_url` followed by the
//! present metrics in canonical order. Nulls are empty cells.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::{Error, Result, ValueError};
use crate::series::{Metric, MetricValues, Row, Series};

const TEXT_COLUMNS: [&str; 4] = ["location", "date", "vaccine", "source_url"];

/// `<dir>/<location>.csv`
pub fn series_path(dir: &Path, location: &str) -> PathBuf {
    dir.join(format!("{location}.csv"))
}

pub fn read_series(path: &Path) -> Result<Series> {
    let file = fs::File::open(path).map_err(|err| Error::io(path.display().to_string(), err))?;
    let fallback = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    parse_series(file, &fallback)
}

/// Parse series CSV. `fallback_location` names the series when it has no rows.
pub fn parse_series<R: Read>(reader: R, fallback_location: &str) -> Result<Series> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers()?.clone();
    let find = |name: &str| headers.iter().position(|h| h == name);

    let missing: Vec<String> = TEXT_COLUMNS
        .into_iter()
        .filter(|name| find(*name).is_none())
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(ValueError::MissingColumns {
            location: fallback_location.to_string(),
            columns: missing,
        }
        .into());
    }
    let location_idx = find("location").unwrap_or_default();
    let date_idx = find("date").unwrap_or_default();
    let vaccine_idx = find("vaccine").unwrap_or_default();
    let url_idx = find("source_url").unwrap_or_default();
    let metric_idx: Vec<(Metric, usize)> = Metric::ALL
        .into_iter()
        .filter_map(|metric| find(metric.as_str()).map(|idx| (metric, idx)))
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cell = |idx: usize| record.get(idx).unwrap_or("");
        let mut metrics = MetricValues::default();
        for (metric, idx) in &metric_idx {
            metrics.set(*metric, parse_count(metric.as_str(), cell(*idx))?);
        }
        rows.push(Row {
            location: cell(location_idx).to_string(),
            date: parse_date(cell(date_idx))?,
            vaccine: cell(vaccine_idx).to_string(),
            source_url: cell(url_idx).to_string(),
            metrics,
        });
    }

    let location = rows
        .first()
        .map(|row| row.location.clone())
        .unwrap_or_else(|| fallback_location.to_string());
    let mut series = Series::from_rows(location, rows);
    series.columns.extend(metric_idx.iter().map(|(metric, _)| *metric));
    Ok(series)
}

/// Write to a sibling temp file, then rename over the target.
pub fn write_series(path: &Path, series: &Series) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| Error::io(parent.display().to_string(), err))?;
    }
    let tmp_path = path.with_extension("csv.tmp");
    let file =
        fs::File::create(&tmp_path).map_err(|err| Error::io(tmp_path.display().to_string(), err))?;
    write_csv(file, series)?;
    fs::rename(&tmp_path, path).map_err(|err| Error::io(path.display().to_string(), err))?;
    Ok(())
}

pub fn write_csv<W: Write>(writer: W, series: &Series) -> Result<()> {
    let columns = series.metric_columns();
    let mut writer = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = TEXT_COLUMNS.to_vec();
    header.extend(columns.iter().map(Metric::as_str));
    writer.write_record(&header)?;

    for row in &series.rows {
        let mut record = vec![
            row.location.clone(),
            row.date.format("%Y-%m-%d").to_string(),
            row.vaccine.clone(),
            row.source_url.clone(),
        ];
        record.extend(
            columns
                .iter()
                .map(|metric| row.get(*metric).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }
    writer
        .flush()
        .map_err(|err| Error::io("csv writer", err))?;
    Ok(())
}

pub fn to_csv_string(series: &Series) -> Result<String> {
    let mut buffer = Vec::new();
    write_csv(&mut buffer, series)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    // Spreadsheet exports sometimes carry a midnight timestamp.
    let day = raw.split_whitespace().next().unwrap_or("");
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| Error::Type {
        field: "date".to_string(),
        expected: "a YYYY-MM-DD date",
        found: "string",
        value: raw.to_string(),
    })
}

/// Nullable integer cell; accepts float-formatted integers such as `1000.0`.
pub(crate) fn parse_count(field: &str, raw: &str) -> Result<Option<u64>> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") || raw.eq_ignore_ascii_case("<NA>") {
        return Ok(None);
    }
    if let Ok(value) = raw.parse::<u64>() {
        return Ok(Some(value));
    }
    let Ok(value) = raw.parse::<f64>() else {
        return Err(Error::Type {
            field: field.to_string(),
            expected: "numeric",
            found: "string",
            value: raw.to_string(),
        });
    };
    if value < 0.0 || value.fract() != 0.0 || !value.is_finite() {
        return Err(ValueError::InvalidCount {
            field: field.to_string(),
            value: raw.to_string(),
        }
        .into());
    }
    Ok(Some(value as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const SAMPLE: &str = "\
date,location,source_url,vaccine,total_vaccinations,people_vaccinated,extra
2022-01-02,Chile,https://a,Sinovac,200.0,,x
2022-01-01,Chile,https://a,Sinovac,100,90,y
";

    #[test]
    fn parses_any_column_order_and_float_integers() {
        let series = parse_series(SAMPLE.as_bytes(), "Chile").unwrap();
        assert_eq!(series.location, "Chile");
        assert_eq!(series.len(), 2);
        assert_eq!(series.rows[0].date, NaiveDate::from_ymd_opt(2022, 1, 1).unwrap());
        assert_eq!(series.rows[1].get(Metric::TotalVaccinations), Some(200));
        assert_eq!(series.rows[1].get(Metric::PeopleVaccinated), None);
        assert_eq!(
            series.metric_columns(),
            vec![Metric::TotalVaccinations, Metric::PeopleVaccinated]
        );
    }

    #[test]
    fn writes_fixed_column_order_with_empty_nulls() {
        let series = parse_series(SAMPLE.as_bytes(), "Chile").unwrap();
        let out = to_csv_string(&series).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("location,date,vaccine,source_url,total_vaccinations,people_vaccinated")
        );
        assert_eq!(lines.next(), Some("Chile,2022-01-01,Sinovac,https://a,100,90"));
        assert_eq!(lines.next(), Some("Chile,2022-01-02,Sinovac,https://a,200,"));
    }

    #[test]
    fn non_numeric_metric_is_a_type_error() {
        let raw = "location,date,vaccine,source_url,total_vaccinations\nChile,2022-01-01,Sinovac,u,lots\n";
        let err = parse_series(raw.as_bytes(), "Chile").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn missing_text_column_is_reported() {
        let raw = "location,date,total_vaccinations\nChile,2022-01-01,1\n";
        let err = parse_series(raw.as_bytes(), "Chile").unwrap_err();
        assert!(err.to_string().contains("source_url"));
    }

    #[test]
    fn fractional_count_is_rejected() {
        assert!(parse_count("total_vaccinations", "1.5").is_err());
        assert_eq!(parse_count("total_vaccinations", "").unwrap(), None);
    }
}
