//! Whitelists of known-legitimate (date, metric) pairs, e.g. catch-up reporting.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::series::Metric;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SkipMetrics {
    One(Metric),
    Many(Vec<Metric>),
}

/// One config entry: `{ date: 2021-05-01, metrics: total_vaccinations }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipEntry {
    pub date: NaiveDate,
    pub metrics: SkipMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipList {
    ids: HashSet<(NaiveDate, Metric)>,
}

impl SkipList {
    pub fn from_entries(entries: &[SkipEntry]) -> Self {
        let mut ids = HashSet::new();
        for entry in entries {
            match &entry.metrics {
                SkipMetrics::One(metric) => {
                    ids.insert((entry.date, *metric));
                }
                SkipMetrics::Many(metrics) => {
                    ids.extend(metrics.iter().map(|metric| (entry.date, *metric)));
                }
            }
        }
        Self { ids }
    }

    pub fn insert(&mut self, date: NaiveDate, metric: Metric) {
        self.ids.insert((date, metric));
    }

    pub fn contains(&self, date: NaiveDate, metric: Metric) -> bool {
        self.ids.contains(&(date, metric))
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<(NaiveDate, Metric)> for SkipList {
    fn from_iter<T: IntoIterator<Item = (NaiveDate, Metric)>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_accept_one_or_many_metrics() {
        let yaml = "
- date: 2021-05-01
  metrics: total_vaccinations
- date: 2021-06-01
  metrics: [people_vaccinated, total_boosters]
";
        let entries: Vec<SkipEntry> = serde_yaml::from_str(yaml).unwrap();
        let skip = SkipList::from_entries(&entries);
        let may = NaiveDate::from_ymd_opt(2021, 5, 1).unwrap();
        let june = NaiveDate::from_ymd_opt(2021, 6, 1).unwrap();
        assert!(skip.contains(may, Metric::TotalVaccinations));
        assert!(!skip.contains(may, Metric::PeopleVaccinated));
        assert!(skip.contains(june, Metric::PeopleVaccinated));
        assert!(skip.contains(june, Metric::TotalBoosters));
    }
}
