//! Record and series checks run before anything is persisted.

pub mod anomaly;
pub mod consistency;
pub mod country;
pub mod fields;
pub mod report;
pub mod skip;
pub mod vaccines;

pub use anomaly::{check_anomalies, detect_anomalies, Anomaly, AnomalySettings};
pub use consistency::{check_inequalities, check_inequality, INEQUALITIES};
pub use country::{country_sanity_checks, CheckSettings, CountryChecker, LocationChecks};
pub use fields::validate_fields;
pub use report::{Finding, SeriesReport, Verdict};
pub use skip::{SkipEntry, SkipList, SkipMetrics};
