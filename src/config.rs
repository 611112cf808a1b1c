//! Pipeline configuration, loaded from YAML. Every key has a default so an
//! empty file (or no file) is a valid configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::merge::DEFAULT_MAX_REMOVED_ROWS;
use crate::validate::{CheckSettings, LocationChecks};

pub const DEFAULT_CONFIG_PATH: &str = "vaxseries.yaml";
pub const DEFAULT_OUTPUT_DIR: &str = "output/vaccinations";
pub const DEFAULT_INBOX_DIR: &str = "inbox";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Where per-location series files live.
    pub output_dir: PathBuf,
    /// Drop directory scanned by the file adapters.
    pub inbox_dir: PathBuf,
    /// Worker threads for the update run; 0 means one per core.
    pub workers: usize,
    pub make_monotonic: bool,
    pub max_removed_rows: usize,
    pub checks: CheckSettings,
    pub locations: BTreeMap<String, LocationChecks>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            inbox_dir: PathBuf::from(DEFAULT_INBOX_DIR),
            workers: 0,
            make_monotonic: false,
            max_removed_rows: DEFAULT_MAX_REMOVED_ROWS,
            checks: CheckSettings::default(),
            locations: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| Error::io(path.display().to_string(), err))?;
        Self::from_yaml(&raw)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let anomaly = &self.checks.anomaly;
        if !(anomaly.threshold.is_finite() && anomaly.threshold > 0.0) {
            return Err(Error::Config(format!(
                "checks.anomaly.threshold must be a positive number, got {}",
                anomaly.threshold
            )));
        }
        if anomaly.window_days == 0 {
            return Err(Error::Config("checks.anomaly.window_days must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn location(&self, location: &str) -> LocationChecks {
        self.locations.get(location).cloned().unwrap_or_default()
    }

    pub fn monotonic_for(&self, location: &str) -> bool {
        self.locations
            .get(location)
            .and_then(|checks| checks.make_monotonic)
            .unwrap_or(self.make_monotonic)
    }
}
