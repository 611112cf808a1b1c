//! Source adapters: per-location fetch + parse, registered by location.
//!
//! Adapters share nothing but the [`Context`] they are handed; the registry is
//! a flat lookup table, one adapter per location.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::series::Series;

pub mod inbox;

pub use inbox::{registry_from_inbox, CsvSheetAdapter, JsonDropAdapter};

/// Configuration plus the run date, passed explicitly to every adapter.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: PipelineConfig,
    pub today: NaiveDate,
}

impl Context {
    /// Run on the local calendar date.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            today: chrono::Local::now().date_naive(),
        }
    }

    pub fn with_today(config: PipelineConfig, today: NaiveDate) -> Self {
        Self { config, today }
    }
}

/// Whatever the source handed back, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub origin: String,
    pub body: String,
}

/// A single observation (incremental sources) or a full series (batch sources).
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterOutput {
    Record(Map<String, Value>),
    Series(Series),
}

pub trait SourceAdapter: Send + Sync {
    fn location(&self) -> &str;

    fn fetch(&self, ctx: &Context) -> Result<RawDocument>;

    fn parse(&self, doc: RawDocument) -> Result<AdapterOutput>;
}

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Box<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its location, replacing any previous one.
    pub fn register(&mut self, adapter: Box<dyn SourceAdapter>) -> Option<Box<dyn SourceAdapter>> {
        self.adapters.insert(adapter.location().to_string(), adapter)
    }

    pub fn get(&self, location: &str) -> Option<&dyn SourceAdapter> {
        self.adapters.get(location).map(|adapter| adapter.as_ref())
    }

    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    pub fn adapters(&self) -> impl Iterator<Item = &dyn SourceAdapter> {
        self.adapters.values().map(|adapter| adapter.as_ref())
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
