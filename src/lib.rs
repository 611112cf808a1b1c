//! Incremental merge and validation of per-location vaccination time series.

pub mod adapter;
pub mod cli;
pub mod config;
pub mod derive;
pub mod error;
pub mod merge;
pub mod parallel;
pub mod pipeline;
pub mod process;
pub mod series;
pub mod validate;

pub use error::{Error, ErrorKind, Result, ValueError};
pub use series::{Metric, MetricValues, Observation, Row, Series};
