//! File-drop adapters: `<inbox>/<location>.json` holds one observation,
//! `<inbox>/<location>.csv` a whole series exported from a sheet.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::adapter::{AdapterOutput, AdapterRegistry, Context, RawDocument, SourceAdapter};
use crate::error::{Error, Result};
use crate::series::io::parse_series;

#[derive(Debug, Clone)]
pub struct JsonDropAdapter {
    location: String,
    path: PathBuf,
}

impl JsonDropAdapter {
    pub fn new(location: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            path: path.into(),
        }
    }
}

impl SourceAdapter for JsonDropAdapter {
    fn location(&self) -> &str {
        &self.location
    }

    fn fetch(&self, _ctx: &Context) -> Result<RawDocument> {
        read_document(&self.path)
    }

    fn parse(&self, doc: RawDocument) -> Result<AdapterOutput> {
        match serde_json::from_str::<Value>(&doc.body)? {
            Value::Object(record) => Ok(AdapterOutput::Record(record)),
            other => Err(Error::Type {
                field: doc.origin,
                expected: "a JSON object",
                found: "other JSON value",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CsvSheetAdapter {
    location: String,
    path: PathBuf,
}

impl CsvSheetAdapter {
    pub fn new(location: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            path: path.into(),
        }
    }
}

impl SourceAdapter for CsvSheetAdapter {
    fn location(&self) -> &str {
        &self.location
    }

    fn fetch(&self, _ctx: &Context) -> Result<RawDocument> {
        read_document(&self.path)
    }

    fn parse(&self, doc: RawDocument) -> Result<AdapterOutput> {
        Ok(AdapterOutput::Series(parse_series(doc.body.as_bytes(), &self.location)?))
    }
}

fn read_document(path: &Path) -> Result<RawDocument> {
    let body = fs::read_to_string(path).map_err(|err| Error::io(path.display().to_string(), err))?;
    Ok(RawDocument {
        origin: path.display().to_string(),
        body,
    })
}

/// One adapter per drop file. A location with both a `.json` and a `.csv`
/// file keeps the JSON drop.
pub fn registry_from_inbox(dir: &Path) -> Result<AdapterRegistry> {
    let mut registry = AdapterRegistry::new();
    if !dir.is_dir() {
        warn!(inbox = %dir.display(), "inbox directory missing, nothing to update");
        return Ok(registry);
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|err| Error::io(dir.display().to_string(), err))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file())
        .collect();
    // csv before json so the JSON drop wins on a clash.
    paths.sort_by_key(|path| (extension(path) == "json", path.clone()));

    for path in paths {
        let Some(location) = path.file_stem().map(|stem| stem.to_string_lossy().into_owned()) else {
            continue;
        };
        let adapter: Box<dyn SourceAdapter> = match extension(&path).as_str() {
            "json" => Box::new(JsonDropAdapter::new(location.clone(), path.clone())),
            "csv" => Box::new(CsvSheetAdapter::new(location.clone(), path.clone())),
            _ => {
                debug!(path = %path.display(), "ignoring non-drop file");
                continue;
            }
        };
        if registry.register(adapter).is_some() {
            warn!(%location, "both csv and json drops found, using json");
        }
    }
    Ok(registry)
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}
