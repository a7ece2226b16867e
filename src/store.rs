//! Trace and metadata files on disk.
//!
//! A workflow named `steps` lives in `steps.json` with its metadata in
//! `steps.meta.json`, next to each other.

use serde::Serialize;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{ReplayError, Result};
use crate::types::{Step, TraceMetadata};

const TRACE_EXT: &str = ".json";
const META_EXT: &str = ".meta.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePaths {
    pub trace: PathBuf,
    pub metadata: PathBuf,
}

impl TracePaths {
    /// Accepts a base path with or without the `.json` / `.meta.json` suffix.
    pub fn from_base(base: impl AsRef<Path>) -> Self {
        let raw = base.as_ref().to_string_lossy();
        let stem = raw
            .strip_suffix(META_EXT)
            .or_else(|| raw.strip_suffix(TRACE_EXT))
            .unwrap_or(raw.as_ref());
        Self {
            trace: PathBuf::from(format!("{stem}{TRACE_EXT}")),
            metadata: PathBuf::from(format!("{stem}{META_EXT}")),
        }
    }
}

/// Keeps word characters, `-`, `.` and spaces.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ' '))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Loads a trace, degrading malformed entries to the unknown step.
pub fn load_trace(path: &Path) -> Result<Vec<Step>> {
    let entries: Vec<Value> = read_json(path)?;
    Ok(entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let step = Step::from_value(entry);
            if !entry.is_object() {
                warn!("Entry {} of {} is not a step object", i + 1, path.display());
            }
            step
        })
        .collect())
}

pub fn save_trace(path: &Path, steps: &[Step]) -> Result<()> {
    write_json(path, steps)
}

pub fn load_metadata(path: &Path) -> Result<TraceMetadata> {
    read_json(path)
}

pub fn save_metadata(path: &Path, metadata: &TraceMetadata) -> Result<()> {
    write_json(path, metadata)
}

/// Sorted names of the workflows recorded in `dir`. A missing directory has none.
pub fn list_workflows(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|source| io_error(dir, source))?;
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_suffix(META_EXT))
                .map(String::from)
        })
        .collect();
    names.sort();
    Ok(names)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = std::fs::File::open(path).map_err(|source| io_error(path, source))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|source| ReplayError::Format {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|source| io_error(path, source))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| ReplayError::Format {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> ReplayError {
    ReplayError::Io {
        path: path.to_path_buf(),
        source,
    }
}
