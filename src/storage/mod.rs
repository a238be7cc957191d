// src/storage/mod.rs
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::extractors::ExtractedRecord;
use crate::utils::error::{AppError, StorageError};
use crate::utils::html_debug;

/// Destination for finished records.
pub trait RecordSink {
    fn push(&mut self, record: &ExtractedRecord) -> Result<PathBuf, StorageError>;
}

/// Writes records as numbered JSON files: `<base>/<source>/000000001.json`, ...
pub struct StorageManager {
    base_dir: PathBuf,
    counters: HashMap<String, usize>,
}

impl StorageManager {
    /// Creates a new StorageManager with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path)
                .map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path, counters: HashMap::new() })
    }

    fn source_dir(&self, source: &str) -> PathBuf {
        let source = if source.is_empty() { "records" } else { source };
        self.base_dir.join(source)
    }

    /// Next free sequence number for `source`, skipping files left by earlier runs.
    fn next_path(&mut self, dir: &Path, source: &str) -> PathBuf {
        let counter = self.counters.entry(source.to_string()).or_insert(0);
        loop {
            *counter += 1;
            let path = dir.join(format!("{:09}.json", counter));
            if !path.exists() {
                return path;
            }
        }
    }

    /// Saves one record as pretty-printed JSON
    pub fn save_record(&mut self, record: &ExtractedRecord) -> Result<PathBuf, StorageError> {
        let target_dir = self.source_dir(record.source());
        if !target_dir.exists() {
            fs::create_dir_all(&target_dir)
                .map_err(StorageError::IoError)?;
        }

        let file_path = self.next_path(&target_dir, record.source());
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        fs::write(&file_path, json)
            .map_err(StorageError::IoError)?;

        tracing::info!("Saved record to {}", file_path.display());
        Ok(file_path)
    }

    /// Saves the raw page with interesting patterns highlighted, for layout debugging.
    pub fn save_debug_snapshot(
        &self,
        source: &str,
        label: &str,
        html: &str,
        patterns: &[(String, &str)],
    ) -> Result<PathBuf, AppError> {
        let file_name = format!("{}.html", label.replace(['/', '\\'], "_"));
        let path = self.source_dir(source).join("debug").join(file_name);
        html_debug::create_debug_html(html, &path, patterns)?;
        Ok(path)
    }
}

impl RecordSink for StorageManager {
    fn push(&mut self, record: &ExtractedRecord) -> Result<PathBuf, StorageError> {
        self.save_record(record)
    }
}
