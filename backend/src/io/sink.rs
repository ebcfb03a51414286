//! Output sinks
//!
//! A sink receives one JSON value per work item. The file sink writes the
//! original tool's naming scheme: `{prefix}{key}_{YYYY-MM-DD}.json`.

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::debug;

/// Receives results
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Store the result for `key`
    async fn accept(&self, key: &str, value: &Value) -> Result<(), AppError>;
}

/// Writes one pretty-printed JSON file per result
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
    prefix: String,
    date: NaiveDate,
}

impl JsonFileSink {
    /// Sink writing `{dir}/{prefix}{key}_{today}.json`
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            date: Utc::now().date_naive(),
        }
    }

    /// Use a fixed date in file names
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the result for `key` is written to
    ///
    /// Path separators in `key` are replaced so every file lands in `dir`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let key: String = key
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        self.dir.join(format!(
            "{}{}_{}.json",
            self.prefix,
            key,
            self.date.format("%Y-%m-%d")
        ))
    }
}

#[async_trait]
impl OutputSink for JsonFileSink {
    async fn accept(&self, key: &str, value: &Value) -> Result<(), AppError> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            AppError::Output(format!(
                "Failed to create directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let path = self.path_for(key);
        let content = serde_json::to_string_pretty(value)
            .map_err(|e| AppError::Output(format!("Failed to serialize result for {}: {}", key, e)))?;

        fs::write(&path, content).await.map_err(|e| {
            AppError::Output(format!("Failed to write {}: {}", path.display(), e))
        })?;

        debug!(key = %key, path = %path.display(), "Result written");
        Ok(())
    }
}

/// Keeps results in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(String, Value)>>,
}

impl MemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Results received so far, in arrival order
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Result stored for `key`, if any
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries().into_iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn accept(&self, key: &str, value: &Value) -> Result<(), AppError> {
        self.entries
            .lock()
            .map_err(|_| AppError::Output("memory sink lock poisoned".into()))?
            .push((key.to_string(), value.clone()));
        Ok(())
    }
}
