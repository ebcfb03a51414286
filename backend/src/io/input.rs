//! Input file readers
//!
//! Three formats are supported: a DUNS list (one per line), `|`-delimited
//! criteria lines and a JSON array of criteria objects.

use crate::error::AppError;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Length of a DUNS number
const DUNS_LEN: usize = 9;

/// Named query parameters describing one lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Criteria {
    params: Vec<(String, String)>,
}

impl Criteria {
    /// Empty criteria
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a parameter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Add or replace a parameter in place
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
    }

    /// Value of a parameter
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All parameters, in input order
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Whether there are no parameters
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

async fn read_input(path: &Path) -> Result<String, AppError> {
    fs::read_to_string(path).await.map_err(|e| {
        AppError::Input(format!("Failed to read {}: {}", path.display(), e))
    })
}

/// Left-pad a DUNS with zeros to nine digits
pub fn pad_duns(duns: &str) -> String {
    format!("{:0>width$}", duns.trim(), width = DUNS_LEN)
}

/// Read a DUNS list
///
/// Lines are trimmed, blank lines dropped and short numbers left-padded with
/// zeros to nine digits.
///
/// # Errors
/// * `AppError::Input` if the file cannot be read
pub async fn read_duns_file(path: impl AsRef<Path>) -> Result<Vec<String>, AppError> {
    let path = path.as_ref();
    let duns: Vec<String> = read_input(path)
        .await?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(pad_duns)
        .collect();

    info!(path = %path.display(), records = duns.len(), "Read DUNS file");
    Ok(duns)
}

/// Read `|`-delimited criteria, mapping columns onto `names` in order
///
/// Blank lines are skipped. Missing trailing columns are left out of the
/// record; columns beyond `names` are ignored.
///
/// # Errors
/// * `AppError::Input` if the file cannot be read
pub async fn read_delimited_criteria(
    path: impl AsRef<Path>,
    names: &[&str],
) -> Result<Vec<Criteria>, AppError> {
    let path = path.as_ref();
    let records: Vec<Criteria> = read_input(path)
        .await?
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            names
                .iter()
                .zip(line.split('|'))
                .fold(Criteria::new(), |criteria, (name, value)| {
                    criteria.with(*name, value.trim())
                })
        })
        .collect();

    info!(path = %path.display(), records = records.len(), "Read delimited criteria");
    Ok(records)
}

/// Read a JSON array of criteria objects
///
/// Scalar values are taken as query parameters; `null` and empty strings are
/// dropped. Empty objects are skipped.
///
/// # Errors
/// * `AppError::Input` if the file cannot be read, is not a JSON array of
///   objects, or a value is an array or object
pub async fn read_criteria_json(path: impl AsRef<Path>) -> Result<Vec<Criteria>, AppError> {
    let path = path.as_ref();
    let content = read_input(path).await?;
    let entries: Vec<serde_json::Map<String, Value>> = serde_json::from_str(&content)
        .map_err(|e| {
            AppError::Input(format!(
                "{} is not a JSON array of objects: {}",
                path.display(),
                e
            ))
        })?;

    let mut records = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.into_iter().enumerate() {
        let mut criteria = Criteria::new();
        for (name, value) in entry {
            let value = match value {
                Value::Null => continue,
                Value::String(s) if s.trim().is_empty() => continue,
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(AppError::Input(format!(
                        "{}: entry {} has a nested value for '{}'",
                        path.display(),
                        idx,
                        name
                    )))
                }
            };
            criteria.set(name, value);
        }
        if criteria.is_empty() {
            debug!(entry = idx, "Skipping empty criteria object");
            continue;
        }
        records.push(criteria);
    }

    info!(path = %path.display(), records = records.len(), "Read criteria file");
    Ok(records)
}
