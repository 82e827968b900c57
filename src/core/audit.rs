use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One immutable audit entry per session, written right after the cloned
/// pod is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub timestamp: DateTime<Utc>,
    pub new_pod_name: String,
    pub source_pod: String,
    pub namespace: String,
    pub user: String,
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suffix: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_file: Option<String>,
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("could not read history file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse history file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("could not encode history entries: {0}")]
    Encode(serde_json::Error),

    #[error("could not write history file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

type Result<T> = std::result::Result<T, HistoryError>;

/// Append-only session log persisted as one JSON document.
///
/// Each append reads the whole file, appends in memory and rewrites the
/// file. Single-writer by design; a session performs exactly one append
/// from one task, concurrent sessions must serialize access externally.
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// All recorded sessions, oldest first. A missing or empty file is an
    /// empty history.
    pub fn entries(&self) -> Result<Vec<SessionRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = std::fs::read_to_string(&self.path).map_err(|source| HistoryError::Read {
            path: self.path.clone(),
            source,
        })?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&contents).map_err(|source| HistoryError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    pub fn append(&self, record: &SessionRecord) -> Result<()> {
        let mut entries = self.entries()?;
        entries.push(record.clone());

        let encoded =
            serde_json::to_string_pretty(&entries).map_err(HistoryError::Encode)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| HistoryError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        std::fs::write(&self.path, encoded).map_err(|source| HistoryError::Write {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
