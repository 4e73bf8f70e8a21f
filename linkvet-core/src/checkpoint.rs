//! Durable progress for long-running checks.
//!
//! A checkpoint is the JSON form of [`CheckpointState`]. It is rewritten in
//! full on every flush, atomically, so a crash leaves either the previous
//! checkpoint or the new one on disk.

use crate::error::PersistenceError;
use crate::persist::write_atomic;
use chrono::{DateTime, Utc};
use linkvet_scanner::result::ProbeResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub format_version: u32,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub processed_urls: BTreeSet<String>,
    pub results: Vec<ProbeResult>,
}

impl CheckpointState {
    pub fn new() -> Self {
        Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            processed_urls: BTreeSet::new(),
            results: Vec::new(),
        }
    }

    /// Append a result. Returns false if the URL was already recorded.
    pub fn record(&mut self, result: ProbeResult) -> bool {
        if !self.processed_urls.insert(result.url.clone()) {
            return false;
        }
        self.results.push(result);
        true
    }

    pub fn is_processed(&self, url: &str) -> bool {
        self.processed_urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl Default for CheckpointState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the checkpoint, or `None` when there is nothing to resume.
    pub fn load(&self) -> Result<Option<CheckpointState>, PersistenceError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let mut state: CheckpointState =
            serde_json::from_str(&contents).map_err(|source| PersistenceError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        if state.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                path: self.path.clone(),
                found: state.format_version,
                expected: CHECKPOINT_FORMAT_VERSION,
            });
        }

        // A URL counts as processed only if its result was persisted
        state.processed_urls = state.results.iter().map(|r| r.url.clone()).collect();

        info!(
            "Resuming run {} with {} checked URL(s) from {}",
            state.run_id,
            state.results.len(),
            self.path.display()
        );

        Ok(Some(state))
    }

    pub fn flush(&self, state: &CheckpointState) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path, &json)?;
        debug!(
            "Checkpoint flushed: {} result(s) to {}",
            state.results.len(),
            self.path.display()
        );
        Ok(())
    }

    pub fn clear(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistenceError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
