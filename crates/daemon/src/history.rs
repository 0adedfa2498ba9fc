//! Completed-job history.
//!
//! Successful jobs are appended to a JSON array on disk, newest first and
//! capped at a configured length. The file is rewritten whole on every
//! append; a missing or unreadable file counts as an empty history.

use crate::convention::ProcessingMode;
use crate::events::JobEvent;
use crate::jobs::{current_timestamp_ms, Job, JobStatus};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history IO error: {0}")]
    Io(#[from] io::Error),

    #[error("history encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One finished job as recorded on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    /// Unique entry identifier (UUID).
    pub id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Unix timestamp (milliseconds) when the job finished.
    pub timestamp: i64,
    pub original_size: u64,
    pub compressed_size: u64,
    pub reduction_percent: f64,
    pub preset: String,
    #[serde(default)]
    pub mode: ProcessingMode,
}

impl HistoryEntry {
    /// Entry for a job that finished successfully. `None` for any other job.
    pub fn from_job(job: &Job) -> Option<Self> {
        if job.status != JobStatus::Done {
            return None;
        }
        let result = job.result.as_ref()?;
        Some(Self {
            id: Uuid::new_v4().to_string(),
            input_path: job.input_path.clone(),
            output_path: result.output_path.clone(),
            timestamp: current_timestamp_ms(),
            original_size: result.original_size,
            compressed_size: result.compressed_size,
            reduction_percent: result.reduction_percent,
            preset: job.preset.name.to_string(),
            mode: job.mode,
        })
    }
}

/// Read the history file. Missing or corrupt files yield an empty list.
pub fn load_history(path: &Path) -> Vec<HistoryEntry> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_str(&content) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("ignoring unreadable history {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

pub fn save_history(path: &Path, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(entries)?;
    fs::write(path, json)?;
    Ok(())
}

/// Insert `entry` at the front and keep at most `max_entries`.
pub fn append_entry(
    path: &Path,
    entry: HistoryEntry,
    max_entries: usize,
) -> Result<(), HistoryError> {
    let mut entries = load_history(path);
    entries.insert(0, entry);
    entries.truncate(max_entries);
    save_history(path, &entries)
}

/// Record every successful job published on `events` until the channel
/// closes.
pub fn spawn_history_writer(
    mut events: broadcast::Receiver<JobEvent>,
    path: PathBuf,
    max_entries: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let job = match events.recv().await {
                Ok(JobEvent::Done(job)) => job,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("history writer missed {} event(s)", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Some(entry) = HistoryEntry::from_job(&job) else {
                continue;
            };

            let path = path.clone();
            let written =
                tokio::task::spawn_blocking(move || append_entry(&path, entry, max_entries)).await;
            match written {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("could not record job {}: {}", job.id, e),
                Err(e) => log::warn!("history write task failed: {}", e),
            }
        }
    })
}
