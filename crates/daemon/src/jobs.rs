//! Job records and their state machine.
//!
//! A job moves `queued -> processing -> done | failed` and never goes back.
//! Jobs live in the scheduler's arena for the whole session and are
//! addressed by [`JobId`].

use crate::convention::{ParseError, ProcessingMode, TrimWindow};
use crate::folders::RenameError;
use crate::presets::Preset;
use crate::probe::{ProbeError, ProbeInfo};
use crate::supervisor::{TranscodeError, TranscodeResult};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Index of a job in the session arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(pub usize);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the queue.
    #[default]
    Queued,
    /// Moved into `processing/` and being transcoded.
    Processing,
    /// Finished; `result` is set.
    Done,
    /// Finished; `error` is set.
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Why a stage of a job did not succeed.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("filename convention: {0}")]
    Parse(#[from] ParseError),

    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("could not move into processing: {0}")]
    Rename(#[from] RenameError),

    #[error("transcode failed: {0}")]
    Transcode(#[from] TranscodeError),
}

/// One file's journey through the pipeline.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Job {
    pub id: JobId,
    /// Inbox path until the job starts, then the path inside `processing/`.
    pub input_path: PathBuf,
    pub preset: &'static Preset,
    pub mode: ProcessingMode,
    pub trim: TrimWindow,
    /// File name of the artifact in `done/`.
    pub output_name: String,
    pub status: JobStatus,
    /// Fraction in [0, 1].
    pub progress: f64,
    /// Absent when probing failed.
    pub probe: Option<ProbeInfo>,
    pub result: Option<TranscodeResult>,
    pub error: Option<String>,
    /// Unix timestamp (milliseconds) when the job was created.
    pub created_at: i64,
    /// Unix timestamp (milliseconds) of the last transition.
    pub updated_at: i64,
}

impl Job {
    pub fn new(
        id: JobId,
        input_path: PathBuf,
        preset: &'static Preset,
        mode: ProcessingMode,
        trim: TrimWindow,
        output_name: String,
        probe: Option<ProbeInfo>,
    ) -> Self {
        let now = current_timestamp_ms();
        Self {
            id,
            input_path,
            preset,
            mode,
            trim,
            output_name,
            status: JobStatus::Queued,
            progress: 0.0,
            probe,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = current_timestamp_ms();
    }

    pub fn start_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.progress = 0.0;
        self.touch();
    }

    /// Record progress. Values outside [0, 1] are clamped and progress never
    /// moves backwards.
    pub fn set_progress(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction > self.progress {
            self.progress = fraction;
            self.touch();
        }
    }

    pub fn complete(&mut self, result: TranscodeResult) {
        self.status = JobStatus::Done;
        self.progress = 1.0;
        self.result = Some(result);
        self.error = None;
        self.touch();
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.result = None;
        self.error = Some(reason.into());
        self.touch();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// File name of the input, for log lines.
    pub fn file_name(&self) -> String {
        self.input_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input_path.display().to_string())
    }
}

/// Current time as Unix milliseconds.
pub fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
