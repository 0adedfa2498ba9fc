//! Point-in-time queue summary served on `/status`.

use crate::jobs::{current_timestamp_ms, Job, JobStatus};
use serde::{Deserialize, Serialize};

/// Job counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub timestamp_unix_ms: i64,
    pub queued: usize,
    pub processing: usize,
    pub done: usize,
    pub failed: usize,
    /// True once the scheduler stopped taking jobs.
    pub halted: bool,
}

impl StatusSnapshot {
    pub fn from_jobs(jobs: &[Job], halted: bool) -> Self {
        let mut snapshot = Self {
            timestamp_unix_ms: current_timestamp_ms(),
            halted,
            ..Self::default()
        };
        for job in jobs {
            match job.status {
                JobStatus::Queued => snapshot.queued += 1,
                JobStatus::Processing => snapshot.processing += 1,
                JobStatus::Done => snapshot.done += 1,
                JobStatus::Failed => snapshot.failed += 1,
            }
        }
        snapshot
    }

    pub fn total(&self) -> usize {
        self.queued + self.processing + self.done + self.failed
    }
}
