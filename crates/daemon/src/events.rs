//! Job transition events.
//!
//! The scheduler publishes a [`JobEvent`] carrying a snapshot of the job on
//! every transition. Each consumer (logger, history writer, the CLI's
//! progress line) holds its own broadcast receiver.

use crate::jobs::{Job, JobStatus};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// A job transition, with the job as it was right after it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "job", rename_all = "snake_case")]
pub enum JobEvent {
    /// Job created in `queued`.
    Added(Job),
    /// Job started processing or reported progress.
    Updated(Job),
    /// Job reached `done` or `failed`.
    Done(Job),
}

impl JobEvent {
    pub fn job(&self) -> &Job {
        match self {
            JobEvent::Added(job) | JobEvent::Updated(job) | JobEvent::Done(job) => job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            JobEvent::Added(job) | JobEvent::Updated(job) | JobEvent::Done(job) => job,
        }
    }
}

/// Log every transition. Progress ticks go to `debug`.
pub fn spawn_event_logger(mut events: broadcast::Receiver<JobEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("event logger fell behind, skipped {} event(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &JobEvent) {
    match event {
        JobEvent::Added(job) => log::info!(
            "job {} queued: {} ({}, preset {})",
            job.id,
            job.file_name(),
            job.mode,
            job.preset.name
        ),
        JobEvent::Updated(job) if job.status == JobStatus::Processing && job.progress == 0.0 => {
            log::info!("job {} processing: {}", job.id, job.file_name())
        }
        JobEvent::Updated(job) => {
            log::debug!("job {} at {:.0}%", job.id, job.progress * 100.0)
        }
        JobEvent::Done(job) => match (&job.result, &job.error) {
            (Some(result), _) => log::info!(
                "job {} done: {} ({} -> {} bytes, {:.1}% smaller)",
                job.id,
                result.output_path.display(),
                result.original_size,
                result.compressed_size,
                result.reduction_percent
            ),
            (None, error) => log::warn!(
                "job {} failed: {}",
                job.id,
                error.as_deref().unwrap_or("unknown error")
            ),
        },
    }
}
