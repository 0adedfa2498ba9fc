//! Sequential job scheduler.
//!
//! The scheduler owns the session's job arena and a FIFO queue behind one
//! mutex. A single worker task drains the queue, one transcode at a time.
//! The worker is spawned by the first `enqueue` that finds none running and
//! exits as soon as the queue is empty, so an idle scheduler costs nothing.
//!
//! Every transition is published as a [`JobEvent`] while the lock is held,
//! which keeps the event stream in the same order as the state changes.
//! Failures of any stage end that job only.

use crate::convention::{self, Convention};
use crate::encode::{EncodePlan, TranscodeParams};
use crate::events::JobEvent;
use crate::folders::WatchFolders;
use crate::jobs::{Job, JobError, JobId};
use crate::presets::{self, Preset};
use crate::status::StatusSnapshot;
use crate::supervisor::{Supervisor, TranscodeResult};
use clipper_config::{Config, GifConfig, LoopConfig};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Notify};

/// Default capacity of the event channel.
pub const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler is halted, not accepting {0}")]
    Halted(PathBuf),

    #[error("unknown preset '{0}'")]
    UnknownPreset(String),
}

/// Per-session processing choices.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Used when a filename names no preset.
    pub default_preset: &'static Preset,
    pub gif: GifConfig,
    pub loop_: LoopConfig,
    /// Remove the source from `processing/` after a successful transcode.
    pub delete_source: bool,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Result<Self, SchedulerError> {
        let default_preset = presets::lookup(&config.presets.default)
            .ok_or_else(|| SchedulerError::UnknownPreset(config.presets.default.clone()))?;
        Ok(Self {
            default_preset,
            gif: config.gif.clone(),
            loop_: config.loop_.clone(),
            delete_source: config.behavior.delete_source,
        })
    }
}

#[derive(Debug, Default)]
struct State {
    /// Arena indexed by `JobId`. Jobs are never removed.
    jobs: Vec<Job>,
    queue: VecDeque<JobId>,
    worker_running: bool,
    halted: bool,
}

struct Inner {
    state: Mutex<State>,
    events: broadcast::Sender<JobEvent>,
    supervisor: Arc<Supervisor>,
    folders: WatchFolders,
    settings: SchedulerSettings,
    idle: Notify,
}

impl Inner {
    /// Mutate a job and publish the event built from its new state.
    fn transition<F, E>(&self, id: JobId, change: F, event: E) -> Option<Job>
    where
        F: FnOnce(&mut Job),
        E: FnOnce(Job) -> JobEvent,
    {
        let mut state = self.state.lock();
        let job = state.jobs.get_mut(id.0)?;
        change(job);
        let snapshot = job.clone();
        let _ = self.events.send(event(snapshot.clone()));
        Some(snapshot)
    }

    fn job(&self, id: JobId) -> Option<Job> {
        self.state.lock().jobs.get(id.0).cloned()
    }

    fn report_progress(&self, id: JobId, fraction: f64) {
        self.transition(id, |job| job.set_progress(fraction), JobEvent::Updated);
    }

    fn finish(&self, id: JobId, outcome: Result<TranscodeResult, JobError>) {
        self.transition(
            id,
            |job| match outcome {
                Ok(result) => job.complete(result),
                Err(e) => job.fail(e.to_string()),
            },
            JobEvent::Done,
        );
    }

    /// Pop the next job, or mark the worker stopped when there is none.
    fn next_job(&self) -> Option<JobId> {
        let mut state = self.state.lock();
        let next = if state.halted {
            None
        } else {
            state.queue.pop_front()
        };
        if next.is_none() {
            state.worker_running = false;
        }
        next
    }
}

/// Handle to the job pipeline. Clones share the same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        supervisor: Arc<Supervisor>,
        folders: WatchFolders,
        settings: SchedulerSettings,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                events,
                supervisor,
                folders,
                settings,
                idle: Notify::new(),
            }),
        }
    }

    /// A new receiver for every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    pub fn folders(&self) -> &WatchFolders {
        &self.inner.folders
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.inner.settings
    }

    /// Create a queued job for `path` and make sure a worker is running.
    ///
    /// The filename convention is parsed here; an unparsable name falls back
    /// to standard compression with the default preset. The probe is best
    /// effort and a failure only leaves the job without metadata.
    pub async fn enqueue(&self, path: PathBuf) -> Result<JobId, SchedulerError> {
        if self.is_halted() {
            return Err(SchedulerError::Halted(path));
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let convention = match convention::parse(&filename) {
            Ok(convention) => convention,
            Err(e) => {
                log::warn!(
                    "{}: {}, using standard compression",
                    filename,
                    JobError::from(e)
                );
                Convention::fallback(&filename)
            }
        };
        let preset = convention.preset.unwrap_or(self.inner.settings.default_preset);
        let output_name = convention.output_name(preset);

        let probe = match self.inner.supervisor.probe(&path).await {
            Ok(info) => Some(info),
            Err(e) => {
                log::warn!("{}: {}", filename, JobError::from(e));
                None
            }
        };

        let (id, spawn) = {
            let mut state = self.inner.state.lock();
            if state.halted {
                return Err(SchedulerError::Halted(path));
            }
            let id = JobId(state.jobs.len());
            let job = Job::new(
                id,
                path,
                preset,
                convention.mode(),
                convention.trim,
                output_name,
                probe,
            );
            state.jobs.push(job.clone());
            state.queue.push_back(id);
            let _ = self.inner.events.send(JobEvent::Added(job));

            let spawn = !state.worker_running;
            state.worker_running = true;
            (id, spawn)
        };

        if spawn {
            tokio::spawn(run_worker(Arc::clone(&self.inner)));
        }
        Ok(id)
    }

    /// Snapshot of every job in arrival order.
    pub fn jobs(&self) -> Vec<Job> {
        self.inner.state.lock().jobs.clone()
    }

    pub fn job(&self, id: JobId) -> Option<Job> {
        self.inner.job(id)
    }

    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn status(&self) -> StatusSnapshot {
        let state = self.inner.state.lock();
        StatusSnapshot::from_jobs(&state.jobs, state.halted)
    }

    /// Stop accepting and starting jobs. The job in flight runs to completion;
    /// queued jobs stay queued.
    pub fn halt(&self) {
        let mut state = self.inner.state.lock();
        if !state.halted {
            state.halted = true;
            log::info!("scheduler halted with {} job(s) queued", state.queue.len());
        }
    }

    pub fn is_halted(&self) -> bool {
        self.inner.state.lock().halted
    }

    pub fn is_busy(&self) -> bool {
        self.inner.state.lock().worker_running
    }

    /// Resolve once no worker is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_busy() {
                return;
            }
            notified.await;
        }
    }
}

async fn run_worker(inner: Arc<Inner>) {
    while let Some(id) = inner.next_job() {
        let job_inner = Arc::clone(&inner);
        let handle = tokio::spawn(async move { process_job(&job_inner, id).await });
        if let Err(e) = handle.await {
            // The job task panicked before it could record an outcome.
            inner.transition(
                id,
                |job| job.fail(format!("internal error: {}", e)),
                JobEvent::Done,
            );
        }
    }
    inner.idle.notify_waiters();
}

/// Move the source into `processing/`, then mark the job processing and run it.
async fn process_job(inner: &Arc<Inner>, id: JobId) {
    let Some(queued) = inner.job(id) else {
        return;
    };
    let outcome = match inner.folders.move_to_processing(&queued.input_path) {
        Ok(moved) => {
            let started = inner.transition(
                id,
                |job| {
                    job.input_path = moved;
                    job.start_processing();
                },
                JobEvent::Updated,
            );
            let Some(job) = started else {
                return;
            };
            run_job(inner, job).await
        }
        Err(e) => Err(JobError::from(e)),
    };
    inner.finish(id, outcome);
}

async fn run_job(inner: &Arc<Inner>, job: Job) -> Result<TranscodeResult, JobError> {
    let moved = job.input_path.clone();
    let settings = &inner.settings;
    let plan = EncodePlan::for_mode(job.mode, job.preset, &settings.gif, &settings.loop_);
    let params = TranscodeParams::new(
        moved.clone(),
        inner.folders.output_path(&job.output_name),
        plan,
        job.trim,
    );
    let duration = job.probe.as_ref().map(|info| info.duration);

    let progress = Arc::clone(inner);
    let id = job.id;
    let result = inner
        .supervisor
        .transcode(&params, duration, move |fraction| {
            progress.report_progress(id, fraction)
        })
        .await?;

    if settings.delete_source {
        if let Err(e) = inner.folders.cleanup(&moved) {
            log::warn!("could not remove {}: {}", moved.display(), e);
        }
    }
    Ok(result)
}
