//! Clipper watch-folder pipeline
//!
//! Files dropped into `<base>/inbox` are classified by their filename
//! (preset, gif or loop, optional trim), queued, and transcoded one at a time
//! by ffmpeg into `<base>/done`.

pub mod convention;
pub mod daemon;
pub mod encode;
pub mod events;
pub mod folders;
pub mod history;
pub mod jobs;
pub mod presets;
pub mod probe;
pub mod scan;
pub mod scheduler;
pub mod stability;
pub mod startup;
pub mod status;
pub mod status_server;
pub mod supervisor;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use clipper_config as config;
pub use clipper_config::Config;
pub use convention::{parse, parse_time, Convention, ParseError, ProcessingMode, TrimWindow};
pub use daemon::{Daemon, DaemonError};
pub use encode::{EncodePlan, TranscodeParams};
pub use events::JobEvent;
pub use folders::{FolderError, RenameError, WatchFolders};
pub use history::{load_history, HistoryEntry, HistoryError};
pub use jobs::{Job, JobError, JobId, JobStatus};
pub use presets::Preset;
pub use probe::{ProbeError, ProbeInfo};
pub use scheduler::{Scheduler, SchedulerError, SchedulerSettings};
pub use startup::{run_startup_checks, StartupError};
pub use status::StatusSnapshot;
pub use status_server::{create_status_router, run_status_server, ServerError};
pub use supervisor::{Supervisor, TranscodeError, TranscodeResult};
pub use watcher::{WatchError, Watcher};
