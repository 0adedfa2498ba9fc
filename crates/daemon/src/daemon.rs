//! Daemon startup and main loop
//!
//! Wires the watcher to the scheduler, starts the event consumers (logger,
//! history writer, optional status server) and shuts everything down in
//! order when the shutdown future resolves.

use crate::config::{Config, ConfigError};
use crate::events::spawn_event_logger;
use crate::folders::{FolderError, WatchFolders};
use crate::history::spawn_history_writer;
use crate::scheduler::{Scheduler, SchedulerSettings, EVENT_CAPACITY};
use crate::startup::{run_startup_checks, StartupError};
use crate::status_server::{run_status_server, ServerError};
use crate::supervisor::Supervisor;
use crate::watcher::{WatchError, Watcher};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Watch folders could not be created
    #[error("Folder error: {0}")]
    Folder(#[from] FolderError),

    /// Inbox subscription failed
    #[error("Watcher error: {0}")]
    Watch(#[from] WatchError),

    /// Server error
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// `presets.default` names no registered preset
    #[error("Unknown default preset '{0}'")]
    UnknownPreset(String),
}

/// Daemon state containing all runtime components
pub struct Daemon {
    /// Configuration loaded from file and environment
    pub config: Config,
    pub folders: WatchFolders,
    supervisor: Arc<Supervisor>,
    scheduler: Scheduler,
}

impl Daemon {
    /// Check the tools, create the folders and build the pipeline.
    pub async fn new(config: Config) -> Result<Self, DaemonError> {
        run_startup_checks(&config)?;
        Self::new_without_checks(config)
    }

    /// Like [`Daemon::new`] without running the tools first.
    ///
    /// Useful for testing and for `--skip-checks`.
    pub fn new_without_checks(config: Config) -> Result<Self, DaemonError> {
        let settings = SchedulerSettings::from_config(&config)
            .map_err(|_| DaemonError::UnknownPreset(config.presets.default.clone()))?;
        let folders = WatchFolders::create(&config.folders.resolved_watch_base())?;
        let supervisor = Arc::new(Supervisor::new(&config.tools));
        let scheduler = Scheduler::new(
            Arc::clone(&supervisor),
            folders.clone(),
            settings,
            EVENT_CAPACITY,
        );

        Ok(Self {
            config,
            folders,
            supervisor,
            scheduler,
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Spawn the status server when it is enabled.
    pub fn start_status_server(&self) -> Option<JoinHandle<()>> {
        if !self.config.status.enabled {
            return None;
        }
        let scheduler = self.scheduler.clone();
        let bind = self.config.status.bind.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = run_status_server(scheduler, &bind).await {
                log::error!("status server error: {}", e);
            }
        }))
    }

    /// Watch the inbox until `shutdown` resolves.
    ///
    /// On shutdown the watcher is stopped first, then the scheduler is halted
    /// and the job in flight is allowed to finish. Queued jobs are left in
    /// the inbox and picked up by the next session's scan.
    pub async fn run<F>(self, shutdown: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()>,
    {
        let logger = spawn_event_logger(self.scheduler.subscribe());
        let history = self.config.history.enabled.then(|| {
            let path = self.config.history.resolved_path(&self.config.folders);
            log::debug!("recording history in {}", path.display());
            spawn_history_writer(
                self.scheduler.subscribe(),
                path,
                self.config.history.max_entries,
            )
        });
        let server = self.start_status_server();

        let grace = Duration::from_millis(self.config.watcher.debounce_ms);
        let (mut watcher, mut arrivals) = Watcher::new(self.folders.inbox.clone(), grace);
        watcher.start()?;
        if self.config.watcher.scan_existing {
            let found = watcher.scan_existing();
            if found > 0 {
                log::info!("found {} file(s) already in the inbox", found);
            }
        }
        log::info!(
            "default preset {}, output to {}",
            self.scheduler.settings().default_preset.name,
            self.folders.done.display()
        );

        tokio::pin!(shutdown);
        'intake: loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(path) = arrivals.recv() => {
                    // Enqueueing probes the file, which must not hold up shutdown.
                    tokio::select! {
                        _ = &mut shutdown => break 'intake,
                        queued = self.scheduler.enqueue(path) => {
                            if let Err(e) = queued {
                                log::warn!("{}", e);
                            }
                        }
                    }
                }
            }
        }

        log::info!("shutting down");
        watcher.stop().await;
        self.scheduler.halt();
        if self.scheduler.is_busy() {
            log::info!("waiting for the current job to finish");
        }
        self.scheduler.wait_idle().await;

        if let Some(server) = server {
            server.abort();
            let _ = server.await;
        }

        // Consumers stop once the last scheduler handle is gone.
        drop(self.scheduler);
        if let Some(history) = history {
            let _ = history.await;
        }
        let _ = logger.await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::load_history;
    use crate::testing::{fake_ffmpeg, fake_ffprobe, write_script};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::sync::oneshot;
    use tokio::time::{sleep, timeout, Instant};

    fn create_test_config(temp: &Path) -> Config {
        let tools = temp.join("tools");
        fs::create_dir_all(&tools).unwrap();

        let mut config = Config::default();
        config.folders.watch_base = temp.join("clips");
        config.presets.default = "tiny".to_string();
        config.watcher.debounce_ms = 50;
        config.tools.ffmpeg_bin = fake_ffmpeg(&tools);
        config.tools.ffprobe_bin = fake_ffprobe(&tools, 2.0);
        config.tools.progress_interval_ms = 0;
        config.history.path = Some(temp.join("history.json"));
        config
    }

    async fn wait_for(path: &Path) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !path.exists() {
            assert!(Instant::now() < deadline, "{} never appeared", path.display());
            sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_daemon_initialization_without_checks() {
        let temp = TempDir::new().unwrap();
        let config = create_test_config(temp.path());
        let daemon = Daemon::new_without_checks(config.clone()).unwrap();

        assert_eq!(daemon.config, config);
        assert!(daemon.folders.inbox.is_dir());
        assert!(daemon.folders.processing.is_dir());
        assert!(daemon.folders.done.is_dir());
        assert_eq!(daemon.scheduler().settings().default_preset.name, "tiny");
        assert!(daemon.start_status_server().is_none());
    }

    #[tokio::test]
    async fn test_unknown_default_preset() {
        let temp = TempDir::new().unwrap();
        let mut config = create_test_config(temp.path());
        config.presets.default = "ultra".to_string();

        let err = Daemon::new_without_checks(config).err().unwrap();
        assert!(matches!(err, DaemonError::UnknownPreset(name) if name == "ultra"));
    }

    #[tokio::test]
    async fn test_startup_checks_reject_missing_tools() {
        let temp = TempDir::new().unwrap();
        let mut config = create_test_config(temp.path());
        config.tools.ffmpeg_bin = temp.path().join("no-ffmpeg");

        let err = Daemon::new(config).await.err().unwrap();
        assert!(matches!(err, DaemonError::Startup(_)));
    }

    #[tokio::test]
    async fn test_run_processes_existing_and_new_files() {
        let temp = TempDir::new().unwrap();
        let config = create_test_config(temp.path());
        let history_path = temp.path().join("history.json");
        let daemon = Daemon::new_without_checks(config).unwrap();
        let folders = daemon.folders.clone();

        fs::write(folders.inbox.join("early-web.mp4"), b"early video").unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(daemon.run(async move {
            let _ = stop_rx.await;
        }));

        wait_for(&folders.done.join("early-web-out.mp4")).await;

        fs::write(folders.inbox.join("late-loop-1.mov"), b"late video").unwrap();
        wait_for(&folders.done.join("late-loop.mp4")).await;

        stop_tx.send(()).unwrap();
        timeout(Duration::from_secs(10), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let history = load_history(&history_path);
        assert_eq!(history.len(), 2);
        assert!(history[0].output_path.ends_with("late-loop.mp4"));
        assert_eq!(history[1].preset, "web");
        assert_eq!(fs::read_dir(&folders.inbox).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_is_not_held_up_by_a_slow_probe() {
        let temp = TempDir::new().unwrap();
        let mut config = create_test_config(temp.path());
        config.tools.ffprobe_bin =
            write_script(&temp.path().join("tools"), "hanging-ffprobe", "sleep 30\n");
        config.tools.probe_timeout_secs = 30;
        let daemon = Daemon::new_without_checks(config).unwrap();
        let inbox = daemon.folders.inbox.clone();
        fs::write(inbox.join("stuck.mp4"), b"video").unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(daemon.run(async move {
            let _ = stop_rx.await;
        }));

        // Past the grace period, so the probe is in flight.
        sleep(Duration::from_millis(500)).await;
        stop_tx.send(()).unwrap();
        timeout(Duration::from_secs(5), run)
            .await
            .expect("shutdown waited for the probe")
            .unwrap()
            .unwrap();
        assert!(inbox.join("stuck.mp4").exists());
    }
}
