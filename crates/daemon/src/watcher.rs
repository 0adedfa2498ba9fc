//! Inbox watcher.
//!
//! Create and rename-into notifications from `notify` are filtered by
//! extension, held for a grace period, and then delivered once per path on
//! an unbounded channel. A path that has been delivered is never delivered
//! again while this watcher exists.

use crate::scan::{is_candidate, scan_inbox};
use crate::stability::{await_arrival, Arrival};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Error starting the watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("inbox {0} does not exist")]
    MissingInbox(PathBuf),

    #[error("file system notification error: {0}")]
    Notify(#[from] notify::Error),

    #[error("watcher is already running")]
    AlreadyStarted,
}

#[derive(Debug, Default)]
struct Paths {
    /// Delivered paths. Never pruned.
    seen: HashSet<PathBuf>,
    /// Paths inside their grace period.
    pending: HashSet<PathBuf>,
}

/// Dedup bookkeeping shared by the event task and the debounce tasks.
#[derive(Debug, Default)]
struct ArrivalRegistry {
    paths: Mutex<Paths>,
    closed: AtomicBool,
}

impl ArrivalRegistry {
    /// Claim `path` for a grace period. False when it was already delivered
    /// or is already waiting.
    fn begin(&self, path: &Path) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let mut paths = self.paths.lock();
        if paths.seen.contains(path) || paths.pending.contains(path) {
            return false;
        }
        paths.pending.insert(path.to_path_buf())
    }

    /// End the grace period. Returns whether the path should be delivered.
    fn finish(&self, path: &Path, arrived: bool) -> bool {
        let mut paths = self.paths.lock();
        paths.pending.remove(path);
        if !arrived || self.closed.load(Ordering::SeqCst) {
            return false;
        }
        paths.seen.insert(path.to_path_buf())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn open(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }
}

/// Paths an event reports as newly present in the watched directory.
pub fn arrived_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) => event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => event.paths,
        // [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.into_iter().skip(1).collect()
        }
        _ => Vec::new(),
    }
}

/// Watches one inbox directory.
pub struct Watcher {
    inbox: PathBuf,
    grace: Duration,
    registry: Arc<ArrivalRegistry>,
    arrivals: mpsc::UnboundedSender<PathBuf>,
    fs_watcher: Option<RecommendedWatcher>,
    event_task: Option<JoinHandle<()>>,
}

impl Watcher {
    /// Create a stopped watcher and the receiving end of its arrivals.
    pub fn new(inbox: PathBuf, grace: Duration) -> (Self, mpsc::UnboundedReceiver<PathBuf>) {
        let (arrivals, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            inbox,
            grace,
            registry: Arc::new(ArrivalRegistry::default()),
            arrivals,
            fs_watcher: None,
            event_task: None,
        };
        (watcher, rx)
    }

    pub fn inbox(&self) -> &Path {
        &self.inbox
    }

    pub fn is_running(&self) -> bool {
        self.fs_watcher.is_some()
    }

    /// Subscribe to the inbox. Must be called inside a tokio runtime.
    pub fn start(&mut self) -> Result<(), WatchError> {
        if self.is_running() {
            return Err(WatchError::AlreadyStarted);
        }
        if !self.inbox.is_dir() {
            return Err(WatchError::MissingInbox(self.inbox.clone()));
        }

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Event>();
        let mut fs_watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    let _ = raw_tx.send(event);
                }
                Err(e) => log::warn!("watch error: {}", e),
            }
        })?;
        fs_watcher.watch(&self.inbox, RecursiveMode::NonRecursive)?;

        self.registry.open();
        let offer = self.offerer();
        self.event_task = Some(tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                for path in arrived_paths(event) {
                    offer.offer(vec![path]);
                }
            }
        }));
        self.fs_watcher = Some(fs_watcher);

        log::info!("watching {}", self.inbox.display());
        Ok(())
    }

    /// Feed files already in the inbox through the arrival path, in name
    /// order. Returns how many were accepted.
    pub fn scan_existing(&self) -> usize {
        let found = scan_inbox(&self.inbox);
        log::debug!("inbox scan found {} file(s)", found.len());
        self.offerer().offer(found)
    }

    /// Offer a single path as if it had just appeared.
    pub fn offer(&self, path: PathBuf) -> bool {
        self.offerer().offer(vec![path]) == 1
    }

    /// Drop the subscription and suppress arrivals still in their grace
    /// period. Delivered paths stay deduplicated if the watcher is restarted.
    pub async fn stop(&mut self) {
        self.registry.close();
        self.fs_watcher = None;
        if let Some(task) = self.event_task.take() {
            task.abort();
            let _ = task.await;
        }
        log::info!("stopped watching {}", self.inbox.display());
    }

    fn offerer(&self) -> Offerer {
        Offerer {
            grace: self.grace,
            registry: Arc::clone(&self.registry),
            arrivals: self.arrivals.clone(),
        }
    }
}

/// The part of the watcher debounce tasks need.
#[derive(Clone)]
struct Offerer {
    grace: Duration,
    registry: Arc<ArrivalRegistry>,
    arrivals: mpsc::UnboundedSender<PathBuf>,
}

impl Offerer {
    /// Claim the candidates among `paths` and deliver the survivors after one
    /// shared grace period, preserving order.
    fn offer(&self, paths: Vec<PathBuf>) -> usize {
        let claimed: Vec<PathBuf> = paths
            .into_iter()
            .filter(|path| {
                if !is_candidate(path) {
                    log::debug!("ignoring {}", path.display());
                    return false;
                }
                self.registry.begin(path)
            })
            .collect();

        let count = claimed.len();
        if count == 0 {
            return 0;
        }

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.grace).await;
            for path in claimed {
                let arrived = matches!(
                    await_arrival(&path, Duration::ZERO).await,
                    Arrival::Arrived { .. }
                );
                if !arrived {
                    log::debug!("{} vanished during grace period", path.display());
                }
                if this.registry.finish(&path, arrived) {
                    let _ = this.arrivals.send(path);
                }
            }
        });
        count
    }
}
