//! Supervision of the external media tools.
//!
//! The [`Supervisor`] owns an ffmpeg child for the duration of one
//! [`Supervisor::transcode`] call. It streams `-progress` output into a
//! fraction, keeps the tail of stderr for error reports, and keeps no state
//! between calls.

use crate::encode::{
    build_passes, fraction, parse_out_time, EncodePass, EncodePlan, ProgressThrottle,
    ProgressWindow, TranscodeParams,
};
use crate::probe::{probe_file, ProbeError, ProbeInfo};
use clipper_config::ToolsConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Lines of stderr kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Error type for transcode operations
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// ffmpeg could not be started
    #[error("failed to launch ffmpeg: {0}")]
    Spawn(std::io::Error),

    /// ffmpeg exited with non-zero status
    #[error("ffmpeg exited with code {exit_code}: {stderr_tail}")]
    Failed { exit_code: i32, stderr_tail: String },

    /// ffmpeg was killed by a signal
    #[error("ffmpeg was terminated by a signal: {stderr_tail}")]
    Terminated { stderr_tail: String },

    /// IO error reading progress or output sizes
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a successful transcode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscodeResult {
    pub output_path: PathBuf,
    pub original_size: u64,
    pub compressed_size: u64,
    pub reduction_percent: f64,
}

impl TranscodeResult {
    pub fn new(output_path: PathBuf, original_size: u64, compressed_size: u64) -> Self {
        Self {
            output_path,
            original_size,
            compressed_size,
            reduction_percent: reduction_percent(original_size, compressed_size),
        }
    }
}

/// `(1 - compressed / original) * 100`, zero for an empty original.
pub fn reduction_percent(original: u64, compressed: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (1.0 - compressed as f64 / original as f64) * 100.0
}

/// Launches ffprobe and ffmpeg with the configured binaries and limits.
#[derive(Debug, Clone)]
pub struct Supervisor {
    ffmpeg_bin: PathBuf,
    ffprobe_bin: PathBuf,
    probe_timeout: Duration,
    progress_interval: Duration,
}

impl Supervisor {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            ffmpeg_bin: tools.ffmpeg_bin.clone(),
            ffprobe_bin: tools.ffprobe_bin.clone(),
            probe_timeout: Duration::from_secs(tools.probe_timeout_secs),
            progress_interval: Duration::from_millis(tools.progress_interval_ms),
        }
    }

    pub fn ffmpeg_bin(&self) -> &Path {
        &self.ffmpeg_bin
    }

    pub fn ffprobe_bin(&self) -> &Path {
        &self.ffprobe_bin
    }

    /// Probe a file with the configured timeout.
    pub async fn probe(&self, path: &Path) -> Result<ProbeInfo, ProbeError> {
        probe_file(&self.ffprobe_bin, path, self.probe_timeout).await
    }

    /// Run every pass for `params`, reporting overall progress in [0, 1].
    ///
    /// `duration` is the probed length of the input. When absent the input is
    /// probed once more; if that also fails the transcode still runs but no
    /// intermediate progress is reported. The GIF palette is removed whether
    /// or not the passes succeed.
    pub async fn transcode<F>(
        &self,
        params: &TranscodeParams,
        duration: Option<f64>,
        mut on_progress: F,
    ) -> Result<TranscodeResult, TranscodeError>
    where
        F: FnMut(f64) + Send,
    {
        let duration = match duration {
            Some(duration) => Some(duration),
            None => self.probe(&params.input_path).await.ok().map(|i| i.duration),
        };
        let total = params.trim.span(duration);
        let original_size = tokio::fs::metadata(&params.input_path).await?.len();

        let passes = build_passes(&self.ffmpeg_bin, params);
        let mut throttle = ProgressThrottle::new(self.progress_interval);
        let outcome = self
            .run_passes(passes, total, &mut throttle, &mut on_progress)
            .await;

        if let EncodePlan::Gif { .. } = params.plan {
            let _ = tokio::fs::remove_file(params.palette_path()).await;
        }
        outcome?;

        let compressed_size = tokio::fs::metadata(&params.output_path).await?.len();
        Ok(TranscodeResult::new(
            params.output_path.clone(),
            original_size,
            compressed_size,
        ))
    }

    async fn run_passes<F>(
        &self,
        passes: Vec<EncodePass>,
        total: Option<f64>,
        throttle: &mut ProgressThrottle,
        on_progress: &mut F,
    ) -> Result<(), TranscodeError>
    where
        F: FnMut(f64) + Send,
    {
        for pass in passes {
            log::debug!("running {:?}", pass.command);
            run_pass(pass.command, total, pass.window, throttle, on_progress).await?;
        }
        Ok(())
    }
}

/// Spawn one ffmpeg pass and follow it to exit.
async fn run_pass<F>(
    command: std::process::Command,
    total: Option<f64>,
    window: ProgressWindow,
    throttle: &mut ProgressThrottle,
    on_progress: &mut F,
) -> Result<(), TranscodeError>
where
    F: FnMut(f64) + Send,
{
    let mut cmd = Command::from(command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(TranscodeError::Spawn)?;

    // Drain stderr alongside stdout so a chatty encoder cannot fill the pipe.
    let stderr_task = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        })
    });

    let mut read_error = None;
    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    read_error = Some(e);
                    break;
                }
            };
            let (Some(elapsed), Some(total)) = (parse_out_time(&line), total) else {
                continue;
            };
            if throttle.ready(Instant::now()) {
                on_progress(window.map(fraction(elapsed, total)));
            }
        }
    }

    // An unreadable progress stream ends the pass; the encoder is not left running.
    if read_error.is_some() {
        let _ = child.start_kill();
    }
    let status = child.wait().await?;
    let stderr_tail = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };
    if let Some(e) = read_error {
        return Err(e.into());
    }

    if status.success() {
        Ok(())
    } else {
        match status.code() {
            Some(exit_code) => Err(TranscodeError::Failed {
                exit_code,
                stderr_tail,
            }),
            None => Err(TranscodeError::Terminated { stderr_tail }),
        }
    }
}
