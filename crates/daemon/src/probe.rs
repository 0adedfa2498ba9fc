//! Media probing through ffprobe.
//!
//! Runs `ffprobe -v quiet -print_format json -show_streams -show_format <path>`
//! under a hard timeout and reduces the JSON to a [`ProbeInfo`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::encode::detach_process_group;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe exited with a failure status.
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    /// ffprobe did not finish in time and was killed.
    #[error("ffprobe timed out after {0:?}")]
    TimedOut(Duration),

    /// Output was not valid JSON or lacked a required field.
    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),

    /// IO error launching ffprobe.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Snapshot of a media file taken once at enqueue time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Seconds
    pub duration: f64,
    /// Bits per second, 0 when the container does not report one
    pub bitrate: u64,
    pub codec: String,
    pub fps: f64,
    pub size_bytes: u64,
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
        pub width: Option<u32>,
        pub height: Option<u32>,
        pub r_frame_rate: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub duration: Option<String>,
        pub size: Option<String>,
        pub bit_rate: Option<String>,
    }
}

/// Build the ffprobe invocation for `path`.
pub fn build_probe_command(ffprobe_bin: &Path, path: &Path) -> Command {
    let mut cmd = std::process::Command::new(ffprobe_bin);
    cmd.args([
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_streams",
        "-show_format",
    ])
    .arg(path)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());
    detach_process_group(&mut cmd);

    let mut cmd = Command::from(cmd);
    cmd.kill_on_drop(true);
    cmd
}

/// Probe `path`, killing ffprobe if it runs past `timeout`.
pub async fn probe_file(
    ffprobe_bin: &Path,
    path: &Path,
    timeout: Duration,
) -> Result<ProbeInfo, ProbeError> {
    let mut cmd = build_probe_command(ffprobe_bin, path);
    log::debug!("probing {}", path.display());

    // Dropping the output future on timeout kills the child (kill_on_drop).
    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| ProbeError::TimedOut(timeout))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::FfprobeFailed(format!(
            "ffprobe exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut info = parse_ffprobe_output(&stdout)?;
    info.path = path.to_path_buf();
    if let Ok(metadata) = tokio::fs::metadata(path).await {
        info.size_bytes = metadata.len();
    }
    Ok(info)
}

/// Parse `num/den` or a plain number.
fn parse_frame_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => rate.trim().parse().ok(),
    }
}

/// Parses ffprobe JSON output into a ProbeInfo.
///
/// Requires a video stream with codec and dimensions plus a format duration.
/// The returned `path` is empty; [`probe_file`] fills it in.
pub fn parse_ffprobe_output(json_str: &str) -> Result<ProbeInfo, ProbeError> {
    let ffprobe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let streams = ffprobe.streams.unwrap_or_default();
    let format = ffprobe.format.ok_or_else(|| {
        ProbeError::ParseError("Missing format information in ffprobe output".to_string())
    })?;

    let video = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ProbeError::ParseError("No video stream found".to_string()))?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) => (w, h),
        _ => {
            return Err(ProbeError::ParseError(
                "Video stream has no dimensions".to_string(),
            ))
        }
    };
    let codec = video
        .codec_name
        .clone()
        .ok_or_else(|| ProbeError::ParseError("Video stream has no codec name".to_string()))?;

    let duration = format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| ProbeError::ParseError("Missing format duration".to_string()))?;

    let fps = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);

    let bitrate = format
        .bit_rate
        .as_deref()
        .and_then(|b| b.parse::<u64>().ok())
        .unwrap_or(0);

    let size_bytes = format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(ProbeInfo {
        path: PathBuf::new(),
        width,
        height,
        duration,
        bitrate,
        codec,
        fps,
        size_bytes,
    })
}
