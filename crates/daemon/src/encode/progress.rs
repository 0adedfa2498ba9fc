//! Progress extraction from ffmpeg's `-progress pipe:1` stream.
//!
//! ffmpeg prints `key=value` lines; the one that matters is
//! `out_time_ms=<n>`, which despite its name counts microseconds.

use std::time::{Duration, Instant};

const OUT_TIME_KEY: &str = "out_time_ms=";

/// Share of GIF progress given to palette generation.
pub const PALETTE_SHARE: f64 = 0.3;

/// Elapsed output time in seconds from an `out_time_ms=` line.
///
/// Returns `None` for other keys and for `N/A`. Negative values, which ffmpeg
/// emits before the first frame, read as zero.
pub fn parse_out_time(line: &str) -> Option<f64> {
    let value = line.trim().strip_prefix(OUT_TIME_KEY)?;
    let micros: i64 = value.trim().parse().ok()?;
    Some(micros.max(0) as f64 / 1_000_000.0)
}

/// `elapsed / total` clamped to [0, 1]. Zero when the total is not positive.
pub fn fraction(elapsed_secs: f64, total_secs: f64) -> f64 {
    if total_secs <= 0.0 || !total_secs.is_finite() {
        return 0.0;
    }
    (elapsed_secs / total_secs).clamp(0.0, 1.0)
}

/// The slice of overall progress a single pass reports into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressWindow {
    pub start: f64,
    pub end: f64,
}

impl ProgressWindow {
    pub const FULL: ProgressWindow = ProgressWindow {
        start: 0.0,
        end: 1.0,
    };

    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Map a pass-local fraction into the overall range.
    pub fn map(&self, local: f64) -> f64 {
        let mapped = self.start + (self.end - self.start) * local.clamp(0.0, 1.0);
        mapped.max(self.start).min(self.end)
    }
}

/// Limits how often progress reaches observers.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// True when at least `interval` has passed since the last accepted tick.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
