//! ffmpeg command construction and progress extraction

pub mod ffmpeg;
pub mod progress;

pub use ffmpeg::{
    build_passes, format_seconds, gif_filters, scale_filter, EncodePass, EncodePlan,
    TranscodeParams,
};
pub use progress::{fraction, parse_out_time, ProgressThrottle, ProgressWindow, PALETTE_SHARE};

/// Put the child in its own process group so a terminal Ctrl-C aimed at the
/// daemon does not also kill a running encode.
pub fn detach_process_group(cmd: &mut std::process::Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    #[cfg(not(unix))]
    let _ = cmd;
}
