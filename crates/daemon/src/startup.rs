//! Startup checks
//!
//! Verifies that the configured ffmpeg and ffprobe binaries can be run
//! before the watcher starts, so a missing tool is reported once at startup
//! instead of as a failure on every job.

use crate::config::Config;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{tool} not available at {bin}: {reason}")]
    ToolUnavailable {
        tool: &'static str,
        bin: String,
        reason: String,
    },
}

/// Versions reported by the tools that passed the checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolVersions {
    pub ffmpeg: String,
    pub ffprobe: String,
}

/// Extract the version token from `<tool> -version` output.
///
/// Handles release builds (`ffmpeg version 7.1.2 ...`) and git builds
/// (`ffmpeg version n8.0-5-g1234567 ...`). The token is returned lowercased.
pub fn parse_tool_version(version_output: &str, tool: &str) -> Option<String> {
    let marker = format!("{} version", tool.to_lowercase());
    version_output.lines().find_map(|line| {
        let lower = line.to_lowercase();
        let at = lower.find(&marker)?;
        lower[at + marker.len()..]
            .split_whitespace()
            .next()
            .map(str::to_string)
    })
}

/// Run `<bin> -version` and return the reported version.
pub fn check_tool_available(tool: &'static str, bin: &Path) -> Result<String, StartupError> {
    let unavailable = |reason: String| StartupError::ToolUnavailable {
        tool,
        bin: bin.display().to_string(),
        reason,
    };

    let output = Command::new(bin)
        .arg("-version")
        .output()
        .map_err(|e| unavailable(format!("{}; is it installed and in PATH?", e)))?;

    if !output.status.success() {
        return Err(unavailable(format!("-version exited with {}", output.status)));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_tool_version(&stdout, tool).ok_or_else(|| {
        unavailable(format!(
            "unrecognised -version output: {}",
            stdout.lines().next().unwrap_or("(empty)")
        ))
    })
}

/// Check ffmpeg, then ffprobe.
pub fn run_startup_checks(cfg: &Config) -> Result<ToolVersions, StartupError> {
    let ffmpeg = check_tool_available("ffmpeg", &cfg.tools.ffmpeg_bin)?;
    let ffprobe = check_tool_available("ffprobe", &cfg.tools.ffprobe_bin)?;
    log::info!("using ffmpeg {} and ffprobe {}", ffmpeg, ffprobe);
    Ok(ToolVersions { ffmpeg, ffprobe })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::write_script;
    use proptest::prelude::*;
    use tempfile::TempDir;

    // **Feature: clipper, Property 8: Tool version parsing**
    //
    // *For any* version token printed after "<tool> version" on some line of
    // the output, that token is returned unchanged.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_version_token_is_extracted(
            tool in prop_oneof![Just("ffmpeg"), Just("ffprobe")],
            version in "n?[0-9]{1,2}\\.[0-9]{1,2}(\\.[0-9]{1,2})?(-[0-9]{1,3}-g[0-9a-f]{7})?",
            preamble in proptest::collection::vec("[a-z ]{0,20}", 0..3),
        ) {
            let mut output = preamble.join("\n");
            output.push_str(&format!("\n{} version {} Copyright (c) 2000-2025\n", tool, version));
            prop_assert_eq!(parse_tool_version(&output, tool), Some(version));
        }
    }

    #[test]
    fn test_parse_tool_version_release_and_git() {
        assert_eq!(
            parse_tool_version("ffmpeg version 7.1.2 Copyright (c) 2000-2024", "ffmpeg"),
            Some("7.1.2".to_string())
        );
        assert_eq!(
            parse_tool_version(
                "ffprobe version n8.0-5-g1234567 Copyright (c) 2007-2025\nbuilt with gcc",
                "ffprobe"
            ),
            Some("n8.0-5-g1234567".to_string())
        );
    }

    #[test]
    fn test_parse_tool_version_wrong_tool() {
        assert_eq!(parse_tool_version("ffmpeg version 7.1", "ffprobe"), None);
        assert_eq!(parse_tool_version("", "ffmpeg"), None);
    }

    #[test]
    fn test_check_tool_available_with_script() {
        let temp = TempDir::new().unwrap();
        let bin = write_script(
            temp.path(),
            "ffmpeg",
            "echo 'ffmpeg version 7.0.1 Copyright (c) 2000-2024'\n",
        );
        assert_eq!(check_tool_available("ffmpeg", &bin).unwrap(), "7.0.1");
    }

    #[test]
    fn test_check_tool_failing_or_missing() {
        let temp = TempDir::new().unwrap();
        let failing = write_script(temp.path(), "ffprobe", "exit 3\n");
        let err = check_tool_available("ffprobe", &failing).unwrap_err();
        assert!(err.to_string().contains("ffprobe not available"));

        let missing = temp.path().join("does-not-exist");
        assert!(check_tool_available("ffmpeg", &missing).is_err());
    }

    #[test]
    fn test_run_startup_checks_uses_configured_bins() {
        let temp = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.tools.ffmpeg_bin = write_script(temp.path(), "ff", "echo 'ffmpeg version 6.1'\n");
        cfg.tools.ffprobe_bin = write_script(temp.path(), "fp", "echo 'ffprobe version 6.1'\n");

        let versions = run_startup_checks(&cfg).unwrap();
        assert_eq!(versions.ffmpeg, "6.1");
        assert_eq!(versions.ffprobe, "6.1");

        cfg.tools.ffprobe_bin = temp.path().join("missing");
        assert!(run_startup_checks(&cfg).is_err());
    }
}
