//! Shell scripts standing in for ffmpeg and ffprobe in tests.

use std::fs;
use std::path::{Path, PathBuf};

/// Write an executable `/bin/sh` script and return its path.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// ffprobe that reports a 1280x720 h264 stream of `duration` seconds.
#[cfg(unix)]
pub fn fake_ffprobe(dir: &Path, duration: f64) -> PathBuf {
    let body = format!(
        r#"cat <<'JSON'
{{"streams": [{{"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720, "r_frame_rate": "30/1"}}],
 "format": {{"duration": "{}", "bit_rate": "800000"}}}}
JSON
"#,
        duration
    );
    write_script(dir, "fake-ffprobe", &body)
}

/// ffmpeg that reports 0.5s and 1.0s of progress, then writes its last
/// argument. Any invocation mentioning `fail-me` exits 1 instead.
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    write_ffmpeg(dir, "fake-ffmpeg", "0")
}

/// Like [`fake_ffmpeg`] but each pass takes at least `secs`.
#[cfg(unix)]
pub fn slow_ffmpeg(dir: &Path, secs: &str) -> PathBuf {
    write_ffmpeg(dir, "slow-ffmpeg", secs)
}

#[cfg(unix)]
fn write_ffmpeg(dir: &Path, name: &str, delay: &str) -> PathBuf {
    let body = format!(
        r#"for last; do :; done
case "$*" in
  *fail-me*) echo "fail-me.mp4: Invalid data found when processing input" >&2; exit 1 ;;
esac
echo "frame=1"
echo "out_time_ms=500000"
echo "progress=continue"
sleep {delay}
echo "out_time_ms=1000000"
echo "progress=end"
printf 'encoded' > "$last"
"#,
        delay = delay
    );
    write_script(dir, name, &body)
}
