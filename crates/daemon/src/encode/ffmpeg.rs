//! ffmpeg invocations for standard compression, silent loops and GIFs.

use crate::convention::{ProcessingMode, TrimWindow};
use crate::encode::detach_process_group;
use crate::encode::progress::{ProgressWindow, PALETTE_SHARE};
use crate::presets::Preset;
use clipper_config::{GifConfig, LoopConfig};
use std::path::{Path, PathBuf};
use std::process::Command;

/// What the encoder produces, resolved from the processing mode.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodePlan {
    /// H.264 + AAC at a preset's scale and quality
    Standard {
        scale: f64,
        crf: u32,
        audio_bitrate: String,
    },
    /// Silent H.264 with fast-start
    Loop { scale: f64, crf: u32 },
    /// Two-pass palette GIF
    Gif { fps: u32, width: u32 },
}

impl EncodePlan {
    pub fn for_mode(
        mode: ProcessingMode,
        preset: &Preset,
        gif: &GifConfig,
        loop_: &LoopConfig,
    ) -> Self {
        match mode {
            ProcessingMode::Standard => EncodePlan::Standard {
                scale: preset.scale,
                crf: preset.crf,
                audio_bitrate: preset.audio_bitrate.to_string(),
            },
            ProcessingMode::Loop => EncodePlan::Loop {
                scale: loop_.scale,
                crf: loop_.crf,
            },
            ProcessingMode::Gif => EncodePlan::Gif {
                fps: gif.fps,
                width: gif.width,
            },
        }
    }

    pub fn mode(&self) -> ProcessingMode {
        match self {
            EncodePlan::Standard { .. } => ProcessingMode::Standard,
            EncodePlan::Loop { .. } => ProcessingMode::Loop,
            EncodePlan::Gif { .. } => ProcessingMode::Gif,
        }
    }
}

/// Everything one transcode call needs.
#[derive(Debug, Clone)]
pub struct TranscodeParams {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub plan: EncodePlan,
    pub trim: TrimWindow,
}

impl TranscodeParams {
    pub fn new(
        input_path: PathBuf,
        output_path: PathBuf,
        plan: EncodePlan,
        trim: TrimWindow,
    ) -> Self {
        Self {
            input_path,
            output_path,
            plan,
            trim,
        }
    }

    /// Scratch palette beside the output: `.<stem>_palette.png`
    pub fn palette_path(&self) -> PathBuf {
        let stem = self
            .output_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.output_path
            .with_file_name(format!(".{}_palette.png", stem))
    }
}

/// One ffmpeg invocation and the share of overall progress it reports.
#[derive(Debug)]
pub struct EncodePass {
    pub command: Command,
    pub window: ProgressWindow,
}

/// Seconds without a trailing `.0`.
pub fn format_seconds(secs: f64) -> String {
    format!("{}", secs)
}

/// Even-dimension scale filter, `None` at full size.
pub fn scale_filter(scale: f64) -> Option<String> {
    if (scale - 1.0).abs() < f64::EPSILON {
        return None;
    }
    Some(format!(
        "scale=trunc(iw*{s}/2)*2:trunc(ih*{s}/2)*2",
        s = scale
    ))
}

pub fn gif_filters(fps: u32, width: u32) -> String {
    format!("fps={},scale={}:-1:flags=lanczos", fps, width)
}

fn base_command(ffmpeg_bin: &Path) -> Command {
    let mut cmd = Command::new(ffmpeg_bin);
    detach_process_group(&mut cmd);
    cmd
}

/// Input seek goes before `-i`.
fn push_seek(cmd: &mut Command, trim: &TrimWindow) {
    if let Some(start) = trim.start {
        cmd.arg("-ss").arg(format_seconds(start));
    }
}

/// Duration limit goes after the inputs: `-t` when seeking, otherwise `-to`.
fn push_limit(cmd: &mut Command, trim: &TrimWindow) {
    match (trim.start, trim.end) {
        (Some(start), Some(end)) => {
            cmd.arg("-t").arg(format_seconds(end - start));
        }
        (None, Some(end)) => {
            cmd.arg("-to").arg(format_seconds(end));
        }
        _ => {}
    }
}

/// Machine-readable progress on stdout, then overwrite the target.
fn push_progress_and_output(cmd: &mut Command, output: &Path) {
    cmd.args(["-progress", "pipe:1", "-nostats", "-y"]);
    cmd.arg(output);
}

fn h264_command(ffmpeg_bin: &Path, params: &TranscodeParams, scale: f64, crf: u32) -> Command {
    let mut cmd = base_command(ffmpeg_bin);

    push_seek(&mut cmd, &params.trim);
    cmd.arg("-i").arg(&params.input_path);
    push_limit(&mut cmd, &params.trim);

    if let Some(filter) = scale_filter(scale) {
        cmd.arg("-vf").arg(filter);
    }

    // yuv420p keeps the output playable everywhere
    cmd.args(["-c:v", "libx264", "-pix_fmt", "yuv420p"]);
    cmd.arg("-crf").arg(crf.to_string());
    cmd.args(["-preset", "medium"]);
    cmd
}

/// Build the ffmpeg passes for a transcode.
///
/// Standard and loop modes are a single pass over the whole progress range.
/// GIF mode generates a palette first, reported as the first
/// [`PALETTE_SHARE`] of progress, then encodes with it.
pub fn build_passes(ffmpeg_bin: &Path, params: &TranscodeParams) -> Vec<EncodePass> {
    match &params.plan {
        EncodePlan::Standard {
            scale,
            crf,
            audio_bitrate,
        } => {
            let mut cmd = h264_command(ffmpeg_bin, params, *scale, *crf);
            cmd.args(["-c:a", "aac"]);
            cmd.arg("-b:a").arg(audio_bitrate);
            push_progress_and_output(&mut cmd, &params.output_path);
            vec![EncodePass {
                command: cmd,
                window: ProgressWindow::FULL,
            }]
        }
        EncodePlan::Loop { scale, crf } => {
            let mut cmd = h264_command(ffmpeg_bin, params, *scale, *crf);
            cmd.args(["-an", "-movflags", "+faststart"]);
            push_progress_and_output(&mut cmd, &params.output_path);
            vec![EncodePass {
                command: cmd,
                window: ProgressWindow::FULL,
            }]
        }
        EncodePlan::Gif { fps, width } => {
            let filters = gif_filters(*fps, *width);
            let palette = params.palette_path();

            let mut palette_cmd = base_command(ffmpeg_bin);
            push_seek(&mut palette_cmd, &params.trim);
            palette_cmd.arg("-i").arg(&params.input_path);
            push_limit(&mut palette_cmd, &params.trim);
            palette_cmd
                .arg("-vf")
                .arg(format!("{},palettegen=stats_mode=diff", filters));
            push_progress_and_output(&mut palette_cmd, &palette);

            let mut gif_cmd = base_command(ffmpeg_bin);
            push_seek(&mut gif_cmd, &params.trim);
            gif_cmd.arg("-i").arg(&params.input_path);
            gif_cmd.arg("-i").arg(&palette);
            push_limit(&mut gif_cmd, &params.trim);
            gif_cmd.arg("-filter_complex").arg(format!(
                "{}[x];[x][1:v]paletteuse=dither=bayer:bayer_scale=5",
                filters
            ));
            push_progress_and_output(&mut gif_cmd, &params.output_path);

            vec![
                EncodePass {
                    command: palette_cmd,
                    window: ProgressWindow::new(0.0, PALETTE_SHARE),
                },
                EncodePass {
                    command: gif_cmd,
                    window: ProgressWindow::new(PALETTE_SHARE, 1.0),
                },
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets;
    use proptest::prelude::*;

    fn get_command_args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .filter_map(|arg| arg.to_str().map(String::from))
            .collect()
    }

    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|pair| pair[0] == flag && pair[1] == value)
    }

    fn has_flag(args: &[String], flag: &str) -> bool {
        args.iter().any(|arg| arg == flag)
    }

    fn position(args: &[String], flag: &str) -> usize {
        args.iter().position(|a| a == flag).unwrap()
    }

    fn params(plan: EncodePlan, trim: TrimWindow) -> TranscodeParams {
        TranscodeParams::new(
            PathBuf::from("/w/processing/clip.mov"),
            PathBuf::from("/w/done/clip.out"),
            plan,
            trim,
        )
    }

    fn standard(preset: &str) -> EncodePlan {
        EncodePlan::for_mode(
            ProcessingMode::Standard,
            presets::lookup(preset).unwrap(),
            &GifConfig::default(),
            &LoopConfig::default(),
        )
    }

    #[test]
    fn test_standard_command() {
        let passes = build_passes(Path::new("ffmpeg"), &params(standard("web"), TrimWindow::default()));
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].window, ProgressWindow::FULL);

        let args = get_command_args(&passes[0].command);
        assert!(has_flag_with_value(&args, "-i", "/w/processing/clip.mov"));
        assert!(has_flag_with_value(
            &args,
            "-vf",
            "scale=trunc(iw*0.75/2)*2:trunc(ih*0.75/2)*2"
        ));
        assert!(has_flag_with_value(&args, "-c:v", "libx264"));
        assert!(has_flag_with_value(&args, "-pix_fmt", "yuv420p"));
        assert!(has_flag_with_value(&args, "-crf", "23"));
        assert!(has_flag_with_value(&args, "-preset", "medium"));
        assert!(has_flag_with_value(&args, "-c:a", "aac"));
        assert!(has_flag_with_value(&args, "-b:a", "192k"));
        assert!(has_flag_with_value(&args, "-progress", "pipe:1"));
        assert!(has_flag(&args, "-y"));
        assert!(!has_flag(&args, "-ss"));
        assert_eq!(args.last().map(String::as_str), Some("/w/done/clip.out"));
    }

    #[test]
    fn test_full_scale_omits_filter() {
        let passes = build_passes(
            Path::new("ffmpeg"),
            &params(standard("archive"), TrimWindow::default()),
        );
        let args = get_command_args(&passes[0].command);
        assert!(!has_flag(&args, "-vf"));
        assert!(has_flag_with_value(&args, "-crf", "18"));
    }

    #[test]
    fn test_loop_command_is_silent_and_faststart() {
        let plan = EncodePlan::for_mode(
            ProcessingMode::Loop,
            presets::lookup("social").unwrap(),
            &GifConfig::default(),
            &LoopConfig::default(),
        );
        let trim = TrimWindow {
            start: Some(5.0),
            end: Some(12.5),
        };
        let passes = build_passes(Path::new("ffmpeg"), &params(plan, trim));
        let args = get_command_args(&passes[0].command);

        assert!(has_flag(&args, "-an"));
        assert!(has_flag_with_value(&args, "-movflags", "+faststart"));
        assert!(!has_flag(&args, "-c:a"));
        assert!(has_flag_with_value(&args, "-crf", "23"));
        assert!(has_flag_with_value(&args, "-ss", "5"));
        assert!(has_flag_with_value(&args, "-t", "7.5"));
        assert!(position(&args, "-ss") < position(&args, "-i"));
        assert!(position(&args, "-t") > position(&args, "-i"));
    }

    #[test]
    fn test_end_without_start_uses_to() {
        let trim = TrimWindow {
            start: None,
            end: Some(30.0),
        };
        let passes = build_passes(Path::new("ffmpeg"), &params(standard("tiny"), trim));
        let args = get_command_args(&passes[0].command);
        assert!(has_flag_with_value(&args, "-to", "30"));
        assert!(!has_flag(&args, "-t"));
        assert!(!has_flag(&args, "-ss"));
    }

    #[test]
    fn test_gif_two_passes() {
        let plan = EncodePlan::Gif { fps: 15, width: 480 };
        let trim = TrimWindow {
            start: Some(2.0),
            end: Some(5.0),
        };
        let p = TranscodeParams::new(
            PathBuf::from("/w/processing/b-gif-2-5.mp4"),
            PathBuf::from("/w/done/b.gif"),
            plan,
            trim,
        );
        let passes = build_passes(Path::new("ffmpeg"), &p);
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].window, ProgressWindow::new(0.0, 0.3));
        assert_eq!(passes[1].window, ProgressWindow::new(0.3, 1.0));

        let palette = get_command_args(&passes[0].command);
        assert!(has_flag_with_value(
            &palette,
            "-vf",
            "fps=15,scale=480:-1:flags=lanczos,palettegen=stats_mode=diff"
        ));
        assert_eq!(
            palette.last().map(String::as_str),
            Some("/w/done/.b_palette.png")
        );

        let encode = get_command_args(&passes[1].command);
        assert!(has_flag_with_value(&encode, "-i", "/w/done/.b_palette.png"));
        assert!(has_flag_with_value(
            &encode,
            "-filter_complex",
            "fps=15,scale=480:-1:flags=lanczos[x];[x][1:v]paletteuse=dither=bayer:bayer_scale=5"
        ));
        assert!(has_flag_with_value(&encode, "-ss", "2"));
        assert!(has_flag_with_value(&encode, "-t", "3"));
        assert_eq!(encode.last().map(String::as_str), Some("/w/done/b.gif"));
    }

    #[test]
    fn test_palette_path() {
        let p = params(EncodePlan::Gif { fps: 10, width: 320 }, TrimWindow::default());
        assert_eq!(p.palette_path(), PathBuf::from("/w/done/.clip_palette.png"));
    }

    // **Feature: clipper, Property 5: Scale filter keeps even dimensions**
    //
    // For any scale below 1.0 the filter rounds both axes down to an even number
    // through `trunc(x/2)*2`, and the program is the configured binary.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_scale_filter_even(scale in 0.05f64..0.99) {
            let filter = scale_filter(scale).unwrap();
            let expected = format!("scale=trunc(iw*{s}/2)*2:trunc(ih*{s}/2)*2", s = scale);
            prop_assert_eq!(filter, expected);

            let plan = EncodePlan::Loop { scale, crf: 23 };
            let passes = build_passes(Path::new("/opt/ffmpeg/bin/ffmpeg"), &params(plan, TrimWindow::default()));
            prop_assert_eq!(passes[0].command.get_program(), std::ffi::OsStr::new("/opt/ffmpeg/bin/ffmpeg"));
        }
    }
}
