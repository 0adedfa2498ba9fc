//! Filename convention parsing.
//!
//! A dropped file's stem selects how it is processed:
//!
//! - `clip-web.mp4` compresses with the `web` preset
//! - `clip-gif.mp4` converts the whole clip to a GIF
//! - `clip-loop-5-12.mov` makes a silent loop of seconds 5 to 12
//!
//! Everything here is pure: no I/O, no state.

use crate::presets::{self, Preset};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error for a filename whose trim suffix cannot be understood.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("invalid time token '{0}'")]
    InvalidTime(String),

    #[error("expected at most two trim tokens after -{marker}, found {count}")]
    TooManyTokens { marker: &'static str, count: usize },

    #[error("trim end {end}s is not after start {start}s")]
    EmptyWindow { start: f64, end: f64 },
}

/// Alternate output modes that override preset compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialFormat {
    Gif,
    Loop,
}

impl SpecialFormat {
    const ALL: [SpecialFormat; 2] = [SpecialFormat::Gif, SpecialFormat::Loop];

    pub fn marker(self) -> &'static str {
        match self {
            SpecialFormat::Gif => "gif",
            SpecialFormat::Loop => "loop",
        }
    }
}

/// How a job is transcoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    #[default]
    Standard,
    Gif,
    Loop,
}

impl From<Option<SpecialFormat>> for ProcessingMode {
    fn from(special: Option<SpecialFormat>) -> Self {
        match special {
            None => ProcessingMode::Standard,
            Some(SpecialFormat::Gif) => ProcessingMode::Gif,
            Some(SpecialFormat::Loop) => ProcessingMode::Loop,
        }
    }
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingMode::Standard => write!(f, "standard"),
            ProcessingMode::Gif => write!(f, "gif"),
            ProcessingMode::Loop => write!(f, "loop"),
        }
    }
}

/// Optional start/end offsets in seconds. An absent end means "to end of media".
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrimWindow {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl TrimWindow {
    pub fn is_whole(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Length of the processed region given the media duration.
    pub fn span(&self, duration: Option<f64>) -> Option<f64> {
        let start = self.start.unwrap_or(0.0);
        let end = self.end.or(duration)?;
        let span = end - start;
        (span > 0.0).then_some(span)
    }
}

/// Processing intent derived from a filename.
#[derive(Debug, Clone, PartialEq)]
pub struct Convention {
    /// `None` means the caller substitutes its default preset.
    pub preset: Option<&'static Preset>,
    pub special: Option<SpecialFormat>,
    pub trim: TrimWindow,
    /// Stem with the preset suffix or the special marker and trim removed
    pub base_stem: String,
}

impl Convention {
    /// Standard compression with the default preset, used when parsing fails.
    pub fn fallback(filename: &str) -> Self {
        Self {
            preset: None,
            special: None,
            trim: TrimWindow::default(),
            base_stem: file_stem(filename).to_string(),
        }
    }

    pub fn mode(&self) -> ProcessingMode {
        self.special.into()
    }

    /// Output file name for this convention once a preset is resolved.
    pub fn output_name(&self, preset: &Preset) -> String {
        match self.mode() {
            ProcessingMode::Standard => format!("{}-{}-out.mp4", self.base_stem, preset.name),
            ProcessingMode::Gif => format!("{}.gif", self.base_stem),
            ProcessingMode::Loop => format!("{}-loop.mp4", self.base_stem),
        }
    }
}

fn file_stem(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
}

/// Strict decimal: digits with at most one dot. Rejects signs, exponents, `inf`.
fn parse_number(s: &str) -> Option<f64> {
    let digits = s.chars().filter(|c| c.is_ascii_digit()).count();
    let dots = s.chars().filter(|&c| c == '.').count();
    if digits == 0 || dots > 1 || digits + dots != s.len() {
        return None;
    }
    s.parse().ok()
}

/// Parse a trim token: `90`, `90s`, `1.5`, `1:30` (mm:ss) or `0:01:30` (hh:mm:ss).
pub fn parse_time(token: &str) -> Result<f64, ParseError> {
    let invalid = || ParseError::InvalidTime(token.to_string());
    let token = token.trim();

    if token.contains(':') {
        let parts = token
            .split(':')
            .map(parse_number)
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(invalid)?;
        return match parts.as_slice() {
            [m, s] => Ok(m * 60.0 + s),
            [h, m, s] => Ok(h * 3600.0 + m * 60.0 + s),
            _ => Err(invalid()),
        };
    }

    let plain = token
        .strip_suffix('s')
        .or_else(|| token.strip_suffix('S'))
        .unwrap_or(token);
    parse_number(plain).ok_or_else(invalid)
}

/// Cheap shape test used to tell a trim suffix from ordinary words.
fn looks_like_time(token: &str) -> bool {
    let body = token.strip_suffix('s').unwrap_or(token);
    body.starts_with(|c: char| c.is_ascii_digit())
        && body.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ':')
}

/// Preset whose `-<name>` suffix ends the stem, first registry match wins.
pub fn detect_preset(stem: &str) -> Option<&'static Preset> {
    let lower = stem.to_ascii_lowercase();
    presets::all()
        .iter()
        .find(|p| lower.ends_with(&format!("-{}", p.name)))
}

/// One occurrence of `-gif`/`-loop` and what follows it.
#[derive(Debug)]
enum MarkerMatch<'a> {
    /// Followed by one or two time tokens; `end` is the byte offset after the last one
    Trim { tokens: Vec<&'a str>, end: usize },
    /// Followed by three or more time tokens
    TooMany(usize),
    /// Ends the stem
    Bare,
    /// Followed by non-time text
    Interior,
}

impl MarkerMatch<'_> {
    /// Higher is more specific.
    fn rank(&self) -> u8 {
        match self {
            MarkerMatch::Trim { .. } | MarkerMatch::TooMany(_) => 2,
            MarkerMatch::Bare => 1,
            MarkerMatch::Interior => 0,
        }
    }
}

fn marker_matches(lower: &str, format: SpecialFormat) -> Vec<(usize, MarkerMatch<'_>)> {
    let needle = format!("-{}", format.marker());
    lower
        .match_indices(&needle)
        .filter_map(|(at, _)| {
            let mut end = at + needle.len();
            let tail = &lower[end..];
            if tail.is_empty() {
                return Some((at, MarkerMatch::Bare));
            }
            let rest = tail.strip_prefix('-')?;

            // Only the leading run of time tokens is the trim; any words after it stay in the name.
            let mut tokens = Vec::new();
            for token in rest.split('-') {
                if !looks_like_time(token) {
                    break;
                }
                tokens.push(token);
                end += 1 + token.len();
            }
            let found = match tokens.len() {
                0 => MarkerMatch::Interior,
                1 | 2 => MarkerMatch::Trim { tokens, end },
                count => MarkerMatch::TooMany(count),
            };
            Some((at, found))
        })
        .collect()
}

/// `tail` with a trailing `-<preset>` removed.
fn strip_preset<'a>(tail: &'a str, preset: Option<&Preset>) -> &'a str {
    match preset {
        Some(p)
            if tail.len() > p.name.len()
                && tail.to_ascii_lowercase().ends_with(&format!("-{}", p.name)) =>
        {
            &tail[..tail.len() - p.name.len() - 1]
        }
        _ => tail,
    }
}

/// An output stem that stripping left empty falls back to the whole stem.
fn or_whole(base: String, stem: &str) -> String {
    if base.is_empty() {
        stem.to_string()
    } else {
        base
    }
}

/// Derive preset, special format and trim window from a file name.
///
/// A marker followed by one or two time tokens captures them as the trim,
/// whatever text follows; that text stays in the output name minus any
/// preset suffix. When several markers are present the most specific wins:
/// a marker with a trim, then a bare trailing marker, then an interior marker.
/// Ties go to `gif` over `loop`, then to the rightmost occurrence.
pub fn parse(filename: &str) -> Result<Convention, ParseError> {
    let stem = file_stem(filename);
    let lower = stem.to_ascii_lowercase();
    let preset = detect_preset(stem);

    let mut best: Option<(SpecialFormat, usize, MarkerMatch<'_>)> = None;
    for format in SpecialFormat::ALL {
        for (at, found) in marker_matches(&lower, format) {
            let better = match &best {
                None => true,
                Some((best_format, best_at, best_found)) => {
                    found.rank() > best_found.rank()
                        || (found.rank() == best_found.rank()
                            && *best_format == format
                            && at > *best_at)
                }
            };
            if better {
                best = Some((format, at, found));
            }
        }
    }

    let Some((format, at, found)) = best else {
        let base_stem = match preset {
            Some(p) => stem[..stem.len() - p.name.len() - 1].to_string(),
            None => stem.to_string(),
        };
        return Ok(Convention {
            preset,
            special: None,
            trim: TrimWindow::default(),
            base_stem: or_whole(base_stem, stem),
        });
    };

    let (trim, base_stem) = match found {
        MarkerMatch::Trim { tokens, end: trim_end } => {
            let start = parse_time(tokens[0])?;
            let end = tokens.get(1).map(|t| parse_time(t)).transpose()?;
            if let Some(end) = end {
                if end <= start {
                    return Err(ParseError::EmptyWindow { start, end });
                }
            }
            let trim = TrimWindow {
                start: Some(start),
                end,
            };
            let tail = strip_preset(&stem[trim_end..], preset);
            (trim, format!("{}{}", &stem[..at], tail))
        }
        MarkerMatch::TooMany(count) => {
            return Err(ParseError::TooManyTokens {
                marker: format.marker(),
                count,
            })
        }
        MarkerMatch::Bare => (TrimWindow::default(), stem[..at].to_string()),
        MarkerMatch::Interior => (TrimWindow::default(), stem.to_string()),
    };

    Ok(Convention {
        preset,
        special: Some(format),
        trim,
        base_stem: or_whole(base_stem, stem),
    })
}
