//! Named compression presets selected by filename suffix.

use serde::Serialize;

/// A scale/quality/audio bundle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Preset {
    pub name: &'static str,
    /// Fraction applied to both axes, in (0, 1]
    pub scale: f64,
    /// x264 constant rate factor, smaller is higher quality
    pub crf: u32,
    /// AAC bitrate passed to `-b:a`
    pub audio_bitrate: &'static str,
    pub description: &'static str,
}

/// Registry in detection order.
pub const PRESETS: &[Preset] = &[
    Preset {
        name: "social",
        scale: 0.5,
        crf: 28,
        audio_bitrate: "128k",
        description: "50% · sharing",
    },
    Preset {
        name: "web",
        scale: 0.75,
        crf: 23,
        audio_bitrate: "192k",
        description: "75% · balanced",
    },
    Preset {
        name: "archive",
        scale: 1.0,
        crf: 18,
        audio_bitrate: "256k",
        description: "100% · high quality",
    },
    Preset {
        name: "tiny",
        scale: 0.25,
        crf: 32,
        audio_bitrate: "96k",
        description: "25% · preview",
    },
];

pub fn all() -> &'static [Preset] {
    PRESETS
}

/// Find a preset by name, ignoring case.
pub fn lookup(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}
