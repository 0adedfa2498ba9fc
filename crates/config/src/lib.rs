//! Configuration for the clipper watch-folder pipeline
//!
//! TOML file sections with defaults, plus `CLIPPER_*` environment overrides.
//! The loaded [`Config`] is passed explicitly to every component.

pub mod config;

pub use config::*;
