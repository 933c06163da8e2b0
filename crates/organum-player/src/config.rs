//! Player configuration
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/organum/organum.yaml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use organum_core::audio::AudioConfig;
use organum_core::config::default_cache_dir;
use organum_core::synth::Tuning;
use organum_midi::MidiSettings;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganConfig {
    pub audio: AudioConfig,
    pub tuning: Tuning,
    /// Waveform cache directory (None = synthesize every start)
    /// Default: ~/.cache/organum/waves
    pub cache_dir: Option<PathBuf>,
    pub midi: MidiSettings,
    pub reverb: ReverbSettings,
}

impl Default for OrganConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            tuning: Tuning::default(),
            cache_dir: Some(default_cache_dir()),
            midi: MidiSettings::default(),
            reverb: ReverbSettings::default(),
        }
    }
}

/// Initial room settings, sent as audio parameters at start
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbSettings {
    /// Room size (seconds of reverb predelay)
    pub size: f32,
    /// Mid-frequency decay time in seconds
    pub time: f32,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self {
            size: 0.075,
            time: 4.0,
        }
    }
}
