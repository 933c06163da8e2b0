//! Audio backend configuration
//!
//! Defines configuration for the audio system including the output layout,
//! device selection, and buffer settings.

use serde::{Deserialize, Serialize};

use crate::engine::output::OutputLayout;

/// Largest buffer size accepted from the configuration (frames)
pub const MAX_BUFFER_SIZE: u32 = 8192;

/// Default buffer size when no preference is specified (frames)
pub const DEFAULT_BUFFER_SIZE: u32 = 256;

/// Default sample rate for the audio system
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Preferred buffer size for audio streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the system choose the default buffer size
    #[default]
    Default,
    /// Request a specific buffer size in frames (may be adjusted by the system)
    Fixed(u32),
}

impl BufferSize {
    /// Get the buffer size in frames, or None for system default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some(*frames),
        }
    }

    /// Calculate latency in milliseconds for a given sample rate
    pub fn latency_ms(&self, sample_rate: u32) -> Option<f32> {
        self.as_frames()
            .map(|frames| (frames as f32 / sample_rate as f32) * 1000.0)
    }
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (JACK, ALSA, etc.)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier (e.g., "JACK", "ALSA", "CoreAudio")
    /// If None, uses the default host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Get a display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the audio backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// JACK client name
    pub client_name: String,

    /// Destination channel layout
    pub layout: OutputLayout,

    /// Preferred buffer size
    pub buffer_size: BufferSize,

    /// Preferred sample rate (None = device default, 48kHz preferred)
    pub sample_rate: Option<u32>,

    /// Output device (None = system default)
    /// Used by the CPAL backend
    pub device: Option<DeviceId>,

    /// Connect the outputs to physical playback ports
    /// Used by the JACK backend
    pub autoconnect: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            client_name: "organum".to_string(),
            layout: OutputLayout::default(),
            buffer_size: BufferSize::default(),
            sample_rate: None,
            device: None,
            autoconnect: true,
        }
    }
}

impl AudioConfig {
    /// Set the output layout
    pub fn with_layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the output device
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    /// Set a fixed buffer size in frames
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    /// Set the preferred sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AudioConfig::default();
        assert_eq!(config.layout, OutputLayout::Stereo);
        assert!(config.autoconnect);
        assert_eq!(config.buffer_size.as_frames(), None);
    }

    #[test]
    fn test_builders() {
        let config = AudioConfig::default()
            .with_layout(OutputLayout::BFormat)
            .with_buffer_frames(128)
            .with_sample_rate(44100)
            .with_device(DeviceId::with_host("hw:0", "ALSA"));
        assert_eq!(config.layout.channels(), 4);
        assert_eq!(config.sample_rate, Some(44100));
        assert_eq!(config.device.as_ref().map(DeviceId::display_label), Some("[ALSA] hw:0".to_string()));
        let ms = config.buffer_size.latency_ms(48000).unwrap();
        assert!((ms - 2.6667).abs() < 1e-3);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: AudioConfig = serde_yaml::from_str("layout: binaural\nautoconnect: false\n").unwrap();
        assert_eq!(config.layout, OutputLayout::Binaural);
        assert!(!config.autoconnect);
        assert_eq!(config.client_name, "organum");
    }
}
