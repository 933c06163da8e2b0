//! Platform dispatch for the audio backends
//!
//! Both backends share one design:
//! - the audio callback owns the `OrganEngine` exclusively
//! - control threads reach it only through the engine queues
//! - a shared stop flag ends the run cooperatively, checked once per callback

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::engine::{CombReverb, CommandSender, EngineChannels, EngineInfo, EventReceiver, MessageSender, OrganEngine};

use super::config::AudioConfig;
use super::error::AudioResult;

/// Result of starting the audio system
///
/// Contains the handle plus every control-side queue end.
pub struct AudioSystemResult {
    /// Handle to keep audio alive (drop to stop)
    pub handle: AudioHandle,
    /// Key and hold commands (the MIDI thread's queue)
    pub notes: CommandSender,
    /// Stop, tremulant and parameter commands
    pub controls: CommandSender,
    /// Division and rank installs from the build thread
    pub messages: MessageSender,
    /// Status reports from the audio thread
    pub events: EventReceiver,
    /// Engine configuration and parameter ranges
    pub info: EngineInfo,
    /// Sample rate of the audio system
    pub sample_rate: u32,
    /// Actual buffer size in frames
    pub buffer_size: u32,
    /// Audio latency in milliseconds (one-way, output only)
    pub latency_ms: f32,
}

impl AudioSystemResult {
    pub(crate) fn new(handle: AudioHandle, channels: EngineChannels, info: EngineInfo, buffer_size: u32) -> Self {
        let sample_rate = handle.sample_rate();
        Self {
            handle,
            notes: channels.notes,
            controls: channels.controls,
            messages: channels.messages,
            events: channels.events,
            info,
            sample_rate,
            buffer_size,
            latency_ms: (buffer_size as f32 / sample_rate as f32) * 1000.0,
        }
    }
}

/// Cooperative run flag shared with the audio callback
#[derive(Debug, Clone, Default)]
pub(crate) struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Build the engine every backend runs
pub(crate) fn create_engine(sample_rate: u32, config: &AudioConfig) -> (OrganEngine, EngineChannels) {
    let (channels, queues) = crate::engine::engine_queues();
    let fsamp = sample_rate as f32;
    let engine = OrganEngine::new(fsamp, config.layout, queues, Box::new(CombReverb::new(fsamp)));
    (engine, channels)
}

/// Handle to the active audio system
///
/// Keeps the audio stream/client alive. Drop this to stop audio.
pub enum AudioHandle {
    /// CPAL-based handle (Windows/macOS/Linux fallback)
    #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
    Cpal(super::cpal_backend::CpalAudioHandle),

    /// Native JACK handle (Linux with jack-backend feature)
    #[cfg(all(target_os = "linux", feature = "jack-backend"))]
    Jack(super::jack_backend::JackAudioHandle),
}

impl AudioHandle {
    /// Get the sample rate of the audio system
    pub fn sample_rate(&self) -> u32 {
        match self {
            #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
            AudioHandle::Cpal(h) => h.sample_rate(),
            #[cfg(all(target_os = "linux", feature = "jack-backend"))]
            AudioHandle::Jack(h) => h.sample_rate(),
        }
    }

    /// Get the actual buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        match self {
            #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
            AudioHandle::Cpal(h) => h.buffer_size(),
            #[cfg(all(target_os = "linux", feature = "jack-backend"))]
            AudioHandle::Jack(h) => h.buffer_size(),
        }
    }

    /// Get the audio latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size() as f32 / self.sample_rate() as f32) * 1000.0
    }

    /// Ask the audio callback to go silent and finish
    pub fn stop(&self) {
        self.stop_flag().raise();
    }

    /// False once stopped locally or by the server
    pub fn is_running(&self) -> bool {
        !self.stop_flag().is_raised()
    }

    fn stop_flag(&self) -> &StopFlag {
        match self {
            #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
            AudioHandle::Cpal(h) => &h.stop,
            #[cfg(all(target_os = "linux", feature = "jack-backend"))]
            AudioHandle::Jack(h) => &h.stop,
        }
    }
}

/// Start the audio system with the given configuration
///
/// Automatically selects the appropriate backend:
/// - **Linux with jack-backend feature**: Native JACK
/// - **Other platforms**: CPAL
pub fn start_audio_system(config: &AudioConfig) -> AudioResult<AudioSystemResult> {
    #[cfg(all(target_os = "linux", feature = "jack-backend"))]
    {
        super::jack_backend::start_audio_system(config)
    }

    #[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
    {
        super::cpal_backend::start_audio_system(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_flag_is_shared() {
        let flag = StopFlag::default();
        let other = flag.clone();
        assert!(!other.is_raised());
        flag.raise();
        assert!(other.is_raised());
    }

    #[test]
    fn test_create_engine_follows_layout() {
        let config = AudioConfig::default().with_layout(crate::engine::OutputLayout::BFormat);
        let (engine, _channels) = create_engine(44100, &config);
        assert_eq!(engine.channels(), 4);
        assert_eq!(engine.info().sample_rate, 44100.0);
    }
}
