//! CPAL audio backend implementation
//!
//! Used everywhere the native JACK backend is not compiled in.
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  MIDI / Player   │───push()───────────►│   Command Queues    │
//! │                  │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!         ▲                                           │
//!         │ EngineEvent                               │ drain
//!         │                                           ▼
//!         │                                ┌─────────────────────┐
//!         └────────────────────────────────│  CPAL Audio Thread  │
//!                                          │  (owns OrganEngine) │
//!                                          └─────────────────────┘
//! ```

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::backend::{create_engine, AudioHandle, AudioSystemResult, StopFlag};
use super::config::{AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE};
use super::device::{find_device_by_id, get_cpal_default_device};
use super::error::{AudioError, AudioResult};
use crate::engine::OrganEngine;

/// CPAL-specific audio handle
///
/// Keeps the audio stream alive. Drop this to stop audio.
pub struct CpalAudioHandle {
    _stream: Stream,
    pub(crate) stop: StopFlag,
    sample_rate: u32,
    /// Actual buffer size in frames (as negotiated with the device)
    buffer_size: u32,
}

impl CpalAudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }
}

/// Start the audio system on the configured (or default) device
pub fn start_audio_system(config: &AudioConfig) -> AudioResult<AudioSystemResult> {
    let device = match &config.device {
        Some(id) => find_device_by_id(id)?,
        None => get_cpal_default_device()?,
    };

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let required = config.layout.channels();
    let (supported_config, buffer_size) = get_output_config(&device, config)?;
    if (supported_config.channels() as usize) < required {
        return Err(AudioError::ChannelCount {
            layout: config.layout,
            required,
            available: supported_config.channels() as usize,
        });
    }
    let sample_rate = supported_config.sample_rate().0;

    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    log::info!(
        "Audio config: {} channels ({:?} layout), {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        config.layout,
        sample_rate,
        buffer_size,
        (buffer_size as f32 / sample_rate as f32) * 1000.0
    );

    let (engine, channels) = create_engine(sample_rate, config);
    let info = engine.info();
    let stop = StopFlag::default();

    let stream = build_output_stream(&device, &stream_config, engine, stop.clone())?;
    stream
        .play()
        .map_err(|e| AudioError::stream("start", e))?;

    log::info!("Audio stream started");

    let handle = CpalAudioHandle {
        _stream: stream,
        stop,
        sample_rate,
        buffer_size,
    };

    Ok(AudioSystemResult::new(AudioHandle::Cpal(handle), channels, info, buffer_size))
}

/// Get the best output configuration for a device
///
/// Returns (SupportedStreamConfig, buffer_size_in_frames)
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::Unsupported(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::Unsupported("device lists no output configurations".to_string()));
    }

    let target_sample_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
    let channels = config.layout.channels() as u16;

    let best_config = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= channels)
        .find(|c| {
            target_sample_rate >= c.min_sample_rate().0
                && target_sample_rate <= c.max_sample_rate().0
        })
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= channels)
        })
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32)
        })
        .ok_or_else(|| {
            AudioError::Unsupported("no f32 output configuration".to_string())
        })?;

    let sample_rate = if target_sample_rate >= best_config.min_sample_rate().0
        && target_sample_rate <= best_config.max_sample_rate().0
    {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    let stream_config = best_config.clone().with_sample_rate(sample_rate);

    let buffer_size = match config.buffer_size {
        BufferSize::Default => DEFAULT_BUFFER_SIZE,
        BufferSize::Fixed(frames) => frames.clamp(64, MAX_BUFFER_SIZE),
    };

    log::debug!(
        "Selected buffer size: {} frames for {:?}",
        buffer_size,
        config.buffer_size
    );

    Ok((stream_config, buffer_size))
}

/// Build the output stream around an owned engine
fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut engine: OrganEngine,
    stop: StopFlag,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                if stop.is_raised() {
                    data.fill(0.0);
                    return;
                }
                engine.process_interleaved(data, channels);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::stream("build", e))?;

    Ok(stream)
}
