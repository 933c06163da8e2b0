//! Cross-platform audio backend for Organum
//!
//! Provides a unified audio system with platform-specific backends:
//! - **Linux**: Native JACK with one port per output channel (with jack-backend feature)
//! - **Windows/macOS**: CPAL for cross-platform device support
//!
//! # Architecture
//!
//! - **Control threads**: send commands via lock-free ring queues
//! - **Build thread**: hands finished divisions and ranks over the message queue
//! - **Audio thread**: owns the `OrganEngine` exclusively, reports back through events
//!
//! # Example Usage
//!
//! ```ignore
//! use organum_core::audio::{AudioConfig, start_audio_system};
//! use organum_core::engine::Command;
//!
//! let mut audio = start_audio_system(&AudioConfig::default())?;
//! audio.notes.send(Command::KeyOn { note: 24, keyboard: 0 })?;
//! ```

mod backend;
mod config;
mod device;
mod error;

#[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
mod cpal_backend;

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
mod jack_backend;

pub use config::{AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE};

pub use backend::{start_audio_system, AudioHandle, AudioSystemResult};

pub use device::{get_output_devices, AudioDevice};

pub use error::{AudioError, AudioResult};
