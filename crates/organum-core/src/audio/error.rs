//! Startup failures of the audio backends
//!
//! Everything here is raised while opening a device or a JACK client. Once
//! the engine is running there is no error path out of the audio thread.

use thiserror::Error;

use crate::engine::OutputLayout;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio output devices found")]
    NoDevices,

    /// The named host has no default output
    #[error("Host '{0}' has no default output device")]
    NoDefaultDevice(String),

    #[error("No output device matches {0}")]
    DeviceNotFound(String),

    /// The device offers nothing the engine can render into
    #[error("Unusable output configuration: {0}")]
    Unsupported(String),

    #[error("{layout:?} output needs {required} channels, the device offers {available}")]
    ChannelCount {
        layout: OutputLayout,
        required: usize,
        available: usize,
    },

    /// `stage` is "build" or "start"
    #[error("Could not {stage} the output stream: {reason}")]
    Stream { stage: &'static str, reason: String },

    #[error("JACK: {0}")]
    Jack(String),
}

impl AudioError {
    pub(crate) fn stream(stage: &'static str, reason: impl ToString) -> Self {
        Self::Stream {
            stage,
            reason: reason.to_string(),
        }
    }
}

pub type AudioResult<T> = Result<T, AudioError>;
