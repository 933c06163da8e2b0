//! MIDI keyboard and controller input for the organum engine
//!
//! This crate provides:
//! - MIDI port discovery and input handling via midir
//! - A per-channel role map (which keyboard, which division, control rights)
//! - Translation of MIDI events into engine commands
//!
//! # Architecture
//!
//! ```text
//! MIDI Device → midir callback → translate() → CommandSender → audio thread
//! ```
//!
//! The midir callback pushes straight into the engine's note queue. Nothing
//! in between allocates or locks; a full queue drops the event.

mod connection;
mod input;
mod map;
mod translate;

pub use connection::{list_input_ports, MidiConnectionError};
pub use input::{MidiInputEvent, MidiInputHandler};
pub use map::{ChannelRole, MidiMap, MidiSettings, MIDI_CHANNELS};
pub use translate::{cc, translate, NOTE_MAX, NOTE_MIN};
