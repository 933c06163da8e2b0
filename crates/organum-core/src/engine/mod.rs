//! Real-time organ engine
//!
//! This module contains everything the audio thread owns:
//! - Division: ranks, keyboard coupling, tremulant and swell
//! - Asection: the acoustic section each division sounds into
//! - Reverb: the shared reverberation network
//! - Command queues between control threads and the audio thread
//! - OrganEngine: the period loop tying everything together

pub mod asection;
pub mod command;
mod diffuser;
pub mod division;
mod engine;
pub mod gc;
pub mod keymap;
pub mod linkage;
pub mod output;
pub mod reverb;

pub use asection::{Asection, SectionParam, SECTION_PARAMS};
pub use command::{
    command_channel, Command, CommandReceiver, CommandSender, CommandWord, EngineEvent, EngineMessage,
    EventReceiver, MessageSender, QueueFull,
};
pub use division::{Division, DivisionParam, DIVISION_PARAMS};
pub use engine::*;
pub use keymap::Keymap;
pub use output::{AudioParam, OutputLayout, AUDIO_PARAMS};
pub use reverb::{CombReverb, ReverbNetwork};
