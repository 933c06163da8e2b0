//! Organum Core - additive-synthesis pipe organ engine

pub mod audio;
pub mod config;
pub mod engine;
pub mod synth;
pub mod types;

pub use types::*;
