//! MIDI input handling
//!
//! Receives raw MIDI bytes from the midir callback, translates them and
//! enqueues the resulting commands for the audio thread.

use midir::MidiInputConnection;
use organum_core::engine::CommandSender;

use crate::connection::find_input_port;
use crate::map::MidiMap;
use crate::translate::translate;
use crate::MidiConnectionError;

/// Raw MIDI input event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiInputEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, cc: u8, value: u8 },
}

impl MidiInputEvent {
    /// Parse raw MIDI bytes into an event
    ///
    /// MIDI message format:
    /// - Note Off: 0x8n nn vv (n=channel, nn=note, vv=velocity)
    /// - Note On: 0x9n nn vv
    /// - Control Change: 0xBn cc vv (cc=controller, vv=value)
    ///
    /// Note On with velocity 0 is a Note Off. Every other message type is ignored.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let [status, d1, d2, ..] = *data else {
            return None;
        };
        let channel = status & 0x0F;

        match status & 0xF0 {
            0x80 => Some(Self::NoteOff {
                channel,
                note: d1,
                velocity: d2,
            }),
            0x90 if d2 == 0 => Some(Self::NoteOff {
                channel,
                note: d1,
                velocity: 0,
            }),
            0x90 => Some(Self::NoteOn {
                channel,
                note: d1,
                velocity: d2,
            }),
            0xB0 => Some(Self::ControlChange {
                channel,
                cc: d1,
                value: d2,
            }),
            _ => None,
        }
    }

    /// Get the MIDI channel
    pub fn channel(&self) -> u8 {
        match self {
            Self::NoteOn { channel, .. } => *channel,
            Self::NoteOff { channel, .. } => *channel,
            Self::ControlChange { channel, .. } => *channel,
        }
    }
}

/// Callback data passed to midir
struct CallbackData {
    map: MidiMap,
    sender: CommandSender,
}

/// MIDI input handler
///
/// Owns the midir connection; dropping it closes the port.
pub struct MidiInputHandler {
    _connection: MidiInputConnection<CallbackData>,
    port_name: String,
}

impl MidiInputHandler {
    /// Open the first input port matching `port_match` and feed `sender`
    pub fn connect(port_match: &str, map: MidiMap, sender: CommandSender) -> Result<Self, MidiConnectionError> {
        let (midi_in, port, port_name) = find_input_port(port_match)?;

        let connection = midi_in
            .connect(&port, "organum-midi-input", Self::midi_callback, CallbackData { map, sender })
            .map_err(|e| MidiConnectionError::Connect {
                port: port_name.clone(),
                reason: e.to_string(),
            })?;

        log::info!("MIDI: Input handler connected to {}", port_name);

        Ok(Self {
            _connection: connection,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Called from the MIDI driver thread for every message
    fn midi_callback(_timestamp: u64, data: &[u8], state: &mut CallbackData) {
        let Some(event) = MidiInputEvent::parse(data) else {
            return;
        };
        log::trace!("MIDI: {:?}", event);

        if let Some(command) = translate(&event, &state.map) {
            if state.sender.send(command).is_err() {
                log::warn!("MIDI: note queue full, dropped {:?}", command);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_on() {
        assert_eq!(
            MidiInputEvent::parse(&[0x92, 60, 100]),
            Some(MidiInputEvent::NoteOn {
                channel: 2,
                note: 60,
                velocity: 100
            })
        );
    }

    #[test]
    fn test_parse_zero_velocity_is_note_off() {
        assert_eq!(
            MidiInputEvent::parse(&[0x90, 60, 0]),
            Some(MidiInputEvent::NoteOff {
                channel: 0,
                note: 60,
                velocity: 0
            })
        );
        assert!(matches!(
            MidiInputEvent::parse(&[0x8F, 40, 64]),
            Some(MidiInputEvent::NoteOff { channel: 15, note: 40, .. })
        ));
    }

    #[test]
    fn test_parse_control_change() {
        let event = MidiInputEvent::parse(&[0xB5, 64, 127]).unwrap();
        assert_eq!(event.channel(), 5);
        assert_eq!(
            event,
            MidiInputEvent::ControlChange {
                channel: 5,
                cc: 64,
                value: 127
            }
        );
    }

    #[test]
    fn test_parse_ignores_other_messages() {
        assert_eq!(MidiInputEvent::parse(&[]), None);
        assert_eq!(MidiInputEvent::parse(&[0x90, 60]), None);
        assert_eq!(MidiInputEvent::parse(&[0xE0, 0, 64]), None);
        assert_eq!(MidiInputEvent::parse(&[0xC0, 5, 0]), None);
    }
}
