//! MIDI event to engine command translation

use organum_core::engine::{AudioParam, Command, DivisionParam, DIVISION_PARAMS};
use organum_core::keymap_index;

use crate::input::MidiInputEvent;
use crate::map::MidiMap;

/// Lowest MIDI note mapped to a key
pub const NOTE_MIN: u8 = organum_core::NOTE_BASE;

/// Highest MIDI note mapped to a key
pub const NOTE_MAX: u8 = organum_core::NOTE_TOP;

/// Controller numbers understood by the engine
pub mod cc {
    pub const VOLUME: u8 = 7;
    pub const SWELL: u8 = 11;
    pub const HOLD: u8 = 64;
    pub const TREMULANT_FREQUENCY: u8 = 76;
    pub const TREMULANT_DEPTH: u8 = 92;
    pub const ALL_SOUND_OFF: u8 = 120;
    pub const ALL_NOTES_OFF: u8 = 123;
}

/// Translate one MIDI event according to the channel roles
///
/// Returns None for events the channel has no right to send, notes outside
/// the keyboard compass, and controllers the engine does not use.
pub fn translate(event: &MidiInputEvent, map: &MidiMap) -> Option<Command> {
    let role = map.role(event.channel());

    match *event {
        MidiInputEvent::NoteOn { note, .. } => Some(Command::KeyOn {
            keyboard: role.keyboard?,
            note: keymap_index(note)? as u8,
        }),
        MidiInputEvent::NoteOff { note, .. } => Some(Command::KeyOff {
            keyboard: role.keyboard?,
            note: keymap_index(note)? as u8,
        }),
        MidiInputEvent::ControlChange { cc, value, .. } => match cc {
            cc::HOLD => {
                let keyboard = role.keyboard?;
                Some(if value > 63 {
                    Command::HoldOn { keyboard }
                } else {
                    Command::HoldOff { keyboard }
                })
            }
            cc::ALL_NOTES_OFF => Some(Command::AllNotesOff {
                keyboard: role.keyboard?,
            }),
            cc::ALL_SOUND_OFF => role.control.then(Command::all_sound_off),
            cc::VOLUME => {
                let v = value as f32 / 127.0;
                role.control.then_some(Command::AudioParam {
                    param: AudioParam::Volume,
                    value: v * v,
                })
            }
            cc::SWELL => division_param(role.division?, DivisionParam::Swell, value),
            cc::TREMULANT_FREQUENCY => division_param(role.division?, DivisionParam::TremulantFrequency, value),
            cc::TREMULANT_DEPTH => division_param(role.division?, DivisionParam::TremulantDepth, value),
            _ => None,
        },
    }
}

fn division_param(division: u8, param: DivisionParam, value: u8) -> Option<Command> {
    Some(Command::DivisionParam {
        division,
        param,
        value: DIVISION_PARAMS[param as usize].from_normalized(value as f32 / 127.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::ChannelRole;
    use organum_core::NKEYBD;

    fn note_on(channel: u8, note: u8) -> MidiInputEvent {
        MidiInputEvent::NoteOn {
            channel,
            note,
            velocity: 90,
        }
    }

    fn control(channel: u8, cc: u8, value: u8) -> MidiInputEvent {
        MidiInputEvent::ControlChange { channel, cc, value }
    }

    #[test]
    fn test_notes_map_to_keyboard() {
        let map = MidiMap::default();
        assert_eq!(translate(&note_on(0, 36), &map), Some(Command::KeyOn { note: 0, keyboard: 0 }));
        assert_eq!(translate(&note_on(1, 96), &map), Some(Command::KeyOn { note: 60, keyboard: 1 }));
        let off = MidiInputEvent::NoteOff {
            channel: 1,
            note: 60,
            velocity: 0,
        };
        assert_eq!(translate(&off, &map), Some(Command::KeyOff { note: 24, keyboard: 1 }));
    }

    #[test]
    fn test_notes_outside_compass_or_unmapped_channel() {
        let map = MidiMap::default();
        assert_eq!(translate(&note_on(0, 35), &map), None);
        assert_eq!(translate(&note_on(0, 97), &map), None);
        assert_eq!(translate(&note_on(5, 60), &map), None);
    }

    #[test]
    fn test_hold_threshold() {
        let map = MidiMap::default();
        assert_eq!(translate(&control(1, cc::HOLD, 64), &map), Some(Command::HoldOn { keyboard: 1 }));
        assert_eq!(translate(&control(1, cc::HOLD, 63), &map), Some(Command::HoldOff { keyboard: 1 }));
    }

    #[test]
    fn test_all_off_rights() {
        let map = MidiMap::default();
        assert_eq!(
            translate(&control(1, cc::ALL_NOTES_OFF, 0), &map),
            Some(Command::AllNotesOff { keyboard: 1 })
        );
        // Channel 2 has no control rights
        assert_eq!(translate(&control(1, cc::ALL_SOUND_OFF, 0), &map), None);
        assert_eq!(
            translate(&control(0, cc::ALL_SOUND_OFF, 0), &map),
            Some(Command::AllNotesOff { keyboard: NKEYBD as u8 })
        );
    }

    #[test]
    fn test_volume_is_squared() {
        let map = MidiMap::default();
        match translate(&control(0, cc::VOLUME, 127), &map) {
            Some(Command::AudioParam {
                param: AudioParam::Volume,
                value,
            }) => assert!((value - 1.0).abs() < 1e-6),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(translate(&control(1, cc::VOLUME, 100), &map), None);
    }

    #[test]
    fn test_division_controls_span_range() {
        let mut map = MidiMap::empty();
        map.set(3, ChannelRole::default().with_division(2));

        assert_eq!(
            translate(&control(3, cc::SWELL, 0), &map),
            Some(Command::DivisionParam {
                division: 2,
                param: DivisionParam::Swell,
                value: DIVISION_PARAMS[0].min,
            })
        );
        assert_eq!(
            translate(&control(3, cc::TREMULANT_FREQUENCY, 127), &map),
            Some(Command::DivisionParam {
                division: 2,
                param: DivisionParam::TremulantFrequency,
                value: DIVISION_PARAMS[1].max,
            })
        );
        assert!(matches!(
            translate(&control(3, cc::TREMULANT_DEPTH, 64), &map),
            Some(Command::DivisionParam {
                param: DivisionParam::TremulantDepth,
                ..
            })
        ));
        // No keyboard on this channel
        assert_eq!(translate(&note_on(3, 60), &map), None);
        assert_eq!(translate(&control(3, 1, 64), &map), None);
    }
}
