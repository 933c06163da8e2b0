//! Keymap: which keyboards hold each note
//!
//! Every entry tracks the keyboards physically holding the note and the
//! keyboards holding it only through the hold (sustain) latch. Each change
//! marks the entry dirty until the engine hands it to the divisions.

use crate::types::{NKEYBD, NNOTES};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub held: u8,
    pub latched: u8,
    pub dirty: bool,
}

impl KeyState {
    /// Keyboards sounding this note
    #[inline]
    pub fn keyboards(&self) -> u8 {
        self.held | self.latched
    }
}

/// Keyboard index to bitmask, `NKEYBD` meaning all keyboards
#[inline]
fn keyboard_mask(keyboard: usize) -> Option<u8> {
    match keyboard {
        k if k < NKEYBD => Some(1 << k),
        NKEYBD => Some(u8::MAX),
        _ => None,
    }
}

pub struct Keymap {
    keys: [KeyState; NNOTES],
    hold: u8,
}

impl Default for Keymap {
    fn default() -> Self {
        Self::new()
    }
}

impl Keymap {
    pub fn new() -> Self {
        Self {
            keys: [KeyState::default(); NNOTES],
            hold: 0,
        }
    }

    pub fn get(&self, note: usize) -> Option<&KeyState> {
        self.keys.get(note)
    }

    /// Keyboards sounding `note`, zero when out of range
    #[inline]
    pub fn keyboards(&self, note: usize) -> u8 {
        self.keys.get(note).map_or(0, KeyState::keyboards)
    }

    pub fn holding(&self) -> u8 {
        self.hold
    }

    pub fn key_on(&mut self, note: usize, keyboard: usize) {
        if keyboard >= NKEYBD {
            return;
        }
        let b = 1u8 << keyboard;
        let Some(key) = self.keys.get_mut(note) else { return };
        key.held |= b;
        key.latched &= !b;
        key.dirty = true;
    }

    pub fn key_off(&mut self, note: usize, keyboard: usize) {
        if keyboard >= NKEYBD {
            return;
        }
        let b = 1u8 << keyboard;
        let hold = self.hold;
        let Some(key) = self.keys.get_mut(note) else { return };
        if hold & b != 0 && key.held & b != 0 {
            key.latched |= b;
        }
        key.held &= !b;
        key.dirty = true;
    }

    pub fn hold_on(&mut self, keyboard: usize) {
        if let Some(m) = keyboard_mask(keyboard) {
            self.hold |= m;
        }
    }

    /// Stop holding and release every latched key of the keyboard(s)
    pub fn hold_off(&mut self, keyboard: usize) {
        let Some(m) = keyboard_mask(keyboard) else { return };
        self.hold &= !m;
        for key in self.keys.iter_mut().filter(|k| k.latched & m != 0) {
            key.latched &= !m;
            key.dirty = true;
        }
    }

    /// All notes off
    ///
    /// For a single keyboard only physically held keys are released and
    /// latched keys keep sounding. `NKEYBD` silences everything.
    pub fn all_off(&mut self, keyboard: usize) {
        let Some(m) = keyboard_mask(keyboard) else { return };
        let everything = keyboard == NKEYBD;
        for key in self.keys.iter_mut() {
            let before = *key;
            key.held &= !m;
            if everything {
                key.latched = 0;
            }
            if key.held != before.held || key.latched != before.latched {
                key.dirty = true;
            }
        }
    }

    /// Clear the dirty flag of a note, returning its keyboards if it was set
    pub fn take_dirty(&mut self, note: usize) -> Option<u8> {
        let key = self.keys.get_mut(note)?;
        if key.dirty {
            key.dirty = false;
            Some(key.keyboards())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_on_off_marks_dirty() {
        let mut km = Keymap::new();
        km.key_on(12, 1);
        assert_eq!(km.take_dirty(12), Some(0b10));
        assert_eq!(km.take_dirty(12), None);
        km.key_off(12, 1);
        assert_eq!(km.take_dirty(12), Some(0));
    }

    #[test]
    fn test_keyboards_combine() {
        let mut km = Keymap::new();
        km.key_on(0, 0);
        km.key_on(0, 2);
        assert_eq!(km.keyboards(0), 0b101);
        km.key_off(0, 0);
        assert_eq!(km.keyboards(0), 0b100);
    }

    #[test]
    fn test_out_of_range_ignored() {
        let mut km = Keymap::new();
        km.key_on(NNOTES, 0);
        km.key_on(0, NKEYBD);
        km.key_on(0, NKEYBD + 3);
        assert_eq!(km.keyboards(0), 0);
        assert_eq!(km.keyboards(NNOTES), 0);
        assert_eq!(km.take_dirty(0), None);
    }

    #[test]
    fn test_hold_latches_released_keys() {
        let mut km = Keymap::new();
        km.hold_on(0);
        km.key_on(5, 0);
        km.key_off(5, 0);
        let key = km.get(5).unwrap();
        assert_eq!(key.held, 0);
        assert_eq!(key.latched, 1);
        assert_eq!(km.keyboards(5), 1);

        // keyboard 1 is not holding
        km.key_on(6, 1);
        km.key_off(6, 1);
        assert_eq!(km.keyboards(6), 0);

        km.take_dirty(5);
        km.hold_off(0);
        assert_eq!(km.keyboards(5), 0);
        assert_eq!(km.take_dirty(5), Some(0));
    }

    #[test]
    fn test_hold_does_not_latch_untouched_keys() {
        let mut km = Keymap::new();
        km.hold_on(NKEYBD);
        assert_eq!(km.holding(), 0xff);
        km.key_off(7, 3);
        assert_eq!(km.keyboards(7), 0);
    }

    #[test]
    fn test_all_notes_off_keeps_latched() {
        let mut km = Keymap::new();
        km.hold_on(0);
        km.key_on(1, 0);
        km.key_off(1, 0);
        km.key_on(2, 0);
        km.key_on(3, 1);
        for n in 0..NNOTES {
            km.take_dirty(n);
        }

        km.all_off(0);
        assert_eq!(km.keyboards(1), 1);
        assert_eq!(km.keyboards(2), 0);
        assert_eq!(km.keyboards(3), 0b10);
        assert_eq!(km.take_dirty(1), None);
        assert_eq!(km.take_dirty(2), Some(0));
        assert_eq!(km.take_dirty(3), None);
    }

    #[test]
    fn test_all_sound_off_clears_everything() {
        let mut km = Keymap::new();
        km.hold_on(0);
        km.key_on(1, 0);
        km.key_off(1, 0);
        km.key_on(2, 4);
        km.all_off(NKEYBD);
        assert_eq!(km.keyboards(1), 0);
        assert_eq!(km.keyboards(2), 0);
    }
}
