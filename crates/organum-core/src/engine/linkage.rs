//! Keyboard linkage masks
//!
//! Every rank carries one [`LinkageMask`] per linkage. A linkage selects the
//! keyboards whose keys sound the rank, and may instead "follow the division":
//! it then tracks whatever keyboards are assigned to the owning division.
//! Drawstops, couplers and crescendo-like controls each use their own
//! linkage so they never clobber each other's bits.

use crate::types::{NKEYBD, NLINKS};

/// Keyboard selection of a single linkage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkageMask {
    pub keyboards: u8,
    pub follows_division: bool,
}

impl LinkageMask {
    pub fn is_engaged(&self) -> bool {
        self.keyboards != 0 || self.follows_division
    }
}

/// Whether a rank's note state must be recomputed from the keymap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MaskState {
    #[default]
    Clean,
    Dirty,
}

/// Per-linkage note mask of a rank
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoteMask {
    links: [LinkageMask; NLINKS],
    state: MaskState,
}

/// OR-fold of per-linkage keyboard masks
pub fn merge_masks(masks: &[u8; NLINKS]) -> u8 {
    masks.iter().fold(0, |acc, m| acc | m)
}

#[inline]
fn keyboard_bit(bit: usize) -> Option<u8> {
    (bit < NKEYBD).then(|| 1u8 << bit)
}

impl NoteMask {
    /// A freshly installed rank: nothing selected, state pending
    pub fn new() -> Self {
        Self {
            links: [LinkageMask::default(); NLINKS],
            state: MaskState::Dirty,
        }
    }

    pub fn links(&self) -> &[LinkageMask; NLINKS] {
        &self.links
    }

    pub fn state(&self) -> MaskState {
        self.state
    }

    pub fn mark_dirty(&mut self) {
        self.state = MaskState::Dirty;
    }

    /// Clear the dirty state, returning whether it was set
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.state, MaskState::Clean) == MaskState::Dirty
    }

    /// Any linkage selects the rank
    pub fn is_engaged(&self) -> bool {
        self.links.iter().any(LinkageMask::is_engaged)
    }

    /// Any linkage shares a keyboard with `keys`
    pub fn intersects(&self, keys: u8) -> bool {
        self.links.iter().any(|l| l.keyboards & keys != 0)
    }

    /// OR another mask into this one and mark it dirty
    pub fn merge(&mut self, other: &NoteMask) {
        for (a, b) in self.links.iter_mut().zip(other.links.iter()) {
            a.keyboards |= b.keyboards;
            a.follows_division |= b.follows_division;
        }
        self.mark_dirty();
    }

    /// Select keyboard `bit` on every linkage that follows the division
    pub fn follow_set(&mut self, bit: usize) {
        let Some(b) = keyboard_bit(bit) else { return };
        let mut touched = false;
        for link in self.links.iter_mut().filter(|l| l.follows_division) {
            link.keyboards |= b;
            touched = true;
        }
        if touched {
            self.mark_dirty();
        }
    }

    /// Deselect keyboard `bit` on every linkage that follows the division
    pub fn follow_clear(&mut self, bit: usize) {
        let Some(b) = keyboard_bit(bit) else { return };
        let mut touched = false;
        for link in self.links.iter_mut().filter(|l| l.follows_division) {
            link.keyboards &= !b;
            touched = true;
        }
        if touched {
            self.mark_dirty();
        }
    }

    /// Set a bit of one linkage
    ///
    /// `bit == NKEYBD` addresses the follow flag; the division's merged
    /// keyboard mask is then ORed in as well.
    pub fn set(&mut self, linkage: usize, bit: usize, division_mask: u8) {
        let Some(link) = self.links.get_mut(linkage) else { return };
        if bit == NKEYBD {
            link.follows_division = true;
            link.keyboards |= division_mask;
        } else if let Some(b) = keyboard_bit(bit) {
            link.keyboards |= b;
        } else {
            return;
        }
        self.mark_dirty();
    }

    /// Clear a bit of one linkage, the mirror image of [`NoteMask::set`]
    pub fn clear(&mut self, linkage: usize, bit: usize, division_mask: u8) {
        let Some(link) = self.links.get_mut(linkage) else { return };
        if bit == NKEYBD {
            link.follows_division = false;
            link.keyboards &= !division_mask;
        } else if let Some(b) = keyboard_bit(bit) {
            link.keyboards &= !b;
        } else {
            return;
        }
        self.mark_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_mask_is_dirty_and_disengaged() {
        let mut m = NoteMask::new();
        assert!(!m.is_engaged());
        assert!(m.take_dirty());
        assert!(!m.take_dirty());
    }

    #[test]
    fn test_keyboard_bits_per_linkage() {
        let mut m = NoteMask::new();
        m.take_dirty();
        m.set(1, 3, 0);
        assert_eq!(m.state(), MaskState::Dirty);
        assert!(m.is_engaged());
        assert!(m.intersects(0b1000));
        assert!(!m.intersects(0b0100));
        assert_eq!(m.links()[1].keyboards, 0b1000);
        assert_eq!(m.links()[0].keyboards, 0);

        m.clear(1, 3, 0);
        assert!(!m.is_engaged());
    }

    #[test]
    fn test_follow_flag_takes_division_mask() {
        let mut m = NoteMask::new();
        m.set(0, NKEYBD, 0b0011);
        assert!(m.links()[0].follows_division);
        assert_eq!(m.links()[0].keyboards, 0b0011);

        m.follow_set(4);
        assert_eq!(m.links()[0].keyboards, 0b1_0011);
        m.follow_clear(0);
        assert_eq!(m.links()[0].keyboards, 0b1_0010);

        m.clear(0, NKEYBD, 0b1_0010);
        assert!(!m.is_engaged());
    }

    #[test]
    fn test_follow_engages_without_keyboards() {
        let mut m = NoteMask::new();
        m.set(2, NKEYBD, 0);
        assert!(m.is_engaged());
        assert!(!m.intersects(0xff));
    }

    #[test]
    fn test_follow_updates_skip_plain_linkages() {
        let mut m = NoteMask::new();
        m.set(0, 1, 0);
        m.take_dirty();
        m.follow_set(5);
        assert_eq!(m.links()[0].keyboards, 0b10);
        assert_eq!(m.state(), MaskState::Clean);
    }

    #[test]
    fn test_out_of_range_bits_ignored() {
        let mut m = NoteMask::new();
        m.take_dirty();
        m.set(NLINKS, 0, 0);
        m.set(0, NKEYBD + 1, 0);
        assert!(!m.is_engaged());
        assert_eq!(m.state(), MaskState::Clean);
    }

    #[test]
    fn test_merge_keeps_both() {
        let mut a = NoteMask::new();
        a.set(0, 0, 0);
        a.take_dirty();
        let mut b = NoteMask::new();
        b.set(1, NKEYBD, 0b100);
        a.merge(&b);
        assert_eq!(a.state(), MaskState::Dirty);
        assert_eq!(a.links()[0].keyboards, 1);
        assert!(a.links()[1].follows_division);
        assert_eq!(a.links()[1].keyboards, 0b100);
    }

    #[test]
    fn test_merge_masks_fold() {
        assert_eq!(merge_masks(&[0b001, 0b100, 0b000]), 0b101);
        assert_eq!(merge_masks(&[0; NLINKS]), 0);
    }
}
