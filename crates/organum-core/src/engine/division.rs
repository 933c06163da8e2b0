//! Division: a group of ranks played from the keyboards
//!
//! Each period the division renders its ranks into a four-channel scratch
//! buffer, applies the tremulant as a slew-limited gain and the swell as a
//! low-pass cross-fade, and accumulates the result into the ring of its
//! acoustic section.

use std::f32::consts::TAU;

use basedrop::Owned;

use crate::synth::rankwave::Rankwave;
use crate::synth::stop::Pan;
use crate::types::{keymap_index, ChannelBuffer, FParam, NCHANN, NKEYBD, NLINKS, NOTE_BASE, NRANKS, PERIOD};

use super::asection::Asection;
use super::keymap::Keymap;
use super::linkage::merge_masks;

/// Swell filter cutoff in Hz
const SWELL_CUTOFF: f32 = 160.0;

/// Gain at division creation, ramped up by the slew limit
const INITIAL_GAIN: f32 = 0.1;

/// Performance parameters of a division
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DivisionParam {
    Swell = 0,
    TremulantFrequency = 1,
    TremulantDepth = 2,
}

impl DivisionParam {
    pub const COUNT: usize = 3;

    pub fn from_index(i: u8) -> Option<Self> {
        match i {
            0 => Some(Self::Swell),
            1 => Some(Self::TremulantFrequency),
            2 => Some(Self::TremulantDepth),
            _ => None,
        }
    }
}

/// Default division parameters
pub const DIVISION_PARAMS: [FParam; DivisionParam::COUNT] = [
    FParam::new(1.0, 0.0, 1.0),
    FParam::new(4.0, 2.0, 8.0),
    FParam::new(0.3, 0.0, 0.6),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TremulantState {
    Off,
    On,
    /// Runs until the next zero crossing
    Fading,
}

/// Quadrature oscillator driving the tremulant gain
#[derive(Debug, Clone)]
struct Tremulant {
    state: TremulantState,
    /// Engaged sources
    sources: u8,
    w: f32,
    c: f32,
    s: f32,
}

impl Tremulant {
    fn new() -> Self {
        Self {
            state: TremulantState::Off,
            sources: 0,
            w: 0.0,
            c: 1.0,
            s: 0.0,
        }
    }

    /// Advance one period, returning the sine phase
    fn step(&mut self) -> f32 {
        self.s += self.w * self.c;
        self.c -= self.w * self.s;
        let t = (self.c * self.c + self.s * self.s).sqrt();
        self.c /= t;
        self.s /= t;
        if self.state == TremulantState::Fading && self.s.abs() < 0.05 {
            self.state = TremulantState::Off;
            self.c = 1.0;
            self.s = 0.0;
        }
        self.s
    }
}

/// Source bits of a tremulant command, zero meaning the first source
#[inline]
fn source_bits(sources: u8) -> u8 {
    if sources == 0 {
        1
    } else {
        sources
    }
}

pub struct Division {
    section: usize,
    fsamp: f32,
    ranks: [Option<Owned<Rankwave>>; NRANKS],
    /// Keyboards assigned to the division, per linkage
    div_masks: [u8; NLINKS],
    buffer: ChannelBuffer,
    params: [FParam; DivisionParam::COUNT],
    trem: Tremulant,
    gain: f32,
    swell_last: f32,
    swell_alpha: f32,
    swell_y1: [f32; NCHANN],
}

impl Division {
    pub fn new(section: usize, fsamp: f32) -> Self {
        let y = 1.0 - (TAU * SWELL_CUTOFF / fsamp).cos();
        let mut division = Self {
            section,
            fsamp,
            ranks: std::array::from_fn(|_| None),
            div_masks: [0; NLINKS],
            buffer: [[0.0; PERIOD]; NCHANN],
            params: DIVISION_PARAMS,
            trem: Tremulant::new(),
            gain: INITIAL_GAIN,
            swell_last: 1.0,
            swell_alpha: -y + (y * y + 2.0 * y).sqrt(),
            swell_y1: [0.0; NCHANN],
        };
        division.set_tfreq(DIVISION_PARAMS[DivisionParam::TremulantFrequency as usize].value);
        division
    }

    /// Acoustic section this division feeds
    pub fn section(&self) -> usize {
        self.section
    }

    pub fn params(&self) -> &[FParam; DivisionParam::COUNT] {
        &self.params
    }

    pub fn param(&self, p: DivisionParam) -> f32 {
        self.params[p as usize].value
    }

    pub fn set_param(&mut self, p: DivisionParam, value: f32) {
        match p {
            DivisionParam::Swell => self.set_swell(value),
            DivisionParam::TremulantFrequency => self.set_tfreq(value),
            DivisionParam::TremulantDepth => self.set_tmodd(value),
        }
    }

    pub fn set_swell(&mut self, value: f32) {
        self.params[DivisionParam::Swell as usize].set(value);
    }

    pub fn set_tfreq(&mut self, freq: f32) {
        let p = &mut self.params[DivisionParam::TremulantFrequency as usize];
        p.set(freq);
        self.trem.w = TAU * PERIOD as f32 * p.value / self.fsamp;
    }

    pub fn set_tmodd(&mut self, depth: f32) {
        self.params[DivisionParam::TremulantDepth as usize].set(depth);
    }

    pub fn trem_on(&mut self, sources: u8) {
        self.trem.sources |= source_bits(sources);
        self.trem.state = TremulantState::On;
    }

    pub fn trem_off(&mut self, sources: u8) {
        self.trem.sources &= !source_bits(sources);
        if self.trem.sources == 0 && self.trem.state == TremulantState::On {
            self.trem.state = TremulantState::Fading;
        }
    }

    pub fn tremulant_active(&self) -> bool {
        self.trem.state != TremulantState::Off
    }

    pub fn rank(&self, index: usize) -> Option<&Rankwave> {
        self.ranks.get(index)?.as_deref()
    }

    /// Number of occupied rank slots
    pub fn rank_count(&self) -> usize {
        self.ranks.iter().filter(|r| r.is_some()).count()
    }

    /// Install a rank, carrying over the note mask of the one it replaces
    ///
    /// The replaced rank is returned so its drop goes through the collector.
    pub fn set_rank(&mut self, index: usize, mut rank: Owned<Rankwave>, delay_ms: u32, pan: Pan) -> Option<Owned<Rankwave>> {
        let Some(slot) = self.ranks.get_mut(index) else {
            return Some(rank);
        };
        match slot {
            Some(old) => rank.mask.merge(&old.mask),
            None => rank.mask.mark_dirty(),
        }
        rank.set_param(self.fsamp, delay_ms, pan);
        slot.replace(rank)
    }

    /// Keyboards assigned to the division on any linkage
    pub fn div_mask(&self) -> u8 {
        merge_masks(&self.div_masks)
    }

    pub fn set_div_mask(&mut self, bit: usize, linkage: usize) {
        if bit >= NKEYBD || linkage >= NLINKS {
            return;
        }
        self.div_masks[linkage] |= 1 << bit;
        for rank in self.ranks.iter_mut().flatten() {
            rank.mask.follow_set(bit);
        }
    }

    pub fn clr_div_mask(&mut self, bit: usize, linkage: usize) {
        if bit >= NKEYBD || linkage >= NLINKS {
            return;
        }
        self.div_masks[linkage] &= !(1 << bit);
        if self.div_mask() & (1 << bit) != 0 {
            return;
        }
        for rank in self.ranks.iter_mut().flatten() {
            rank.mask.follow_clear(bit);
        }
    }

    pub fn set_rank_mask(&mut self, index: usize, linkage: usize, bit: usize) {
        let merged = self.div_mask();
        if let Some(rank) = self.ranks.get_mut(index).and_then(Option::as_mut) {
            rank.mask.set(linkage, bit, merged);
        }
    }

    pub fn clr_rank_mask(&mut self, index: usize, linkage: usize, bit: usize) {
        let merged = self.div_mask();
        if let Some(rank) = self.ranks.get_mut(index).and_then(Option::as_mut) {
            rank.mask.clear(linkage, bit, merged);
        }
    }

    /// Apply a key change: `keys` holds the keyboards sounding keymap entry `note`
    pub fn update_note(&mut self, note: usize, keys: u8) {
        let midi = NOTE_BASE + note as u8;
        for rank in self.ranks.iter_mut().flatten() {
            if !rank.mask.is_engaged() {
                continue;
            }
            if rank.mask.intersects(keys) {
                rank.note_on(midi);
            } else {
                rank.note_off(midi);
            }
        }
    }

    /// Resynchronize ranks whose note mask changed with the whole keymap
    pub fn update_keymap(&mut self, keymap: &Keymap) {
        for rank in self.ranks.iter_mut().flatten() {
            if !rank.mask.take_dirty() {
                continue;
            }
            if !rank.mask.is_engaged() {
                rank.all_off();
                continue;
            }
            for n in rank.n0()..=rank.n1() {
                let keys = keymap_index(n).map_or(0, |i| keymap.keyboards(i));
                if rank.mask.intersects(keys) {
                    rank.note_on(n);
                } else {
                    rank.note_off(n);
                }
            }
        }
    }

    /// Render one period into the section ring
    pub fn process(&mut self, section: &mut Asection) {
        for plane in self.buffer.iter_mut() {
            plane.fill(0.0);
        }
        for rank in self.ranks.iter_mut().flatten() {
            rank.play(&mut self.buffer);
        }

        let mut g = 1.0f32;
        if self.trem.state != TremulantState::Off {
            let s = self.trem.step();
            g *= 1.0 + self.param(DivisionParam::TremulantDepth) * s;
        }
        let g = g.clamp(0.95 * self.gain, 1.05 * self.gain);
        let dg = (g - self.gain) / PERIOD as f32;
        let swell = self.param(DivisionParam::Swell);
        let dswell = (swell - self.swell_last) / PERIOD as f32;
        let alpha = self.swell_alpha;

        for (c, input) in self.buffer.iter().enumerate() {
            let slot = section.write_slot(c);
            let mut gi = self.gain;
            let mut sw = self.swell_last;
            let mut y1 = self.swell_y1[c];
            for (out, x) in slot.iter_mut().zip(input.iter()) {
                gi += dg;
                sw += dswell;
                let x0 = x * gi;
                let y0 = alpha * x0 + (1.0 - alpha) * y1;
                *out += y0 + sw * (x0 - y0);
                y1 = y0;
            }
            self.swell_y1[c] = y1;
        }
        self.gain = g;
        self.swell_last = swell;
    }
}
