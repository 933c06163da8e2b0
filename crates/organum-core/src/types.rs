//! Common types for organum
//!
//! Fixed engine dimensions and the bounded parameter type shared by the
//! synthesis, mixing and control layers.

use serde::{Deserialize, Serialize};

/// Frames per synthesis period
///
/// Every wavetable, ring buffer and ramp in the engine is aligned to this.
pub const PERIOD: usize = 64;

/// Length of the acoustic section delay ring, in periods
pub const MIXLEN: usize = 64;

/// Channels per division scratch buffer and per acoustic section ring
pub const NCHANN: usize = 4;

/// Number of acoustic sections
pub const NASECT: usize = 4;

/// Maximum number of divisions
pub const NDIVIS: usize = 8;

/// Number of keyboards (manuals and pedal)
pub const NKEYBD: usize = 8;

/// Rank slots per division
pub const NRANKS: usize = 32;

/// Notes in the keymap
pub const NNOTES: usize = 61;

/// Independent linkages (drawstop, coupler, general) per rank
pub const NLINKS: usize = 3;

/// MIDI note number of keymap entry 0
pub const NOTE_BASE: u8 = 36;

/// Highest MIDI note covered by the keymap
pub const NOTE_TOP: u8 = NOTE_BASE + NNOTES as u8 - 1;

/// Audio sample type
pub type Sample = f32;

/// One period of mono audio
pub type PeriodBuffer = [Sample; PERIOD];

/// One period of audio for every division/section channel
pub type ChannelBuffer = [PeriodBuffer; NCHANN];

/// A bounded, continuously variable parameter
///
/// Values written through [`FParam::set`] are clamped to `[min, max]`.
/// NaN and infinities are ignored, so a bad payload keeps the last value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FParam {
    pub value: f32,
    pub min: f32,
    pub max: f32,
}

impl FParam {
    pub const fn new(value: f32, min: f32, max: f32) -> Self {
        Self { value, min, max }
    }

    /// Set the value, clamped to the parameter range
    #[inline]
    pub fn set(&mut self, value: f32) {
        if value.is_finite() {
            self.value = value.clamp(self.min, self.max);
        }
    }

    /// Map a normalized 0..1 control position onto the range
    pub fn from_normalized(&self, position: f32) -> f32 {
        self.min + position.clamp(0.0, 1.0) * (self.max - self.min)
    }
}

/// Fast approximation of `2^x`
///
/// Accurate to about 1e-4 relative, used for dB and cent conversions
/// during wave generation.
pub fn exp2ap(x: f32) -> f32 {
    let i = x.floor();
    let x = x - i;
    let m = 1.0 + x * (0.6930 + x * (0.2416 + x * (0.0517 + x * 0.0137)));
    m * 2f32.powi(i as i32)
}

/// Convert a MIDI note number to its keymap index
#[inline]
pub fn keymap_index(note: u8) -> Option<usize> {
    (NOTE_BASE..=NOTE_TOP)
        .contains(&note)
        .then(|| (note - NOTE_BASE) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_length_is_power_of_two() {
        assert!((MIXLEN * PERIOD).is_power_of_two());
        assert!(PERIOD.is_power_of_two());
    }

    #[test]
    fn test_fparam_clamps() {
        let mut p = FParam::new(0.5, 0.0, 1.0);
        p.set(1.7);
        assert_eq!(p.value, 1.0);
        p.set(-3.0);
        assert_eq!(p.value, 0.0);
        assert!((p.from_normalized(0.25) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_fparam_ignores_non_finite() {
        let mut p = FParam::new(0.5, 0.0, 1.0);
        p.set(0.3);
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            p.set(bad);
            assert_eq!(p.value, 0.3);
        }
        p.set(0.7);
        assert_eq!(p.value, 0.7);
    }

    #[test]
    fn test_exp2ap_accuracy() {
        for i in -40..40 {
            let x = i as f32 * 0.37;
            let exact = 2f32.powf(x);
            assert!(
                ((exp2ap(x) - exact) / exact).abs() < 1e-3,
                "exp2ap({}) = {}, expected {}",
                x,
                exp2ap(x),
                exact
            );
        }
    }

    #[test]
    fn test_keymap_index_bounds() {
        assert_eq!(keymap_index(35), None);
        assert_eq!(keymap_index(36), Some(0));
        assert_eq!(keymap_index(96), Some(60));
        assert_eq!(keymap_index(97), None);
    }
}
