//! Historical temperaments
//!
//! Each temperament is a table of twelve frequency ratios relative to C.
//! Pipe frequencies are derived from the ratio of the pipe's pitch class to
//! that of A (index 9), so the tuning base always sets A exactly.

use serde::{Deserialize, Serialize};

const PYTHAGOREAN: [f32; 12] = [
    1.00000000, 1.06787109, 1.12500000, 1.18518519, 1.26562500, 1.33333333,
    1.42382812, 1.50000000, 1.60180664, 1.68750000, 1.77777778, 1.89843750,
];

const MEANTONE_QUARTER: [f32; 12] = [
    1.00000000, 1.04490673, 1.11803399, 1.19627902, 1.25000000, 1.33748061,
    1.39754249, 1.49534878, 1.56250000, 1.67185076, 1.78885438, 1.86918598,
];

const MEANTONE_THIRD: [f32; 12] = [
    1.00000000, 1.03736221, 1.11572158, 1.20000000, 1.24483465, 1.33886590,
    1.38888889, 1.49380158, 1.54961331, 1.66666667, 1.79256190, 1.85953597,
];

const WERCKMEISTER_III: [f32; 12] = [
    1.00000000, 1.05349794, 1.11740331, 1.18518519, 1.25282725, 1.33333333,
    1.40466392, 1.49492696, 1.58024691, 1.67043633, 1.77777778, 1.87924088,
];

const NEIDHARDT_GROSSE_STADT: [f32; 12] = [
    1.00000000, 1.05707299, 1.11992982, 1.18786496, 1.25565996, 1.33333333,
    1.41102316, 1.49661606, 1.58381994, 1.67610496, 1.77978647, 1.88348995,
];

const NEIDHARDT_KLEINE_STADT: [f32; 12] = [
    1.00000000, 1.05587996, 1.11992982, 1.18652431, 1.25424281, 1.33333333,
    1.40783995, 1.49661606, 1.58381994, 1.67610496, 1.77777778, 1.87924087,
];

const KIRNBERGER_III: [f32; 12] = [
    1.00000000, 1.05349794, 1.11848107, 1.18518519, 1.25000021, 1.33333333,
    1.40625000, 1.49542183, 1.58024691, 1.67176840, 1.77777778, 1.87500000,
];

const WELL_TEMPERED: [f32; 12] = [
    1.00000000, 1.05468828, 1.12246205, 1.18652432, 1.25282725, 1.33483985,
    1.40606829, 1.49830708, 1.58203242, 1.67705161, 1.77978647, 1.87711994,
];

const EQUAL: [f32; 12] = [
    1.00000000, 1.05946309, 1.12246205, 1.18920712, 1.25992105, 1.33483985,
    1.41421356, 1.49830708, 1.58740105, 1.68179283, 1.78179744, 1.88774863,
];

const VOGEL_AHREND: [f32; 12] = [
    1.00000000, 1.05064661, 1.11891853, 1.18518519, 1.25197868, 1.33695184,
    1.40086215, 1.49594019, 1.57596992, 1.67383521, 1.78260246, 1.87288523,
];

const VALLOTTI: [f32; 12] = [
    1.00000000, 1.05647631, 1.12035146, 1.18808855, 1.25518740, 1.33609659,
    1.40890022, 1.49689777, 1.58441623, 1.67705160, 1.78179744, 1.87888722,
];

const KELLNER: [f32; 12] = [
    1.00000000, 1.05349794, 1.11891853, 1.18518519, 1.25197868, 1.33333333,
    1.40466392, 1.49594019, 1.58024691, 1.67383521, 1.77777778, 1.87796802,
];

const LEHMAN: [f32; 12] = [
    1.00000000, 1.05826737, 1.11992982, 1.18786496, 1.25424281, 1.33634808,
    1.41102316, 1.49661606, 1.58560949, 1.67610496, 1.77978647, 1.88136421,
];

const PURE_CFG: [f32; 12] = [
    1.00000000, 1.04166667, 1.12500000, 1.18920000, 1.25000000, 1.33333333,
    1.40625000, 1.50000000, 1.58740000, 1.66666667, 1.77777778, 1.87500000,
];

/// Keyboard temperament
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Temperament {
    Pythagorean,
    MeantoneQuarter,
    MeantoneThird,
    WerckmeisterIii,
    NeidhardtGrosseStadt,
    NeidhardtKleineStadt,
    KirnbergerIii,
    WellTempered,
    #[default]
    Equal,
    VogelAhrend,
    Vallotti,
    Kellner,
    Lehman,
    PureCfg,
}

impl Temperament {
    pub const ALL: [Temperament; 14] = [
        Temperament::Pythagorean,
        Temperament::MeantoneQuarter,
        Temperament::MeantoneThird,
        Temperament::WerckmeisterIii,
        Temperament::NeidhardtGrosseStadt,
        Temperament::NeidhardtKleineStadt,
        Temperament::KirnbergerIii,
        Temperament::WellTempered,
        Temperament::Equal,
        Temperament::VogelAhrend,
        Temperament::Vallotti,
        Temperament::Kellner,
        Temperament::Lehman,
        Temperament::PureCfg,
    ];

    /// Frequency ratios of the twelve pitch classes, C first
    pub fn ratios(&self) -> &'static [f32; 12] {
        match self {
            Temperament::Pythagorean => &PYTHAGOREAN,
            Temperament::MeantoneQuarter => &MEANTONE_QUARTER,
            Temperament::MeantoneThird => &MEANTONE_THIRD,
            Temperament::WerckmeisterIii => &WERCKMEISTER_III,
            Temperament::NeidhardtGrosseStadt => &NEIDHARDT_GROSSE_STADT,
            Temperament::NeidhardtKleineStadt => &NEIDHARDT_KLEINE_STADT,
            Temperament::KirnbergerIii => &KIRNBERGER_III,
            Temperament::WellTempered => &WELL_TEMPERED,
            Temperament::Equal => &EQUAL,
            Temperament::VogelAhrend => &VOGEL_AHREND,
            Temperament::Vallotti => &VALLOTTI,
            Temperament::Kellner => &KELLNER,
            Temperament::Lehman => &LEHMAN,
            Temperament::PureCfg => &PURE_CFG,
        }
    }

    /// Human readable name
    pub fn label(&self) -> &'static str {
        match self {
            Temperament::Pythagorean => "Pythagorean",
            Temperament::MeantoneQuarter => "Meantone 1/4",
            Temperament::MeantoneThird => "Meantone 1/3",
            Temperament::WerckmeisterIii => "Werckmeister III",
            Temperament::NeidhardtGrosseStadt => "Neidhardt Große Stadt",
            Temperament::NeidhardtKleineStadt => "Neidhardt Kleine Stadt",
            Temperament::KirnbergerIii => "Kirnberger III",
            Temperament::WellTempered => "Well Tempered",
            Temperament::Equal => "Equally Tempered",
            Temperament::VogelAhrend => "Vogel/Ahrend",
            Temperament::Vallotti => "Vallotti-Barca",
            Temperament::Kellner => "Kellner",
            Temperament::Lehman => "Lehman",
            Temperament::PureCfg => "Pure C/F/G",
        }
    }
}

/// Default pitch of A4 in Hz
pub const DEFAULT_BASE_FREQUENCY: f32 = 440.0;

/// Instrument tuning: the pitch of A4 plus a temperament
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub base_frequency: f32,
    pub temperament: Temperament,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            base_frequency: DEFAULT_BASE_FREQUENCY,
            temperament: Temperament::default(),
        }
    }
}

impl Tuning {
    pub fn scale(&self) -> &'static [f32; 12] {
        self.temperament.ratios()
    }

    /// Frequency of a MIDI note for a stop sounding at `ratio` times unison
    pub fn pipe_frequency(&self, note: u8, ratio: f32) -> f32 {
        let scale = self.scale();
        let base = self.base_frequency * ratio / scale[9];
        let octave = note as i32 / 12 - 5;
        base * scale[note as usize % 12] * 2f32.powi(octave)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_is_ascending_within_octave() {
        for t in Temperament::ALL {
            let r = t.ratios();
            assert_eq!(r[0], 1.0, "{} must start at unison", t.label());
            for w in r.windows(2) {
                assert!(w[0] < w[1], "{} is not ascending", t.label());
            }
            assert!(r[11] < 2.0);
        }
    }

    #[test]
    fn test_a4_matches_base_frequency() {
        for t in Temperament::ALL {
            let tuning = Tuning {
                base_frequency: 440.0,
                temperament: t,
            };
            assert!((tuning.pipe_frequency(69, 1.0) - 440.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_equal_temperament_semitones() {
        let tuning = Tuning::default();
        let c4 = tuning.pipe_frequency(60, 1.0);
        assert!((c4 - 261.6256).abs() < 0.01, "C4 = {}", c4);
        let c5 = tuning.pipe_frequency(72, 1.0);
        assert!((c5 / c4 - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_stop_ratio_scales_frequency() {
        let tuning = Tuning::default();
        let unison = tuning.pipe_frequency(48, 1.0);
        let octave = tuning.pipe_frequency(48, 2.0);
        assert!((octave / unison - 2.0).abs() < 1e-5);
    }
}
