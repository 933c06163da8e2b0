//! Stop definitions
//!
//! A [`StopDefinition`] describes the sound of one rank of pipes as a set of
//! per-note curves: overall level and tuning, attack and release behaviour,
//! and the level and attack of each harmonic. Wave generation samples these
//! curves once per pipe.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{NOTE_BASE, NOTE_TOP};

/// Number of breakpoints in a [`NoteCurve`]
pub const NOTE_POINTS: usize = 11;

/// Semitones between two curve breakpoints
pub const NOTE_STEP: usize = 6;

/// Maximum number of harmonics per pipe
pub const N_HARM: usize = 64;

/// A piecewise-linear function of the note offset within a rank
///
/// Breakpoints sit every six semitones, covering five octaves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteCurve([f32; NOTE_POINTS]);

impl NoteCurve {
    pub const fn constant(value: f32) -> Self {
        Self([value; NOTE_POINTS])
    }

    /// Straight line from the bottom breakpoint to the top one
    pub fn linear(bottom: f32, top: f32) -> Self {
        let mut points = [0.0; NOTE_POINTS];
        for (i, p) in points.iter_mut().enumerate() {
            let m = i as f32 / (NOTE_POINTS - 1) as f32;
            *p = bottom + m * (top - bottom);
        }
        Self(points)
    }

    pub fn from_points(points: [f32; NOTE_POINTS]) -> Self {
        Self(points)
    }

    pub fn points(&self) -> &[f32; NOTE_POINTS] {
        &self.0
    }

    /// Interpolated value at a note offset, clamped to the curve
    pub fn value_at(&self, n: usize) -> f32 {
        let i = n / NOTE_STEP;
        if i >= NOTE_POINTS - 1 {
            return self.0[NOTE_POINTS - 1];
        }
        let m = (n % NOTE_STEP) as f32 / NOTE_STEP as f32;
        self.0[i] + m * (self.0[i + 1] - self.0[i])
    }
}

/// Per-harmonic curves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonicDefinition {
    /// Level in dB; below -80 the harmonic is skipped
    pub level: NoteCurve,
    /// Random level variation in dB
    pub random: NoteCurve,
    /// Attack time in seconds
    pub attack: NoteCurve,
    /// Attack overshoot ("percussiveness")
    pub attack_peak: NoteCurve,
}

impl HarmonicDefinition {
    pub fn new(level: f32, attack: f32, attack_peak: f32) -> Self {
        Self {
            level: NoteCurve::constant(level),
            random: NoteCurve::constant(0.0),
            attack: NoteCurve::constant(attack),
            attack_peak: NoteCurve::constant(attack_peak),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FootageError {
    #[error("Expected pitch written as 'a+b/c', got '{0}'")]
    Malformed(String),
}

/// Sounding pitch of a stop, in feet
///
/// Written as `8`, `2+2/3` or `1/2`. An 8' stop sounds at unison; a zero
/// footage marks a rank section without pipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Footage {
    pub num: u32,
    pub den: u32,
}

impl Footage {
    pub const fn feet(feet: u32) -> Self {
        Self { num: feet, den: 1 }
    }

    /// Frequency ratio relative to unison, zero for a silent footage
    pub fn ratio(&self) -> f32 {
        if self.num == 0 || self.den == 0 {
            0.0
        } else {
            8.0 * self.den as f32 / self.num as f32
        }
    }
}

impl FromStr for Footage {
    type Err = FootageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || FootageError::Malformed(s.to_string());
        let s = s.trim();
        let (wholes, fraction) = match s.split_once('+') {
            Some((w, f)) => (w.trim().parse::<u32>().map_err(|_| malformed())?, Some(f)),
            None if s.contains('/') => (0, Some(s)),
            None => (s.parse::<u32>().map_err(|_| malformed())?, None),
        };
        let (num, den) = match fraction {
            Some(f) => {
                let (n, d) = f.split_once('/').ok_or_else(malformed)?;
                let n = n.trim().parse::<u32>().map_err(|_| malformed())?;
                let d = d.trim().parse::<u32>().map_err(|_| malformed())?;
                if d == 0 {
                    return Err(malformed());
                }
                (n, d)
            }
            None => (0, 1),
        };
        Ok(Self {
            num: num + wholes * den,
            den,
        })
    }
}

impl TryFrom<String> for Footage {
    type Error = FootageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Footage> for String {
    fn from(f: Footage) -> Self {
        f.to_string()
    }
}

impl fmt::Display for Footage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wholes = self.num / self.den;
        let rest = self.num % self.den;
        match (wholes, rest) {
            (w, 0) => write!(f, "{}", w),
            (0, r) => write!(f, "{}/{}", r, self.den),
            (w, r) => write!(f, "{}+{}/{}", w, r, self.den),
        }
    }
}

/// A note from which the rank continues at a different footage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepetitionPoint {
    pub note: u8,
    pub footage: Footage,
}

/// Output channel placement of a rank's pipes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Pan {
    Left,
    Center,
    Right,
    /// Pipes alternate over all four channels
    #[default]
    Wide,
}

impl Pan {
    /// Channel of the pipe sounding `note`
    pub fn channel(&self, note: u8) -> usize {
        let (a, b) = match self {
            Pan::Left => (2, 0),
            Pan::Center => (2, 1),
            Pan::Right => (2, 2),
            Pan::Wide => (4, 0),
        };
        (note as usize % a) + b
    }
}

/// Complete description of one stop's sound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopDefinition {
    pub name: String,
    /// Base name of the waveform cache file
    pub filename: String,
    /// Lowest MIDI note
    pub n0: u8,
    /// Highest MIDI note
    pub n1: u8,
    pub footage: Footage,
    #[serde(default)]
    pub pan: Pan,
    /// Speaking delay in milliseconds
    #[serde(default)]
    pub delay_ms: u32,
    /// Breaks back, sorted by note
    #[serde(default)]
    pub repetitions: Vec<RepetitionPoint>,
    /// Overall level in dB
    pub volume: NoteCurve,
    /// Fixed detune in Hz
    pub offset: NoteCurve,
    /// Random detune in Hz
    pub random: NoteCurve,
    /// Wind instability
    pub instability: NoteCurve,
    /// Attack time in seconds
    pub attack: NoteCurve,
    /// Pitch offset at the start of the attack in cents
    pub attack_detune: NoteCurve,
    /// Release time in seconds
    pub decay: NoteCurve,
    /// Pitch drift during release in cents
    pub decay_detune: NoteCurve,
    pub harmonics: Vec<HarmonicDefinition>,
}

impl StopDefinition {
    /// A stop with flat curves and no harmonics, covering the whole keymap
    pub fn new(name: &str, footage: Footage) -> Self {
        Self {
            name: name.to_string(),
            filename: format!("{}.stop", name.to_lowercase().replace(' ', "-")),
            n0: NOTE_BASE,
            n1: NOTE_TOP,
            footage,
            pan: Pan::default(),
            delay_ms: 0,
            repetitions: Vec::new(),
            volume: NoteCurve::constant(-20.0),
            offset: NoteCurve::constant(0.0),
            random: NoteCurve::constant(0.0),
            instability: NoteCurve::constant(0.0),
            attack: NoteCurve::constant(0.02),
            attack_detune: NoteCurve::constant(0.0),
            decay: NoteCurve::constant(0.05),
            decay_detune: NoteCurve::constant(0.0),
            harmonics: Vec::new(),
        }
    }

    /// Open flue principal
    pub fn principal(footage: Footage) -> Self {
        let mut stop = Self::new(&format!("Principal {}", footage), footage);
        stop.volume = NoteCurve::linear(-16.0, -20.0);
        stop.random = NoteCurve::constant(0.1);
        stop.instability = NoteCurve::constant(1.0);
        stop.attack = NoteCurve::linear(0.06, 0.03);
        stop.attack_detune = NoteCurve::constant(-20.0);
        stop.decay = NoteCurve::constant(0.08);
        stop.harmonics = (0..16)
            .map(|h| {
                let level = -6.0 * (h as f32 + 1.0).log2() * 1.6;
                let attack = 0.03 + 0.002 * h as f32;
                HarmonicDefinition::new(level, attack, if h < 2 { 0.5 } else { 0.2 })
            })
            .collect();
        stop
    }

    /// Stopped flute, odd harmonics dominant
    pub fn flute(footage: Footage) -> Self {
        let mut stop = Self::new(&format!("Gedackt {}", footage), footage);
        stop.volume = NoteCurve::linear(-14.0, -18.0);
        stop.random = NoteCurve::constant(0.05);
        stop.instability = NoteCurve::constant(0.5);
        stop.attack = NoteCurve::constant(0.04);
        stop.decay = NoteCurve::constant(0.06);
        stop.harmonics = (0..8)
            .map(|h| {
                let level = if h % 2 == 0 { -12.0 * h as f32 / 2.0 } else { -36.0 };
                HarmonicDefinition::new(level, 0.04, 0.0)
            })
            .collect();
        stop
    }

    /// Bright chorus reed
    pub fn trumpet(footage: Footage) -> Self {
        let mut stop = Self::new(&format!("Trompete {}", footage), footage);
        stop.volume = NoteCurve::linear(-22.0, -26.0);
        stop.instability = NoteCurve::constant(0.3);
        stop.attack = NoteCurve::constant(0.015);
        stop.attack_detune = NoteCurve::constant(-10.0);
        stop.decay = NoteCurve::constant(0.04);
        stop.pan = Pan::Center;
        stop.harmonics = (0..32)
            .map(|h| HarmonicDefinition::new(-1.5 * h as f32, 0.01, 1.0))
            .collect();
        stop
    }

    pub fn harmonic(&self, h: usize) -> Option<&HarmonicDefinition> {
        self.harmonics.get(h)
    }

    /// Harmonic level in dB, -100 for undefined harmonics
    pub fn harmonic_level(&self, h: usize, n: usize) -> f32 {
        self.harmonic(h).map_or(-100.0, |d| d.level.value_at(n))
    }

    /// Harmonic attack time in seconds, zero for undefined harmonics
    pub fn harmonic_attack(&self, h: usize, n: usize) -> f32 {
        self.harmonic(h).map_or(0.0, |d| d.attack.value_at(n))
    }

    /// Number of pipes in the rank
    pub fn note_count(&self) -> usize {
        (self.n1 as usize + 1).saturating_sub(self.n0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_interpolation() {
        let curve = NoteCurve::linear(0.0, 60.0);
        assert!((curve.value_at(0) - 0.0).abs() < 1e-5);
        assert!((curve.value_at(3) - 3.0).abs() < 1e-5);
        assert!((curve.value_at(60) - 60.0).abs() < 1e-5);
        // beyond the last breakpoint the curve is flat
        assert!((curve.value_at(75) - 60.0).abs() < 1e-5);
    }

    #[test]
    fn test_footage_parsing() {
        assert_eq!("8".parse::<Footage>(), Ok(Footage { num: 8, den: 1 }));
        assert_eq!("2+2/3".parse::<Footage>(), Ok(Footage { num: 8, den: 3 }));
        assert_eq!("1/2".parse::<Footage>(), Ok(Footage { num: 1, den: 2 }));
        assert!("two".parse::<Footage>().is_err());
        assert!("1/0".parse::<Footage>().is_err());
    }

    #[test]
    fn test_footage_ratio() {
        assert!((Footage::feet(8).ratio() - 1.0).abs() < 1e-6);
        assert!((Footage::feet(4).ratio() - 2.0).abs() < 1e-6);
        assert!((Footage::feet(16).ratio() - 0.5).abs() < 1e-6);
        // a twelfth
        let quint: Footage = "2+2/3".parse().unwrap();
        assert!((quint.ratio() - 3.0).abs() < 1e-6);
        assert_eq!(Footage::feet(0).ratio(), 0.0);
    }

    #[test]
    fn test_footage_display_round_trips() {
        for s in ["8", "2+2/3", "1/2", "1+1/3"] {
            let f: Footage = s.parse().unwrap();
            assert_eq!(f.to_string(), s);
        }
    }

    #[test]
    fn test_pan_channels() {
        assert_eq!(Pan::Left.channel(36), 0);
        assert_eq!(Pan::Left.channel(37), 1);
        assert_eq!(Pan::Center.channel(36), 1);
        assert_eq!(Pan::Right.channel(37), 3);
        assert_eq!(Pan::Wide.channel(39), 3);
    }

    #[test]
    fn test_stop_serializes_to_yaml() {
        let stop = StopDefinition::flute(Footage::feet(8));
        let yaml = serde_yaml::to_string(&stop).unwrap();
        assert!(yaml.contains("footage: '8'") || yaml.contains("footage: \"8\""));
        let back: StopDefinition = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, stop);
    }

    #[test]
    fn test_undefined_harmonics_are_silent() {
        let stop = StopDefinition::flute(Footage::feet(8));
        assert_eq!(stop.harmonic_level(40, 0), -100.0);
        assert_eq!(stop.harmonic_attack(40, 0), 0.0);
    }
}
