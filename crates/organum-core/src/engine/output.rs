//! Output encoding and instrument-wide parameters
//!
//! The acoustic sections and the reverb leave first-order ambisonic buses
//! (W, X, Y, Z). These are encoded into one of three destination layouts.

use serde::{Deserialize, Serialize};

use crate::types::{FParam, PeriodBuffer, PERIOD};

/// Destination channel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLayout {
    /// Mid/side stereo with an adjustable stage width
    #[default]
    Stereo,
    /// First-order B-format, FuMa order and normalization (W, X, Y, Z)
    BFormat,
    /// Ambisonic feed for an external binaural decoder, ACN/SN3D (W, Y, Z, X)
    Binaural,
}

impl OutputLayout {
    pub fn channels(&self) -> usize {
        match self {
            OutputLayout::Stereo => 2,
            OutputLayout::BFormat | OutputLayout::Binaural => 4,
        }
    }

    /// Port names for backends that name their outputs
    pub fn port_names(&self) -> &'static [&'static str] {
        match self {
            OutputLayout::Stereo => &["out_L", "out_R"],
            OutputLayout::BFormat => &["out_W", "out_X", "out_Y", "out_Z"],
            OutputLayout::Binaural => &["acn_0", "acn_1", "acn_2", "acn_3"],
        }
    }
}

impl std::str::FromStr for OutputLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stereo" => Ok(OutputLayout::Stereo),
            "bformat" | "b-format" => Ok(OutputLayout::BFormat),
            "binaural" => Ok(OutputLayout::Binaural),
            other => Err(format!("unknown output layout '{}'", other)),
        }
    }
}

/// Instrument-wide parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AudioParam {
    Volume = 0,
    ReverbSize = 1,
    ReverbTime = 2,
    StagePosition = 3,
}

impl AudioParam {
    pub const COUNT: usize = 4;

    pub fn from_index(i: u8) -> Option<Self> {
        match i {
            0 => Some(Self::Volume),
            1 => Some(Self::ReverbSize),
            2 => Some(Self::ReverbTime),
            3 => Some(Self::StagePosition),
            _ => None,
        }
    }
}

/// Default volume, MIDI value 100 on a square law
pub const VOLUME_DEFAULT: f32 = (100.0 / 127.0) * (100.0 / 127.0);

pub const AUDIO_PARAMS: [FParam; AudioParam::COUNT] = [
    FParam::new(VOLUME_DEFAULT, 0.0, 1.0),
    FParam::new(0.075, 0.025, 0.150),
    FParam::new(4.0, 2.0, 7.0),
    FParam::new(0.0, -1.0, 1.0),
];

/// Mid and side gains for a stage position
///
/// Negative positions narrow the stage toward mono; positive positions widen
/// it, with the side gain limited to +12 dB.
pub fn stereo_gains(s2: f32) -> (f32, f32) {
    if s2 <= 0.0 {
        let s = (-s2).sqrt();
        let c = (1.0 + s2).sqrt();
        (0.5 * (1.0 + s), 0.5 * c)
    } else {
        let s = s2.sqrt();
        let c = (1.0 - s2).sqrt();
        (0.5 / (1.0 + s), (0.5 / c).min(4.0))
    }
}

/// The four buses of one period
pub struct Buses {
    pub w: PeriodBuffer,
    pub x: PeriodBuffer,
    pub y: PeriodBuffer,
    pub z: PeriodBuffer,
    pub r: PeriodBuffer,
}

impl Default for Buses {
    fn default() -> Self {
        Self {
            w: [0.0; PERIOD],
            x: [0.0; PERIOD],
            y: [0.0; PERIOD],
            z: [0.0; PERIOD],
            r: [0.0; PERIOD],
        }
    }
}

impl Buses {
    pub fn clear(&mut self) {
        for b in [&mut self.w, &mut self.x, &mut self.y, &mut self.z, &mut self.r] {
            b.fill(0.0);
        }
    }

    /// Encode frame `i` into `out`, one value per layout channel
    #[inline]
    pub fn encode(&self, layout: OutputLayout, stereo: (f32, f32), i: usize, out: &mut [f32]) {
        match layout {
            OutputLayout::Stereo => {
                let (wxk, yk) = stereo;
                let mid = wxk * (self.w[i] + self.x[i]);
                let side = yk * self.y[i];
                out[0] = mid + side;
                out[1] = mid - side;
            }
            OutputLayout::BFormat => {
                out[0] = std::f32::consts::FRAC_1_SQRT_2 * self.w[i];
                out[1] = self.x[i];
                out[2] = self.y[i];
                out[3] = self.z[i];
            }
            OutputLayout::Binaural => {
                out[0] = self.w[i];
                out[1] = self.y[i];
                out[2] = self.z[i];
                out[3] = self.x[i];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_channels() {
        assert_eq!(OutputLayout::Stereo.channels(), 2);
        assert_eq!(OutputLayout::BFormat.channels(), 4);
        assert_eq!(OutputLayout::Binaural.port_names().len(), 4);
        assert_eq!("B-Format".parse::<OutputLayout>(), Ok(OutputLayout::BFormat));
        assert!("quad".parse::<OutputLayout>().is_err());
    }

    #[test]
    fn test_stereo_gains() {
        assert_eq!(stereo_gains(0.0), (0.5, 0.5));
        // mono: no side signal
        let (m, s) = stereo_gains(-1.0);
        assert!((m - 1.0).abs() < 1e-6 && s.abs() < 1e-6);
        // full expansion is limited
        assert_eq!(stereo_gains(1.0).1, 4.0);
        let (m, s) = stereo_gains(0.75);
        assert!((m - 0.5 / (1.0 + 0.75f32.sqrt())).abs() < 1e-6);
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_encodings() {
        let mut b = Buses::default();
        b.w[0] = 1.0;
        b.x[0] = 2.0;
        b.y[0] = 3.0;
        b.z[0] = 4.0;
        let mut out = [0.0; 4];

        b.encode(OutputLayout::Stereo, (0.5, 0.5), 0, &mut out);
        assert_eq!(&out[..2], &[3.0, 0.0]);

        b.encode(OutputLayout::BFormat, (0.0, 0.0), 0, &mut out);
        assert!((out[0] - 0.70710677).abs() < 1e-6);
        assert_eq!(&out[1..], &[2.0, 3.0, 4.0]);

        b.encode(OutputLayout::Binaural, (0.0, 0.0), 0, &mut out);
        assert_eq!(out, [1.0, 3.0, 4.0, 2.0]);
    }

    #[test]
    fn test_default_volume() {
        assert!((AUDIO_PARAMS[AudioParam::Volume as usize].value - 0.62).abs() < 0.01);
    }
}
