//! Acoustic section
//!
//! Divisions accumulate their output into a four-channel delay ring at the
//! current write cursor. Each period the section reads that region back as
//! the direct sound, and reads sixteen delayed taps (four per channel)
//! through four all-pass diffusers as early reflections. Both are mixed into
//! the global W/X/Y buses, and a share of the direct sound feeds the reverb
//! bus R.

use std::f32::consts::TAU;

use crate::types::{FParam, PeriodBuffer, MIXLEN, NCHANN, PERIOD};

use super::diffuser::Diffuser;

/// Samples per ring channel, a power of two
pub const RING_LEN: usize = MIXLEN * PERIOD;

/// Wrap a ring position
#[inline]
pub fn wrap(pos: usize) -> usize {
    pos & (RING_LEN - 1)
}

/// Relative delays of the reflection taps, four per ring channel
pub const REFLECTIONS: [f32; 16] = [
    0.250, 0.440, 0.615, 0.940, //
    0.200, 0.370, 0.560, 0.900, //
    0.230, 0.400, 0.500, 0.920, //
    0.280, 0.460, 0.690, 0.960,
];

/// Taps feeding each diffuser, with its denormal bias
const DIFFUSER_TAPS: [([usize; 4], f32); 4] = [
    ([1, 5, 11, 15], 1e-20),
    ([0, 4, 10, 14], 1e-20),
    ([2, 6, 8, 12], 2e-20),
    ([3, 7, 9, 13], 2e-20),
];

/// Diffuser lengths in seconds
const DIFFUSER_TIMES: [f32; 4] = [0.017, 0.029, 0.023, 0.013];

/// Section parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SectionParam {
    Azimuth = 0,
    Width = 1,
    Direct = 2,
    Reflect = 3,
    Reverb = 4,
}

impl SectionParam {
    pub const COUNT: usize = 5;

    pub fn from_index(i: u8) -> Option<Self> {
        match i {
            0 => Some(Self::Azimuth),
            1 => Some(Self::Width),
            2 => Some(Self::Direct),
            3 => Some(Self::Reflect),
            4 => Some(Self::Reverb),
            _ => None,
        }
    }
}

/// Default section parameters
pub const SECTION_PARAMS: [FParam; SectionParam::COUNT] = [
    FParam::new(0.0, -0.5, 0.5),
    FParam::new(0.8, 0.0, 1.0),
    FParam::new(0.56, 0.0, 1.0),
    FParam::new(0.25, 0.0, 1.0),
    FParam::new(0.32, 0.0, 1.0),
];

/// Stereo width gains `(gx, gy)` for a width coefficient
fn width_gains(gw: f32, g: f32) -> (f32, f32) {
    let s = 0.5 + g * (1.0 - g);
    let d = g - 0.5;
    (gw * (s - d), gw * (s + d))
}

pub struct Asection {
    fsamp: f32,
    /// Ring channels laid out back to back
    ring: Vec<f32>,
    offs0: usize,
    offs: [usize; 16],
    diffusers: [Diffuser; 4],
    /// Smoothed late energy (W, X, Y)
    sw: f32,
    sx: f32,
    sy: f32,
    params: [FParam; SectionParam::COUNT],
    taps: [PeriodBuffer; 4],
    x: PeriodBuffer,
    y: PeriodBuffer,
}

impl Asection {
    pub fn new(fsamp: f32) -> Self {
        let diffusers = DIFFUSER_TIMES.map(|t| Diffuser::new((fsamp * t) as usize, 0.5));
        Self {
            fsamp,
            ring: vec![0.0; NCHANN * RING_LEN],
            offs0: 0,
            offs: [0; 16],
            diffusers,
            sw: 0.0,
            sx: 0.0,
            sy: 0.0,
            params: SECTION_PARAMS,
            taps: [[0.0; PERIOD]; 4],
            x: [0.0; PERIOD],
            y: [0.0; PERIOD],
        }
    }

    pub fn params(&self) -> &[FParam; SectionParam::COUNT] {
        &self.params
    }

    pub fn param(&self, p: SectionParam) -> f32 {
        self.params[p as usize].value
    }

    pub fn set_param(&mut self, p: SectionParam, value: f32) {
        self.params[p as usize].set(value);
    }

    /// Current write position within each ring channel
    pub fn write_cursor(&self) -> usize {
        self.offs0
    }

    pub fn tap_offsets(&self) -> &[usize; 16] {
        &self.offs
    }

    /// Writable period of one ring channel at the cursor
    #[inline]
    pub fn write_slot(&mut self, channel: usize) -> &mut [f32] {
        let start = channel * RING_LEN + self.offs0;
        &mut self.ring[start..start + PERIOD]
    }

    /// Recompute the reflection taps for a room size in seconds
    pub fn set_size(&mut self, time: f32) {
        let r = (time * self.fsamp).min((RING_LEN - PERIOD) as f32);
        for (i, offs) in self.offs.iter_mut().enumerate() {
            let d = (r * REFLECTIONS[i]) as usize;
            *offs = wrap(self.offs0.wrapping_sub(d * PERIOD)) + (i >> 2) * RING_LEN;
        }
    }

    /// Mix one period into the global buses and advance the ring
    pub fn process(&mut self, vol: f32, w: &mut PeriodBuffer, x: &mut PeriodBuffer, y: &mut PeriodBuffer, r: &mut PeriodBuffer) {
        let width = self.param(SectionParam::Width);
        let gw = vol * self.param(SectionParam::Direct);
        let (gx1, gy1) = width_gains(gw, 0.45 * width);
        let (gx2, gy2) = width_gains(gw, 0.25 * width);
        let gr = 0.5 * self.param(SectionParam::Reverb);

        let base = self.offs0;
        for i in 0..PERIOD {
            let t0 = self.ring[base + i];
            let t1 = self.ring[RING_LEN + base + i];
            let t2 = self.ring[2 * RING_LEN + base + i];
            let t3 = self.ring[3 * RING_LEN + base + i];
            let s = t0 + t1 + t2 + t3;
            r[i] += gr * s;
            w[i] += gw * s;
            self.x[i] = gx1 * (t3 + t0) + gx2 * (t2 + t1);
            self.y[i] = gy1 * (t3 - t0) + gy2 * (t2 - t1);
        }

        for (k, (taps, bias)) in DIFFUSER_TAPS.iter().enumerate() {
            let dif = &mut self.diffusers[k];
            let o = taps.map(|t| self.offs[t]);
            dif.period_begin();
            for i in 0..PERIOD {
                let s = self.ring[o[0] + i] + self.ring[o[1] + i] + self.ring[o[2] + i] + self.ring[o[3] + i];
                self.taps[k][i] = dif.process(s + bias);
            }
            dif.period_end();
        }

        let gr = vol * self.param(SectionParam::Reflect);
        for i in 0..PERIOD {
            let t0 = self.taps[0][i];
            let t1 = self.taps[1][i];
            let t2 = self.taps[2][i];
            let t3 = self.taps[3][i];
            let s = t0 + t1 + t2 + t3;
            self.sw += 0.5 * (s - self.sw);
            self.sx += 0.5 * (0.4 * (t0 + t3) + 0.6 * (t2 + t1) - self.sx);
            self.sy += 0.5 * (0.9 * (t0 - t3) + 0.8 * (t2 - t1) - self.sy);
            w[i] += gr * self.sw;
            self.x[i] += gr * self.sx;
            self.y[i] += gr * self.sy;
        }

        let (sin, cos) = (TAU * self.param(SectionParam::Azimuth)).sin_cos();
        for i in 0..PERIOD {
            x[i] += cos * self.x[i] + sin * self.y[i];
            y[i] += cos * self.y[i] - sin * self.x[i];
        }

        self.offs0 = wrap(self.offs0 + PERIOD);
        for (i, offs) in self.offs.iter_mut().enumerate() {
            *offs = wrap(*offs + PERIOD) + (i >> 2) * RING_LEN;
        }
        for c in 0..NCHANN {
            self.write_slot(c).fill(0.0);
        }
    }
}
