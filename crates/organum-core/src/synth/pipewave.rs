//! Single pipe wavetable
//!
//! A pipe's waveform is stored as one buffer in three regions:
//!
//! ```text
//! [ attack (l0) | loop (l1) | wrap tail (k_s * (PERIOD + 4)) ]
//! ```
//!
//! The attack is played back verbatim, one sample per frame. Once the read
//! position enters the loop it is driven by a fractional clock advancing
//! `k_s` samples per frame, with a small random drift (wind instability)
//! while sounding and a fixed drift (release detune) while releasing. The
//! wrap tail repeats the loop head so interpolation never needs a modulo.

use std::f32::consts::TAU;

use rand::rngs::SmallRng;
use rand::Rng;

use crate::types::{exp2ap, ChannelBuffer, PERIOD};

use super::stop::{StopDefinition, N_HARM};

/// Highest harmonic frequency, relative to the sample rate, that is synthesized
const NYQUIST_GUARD: f32 = 0.45;

/// Find a loop of `a` samples holding exactly `b` cycles of frequency `f`
///
/// Expands `fsamp / f` as a continued fraction (up to eight terms) and returns
/// the first convergent whose frequency error is below both 0.1 Hz and
/// `3e-4 * f`. If a convergent would exceed `lmax` samples, falls back to
/// the largest whole number of cycles that fits.
pub fn looplen(f: f64, fsamp: f64, lmax: usize) -> (usize, usize) {
    let lmax = lmax as i64;
    let mut z = [0i64; 8];
    let mut g = fsamp / f;
    let mut a = 1i64;
    let mut b = 1i64;

    for i in 0..z.len() {
        z[i] = (g + 0.5).floor() as i64;
        a = z[i];
        g -= a as f64;
        b = 1;
        let mut j = i;
        while j > 0 {
            j -= 1;
            let t = a;
            a = z[j].saturating_mul(a).saturating_add(b);
            b = t;
        }
        if a < 0 {
            a = -a;
            b = -b;
        }
        if a <= lmax {
            let d = fsamp * b as f64 / a as f64 - f;
            if d.abs() < 0.1 && d.abs() < 3e-4 * f {
                break;
            }
            g = if g.abs() < 1e-6 { 1e6 } else { 1.0 / g };
        } else {
            b = ((lmax as f64 * f / fsamp).floor() as i64).max(1);
            a = (b as f64 * fsamp / f + 0.5) as i64;
            break;
        }
    }
    (a.max(1) as usize, b.max(1) as usize)
}

/// Attack envelope of `n` samples with overshoot `p`
///
/// A 24-segment feedback recurrence. With `p == 0` the envelope is a
/// straight ramp; larger values give a faster, overshooting onset.
pub fn attgain(n: usize, p: f32) -> Vec<f32> {
    let mut att = vec![0.0; n];
    let w = 0.05f32;
    let mut y = if p > 0.0 { 0.6 + 0.11 * p } else { 0.6 };
    let mut z = 0.0f32;
    let mut j = 0usize;

    for i in 1..=24 {
        let k = n * i / 24;
        let x = 1.0 - z - 1.5 * y;
        y += w * x;
        if k <= j {
            continue;
        }
        let d = w * y * p / (k - j) as f32;
        while j < k {
            let m = j as f32 / n as f32;
            att[j] = (1.0 - m) * z + m;
            z += d;
            j += 1;
        }
    }
    att
}

/// Waveform and playback state of one pipe
#[derive(Debug, Clone, Default)]
pub struct Pipewave {
    /// Attack, loop and wrap tail; empty for a silent pipe
    pub(crate) wave: Vec<f32>,
    /// Attack length in samples, a multiple of PERIOD
    pub(crate) l0: usize,
    /// Loop length in samples
    pub(crate) l1: usize,
    /// Sample step in the loop region
    pub(crate) k_s: usize,
    /// Release length in periods
    pub(crate) k_r: u32,
    /// Release gain multiplier per period
    pub(crate) m_r: f32,
    /// Release detune
    pub(crate) d_r: f32,
    /// Instability amplitude
    pub(crate) d_a: f32,
    /// Instability bandwidth
    pub(crate) d_w: f32,

    attack: Option<usize>,
    release: Option<usize>,
    y_p: f32,
    z_p: f32,
    g_r: f32,
    y_r: f32,
    i_r: u32,

    /// Start delay shift register
    pub(crate) sdel: u32,
    /// Bit fed into `sdel` each period while the key is down
    pub(crate) sbit: u32,
    pub(crate) channel: usize,
    pub(crate) link: Option<u16>,
    pub(crate) linked: bool,
}

impl Pipewave {
    /// Total buffer length for the given region sizes
    pub fn buffer_len(l0: usize, l1: usize, k_s: usize) -> usize {
        if l1 == 0 {
            0
        } else {
            l0 + l1 + k_s * (PERIOD + 4)
        }
    }

    /// Rebuild a pipe from stored waveform data
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        wave: Vec<f32>,
        l0: usize,
        l1: usize,
        k_s: usize,
        k_r: u32,
        m_r: f32,
        d_r: f32,
        d_a: f32,
        d_w: f32,
    ) -> Self {
        Self {
            wave,
            l0,
            l1,
            k_s,
            k_r,
            m_r,
            d_r,
            d_a,
            d_w,
            ..Self::default()
        }
    }

    /// Synthesize the waveform for note offset `n` of a stop
    ///
    /// `fpipe` is the target pipe frequency in Hz.
    pub fn genwave(stop: &StopDefinition, n: usize, fsamp: f32, fpipe: f32, rng: &mut SmallRng) -> Self {
        // Longest attack of the note and all its harmonics
        let mut m = stop.attack.value_at(n);
        for h in 0..N_HARM {
            m = m.max(stop.harmonic_attack(h, n));
        }
        let mut l0 = (fsamp * m + 0.5) as usize;
        l0 = (l0 + PERIOD - 1) & !(PERIOD - 1);

        let f1 = (fpipe + stop.offset.value_at(n) + stop.random.value_at(n) * (2.0 * rng.gen::<f32>() - 1.0)) / fsamp;
        let f0 = f1 * exp2ap(stop.attack_detune.value_at(n) / 1200.0);

        // Highest relevant harmonic decides the sample step
        let mut f = f1;
        for h in (0..N_HARM).rev() {
            f = (h + 1) as f32 * f1;
            if f < NYQUIST_GUARD && stop.harmonic_level(h, n) >= -40.0 {
                break;
            }
        }
        let k_s = if f > 0.250 {
            3
        } else if f > 0.125 {
            2
        } else {
            1
        };

        let (mut l1, mut nc) = looplen(
            (f1 * fsamp) as f64,
            (k_s as f32 * fsamp) as f64,
            (fsamp / 6.0) as usize,
        );
        if l1 < k_s * PERIOD {
            let k = (k_s * PERIOD - 1) / l1 + 1;
            l1 *= k;
            nc *= k;
        }

        let len = Self::buffer_len(l0, l1, k_s);
        let mut wave = vec![0.0f32; len];

        let k_r = ((stop.decay.value_at(n) * fsamp / PERIOD as f32).ceil() + 1.0) as u32;
        let m_r = 1.0 - 0.1f32.powf(1.0 / k_r as f32);
        let d_r = k_s as f32 * (exp2ap(stop.decay_detune.value_at(n) / 1200.0) - 1.0);
        let v = stop.instability.value_at(n);
        let d_a = v * fsamp / 960e3;
        let d_w = 24.0 * v / fsamp;

        // Phase trajectory in cycles. The attack glides from the detuned to
        // the nominal frequency over the note attack time.
        let mut arg = vec![0.0f32; l0 + l1 + 1];
        let k = (fsamp * stop.attack.value_at(n) + 0.5) as usize;
        let mut t = 0.0f32;
        for (i, a) in arg.iter_mut().enumerate().take(l0 + 1) {
            *a = t - (t + 0.5).floor();
            t += if i < k {
                ((k - i) as f32 * f0 + i as f32 * f1) / k as f32
            } else {
                f1
            };
        }
        let a0 = arg[l0];
        for i in 1..l1 {
            let t = a0 + i as f32 * nc as f32 / l1 as f32;
            arg[i + l0] = t - (t + 0.5).floor();
        }

        let v0 = exp2ap(0.1661 * stop.volume.value_at(n));
        for (h, harmonic) in stop.harmonics.iter().enumerate().take(N_HARM) {
            let mult = (h + 1) as f32;
            if mult * f1 > NYQUIST_GUARD {
                break;
            }
            let level = harmonic.level.value_at(n);
            if level < -80.0 {
                continue;
            }
            let v = v0 * exp2ap(0.1661 * (level + harmonic.random.value_at(n) * (2.0 * rng.gen::<f32>() - 1.0)));
            let k = (fsamp * harmonic.attack.value_at(n) + 0.5) as usize;
            let att = attgain(k, harmonic.attack_peak.value_at(n));
            for (i, w) in wave.iter_mut().enumerate().take(l0 + l1) {
                let mut t = arg[i] * mult;
                t -= t.floor();
                let mut s = v * (TAU * t).sin();
                if i < k {
                    s *= att[i];
                }
                *w += s;
            }
        }

        // Wrap tail repeats the loop head, possibly more than once
        for i in 0..k_s * (PERIOD + 4) {
            wave[i + l0 + l1] = wave[i + l0];
        }

        Self::from_parts(wave, l0, l1, k_s, k_r, m_r, d_r, d_a, d_w)
    }

    /// A pipe with no waveform
    pub fn is_silent(&self) -> bool {
        self.wave.is_empty()
    }

    /// True while the pipe sounds, releases, or waits out its start delay
    pub fn is_active(&self) -> bool {
        self.sdel != 0 || self.attack.is_some() || self.release.is_some()
    }

    pub fn samples(&self) -> &[f32] {
        &self.wave
    }

    pub fn attack_len(&self) -> usize {
        self.l0
    }

    pub fn loop_len(&self) -> usize {
        self.l1
    }

    pub fn sample_step(&self) -> usize {
        self.k_s
    }

    pub fn release_periods(&self) -> u32 {
        self.k_r
    }

    /// Step a loop read position back by one sample
    #[inline]
    fn step_back(&self, pos: usize) -> usize {
        if pos == 0 {
            self.l1 - 1
        } else {
            pos - 1
        }
    }

    /// Render one period into the pipe's channel of `out`
    pub fn play(&mut self, out: &mut ChannelBuffer, rng: &mut SmallRng) {
        if self.is_silent() {
            return;
        }
        let mut p = self.attack;
        let mut r = self.release;

        if self.sdel & 1 != 0 {
            if p.is_none() {
                p = Some(0);
                self.y_p = 0.0;
                self.z_p = 0.0;
            }
        } else if r.is_none() {
            r = p;
            p = None;
            self.g_r = 1.0;
            self.y_r = self.y_p;
            self.i_r = self.k_r;
        }

        let p1 = self.l0;
        let p2 = self.l0 + self.l1;
        let q = &mut out[self.channel];

        if let Some(mut pos) = r {
            let mut g = self.g_r;
            let i = self.i_r.saturating_sub(1);
            let mut dg = g / PERIOD as f32;
            if i != 0 {
                dg *= self.m_r;
            }

            if pos < p1 {
                for s in q.iter_mut() {
                    *s += g * self.wave[pos];
                    pos += 1;
                    g -= dg;
                }
            } else {
                let mut y = self.y_r;
                let dy = self.d_r;
                for s in q.iter_mut() {
                    y += dy;
                    if y > 1.0 {
                        y -= 1.0;
                        pos += 1;
                    } else if y < 0.0 {
                        y += 1.0;
                        pos = self.step_back(pos);
                    }
                    let a = self.wave[pos];
                    *s += g * (a + y * (self.wave[pos + 1] - a));
                    g -= dg;
                    pos += self.k_s;
                    if pos >= p2 {
                        pos -= self.l1;
                    }
                }
                self.y_r = y;
            }

            if i != 0 {
                self.g_r = g;
                self.i_r = i;
                r = Some(pos);
            } else {
                r = None;
            }
        }

        if let Some(mut pos) = p {
            if pos < p1 {
                for (s, w) in q.iter_mut().zip(&self.wave[pos..pos + PERIOD]) {
                    *s += *w;
                }
                pos += PERIOD;
            } else {
                let mut y = self.y_p;
                self.z_p += self.d_w * (self.d_a * (rng.gen::<f32>() - 0.5) - self.z_p);
                let dy = self.z_p * self.k_s as f32;
                for s in q.iter_mut() {
                    y += dy;
                    if y > 1.0 {
                        y -= 1.0;
                        pos += 1;
                    } else if y < 0.0 {
                        y += 1.0;
                        pos = self.step_back(pos);
                    }
                    let a = self.wave[pos];
                    *s += a + y * (self.wave[pos + 1] - a);
                    pos += self.k_s;
                    if pos >= p2 {
                        pos -= self.l1;
                    }
                }
                self.y_p = y;
            }
            p = Some(pos);
        }

        self.attack = p;
        self.release = r;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::stop::{Footage, HarmonicDefinition, NoteCurve};
    use rand::SeedableRng;

    const FS: f64 = 48000.0;

    fn freq_error(f: f64, (a, b): (usize, usize)) -> f64 {
        (FS * b as f64 / a as f64 - f).abs()
    }

    fn sine_stop() -> StopDefinition {
        let mut stop = StopDefinition::new("Test", Footage::feet(8));
        stop.volume = NoteCurve::constant(0.0);
        stop.attack = NoteCurve::constant(0.01);
        stop.decay = NoteCurve::constant(0.02);
        stop.harmonics = vec![HarmonicDefinition::new(-6.0, 0.01, 0.0)];
        stop
    }

    #[test]
    fn test_looplen_meets_frequency_tolerance() {
        for f in [440.0, 261.6256, 65.406, 1046.5] {
            let (a, b) = looplen(f, FS, 8000);
            assert!(a <= 8000, "loop of {} samples for {} Hz", a, f);
            assert!(b >= 1);
            let tol = f64::max(0.1, 3e-4 * f);
            assert!(freq_error(f, (a, b)) < tol, "f={} a={} b={}", f, a, b);
        }
    }

    #[test]
    fn test_looplen_exact_ratio() {
        // 48000 / 440 = 109 + 1/11
        assert_eq!(looplen(440.0, FS, 8000), (1200, 11));
    }

    #[test]
    fn test_looplen_falls_back_when_bounded() {
        assert_eq!(looplen(261.6256, FS, 300), (183, 1));
    }

    #[test]
    fn test_attgain_linear_without_overshoot() {
        let att = attgain(480, 0.0);
        assert_eq!(att.len(), 480);
        for (j, g) in att.iter().enumerate() {
            assert!((g - j as f32 / 480.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_attgain_overshoot_rises_faster() {
        let att = attgain(480, 1.0);
        assert_eq!(att[0], 0.0);
        assert!(att[120] > 120.0 / 480.0);
        assert!(att.iter().all(|g| g.is_finite()));
    }

    #[test]
    fn test_attgain_empty() {
        assert!(attgain(0, 1.0).is_empty());
    }

    #[test]
    fn test_genwave_layout() {
        let mut rng = SmallRng::seed_from_u64(7);
        let stop = sine_stop();
        let pipe = Pipewave::genwave(&stop, 12, 48000.0, 261.6256, &mut rng);

        assert_eq!(pipe.attack_len() % PERIOD, 0);
        assert_eq!(pipe.attack_len(), 512); // 480 samples rounded up
        assert!(pipe.loop_len() >= pipe.sample_step() * PERIOD);
        assert_eq!(
            pipe.samples().len(),
            Pipewave::buffer_len(pipe.attack_len(), pipe.loop_len(), pipe.sample_step())
        );
        assert_eq!(pipe.sample_step(), 1);

        // wrap tail repeats the loop head
        let (l0, l1) = (pipe.attack_len(), pipe.loop_len());
        let w = pipe.samples();
        for i in 0..(PERIOD + 4) {
            assert_eq!(w[l0 + l1 + i], w[l0 + i]);
        }
        assert!(w.iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn test_genwave_release_constants() {
        let mut rng = SmallRng::seed_from_u64(1);
        let pipe = Pipewave::genwave(&sine_stop(), 0, 48000.0, 440.0, &mut rng);
        // ceil(0.02 * 48000 / 64) + 1
        assert_eq!(pipe.release_periods(), 16);
        let g = (1.0 - pipe.m_r).powi(pipe.k_r as i32);
        assert!((g - 0.1).abs() < 1e-3);
    }

    #[test]
    fn test_high_pipes_use_larger_sample_step() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut stop = sine_stop();
        stop.harmonics = (0..8).map(|_| HarmonicDefinition::new(-10.0, 0.01, 0.0)).collect();
        // the 5th harmonic of 4 kHz is the highest one below the guard
        let pipe = Pipewave::genwave(&stop, 60, 48000.0, 4000.0, &mut rng);
        assert_eq!(pipe.sample_step(), 3);
    }

    #[test]
    fn test_play_attack_then_release() {
        let mut rng = SmallRng::seed_from_u64(11);
        let mut pipe = Pipewave::genwave(&sine_stop(), 12, 48000.0, 261.6256, &mut rng);
        let mut out: ChannelBuffer = [[0.0; PERIOD]; 4];

        pipe.sdel = 1;
        pipe.play(&mut out, &mut rng);
        assert!(pipe.is_active());
        assert_eq!(pipe.attack, Some(PERIOD));
        // verbatim copy of the attack region
        assert_eq!(out[0][..], pipe.samples()[..PERIOD]);

        // sound well into the loop
        for _ in 0..20 {
            pipe.play(&mut out, &mut rng);
        }
        assert!(pipe.attack.unwrap() >= pipe.attack_len());

        pipe.sdel = 0;
        let mut periods = 0;
        while pipe.is_active() {
            out = [[0.0; PERIOD]; 4];
            pipe.play(&mut out, &mut rng);
            periods += 1;
            assert!(periods <= 64, "release never finished");
        }
        assert_eq!(periods, pipe.release_periods());
        // last period fades to zero
        assert!(out[0][PERIOD - 1].abs() < 0.01);
    }

    #[test]
    fn test_silent_pipe_never_sounds() {
        let mut rng = SmallRng::seed_from_u64(0);
        let mut pipe = Pipewave::default();
        let mut out: ChannelBuffer = [[0.0; PERIOD]; 4];
        pipe.sdel = 1;
        pipe.play(&mut out, &mut rng);
        assert!(pipe.is_silent());
        assert!(out.iter().flatten().all(|s| *s == 0.0));
    }
}
