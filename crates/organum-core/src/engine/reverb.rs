//! Shared reverberation stage
//!
//! The acoustic sections feed a mono reverb send (the R bus). The network
//! folds its diffuse tail back into the four ambisonic buses. Decay is given
//! as three T60 values (low, mid, high band) so that low registers ring longer
//! than the treble, as in a stone building.

use crate::types::{PeriodBuffer, PERIOD};

/// Reverberation network driven by the audio thread
pub trait ReverbNetwork: Send {
    /// Pre-delay before the tail, in seconds
    fn set_delay(&mut self, delay: f32);

    /// Mid-band decay time in seconds
    fn set_t60mf(&mut self, t60: f32);

    /// Low-band decay time and crossover frequency
    fn set_t60lo(&mut self, t60: f32, freq: f32);

    /// High-band decay time and crossover frequency
    fn set_t60hi(&mut self, t60: f32, freq: f32);

    /// Add one period of reverb, scaled by `volume`, to the buses
    fn process(
        &mut self,
        volume: f32,
        r: &PeriodBuffer,
        w: &mut PeriodBuffer,
        x: &mut PeriodBuffer,
        y: &mut PeriodBuffer,
        z: &mut PeriodBuffer,
    );

    /// Clear the tail
    fn reset(&mut self) {}
}

/// Comb filter delay line lengths (in samples at 44.1kHz)
const COMB_LENGTHS: [usize; 8] = [1557, 1617, 1491, 1422, 1277, 1356, 1188, 1116];

/// Allpass filter delay line lengths
const ALLPASS_LENGTHS: [usize; 2] = [556, 341];

/// Allpass length offset between the output buses
const BUS_SPREAD: usize = 23;

/// Output sign pattern of the combs per bus (W, X, Y, Z)
const BUS_SIGNS: [[f32; 8]; 4] = [
    [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
    [1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0, -1.0],
    [1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0],
];

/// Longest accepted pre-delay in seconds
const MAX_DELAY: f32 = 0.15;

/// Gain compensation for comb filter summing
const COMB_GAIN: f32 = 0.2;

const ALLPASS_FEEDBACK: f32 = 0.5;

/// Loop gain that decays by 60 dB in `t60` seconds
fn decay_gain(len: usize, fsamp: f32, t60: f32) -> f32 {
    10f32.powf(-3.0 * len as f32 / (fsamp * t60.max(0.01)))
}

/// One-pole lowpass coefficient for a corner frequency
fn one_pole(freq: f32, fsamp: f32) -> f32 {
    1.0 - (-std::f32::consts::TAU * freq / fsamp).exp()
}

/// Comb filter with a three-band loop gain
struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    lo: f32,
    mid: f32,
    g_lo: f32,
    g_mid: f32,
    g_hi: f32,
}

impl CombFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
            lo: 0.0,
            mid: 0.0,
            g_lo: 0.0,
            g_mid: 0.0,
            g_hi: 0.0,
        }
    }

    fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    fn process(&mut self, input: f32, c_lo: f32, c_hi: f32) -> f32 {
        let output = self.buffer[self.pos];

        // Split the loop signal at both crossovers; each band gets its own gain
        self.lo += c_lo * (output - self.lo);
        self.mid += c_hi * (output - self.mid);
        let feedback = self.g_hi * output + (self.g_mid - self.g_hi) * self.mid + (self.g_lo - self.g_mid) * self.lo;

        self.buffer[self.pos] = input + feedback;
        self.pos = (self.pos + 1) % self.buffer.len();

        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.lo = 0.0;
        self.mid = 0.0;
    }
}

/// Allpass filter for diffusion
struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        let output = -input + buffered;
        self.buffer[self.pos] = input + buffered * ALLPASS_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Feedback comb network with per-bus allpass diffusion
///
/// Eight parallel combs share the pre-delayed send. Each output bus sums them
/// with a different sign pattern and runs through its own allpass chain, so
/// the four buses carry decorrelated tails.
pub struct CombReverb {
    fsamp: f32,
    predelay: Vec<f32>,
    write_pos: usize,
    delay: usize,
    combs: Vec<CombFilter>,
    allpasses: [Vec<AllpassFilter>; 4],
    t60mf: f32,
    t60lo: f32,
    t60hi: f32,
    c_lo: f32,
    c_hi: f32,
}

impl CombReverb {
    pub fn new(fsamp: f32) -> Self {
        let scale = fsamp / 44100.0;
        let scaled = |len: usize| ((len as f32 * scale) as usize).max(1);
        let combs = COMB_LENGTHS.iter().map(|&len| CombFilter::new(scaled(len))).collect();
        let allpasses = std::array::from_fn(|bus| {
            ALLPASS_LENGTHS
                .iter()
                .map(|&len| AllpassFilter::new(scaled(len + bus * BUS_SPREAD)))
                .collect()
        });

        let mut reverb = Self {
            fsamp,
            predelay: vec![0.0; (MAX_DELAY * fsamp) as usize + 1],
            write_pos: 0,
            delay: 0,
            combs,
            allpasses,
            t60mf: 4.0,
            t60lo: 6.0,
            t60hi: 2.0,
            c_lo: one_pole(250.0, fsamp),
            c_hi: one_pole(3000.0, fsamp),
        };
        reverb.update_gains();
        reverb
    }

    /// Pre-delay in samples
    pub fn delay_samples(&self) -> usize {
        self.delay
    }

    fn update_gains(&mut self) {
        for comb in &mut self.combs {
            let len = comb.len();
            comb.g_lo = decay_gain(len, self.fsamp, self.t60lo);
            comb.g_mid = decay_gain(len, self.fsamp, self.t60mf);
            comb.g_hi = decay_gain(len, self.fsamp, self.t60hi);
        }
    }
}

impl ReverbNetwork for CombReverb {
    fn set_delay(&mut self, delay: f32) {
        self.delay = ((delay.clamp(0.0, MAX_DELAY) * self.fsamp) as usize).min(self.predelay.len() - 1);
    }

    fn set_t60mf(&mut self, t60: f32) {
        self.t60mf = t60;
        self.update_gains();
    }

    fn set_t60lo(&mut self, t60: f32, freq: f32) {
        self.t60lo = t60;
        self.c_lo = one_pole(freq, self.fsamp);
        self.update_gains();
    }

    fn set_t60hi(&mut self, t60: f32, freq: f32) {
        self.t60hi = t60;
        self.c_hi = one_pole(freq, self.fsamp);
        self.update_gains();
    }

    fn process(
        &mut self,
        volume: f32,
        r: &PeriodBuffer,
        w: &mut PeriodBuffer,
        x: &mut PeriodBuffer,
        y: &mut PeriodBuffer,
        z: &mut PeriodBuffer,
    ) {
        let len = self.predelay.len();
        let gain = volume * COMB_GAIN;
        let mut outputs = [w, x, y, z];
        let mut combs = [0.0f32; 8];

        for i in 0..PERIOD {
            self.predelay[self.write_pos] = r[i];
            let input = self.predelay[(self.write_pos + len - self.delay) % len];
            self.write_pos = (self.write_pos + 1) % len;

            for (out, comb) in combs.iter_mut().zip(self.combs.iter_mut()) {
                *out = comb.process(input, self.c_lo, self.c_hi);
            }

            for (bus, chain) in self.allpasses.iter_mut().enumerate() {
                let mut s: f32 = combs.iter().zip(BUS_SIGNS[bus].iter()).map(|(c, g)| c * g).sum();
                for ap in chain.iter_mut() {
                    s = ap.process(s);
                }
                outputs[bus][i] += gain * s;
            }
        }
    }

    fn reset(&mut self) {
        self.predelay.fill(0.0);
        for comb in &mut self.combs {
            comb.reset();
        }
        for chain in &mut self.allpasses {
            for ap in chain {
                ap.reset();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run `periods` periods with an impulse at the start, collecting W and X
    fn impulse_response(reverb: &mut CombReverb, periods: usize) -> (Vec<f32>, Vec<f32>) {
        let mut ws = Vec::with_capacity(periods * PERIOD);
        let mut xs = Vec::with_capacity(periods * PERIOD);
        for p in 0..periods {
            let mut r = [0.0; PERIOD];
            if p == 0 {
                r[0] = 1.0;
            }
            let (mut w, mut x, mut y, mut z) = ([0.0; PERIOD], [0.0; PERIOD], [0.0; PERIOD], [0.0; PERIOD]);
            reverb.process(1.0, &r, &mut w, &mut x, &mut y, &mut z);
            ws.extend_from_slice(&w);
            xs.extend_from_slice(&x);
        }
        (ws, xs)
    }

    fn energy(s: &[f32]) -> f32 {
        s.iter().map(|v| v * v).sum()
    }

    #[test]
    fn test_tail_starts_after_predelay() {
        let mut reverb = CombReverb::new(48000.0);
        reverb.set_delay(0.025);
        assert_eq!(reverb.delay_samples(), 1200);
        let (w, _) = impulse_response(&mut reverb, 100);
        assert!(w[..2304].iter().all(|&s| s == 0.0));
        assert!(energy(&w[2304..]) > 0.0, "no reverb tail");
    }

    #[test]
    fn test_tail_decays() {
        let mut reverb = CombReverb::new(48000.0);
        reverb.set_t60mf(2.0);
        reverb.set_t60lo(3.0, 250.0);
        reverb.set_t60hi(1.0, 3000.0);
        let (w, _) = impulse_response(&mut reverb, 1500);
        let early = energy(&w[4800..24000]);
        let late = energy(&w[72000..91200]);
        assert!(late < early * 0.1, "early={} late={}", early, late);
    }

    #[test]
    fn test_longer_t60_rings_longer() {
        let mut short = CombReverb::new(48000.0);
        short.set_t60mf(2.0);
        short.set_t60lo(2.0, 250.0);
        short.set_t60hi(2.0, 3000.0);
        let mut long = CombReverb::new(48000.0);
        long.set_t60mf(7.0);
        long.set_t60lo(7.0, 250.0);
        long.set_t60hi(7.0, 3000.0);
        let (ws, _) = impulse_response(&mut short, 1000);
        let (wl, _) = impulse_response(&mut long, 1000);
        assert!(energy(&wl[48000..]) > energy(&ws[48000..]));
    }

    #[test]
    fn test_buses_are_decorrelated() {
        let mut reverb = CombReverb::new(48000.0);
        let (w, x) = impulse_response(&mut reverb, 200);
        let differs = w.iter().zip(&x).filter(|(a, b)| (*a - *b).abs() > 1e-6).count();
        assert!(differs > 100);
    }

    #[test]
    fn test_stable_at_longest_decay() {
        let mut reverb = CombReverb::new(48000.0);
        reverb.set_t60mf(7.0);
        reverb.set_t60lo(10.5, 250.0);
        reverb.set_t60hi(3.5, 3000.0);
        let r = [0.1; PERIOD];
        let mut peak = 0.0f32;
        for _ in 0..2000 {
            let (mut w, mut x, mut y, mut z) = ([0.0; PERIOD], [0.0; PERIOD], [0.0; PERIOD], [0.0; PERIOD]);
            reverb.process(1.0, &r, &mut w, &mut x, &mut y, &mut z);
            peak = w.iter().chain(&z).fold(peak, |m, s| m.max(s.abs()));
        }
        assert!(peak.is_finite() && peak < 100.0, "peak {}", peak);
    }

    #[test]
    fn test_reset_clears_tail() {
        let mut reverb = CombReverb::new(48000.0);
        impulse_response(&mut reverb, 100);
        reverb.reset();
        let (w, _) = impulse_response(&mut reverb, 1);
        assert_eq!(w[0], 0.0);
    }

    #[test]
    fn test_delay_is_clamped() {
        let mut reverb = CombReverb::new(48000.0);
        reverb.set_delay(1.0);
        assert_eq!(reverb.delay_samples(), 7200);
    }
}
