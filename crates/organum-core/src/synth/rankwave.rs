//! A rank of pipes
//!
//! One [`Pipewave`] per note in `[n0, n1]`, plus an index-linked list of the
//! pipes that currently sound or release so that playback only touches
//! active pipes.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::engine::linkage::NoteMask;
use crate::types::{ChannelBuffer, PERIOD};

use super::pipewave::Pipewave;
use super::scales::Tuning;
use super::stop::{Pan, StopDefinition};

/// Longest start delay, in periods
pub const MAX_DELAY_PERIODS: u32 = 31;

pub struct Rankwave {
    n0: u8,
    n1: u8,
    pipes: Vec<Pipewave>,
    /// Head of the active list
    list: Option<u16>,
    /// Feed bit for newly pressed notes, `1 << delay`
    sbit: u32,
    pub(crate) mask: NoteMask,
    rng: SmallRng,
}

impl Rankwave {
    /// An all-silent rank covering `[n0, n1]`
    pub fn new(n0: u8, n1: u8) -> Self {
        let count = (n1 as usize + 1).saturating_sub(n0 as usize);
        Self::from_pipes(n0, n1, vec![Pipewave::default(); count])
    }

    pub(crate) fn from_pipes(n0: u8, n1: u8, pipes: Vec<Pipewave>) -> Self {
        Self {
            n0,
            n1,
            pipes,
            list: None,
            sbit: 1,
            mask: NoteMask::new(),
            rng: SmallRng::seed_from_u64(((n0 as u64) << 8) | n1 as u64),
        }
    }

    /// Synthesize every pipe of a stop
    ///
    /// Frequency ratios are resolved note by note first, honouring the
    /// stop's repetition points; the pipes themselves are generated in
    /// parallel, each with its own seeded generator.
    pub fn gen_waves(stop: &StopDefinition, fsamp: f32, tuning: &Tuning, seed: u64) -> Self {
        let mut ratio = stop.footage.ratio();
        let mut points = stop.repetitions.iter().peekable();
        let plan: Vec<(u8, f32)> = (stop.n0..=stop.n1)
            .map(|note| {
                while let Some(point) = points.next_if(|p| p.note <= note) {
                    ratio = point.footage.ratio();
                }
                (note, ratio)
            })
            .collect();

        let pipes: Vec<Pipewave> = plan
            .par_iter()
            .map(|&(note, ratio)| {
                if ratio <= 0.0 {
                    return Pipewave::default();
                }
                let mut rng = SmallRng::seed_from_u64(seed ^ ((note as u64) << 32));
                let fpipe = tuning.pipe_frequency(note, ratio);
                Pipewave::genwave(stop, (note - stop.n0) as usize, fsamp, fpipe, &mut rng)
            })
            .collect();

        log::debug!(
            "Generated {} pipes for '{}' ({} silent)",
            pipes.len(),
            stop.name,
            pipes.iter().filter(|p| p.is_silent()).count()
        );
        Self::from_pipes(stop.n0, stop.n1, pipes)
    }

    pub fn n0(&self) -> u8 {
        self.n0
    }

    pub fn n1(&self) -> u8 {
        self.n1
    }

    pub fn pipes(&self) -> &[Pipewave] {
        &self.pipes
    }

    pub fn pipe(&self, note: u8) -> Option<&Pipewave> {
        note.checked_sub(self.n0).and_then(|i| self.pipes.get(i as usize))
    }

    pub fn mask(&self) -> &NoteMask {
        &self.mask
    }

    /// Start delay and output channels
    pub fn set_param(&mut self, fsamp: f32, delay_ms: u32, pan: Pan) {
        let delay = ((1e-3 * delay_ms as f32 * fsamp / PERIOD as f32) as u32).min(MAX_DELAY_PERIODS);
        self.sbit = 1 << delay;
        let n0 = self.n0;
        for (i, pipe) in self.pipes.iter_mut().enumerate() {
            pipe.channel = pan.channel(n0 + i as u8);
        }
    }

    #[inline]
    fn index(&self, note: u8) -> Option<usize> {
        (self.n0..=self.n1).contains(&note).then(|| (note - self.n0) as usize)
    }

    pub fn note_on(&mut self, note: u8) {
        let Some(i) = self.index(note) else { return };
        let sbit = self.sbit;
        let pipe = &mut self.pipes[i];
        if pipe.is_silent() {
            return;
        }
        pipe.sbit = sbit;
        if !pipe.is_active() {
            pipe.sdel |= sbit;
        }
        if !pipe.linked {
            pipe.linked = true;
            pipe.link = self.list;
            self.list = Some(i as u16);
        }
    }

    pub fn note_off(&mut self, note: u8) {
        let Some(i) = self.index(note) else { return };
        let pipe = &mut self.pipes[i];
        pipe.sdel >>= 4;
        pipe.sbit = 0;
    }

    pub fn all_off(&mut self) {
        let mut cur = self.list;
        while let Some(i) = cur {
            let pipe = &mut self.pipes[i as usize];
            pipe.sbit = 0;
            cur = pipe.link;
        }
    }

    /// Render one period of every active pipe into `out`
    pub fn play(&mut self, out: &mut ChannelBuffer) {
        let mut prev: Option<u16> = None;
        let mut cur = self.list;
        while let Some(i) = cur {
            let pipe = &mut self.pipes[i as usize];
            pipe.play(out, &mut self.rng);
            pipe.sdel = (pipe.sdel >> 1) | pipe.sbit;
            let next = pipe.link;
            if pipe.is_active() {
                prev = cur;
            } else {
                pipe.link = None;
                pipe.linked = false;
                match prev {
                    Some(p) => self.pipes[p as usize].link = next,
                    None => self.list = next,
                }
            }
            cur = next;
        }
    }

    /// Number of pipes on the active list
    pub fn active_count(&self) -> usize {
        let mut n = 0;
        let mut cur = self.list;
        while let Some(i) = cur {
            n += 1;
            cur = self.pipes[i as usize].link;
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::stop::{Footage, HarmonicDefinition, NoteCurve, RepetitionPoint};

    fn small_stop() -> StopDefinition {
        let mut stop = StopDefinition::new("Small", Footage::feet(8));
        stop.n0 = 48;
        stop.n1 = 60;
        stop.attack = NoteCurve::constant(0.005);
        stop.decay = NoteCurve::constant(0.01);
        stop.harmonics = vec![HarmonicDefinition::new(0.0, 0.005, 0.0)];
        stop
    }

    fn rank() -> Rankwave {
        Rankwave::gen_waves(&small_stop(), 48000.0, &Tuning::default(), 42)
    }

    fn silence() -> ChannelBuffer {
        [[0.0; PERIOD]; 4]
    }

    #[test]
    fn test_gen_waves_covers_range() {
        let r = rank();
        assert_eq!(r.pipes().len(), 13);
        assert!(r.pipes().iter().all(|p| !p.is_silent()));
        assert!(r.pipe(47).is_none());
        assert!(r.pipe(60).is_some());
    }

    #[test]
    fn test_repetition_point_silences_rest() {
        let mut stop = small_stop();
        stop.repetitions = vec![RepetitionPoint {
            note: 55,
            footage: Footage::feet(0),
        }];
        let r = Rankwave::gen_waves(&stop, 48000.0, &Tuning::default(), 1);
        assert!(!r.pipe(54).unwrap().is_silent());
        assert!(r.pipe(55).unwrap().is_silent());
        assert!(r.pipe(60).unwrap().is_silent());
    }

    #[test]
    fn test_repetition_point_breaks_back() {
        let mut stop = small_stop();
        stop.repetitions = vec![RepetitionPoint {
            note: 54,
            footage: Footage::feet(16),
        }];
        let r = Rankwave::gen_waves(&stop, 48000.0, &Tuning::default(), 1);

        let unison = Rankwave::gen_waves(&small_stop(), 48000.0, &Tuning::default(), 1);
        let mut lower = small_stop();
        lower.footage = Footage::feet(16);
        let lower = Rankwave::gen_waves(&lower, 48000.0, &Tuning::default(), 1);

        for n in 48..54 {
            assert_eq!(r.pipe(n).unwrap().loop_len(), unison.pipe(n).unwrap().loop_len());
        }
        for n in 54..=60 {
            assert_eq!(r.pipe(n).unwrap().loop_len(), lower.pipe(n).unwrap().loop_len());
        }
    }

    #[test]
    fn test_note_on_links_once() {
        let mut r = rank();
        r.note_on(50);
        r.note_on(50);
        assert_eq!(r.active_count(), 1);
        r.note_on(52);
        assert_eq!(r.active_count(), 2);
        // outside the rank
        r.note_on(30);
        r.note_on(61);
        assert_eq!(r.active_count(), 2);
    }

    #[test]
    fn test_quick_release_does_not_double_link() {
        let mut r = rank();
        r.note_on(50);
        r.note_off(50);
        r.note_on(50);
        assert_eq!(r.active_count(), 1);
        let mut out = silence();
        r.play(&mut out);
        assert_eq!(r.active_count(), 1);
    }

    #[test]
    fn test_play_and_release_unlinks() {
        let mut r = rank();
        r.set_param(48000.0, 0, Pan::Left);
        r.note_on(50);
        let mut out = silence();
        for _ in 0..10 {
            r.play(&mut out);
        }
        // Pan::Left puts even notes on channel 0
        assert!(out[0].iter().any(|s| *s != 0.0));
        assert!(out[1].iter().all(|s| *s == 0.0));

        r.note_off(50);
        for _ in 0..64 {
            r.play(&mut silence());
        }
        assert_eq!(r.active_count(), 0);
    }

    #[test]
    fn test_all_off_releases_everything() {
        let mut r = rank();
        for n in 48..=60 {
            r.note_on(n);
        }
        for _ in 0..4 {
            r.play(&mut silence());
        }
        assert_eq!(r.active_count(), 13);
        r.all_off();
        for _ in 0..64 {
            r.play(&mut silence());
        }
        assert_eq!(r.active_count(), 0);
    }

    #[test]
    fn test_start_delay_postpones_attack() {
        let mut r = rank();
        // 10 ms at 48 kHz is 7.5 periods, truncated to 7
        r.set_param(48000.0, 10, Pan::Wide);
        assert_eq!(r.sbit, 1 << 7);
        r.note_on(48);
        let mut out = silence();
        for _ in 0..7 {
            r.play(&mut out);
        }
        assert!(out.iter().flatten().all(|s| *s == 0.0));
        for _ in 0..4 {
            r.play(&mut out);
        }
        assert!(out.iter().flatten().any(|s| *s != 0.0));
    }

    #[test]
    fn test_delay_is_capped() {
        let mut r = rank();
        r.set_param(48000.0, 10_000, Pan::Wide);
        assert_eq!(r.sbit, 1 << MAX_DELAY_PERIODS);
    }
}
