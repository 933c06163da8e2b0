//! All-pass diffuser
//!
//! A single-coefficient all-pass filter on a circular buffer whose length
//! is not a multiple of PERIOD. Instead of wrapping every access, the buffer
//! carries `PERIOD - 1` extra samples: [`Diffuser::period_begin`] mirrors the
//! head into that tail before a period and [`Diffuser::period_end`] copies
//! the written tail back, so [`Diffuser::process`] indexes linearly.

use crate::types::PERIOD;

pub struct Diffuser {
    data: Vec<f32>,
    size: usize,
    i: usize,
    c: f32,
}

impl Diffuser {
    /// `size` is clamped to at least one period
    pub fn new(size: usize, c: f32) -> Self {
        let size = size.max(PERIOD);
        Self {
            data: vec![0.0; size + PERIOD - 1],
            size,
            i: 0,
            c,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Filter one sample. At most PERIOD calls between begin and end.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let d = self.data[self.i];
        let w = x - self.c * d;
        let y = d + self.c * w;
        self.data[self.i] = w;
        self.i += 1;
        y
    }

    pub fn period_begin(&mut self) {
        if self.i + PERIOD >= self.size {
            let n = self.i + PERIOD - self.size;
            self.data.copy_within(0..n, self.size);
        }
    }

    pub fn period_end(&mut self) {
        if self.i >= self.size {
            let n = self.i - self.size;
            self.data.copy_within(self.size..self.i, 0);
            self.i = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Same filter with plain modulo indexing
    struct Reference {
        data: Vec<f32>,
        i: usize,
        c: f32,
    }

    impl Reference {
        fn process(&mut self, x: f32) -> f32 {
            let n = self.data.len();
            let d = self.data[self.i % n];
            let w = x - self.c * d;
            self.data[self.i % n] = w;
            self.i += 1;
            d + self.c * w
        }
    }

    fn compare(size: usize) {
        let mut dif = Diffuser::new(size, 0.5);
        let mut reference = Reference {
            data: vec![0.0; size],
            i: 0,
            c: 0.5,
        };
        let mut n = 0usize;
        for _ in 0..200 {
            dif.period_begin();
            for _ in 0..PERIOD {
                let x = if n == 0 || n % 997 == 0 { 1.0 } else { 0.0 };
                n += 1;
                let a = dif.process(x);
                let b = reference.process(x);
                assert_eq!(a, b, "mismatch at sample {} (size {})", n, size);
            }
            dif.period_end();
        }
    }

    #[test]
    fn test_matches_modulo_reference() {
        for size in [64, 65, 100, 127, 128, 391, 816, 1392] {
            compare(size);
        }
    }

    #[test]
    fn test_minimum_size() {
        let d = Diffuser::new(10, 0.5);
        assert_eq!(d.size(), PERIOD);
    }

    #[test]
    fn test_impulse_delayed_by_size() {
        let size = 100;
        let mut dif = Diffuser::new(size, 0.5);
        let mut out = Vec::new();
        let mut first = true;
        for _ in 0..4 {
            dif.period_begin();
            for _ in 0..PERIOD {
                out.push(dif.process(if first { 1.0 } else { 0.0 }));
                first = false;
            }
            dif.period_end();
        }
        // direct path is c, the first echo arrives after `size` samples
        assert_eq!(out[0], 0.5);
        assert!(out[1..size].iter().all(|s| *s == 0.0));
        assert!((out[size] - 0.75).abs() < 1e-6);
    }
}
