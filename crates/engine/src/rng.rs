use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded random source. Every random decision in the simulation draws from
/// one of these so a run can be replayed from its seed.
#[derive(Debug, Clone)]
pub struct SimRng {
    seed: u64,
    inner: ChaCha8Rng,
}

impl SimRng {
    pub fn seed_from_u64(seed: u64) -> Self {
        Self {
            seed,
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.inner = ChaCha8Rng::seed_from_u64(seed);
    }

    /// Uniform value in `[low, high)`; returns `low` for an empty range.
    pub fn range_f32(&mut self, low: f32, high: f32) -> f32 {
        if !(low < high) {
            return low;
        }
        self.inner.gen_range(low..high)
    }

    /// Uniform index in `[0, len)`; `None` when `len` is zero.
    pub fn index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.inner.gen_range(0..len))
    }

    pub fn chance(&mut self, probability: f32) -> bool {
        if probability <= 0.0 {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }
        self.inner.gen::<f32>() < probability
    }

    pub fn next_u64(&mut self) -> u64 {
        self.inner.gen()
    }
}
