//! Seedable PRNG backing the `random` opcode.
//!
//! Grounded directly on the source lineage's `zrand.rs`: a predictable (seeded) mode for
//! deterministic replays and tests, and an unseeded "random mode" for ordinary play.

use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

pub enum RandMode {
    Predictable,
    RandomUniform,
}

pub struct ZRand {
    rng: Box<dyn RngCore + Send>,
    rand_mode: RandMode,
}

impl ZRand {
    pub fn new_uniform() -> ZRand {
        ZRand {
            rng: Box::new(rand::thread_rng()),
            rand_mode: RandMode::RandomUniform,
        }
    }

    pub fn new_predictable(seed: u64) -> ZRand {
        ZRand {
            rng: Box::new(StdRng::seed_from_u64(seed)),
            rand_mode: RandMode::Predictable,
        }
    }

    pub fn from_config_seed(seed: Option<u64>) -> ZRand {
        match seed {
            Some(s) => ZRand::new_predictable(s),
            None => ZRand::new_uniform(),
        }
    }

    pub fn is_predictable(&self) -> bool {
        matches!(self.rand_mode, RandMode::Predictable)
    }

    /// Generate in range `[1, range]`, the argument range the `random` opcode actually uses.
    pub fn gen_range_1(&mut self, range: u16) -> u16 {
        if range == 0 {
            return 0;
        }
        self.rng.gen_range(1..=range)
    }

    /// Reseed to a fixed predictable value (the `random` opcode's "range <= 0" form).
    pub fn reseed_predictable(&mut self, seed: u64) {
        self.rng = Box::new(StdRng::seed_from_u64(seed));
        self.rand_mode = RandMode::Predictable;
    }

    /// Reseed to thread entropy (the `random` opcode's "range == 0" form).
    pub fn reseed_random(&mut self) {
        self.rng = Box::new(rand::thread_rng());
        self.rand_mode = RandMode::RandomUniform;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predictable_seed_gives_reproducible_sequence() {
        let mut a = ZRand::new_predictable(1234);
        let mut b = ZRand::new_predictable(1234);
        let seq_a: Vec<u16> = (0..10).map(|_| a.gen_range_1(100)).collect();
        let seq_b: Vec<u16> = (0..10).map(|_| b.gen_range_1(100)).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn range_is_respected() {
        let mut r = ZRand::new_predictable(1);
        for _ in 0..1000 {
            let v = r.gen_range_1(6);
            assert!((1..=6).contains(&v));
        }
    }

    #[test]
    fn zero_range_yields_zero() {
        let mut r = ZRand::new_predictable(1);
        assert_eq!(r.gen_range_1(0), 0);
    }
}
