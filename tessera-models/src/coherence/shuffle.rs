// Copyright (c) 2026 Tessera Project Contributors. All rights reserved.

//! Arbitration-fairness strategies.
//!
//! Every per-tick contention point in the engine (core ports, table
//! vacancies, cache/resolver ports, network egress) orders its contenders
//! by a permutation drawn from a [`ShufflePolicy`]. The default
//! [`RandomShuffle`] gives starvation-freedom under the otherwise greedy
//! admission; [`RotateShuffle`] gives tests a deterministic order.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Produces the service order for one round of arbitration.
pub trait ShufflePolicy {
    /// A permutation of `0..len` giving this round's service order.
    fn permutation(&mut self, len: usize) -> Vec<usize>;
}

/// Uniformly random shuffling from a seeded generator.
pub struct RandomShuffle {
    rng: StdRng,
}

impl RandomShuffle {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl ShufflePolicy for RandomShuffle {
    fn permutation(&mut self, len: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(&mut self.rng);
        order
    }
}

/// Round-robin rotation: each round starts one position later.
pub struct RotateShuffle {
    counter: usize,
}

impl RotateShuffle {
    #[must_use]
    pub fn new() -> Self {
        Self { counter: 0 }
    }
}

impl Default for RotateShuffle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShufflePolicy for RotateShuffle {
    fn permutation(&mut self, len: usize) -> Vec<usize> {
        if len == 0 {
            return Vec::new();
        }
        let start = self.counter % len;
        self.counter = self.counter.wrapping_add(1);
        (0..len).map(|i| (start + i) % len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_is_a_permutation() {
        let mut shuffle = RandomShuffle::new(3);
        let mut order = shuffle.permutation(10);
        order.sort_unstable();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn random_is_reproducible() {
        let mut a = RandomShuffle::new(42);
        let mut b = RandomShuffle::new(42);
        for _ in 0..5 {
            assert_eq!(a.permutation(7), b.permutation(7));
        }
    }

    #[test]
    fn rotate_cycles_start() {
        let mut shuffle = RotateShuffle::new();
        assert_eq!(shuffle.permutation(3), vec![0, 1, 2]);
        assert_eq!(shuffle.permutation(3), vec![1, 2, 0]);
        assert_eq!(shuffle.permutation(3), vec![2, 0, 1]);
        assert_eq!(shuffle.permutation(3), vec![0, 1, 2]);
        assert!(shuffle.permutation(0).is_empty());
    }
}
