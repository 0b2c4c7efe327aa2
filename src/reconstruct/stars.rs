//! Star synthesis
//!
//! The source only exposes how many stars a project has, not who gave them.
//! Stars are therefore re-created by a sample of migrated users, at most one
//! per user and never more than the recorded count.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

pub struct StarSampler {
    rng: StdRng,
}

impl StarSampler {
    /// A fixed `seed` makes the chosen users reproducible across runs.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }

    /// Pick `min(count, candidates.len())` distinct candidates.
    pub fn sample<'a, T>(&mut self, candidates: &'a [T], count: u64) -> Vec<&'a T> {
        let amount = usize::try_from(count)
            .unwrap_or(usize::MAX)
            .min(candidates.len());
        if amount == 0 {
            return Vec::new();
        }
        index::sample(&mut self.rng, candidates.len(), amount)
            .into_iter()
            .map(|i| &candidates[i])
            .collect()
    }
}
