//! Deterministic RNG hierarchy.
//!
//! A master seed expands into per-`(run_id, purpose)` sub-seeds via BLAKE3,
//! so derivation order never affects the stream a caller gets. Used by the
//! run's `seed?` (§6) to thread determinism into any stochastic strategy or
//! synthetic-data generator without the engine itself reading wall-clock
//! entropy.

use crate::domain::ids::RunId;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone, Copy)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn sub_seed(&self, run_id: &RunId, purpose: &str) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(&run_id.0);
        hasher.update(purpose.as_bytes());
        let hash = hasher.finalize();
        u64::from_le_bytes(hash.as_bytes()[..8].try_into().unwrap())
    }

    pub fn rng_for(&self, run_id: &RunId, purpose: &str) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.sub_seed(run_id, purpose))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_seeds_are_deterministic() {
        let hierarchy = RngHierarchy::new(42);
        let run_id = RunId::from_bytes(b"test-run-1");
        assert_eq!(hierarchy.sub_seed(&run_id, "strategy"), hierarchy.sub_seed(&run_id, "strategy"));
    }

    #[test]
    fn different_purposes_different_seeds() {
        let hierarchy = RngHierarchy::new(42);
        let run_id = RunId::from_bytes(b"test-run-1");
        assert_ne!(hierarchy.sub_seed(&run_id, "strategy"), hierarchy.sub_seed(&run_id, "jitter"));
    }

    #[test]
    fn different_master_seeds_different_output() {
        let h1 = RngHierarchy::new(42);
        let h2 = RngHierarchy::new(43);
        let run_id = RunId::from_bytes(b"test-run-1");
        assert_ne!(h1.sub_seed(&run_id, "strategy"), h2.sub_seed(&run_id, "strategy"));
    }
}
