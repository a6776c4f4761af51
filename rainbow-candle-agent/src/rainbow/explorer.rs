//! Exploration for evaluation runs.
use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Epsilon-greedy action selection with a fixed epsilon.
///
/// Exploration during training comes from the noisy layers; this explorer is
/// used in evaluation mode, where a small epsilon breaks deterministic loops.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct EpsilonGreedy {
    pub eps: f64,
}

impl EpsilonGreedy {
    /// Constructs epsilon-greedy explorer.
    pub fn new(eps: f64) -> Self {
        Self { eps }
    }

    /// Returns a uniformly random action with probability `eps`, otherwise the
    /// result of `greedy`. `greedy` is not evaluated for random actions.
    pub fn action<F>(&self, n_actions: usize, rng: &mut impl Rng, greedy: F) -> Result<i64>
    where
        F: FnOnce() -> Result<i64>,
    {
        Self::sample(self.eps, n_actions, rng, greedy)
    }

    /// Same as [`EpsilonGreedy::action`] with the given `eps`.
    pub fn sample<F>(eps: f64, n_actions: usize, rng: &mut impl Rng, greedy: F) -> Result<i64>
    where
        F: FnOnce() -> Result<i64>,
    {
        match rng.gen::<f64>() < eps {
            true => Ok(rng.gen_range(0..n_actions) as i64),
            false => greedy(),
        }
    }
}

impl Default for EpsilonGreedy {
    fn default() -> Self {
        Self::new(0.001)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn test_zero_epsilon_is_greedy() -> Result<()> {
        let explorer = EpsilonGreedy::new(0.0);
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..100 {
            assert_eq!(explorer.action(4, &mut rng, || Ok(2))?, 2);
        }
        Ok(())
    }

    #[test]
    fn test_one_epsilon_is_uniform() -> Result<()> {
        let explorer = EpsilonGreedy::new(1.0);
        let mut rng = SmallRng::seed_from_u64(42);
        let mut counts = [0usize; 4];
        for _ in 0..4000 {
            let a = explorer.action(4, &mut rng, || panic!("greedy action evaluated"))?;
            counts[a as usize] += 1;
        }
        assert!(counts.iter().all(|c| *c > 800 && *c < 1200), "{:?}", counts);
        Ok(())
    }

    #[test]
    fn test_sample_advances_caller_rng() -> Result<()> {
        let mut rng = SmallRng::seed_from_u64(7);
        let first = EpsilonGreedy::sample(1.0, 1000, &mut rng, || Ok(0))?;
        let mut rng_fresh = SmallRng::seed_from_u64(7);
        let again = EpsilonGreedy::sample(1.0, 1000, &mut rng_fresh, || Ok(0))?;
        assert_eq!(first, again);

        // Continuing with the same generator draws from a new state
        let draws: Vec<i64> = (0..8)
            .map(|_| EpsilonGreedy::sample(1.0, 1000, &mut rng, || Ok(0)))
            .collect::<Result<_>>()?;
        assert!(draws.iter().any(|a| *a != first), "{:?}", draws);
        Ok(())
    }
}
