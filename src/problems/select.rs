use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::types::{Difficulty, PerDifficulty};
use crate::error::Result;
use crate::problems::store::ProblemStore;
use crate::problems::ProblemHandle;

/// Draws match problem sets from the store.
pub struct ProblemSelector {
    store: Arc<dyn ProblemStore>,
}

impl ProblemSelector {
    pub fn new(store: Arc<dyn ProblemStore>) -> Self {
        Self { store }
    }

    pub async fn random_by_difficulty(
        &self,
        difficulty: Difficulty,
        n: usize,
    ) -> Result<Vec<Arc<ProblemHandle>>> {
        self.store.random(difficulty, n).await
    }

    /// Concatenate per-difficulty draws; `shuffle` mixes the order so a
    /// match does not always open with the easy block.
    pub async fn by_distribution(
        &self,
        distribution: &PerDifficulty<u32>,
        shuffle: bool,
    ) -> Result<Vec<Arc<ProblemHandle>>> {
        let mut problems = Vec::new();
        for difficulty in Difficulty::ALL {
            let count = distribution.get(difficulty) as usize;
            if count > 0 {
                problems.extend(self.store.random(difficulty, count).await?);
            }
        }
        if shuffle {
            problems.shuffle(&mut rand::thread_rng());
        }
        Ok(problems)
    }
}

/// Draw `count` difficulties from categorical weights and return the counts
/// per difficulty.
///
/// The configured weights are not required to sum to 1; they are treated as
/// relative weights and normalized here.
pub fn weighted_counts<R: Rng>(
    weights: &PerDifficulty<f64>,
    count: u32,
    rng: &mut R,
) -> PerDifficulty<u32> {
    let total: f64 = Difficulty::ALL
        .iter()
        .map(|d| weights.get(*d).max(0.0))
        .sum();
    let mut counts = PerDifficulty::uniform(0u32);
    for _ in 0..count {
        let drawn = if total <= f64::EPSILON {
            // Degenerate weights: fall back to uniform.
            Difficulty::ALL[rng.gen_range(0..Difficulty::ALL.len())]
        } else {
            let mut point = rng.gen_range(0.0..total);
            let mut picked = Difficulty::Hard;
            for difficulty in Difficulty::ALL {
                let weight = weights.get(difficulty).max(0.0);
                if point < weight {
                    picked = difficulty;
                    break;
                }
                point -= weight;
            }
            picked
        };
        match drawn {
            Difficulty::Easy => counts.easy += 1,
            Difficulty::Medium => counts.medium += 1,
            Difficulty::Hard => counts.hard += 1,
        }
    }
    counts
}
