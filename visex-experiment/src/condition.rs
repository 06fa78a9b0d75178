use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;
use visex_core::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sampling {
    /// 0, 1, .., n-1, then again
    #[default]
    Ascending,
    /// A fresh permutation of all conditions per block
    Random,
}

/// Condition list and the active condition of a session.
pub struct ConditionManager {
    colors: Vec<Color>,
    sampling: Sampling,
    rng: StdRng,
    pending: VecDeque<usize>,
    current: Option<usize>,
    blocks: usize,
}

impl ConditionManager {
    pub fn new(colors: Vec<Color>, sampling: Sampling, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            colors,
            sampling,
            rng,
            pending: VecDeque::new(),
            current: None,
            blocks: 0,
        }
    }

    pub fn n_conditions(&self) -> usize {
        self.colors.len()
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Number of blocks started so far
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Advances to the next condition of the current block, starting a new
    /// block when the last one is exhausted. `None` without conditions.
    pub fn sample_next(&mut self) -> Option<usize> {
        if self.colors.is_empty() {
            self.current = None;
            return None;
        }
        if self.pending.is_empty() {
            let mut order: Vec<usize> = (0..self.colors.len()).collect();
            if self.sampling == Sampling::Random {
                order.shuffle(&mut self.rng);
            }
            self.pending = order.into();
            self.blocks += 1;
            debug!("Condition block {} started", self.blocks);
        }
        self.current = self.pending.pop_front();
        self.current
    }

    /// Sets the active condition from outside, e.g. a decoded imaging message.
    /// Indices past the condition list count as blank.
    pub fn push_manual(&mut self, index: Option<usize>) -> Option<usize> {
        self.current = index.filter(|i| *i < self.colors.len());
        self.current
    }

    /// Clears the active condition and any partially used block.
    pub fn reset(&mut self) {
        self.current = None;
        self.pending.clear();
    }

    pub fn color(&self, index: Option<usize>) -> Option<Color> {
        index.and_then(|i| self.colors.get(i).copied())
    }

    pub fn current_color(&self) -> Option<Color> {
        self.color(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors(n: usize) -> Vec<Color> {
        (0..n).map(|i| Color::rgb(i as f64 / 10.0, 0.0, 0.0)).collect()
    }

    #[test]
    fn ascending_cycles_in_order() {
        let mut m = ConditionManager::new(colors(3), Sampling::Ascending, None);
        let seq: Vec<_> = (0..7).map(|_| m.sample_next().unwrap()).collect();
        assert_eq!(seq, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(m.blocks(), 3);
    }

    #[test]
    fn random_blocks_are_permutations() {
        let mut m = ConditionManager::new(colors(5), Sampling::Random, Some(7));
        for _ in 0..4 {
            let mut block: Vec<_> = (0..5).map(|_| m.sample_next().unwrap()).collect();
            block.sort();
            assert_eq!(block, vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn seeded_random_is_reproducible() {
        let mut a = ConditionManager::new(colors(8), Sampling::Random, Some(42));
        let mut b = ConditionManager::new(colors(8), Sampling::Random, Some(42));
        for _ in 0..16 {
            assert_eq!(a.sample_next(), b.sample_next());
        }
    }

    #[test]
    fn manual_index_out_of_range_is_blank() {
        let mut m = ConditionManager::new(colors(2), Sampling::Ascending, None);
        assert_eq!(m.push_manual(Some(1)), Some(1));
        assert_eq!(m.current_color(), Some(Color::rgb(0.1, 0.0, 0.0)));
        assert_eq!(m.push_manual(Some(2)), None);
        assert_eq!(m.current_color(), None);
        assert_eq!(m.push_manual(None), None);
    }

    #[test]
    fn no_conditions_means_no_color() {
        let mut m = ConditionManager::new(Vec::new(), Sampling::Random, Some(1));
        assert_eq!(m.sample_next(), None);
        assert_eq!(m.color(Some(0)), None);
    }
}
