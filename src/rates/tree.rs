//! Complete binary tree rate structure (§4.1 variant 3): O(log N) insert
//! and select, root holds the total. Grounded on
//! `original_source/code/ratestructures/ratetree.py`.

use super::{validate, RateStore};
use crate::error::SimError;

pub struct RateTree {
    /// Flat array of size `2 * padded_len - 1`. Leaves occupy the last
    /// `padded_len` slots; `nodes[0]` is the root (the total).
    nodes: Vec<f64>,
    padded_len: usize,
    size: usize,
}

impl RateTree {
    pub fn new(size: usize) -> Self {
        let mut padded_len = 1usize;
        while padded_len < size.max(1) {
            padded_len *= 2;
        }
        Self {
            nodes: vec![0.0; 2 * padded_len - 1],
            padded_len,
            size,
        }
    }

    fn leaf_index(&self, pos: usize) -> usize {
        self.padded_len - 1 + pos
    }
}

impl RateStore for RateTree {
    fn len(&self) -> usize {
        self.size
    }

    fn insert(&mut self, pos: usize, rate: f64) -> Result<(), SimError> {
        let rate = validate(rate)?;
        let mut idx = self.leaf_index(pos);
        let delta = rate - self.nodes[idx];
        loop {
            self.nodes[idx] += delta;
            if idx == 0 {
                break;
            }
            idx = (idx - 1) / 2;
        }
        Ok(())
    }

    fn get(&self, pos: usize) -> f64 {
        self.nodes[self.leaf_index(pos)]
    }

    fn total(&mut self) -> f64 {
        self.nodes[0]
    }

    fn select(&mut self, u: f64, _rng: &mut rand::rngs::SmallRng) -> usize {
        let mut idx = 0usize;
        let mut remaining = u;
        while idx < self.padded_len - 1 {
            let left = 2 * idx + 1;
            let left_sum = self.nodes[left];
            if remaining < left_sum {
                idx = left;
            } else {
                remaining -= left_sum;
                idx = left + 1;
            }
        }
        idx - (self.padded_len - 1)
    }

    fn zero(&mut self) {
        self.nodes.iter_mut().for_each(|r| *r = 0.0);
    }
}
