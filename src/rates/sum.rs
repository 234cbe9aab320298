//! Flat-array rate structure (§4.1 variant 1): O(1) insert, O(N) select,
//! O(1) total. Grounded on `original_source/ratesum.py`.

use super::{validate, RateStore};
use crate::error::SimError;

pub struct FlatSum {
    rates: Vec<f64>,
    total: f64,
}

impl FlatSum {
    pub fn new(size: usize) -> Self {
        Self {
            rates: vec![0.0; size],
            total: 0.0,
        }
    }
}

impl RateStore for FlatSum {
    fn len(&self) -> usize {
        self.rates.len()
    }

    fn insert(&mut self, pos: usize, rate: f64) -> Result<(), SimError> {
        let rate = validate(rate)?;
        self.total += rate - self.rates[pos];
        self.rates[pos] = rate;
        Ok(())
    }

    fn get(&self, pos: usize) -> f64 {
        self.rates[pos]
    }

    fn total(&mut self) -> f64 {
        self.total
    }

    fn select(&mut self, u: f64, _rng: &mut rand::rngs::SmallRng) -> usize {
        let mut cumulative = 0.0;
        for (i, &rate) in self.rates.iter().enumerate() {
            cumulative += rate;
            if cumulative > u {
                return i;
            }
        }
        self.rates.len().saturating_sub(1)
    }

    fn zero(&mut self) {
        self.rates.iter_mut().for_each(|r| *r = 0.0);
        self.total = 0.0;
    }
}
