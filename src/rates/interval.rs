//! Two-level interval-sum rate structure (§4.1 variant 2): O(1) insert
//! updating a per-group partial and a dirty bit, O(√N) select via a
//! two-stage binary search. Grounded on
//! `original_source/code/ratestructures/rateinterval.py`.

use super::{validate, RateStore};
use crate::error::SimError;

pub struct IntervalSum {
    interval_length: usize,
    n_intervals: usize,
    sub_rates: Vec<f64>,
    group_totals: Vec<f64>,
    group_prefix: Vec<f64>,
    dirty: bool,
    total: f64,
}

impl IntervalSum {
    pub fn new(size: usize) -> Self {
        let interval_length = (size as f64).sqrt().floor().max(1.0) as usize;
        let n_intervals = size.div_ceil(interval_length).max(1);
        let padded_length = interval_length * n_intervals;
        Self {
            interval_length,
            n_intervals,
            sub_rates: vec![0.0; padded_length],
            group_totals: vec![0.0; n_intervals],
            group_prefix: vec![0.0; n_intervals],
            dirty: false,
            total: 0.0,
        }
    }

    fn refresh(&mut self) {
        if !self.dirty {
            return;
        }
        let mut acc = 0.0;
        for i in 0..self.n_intervals {
            acc += self.group_totals[i];
            self.group_prefix[i] = acc;
        }
        self.total = acc;
        self.dirty = false;
    }

    /// First group index `g` such that `group_prefix[g] > u`.
    fn locate_group(&self, u: f64) -> usize {
        let mut low = 0usize;
        let mut high = self.n_intervals - 1;
        while low < high {
            let mid = low + (high - low) / 2;
            if self.group_prefix[mid] > u {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        low
    }

    /// First index within `[start, end)` such that the running prefix sum
    /// of `sub_rates` exceeds `u`. Rebuilds the local prefix sum first.
    fn locate_in_group(&self, group: usize, u: f64) -> usize {
        let start = group * self.interval_length;
        let end = (start + self.interval_length).min(self.sub_rates.len());
        let mut acc = 0.0;
        for i in start..end {
            acc += self.sub_rates[i];
            if acc > u {
                return i;
            }
        }
        end.saturating_sub(1)
    }
}

impl RateStore for IntervalSum {
    fn len(&self) -> usize {
        self.sub_rates.len()
    }

    fn insert(&mut self, pos: usize, rate: f64) -> Result<(), SimError> {
        let rate = validate(rate)?;
        let delta = rate - self.sub_rates[pos];
        self.sub_rates[pos] = rate;
        let group = pos / self.interval_length;
        self.group_totals[group] += delta;
        self.total += delta;
        self.dirty = true;
        Ok(())
    }

    fn get(&self, pos: usize) -> f64 {
        self.sub_rates[pos]
    }

    fn total(&mut self) -> f64 {
        self.refresh();
        self.total
    }

    fn select(&mut self, u: f64, _rng: &mut rand::rngs::SmallRng) -> usize {
        self.refresh();
        let group = self.locate_group(u);
        let remainder = if group == 0 {
            u
        } else {
            u - self.group_prefix[group - 1]
        };
        self.locate_in_group(group, remainder)
    }

    fn zero(&mut self) {
        self.sub_rates.iter_mut().for_each(|r| *r = 0.0);
        self.group_totals.iter_mut().for_each(|r| *r = 0.0);
        self.group_prefix.iter_mut().for_each(|r| *r = 0.0);
        self.total = 0.0;
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::super::shared_tests::*;
    use super::*;

    #[test]
    fn exact_get() {
        exact_get_after_insert(IntervalSum::new(4));
    }

    #[test]
    fn total_sum() {
        total_matches_sum(IntervalSum::new(37), 37);
    }

    #[test]
    fn zero_insert() {
        zero_then_insert_yields_single_rate(IntervalSum::new(10));
    }

    #[test]
    fn clamps_negative() {
        negative_rate_clamps_to_zero(IntervalSum::new(4));
    }

    #[test]
    fn rejects_nan() {
        nan_rate_rejected(IntervalSum::new(4));
    }

    #[test]
    fn uniform_selection() {
        selection_matches_rate_distribution(IntervalSum::new(5), &[1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn skewed_selection() {
        selection_matches_rate_distribution(IntervalSum::new(6), &[10.0, 1.0, 0.1, 5.0, 2.0, 8.0]);
    }
}
