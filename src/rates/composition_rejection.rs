//! Composition-rejection rate structure (§4.1 variant 4): log2-bucketed
//! groups plus zero/epsilon/omega special groups, amortised O(1) insert and
//! select via rejection sampling inside a bucket. Grounded on
//! `original_source/rateCR.py` and `original_source/rateCRgroup.py`.

use super::tree::RateTree;
use super::{validate, RateStore};
use crate::error::SimError;
use rand::rngs::SmallRng;
use rand::Rng;

/// One log2 bucket (or a special group): a flat, unordered bag of
/// `(pos, rate)` pairs supporting O(1) insert/remove via swap-removal,
/// mirroring `RateCRGroup`'s `events`/`location_to_index_map` pair.
struct Group {
    /// Rejection ceiling for this bucket (`max_rate` in the Python source).
    ceiling: f64,
    positions: Vec<usize>,
    rates: Vec<f64>,
    total: f64,
}

impl Group {
    fn new(ceiling: f64) -> Self {
        Self {
            ceiling,
            positions: Vec::new(),
            rates: Vec::new(),
            total: 0.0,
        }
    }

    fn clear(&mut self) {
        self.positions.clear();
        self.rates.clear();
        self.total = 0.0;
    }

    /// Append a new member; returns its index within this group.
    fn push(&mut self, pos: usize, rate: f64) -> usize {
        self.positions.push(pos);
        self.rates.push(rate);
        self.total += rate;
        self.positions.len() - 1
    }

    /// Swap-remove the member at `idx`; if a different member was moved
    /// into its slot, return `(moved_pos, idx)` so the caller can fix up
    /// its index bookkeeping.
    fn swap_remove(&mut self, idx: usize) -> Option<(usize, usize)> {
        self.total -= self.rates[idx];
        self.positions.swap_remove(idx);
        self.rates.swap_remove(idx);
        if idx < self.positions.len() {
            Some((self.positions[idx], idx))
        } else {
            None
        }
    }

    fn set_rate(&mut self, idx: usize, rate: f64) {
        self.total += rate - self.rates[idx];
        self.rates[idx] = rate;
    }

    /// Rejection sampling within the bucket: draw a uniform index and a
    /// uniform rate up to `ceiling`, accept if the drawn rate is under the
    /// member's actual rate (`RateCRGroup.select_event`).
    fn select(&self, rng: &mut SmallRng) -> usize {
        debug_assert!(!self.positions.is_empty(), "select on an empty CR group");
        loop {
            let candidate = rng.random_range(0..self.positions.len());
            let threshold = rng.random::<f64>() * self.ceiling;
            if threshold < self.rates[candidate] {
                return self.positions[candidate];
            }
        }
    }
}

pub struct CompositionRejection {
    size: usize,
    min_rate: f64,
    max_rate: f64,
    offset_min: i32,
    n_groups_normal: usize,
    group_epsilon: usize,
    group_omega: usize,
    group_zero: usize,
    groups: Vec<Group>,
    /// Per-group total, mirrored here so `total()`/bucket selection run in
    /// O(log n_groups) rather than a linear rescan every call (`RateCR`
    /// itself stores this as `self.group_rates`, a `RateTree`).
    group_totals: RateTree,
    location_group: Vec<usize>,
    location_index: Vec<usize>,
}

impl CompositionRejection {
    pub fn new(size: usize, min_rate: f64, max_rate: f64) -> Self {
        let offset_min = min_rate.log2().floor() as i32;
        let min_rate = 2f64.powi(offset_min);
        let offset_max = max_rate.log2().ceil() as i32;
        let max_rate = 2f64.powi(offset_max);

        let n_groups_normal = (offset_max - offset_min).max(0) as usize;
        let group_epsilon = n_groups_normal;
        let group_omega = group_epsilon + 1;
        let group_zero = group_omega + 1;
        let n_groups = group_zero + 1;

        let mut groups = Vec::with_capacity(n_groups);
        let mut factor = 1.0;
        for _ in 0..n_groups_normal {
            groups.push(Group::new(min_rate * factor * 2.0));
            factor *= 2.0;
        }
        groups.push(Group::new(min_rate)); // epsilon: [0, min_rate)
        groups.push(Group::new(max_rate * 32.0)); // omega: [max_rate, inf)
        groups.push(Group::new(0.0)); // zero

        let mut cr = Self {
            size,
            min_rate,
            max_rate,
            offset_min,
            n_groups_normal,
            group_epsilon,
            group_omega,
            group_zero,
            groups,
            group_totals: RateTree::new(n_groups),
            location_group: vec![group_zero; size],
            location_index: (0..size).collect(),
        };
        cr.zero();
        cr
    }

    fn group_id_from_rate(&self, rate: f64) -> usize {
        if rate <= 0.0 {
            self.group_zero
        } else if rate < self.min_rate {
            self.group_epsilon
        } else if rate >= self.max_rate {
            self.group_omega
        } else {
            (rate.log2().floor() as i32 - self.offset_min) as usize
        }
    }

    fn report(&mut self, group: usize) {
        let total = self.groups[group].total;
        self.group_totals
            .insert(group, total)
            .expect("group totals are always finite and nonnegative");
    }
}

impl RateStore for CompositionRejection {
    fn len(&self) -> usize {
        self.size
    }

    fn insert(&mut self, pos: usize, rate: f64) -> Result<(), SimError> {
        let rate = validate(rate)?;
        let target = self.group_id_from_rate(rate);
        let current = self.location_group[pos];

        if current == target {
            let idx = self.location_index[pos];
            self.groups[current].set_rate(idx, rate);
        } else {
            let idx = self.location_index[pos];
            if let Some((moved_pos, new_idx)) = self.groups[current].swap_remove(idx) {
                self.location_index[moved_pos] = new_idx;
            }
            let new_idx = self.groups[target].push(pos, rate);
            self.location_group[pos] = target;
            self.location_index[pos] = new_idx;
            self.report(current);
        }
        self.report(target);
        Ok(())
    }

    fn get(&self, pos: usize) -> f64 {
        let group = self.location_group[pos];
        let idx = self.location_index[pos];
        self.groups[group].rates[idx]
    }

    fn total(&mut self) -> f64 {
        self.group_totals.total()
    }

    fn select(&mut self, u: f64, rng: &mut SmallRng) -> usize {
        let n_groups = self.groups.len();
        let mut cumulative = 0.0;
        for i in 0..n_groups {
            let group_rate = self.groups[i].total;
            if u < cumulative + group_rate {
                return self.groups[i].select(rng);
            }
            cumulative += group_rate;
        }
        // Floating-point drift pushed `u` past the last nonempty group;
        // fall back to it rather than panic.
        self.groups
            .iter()
            .rev()
            .find(|g| !g.positions.is_empty())
            .map(|g| g.select(rng))
            .expect("select called with total() == 0")
    }

    fn zero(&mut self) {
        for group in self.groups.iter_mut() {
            group.clear();
        }
        let zero = self.group_zero;
        for pos in 0..self.size {
            let idx = self.groups[zero].push(pos, 0.0);
            self.location_group[pos] = zero;
            self.location_index[pos] = idx;
        }
        self.group_totals.zero();
        for i in 0..self.groups.len() {
            self.report(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::shared_tests::*;
    use super::*;

    fn make(size: usize) -> CompositionRejection {
        CompositionRejection::new(size, 1e-6, 1e3)
    }

    #[test]
    fn exact_get() {
        exact_get_after_insert(make(4));
    }

    #[test]
    fn total_sum() {
        total_matches_sum(make(20), 20);
    }

    #[test]
    fn zero_insert() {
        zero_then_insert_yields_single_rate(make(8));
    }

    #[test]
    fn clamps_negative() {
        negative_rate_clamps_to_zero(make(4));
    }

    #[test]
    fn rejects_nan() {
        nan_rate_rejected(make(4));
    }

    #[test]
    fn uniform_selection() {
        selection_matches_rate_distribution(make(5), &[1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn skewed_selection() {
        selection_matches_rate_distribution(make(4), &[10.0, 1.0, 0.1, 5.0]);
    }

    #[test]
    fn rate_crossing_bucket_boundary_moves_groups() {
        let mut cr = make(3);
        cr.insert(0, 0.5).unwrap();
        let small_group = cr.location_group[0];
        cr.insert(0, 500.0).unwrap();
        let large_group = cr.location_group[0];
        assert_ne!(small_group, large_group);
        assert_eq!(cr.get(0), 500.0);
    }
}
