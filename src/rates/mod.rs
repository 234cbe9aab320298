//! Rate structures (spec §4.1): four interchangeable indexed collections of
//! nonnegative rates supporting O(log N)-or-better weighted selection.
//!
//! Dispatch is a sealed enum over the four concrete variants (design note
//! §9: "a sealed tagged variant with a small trait/interface... No virtual
//! inheritance"), not a trait object.

mod composition_rejection;
mod interval;
mod sum;
mod tree;

pub use composition_rejection::CompositionRejection;
pub use interval::IntervalSum;
pub use sum::FlatSum;
pub use tree::RateTree;

use crate::error::SimError;
use rand::rngs::SmallRng;

/// Rates below this are a setup/engine bug (NaN or -inf), not merely a
/// non-positive contribution; negative-but-finite rates are clamped to
/// zero per §4.1.
fn validate(rate: f64) -> Result<f64, SimError> {
    if rate.is_nan() || rate == f64::NEG_INFINITY {
        return Err(SimError::invariant(format!(
            "rate structure rejected non-finite rate {rate}"
        )));
    }
    Ok(rate.max(0.0))
}

/// Common contract every rate structure variant implements identically
/// (§4.1): `insert`, `get`, `total`, `select`, `zero`.
///
/// `select` takes both the pre-drawn uniform variate `u` (the contract the
/// spec describes: the caller draws `u ~ Uniform(0, total())` once and the
/// structure is otherwise a deterministic function of it) and a handle to
/// the simulation's RNG stream. Three of the four variants ignore the RNG
/// entirely, since `u` alone fully determines their answer; the
/// composition-rejection variant is architecturally a rejection sampler and
/// needs further draws beyond `u` to pick within the chosen bucket — the
/// same shape as the Python prototype's `RateCRGroup.select_event`, which
/// draws fresh random numbers from the shared global stream after already
/// having been told `u` (in fact it never consults `u`'s value past group
/// selection). Swapping a channel's rate structure therefore changes the
/// exact sequence of draws consumed, which is why §8 scenario 6 only
/// requires distributional, not byte-identical, equivalence across
/// structures.
pub trait RateStore {
    /// Number of indexable slots.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set the rate at `pos`, replacing any previously stored value.
    fn insert(&mut self, pos: usize, rate: f64) -> Result<(), SimError>;

    /// Return the exact last-inserted rate at `pos` (never an
    /// approximation, even in structures with lazily-refreshed totals).
    fn get(&self, pos: usize) -> f64;

    /// Sum of all rates, refreshed if the structure caches it lazily.
    fn total(&mut self) -> f64;

    /// Given `u` in `[0, total())`, return the index `i` such that
    /// `sum_{j<i} rate_j <= u < sum_{j<=i} rate_j` under canonical
    /// (ascending index) ordering.
    fn select(&mut self, u: f64, rng: &mut SmallRng) -> usize;

    /// Reset every rate to zero; `total()` becomes zero.
    fn zero(&mut self);
}

/// Which concrete [`RateStore`] backs a channel, selected at
/// [`crate::rate_handler::RateHandler`] construction time (§6's
/// `RateStructure-{Infection,Advance}` configuration key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RateKind {
    Sum,
    Interval,
    Tree,
    CompositionRejection,
}

/// The sealed dispatch enum. All four variants are interchangeable: same
/// `(insert, select)` observable behaviour given the same `u` (§4.1).
pub enum RateBank {
    Sum(FlatSum),
    Interval(IntervalSum),
    Tree(RateTree),
    CompositionRejection(Box<CompositionRejection>),
}

impl RateBank {
    pub fn new(kind: RateKind, size: usize) -> Self {
        match kind {
            RateKind::Sum => Self::Sum(FlatSum::new(size)),
            RateKind::Interval => Self::Interval(IntervalSum::new(size)),
            RateKind::Tree => Self::Tree(RateTree::new(size)),
            RateKind::CompositionRejection => {
                // min_rate/max_rate bracket: the working range is set wide
                // relative to `size` since per-channel rates in this engine
                // are typically O(kernel value) to O(size * kernel value).
                let min_rate = 1e-6;
                let max_rate = (size as f64).max(1.0) * 1e3;
                Self::CompositionRejection(Box::new(CompositionRejection::new(
                    size, min_rate, max_rate,
                )))
            }
        }
    }
}

impl RateStore for RateBank {
    fn len(&self) -> usize {
        match self {
            Self::Sum(s) => s.len(),
            Self::Interval(s) => s.len(),
            Self::Tree(s) => s.len(),
            Self::CompositionRejection(s) => s.len(),
        }
    }

    fn insert(&mut self, pos: usize, rate: f64) -> Result<(), SimError> {
        match self {
            Self::Sum(s) => s.insert(pos, rate),
            Self::Interval(s) => s.insert(pos, rate),
            Self::Tree(s) => s.insert(pos, rate),
            Self::CompositionRejection(s) => s.insert(pos, rate),
        }
    }

    fn get(&self, pos: usize) -> f64 {
        match self {
            Self::Sum(s) => s.get(pos),
            Self::Interval(s) => s.get(pos),
            Self::Tree(s) => s.get(pos),
            Self::CompositionRejection(s) => s.get(pos),
        }
    }

    fn total(&mut self) -> f64 {
        match self {
            Self::Sum(s) => s.total(),
            Self::Interval(s) => s.total(),
            Self::Tree(s) => s.total(),
            Self::CompositionRejection(s) => s.total(),
        }
    }

    fn select(&mut self, u: f64, rng: &mut SmallRng) -> usize {
        match self {
            Self::Sum(s) => s.select(u, rng),
            Self::Interval(s) => s.select(u, rng),
            Self::Tree(s) => s.select(u, rng),
            Self::CompositionRejection(s) => s.select(u, rng),
        }
    }

    fn zero(&mut self) {
        match self {
            Self::Sum(s) => s.zero(),
            Self::Interval(s) => s.zero(),
            Self::Tree(s) => s.zero(),
            Self::CompositionRejection(s) => s.zero(),
        }
    }
}
