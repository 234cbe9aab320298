//! RateHandler (spec §4.2): owns one rate structure per event channel and
//! selects the next event across channels. Grounded on
//! `original_source/ratehandling.py`; `get_next_event`'s divide-by-factor
//! step is pinned by the distilled spec rather than the prototype (see
//! SPEC_FULL.md §E for the discrepancy).

use crate::error::SimError;
use crate::rates::{RateBank, RateKind, RateStore};
use rand::rngs::SmallRng;
use rand::Rng;

/// Below this total rate, `get_next_event` reports no event regardless of
/// whether scheduled (intervention/raster-dump) times remain (§4.2).
pub const MIN_TOTAL_RATE: f64 = 1e-10;

/// Which role a channel plays; `Intervention` carries the index into
/// [`RateHandler`]'s channel list it was registered at; most callers just
/// need to recover which concrete continuous intervention fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Infection,
    Advance,
    Sporulation,
    Intervention(usize),
}

struct Channel {
    kind: ChannelKind,
    factor: f64,
    store: RateBank,
}

/// Owns the per-channel rate structures (§4.2). Channel 0 is always
/// `Infection`, channel 1 always `Advance`; `Sporulation` and
/// `Intervention_k` channels are appended as the simulator's setup phase
/// requires them.
pub struct RateHandler {
    channels: Vec<Channel>,
}

impl RateHandler {
    pub fn new(infection: RateKind, advance: RateKind, nhosts_or_cells: usize, infection_factor: f64) -> Self {
        Self {
            channels: vec![
                Channel {
                    kind: ChannelKind::Infection,
                    factor: infection_factor,
                    store: RateBank::new(infection, nhosts_or_cells),
                },
                Channel {
                    kind: ChannelKind::Advance,
                    factor: 1.0,
                    store: RateBank::new(advance, nhosts_or_cells),
                },
            ],
        }
    }

    pub const INFECTION: usize = 0;
    pub const ADVANCE: usize = 1;

    /// Register a new rate channel (§4.2 `add_channel`), used for the
    /// `Sporulation` channel and for each continuous intervention's rate
    /// slot. Returns the new channel's index.
    pub fn add_channel(&mut self, kind: ChannelKind, size: usize, factor: f64) -> usize {
        self.channels.push(Channel {
            kind,
            factor,
            store: RateBank::new(RateKind::Tree, size),
        });
        self.channels.len() - 1
    }

    pub fn kind_of(&self, channel: usize) -> ChannelKind {
        self.channels[channel].kind
    }

    pub fn insert(&mut self, channel: usize, pos: usize, rate: f64) -> Result<(), SimError> {
        self.channels[channel].store.insert(pos, rate)
    }

    pub fn get(&self, channel: usize, pos: usize) -> f64 {
        self.channels[channel].store.get(pos)
    }

    pub fn zero(&mut self, channel: usize) {
        self.channels[channel].store.zero();
    }

    pub fn zero_all(&mut self) {
        for channel in &mut self.channels {
            channel.store.zero();
        }
    }

    /// Tuned bulk-fill path for initial rates (§4.2 `bulk_insert`).
    pub fn bulk_insert(&mut self, channel: usize, values: &[f64]) -> Result<(), SimError> {
        for (pos, &rate) in values.iter().enumerate() {
            self.channels[channel].store.insert(pos, rate)?;
        }
        Ok(())
    }

    /// Sum over every channel's `factor * structure.total()`.
    pub fn total_rate(&mut self) -> f64 {
        self.channels.iter_mut().map(|c| c.factor * c.store.total()).sum()
    }

    /// §4.2 `get_next_event`: compute per-channel contributions, draw
    /// `u ~ Uniform(0, total)`, walk channels in registration order
    /// accumulating until the running sum exceeds `u`, subtract the prior
    /// cumulative and divide by that channel's factor before delegating
    /// to its structure's `select`.
    pub fn get_next_event(&mut self, rng: &mut SmallRng) -> (f64, Option<usize>, Option<usize>) {
        let contributions: Vec<f64> = self
            .channels
            .iter_mut()
            .map(|c| c.factor * c.store.total())
            .collect();
        let total: f64 = contributions.iter().sum();
        if total < MIN_TOTAL_RATE {
            return (total, None, None);
        }
        let u = rng.random::<f64>() * total;
        let mut cumulative = 0.0;
        for (idx, &contribution) in contributions.iter().enumerate() {
            if u < cumulative + contribution {
                let local_u = ((u - cumulative) / self.channels[idx].factor).max(0.0);
                let id = self.channels[idx].store.select(local_u, rng);
                return (total, Some(idx), Some(id));
            }
            cumulative += contribution;
        }
        // Floating-point drift pushed `u` past the last channel's bound;
        // fall back to it rather than silently drop the draw.
        let last = self.channels.len() - 1;
        let local_u = ((u - (cumulative - contributions[last])) / self.channels[last].factor).max(0.0);
        let id = self.channels[last].store.select(local_u, rng);
        (total, Some(last), Some(id))
    }
}
