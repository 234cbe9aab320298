//! InterventionHandler (spec §4.5): hosts pluggable controllers that either
//! add continuous rate columns to the scheduler or fire discrete
//! scheduled/event-driven actions. Grounded on
//! `original_source/code/interventionhandling.py`; the two built-in
//! interventions are grounded on `original_source/code/interventions/
//! ContRegionRemoval.py` and `template.py` (§E4).
//!
//! Interventions are compile-time registered trait implementations (design
//! note §9), not dynamically loaded: a configuration references one by
//! name and `InterventionHandler::register` resolves it to a concrete
//! type, the same shape as the host crate's `Action`/`Street` enums
//! standing in for what a duck-typed original would have left stringly
//! typed.

use crate::error::SimError;
use crate::event::EventKind;
use crate::host::HostId;
use crate::rate_handler::{ChannelKind, RateHandler};
use crate::store::World;

/// What an intervention's `update` call returns: a continuous intervention
/// reports rate changes to install into its channel; a discrete
/// intervention reports events for the simulator to apply via
/// `EventHandler` (§4.5).
pub enum InterventionUpdate {
    Rates(Vec<(usize, f64)>),
    Events(Vec<(HostId, EventKind)>),
}

/// A pluggable controller (§4.5). `rate_size`/`rate_factor` are only
/// consulted when `is_continuous()` is true.
pub trait Intervention {
    fn name(&self) -> &str;

    fn is_continuous(&self) -> bool;

    /// Time between periodic `update` calls, or `None` for
    /// "event-driven only" (update fires solely via `update_on_event`).
    fn update_freq(&self) -> Option<f64>;

    /// Number of rate slots claimed in the scheduler; meaningful only for
    /// continuous interventions.
    fn rate_size(&self) -> usize {
        0
    }

    fn rate_factor(&self) -> f64 {
        1.0
    }

    /// Called at setup (`initial = true`), on every scheduled tick, and
    /// (if `UpdateOnAllEvents`) after every event.
    fn update(&mut self, world: &World, time: f64, initial: bool) -> InterventionUpdate;

    /// Called when this intervention's continuous rate slot `slot` is
    /// selected as the next event; returns the discrete events to apply.
    /// Unused (default no-op) for discrete interventions, which never own
    /// a rate channel to be selected from.
    fn action(&mut self, _world: &World, _time: f64, _slot: usize) -> Vec<(HostId, EventKind)> {
        Vec::new()
    }
}

struct Registered {
    intervention: Box<dyn Intervention>,
    channel: Option<usize>,
    next_update: f64,
}

/// Owns the ordered list of interventions (§4.5).
pub struct InterventionHandler {
    interventions: Vec<Registered>,
    update_on_all_events: bool,
}

impl InterventionHandler {
    pub fn new(update_on_all_events: bool) -> Self {
        Self {
            interventions: Vec::new(),
            update_on_all_events,
        }
    }

    /// Register an intervention and, if continuous, grant it a new rate
    /// channel (§4.5: "each continuous intervention is granted a new rate
    /// channel").
    pub fn register(&mut self, intervention: Box<dyn Intervention>, rates: &mut RateHandler, index: usize) {
        let channel = if intervention.is_continuous() {
            Some(rates.add_channel(ChannelKind::Intervention(index), intervention.rate_size(), intervention.rate_factor()))
        } else {
            None
        };
        self.interventions.push(Registered {
            intervention,
            channel,
            next_update: 0.0,
        });
    }

    pub fn len(&self) -> usize {
        self.interventions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interventions.is_empty()
    }

    /// Populate initial rates (`initial = true`) and record each
    /// intervention's first scheduled update time (§4.5
    /// `initialise_rates`).
    pub fn initialise_rates(&mut self, world: &World, rates: &mut RateHandler) -> Result<(), SimError> {
        for entry in &mut self.interventions {
            if let Some(channel) = entry.channel {
                if let InterventionUpdate::Rates(changes) = entry.intervention.update(world, 0.0, true) {
                    for (slot, rate) in changes {
                        rates.insert(channel, slot, rate)?;
                    }
                }
            }
            entry.next_update = entry.intervention.update_freq().unwrap_or(f64::INFINITY);
        }
        Ok(())
    }

    /// Minimum over all recorded next-update times (`INFINITY` if none
    /// pending), §4.5 `next_intervention_time`.
    pub fn next_intervention_time(&self) -> f64 {
        self.interventions.iter().map(|e| e.next_update).fold(f64::INFINITY, f64::min)
    }

    /// Run every intervention whose scheduled time equals `time`,
    /// installing rate changes or collecting discrete events to apply.
    pub fn tick(&mut self, world: &World, rates: &mut RateHandler, time: f64) -> Result<Vec<(HostId, EventKind)>, SimError> {
        let mut discrete_events = Vec::new();
        for entry in &mut self.interventions {
            if entry.next_update > time {
                continue;
            }
            match entry.intervention.update(world, time, false) {
                InterventionUpdate::Rates(changes) => {
                    let channel = entry.channel.expect("continuous intervention missing its rate channel");
                    for (slot, rate) in changes {
                        rates.insert(channel, slot, rate)?;
                    }
                }
                InterventionUpdate::Events(events) => discrete_events.extend(events),
            }
            if let Some(freq) = entry.intervention.update_freq() {
                entry.next_update += freq;
            } else {
                entry.next_update = f64::INFINITY;
            }
        }
        Ok(discrete_events)
    }

    /// Invoke `action` on the continuous intervention owning `channel`
    /// when its slot `slot` was selected as the next event (§4.5).
    pub fn action(&mut self, channel: usize, slot: usize, world: &World, time: f64) -> Result<Vec<(HostId, EventKind)>, SimError> {
        let entry = self
            .interventions
            .iter_mut()
            .find(|e| e.channel == Some(channel))
            .ok_or_else(|| SimError::intervention("unknown", format!("no intervention owns rate channel {channel}")))?;
        Ok(entry.intervention.action(world, time, slot))
    }

    /// Fire `update` on every continuous intervention after an executed
    /// event, if `UpdateOnAllEvents` is enabled (§4.5).
    pub fn update_on_event(&mut self, world: &World, rates: &mut RateHandler, time: f64) -> Result<(), SimError> {
        if !self.update_on_all_events {
            return Ok(());
        }
        for entry in &mut self.interventions {
            if let Some(channel) = entry.channel {
                if let InterventionUpdate::Rates(changes) = entry.intervention.update(world, time, false) {
                    for (slot, rate) in changes {
                        rates.insert(channel, slot, rate)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// A CONTINUOUS intervention contributing one rate slot per host, each
/// fixed at the configured `rate_factor` while the host is alive
/// (§E4, grounded on `ContRegionRemoval.py`'s continuous-rate-per-host
/// shape; used directly by the cull-intervention KS test, §8 scenario 3).
pub struct ContinuousCull {
    nhosts: usize,
    rate_factor: f64,
}

impl ContinuousCull {
    pub fn new(nhosts: usize, rate_factor: f64) -> Self {
        Self { nhosts, rate_factor }
    }
}

impl Intervention for ContinuousCull {
    fn name(&self) -> &str {
        "ContinuousCull"
    }

    fn is_continuous(&self) -> bool {
        true
    }

    fn update_freq(&self) -> Option<f64> {
        None // event-driven only: rates are static, so no periodic tick needed
    }

    fn rate_size(&self) -> usize {
        self.nhosts
    }

    fn rate_factor(&self) -> f64 {
        self.rate_factor
    }

    fn update(&mut self, world: &World, _time: f64, _initial: bool) -> InterventionUpdate {
        let rates = (0..self.nhosts)
            .map(|id| {
                let alive = world.hosts.get(HostId(id)).state() != crate::state::Compartment::Culled;
                (id, if alive { 1.0 } else { 0.0 })
            })
            .collect();
        InterventionUpdate::Rates(rates)
    }

    fn action(&mut self, _world: &World, _time: f64, slot: usize) -> Vec<(HostId, EventKind)> {
        vec![(HostId(slot), EventKind::Cull)]
    }
}

/// A discrete, periodically-ticking intervention that culls a fixed list
/// of targets at `update_freq` intervals (§E4, grounded on `template.py`'s
/// discrete `action()` stub).
pub struct ScheduledCull {
    update_freq: f64,
    targets: Vec<HostId>,
}

impl ScheduledCull {
    pub fn new(update_freq: f64, targets: Vec<HostId>) -> Self {
        Self { update_freq, targets }
    }
}

impl Intervention for ScheduledCull {
    fn name(&self) -> &str {
        "ScheduledCull"
    }

    fn is_continuous(&self) -> bool {
        false
    }

    fn update_freq(&self) -> Option<f64> {
        Some(self.update_freq)
    }

    fn update(&mut self, world: &World, _time: f64, _initial: bool) -> InterventionUpdate {
        let events = self
            .targets
            .iter()
            .filter(|&&id| world.hosts.get(id).state() != crate::state::Compartment::Culled)
            .map(|&id| (id, EventKind::Cull))
            .collect();
        InterventionUpdate::Events(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Host, Position, RegionId};
    use crate::rates::RateKind;
    use crate::state::Compartment;
    use crate::store::HostStore;

    fn world_of(states: &[Compartment]) -> World {
        let hosts = states
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let mut h = Host::new(HostId(i), Position::new(i as f64, 0.0), RegionId(0), None);
                h.initialize(s);
                h
            })
            .collect();
        World {
            hosts: HostStore::new(hosts),
            cells: None,
        }
    }

    #[test]
    fn continuous_cull_installs_uniform_rate_for_living_hosts() {
        let mut rates = RateHandler::new(RateKind::Sum, RateKind::Sum, 3, 1.0);
        let mut handler = InterventionHandler::new(false);
        handler.register(Box::new(ContinuousCull::new(3, 2.0)), &mut rates, 0);
        let world = world_of(&[Compartment::I, Compartment::I, Compartment::Culled]);
        handler.initialise_rates(&world, &mut rates).unwrap();
        assert_eq!(rates.total_rate(), 4.0); // 2 alive hosts * factor 2.0
    }

    #[test]
    fn scheduled_cull_fires_only_at_its_tick() {
        let mut rates = RateHandler::new(RateKind::Sum, RateKind::Sum, 2, 1.0);
        let mut handler = InterventionHandler::new(false);
        handler.register(Box::new(ScheduledCull::new(5.0, vec![HostId(0), HostId(1)])), &mut rates, 0);
        let world = world_of(&[Compartment::I, Compartment::S]);
        handler.initialise_rates(&world, &mut rates).unwrap();
        assert_eq!(handler.next_intervention_time(), 5.0);

        let events = handler.tick(&world, &mut rates, 3.0).unwrap();
        assert!(events.is_empty());

        let events = handler.tick(&world, &mut rates, 5.0).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(handler.next_intervention_time(), 10.0);
    }
}
