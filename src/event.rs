//! EventHandler (spec §4.4): applies a single event and redistributes rate
//! pressure. Grounded on `original_source/eventhandling.py`'s
//! `do_event_cached`/`do_event_uncached` for the Advance/pressure-
//! redistribution core; the raster, cull, and sporulation branches are
//! supplemented from the distilled spec directly, since the prototype only
//! implements the individual-mode Advance path (SPEC_FULL.md §E2).

use crate::error::SimError;
use crate::host::{CellId, HostId};
use crate::kernel::{CacheKernel, Kernel, VsKernel};
use crate::rate_handler::RateHandler;
use crate::state::{Compartment, Model};
use crate::store::World;
use rand::rngs::SmallRng;
use rand::Rng;
use std::collections::HashMap;

/// Which kind of event `EventHandler::do_event` is asked to apply. This is
/// distinct from [`crate::rate_handler::ChannelKind`]: a continuous
/// intervention's rate channel, once selected, is resolved by the
/// `InterventionHandler` into zero or more concrete events (almost always
/// `Cull`) before reaching here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Infection,
    Advance,
    Sporulation,
    Cull,
}

/// One applied transition, returned so callers (the simulator's event log,
/// `update_on_event` hooks) can observe what happened without re-deriving
/// it from host state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Applied {
    pub host: HostId,
    pub old: Compartment,
    pub new: Compartment,
}

enum Mode {
    Individual {
        cache: Option<CacheKernel>,
    },
    Raster {
        coupling: Vec<(i64, i64)>,
        max_hosts: f64,
        vs: Option<VsKernel>,
    },
}

/// Applies events and redistributes infection/removal pressure (§4.4).
/// Holds only setup-time-fixed configuration (model chain, kernel, advance
/// rates, mode); hosts/cells/rates are passed in by the simulator on every
/// call rather than stored, since the simulator is the sole owner (§3).
pub struct EventHandler {
    model: Model,
    kernel: Kernel,
    adv_rate: HashMap<Compartment, f64>,
    mode: Mode,
    sporulation_channel: Option<usize>,
}

impl EventHandler {
    pub fn individual(model: Model, kernel: Kernel, adv_rate: HashMap<Compartment, f64>, cache: Option<CacheKernel>) -> Self {
        Self {
            model,
            kernel,
            adv_rate,
            mode: Mode::Individual { cache },
            sporulation_channel: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn raster(
        model: Model,
        kernel: Kernel,
        adv_rate: HashMap<Compartment, f64>,
        coupling: Vec<(i64, i64)>,
        max_hosts: f64,
        vs: Option<VsKernel>,
        sporulation_channel: Option<usize>,
    ) -> Self {
        Self {
            model,
            kernel,
            adv_rate,
            mode: Mode::Raster { coupling, max_hosts, vs },
            sporulation_channel,
        }
    }

    pub fn is_raster(&self) -> bool {
        matches!(self.mode, Mode::Raster { .. })
    }

    /// Dispatch a single event (§4.4). `id` is a host id for
    /// `Advance`/`Cull`, always; for `Infection` it is a host id in
    /// individual mode or a cell id in raster mode; for `Sporulation` it
    /// is the source cell id. Unrecognised combinations (e.g.
    /// `Sporulation` without virtual sporulation configured) are fatal
    /// per §4.4's failure modes.
    pub fn do_event(
        &mut self,
        kind: EventKind,
        id: usize,
        world: &mut World,
        rates: &mut RateHandler,
        time: f64,
        rng: &mut SmallRng,
    ) -> Result<Vec<Applied>, SimError> {
        match kind {
            EventKind::Infection => match self.mode {
                Mode::Individual { .. } => self.infect_individual(HostId(id), world, rates, time).map(|a| vec![a]),
                Mode::Raster { .. } => self.infect_cell(CellId(id), world, rates, time).map(|a| vec![a]),
            },
            EventKind::Advance => self.advance_host(HostId(id), world, rates, time).map(|a| vec![a]),
            EventKind::Cull => self.cull_host(HostId(id), world, rates, time).map(|a| vec![a]),
            EventKind::Sporulation => {
                let applied = self.apply_sporulation(CellId(id), world, rates, time, rng)?;
                Ok(applied.into_iter().collect())
            }
        }
    }

    fn infect_individual(&mut self, host_id: HostId, world: &mut World, rates: &mut RateHandler, time: f64) -> Result<Applied, SimError> {
        let old = world.hosts.get(host_id).state();
        if !old.is_susceptible() {
            return Err(SimError::invariant(format!(
                "infection event targeted non-susceptible host {}",
                host_id.0
            )));
        }
        let new = self
            .model
            .next(old)
            .ok_or_else(|| SimError::invariant("susceptible compartment has no successor in Model chain"))?;
        world.hosts.get_mut(host_id).transition(new, time);
        rates.insert(RateHandler::INFECTION, host_id.0, 0.0)?;
        self.post_transition(host_id, old, new, world, rates)?;
        Ok(Applied { host: host_id, old, new })
    }

    fn infect_cell(&mut self, cell_id: CellId, world: &mut World, rates: &mut RateHandler, time: f64) -> Result<Applied, SimError> {
        let host_id = world
            .cells
            .as_ref()
            .expect("raster mode requires cells")
            .first_susceptible(cell_id, &world.hosts)
            .ok_or_else(|| SimError::invariant(format!("infection event on cell {} with zero susceptibles", cell_id.0)))?;

        let n_s_before = world.cells.as_ref().unwrap().get(cell_id).count(Compartment::S);
        let old = world.hosts.get(host_id).state();
        let new = self
            .model
            .next(old)
            .ok_or_else(|| SimError::invariant("susceptible compartment has no successor in Model chain"))?;

        world.hosts.get_mut(host_id).transition(new, time);
        world.cells.as_mut().unwrap().record_transition(cell_id, old, new);

        if n_s_before > 0 {
            let factor = (n_s_before as f64 - 1.0) / n_s_before as f64;
            let old_rate = rates.get(RateHandler::INFECTION, cell_id.0);
            rates.insert(RateHandler::INFECTION, cell_id.0, old_rate * factor)?;
        }

        self.post_transition(host_id, old, new, world, rates)?;
        Ok(Applied { host: host_id, old, new })
    }

    fn advance_host(&mut self, host_id: HostId, world: &mut World, rates: &mut RateHandler, time: f64) -> Result<Applied, SimError> {
        let old = world.hosts.get(host_id).state();
        let new = self
            .model
            .next(old)
            .ok_or_else(|| SimError::invariant(format!("host {} has no successor from {old:?}", host_id.0)))?;

        world.hosts.get_mut(host_id).transition(new, time);
        if let Some(cell_id) = world.hosts.get(host_id).cell() {
            world.cells.as_mut().expect("raster mode requires cells").record_transition(cell_id, old, new);
        }
        self.post_transition(host_id, old, new, world, rates)?;
        Ok(Applied { host: host_id, old, new })
    }

    fn cull_host(&mut self, host_id: HostId, world: &mut World, rates: &mut RateHandler, time: f64) -> Result<Applied, SimError> {
        let old = world.hosts.get(host_id).state();
        if old == Compartment::Culled {
            return Err(SimError::invariant(format!("host {} culled twice", host_id.0)));
        }
        world.hosts.get_mut(host_id).transition(Compartment::Culled, time);
        if let Some(cell_id) = world.hosts.get(host_id).cell() {
            world.cells.as_mut().expect("raster mode requires cells").record_transition(cell_id, old, Compartment::Culled);
        }
        if matches!(self.mode, Mode::Individual { .. }) {
            rates.insert(RateHandler::INFECTION, host_id.0, 0.0)?;
        }
        self.post_transition(host_id, old, Compartment::Culled, world, rates)?;
        Ok(Applied {
            host: host_id,
            old,
            new: Compartment::Culled,
        })
    }

    /// Sample a virtual-sporulation jump from `source_cell`, accept it
    /// with probability `n_S(target) / MaxHosts`, and on acceptance run a
    /// raster infection event at the target cell (§4.4).
    fn apply_sporulation(
        &mut self,
        source_cell: CellId,
        world: &mut World,
        rates: &mut RateHandler,
        time: f64,
        rng: &mut SmallRng,
    ) -> Result<Option<Applied>, SimError> {
        let max_hosts = match &self.mode {
            Mode::Raster { max_hosts, .. } => *max_hosts,
            Mode::Individual { .. } => {
                return Err(SimError::invariant("sporulation event fired in individual mode"))
            }
        };
        let (d_row, d_col) = match &mut self.mode {
            Mode::Raster { vs: Some(vs), .. } => vs.sample_offset(rng),
            _ => return Err(SimError::invariant("sporulation event fired without virtual sporulation configured")),
        };

        let (source_row, source_col) = world.cells.as_ref().unwrap().get(source_cell).position();
        let target_id = match world.cells.as_ref().unwrap().at_position(source_row + d_row, source_col + d_col) {
            Some(id) => id,
            None => return Ok(None), // out-of-domain jump target: inert, per §4.4
        };

        let n_s = world.cells.as_ref().unwrap().get(target_id).count(Compartment::S) as f64;
        if rng.random::<f64>() >= n_s / max_hosts {
            return Ok(None);
        }
        self.infect_cell(target_id, world, rates, time).map(Some)
    }

    /// Shared post-transition bookkeeping for Infection/Advance/Cull
    /// (§4.4): install the `*AdvRate` for the new compartment if it has a
    /// successor, clear it otherwise, and redistribute infection pressure
    /// if infectiousness changed. Generalises the spec's "on entering R"
    /// and "on entering C or I" wording to any infectiousness-changing
    /// transition so non-canonical `Model` chains (e.g. one that skips a
    /// compartment between two infectious states) stay consistent with
    /// the §8 invariant that `inf_rate` always equals the explicit sum
    /// over currently-infectious hosts (see DESIGN.md).
    fn post_transition(
        &mut self,
        host_id: HostId,
        old: Compartment,
        new: Compartment,
        world: &mut World,
        rates: &mut RateHandler,
    ) -> Result<(), SimError> {
        rates.insert(RateHandler::ADVANCE, host_id.0, self.advance_rate_for(new))?;

        if !old.is_infectious() && new.is_infectious() {
            self.distribute_pressure(host_id, world, rates, 1.0)?;
        } else if old.is_infectious() && !new.is_infectious() {
            self.distribute_pressure(host_id, world, rates, -1.0)?;
        }
        Ok(())
    }

    /// The `*AdvRate` that should apply to a host now in `state`, zero if
    /// `state` has no successor in the `Model` chain. Shared between
    /// `post_transition` and the simulator's initial-rate computation.
    pub(crate) fn advance_rate_for(&self, state: Compartment) -> f64 {
        let advances_further = matches!(state, Compartment::E | Compartment::C | Compartment::D | Compartment::I) && self.model.next(state).is_some();
        if advances_further {
            *self.adv_rate.get(&state).unwrap_or(&0.0)
        } else {
            0.0
        }
    }

    /// Seed one already-infectious host's positive infection pressure at
    /// setup (§4.6 setup step 3): equivalent to the positive branch of
    /// `post_transition` without touching the advance rate or requiring a
    /// prior state.
    pub(crate) fn seed_infection_pressure(&mut self, host_id: HostId, world: &World, rates: &mut RateHandler) -> Result<(), SimError> {
        self.distribute_pressure(host_id, world, rates, 1.0)
    }

    /// Redistribute infection pressure caused by `host_id` gaining
    /// (`sign = 1.0`) or losing (`sign = -1.0`) infectiousness (§4.4). Takes
    /// `world` by shared reference since it only reads positions/cells; the
    /// simulator's initial-rate seeding pass (§4.6 setup step 3) reuses it
    /// directly for every host that starts out infectious.
    pub(crate) fn distribute_pressure(&mut self, host_id: HostId, world: &World, rates: &mut RateHandler, sign: f64) -> Result<(), SimError> {
        match &self.mode {
            Mode::Individual { cache } => {
                let host_pos = world.hosts.get(host_id).position();
                let host_idx = host_id.0;
                for other in world.hosts.iter() {
                    if !other.state().is_susceptible() {
                        continue;
                    }
                    let k = match cache {
                        Some(cache) => cache.get(other.id().0, host_idx),
                        None => self.kernel.individual(other.position(), host_pos),
                    };
                    if k == 0.0 {
                        continue;
                    }
                    let old_rate = rates.get(RateHandler::INFECTION, other.id().0);
                    rates.insert(RateHandler::INFECTION, other.id().0, old_rate + sign * k)?;
                }
                Ok(())
            }
            Mode::Raster { coupling, max_hosts, .. } => {
                let cell_id = world.hosts.get(host_id).cell().expect("raster host must belong to a cell");
                let cells = world.cells.as_ref().expect("raster mode requires cells");
                let (row, col) = cells.get(cell_id).position();
                let infectiousness = cells.get(cell_id).infectiousness;

                for &(d_row, d_col) in coupling {
                    let target_row = row + d_row;
                    let target_col = col + d_col;
                    let Some(target_id) = world.cells.as_ref().unwrap().at_position(target_row, target_col) else {
                        continue; // out of domain: inert, §4.4
                    };
                    let k = self.kernel.offset(d_row, d_col);
                    if k == 0.0 {
                        continue;
                    }
                    let target = world.cells.as_ref().unwrap().get(target_id);
                    let n_s = target.count(Compartment::S);
                    if n_s == 0 {
                        continue;
                    }
                    let delta = k * (n_s as f64) * target.susceptibility * infectiousness / max_hosts;
                    let old_rate = rates.get(RateHandler::INFECTION, target_id.0);
                    rates.insert(RateHandler::INFECTION, target_id.0, old_rate + sign * delta)?;
                }

                if let Some(channel) = self.sporulation_channel {
                    let cell = world.cells.as_ref().unwrap().get(cell_id);
                    let spore_rate = cell.infectious_count() as f64 * cell.infectiousness;
                    rates.insert(channel, cell_id.0, spore_rate)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::host::{Host, Position, RegionId};
    use crate::kernel::RasterKernel;
    use crate::rates::RateKind;
    use crate::store::{CellStore, HostStore};
    use rand::SeedableRng;

    fn model_sir() -> Model {
        Model::parse("SIR").unwrap()
    }

    fn adv_rates() -> HashMap<Compartment, f64> {
        let mut m = HashMap::new();
        m.insert(Compartment::I, 0.5);
        m
    }

    #[test]
    fn individual_infection_zeroes_own_rate_and_adds_pressure() {
        let kernel = Kernel::exponential(1.0);
        let mut handler = EventHandler::individual(model_sir(), kernel, adv_rates(), None);
        let mut hosts = vec![
            Host::new(HostId(0), Position::new(0.0, 0.0), RegionId(0), None),
            Host::new(HostId(1), Position::new(0.5, 0.0), RegionId(0), None),
        ];
        hosts[0].initialize(Compartment::S);
        hosts[1].initialize(Compartment::S);
        let mut world = World {
            hosts: HostStore::new(hosts),
            cells: None,
        };
        let mut rates = RateHandler::new(RateKind::Sum, RateKind::Sum, 2, 1.0);
        let applied = handler.do_event(EventKind::Infection, 0, &mut world, &mut rates, 0.1, &mut SmallRng::seed_from_u64(1)).unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].new, Compartment::I);
        assert_eq!(rates.get(RateHandler::INFECTION, 0), 0.0);
        assert!(rates.get(RateHandler::INFECTION, 1) > 0.0);
        assert_eq!(rates.get(RateHandler::ADVANCE, 0), 0.5);
    }

    #[test]
    fn cull_clears_rates_and_removes_pressure() {
        let kernel = Kernel::exponential(1.0);
        let mut handler = EventHandler::individual(model_sir(), kernel, adv_rates(), None);
        let mut hosts = vec![
            Host::new(HostId(0), Position::new(0.0, 0.0), RegionId(0), None),
            Host::new(HostId(1), Position::new(0.5, 0.0), RegionId(0), None),
        ];
        hosts[0].initialize(Compartment::I);
        hosts[1].initialize(Compartment::S);
        let mut world = World {
            hosts: HostStore::new(hosts),
            cells: None,
        };
        let mut rates = RateHandler::new(RateKind::Sum, RateKind::Sum, 2, 1.0);
        let pressure = Kernel::exponential(1.0).individual(Position::new(0.5, 0.0), Position::new(0.0, 0.0));
        rates.insert(RateHandler::INFECTION, 1, pressure).unwrap();
        rates.insert(RateHandler::ADVANCE, 0, 0.5).unwrap();

        handler.do_event(EventKind::Cull, 0, &mut world, &mut rates, 1.0, &mut SmallRng::seed_from_u64(2)).unwrap();

        assert_eq!(world.hosts.get(HostId(0)).state(), Compartment::Culled);
        assert_eq!(rates.get(RateHandler::ADVANCE, 0), 0.0);
        assert!((rates.get(RateHandler::INFECTION, 1)).abs() < 1e-12);
    }

    #[test]
    fn raster_infection_requires_susceptible_host_in_cell() {
        let raster = RasterKernel::new(vec![vec![1.0, 0.5, 1.0], vec![0.5, 1.0, 0.5], vec![1.0, 0.5, 1.0]]).unwrap();
        let kernel = Kernel::Raster(raster.clone());
        let coupling = crate::kernel::coupling_window(&raster, None);
        let mut handler = EventHandler::raster(model_sir(), kernel, adv_rates(), coupling, 10.0, None, None);

        let mut cell = Cell::new(CellId(0), 0, 0);
        let mut hosts = vec![Host::new(HostId(0), Position::new(0.0, 0.0), RegionId(0), Some(CellId(0)))];
        hosts[0].initialize(Compartment::I); // no susceptibles
        cell.seed_host(HostId(0), Compartment::I);

        let mut world = World {
            hosts: HostStore::new(hosts),
            cells: Some(CellStore::new(vec![cell])),
        };
        let mut rates = RateHandler::new(RateKind::Sum, RateKind::Sum, 1, 1.0);

        let err = handler.do_event(EventKind::Infection, 0, &mut world, &mut rates, 0.1, &mut SmallRng::seed_from_u64(1));
        assert!(err.is_err());
    }
}
