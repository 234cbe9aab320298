//! Simulator (spec §4.6): the main-loop driver that owns setup and runs
//! iterations. Grounded on `original_source/simulator.py`'s `Simulator`
//! class (`setup`/`initialise_run`/`run_epidemic`) and `run_epidemics`
//! driver loop; the boundary-adapter seam (`InitialHosts`/`InitialCells`,
//! `RasterDumpSink`) is supplemented per SPEC_FULL.md §E3, since file I/O
//! itself stays a non-goal (§1).

use crate::cell::Cell;
use crate::config::{KernelType, SimConfig, SimulationType};
use crate::error::SimError;
use crate::event::{Applied, EventHandler, EventKind};
use crate::host::{CellId, Host, HostId};
use crate::intervention::InterventionHandler;
use crate::kernel::{CacheKernel, Kernel, RasterKernel, VsKernel};
use crate::rate_handler::{ChannelKind, RateHandler};
use crate::state::{Compartment, Model};
use crate::store::{CellStore, HostStore, World};
use log::{info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::Exp1;
use std::collections::HashMap;

/// A fully-applied event plus the simulation time it occurred at, the unit
/// a transition-log/event-CSV boundary adapter consumes (§6 "per-iteration
/// event CSV: time, hostID, oldState, newState").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoggedEvent {
    pub time: f64,
    pub applied: Applied,
}

/// What one call to [`Simulator::run`] produced: the full transition log in
/// time order, plus the time the loop actually stopped at (either
/// `FinalTime` or the time the rate collapsed to zero).
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub events: Vec<LoggedEvent>,
    pub stopped_at: f64,
}

/// Receives periodic raster snapshots during a run (§6 "periodic raster
/// snapshots: one ASCII raster per state per timestamp"). Writing the
/// snapshot to disk is a boundary-adapter concern; the core only decides
/// *when* a dump is due and hands over the per-state counts.
pub trait RasterDumpSink {
    fn dump(&mut self, time: f64, cells: &CellStore);
}

/// A sink that discards every snapshot, used when `RasterOutputFreq == 0`
/// (§6: "0 suppresses") or by callers that don't care about raster output.
pub struct NullRasterSink;

impl RasterDumpSink for NullRasterSink {
    fn dump(&mut self, _time: f64, _cells: &CellStore) {}
}

fn build_kernel(config: &SimConfig, raster: Option<RasterKernel>) -> Result<Kernel, SimError> {
    match config.epidemiology.kernel_type {
        KernelType::Exponential => {
            let scale = config
                .epidemiology
                .kernel_scale
                .ok_or_else(|| SimError::configuration("KernelScale is required when KernelType is EXPONENTIAL"))?;
            Ok(Kernel::exponential(scale))
        }
        KernelType::Nonspatial => Ok(Kernel::Nonspatial),
        KernelType::Raster => {
            let raster = raster.ok_or_else(|| SimError::input_data("RASTER kernel type requires a kernel raster"))?;
            Ok(Kernel::Raster(raster))
        }
    }
}

fn build_adv_rate(config: &SimConfig) -> HashMap<Compartment, f64> {
    config
        .epidemiology
        .adv_rates
        .iter()
        .filter_map(|(&letter, &rate)| Compartment::from_letter(letter).map(|c| (c, rate)))
        .collect()
}

/// The setup-time-fixed shape that distinguishes individual from raster mode
/// (§4.6 step 2). The coupling window and `MaxHosts` are baked directly into
/// `EventHandler` at construction and never read back from here; raster
/// mode's only further need is the raster kernel and VS start parameter
/// (when virtual sporulation is configured), to rebuild the Sporulation
/// channel's rate tree fresh at the start of every iteration
/// (`fresh_rate_handler`).
enum Topology {
    Individual,
    Raster { vs_seed: Option<(RasterKernel, i64)> },
}

/// Owns the setup-fixed pieces of a configuration and drives the Gillespie
/// loop once per [`Simulator::run`] call (§4.6). Setup runs once, in
/// [`Simulator::new`]; everything reused across iterations that is mutable
/// (host/cell state, rate structures, intervention schedules) is rebuilt
/// fresh at the start of every `run` call from the immutable initial
/// snapshot, which is the deep-restore semantics `SaveSetup` asks for (§5:
/// "Initial-state snapshots: immutable after setup... requires a deep
/// restore at the start of each iteration").
pub struct Simulator {
    config: SimConfig,
    event_handler: EventHandler,
    topology: Topology,
    initial_hosts: Vec<Host>,
    initial_cells: Option<Vec<Cell>>,
    intervention_factories: Vec<Box<dyn Fn() -> Box<dyn crate::intervention::Intervention>>>,
    rate_size: usize,
}

impl Simulator {
    /// Setup (§4.6 step 1-2): materialise the kernel/coupling window/VS
    /// split, build the `EventHandler`, and record the immutable initial
    /// snapshot. `raster` is `Some` only when `KernelType == RASTER`;
    /// `cells` is `Some` only in raster simulation mode. Both are produced
    /// by a file-parsing boundary adapter upstream of this call (§E3).
    pub fn new(
        config: SimConfig,
        hosts: Vec<Host>,
        cells: Option<Vec<Cell>>,
        raster: Option<RasterKernel>,
        intervention_factories: Vec<Box<dyn Fn() -> Box<dyn crate::intervention::Intervention>>>,
    ) -> Result<Self, SimError> {
        config.validate()?;
        let model = Model::parse(&config.epidemiology.model)?;
        let adv_rate = build_adv_rate(&config);
        let kernel = build_kernel(&config, raster)?;

        let raster_mode = config.simulation.simulation_type == SimulationType::Raster;
        if raster_mode && cells.is_none() {
            return Err(SimError::configuration("SimulationType RASTER requires cell data"));
        }

        let (event_handler, topology, rate_size) = if raster_mode {
            let cell_count = cells.as_ref().unwrap().len();
            let vs_start = config.simulation.virtual_sporulation_start;
            match &kernel {
                Kernel::Raster(raster_kernel) => {
                    let coupling = crate::kernel::coupling_window(raster_kernel, vs_start);
                    let (vs, sporulation_channel_placeholder) = match vs_start {
                        Some(start) => {
                            let (vs, spore_prob) = VsKernel::build(raster_kernel, start)?;
                            (Some(vs), Some(spore_prob))
                        }
                        None => (None, None),
                    };
                    let max_hosts = config.simulation.max_hosts;
                    // Channel 2 is the deterministic index the Sporulation
                    // channel is assigned every iteration, since `run`
                    // always adds exactly Infection, Advance, then (if VS
                    // is configured) Sporulation, then interventions, in
                    // that fixed order.
                    let sporulation_channel = sporulation_channel_placeholder.map(|_| 2);
                    let event_handler = EventHandler::raster(model.clone(), kernel, adv_rate, coupling, max_hosts, vs, sporulation_channel);
                    (
                        event_handler,
                        Topology::Raster {
                            vs_seed: vs_start.map(|start| (raster_kernel.clone(), start)),
                        },
                        cell_count,
                    )
                }
                _ => {
                    return Err(SimError::configuration(
                        "raster simulation mode without virtual sporulation requires KernelType RASTER",
                    ))
                }
            }
        } else {
            let cache = if config.optimisation.cache_kernel {
                let positions: Vec<_> = hosts.iter().map(Host::position).collect();
                Some(CacheKernel::build(&kernel, &positions))
            } else {
                None
            };
            let nhosts = hosts.len();
            let event_handler = EventHandler::individual(model.clone(), kernel, adv_rate, cache);
            (event_handler, Topology::Individual, nhosts)
        };

        Ok(Self {
            config,
            event_handler,
            topology,
            initial_hosts: hosts,
            initial_cells: cells,
            intervention_factories,
            rate_size,
        })
    }

    /// Rebuild the per-channel rate structures and the `Sporulation`
    /// channel (if configured) from scratch, in the fixed registration
    /// order `Infection, Advance, [Sporulation]` (§4.6 step 4).
    fn fresh_rate_handler(&self) -> RateHandler {
        let mut rates = RateHandler::new(
            self.config.optimisation.rate_structure_infection,
            self.config.optimisation.rate_structure_advance,
            self.rate_size,
            self.config.epidemiology.inf_rate,
        );
        if let Topology::Raster { vs_seed: Some((raster, start)), .. } = &self.topology {
            let (_, spore_prob) = VsKernel::build(raster, *start).expect("VS kernel rebuilt identically to setup");
            let spore_factor = self.config.epidemiology.inf_rate * spore_prob;
            rates.add_channel(ChannelKind::Sporulation, self.rate_size, spore_factor);
        }
        rates
    }

    /// Compute initial advance and infection rates by an explicit sum over
    /// currently-infectious sources (§4.6 step 3), and register+seed each
    /// intervention.
    fn seed_initial_state(
        &mut self,
        world: &World,
        rates: &mut RateHandler,
        interventions: &mut InterventionHandler,
    ) -> Result<(), SimError> {
        let advance_values: Vec<f64> = world.hosts.iter().map(|h| self.event_handler.advance_rate_for(h.state())).collect();
        rates.bulk_insert(RateHandler::ADVANCE, &advance_values)?;

        for host in world.hosts.iter() {
            if host.state().is_infectious() {
                self.event_handler.seed_infection_pressure(host.id(), world, rates)?;
            }
        }

        interventions.initialise_rates(world, rates)?;
        Ok(())
    }

    fn build_world(&self) -> World {
        World {
            hosts: HostStore::new(self.initial_hosts.clone()),
            cells: self.initial_cells.clone().map(CellStore::new),
        }
    }

    /// Run (§4.6): deep-restore the initial snapshot, then loop drawing
    /// events until `FinalTime` is exceeded or the total rate collapses.
    /// `raster_sink` receives a dump whenever the clock crosses a
    /// `RasterOutputFreq` boundary (0 suppresses dumps entirely, §6).
    pub fn run(&mut self, seed: u64, raster_sink: &mut dyn RasterDumpSink) -> Result<RunOutcome, SimError> {
        let mut world = self.build_world();
        let mut rates = self.fresh_rate_handler();
        let mut interventions = InterventionHandler::new(self.config.interventions.update_on_all_events);
        for (index, factory) in self.intervention_factories.iter().enumerate() {
            interventions.register(factory(), &mut rates, index);
        }

        self.seed_initial_state(&world, &mut rates, &mut interventions)?;

        let mut rng = SmallRng::seed_from_u64(seed);
        let final_time = self.config.simulation.final_time;
        let raster_freq = self.config.output.raster_output_freq;

        let mut t = 0.0;
        let mut next_raster = if raster_freq > 0.0 { raster_freq } else { f64::INFINITY };
        let mut events = Vec::new();

        loop {
            let (total, channel, id) = rates.get_next_event(&mut rng);
            let dt = if total < crate::rate_handler::MIN_TOTAL_RATE {
                f64::INFINITY
            } else {
                rng.sample::<f64, _>(Exp1) / total
            };
            let t_event = t + dt;
            let t_int = interventions.next_intervention_time();
            let t_candidates = [t_event, t_int, next_raster];
            let t_next = t_candidates.iter().copied().fold(f64::INFINITY, f64::min);

            if t_next > final_time {
                break;
            }
            t = t_next;

            // Tie-break (§5): intervention ticks and raster dumps are
            // processed before the drawn stochastic event without
            // consuming it, since under constant rates the exponential
            // clock is memoryless and only a state-changing update
            // invalidates the draw.
            if t_next == next_raster && next_raster <= t_int.min(t_event) {
                if let Some(cells) = &world.cells {
                    raster_sink.dump(t, cells);
                }
                next_raster += raster_freq;
                continue;
            }
            if t_next == t_int && t_int <= t_event {
                let discrete = interventions.tick(&world, &mut rates, t)?;
                for (host_id, kind) in discrete {
                    let applied = self.event_handler.do_event(kind, host_id.0, &mut world, &mut rates, t, &mut rng)?;
                    for a in applied {
                        events.push(LoggedEvent { time: t, applied: a });
                    }
                    interventions.update_on_event(&world, &mut rates, t)?;
                }
                continue;
            }

            let channel = channel.expect("t_next selected the stochastic branch, so an event was drawn");
            let id = id.expect("channel index implies a selected slot");
            let kind = match rates.kind_of(channel) {
                ChannelKind::Infection => EventKind::Infection,
                ChannelKind::Advance => EventKind::Advance,
                ChannelKind::Sporulation => EventKind::Sporulation,
                ChannelKind::Intervention(_) => {
                    let discrete = interventions.action(channel, id, &world, t)?;
                    for (host_id, kind) in discrete {
                        let applied = self.event_handler.do_event(kind, host_id.0, &mut world, &mut rates, t, &mut rng)?;
                        // A continuous intervention's rate slot is keyed by
                        // the same index it just fired an action for (e.g.
                        // `ContinuousCull`'s per-host cull rate); once that
                        // host is culled its slot must go to zero immediately,
                        // not only when `UpdateOnAllEvents` happens to be set,
                        // or the now-culled host can be re-selected and
                        // `cull_host` raises "culled twice" (§4.4).
                        if host_id.0 == id && applied.iter().any(|a| a.new == Compartment::Culled) {
                            rates.insert(channel, id, 0.0)?;
                        }
                        for a in applied {
                            events.push(LoggedEvent { time: t, applied: a });
                        }
                    }
                    interventions.update_on_event(&world, &mut rates, t)?;
                    continue;
                }
            };
            let applied = self.event_handler.do_event(kind, id, &mut world, &mut rates, t, &mut rng)?;
            for a in applied {
                info!("t={t:.6} host={} {:?} -> {:?}", a.host.0, a.old, a.new);
                events.push(LoggedEvent { time: t, applied: a });
            }
            interventions.update_on_event(&world, &mut rates, t)?;
        }

        if rates.total_rate() >= crate::rate_handler::MIN_TOTAL_RATE {
            warn!("run stopped at t={t:.6} with FinalTime={final_time:.6} reached but nonzero rate remaining");
        }

        Ok(RunOutcome { events, stopped_at: t })
    }
}
