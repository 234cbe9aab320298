//! HostStore / CellStore (spec §2): holds current host/cell states, the
//! region map, and (raster mode) the cell lookup by grid position. Mutated
//! only by [`crate::event::EventHandler`] (§5: "Host/Cell state: mutated
//! only by the EventHandler").

use crate::cell::Cell;
use crate::host::{CellId, Host, HostId, RegionId};
use crate::state::Compartment;
use std::collections::HashMap;

/// All hosts, plus the region -> host-ids index built at setup
/// (`original_source/simulator.py`'s `params['region_map']`, §E2).
#[derive(Debug, Clone)]
pub struct HostStore {
    hosts: Vec<Host>,
    region_map: HashMap<RegionId, Vec<HostId>>,
}

impl HostStore {
    pub fn new(hosts: Vec<Host>) -> Self {
        let mut region_map: HashMap<RegionId, Vec<HostId>> = HashMap::new();
        for host in &hosts {
            region_map.entry(host.region()).or_default().push(host.id());
        }
        Self { hosts, region_map }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn get(&self, id: HostId) -> &Host {
        &self.hosts[id.0]
    }

    pub fn get_mut(&mut self, id: HostId) -> &mut Host {
        &mut self.hosts[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Host> {
        self.hosts.iter()
    }

    pub fn in_region(&self, region: RegionId) -> &[HostId] {
        self.region_map.get(&region).map_or(&[], Vec::as_slice)
    }

    /// Hosts whose current state is susceptible, in ascending `HostId`
    /// order (used by raster infection's "lexicographic first" tie-break,
    /// §4.4/§E2).
    pub fn susceptible_in(&self, ids: &[HostId]) -> Vec<HostId> {
        let mut out: Vec<HostId> = ids
            .iter()
            .copied()
            .filter(|&id| self.get(id).state().is_susceptible())
            .collect();
        out.sort_by_key(|id| id.0);
        out
    }
}

/// All raster cells, plus a grid-position -> cell-id index
/// (`original_source/simulator.py`'s `params['cell_map']`).
#[derive(Debug, Clone)]
pub struct CellStore {
    cells: Vec<Cell>,
    position_map: HashMap<(i64, i64), CellId>,
}

impl CellStore {
    pub fn new(cells: Vec<Cell>) -> Self {
        let position_map = cells.iter().map(|c| (c.position(), c.id())).collect();
        Self { cells, position_map }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, id: CellId) -> &Cell {
        &self.cells[id.0]
    }

    pub fn get_mut(&mut self, id: CellId) -> &mut Cell {
        &mut self.cells[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    pub fn at_position(&self, row: i64, col: i64) -> Option<CellId> {
        self.position_map.get(&(row, col)).copied()
    }

    /// First susceptible host owned by `cell`, in ascending `HostId` order
    /// (§4.4: "pick any host in that cell whose state is S (lexicographic
    /// first, to make runs reproducible)").
    pub fn first_susceptible(&self, cell: CellId, hosts: &HostStore) -> Option<HostId> {
        self.get(cell)
            .hosts()
            .iter()
            .copied()
            .filter(|&id| hosts.get(id).state().is_susceptible())
            .min_by_key(|id| id.0)
    }

    /// Apply a transition's effect on the owning cell's tally; `old` is
    /// `None` for the transitions are never raised through this path
    /// (seeding uses [`Cell::seed_host`] directly).
    pub fn record_transition(&mut self, cell: CellId, old: Compartment, new: Compartment) {
        self.get_mut(cell).record_transition(old, new);
    }
}

/// The simulator's full mutable working state: hosts, plus cells in raster
/// mode (§3 Ownership: "the simulator exclusively owns them"). Bundled so
/// [`crate::event::EventHandler`] and [`crate::intervention::InterventionHandler`]
/// can borrow distinct fields independently without the simulator handing
/// out long-lived references to either store.
pub struct World {
    pub hosts: HostStore,
    pub cells: Option<CellStore>,
}
