//! Host data model (spec §3).

use crate::state::Compartment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RegionId(pub usize);

/// Position in continuous space (individual mode) or grid coordinates
/// (raster mode, stored as `row`/`col` via [`crate::cell::Cell`] instead).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// One recorded state transition: `(time, old_state, new_state)`. `old`
/// is `None` for the transition that sets the initial state at `t=0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub time: f64,
    pub old: Option<Compartment>,
    pub new: Compartment,
}

/// An immutable position, identity, and region, plus mutable current
/// state and transition log (§3: Host).
#[derive(Debug, Clone)]
pub struct Host {
    id: HostId,
    position: Position,
    region: RegionId,
    cell: Option<CellId>,
    state: Compartment,
    history: Vec<Transition>,
}

impl Host {
    pub fn new(id: HostId, position: Position, region: RegionId, cell: Option<CellId>) -> Self {
        Self {
            id,
            position,
            region,
            cell,
            state: Compartment::S,
            history: Vec::new(),
        }
    }

    /// Seed the host's starting state at `t = 0`. Panics if called more
    /// than once; this is setup-time-only, not a run-time transition.
    pub fn initialize(&mut self, state: Compartment) {
        assert!(self.history.is_empty(), "initialize called twice on {:?}", self.id);
        self.state = state;
        self.history.push(Transition {
            time: 0.0,
            old: None,
            new: state,
        });
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn cell(&self) -> Option<CellId> {
        self.cell
    }

    pub fn state(&self) -> Compartment {
        self.state
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Apply a state transition at `time`, recording it in `history`.
    /// Mutated only by [`crate::event::EventHandler`] (§5).
    pub fn transition(&mut self, new_state: Compartment, time: f64) {
        self.history.push(Transition {
            time,
            old: Some(self.state),
            new: new_state,
        });
        self.state = new_state;
    }
}
