//! `epiforge`: the core of a continuous-time stochastic epidemic simulator.
//!
//! A Gillespie-style event engine advances a population of discrete hosts
//! (individual mode) or raster cells aggregating hosts (raster mode) through
//! compartmental epidemiological states under a spatial dispersal kernel,
//! with pluggable interventions feeding back into the same event queue.
//!
//! File I/O, the CLI, and output writers are boundary adapters and live
//! outside this crate (see [`config`] for the typed seam a parser hands
//! values through); this crate owns only the simulation core: rate
//! structures, the rate-propagation engine, the intervention framework, and
//! the top-level Gillespie loop.

pub mod cell;
pub mod config;
pub mod error;
pub mod event;
pub mod host;
pub mod intervention;
pub mod kernel;
pub mod rate_handler;
pub mod rates;
pub mod simulator;
pub mod state;
pub mod store;

pub use config::SimConfig;
pub use error::{SimError, SimResult};
pub use simulator::{RunOutcome, Simulator};
