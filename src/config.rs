//! Configuration shape (spec §6, E3): a boundary adapter parses a config
//! file and hands the core an already-validated `SimConfig` value. File
//! I/O itself stays a non-goal (§1); only the *shape* of the recognised
//! keys lives here, as a first-class type rather than a stringly-typed
//! map, matching `original_source/code/config.py`'s `default_config`
//! table section-for-section.

use crate::error::SimError;
use crate::rates::RateKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelType {
    Exponential,
    Nonspatial,
    Raster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationType {
    Individual,
    Raster,
}

/// `Epidemiology` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpidemiologyConfig {
    pub model: String,
    pub inf_rate: f64,
    /// `{E,C,D,I,R}AdvRate`, keyed by compartment letter.
    pub adv_rates: HashMap<char, f64>,
    pub kernel_type: KernelType,
    pub kernel_scale: Option<f64>,
}

/// `Simulation` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub simulation_type: SimulationType,
    pub virtual_sporulation_start: Option<i64>,
    pub final_time: f64,
    pub host_pos_file: Option<String>,
    pub init_cond_file: Option<String>,
    pub region_file: Option<String>,
    pub kernel_file: Option<String>,
    pub n_iterations: usize,
    pub max_hosts: f64,
}

/// `Output` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub output_host_data: bool,
    pub output_event_data: bool,
    pub raster_output_freq: f64,
    pub output_file_stub: String,
    pub raster_file_stub: String,
}

/// `Optimisation` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimisationConfig {
    pub save_setup: bool,
    pub cache_kernel: bool,
    pub rate_structure_infection: RateKind,
    pub rate_structure_advance: RateKind,
}

/// `Interventions` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterventionsConfig {
    pub scripts: Vec<String>,
    pub update_frequencies: Vec<f64>,
    pub update_on_all_events: bool,
}

/// The full recognised-keys configuration (§6), the value a config-file
/// boundary adapter produces and hands to [`crate::simulator::Simulator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub epidemiology: EpidemiologyConfig,
    pub simulation: SimulationConfig,
    pub output: OutputConfig,
    pub optimisation: OptimisationConfig,
    pub interventions: InterventionsConfig,
}

impl SimConfig {
    /// Configuration-error checks that don't require the materialised
    /// host/cell state (§7 category 1: "fatal at setup; report the
    /// offending key").
    pub fn validate(&self) -> Result<(), SimError> {
        if self.epidemiology.kernel_type == KernelType::Exponential && self.epidemiology.kernel_scale.is_none() {
            return Err(SimError::configuration("KernelScale is required when KernelType is EXPONENTIAL"));
        }
        if self.epidemiology.kernel_type == KernelType::Raster && self.simulation.kernel_file.is_none() {
            return Err(SimError::configuration("KernelFile is required when KernelType is RASTER"));
        }
        if self.simulation.simulation_type == SimulationType::Raster && self.epidemiology.kernel_type != KernelType::Raster {
            if let Some(start) = self.simulation.virtual_sporulation_start {
                if start < 1 {
                    return Err(SimError::configuration("VirtualSporulationStart must be >= 1"));
                }
            }
        }
        if self.interventions.scripts.len() != self.interventions.update_frequencies.len() {
            return Err(SimError::configuration(
                "InterventionScripts and InterventionUpdateFrequencies must have matching lengths",
            ));
        }
        if self.simulation.final_time <= 0.0 {
            return Err(SimError::configuration("FinalTime must be positive"));
        }
        if self.simulation.n_iterations == 0 {
            return Err(SimError::configuration("NIterations must be at least 1"));
        }
        Ok(())
    }
}
