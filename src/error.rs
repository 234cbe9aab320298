//! Error categories for the simulation core (design §7).
//!
//! Four of the five categories from the spec are represented directly as
//! variants callers can match on; numeric drift is not one of them, since
//! §7 classifies it as recoverable — rate structures resync lazily and log
//! a warning rather than surfacing an `Err`.

use thiserror::Error;

/// Fatal error raised during setup, configuration validation, or the run
/// loop. There is no partial recovery within a run (§7): any `SimError`
/// aborts the iteration that produced it.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("input data error: {0}")]
    InputData(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("intervention error in {intervention:?}: {reason}")]
    Intervention { intervention: String, reason: String },
}

impl SimError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn input_data(msg: impl Into<String>) -> Self {
        Self::InputData(msg.into())
    }
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }
    pub fn intervention(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Intervention {
            intervention: name.into(),
            reason: reason.into(),
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
