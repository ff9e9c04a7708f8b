//! Failures inside a remaining-time simulation
//!
//! None of these reach the dashboard: the estimator logs them and answers
//! "no value" for the tick.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    /// Integration stopped making forward progress
    #[error("simulation diverged at {position:.1}m")]
    Divergent { position: f64 },

    #[error("segment at {position:.1}m not finished after {steps} steps")]
    StepLimit { position: f64, steps: usize },

    #[error("route walk exceeded {segments} segments")]
    SegmentLimit { segments: usize },

    #[error("no usable power (got {power:?})")]
    NoPower { power: Option<f64> },

    #[error("position {position} is not on the route")]
    OffRoute { position: f64 },

    #[error("route has no length")]
    EmptyRoute,
}

impl SimulationError {
    /// Divergence-class failures are expected during normal riding
    pub fn is_divergence(&self) -> bool {
        matches!(
            self,
            SimulationError::Divergent { .. }
                | SimulationError::StepLimit { .. }
                | SimulationError::NoPower { .. }
        )
    }
}
