use std::path::PathBuf;

use spr_sim::SimulationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurrogateError {
    #[error("cannot find surrogate artifact {0:?}")]
    NotFound(PathBuf),
    /// A requested coordinate or range exceeds the stored grid.
    #[error("{coordinate} = {value} lies outside the grid range [{min}, {max}]")]
    RangeViolation {
        coordinate: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    /// The artifact cannot be decoded or its shape does not match its table.
    #[error("corrupt surrogate artifact: {0}")]
    CorruptArtifact(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid surrogate parameters: {0}")]
    Config(String),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}
