//! Errors raised while configuring or running a simulation.
use derive_builder::UninitializedFieldError;
use thiserror::Error;

use crate::event::Handle;

/// Malformed configuration, detected before any run starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be positive and finite, found {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("reach must be non-negative and finite, found {0}")]
    InvalidReach(f64),
    #[error("diffusion coefficient must be non-negative and finite, found {0}")]
    InvalidDiffusion(f64),
    #[error("at least one observation time is required")]
    NoObservations,
    #[error("observation times must be strictly ascending, found {previous} before {next}")]
    NotAscending { previous: f64, next: f64 },
    #[error("observation time {time} lies outside [0, {stop_time}]")]
    ObservationOutOfRange { time: f64, stop_time: f64 },
    #[error("only 1, 2 or 3 spatial dimensions are supported, found {0}")]
    Dimension(usize),
    #[error("invalid initial positions: {0}")]
    InitialPositions(String),
    #[error("`{0}` must be initialized")]
    Uninitialized(&'static str),
}

impl From<UninitializedFieldError> for ConfigError {
    fn from(err: UninitializedFieldError) -> Self {
        ConfigError::Uninitialized(err.field_name())
    }
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A run produced a NaN or infinite quantity: the run, and the ensemble
    /// it belongs to, is invalid.
    #[error("found non-finite {quantity} for particle {particle} at time {time}")]
    NonFinite { particle: Handle, quantity: &'static str, time: f64 },
    #[error("simulation cancelled at time {0}")]
    Cancelled(f64),
}
