use spr_surrogate::SurrogateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FitError {
    #[error(transparent)]
    Surrogate(#[from] SurrogateError),
    #[error("invalid search bounds: {0}")]
    InvalidBounds(String),
    #[error("the objective is not finite at {0:?}")]
    NonFiniteObjective(Vec<f64>),
}
