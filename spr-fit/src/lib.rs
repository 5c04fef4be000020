//! Fit of the binding kinetics to experimental SPR curves.
//!
//! The parameter vector explored by the optimizer is
//! `[log10 kon, log10 koff, log10 konb, reach, log10 cp]` where kon is the
//! pseudo-first-order association rate at the reference antibody
//! concentration (the first series of the data) and reach is expressed at
//! the antigen density of the surrogate. [`physical::PhysicalParameters`]
//! converts the best vector back to physical units.
pub mod driver;
pub mod error;
pub mod objective;
pub mod optimizer;
pub mod physical;

#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

pub use driver::{fit, FitReport};
pub use error::FitError;
pub use objective::{ObjectiveContext, SearchBox, NB_PARAMETERS};
pub use optimizer::{Budget, GlobalOptimizer, OptimumFound, Snes, SnesBuilder, StopReason};
pub use physical::PhysicalParameters;
