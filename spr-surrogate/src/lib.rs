//! Lookup table of simulated binding curves over a grid of log10 kon,
//! log10 koff, log10 konb and reach, interpolated multilinearly in the
//! parameters and in time.
//!
//! The table is expensive: each node runs an ensemble of simulations. It is
//! built once with [`builder::build`], saved with [`Surrogate::save`] and
//! loaded read-only with [`Surrogate::load`] by every fit.
pub mod artifact;
pub mod builder;
pub mod error;
pub mod grid;
pub mod interpolation;

#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

pub use error::SurrogateError;
pub use grid::{Axis, SurrogateParams};

use interpolation::{Multilinear, NB_AXES};

/// The table of mean numbers of bound antigens and its interpolant. The
/// table is indexed by the four parameter axes then time, time fastest.
#[derive(Clone, Debug, PartialEq)]
pub struct Surrogate {
    params: SurrogateParams,
    interpolant: Multilinear,
}

impl Surrogate {
    pub fn from_table(params: SurrogateParams, table: Vec<f64>) -> Result<Self, SurrogateError> {
        params.validate()?;
        let interpolant = Multilinear::new(params.shape(), table)?;
        Ok(Surrogate { params, interpolant })
    }

    pub fn params(&self) -> &SurrogateParams {
        &self.params
    }

    pub fn shape(&self) -> [usize; NB_AXES] {
        self.interpolant.shape()
    }

    pub fn table(&self) -> &[f64] {
        self.interpolant.table()
    }

    /// Antigen concentration (µM) at which the grid was simulated.
    pub fn reference_antigen_concentration(&self) -> f64 {
        self.params.antigen_concentration
    }

    pub fn evaluate(&self, coords: [f64; 4], time: f64) -> Result<f64, SurrogateError> {
        //! Predicted number of bound antigens at `time` for the physical
        //! coordinates `coords`, failing outside of the grid.
        let index = self.params.to_index(coords, time)?;
        Ok(self.interpolant.evaluate(index))
    }

    pub fn check_range(&self, axis: usize, min: f64, max: f64) -> Result<(), SurrogateError> {
        //! Whether `[min, max]` is a subset of the `axis`-th parameter axis.
        let grid = &self.params.axes[axis];
        let name = grid::PARAMETER_AXES[axis];
        grid.check(name, min)?;
        grid.check(name, max)
    }

    pub fn check_time(&self, time: f64) -> Result<(), SurrogateError> {
        self.params.time.check(grid::TIME_AXIS, time)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use spr_sim::RunOptions;

    pub(crate) fn affine_surrogate() -> Surrogate {
        //! Table whose value is affine in every coordinate, so the
        //! interpolant is exact everywhere.
        let params = SurrogateParams::new(
            [
                Axis::new(-3., 3., 3).unwrap(),
                Axis::new(-4., 0., 3).unwrap(),
                Axis::new(-3., 3., 2).unwrap(),
                Axis::new(0., 50., 2).unwrap(),
            ],
            Axis::new(0., 600., 4).unwrap(),
            125.236,
            RunOptions::default(),
            26,
        )
        .unwrap();
        let mut table = Vec::new();
        for node in 0..params.nb_nodes() {
            let [a, b, c, d] = params.node_coordinates(node);
            for t in params.time.nodes() {
                table.push(affine([a, b, c, d], t));
            }
        }
        Surrogate::from_table(params, table).unwrap()
    }

    pub(crate) fn affine(coords: [f64; 4], time: f64) -> f64 {
        10. + coords[0] - 2. * coords[1] + 0.5 * coords[2] + 0.1 * coords[3] + time / 60.
    }

    #[test]
    fn evaluate_inside_the_grid() {
        let surrogate = affine_surrogate();
        let coords = [0.7, -1.3, 2.2, 33.];
        let value = surrogate.evaluate(coords, 250.).unwrap();
        assert!((value - affine(coords, 250.)).abs() < 1e-9);
    }

    #[test]
    fn evaluate_outside_the_grid() {
        let surrogate = affine_surrogate();
        assert!(matches!(
            surrogate.evaluate([3.5, -1., 0., 10.], 10.),
            Err(SurrogateError::RangeViolation { .. })
        ));
    }

    #[test]
    fn check_ranges() {
        let surrogate = affine_surrogate();
        assert!(surrogate.check_range(3, 0., 50.).is_ok());
        assert!(surrogate.check_range(1, -5., 0.).is_err());
        assert!(surrogate.check_time(600.).is_ok());
        assert!(surrogate.check_time(600.5).is_err());
    }

    #[test]
    fn table_with_wrong_shape() {
        let surrogate = affine_surrogate();
        let mut table = surrogate.table().to_vec();
        table.pop();
        assert!(matches!(
            Surrogate::from_table(surrogate.params().clone(), table),
            Err(SurrogateError::CorruptArtifact(_))
        ));
    }
}
