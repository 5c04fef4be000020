//! The axes of the lookup table and the mapping from physical coordinates to
//! grid indices.
use serde::{Deserialize, Serialize};
use spr_sim::RunOptions;

use crate::SurrogateError;

/// Names of the four parameter axes, in table order.
pub const PARAMETER_AXES: [&str; 4] = ["log10(kon)", "log10(koff)", "log10(konb)", "reach"];
pub const TIME_AXIS: &str = "time";

/// A uniformly sampled interval `[min, max]` with `size` nodes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub min: f64,
    pub max: f64,
    pub size: usize,
}

impl Axis {
    pub fn new(min: f64, max: f64, size: usize) -> Result<Self, SurrogateError> {
        let axis = Axis { min, max, size };
        axis.validate()?;
        Ok(axis)
    }

    pub fn validate(&self) -> Result<(), SurrogateError> {
        if !(self.min.is_finite() && self.max.is_finite() && self.min < self.max) {
            return Err(SurrogateError::Config(format!(
                "axis range must satisfy min < max, found [{}, {}]",
                self.min, self.max
            )));
        }
        if self.size < 2 {
            return Err(SurrogateError::Config(format!(
                "axis resolution must be at least 2, found {}",
                self.size
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn last_index(&self) -> f64 {
        (self.size - 1) as f64
    }

    /// Affine map from `[min, max]` to `[0, size - 1]`, exact at both ends.
    pub fn to_index(&self, value: f64) -> f64 {
        (value - self.min) / self.width() * self.last_index()
    }

    pub fn node(&self, idx: usize) -> f64 {
        if idx + 1 == self.size {
            self.max
        } else {
            self.min + self.width() * idx as f64 / self.last_index()
        }
    }

    pub fn nodes(&self) -> Vec<f64> {
        (0..self.size).map(|idx| self.node(idx)).collect()
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    pub fn check(&self, coordinate: &'static str, value: f64) -> Result<(), SurrogateError> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(SurrogateError::RangeViolation {
                coordinate,
                value,
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// Everything needed to regenerate a surrogate: the parameter box, the time
/// axis, the antigen density at which the particles are simulated and the
/// options of the runs of each node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurrogateParams {
    /// log10 kon, log10 koff, log10 konb and reach
    pub axes: [Axis; 4],
    pub time: Axis,
    /// Reference antigen concentration (µM)
    pub antigen_concentration: f64,
    /// The observation times are overwritten by the nodes of `time`
    pub run: RunOptions,
    pub seed: u64,
}

impl SurrogateParams {
    pub fn new(
        axes: [Axis; 4],
        time: Axis,
        antigen_concentration: f64,
        run: RunOptions,
        seed: u64,
    ) -> Result<Self, SurrogateError> {
        let params = SurrogateParams { axes, time, antigen_concentration, run, seed };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), SurrogateError> {
        for axis in self.axes.iter().chain(std::iter::once(&self.time)) {
            axis.validate()?;
        }
        if self.axes[3].min < 0. {
            return Err(SurrogateError::Config(format!(
                "reach cannot be negative, found {}",
                self.axes[3].min
            )));
        }
        if self.time.min < 0. {
            return Err(SurrogateError::Config(format!(
                "time cannot be negative, found {}",
                self.time.min
            )));
        }
        if !(self.antigen_concentration.is_finite() && self.antigen_concentration > 0.) {
            return Err(SurrogateError::Config(format!(
                "antigen concentration must be positive, found {}",
                self.antigen_concentration
            )));
        }
        Ok(())
    }

    /// Sizes of the four parameter axes followed by the time axis.
    pub fn shape(&self) -> [usize; 5] {
        [
            self.axes[0].size,
            self.axes[1].size,
            self.axes[2].size,
            self.axes[3].size,
            self.time.size,
        ]
    }

    pub fn nb_nodes(&self) -> usize {
        self.axes.iter().map(|a| a.size).product()
    }

    pub fn node_coordinates(&self, node: usize) -> [f64; 4] {
        //! Physical coordinates of the `node`-th parameter node, the last
        //! axis varying fastest.
        let mut rest = node;
        let mut coords = [0.; 4];
        for (coord, axis) in coords.iter_mut().zip(self.axes.iter()).rev() {
            *coord = axis.node(rest % axis.size);
            rest /= axis.size;
        }
        coords
    }

    pub fn to_index(&self, coords: [f64; 4], time: f64) -> Result<[f64; 5], SurrogateError> {
        //! Grid-index coordinates of a point, failing if it lies outside the
        //! grid.
        let mut index = [0.; 5];
        for (i, ((axis, name), value)) in
            self.axes.iter().zip(PARAMETER_AXES).zip(coords).enumerate()
        {
            axis.check(name, value)?;
            index[i] = axis.to_index(value);
        }
        self.time.check(TIME_AXIS, time)?;
        index[4] = self.time.to_index(time);
        Ok(index)
    }
}
