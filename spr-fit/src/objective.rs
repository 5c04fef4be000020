//! Distance between the curves predicted by the surrogate and the
//! experimental ones.
use serde::{Deserialize, Serialize};
use spr_data::AlignedData;
use spr_surrogate::Surrogate;

use crate::FitError;

/// log10 kon, log10 koff, log10 konb, reach and log10 cp.
pub const NB_PARAMETERS: usize = 5;

/// The box explored by the optimizer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchBox {
    pub lower: [f64; NB_PARAMETERS],
    pub upper: [f64; NB_PARAMETERS],
}

impl SearchBox {
    pub fn new(
        lower: [f64; NB_PARAMETERS],
        upper: [f64; NB_PARAMETERS],
    ) -> Result<Self, FitError> {
        for (i, (lo, up)) in lower.iter().zip(upper.iter()).enumerate() {
            if !(lo.is_finite() && up.is_finite() && lo <= up) {
                return Err(FitError::InvalidBounds(format!(
                    "parameter {} has bounds [{}, {}]",
                    i, lo, up
                )));
            }
        }
        Ok(SearchBox { lower, upper })
    }

    pub fn fitting(
        surrogate: &Surrogate,
        data: &AlignedData,
        log_cp: (f64, f64),
    ) -> Result<Self, FitError> {
        //! The largest box such that every series, after the concentration
        //! shift of log10 kon, stays within the surrogate.
        let axes = &surrogate.params().axes;
        let shifts = concentration_shifts(data);
        let max_shift = shifts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min_shift = shifts.iter().copied().fold(f64::INFINITY, f64::min);
        SearchBox::new(
            [axes[0].min - min_shift, axes[1].min, axes[2].min, axes[3].min, log_cp.0],
            [axes[0].max - max_shift, axes[1].max, axes[2].max, axes[3].max, log_cp.1],
        )
    }

    pub fn width(&self, idx: usize) -> f64 {
        self.upper[idx] - self.lower[idx]
    }

    pub fn centre(&self) -> [f64; NB_PARAMETERS] {
        std::array::from_fn(|i| self.lower[i] + self.width(i) / 2.)
    }

    pub fn contains(&self, params: &[f64]) -> bool {
        params
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .all(|(p, (lo, up))| (lo..=up).contains(&p))
    }

    pub fn clamp(&self, params: &mut [f64]) {
        for (p, (lo, up)) in params.iter_mut().zip(self.lower.iter().zip(self.upper.iter())) {
            *p = p.clamp(*lo, *up);
        }
    }
}

/// log10(c / c_ref) for each series, the reference being the first one.
pub fn concentration_shifts(data: &AlignedData) -> Vec<f64> {
    let reference = data.reference_concentration();
    data.series()
        .iter()
        .map(|s| (s.concentration / reference).log10())
        .collect()
}

/// Read-only view over the surrogate and the data, shared by all the
/// optimizer workers.
#[derive(Clone, Debug)]
pub struct ObjectiveContext<'a> {
    surrogate: &'a Surrogate,
    data: &'a AlignedData,
    shifts: Vec<f64>,
}

impl<'a> ObjectiveContext<'a> {
    pub fn new(
        surrogate: &'a Surrogate,
        data: &'a AlignedData,
        bounds: &SearchBox,
    ) -> Result<Self, FitError> {
        //! Fails if a point of `bounds` would query the surrogate outside
        //! of its grid, for any series or observed time.
        let shifts = concentration_shifts(data);
        for shift in shifts.iter() {
            surrogate.check_range(0, bounds.lower[0] + shift, bounds.upper[0] + shift)?;
        }
        for axis in 1..4 {
            surrogate.check_range(axis, bounds.lower[axis], bounds.upper[axis])?;
        }
        for series in data.series() {
            for &time in series.times.iter() {
                surrogate.check_time(time)?;
            }
        }
        Ok(ObjectiveContext { surrogate, data, shifts })
    }

    pub fn predict(
        &self,
        params: &[f64; NB_PARAMETERS],
    ) -> Result<Vec<Vec<f64>>, FitError> {
        //! The response predicted at each observed time of each series.
        let [log_kon, log_koff, log_konb, reach, log_cp] = *params;
        let scale = 10f64.powf(log_cp);
        self.data
            .series()
            .iter()
            .zip(self.shifts.iter())
            .map(|(series, shift)| {
                let coords = [log_kon + shift, log_koff, log_konb, reach];
                series
                    .times
                    .iter()
                    .map(|&t| Ok(self.surrogate.evaluate(coords, t)? * scale))
                    .collect::<Result<Vec<f64>, FitError>>()
            })
            .collect()
    }

    pub fn evaluate(&self, params: &[f64; NB_PARAMETERS]) -> Result<f64, FitError> {
        //! Square root of the sum of the squared residuals over every point
        //! of every series.
        let predictions = self.predict(params)?;
        let squares: f64 = predictions
            .iter()
            .zip(self.data.series())
            .flat_map(|(predicted, series)| {
                predicted.iter().zip(series.responses.iter()).map(|(p, y)| (p - y) * (p - y))
            })
            .sum();
        let error = squares.sqrt();
        if !error.is_finite() {
            return Err(FitError::NonFiniteObjective(params.to_vec()));
        }
        Ok(error)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use spr_data::Series;
    use spr_sim::RunOptions;
    use spr_surrogate::{Axis, SurrogateParams};

    /// A baseline and four orthogonal time profiles, one per parameter
    /// coordinate.
    pub(crate) fn basis(t: f64) -> [f64; 5] {
        let x = std::f64::consts::PI * t / 600.;
        [5., x.cos(), (2. * x).cos(), (3. * x).cos(), (4. * x).cos()]
    }

    pub(crate) fn linear(coords: [f64; 4], t: f64) -> f64 {
        let b = basis(t);
        b[0] + coords[0] * b[1] + coords[1] * b[2] + coords[2] * b[3] + coords[3] / 50. * b[4]
    }

    pub(crate) fn linear_surrogate() -> Surrogate {
        //! The table is linear in each coordinate hence interpolated exactly.
        let params = SurrogateParams::new(
            [
                Axis::new(-3., 3., 3).unwrap(),
                Axis::new(-4., 0., 3).unwrap(),
                Axis::new(-3., 3., 3).unwrap(),
                Axis::new(0., 50., 3).unwrap(),
            ],
            Axis::new(0., 600., 13).unwrap(),
            125.236,
            RunOptions::default(),
            26,
        )
        .unwrap();
        let mut table = Vec::new();
        for node in 0..params.nb_nodes() {
            let coords = params.node_coordinates(node);
            for t in params.time.nodes() {
                table.push(linear(coords, t));
            }
        }
        Surrogate::from_table(params, table).unwrap()
    }

    pub(crate) fn synthetic(
        surrogate: &Surrogate,
        truth: [f64; NB_PARAMETERS],
        concentrations: &[f64],
        antigen: f64,
    ) -> AlignedData {
        let times = surrogate.params().time.nodes();
        let reference = concentrations[0];
        let series = concentrations
            .iter()
            .map(|&c| {
                let coords = [truth[0] + (c / reference).log10(), truth[1], truth[2], truth[3]];
                let responses = times
                    .iter()
                    .map(|&t| surrogate.evaluate(coords, t).unwrap() * 10f64.powf(truth[4]))
                    .collect();
                Series::new(c, times.clone(), responses).unwrap()
            })
            .collect();
        AlignedData::new(series, antigen).unwrap()
    }

    fn bounds() -> SearchBox {
        SearchBox::new([-2., -4., -3., 0., -1.], [2., 0., 3., 50., 1.]).unwrap()
    }

    #[test]
    fn zero_at_the_truth() {
        let surrogate = linear_surrogate();
        let truth = [0.5, -1.7, 1.2, 23., 0.3];
        let data = synthetic(&surrogate, truth, &[10.], 125.236);
        let ctx = ObjectiveContext::new(&surrogate, &data, &bounds()).unwrap();
        assert!(ctx.evaluate(&truth).unwrap() < 1e-9);
        assert!(ctx.evaluate(&[0.4, -1.7, 1.2, 23., 0.3]).unwrap() > 1e-3);
    }

    #[test]
    fn pooled_euclidean_error() {
        let surrogate = linear_surrogate();
        let truth = [0.5, -1.7, 1.2, 23., 0.];
        let mut data = synthetic(&surrogate, truth, &[10., 20.], 125.236);
        // shift every response by 1: the error is the root of the number of points
        let series: Vec<Series> = data
            .series()
            .iter()
            .map(|s| {
                let responses = s.responses.iter().map(|r| r + 1.).collect();
                Series::new(s.concentration, s.times.clone(), responses).unwrap()
            })
            .collect();
        data = AlignedData::new(series, 125.236).unwrap();
        let ctx = ObjectiveContext::new(&surrogate, &data, &bounds()).unwrap();
        let expected = (data.nb_points() as f64).sqrt();
        assert!((ctx.evaluate(&truth).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn reordering_series_keeps_the_error() {
        let surrogate = linear_surrogate();
        let truth = [0.1, -2., 0.5, 10., 0.2];
        let data = synthetic(&surrogate, truth, &[10., 5., 20., 2.5], 125.236);
        let mut series = data.series().to_vec();
        series[1..].reverse();
        let reordered = AlignedData::new(series, 125.236).unwrap();
        let probe = [0.3, -2.2, 0.1, 30., 0.25];
        let bounds = SearchBox::new([-1., -4., -3., 0., -1.], [1., 0., 3., 50., 1.]).unwrap();
        let a = ObjectiveContext::new(&surrogate, &data, &bounds)
            .unwrap()
            .evaluate(&probe)
            .unwrap();
        let b = ObjectiveContext::new(&surrogate, &reordered, &bounds)
            .unwrap()
            .evaluate(&probe)
            .unwrap();
        assert!((a - b).abs() < 1e-9 * a.max(1.));
    }

    #[test]
    fn bounds_outside_the_surrogate() {
        let surrogate = linear_surrogate();
        let data = synthetic(&surrogate, [0., -2., 0., 10., 0.], &[10., 100.], 125.236);
        // the 100 nM series shifts log10 kon by one
        let bounds = SearchBox::new([-2., -4., -3., 0., -1.], [2.5, 0., 3., 50., 1.]).unwrap();
        assert!(matches!(
            ObjectiveContext::new(&surrogate, &data, &bounds),
            Err(FitError::Surrogate(_))
        ));
        let fitting = SearchBox::fitting(&surrogate, &data, (-1., 1.)).unwrap();
        assert_eq!(fitting.upper[0], 2.);
        assert!(ObjectiveContext::new(&surrogate, &data, &fitting).is_ok());
    }

    #[test]
    fn times_outside_the_surrogate() {
        let surrogate = linear_surrogate();
        let data = AlignedData::new(
            vec![Series::new(10., vec![0., 700.], vec![0., 1.]).unwrap()],
            125.236,
        )
        .unwrap();
        assert!(ObjectiveContext::new(&surrogate, &data, &bounds()).is_err());
    }

    #[test]
    fn invalid_search_box() {
        assert!(SearchBox::new([0.; 5], [1., 1., -1., 1., 1.]).is_err());
        assert!(SearchBox::new([0.; 5], [1., 1., f64::NAN, 1., 1.]).is_err());
    }
}
