//! Conversion between the optimizer's coordinates and physical units.
use serde::{Deserialize, Serialize};
use spr_sim::{ConfigError, ReactionRates, ReactionRatesBuilder};

use crate::NB_PARAMETERS;

/// Factor converting a reach fitted at the surrogate density into the
/// reach at the experimental density: distances scale as density^(-1/3).
pub fn reach_scale(reference_antigen: f64, experimental_antigen: f64) -> f64 {
    (reference_antigen / experimental_antigen).cbrt()
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicalParameters {
    /// Bimolecular association rate (1/(nM s))
    pub kon: f64,
    /// Dissociation rate (1/s)
    pub koff: f64,
    /// Crosslinking rate (1/s)
    pub konb: f64,
    /// Arm span at the experimental antigen density (nm)
    pub reach: f64,
    /// Response units per bound antigen
    pub cp: f64,
}

impl PhysicalParameters {
    pub fn from_fit(
        params: &[f64; NB_PARAMETERS],
        antibody_concentration: f64,
        reference_antigen: f64,
        experimental_antigen: f64,
    ) -> Self {
        let [log_kon, log_koff, log_konb, reach, log_cp] = *params;
        PhysicalParameters {
            kon: 10f64.powf(log_kon) / antibody_concentration,
            koff: 10f64.powf(log_koff),
            konb: 10f64.powf(log_konb),
            reach: reach * reach_scale(reference_antigen, experimental_antigen),
            cp: 10f64.powf(log_cp),
        }
    }

    pub fn to_fit(
        &self,
        antibody_concentration: f64,
        reference_antigen: f64,
        experimental_antigen: f64,
    ) -> [f64; NB_PARAMETERS] {
        [
            (self.kon * antibody_concentration).log10(),
            self.koff.log10(),
            self.konb.log10(),
            self.reach / reach_scale(reference_antigen, experimental_antigen),
            self.cp.log10(),
        ]
    }

    pub fn rates_at(
        &self,
        antibody_concentration: f64,
        antigen_concentration: f64,
    ) -> Result<ReactionRates, ConfigError> {
        //! The simulator's rates for a given antibody concentration, to
        //! re-run the forward model at the fitted parameters.
        ReactionRatesBuilder::default()
            .kon(self.kon * antibody_concentration)
            .koff(self.koff)
            .konb(self.konb)
            .reach(self.reach)
            .cp(self.cp)
            .antigen_concentration(antigen_concentration)
            .antibody_concentration(antibody_concentration)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::TestResult;

    #[test]
    fn reach_scales_with_the_density() {
        assert!((reach_scale(125.236, 62.618) - 1.2599210498948732).abs() < 1e-12);
        let physical = PhysicalParameters::from_fit(&[0., 0., 0., 10., 0.], 10., 125.236, 62.618);
        assert!((physical.reach - 10. * 2f64.cbrt()).abs() < 1e-12);
    }

    #[test]
    fn same_density_keeps_the_reach() {
        let physical = PhysicalParameters::from_fit(&[1., -2., 0.5, 17.5, 0.1], 10., 50., 50.);
        assert_eq!(physical.reach, 17.5);
        assert!((physical.kon - 1.).abs() < 1e-12);
        assert!((physical.koff - 0.01).abs() < 1e-14);
    }

    #[quickcheck]
    fn physical_round_trip(kon: u8, koff: u8, konb: u8, cp: u8, conc: u8) -> TestResult {
        if conc == 0 {
            return TestResult::discard();
        }
        let to_rate = |x: u8| 10f64.powf(x as f64 / 40. - 3.);
        let physical = PhysicalParameters {
            kon: to_rate(kon),
            koff: to_rate(koff),
            konb: to_rate(konb),
            reach: 12.,
            cp: to_rate(cp),
        };
        let antibody = conc as f64;
        let back = PhysicalParameters::from_fit(
            &physical.to_fit(antibody, 125.236, 62.618),
            antibody,
            125.236,
            62.618,
        );
        let close = |a: f64, b: f64| ((a - b) / b).abs() < 1e-12;
        TestResult::from_bool(
            close(back.kon, physical.kon)
                && close(back.koff, physical.koff)
                && close(back.konb, physical.konb)
                && close(back.cp, physical.cp)
                && close(back.reach, physical.reach),
        )
    }

    #[test]
    fn rates_for_the_simulator() {
        let physical = PhysicalParameters { kon: 0.01, koff: 0.1, konb: 1., reach: 5., cp: 2. };
        let rates = physical.rates_at(20., 62.618).unwrap();
        assert!((rates.kon - 0.2).abs() < 1e-15);
        assert_eq!(rates.cp, 2.);
        assert_eq!(rates.antibody_concentration, 20.);
    }
}
