//! Rates of the reaction network.
use derive_builder::Builder;
use rand::Rng;
use rand_distr::Open01;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::particle::Species;

/// Rate of a stochastic transition (units [1/s]).
pub type KineticRate = f64;

/// Physical parameters of the binding model, shared read-only by all the
/// particles of a run.
#[derive(Builder, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate", error = "ConfigError"))]
pub struct ReactionRates {
    /// Pseudo-first-order association rate Free → Bound, the bulk antibody
    /// concentration is folded into it
    pub kon: KineticRate,
    /// Dissociation rate Bound → Free
    pub koff: KineticRate,
    /// Crosslinking rate per free antigen within `reach` of a bound one
    pub konb: KineticRate,
    /// Arm span of the antibody: max distance of the crosslinking partner
    pub reach: f64,
    /// Calibration factor between bound antigens and response units
    #[builder(default = "1.")]
    pub cp: f64,
    /// Antigen concentration (µM), sets the particle density
    pub antigen_concentration: f64,
    /// Antibody concentration in solution (nM)
    #[builder(default = "1.")]
    pub antibody_concentration: f64,
}

impl ReactionRatesBuilder {
    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("kon", self.kon),
            ("koff", self.koff),
            ("konb", self.konb),
            ("cp", self.cp),
            ("antigen_concentration", self.antigen_concentration),
            ("antibody_concentration", self.antibody_concentration),
        ];
        for (name, value) in positive {
            if let Some(value) = value {
                ensure_positive(name, value)?;
            }
        }
        if let Some(reach) = self.reach {
            if !(reach.is_finite() && reach >= 0.) {
                return Err(ConfigError::InvalidReach(reach));
            }
        }
        Ok(())
    }
}

impl ReactionRates {
    pub fn total_rate(
        &self,
        species: Species,
        free_neighbours: usize,
        association: bool,
    ) -> KineticRate {
        //! Sum of the rates of all the transitions leaving `species`.
        //!
        //! Only bound particles react with their neighbourhood: the
        //! crosslinking rate scales with the number of free particles within
        //! `reach`. Crosslinked particles are absorbing.
        match species {
            Species::Free if association => self.kon,
            Species::Free => 0.,
            Species::Bound => {
                self.koff + self.konb * free_neighbours as KineticRate
            }
            Species::Crosslinked => 0.,
        }
    }
}

pub(crate) fn ensure_positive(
    name: &'static str,
    value: f64,
) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0. {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

pub fn exprand(lambda: KineticRate, rng: &mut impl Rng) -> f64 {
    //! Generates a random waiting time using the exponential waiting time with
    //! parameter `lambda` of Poisson StochasticProcess. A zero rate never
    //! fires.
    if lambda <= 0. {
        f64::INFINITY
    } else {
        // random number between (0, 1)
        let val: f64 = rng.sample(Open01);
        -(1. - val).ln() / lambda
    }
}

#[cfg(test)]
extern crate quickcheck;

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;
    use test_case::test_case;

    fn builder() -> ReactionRatesBuilder {
        let mut builder = ReactionRatesBuilder::default();
        builder
            .kon(1.)
            .koff(0.1)
            .konb(0.5)
            .reach(10.)
            .antigen_concentration(125.236);
        builder
    }

    #[quickcheck]
    fn exprand_same_seed(lambda: f64, seed: u64) -> bool {
        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        if lambda <= 0f64 {
            exprand(lambda, &mut rng).is_infinite()
        } else if lambda.is_nan() {
            exprand(lambda, &mut rng).is_nan()
        } else {
            let exp1 = exprand(lambda, &mut rng);
            let mut rng = Pcg64Mcg::seed_from_u64(seed);
            let exp2 = exprand(lambda, &mut rng);
            exp1 == exp2 && exp1 >= 0.
        }
    }

    #[test]
    fn test_exprand() {
        let mut rng = Pcg64Mcg::seed_from_u64(1u64);
        let first = exprand(0f64, &mut rng);
        assert!(first.is_infinite());

        let first = exprand(f64::INFINITY, &mut rng);
        assert!((0f64 - first).abs() < f64::EPSILON);
    }

    #[test]
    fn exprand_mean_is_inverse_rate() {
        let mut rng = Pcg64Mcg::seed_from_u64(26u64);
        let n = 20_000;
        let mean = (0..n).map(|_| exprand(4., &mut rng)).sum::<f64>() / n as f64;
        assert!((mean - 0.25).abs() < 0.01, "{}", mean);
    }

    #[test]
    fn build_rates_with_defaults() {
        let rates = builder().build().unwrap();
        assert_eq!(rates.cp, 1.);
        assert_eq!(rates.antibody_concentration, 1.);
        assert_eq!(rates.reach, 10.);
    }

    #[test]
    fn reach_zero_is_accepted() {
        assert!(builder().reach(0.).build().is_ok());
    }

    #[test_case("kon", 0. ; "zero kon")]
    #[test_case("koff", -1. ; "negative koff")]
    #[test_case("konb", f64::NAN ; "nan konb")]
    #[test_case("cp", f64::INFINITY ; "infinite cp")]
    fn non_positive_rates_are_rejected(name: &'static str, value: f64) {
        let mut b = builder();
        match name {
            "kon" => b.kon(value),
            "koff" => b.koff(value),
            "konb" => b.konb(value),
            "cp" => b.cp(value),
            _ => unreachable!(),
        };
        match b.build() {
            Err(ConfigError::NonPositive { name: found, .. }) => {
                assert_eq!(found, name)
            }
            other => panic!("expected NonPositive error, found {:?}", other),
        }
    }

    #[test]
    fn negative_reach_is_rejected() {
        assert_eq!(
            builder().reach(-1.).build().unwrap_err(),
            ConfigError::InvalidReach(-1.)
        );
    }

    #[test]
    fn missing_field_is_reported() {
        let err = ReactionRatesBuilder::default().kon(1.).build().unwrap_err();
        assert!(matches!(err, ConfigError::Uninitialized(_)));
    }

    #[test_case(Species::Free, 3, true => 1. ; "free with association")]
    #[test_case(Species::Free, 3, false => 0. ; "free after association")]
    #[test_case(Species::Bound, 0, true => 0.1 ; "bound without neighbours")]
    #[test_case(Species::Bound, 2, false => 0.1 + 2. * 0.5 ; "bound with neighbours")]
    #[test_case(Species::Crosslinked, 5, true => 0. ; "crosslinked")]
    fn total_rate_per_species(
        species: Species,
        neighbours: usize,
        association: bool,
    ) -> f64 {
        builder().build().unwrap().total_rate(species, neighbours, association)
    }
}
