//! Derivative-free global minimization over a box.
use std::time::Instant;

use chrono::Utc;
use derive_builder::Builder;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use spr_sim::CancelToken;

use crate::{FitError, SearchBox};

/// The function to minimize. It must be safe to evaluate concurrently.
pub type Objective<'a> = dyn Fn(&[f64]) -> Result<f64, FitError> + Sync + 'a;

/// When to give up.
#[derive(Clone, Copy, Debug)]
pub struct Budget {
    pub max_generations: usize,
    pub deadline: Option<Instant>,
}

impl Default for Budget {
    fn default() -> Self {
        Budget { max_generations: 1000, deadline: None }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The last restart has converged or stalled
    Converged,
    MaxGenerations,
    Deadline,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimumFound {
    pub best: Vec<f64>,
    pub error: f64,
    pub generations: usize,
    pub evaluations: usize,
    pub restarts: usize,
    pub stop_reason: StopReason,
}

pub trait GlobalOptimizer {
    /// Minimize `objective` over `bounds`. The cancel token and the budget
    /// are checked once per generation: the best point found so far is
    /// returned together with the reason of the stop.
    fn minimize(
        &self,
        objective: &Objective,
        bounds: &SearchBox,
        budget: &Budget,
        cancel: &CancelToken,
    ) -> Result<OptimumFound, FitError>;

    fn name(&self) -> &'static str;
}

/// Separable natural evolution strategy (Schaul et al. 2011): a Gaussian
/// search distribution with diagonal covariance updated along the natural
/// gradient of the expected fitness, estimated from rank-based utilities.
///
/// A search that has converged or stalled is restarted from a uniform point
/// of the box with twice the population (IPOP, Auger & Hansen 2005), keeping
/// the best point found across all the restarts.
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct Snes {
    /// Number of samples per generation, `4 + ⌊3 ln d⌋` when not set
    #[builder(default, setter(strip_option))]
    population: Option<usize>,
    /// Initial standard deviation as a fraction of the box width
    #[builder(default = "0.25")]
    initial_sigma: f64,
    /// Stop when every standard deviation is below `tolerance` times the
    /// width of its axis
    #[builder(default = "1e-10")]
    tolerance: f64,
    #[builder(default = "6")]
    restarts: usize,
    /// Generations without improvement after which a search is restarted
    #[builder(default = "100")]
    stall: usize,
    #[builder(default = "26")]
    seed: u64,
    #[builder(default)]
    verbosity: u8,
}

impl SnesBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(Some(population)) = self.population {
            if population < 2 {
                return Err(format!("population must be at least 2, found {}", population));
            }
        }
        if self.stall == Some(0) {
            return Err("stall must be at least 1 generation".to_string());
        }
        if let Some(sigma) = self.initial_sigma {
            if !(sigma.is_finite() && sigma > 0.) {
                return Err(format!("initial sigma must be positive, found {}", sigma));
            }
        }
        Ok(())
    }
}

impl Default for Snes {
    fn default() -> Self {
        Snes {
            population: None,
            initial_sigma: 0.25,
            tolerance: 1e-10,
            restarts: 6,
            stall: 100,
            seed: 26,
            verbosity: 0,
        }
    }
}

/// Rank-based utilities: the best sample gets the largest weight, the worst
/// half gets a negative weight, and the weights sum to zero.
fn utilities(population: usize) -> Vec<f64> {
    let raw: Vec<f64> = (1..=population)
        .map(|rank| ((population as f64 / 2. + 1.).ln() - (rank as f64).ln()).max(0.))
        .collect();
    let total: f64 = raw.iter().sum();
    raw.iter().map(|u| u / total - 1. / population as f64).collect()
}

impl Snes {
    pub fn population(&self, dimension: usize) -> usize {
        self.population
            .unwrap_or(4 + (3. * (dimension as f64).ln()).floor() as usize)
    }

    fn evaluate(
        objective: &Objective,
        point: &[f64],
    ) -> Result<f64, FitError> {
        let value = objective(point)?;
        if value.is_nan() {
            return Err(FitError::NonFiniteObjective(point.to_vec()));
        }
        Ok(value)
    }
}

impl GlobalOptimizer for Snes {
    fn minimize(
        &self,
        objective: &Objective,
        bounds: &SearchBox,
        budget: &Budget,
        cancel: &CancelToken,
    ) -> Result<OptimumFound, FitError> {
        let dimension = bounds.lower.len();
        let eta_sigma = (3. + (dimension as f64).ln()) / (5. * (dimension as f64).sqrt());
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let mut mu = bounds.centre().to_vec();
        let mut best = mu.clone();
        let mut best_error = Snes::evaluate(objective, &best)?;
        let mut evaluations = 1;
        let mut generations = 0;
        let mut restarts = 0;

        let stop_reason = 'restarts: loop {
            let population = self.population(dimension) << restarts;
            let weights = utilities(population);
            let mut sigma: Vec<f64> =
                (0..dimension).map(|i| self.initial_sigma * bounds.width(i)).collect();
            let mut search_best = f64::INFINITY;
            let mut improved_at = generations;

            loop {
                if cancel.is_cancelled() {
                    break 'restarts StopReason::Cancelled;
                }
                if budget.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    break 'restarts StopReason::Deadline;
                }
                if generations >= budget.max_generations {
                    break 'restarts StopReason::MaxGenerations;
                }
                let converged = sigma
                    .iter()
                    .enumerate()
                    .all(|(i, s)| *s <= self.tolerance * bounds.width(i));
                if converged || generations - improved_at >= self.stall {
                    break;
                }

                // draw sequentially so that the result does not depend on the threads
                let noise: Vec<Vec<f64>> = (0..population)
                    .map(|_| (0..dimension).map(|_| StandardNormal.sample(&mut rng)).collect())
                    .collect();
                let samples: Vec<Vec<f64>> = noise
                    .iter()
                    .map(|s| {
                        let mut x: Vec<f64> =
                            mu.iter().zip(&sigma).zip(s).map(|((m, sd), z)| m + sd * z).collect();
                        bounds.clamp(&mut x);
                        x
                    })
                    .collect();
                let fitness = samples
                    .par_iter()
                    .map(|x| Snes::evaluate(objective, x))
                    .collect::<Result<Vec<f64>, FitError>>()?;
                evaluations += population;
                generations += 1;

                let mut ranking: Vec<usize> = (0..population).collect();
                ranking.sort_by(|&a, &b| fitness[a].total_cmp(&fitness[b]));
                let generation_best = fitness[ranking[0]];
                if search_best.is_infinite()
                    || search_best - generation_best > 1e-12 * search_best.abs()
                {
                    search_best = generation_best;
                    improved_at = generations;
                }
                if generation_best < best_error {
                    best_error = generation_best;
                    best = samples[ranking[0]].clone();
                }

                for i in 0..dimension {
                    let (grad_mu, grad_sigma) = ranking.iter().zip(&weights).fold(
                        (0., 0.),
                        |(gm, gs), (&k, u)| {
                            let z = noise[k][i];
                            (gm + u * z, gs + u * (z * z - 1.))
                        },
                    );
                    mu[i] += sigma[i] * grad_mu;
                    sigma[i] *= (eta_sigma / 2. * grad_sigma).exp();
                }
                bounds.clamp(&mut mu);

                if self.verbosity > 1 {
                    println!(
                        "{} Generation {}: best error {:.6e}, sigma {:?}",
                        Utc::now(),
                        generations,
                        best_error,
                        sigma
                    );
                }
            }

            // the mean of a converged distribution is usually the best point
            let centre_error = Snes::evaluate(objective, &mu)?;
            evaluations += 1;
            if centre_error < best_error {
                best_error = centre_error;
                best = mu.clone();
            }
            if restarts >= self.restarts {
                break StopReason::Converged;
            }
            restarts += 1;
            mu = (0..dimension)
                .map(|i| bounds.lower[i] + rng.gen::<f64>() * bounds.width(i))
                .collect();
            if self.verbosity > 0 {
                println!(
                    "{} Restart {} after {} generations with error {:.6e}",
                    Utc::now(),
                    restarts,
                    generations,
                    best_error
                );
            }
        };

        if stop_reason != StopReason::Converged {
            let centre_error = Snes::evaluate(objective, &mu)?;
            evaluations += 1;
            if centre_error < best_error {
                best_error = centre_error;
                best = mu;
            }
        }
        if self.verbosity > 0 {
            println!(
                "{} {} stopped after {} generations ({:?}) with error {:.6e}",
                Utc::now(),
                self.name(),
                generations,
                stop_reason,
                best_error
            );
        }
        Ok(OptimumFound {
            best,
            error: best_error,
            generations,
            evaluations,
            restarts,
            stop_reason,
        })
    }

    fn name(&self) -> &'static str {
        "SNES"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn unit_box() -> SearchBox {
        SearchBox::new([-5.; 5], [5.; 5]).unwrap()
    }

    fn sphere(target: [f64; 5]) -> impl Fn(&[f64]) -> Result<f64, FitError> + Sync {
        move |x: &[f64]| {
            Ok(x.iter().zip(target).map(|(a, b)| (a - b) * (a - b)).sum::<f64>().sqrt())
        }
    }

    #[test]
    fn utilities_sum_to_zero() {
        let u = utilities(8);
        assert!(u.iter().sum::<f64>().abs() < 1e-12);
        assert!(u.windows(2).all(|w| w[0] >= w[1]));
        assert!(u[0] > 0.);
    }

    #[test]
    fn default_population() {
        assert_eq!(Snes::default().population(5), 8);
        assert_eq!(SnesBuilder::default().population(12usize).build().unwrap().population(5), 12);
    }

    #[test]
    fn invalid_builder() {
        assert!(SnesBuilder::default().population(1usize).build().is_err());
        assert!(SnesBuilder::default().initial_sigma(0.).build().is_err());
        assert!(SnesBuilder::default().stall(0usize).build().is_err());
    }

    #[test]
    fn restarts_keep_the_best_point() {
        let target = [0.5, -0.5, 1., 2., -3.];
        let budget = Budget { max_generations: 100_000, deadline: None };
        let single = SnesBuilder::default()
            .restarts(0usize)
            .build()
            .unwrap()
            .minimize(&sphere(target), &unit_box(), &budget, &CancelToken::default())
            .unwrap();
        let restarted = SnesBuilder::default()
            .restarts(2usize)
            .build()
            .unwrap()
            .minimize(&sphere(target), &unit_box(), &budget, &CancelToken::default())
            .unwrap();
        assert_eq!(single.stop_reason, StopReason::Converged);
        assert_eq!(restarted.stop_reason, StopReason::Converged);
        assert_eq!((single.restarts, restarted.restarts), (0, 2));
        assert!(restarted.generations > single.generations);
        assert!(restarted.evaluations > single.evaluations);
        assert!(restarted.error <= single.error);
    }

    #[test]
    fn minimizes_a_shifted_sphere() {
        let target = [1., -2., 0.5, 3., -4.];
        let budget = Budget { max_generations: 5000, deadline: None };
        let found = Snes::default()
            .minimize(&sphere(target), &unit_box(), &budget, &CancelToken::default())
            .unwrap();
        assert!(found.error < 1e-6);
        for (x, t) in found.best.iter().zip(target) {
            assert!((x - t).abs() < 1e-6);
        }
    }

    #[test]
    fn optimum_on_the_boundary() {
        let target = [9., 0., 0., 0., 0.];
        let budget = Budget { max_generations: 3000, deadline: None };
        let found = Snes::default()
            .minimize(&sphere(target), &unit_box(), &budget, &CancelToken::default())
            .unwrap();
        assert!((found.best[0] - 5.).abs() < 1e-4);
        assert!((found.error - 4.).abs() < 1e-4);
    }

    #[test]
    fn same_seed_same_optimum() {
        let target = [0.3, 0.3, 0.3, 0.3, 0.3];
        let budget = Budget { max_generations: 30, deadline: None };
        let a = Snes::default()
            .minimize(&sphere(target), &unit_box(), &budget, &CancelToken::default())
            .unwrap();
        let b = Snes::default()
            .minimize(&sphere(target), &unit_box(), &budget, &CancelToken::default())
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.stop_reason, StopReason::MaxGenerations);
        assert_eq!(a.evaluations, 30 * 8 + 2);
        assert_eq!(a.restarts, 0);
    }

    #[test]
    fn stops_when_cancelled_or_late() {
        let cancel = CancelToken::default();
        cancel.cancel();
        let found = Snes::default()
            .minimize(&sphere([0.; 5]), &unit_box(), &Budget::default(), &cancel)
            .unwrap();
        assert_eq!(found.stop_reason, StopReason::Cancelled);
        assert_eq!(found.generations, 0);

        let budget = Budget {
            max_generations: usize::MAX,
            deadline: Some(Instant::now() - Duration::from_millis(1)),
        };
        let found = Snes::default()
            .minimize(&sphere([0.; 5]), &unit_box(), &budget, &CancelToken::default())
            .unwrap();
        assert_eq!(found.stop_reason, StopReason::Deadline);
    }

    #[test]
    fn objective_errors_are_surfaced() {
        let failing =
            |x: &[f64]| -> Result<f64, FitError> { Err(FitError::NonFiniteObjective(x.to_vec())) };
        assert!(Snes::default()
            .minimize(&failing, &unit_box(), &Budget::default(), &CancelToken::default())
            .is_err());
    }
}
