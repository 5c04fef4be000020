//! Independent repeats of the same run folded into one [`Outputter`].
use chrono::Utc;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

use crate::config::{InitialPositions, RunConfig};
use crate::error::SimulationError;
use crate::outputter::{Observe, Outputter};
use crate::rate::ReactionRates;
use crate::run::{sample_positions, Run};
use crate::{CancelToken, Seed};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallel {
    False,
    True,
}

/// Mean and variance of an observable at the observation times.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub times: Vec<f64>,
    pub mean: Vec<f64>,
    pub variance: Vec<f64>,
}

impl Curve {
    /// The mean curve in response units.
    pub fn response(&self, cp: f64) -> Vec<f64> {
        self.mean.iter().map(|m| m * cp).collect()
    }
}

impl From<&Outputter> for Curve {
    fn from(outputter: &Outputter) -> Self {
        Curve {
            times: outputter.times().to_vec(),
            mean: outputter.means(),
            variance: outputter.variances(),
        }
    }
}

/// The repeats of a run sharing the same rates and configuration. Repeat `k`
/// draws its random numbers from the ChaCha stream `stream_offset + k` of the
/// seed, hence the result does not depend on the execution order.
#[derive(Clone, Debug)]
pub struct Ensemble<'a> {
    rates: &'a ReactionRates,
    config: &'a RunConfig,
    seed: Seed,
    parallel: Parallel,
    stream_offset: u64,
    verbosity: u8,
}

impl<'a> Ensemble<'a> {
    pub fn new(
        rates: &'a ReactionRates,
        config: &'a RunConfig,
        seed: Seed,
        parallel: Parallel,
    ) -> Self {
        Ensemble { rates, config, seed, parallel, stream_offset: 0, verbosity: 0 }
    }

    pub fn with_stream_offset(mut self, stream_offset: u64) -> Self {
        self.stream_offset = stream_offset;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn run(
        &self,
        outputter: &mut Outputter,
        cancel: &CancelToken,
    ) -> Result<(), SimulationError> {
        //! Reset `outputter` and fold all the repeats into it. Any failed
        //! repeat invalidates the whole ensemble.
        outputter.reset();
        let shared = self.shared_positions();
        let repeats = self.config.repeats();
        if self.verbosity > 0 {
            println!("{} Simulating {} repeats", Utc::now(), repeats);
        }
        if self.verbosity > 1 {
            println!("{:#?}", self.rates);
        }

        match self.parallel {
            Parallel::False => {
                let mut acc = outputter.empty_like();
                for idx in 0..repeats {
                    self.run_one(idx, &mut acc, shared.as_deref(), cancel)?;
                }
                *outputter = acc;
            }
            Parallel::True => {
                let empty = outputter.empty_like();
                *outputter = (0..repeats)
                    .into_par_iter()
                    .try_fold(
                        || empty.clone(),
                        |mut acc, idx| {
                            self.run_one(idx, &mut acc, shared.as_deref(), cancel)?;
                            Ok::<_, SimulationError>(acc)
                        },
                    )
                    .try_reduce(
                        || empty.clone(),
                        |mut acc, other| {
                            acc.merge(&other);
                            Ok(acc)
                        },
                    )?;
            }
        }
        if self.verbosity > 0 {
            println!("{} End of the {} repeats", Utc::now(), repeats);
        }
        Ok(())
    }

    fn shared_positions(&self) -> Option<Vec<Vec<f64>>> {
        match &self.config.options().initial_positions {
            InitialPositions::Resample => None,
            InitialPositions::Reuse => {
                let seed = self.seed.get_seed().wrapping_add(1);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(self.stream_offset);
                Some(sample_positions(self.config, &mut rng))
            }
            InitialPositions::Fixed(positions) => Some(positions.clone()),
        }
    }

    fn run_one(
        &self,
        idx: usize,
        outputter: &mut Outputter,
        shared: Option<&[Vec<f64>]>,
        cancel: &CancelToken,
    ) -> Result<(), SimulationError> {
        let mut rng = ChaCha8Rng::seed_from_u64(*self.seed.get_seed());
        rng.set_stream(self.stream_offset + idx as u64);
        let positions = match shared {
            Some(positions) => positions.to_vec(),
            None => sample_positions(self.config, &mut rng),
        };
        let run = Run::new(idx, self.rates, self.config, positions, rng)?
            .simulate(outputter, cancel)?;
        if self.verbosity > 1 {
            println!(
                "{} Run {} ended after {} events with {:?}",
                Utc::now(),
                run.idx,
                run.get_events(),
                run.get_counts()
            );
        }
        Ok(())
    }
}

pub fn simulate_curve(
    rates: &ReactionRates,
    config: &RunConfig,
    seed: Seed,
    mut outputter: Outputter,
    cancel: &CancelToken,
) -> Result<Curve, SimulationError> {
    //! Re-entrant forward simulation at arbitrary rates, used to plot or
    //! export a fitted curve.
    Ensemble::new(rates, config, seed, Parallel::True).run(&mut outputter, cancel)?;
    Ok(Curve::from(&outputter))
}
