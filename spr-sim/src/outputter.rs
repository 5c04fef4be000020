//! Ensemble statistics of the species counts at the observation times.
//!
//! An [`Outputter`] holds one online mean/variance accumulator per
//! observation time. Each run folds its counts into it, so that full
//! per-run traces are never kept. To add a new observable, implement
//! [`Observe`] and [`Name`] and register it in [`Outputter`].
use std::path::Path;

use enum_dispatch::enum_dispatch;

use crate::particle::{Particle, Species};
use crate::{write2file, NbParticles};

/// Number of particles per species at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SpeciesCounts {
    pub free: NbParticles,
    pub bound: NbParticles,
    pub crosslinked: NbParticles,
}

impl SpeciesCounts {
    pub fn from_particles(particles: &[Particle]) -> Self {
        particles.iter().fold(SpeciesCounts::default(), |mut counts, p| {
            counts.increment(p.species);
            counts
        })
    }

    pub fn increment(&mut self, species: Species) {
        *self.get_mut(species) += 1;
    }

    pub fn decrement(&mut self, species: Species) {
        *self.get_mut(species) -= 1;
    }

    pub fn total(&self) -> NbParticles {
        self.free + self.bound + self.crosslinked
    }

    fn get_mut(&mut self, species: Species) -> &mut NbParticles {
        match species {
            Species::Free => &mut self.free,
            Species::Bound => &mut self.bound,
            Species::Crosslinked => &mut self.crosslinked,
        }
    }
}

/// Welford's running mean and sum of squared deviations.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OnlineMoments {
    count: u64,
    mean: f64,
    m2: f64,
}

impl OnlineMoments {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Combine two partial aggregates (Chan et al.), order does not matter
    /// up to rounding.
    pub fn merge(&mut self, other: &OnlineMoments) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let weight = other.count as f64 / count as f64;
        self.mean += delta * weight;
        self.m2 += other.m2 + delta * delta * self.count as f64 * weight;
        self.count = count;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// NaN when nothing has been observed
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.mean
        }
    }

    /// Population variance, zero for a single observation.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.m2 / self.count as f64
        }
    }
}

/// The observation times and one accumulator per time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Accumulator {
    times: Vec<f64>,
    moments: Vec<OnlineMoments>,
}

impl Accumulator {
    pub fn new(times: &[f64]) -> Self {
        Accumulator {
            times: times.to_vec(),
            moments: vec![OnlineMoments::default(); times.len()],
        }
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn moments(&self) -> &[OnlineMoments] {
        &self.moments
    }

    fn push(&mut self, time_idx: usize, value: f64) {
        self.moments[time_idx].push(value)
    }

    fn reset(&mut self) {
        self.moments.iter_mut().for_each(|m| *m = OnlineMoments::default());
    }

    fn merge(&mut self, other: &Accumulator) {
        debug_assert_eq!(self.times, other.times);
        for (mine, theirs) in self.moments.iter_mut().zip(&other.moments) {
            mine.merge(theirs);
        }
    }
}

/// Reset and observe contract shared by all the outputters.
#[enum_dispatch]
pub trait Observe {
    /// Forget all the runs observed so far, keeping the observation times
    fn reset(&mut self);
    /// Fold the counts of the current run at the `time_idx`-th observation
    /// time
    fn observe(&mut self, counts: &SpeciesCounts, time_idx: usize);
    fn accumulator(&self) -> &Accumulator;
}

#[enum_dispatch]
pub trait Name {
    fn get_name(&self) -> &'static str;
}

/// The quantities recorded across the repeats of an ensemble.
#[enum_dispatch(Observe, Name)]
#[derive(Clone, Debug, PartialEq)]
pub enum Outputter {
    /// Bound plus crosslinked antigens, proportional to the SPR response
    TotalBound,
    /// Free antigens
    TotalA,
}

impl Outputter {
    pub fn times(&self) -> &[f64] {
        self.accumulator().times()
    }

    pub fn means(&self) -> Vec<f64> {
        self.accumulator().moments().iter().map(OnlineMoments::mean).collect()
    }

    pub fn variances(&self) -> Vec<f64> {
        self.accumulator().moments().iter().map(OnlineMoments::variance).collect()
    }

    /// Number of runs folded into the accumulators
    pub fn runs(&self) -> u64 {
        self.accumulator().moments().first().map_or(0, OnlineMoments::count)
    }

    pub fn value_at(&self, time: f64) -> Option<(f64, f64)> {
        //! Mean and variance at the observation time `time`, `None` if
        //! `time` is not one of the observation times.
        let acc = self.accumulator();
        acc.times()
            .iter()
            .position(|&t| t == time)
            .map(|idx| (acc.moments()[idx].mean(), acc.moments()[idx].variance()))
    }

    /// An outputter of the same kind with the same times and no runs.
    pub fn empty_like(&self) -> Self {
        let mut empty = self.clone();
        empty.reset();
        empty
    }

    pub fn merge(&mut self, other: &Outputter) {
        match (self, other) {
            (Outputter::TotalBound(a), Outputter::TotalBound(b)) => a.acc.merge(&b.acc),
            (Outputter::TotalA(a), Outputter::TotalA(b)) => a.acc.merge(&b.acc),
            _ => unreachable!("cannot merge outputters of different kinds"),
        }
    }

    pub fn save(&self, dir: &Path) -> std::io::Result<()> {
        //! Append the means and the variances as a new row of
        //! `{dir}/{name}_mean.csv` and `{dir}/{name}_variance.csv`.
        let name = self.get_name();
        write2file(&self.means(), &dir.join(format!("{}_mean.csv", name)), None, true)?;
        write2file(
            &self.variances(),
            &dir.join(format!("{}_variance.csv", name)),
            None,
            true,
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TotalBound {
    acc: Accumulator,
}

impl TotalBound {
    pub fn new(times: &[f64]) -> Self {
        TotalBound { acc: Accumulator::new(times) }
    }
}

impl Observe for TotalBound {
    fn reset(&mut self) {
        self.acc.reset()
    }

    fn observe(&mut self, counts: &SpeciesCounts, time_idx: usize) {
        self.acc.push(time_idx, (counts.bound + counts.crosslinked) as f64)
    }

    fn accumulator(&self) -> &Accumulator {
        &self.acc
    }
}

impl Name for TotalBound {
    fn get_name(&self) -> &'static str {
        "total_bound"
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TotalA {
    acc: Accumulator,
}

impl TotalA {
    pub fn new(times: &[f64]) -> Self {
        TotalA { acc: Accumulator::new(times) }
    }
}

impl Observe for TotalA {
    fn reset(&mut self) {
        self.acc.reset()
    }

    fn observe(&mut self, counts: &SpeciesCounts, time_idx: usize) {
        self.acc.push(time_idx, counts.free as f64)
    }

    fn accumulator(&self) -> &Accumulator {
        &self.acc
    }
}

impl Name for TotalA {
    fn get_name(&self) -> &'static str {
        "total_a"
    }
}
