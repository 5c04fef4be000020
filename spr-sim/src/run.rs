//! One stochastic realization of the binding dynamics.
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::config::RunConfig;
use crate::error::{ConfigError, SimulationError};
use crate::event::{Event, EventSchedule, Handle, SimTime};
use crate::outputter::{Observe, Outputter, SpeciesCounts};
use crate::particle::{CellList, Particle, PeriodicBox, Species};
use crate::rate::{exprand, KineticRate, ReactionRates};
use crate::CancelToken;

/// Simulation of the antigens of one flow cell, that is one realization of
/// the stochastic reaction-diffusion process.
///
/// The `Run` uses the [typestate pattern]. The possible states are [`Started`]
/// and [`Ended`].
///
/// [typestate pattern]: https://github.com/cbiffle/m4vga-rs/blob/a1e2ba47eaeb4864f0d8b97637611d9460ce5c4d/notes/20190131-typestate.md
#[derive(Debug)]
pub struct Run<S: RunState> {
    state: S,
    /// Index of the run within its ensemble
    pub idx: usize,
}

/// The run is looping over the particle events.
#[derive(Debug)]
pub struct Started<'a> {
    config: &'a RunConfig,
    system: SimulationState,
    rng: ChaCha8Rng,
}

/// The run has reached the stop time.
#[derive(Clone, Debug)]
pub struct Ended {
    /// Time of the last simulated event
    time: SimTime,
    counts: SpeciesCounts,
    /// Number of particle events simulated
    events: u64,
}

pub trait RunState {}
impl RunState for Started<'_> {}
impl RunState for Ended {}

/// Everything a run mutates: the particle arena, the schedule of their
/// pending reactions and the spatial index. Single owner, dropped with the
/// run.
#[derive(Debug)]
pub struct SimulationState {
    time: SimTime,
    domain: PeriodicBox,
    rates: ReactionRates,
    diffusion: f64,
    /// Whether Free → Bound is still enabled
    association: bool,
    association_end: SimTime,
    particles: Vec<Particle>,
    schedule: EventSchedule,
    cells: CellList,
    counts: SpeciesCounts,
}

pub fn sample_positions(config: &RunConfig, rng: &mut impl Rng) -> Vec<Vec<f64>> {
    //! Uniform positions of all the particles in the periodic box.
    let domain = PeriodicBox {
        side: config.domain_length(),
        dimension: config.dimension(),
    };
    (0..config.particles()).map(|_| domain.sample_uniformly(rng)).collect()
}

impl<'a> Run<Started<'a>> {
    pub fn new(
        idx: usize,
        rates: &ReactionRates,
        config: &'a RunConfig,
        positions: Vec<Vec<f64>>,
        mut rng: ChaCha8Rng,
    ) -> Result<Self, SimulationError> {
        //! Place all the particles as free antigens at `positions` and draw
        //! their first reaction times.
        let domain = PeriodicBox {
            side: config.domain_length(),
            dimension: config.dimension(),
        };
        if positions.len() != config.particles()
            || positions.iter().any(|p| p.len() != domain.dimension)
        {
            return Err(ConfigError::InitialPositions(format!(
                "expected {} positions of dimension {}",
                config.particles(),
                domain.dimension
            ))
            .into());
        }
        let association_end = config.association_end();
        let association = association_end > 0.;
        let rate = rates.total_rate(Species::Free, 0, association);
        let times: Vec<SimTime> = positions.iter().map(|_| exprand(rate, &mut rng)).collect();
        let cells = CellList::new(domain, rates.reach, &positions);
        let particles: Vec<Particle> = positions
            .into_iter()
            .map(|position| Particle { rate, ..Particle::free(position) })
            .collect();

        Ok(Run {
            idx,
            state: Started {
                config,
                system: SimulationState {
                    time: 0.,
                    domain,
                    rates: *rates,
                    diffusion: config.diffusion(),
                    association,
                    association_end,
                    counts: SpeciesCounts::from_particles(&particles),
                    particles,
                    schedule: EventSchedule::new(times),
                    cells,
                },
                rng,
            },
        })
    }

    pub fn get_counts(&self) -> &SpeciesCounts {
        &self.state.system.counts
    }

    pub fn get_time(&self) -> SimTime {
        self.state.system.time
    }

    pub fn simulate(
        mut self,
        outputter: &mut Outputter,
        cancel: &CancelToken,
    ) -> Result<Run<Ended>, SimulationError> {
        //! Simulate the run up to the stop time, folding the species counts
        //! into `outputter` at each observation time.
        //!
        //! An observation at time t records the state reached by all the
        //! events strictly before t. The run polls `cancel` before each event.
        let config = self.state.config;
        let stop = config.stop_time();
        let observations = config.observation_times();
        let mut next_obs = 0;
        let mut events = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(SimulationError::Cancelled(self.state.system.time));
            }
            let system = &mut self.state.system;
            let next = system.schedule.next();
            let event_time = next.map_or(f64::INFINITY, |e| e.time);
            let switch_time = if system.association {
                system.association_end
            } else {
                f64::INFINITY
            };
            let horizon = event_time.min(switch_time).min(stop);

            // flush the observations falling before the next change of state
            while next_obs < observations.len()
                && (observations[next_obs] < horizon
                    || (horizon >= stop && observations[next_obs] <= stop))
            {
                outputter.observe(&system.counts, next_obs);
                next_obs += 1;
            }
            if horizon >= stop {
                break;
            }

            match next {
                Some(event) if event.time < switch_time => {
                    system.fire(event, &mut self.state.rng)?;
                    events += 1;
                }
                _ => system.stop_association(switch_time),
            }
        }

        Ok(Run {
            idx: self.idx,
            state: Ended {
                time: self.state.system.time,
                counts: self.state.system.counts,
                events,
            },
        })
    }
}

impl Run<Ended> {
    pub fn get_counts(&self) -> &SpeciesCounts {
        //! Number of particles per species at the stop time.
        &self.state.counts
    }

    pub fn get_time(&self) -> SimTime {
        self.state.time
    }

    pub fn get_events(&self) -> u64 {
        self.state.events
    }
}

impl SimulationState {
    fn stop_association(&mut self, time: SimTime) {
        //! Disable Free → Bound: the antibody flow has stopped.
        self.time = time;
        self.association = false;
        for (handle, particle) in self.particles.iter_mut().enumerate() {
            if particle.species == Species::Free {
                particle.rate = 0.;
                self.schedule.reschedule(handle, f64::INFINITY);
            }
        }
    }

    fn fire(&mut self, event: Event, rng: &mut ChaCha8Rng) -> Result<(), SimulationError> {
        let Event { handle, time } = event;
        self.time = time;

        // the reaction is drawn from the neighbourhood the pending time was
        // sampled with, that is before the particle moves
        let species = self.particles[handle].species;
        let partner = match species {
            Species::Bound => {
                let free = self.neighbours(handle, Species::Free);
                let total = self.rates.total_rate(Species::Bound, free.len(), self.association);
                if free.is_empty() || rng.gen::<f64>() * total < self.rates.koff {
                    None
                } else {
                    Some(free[rng.gen_range(0..free.len())])
                }
            }
            _ => None,
        };

        // bound particles next to the old position may lose this one as a
        // free neighbour
        let mut affected = self.neighbours(handle, Species::Bound);
        self.advance(handle, time, rng)?;

        match (species, partner) {
            (Species::Free, _) => self.set_species(handle, Species::Bound),
            (Species::Bound, None) => self.set_species(handle, Species::Free),
            (Species::Bound, Some(partner)) => {
                self.set_species(handle, Species::Crosslinked);
                self.set_species(partner, Species::Crosslinked);
                affected.extend(self.neighbours(partner, Species::Bound));
                self.particles[partner].rate = 0.;
                self.schedule.reschedule(partner, f64::INFINITY);
            }
            (Species::Crosslinked, _) => {}
        }
        affected.extend(self.neighbours(handle, Species::Bound));

        let rate = self.current_rate(handle);
        self.particles[handle].rate = rate;
        let next = time + exprand(rate, rng);
        self.check_time(handle, next)?;
        self.schedule.reschedule(handle, next);

        affected.sort_unstable();
        affected.dedup();
        for neighbour in affected {
            if neighbour != handle && self.particles[neighbour].species == Species::Bound {
                let rate = self.current_rate(neighbour);
                self.rescale(neighbour, rate, rng)?;
            }
        }
        Ok(())
    }

    fn current_rate(&self, handle: Handle) -> KineticRate {
        let species = self.particles[handle].species;
        let free = match species {
            Species::Bound => self.neighbours(handle, Species::Free).len(),
            _ => 0,
        };
        self.rates.total_rate(species, free, self.association)
    }

    fn rescale(
        &mut self,
        handle: Handle,
        rate: KineticRate,
        rng: &mut ChaCha8Rng,
    ) -> Result<(), SimulationError> {
        //! Change the rate of a pending reaction, reusing the pending time
        //! when possible (Gibson & Bruck 2000).
        let old = self.particles[handle].rate;
        if old == rate {
            return Ok(());
        }
        let pending = self.schedule.time_of(handle);
        let next = if old > 0. && rate > 0. && pending.is_finite() {
            self.time + old / rate * (pending - self.time)
        } else {
            self.time + exprand(rate, rng)
        };
        self.check_time(handle, next)?;
        self.particles[handle].rate = rate;
        self.schedule.reschedule(handle, next);
        Ok(())
    }

    fn advance(
        &mut self,
        handle: Handle,
        time: SimTime,
        rng: &mut ChaCha8Rng,
    ) -> Result<(), SimulationError> {
        //! Brownian displacement of `handle` since it last moved.
        let particle = &mut self.particles[handle];
        let dt = time - particle.moved_at;
        if self.diffusion > 0. && dt > 0. {
            let sigma = (2. * self.diffusion * dt).sqrt();
            for x in particle.position.iter_mut() {
                let step: f64 = rng.sample(StandardNormal);
                *x = self.domain.wrap(*x + sigma * step);
            }
        }
        if particle.position.iter().any(|x| !x.is_finite()) {
            return Err(SimulationError::NonFinite {
                particle: handle,
                quantity: "position",
                time,
            });
        }
        particle.moved_at = time;
        self.cells.relocate(handle, &self.particles[handle].position);
        Ok(())
    }

    fn set_species(&mut self, handle: Handle, species: Species) {
        let particle = &mut self.particles[handle];
        self.counts.decrement(particle.species);
        self.counts.increment(species);
        particle.species = species;
    }

    fn neighbours(&self, handle: Handle, species: Species) -> Vec<Handle> {
        //! Particles of `species` within reach of `handle`, excluding itself.
        let position = &self.particles[handle].position;
        let reach2 = self.rates.reach * self.rates.reach;
        self.cells
            .candidates(position)
            .into_iter()
            .filter(|&other| {
                other != handle
                    && self.particles[other].species == species
                    && self.domain.distance2(position, &self.particles[other].position) <= reach2
            })
            .collect()
    }

    fn check_time(&self, handle: Handle, time: SimTime) -> Result<(), SimulationError> {
        // infinite times are legit: the particle will never react
        if time.is_nan() || time < self.time {
            return Err(SimulationError::NonFinite {
                particle: handle,
                quantity: "time",
                time: self.time,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RunOptions, RunOptionsBuilder};
    use crate::outputter::{TotalA, TotalBound};
    use crate::rate::ReactionRatesBuilder;
    use rand::SeedableRng;

    fn rates(kon: f64, koff: f64, konb: f64, reach: f64) -> ReactionRates {
        ReactionRatesBuilder::default()
            .kon(kon)
            .koff(koff)
            .konb(konb)
            .reach(reach)
            .antigen_concentration(1.)
            .build()
            .unwrap()
    }

    fn options(particles: usize) -> RunOptionsBuilder {
        let mut builder = RunOptionsBuilder::default();
        builder
            .particles(particles)
            .stop_time(10.)
            .observation_times(vec![0., 2.5, 5., 7.5, 10.])
            .domain_length(100.)
            .dimension(2usize);
        builder
    }

    fn simulate(
        rates: &ReactionRates,
        opts: RunOptions,
        outputter: &mut Outputter,
        seed: u64,
    ) -> Run<Ended> {
        let config = RunConfig::new(opts, 1.).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let positions = sample_positions(&config, &mut rng);
        Run::new(0, rates, &config, positions, rng)
            .unwrap()
            .simulate(outputter, &CancelToken::default())
            .unwrap()
    }

    #[test]
    fn counts_are_conserved() {
        let rates = rates(1., 0.5, 2., 20.);
        let opts = options(50).build().unwrap();
        let mut outputter = Outputter::from(TotalBound::new(&opts.observation_times));
        let run = simulate(&rates, opts, &mut outputter, 26);
        assert_eq!(run.get_counts().total(), 50);
        assert!(run.get_events() > 0);
        assert!(run.get_time() < 10.);
        assert_eq!(outputter.runs(), 1);
    }

    #[test]
    fn observation_at_zero_sees_initial_state() {
        let rates = rates(5., 0.1, 0.1, 1.);
        let opts = options(20).build().unwrap();
        let mut outputter = Outputter::from(TotalA::new(&opts.observation_times));
        simulate(&rates, opts, &mut outputter, 3);
        assert_eq!(outputter.means()[0], 20.);
    }

    #[test]
    fn no_crosslinks_without_reach() {
        let rates = rates(1., 0.5, 100., 0.);
        let opts = options(30).build().unwrap();
        let mut outputter = Outputter::from(TotalBound::new(&opts.observation_times));
        let run = simulate(&rates, opts, &mut outputter, 11);
        assert_eq!(run.get_counts().crosslinked, 0);
    }

    #[test]
    fn crosslinks_pair_up() {
        // every particle is within reach of every other one
        let rates = rates(1., 0.01, 50., 200.);
        let opts = options(40).diffusion(0.).build().unwrap();
        let mut outputter = Outputter::from(TotalBound::new(&opts.observation_times));
        let run = simulate(&rates, opts, &mut outputter, 5);
        let counts = run.get_counts();
        assert!(counts.crosslinked > 0);
        assert_eq!(counts.crosslinked % 2, 0);
    }

    #[test]
    fn association_switched_off_at_zero() {
        let rates = rates(10., 0.5, 1., 5.);
        let opts = options(25).association_end(0.).build().unwrap();
        let mut outputter = Outputter::from(TotalA::new(&opts.observation_times));
        let run = simulate(&rates, opts, &mut outputter, 8);
        assert_eq!(run.get_counts().free, 25);
        assert_eq!(run.get_events(), 0);
        assert!(outputter.means().iter().all(|&m| m == 25.));
    }

    #[test]
    fn dissociation_after_association_end() {
        let rates = rates(10., 2., 0.001, 0.);
        let opts = options(25).association_end(1.).build().unwrap();
        let mut outputter = Outputter::from(TotalBound::new(&opts.observation_times));
        let run = simulate(&rates, opts, &mut outputter, 9);
        let means = outputter.means();
        // after the flow stops bound antigens can only be released
        assert!(means.windows(2).skip(1).all(|w| w[1] <= w[0]));
        assert!(run.get_counts().free > 0);
    }

    #[test]
    fn same_seed_same_run() {
        let rates = rates(1., 0.5, 2., 20.);
        let opts = options(30).build().unwrap();
        let mut first = Outputter::from(TotalBound::new(&opts.observation_times));
        let mut second = first.empty_like();
        let a = simulate(&rates, opts.clone(), &mut first, 42);
        let b = simulate(&rates, opts, &mut second, 42);
        assert_eq!(a.get_counts(), b.get_counts());
        assert_eq!(a.get_events(), b.get_events());
        assert_eq!(first, second);
    }

    #[test]
    fn cancelled_run_fails() {
        let rates = rates(1., 0.5, 2., 20.);
        let config = RunConfig::new(options(10).build().unwrap(), 1.).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let positions = sample_positions(&config, &mut rng);
        let mut outputter = Outputter::from(TotalBound::new(config.observation_times()));
        let cancel = CancelToken::default();
        cancel.cancel();
        let result = Run::new(0, &rates, &config, positions, rng)
            .unwrap()
            .simulate(&mut outputter, &cancel);
        assert!(matches!(result, Err(SimulationError::Cancelled(_))));
    }

    #[test]
    fn diffusion_does_not_turn_crosslinking_into_unbinding() {
        // without dissociation a bound antigen can only crosslink, however
        // far it drifts from its free neighbours
        let rates = rates(1., 1e-9, 20., 3.);
        let opts = options(60)
            .dimension(1usize)
            .stop_time(20.)
            .observation_times(vec![0., 20.])
            .diffusion(500.)
            .build()
            .unwrap();
        let config = RunConfig::new(opts, 1.).unwrap();
        let (mut bound_events, mut unbinds) = (0, 0);
        for seed in 0..20 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let positions = sample_positions(&config, &mut rng);
            let mut run = Run::new(0, &rates, &config, positions, rng).unwrap();
            let Started { system, rng, .. } = &mut run.state;
            while let Some(event) = system.schedule.next() {
                if event.time > 20. {
                    break;
                }
                let before = system.particles[event.handle].species;
                system.fire(event, rng).unwrap();
                if before == Species::Bound {
                    bound_events += 1;
                    if system.particles[event.handle].species == Species::Free {
                        unbinds += 1;
                    }
                }
            }
        }
        assert!(bound_events > 0);
        assert_eq!(unbinds, 0);
    }

    #[test]
    fn overflowing_diffusion_fails() {
        let rates = rates(1., 0.5, 2., 20.);
        let opts = options(10).diffusion(1e308).build().unwrap();
        let config = RunConfig::new(opts, 1.).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let positions = sample_positions(&config, &mut rng);
        let mut outputter = Outputter::from(TotalBound::new(config.observation_times()));
        let result = Run::new(0, &rates, &config, positions, rng)
            .unwrap()
            .simulate(&mut outputter, &CancelToken::default());
        assert!(matches!(
            result,
            Err(SimulationError::NonFinite { quantity: "position", .. })
        ));
    }

    #[test]
    fn wrong_number_of_positions() {
        let rates = rates(1., 0.5, 2., 20.);
        let config = RunConfig::new(options(10).build().unwrap(), 1.).unwrap();
        let rng = ChaCha8Rng::seed_from_u64(1);
        let result = Run::new(0, &rates, &config, vec![vec![1., 1.]], rng);
        assert!(matches!(
            result,
            Err(SimulationError::Config(ConfigError::InitialPositions(_)))
        ));
    }
}
