//! Options of the simulation runs and the configuration derived from them.
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rate::ensure_positive;

/// Number of antigens per nm³ for a 1 µM concentration (Avogadro × 1e-24 × 1e-6 / 1e-3).
pub const MICRO_MOLAR_PER_NM3: f64 = 6.02214076e-4;

/// How the starting positions of the particles are chosen for each run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum InitialPositions {
    /// Draw fresh uniform positions at the beginning of every run
    #[default]
    Resample,
    /// Draw uniform positions once and start every run from them
    Reuse,
    /// Start every run from these positions
    Fixed(Vec<Vec<f64>>),
}

/// User-facing options of an ensemble of runs.
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[builder(default, build_fn(error = "ConfigError"))]
pub struct RunOptions {
    /// Number of antigens in the box
    pub particles: usize,
    pub stop_time: f64,
    /// Time at which the antibody flow stops, `None` means never
    #[builder(setter(strip_option))]
    pub association_end: Option<f64>,
    /// Strictly ascending times at which the species are counted
    pub observation_times: Vec<f64>,
    /// Side of the periodic box in nm, computed from the antigen density
    /// when not given
    #[builder(setter(strip_option))]
    pub domain_length: Option<f64>,
    pub initial_positions: InitialPositions,
    pub repeats: usize,
    pub dimension: usize,
    /// Diffusion coefficient (nm²/s), zero freezes the particles
    pub diffusion: f64,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            particles: 1000,
            stop_time: 600.,
            association_end: None,
            observation_times: Vec::new(),
            domain_length: None,
            initial_positions: InitialPositions::default(),
            repeats: 1,
            dimension: 3,
            diffusion: 1.,
        }
    }
}

/// Side of a cubic box holding `particles` antigens at `concentration` µM.
pub fn domain_length_from_density(
    particles: usize,
    concentration: f64,
    dimension: usize,
) -> f64 {
    let density = concentration * MICRO_MOLAR_PER_NM3;
    (particles as f64 / density).powf(1. / dimension as f64)
}

/// Validated [`RunOptions`] together with the side of the periodic box.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    options: RunOptions,
    domain_length: f64,
}

impl RunConfig {
    pub fn new(
        options: RunOptions,
        antigen_concentration: f64,
    ) -> Result<Self, ConfigError> {
        ensure_positive("stop_time", options.stop_time)?;
        if options.particles == 0 {
            return Err(ConfigError::NonPositive { name: "particles", value: 0. });
        }
        if options.repeats == 0 {
            return Err(ConfigError::NonPositive { name: "repeats", value: 0. });
        }
        if !(1..=3).contains(&options.dimension) {
            return Err(ConfigError::Dimension(options.dimension));
        }
        if !(options.diffusion.is_finite() && options.diffusion >= 0.) {
            return Err(ConfigError::InvalidDiffusion(options.diffusion));
        }
        if let Some(end) = options.association_end {
            if !(end.is_finite() && end >= 0.) {
                return Err(ConfigError::NonPositive { name: "association_end", value: end });
            }
        }
        if options.observation_times.is_empty() {
            return Err(ConfigError::NoObservations);
        }
        for &time in &options.observation_times {
            if !(0. ..=options.stop_time).contains(&time) {
                return Err(ConfigError::ObservationOutOfRange {
                    time,
                    stop_time: options.stop_time,
                });
            }
        }
        for pair in options.observation_times.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ConfigError::NotAscending { previous: pair[0], next: pair[1] });
            }
        }

        let domain_length = match options.domain_length {
            Some(length) => length,
            None => {
                ensure_positive("antigen_concentration", antigen_concentration)?;
                domain_length_from_density(
                    options.particles,
                    antigen_concentration,
                    options.dimension,
                )
            }
        };
        ensure_positive("domain_length", domain_length)?;

        if let InitialPositions::Fixed(positions) = &options.initial_positions {
            if positions.len() != options.particles {
                return Err(ConfigError::InitialPositions(format!(
                    "expected {} positions, found {}",
                    options.particles,
                    positions.len()
                )));
            }
            let outside = positions.iter().any(|p| {
                p.len() != options.dimension
                    || p.iter().any(|x| !(0. ..domain_length).contains(x))
            });
            if outside {
                return Err(ConfigError::InitialPositions(format!(
                    "every position must have {} coordinates in [0, {})",
                    options.dimension, domain_length
                )));
            }
        }
        Ok(RunConfig { options, domain_length })
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn domain_length(&self) -> f64 {
        self.domain_length
    }

    pub fn particles(&self) -> usize {
        self.options.particles
    }

    pub fn stop_time(&self) -> f64 {
        self.options.stop_time
    }

    pub fn association_end(&self) -> f64 {
        self.options.association_end.unwrap_or(f64::INFINITY)
    }

    pub fn observation_times(&self) -> &[f64] {
        &self.options.observation_times
    }

    pub fn repeats(&self) -> usize {
        self.options.repeats
    }

    pub fn dimension(&self) -> usize {
        self.options.dimension
    }

    pub fn diffusion(&self) -> f64 {
        self.options.diffusion
    }
}
