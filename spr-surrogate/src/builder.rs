//! Sweep of the simulator over the nodes of the parameter grid.
use chrono::Utc;
use indicatif::ParallelProgressIterator;
use rayon::prelude::{IntoParallelIterator, ParallelIterator};
use spr_sim::ensemble::{Ensemble, Parallel};
use spr_sim::outputter::{Outputter, TotalBound};
use spr_sim::{
    CancelToken, ReactionRates, ReactionRatesBuilder, RunConfig, Seed, SimulationError,
};

use crate::{Surrogate, SurrogateError, SurrogateParams};

pub fn node_rates(
    coords: [f64; 4],
    antigen_concentration: f64,
) -> Result<ReactionRates, SimulationError> {
    //! Physical rates of a grid node: the first three coordinates are log10
    //! of the rates, the last one is the reach.
    let [log_kon, log_koff, log_konb, reach] = coords;
    let rates = ReactionRatesBuilder::default()
        .kon(10f64.powf(log_kon))
        .koff(10f64.powf(log_koff))
        .konb(10f64.powf(log_konb))
        .reach(reach)
        .antigen_concentration(antigen_concentration)
        .build()?;
    Ok(rates)
}

pub fn run_config(params: &SurrogateParams) -> Result<RunConfig, SimulationError> {
    //! The configuration shared by every node, observing at each node of
    //! the time axis.
    let mut options = params.run.clone();
    options.observation_times = params.time.nodes();
    Ok(RunConfig::new(options, params.antigen_concentration)?)
}

/// Simulate the ensemble of a node. Node `n` uses the streams starting at
/// `n * repeats`, so the result only depends on the node and the parameters.
fn node_curve(
    params: &SurrogateParams,
    config: &RunConfig,
    node: usize,
    cancel: &CancelToken,
    verbosity: u8,
) -> Result<Vec<f64>, SimulationError> {
    let coords = params.node_coordinates(node);
    let rates = node_rates(coords, params.antigen_concentration)?;
    let mut outputter = Outputter::from(TotalBound::new(config.observation_times()));
    Ensemble::new(&rates, config, Seed::new(params.seed), Parallel::False)
        .with_stream_offset((node * config.repeats()) as u64)
        .run(&mut outputter, cancel)?;
    if verbosity > 1 {
        println!("{} Node {} at {:?} done", Utc::now(), node, coords);
    }
    Ok(outputter.means())
}

pub fn build(
    params: &SurrogateParams,
    parallel: Parallel,
    cancel: &CancelToken,
    verbosity: u8,
) -> Result<Surrogate, SurrogateError> {
    //! Run the simulator at every node of the grid and interpolate the mean
    //! numbers of bound antigens.
    params.validate()?;
    let config = run_config(params)?;
    let nb_nodes = params.nb_nodes();
    if verbosity > 0 {
        println!(
            "{} Building a surrogate of {} nodes with {} repeats each",
            Utc::now(),
            nb_nodes,
            config.repeats()
        );
    }

    let curves: Vec<Vec<f64>> = match parallel {
        Parallel::False => (0..nb_nodes)
            .map(|node| node_curve(params, &config, node, cancel, verbosity))
            .collect::<Result<_, _>>()?,
        Parallel::True => (0..nb_nodes)
            .into_par_iter()
            .progress_count(nb_nodes as u64)
            .map(|node| node_curve(params, &config, node, cancel, verbosity))
            .collect::<Result<_, _>>()?,
    };

    if verbosity > 0 {
        println!("{} End of the sweep", Utc::now());
    }
    Surrogate::from_table(params.clone(), curves.concat())
}
