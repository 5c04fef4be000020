use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Context};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use spr_fit::SnesBuilder;
use spr_sim::ensemble::Parallel;
use spr_sim::outputter::{Outputter, TotalA, TotalBound};
use spr_sim::{InitialPositions, ReactionRatesBuilder, RunOptions, RunOptionsBuilder, Seed};
use spr_surrogate::{Axis, SurrogateParams};

use crate::app::{FitApp, SimulateApp, SurrogateApp, Task};

#[derive(Debug, Parser)] // requires `derive` feature
#[command(name = "spr")]
#[command(
    about = "Stochastic kinetics of antibody-antigen binding in SPR experiments",
    long_about = "Simulate antigen occupancy with an event-driven reaction-diffusion model, tabulate the simulations into an interpolated surrogate and fit the binding rates of experimental SPR curves through it"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Simulate the mean and variance curves for some rates
    #[command(arg_required_else_help = true)]
    Simulate {
        /// Pseudo-first-order association rate Free → Bound
        #[arg(long, value_name = "RATE")]
        kon: f64,
        /// Dissociation rate Bound → Free
        #[arg(long, value_name = "RATE")]
        koff: f64,
        /// Crosslinking rate per free neighbour within reach
        #[arg(long, value_name = "RATE")]
        konb: f64,
        /// Max distance between crosslinked antigens (nm)
        #[arg(long, value_name = "NM")]
        reach: f64,
        /// Response units per bound antigen
        #[arg(long, default_value_t = 1.)]
        cp: f64,
        /// The quantity to record
        #[arg(long, value_enum, default_value_t = Observable::TotalBound)]
        observable: Observable,
        #[command(flatten)]
        run: RunArgs,
        #[command(flatten)]
        execution: ExecutionArgs,
        /// Path to store the results of the simulations
        #[arg(value_name = "DIR", value_parser = |path: &str| { let path_b = PathBuf::from(path); if path_b.is_dir() { Ok(path_b) } else { Err("Cannot find dir") }} ) ]
        path: PathBuf,
    },
    /// Simulate every node of a grid of parameters and save the surrogate
    #[command(arg_required_else_help = true)]
    Surrogate {
        /// Range of log10 kon
        #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true, default_values_t = [-3., 3.])]
        kon_range: Vec<f64>,
        /// Range of log10 koff
        #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true, default_values_t = [-4., 0.])]
        koff_range: Vec<f64>,
        /// Range of log10 konb
        #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true, default_values_t = [-3., 3.])]
        konb_range: Vec<f64>,
        /// Range of the reach (nm)
        #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], default_values_t = [0., 50.])]
        reach_range: Vec<f64>,
        /// Number of nodes of the kon, koff, konb and reach axes
        #[arg(long, num_args = 4, value_names = ["KON", "KOFF", "KONB", "REACH"], default_values_t = [5, 5, 5, 5])]
        resolution: Vec<usize>,
        #[command(flatten)]
        run: RunArgs,
        #[command(flatten)]
        execution: ExecutionArgs,
        /// Where to save the surrogate (gzip-compressed JSON)
        #[arg(value_name = "FILE")]
        output: PathBuf,
    },
    /// Fit experimental curves with a surrogate
    #[command(arg_required_else_help = true)]
    Fit {
        /// The surrogate created with the `surrogate` command
        #[arg(value_name = "SURROGATE")]
        surrogate: PathBuf,
        /// The experimental data, either JSON or CSV with header
        /// `concentration,time,response`. The first concentration is the
        /// reference one
        #[arg(value_name = "DATA", value_parser = |path: &str| { let path_b = PathBuf::from(path); match path_b.extension().and_then(|ext| ext.to_str()) { Some("json") | Some("csv") => Ok(path_b), _ => Err("Must be a JSON or CSV file") }} ) ]
        data: PathBuf,
        /// Antigen concentration of the experiment (µM), required for CSV
        #[arg(long, value_name = "MICROMOLAR")]
        antigen: Option<f64>,
        /// Range of log10 cp
        #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true, default_values_t = [-2., 2.])]
        cp_range: Vec<f64>,
        /// Max number of generations of the optimizer
        #[arg(long, default_value_t = 1000)]
        generations: usize,
        /// Stop the optimizer after this many seconds
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,
        /// Samples per generation
        #[arg(long)]
        population: Option<usize>,
        /// Where to save the report
        #[arg(long, value_name = "FILE", default_value = "fit.json")]
        report: PathBuf,
        /// Seed for reproducibility
        #[arg(long, default_value_t = 26)]
        seed: u64,
        #[arg(short, long, action = clap::ArgAction::Count, default_value_t = 0)]
        verbose: u8,
    },
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum Observable {
    /// Bound and crosslinked antigens
    TotalBound,
    /// Free antigens
    TotalA,
}

impl std::fmt::Display for Observable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_possible_value()
            .expect("no values are skipped")
            .get_name()
            .fmt(f)
    }
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Number of antigens to simulate
    #[arg(long, short, default_value_t = 1000)]
    particles: usize,
    /// Time at which each run stops (s)
    #[arg(long, default_value_t = 600.)]
    stop_time: f64,
    /// Time at which the antibody flow stops (s)
    #[arg(long)]
    association_end: Option<f64>,
    /// Number of uniform observation times between 0 and the stop time
    #[arg(long, default_value_t = 50)]
    times: usize,
    /// Antigen concentration on the chip (µM)
    #[arg(long, value_name = "MICROMOLAR", default_value_t = 125.236)]
    antigen: f64,
    /// Side of the box (nm), derived from the antigen concentration if not set
    #[arg(long)]
    domain_length: Option<f64>,
    /// Diffusion coefficient of the antigens (nm²/s)
    #[arg(long, default_value_t = 1.)]
    diffusion: f64,
    #[arg(long, default_value_t = 3)]
    dimension: usize,
    /// Start every repeat from the same random positions
    #[arg(long, action = ArgAction::SetTrue, default_value_t = false)]
    reuse_positions: bool,
    /// Number of independent realisations averaged per set of rates
    #[arg(short, long, default_value_t = 12)]
    repeats: usize,
}

#[derive(Debug, Args)]
struct ExecutionArgs {
    /// Seed for reproducibility
    #[arg(long, default_value_t = 26)]
    seed: u64,
    /// Triggers debug mode: max verbosity and sequential runs
    #[arg(short, long, action = ArgAction::SetTrue, default_value_t = false)]
    debug: bool,
    /// Run sequentially each run instead of using rayon for parallelisation
    #[arg(short, long, action = ArgAction::SetTrue, default_value_t = false, conflicts_with = "debug")]
    sequential: bool,
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "debug", default_value_t = 0)]
    verbose: u8,
}

impl ExecutionArgs {
    fn parallel(&self) -> Parallel {
        if self.debug || self.sequential {
            Parallel::False
        } else {
            Parallel::True
        }
    }

    fn verbosity(&self) -> u8 {
        if self.debug {
            u8::MAX
        } else {
            self.verbose
        }
    }
}

impl RunArgs {
    fn options(&self) -> anyhow::Result<RunOptions> {
        ensure!(self.times >= 2, "at least 2 observation times are required");
        let step = self.stop_time / (self.times - 1) as f64;
        let mut times: Vec<f64> = (0..self.times).map(|i| i as f64 * step).collect();
        times[self.times - 1] = self.stop_time;
        let mut builder = RunOptionsBuilder::default();
        builder
            .particles(self.particles)
            .stop_time(self.stop_time)
            .observation_times(times)
            .diffusion(self.diffusion)
            .dimension(self.dimension)
            .repeats(self.repeats);
        if let Some(end) = self.association_end {
            builder.association_end(end);
        }
        if let Some(length) = self.domain_length {
            builder.domain_length(length);
        }
        if self.reuse_positions {
            builder.initial_positions(InitialPositions::Reuse);
        }
        Ok(builder.build()?)
    }
}

fn axis(range: &[f64], size: usize, name: &str) -> anyhow::Result<Axis> {
    Axis::new(range[0], range[1], size).with_context(|| format!("Invalid {} axis", name))
}

impl Cli {
    pub fn build() -> anyhow::Result<Box<dyn Task>> {
        let args = Cli::parse();

        match args.command {
            Commands::Simulate { kon, koff, konb, reach, cp, observable, run, execution, path } => {
                let rates = ReactionRatesBuilder::default()
                    .kon(kon)
                    .koff(koff)
                    .konb(konb)
                    .reach(reach)
                    .cp(cp)
                    .antigen_concentration(run.antigen)
                    .build()
                    .with_context(|| "Invalid rates")?;
                let options = run.options()?;
                let outputter = match observable {
                    Observable::TotalBound => {
                        Outputter::from(TotalBound::new(&options.observation_times))
                    }
                    Observable::TotalA => Outputter::from(TotalA::new(&options.observation_times)),
                };
                Ok(Box::new(SimulateApp {
                    rates,
                    options,
                    outputter,
                    seed: Seed::new(execution.seed),
                    parallel: execution.parallel(),
                    path2dir: path,
                    verbosity: execution.verbosity(),
                }))
            }
            Commands::Surrogate {
                kon_range,
                koff_range,
                konb_range,
                reach_range,
                resolution,
                run,
                execution,
                output,
            } => {
                let time = Axis::new(0., run.stop_time, run.times)
                    .with_context(|| "Invalid time axis")?;
                let params = SurrogateParams::new(
                    [
                        axis(&kon_range, resolution[0], "kon")?,
                        axis(&koff_range, resolution[1], "koff")?,
                        axis(&konb_range, resolution[2], "konb")?,
                        axis(&reach_range, resolution[3], "reach")?,
                    ],
                    time,
                    run.antigen,
                    run.options()?,
                    execution.seed,
                )?;
                Ok(Box::new(SurrogateApp {
                    params,
                    parallel: execution.parallel(),
                    output,
                    verbosity: execution.verbosity(),
                }))
            }
            Commands::Fit {
                surrogate,
                data,
                antigen,
                cp_range,
                generations,
                timeout,
                population,
                report,
                seed,
                verbose,
            } => {
                let mut optimizer = SnesBuilder::default();
                optimizer.seed(seed).verbosity(verbose);
                if let Some(population) = population {
                    optimizer.population(population);
                }
                Ok(Box::new(FitApp {
                    path2surrogate: surrogate,
                    path2data: data,
                    antigen,
                    log_cp: (cp_range[0], cp_range[1]),
                    optimizer: optimizer.build()?,
                    generations,
                    timeout: timeout.map(Duration::from_secs),
                    path2report: report,
                    verbosity: verbose,
                }))
            }
        }
    }
}

