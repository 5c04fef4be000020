use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use spr_data::AlignedData;
use spr_fit::{fit, Budget, SearchBox, Snes};
use spr_sim::ensemble::{Curve, Ensemble, Parallel};
use spr_sim::outputter::Outputter;
use spr_sim::{write2file, CancelToken, ReactionRates, RunConfig, RunOptions, Seed};
use spr_surrogate::{builder, Surrogate, SurrogateParams};

pub trait Task {
    fn run(self: Box<Self>) -> anyhow::Result<()>;
}

pub struct SimulateApp {
    pub rates: ReactionRates,
    pub options: RunOptions,
    pub outputter: Outputter,
    pub seed: Seed,
    pub parallel: Parallel,
    pub path2dir: PathBuf,
    pub verbosity: u8,
}

impl Task for SimulateApp {
    fn run(mut self: Box<Self>) -> anyhow::Result<()> {
        let config = RunConfig::new(self.options.clone(), self.rates.antigen_concentration)
            .with_context(|| "Invalid run configuration")?;
        if self.verbosity > 0 {
            println!(
                "{} Simulating {} particles in a box of side {:.3}",
                Utc::now(),
                config.particles(),
                config.domain_length()
            );
        }
        Ensemble::new(&self.rates, &config, self.seed, self.parallel)
            .with_verbosity(self.verbosity)
            .run(&mut self.outputter, &CancelToken::default())
            .with_context(|| "Cannot simulate the ensemble")?;

        self.outputter
            .save(&self.path2dir)
            .with_context(|| format!("Cannot save the results in {:#?}", self.path2dir))?;
        let curve = Curve::from(&self.outputter);
        write2file(&curve.times, &self.path2dir.join("times.csv"), None, false)?;
        write2file(
            &curve.response(self.rates.cp),
            &self.path2dir.join("response.csv"),
            None,
            false,
        )?;
        println!("{} Saved the results in {:#?}", Utc::now(), self.path2dir);
        Ok(())
    }
}

pub struct SurrogateApp {
    pub params: SurrogateParams,
    pub parallel: Parallel,
    pub output: PathBuf,
    pub verbosity: u8,
}

impl Task for SurrogateApp {
    fn run(self: Box<Self>) -> anyhow::Result<()> {
        println!("{} Building the surrogate", Utc::now());
        let surrogate =
            builder::build(&self.params, self.parallel, &CancelToken::default(), self.verbosity)
                .with_context(|| "Cannot build the surrogate")?;
        surrogate
            .save(&self.output, self.verbosity)
            .with_context(|| format!("Cannot save the surrogate in {:#?}", self.output))?;
        println!("{} Saved the surrogate in {:#?}", Utc::now(), self.output);
        Ok(())
    }
}

pub struct FitApp {
    pub path2surrogate: PathBuf,
    pub path2data: PathBuf,
    pub antigen: Option<f64>,
    pub log_cp: (f64, f64),
    pub optimizer: Snes,
    pub generations: usize,
    pub timeout: Option<Duration>,
    pub path2report: PathBuf,
    pub verbosity: u8,
}

impl Task for FitApp {
    fn run(self: Box<Self>) -> anyhow::Result<()> {
        let surrogate = Surrogate::load(&self.path2surrogate, self.verbosity)
            .with_context(|| format!("Cannot load the surrogate {:#?}", self.path2surrogate))?;
        let data = AlignedData::load(&self.path2data, self.antigen, self.verbosity)?;
        let bounds = SearchBox::fitting(&surrogate, &data, self.log_cp)
            .with_context(|| "The surrogate cannot cover every concentration of the data")?;
        let budget = Budget {
            max_generations: self.generations,
            deadline: self.timeout.map(|timeout| Instant::now() + timeout),
        };

        println!("{} Starting the fit", Utc::now());
        let report = fit(
            &self.optimizer,
            &surrogate,
            &data,
            &bounds,
            &budget,
            &CancelToken::default(),
            self.verbosity,
        )?;
        println!(
            "{} End of the fit after {} generations ({:?}) with error {:.6e}",
            Utc::now(),
            report.optimum.generations,
            report.optimum.stop_reason,
            report.optimum.error
        );
        println!("{:#?}", report.physical);
        report
            .save(&self.path2report)
            .with_context(|| format!("Cannot save the report in {:#?}", self.path2report))?;
        Ok(())
    }
}
