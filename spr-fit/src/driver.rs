//! Fit of the surrogate to the data and conversion of the optimum to
//! physical units.
use std::fs;
use std::io;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use spr_data::AlignedData;
use spr_sim::CancelToken;
use spr_surrogate::Surrogate;

use crate::objective::{ObjectiveContext, SearchBox, NB_PARAMETERS};
use crate::optimizer::{Budget, GlobalOptimizer, OptimumFound};
use crate::physical::PhysicalParameters;
use crate::FitError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub optimizer: String,
    pub optimum: OptimumFound,
    pub physical: PhysicalParameters,
    pub bounds: SearchBox,
    /// Antibody concentration (nM) at which kon was fitted
    pub reference_concentration: f64,
    /// Antigen concentration (µM) of the surrogate
    pub surrogate_antigen_concentration: f64,
    /// Antigen concentration (µM) of the experiment
    pub antigen_concentration: f64,
}

impl FitReport {
    pub fn best(&self) -> [f64; NB_PARAMETERS] {
        std::array::from_fn(|i| self.optimum.best[i])
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let report = serde_json::to_string_pretty(self).map_err(io::Error::from)?;
        fs::write(path, report)
    }
}

pub fn fit<O: GlobalOptimizer>(
    optimizer: &O,
    surrogate: &Surrogate,
    data: &AlignedData,
    bounds: &SearchBox,
    budget: &Budget,
    cancel: &CancelToken,
    verbosity: u8,
) -> Result<FitReport, FitError> {
    //! Minimize the distance between the surrogate and the data over
    //! `bounds`. The bounds are checked against the surrogate before the
    //! first evaluation.
    let context = ObjectiveContext::new(surrogate, data, bounds)?;
    if verbosity > 0 {
        println!(
            "{} Fitting {} series ({} points) with {}",
            Utc::now(),
            data.series().len(),
            data.nb_points(),
            optimizer.name()
        );
    }
    let objective = |x: &[f64]| -> Result<f64, FitError> {
        let params: [f64; NB_PARAMETERS] = x
            .try_into()
            .map_err(|_| {
                FitError::InvalidBounds(format!("expected {} parameters", NB_PARAMETERS))
            })?;
        context.evaluate(&params)
    };
    let optimum = optimizer.minimize(&objective, bounds, budget, cancel)?;

    let best: [f64; NB_PARAMETERS] = std::array::from_fn(|i| optimum.best[i]);
    let physical = PhysicalParameters::from_fit(
        &best,
        data.reference_concentration(),
        surrogate.reference_antigen_concentration(),
        data.antigen_concentration(),
    );
    if verbosity > 0 {
        println!("{} Best fit {:?} with error {:.6e}", Utc::now(), best, optimum.error);
        println!("{:#?}", physical);
    }
    Ok(FitReport {
        optimizer: optimizer.name().to_string(),
        optimum,
        physical,
        bounds: *bounds,
        reference_concentration: data.reference_concentration(),
        surrogate_antigen_concentration: surrogate.reference_antigen_concentration(),
        antigen_concentration: data.antigen_concentration(),
    })
}
