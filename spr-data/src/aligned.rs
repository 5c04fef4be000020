use anyhow::{bail, ensure, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// The response curve measured at one antibody concentration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Series {
    /// Antibody concentration in solution (nM)
    pub concentration: f64,
    /// Strictly ascending times (s)
    pub times: Vec<f64>,
    /// Response (RU) at each time
    pub responses: Vec<f64>,
}

impl Series {
    pub fn new(concentration: f64, times: Vec<f64>, responses: Vec<f64>) -> anyhow::Result<Self> {
        let series = Series { concentration, times, responses };
        series.validate()?;
        Ok(series)
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.concentration.is_finite() && self.concentration > 0.,
            "antibody concentration must be positive, found {}",
            self.concentration
        );
        ensure!(!self.times.is_empty(), "found empty series at {} nM", self.concentration);
        ensure!(
            self.times.len() == self.responses.len(),
            "found {} times but {} responses at {} nM",
            self.times.len(),
            self.responses.len(),
            self.concentration
        );
        ensure!(
            self.times.windows(2).all(|w| w[0] < w[1]),
            "times must be strictly ascending at {} nM",
            self.concentration
        );
        ensure!(
            self.times.iter().chain(&self.responses).all(|x| x.is_finite()),
            "found non-finite values at {} nM",
            self.concentration
        );
        Ok(())
    }
}

/// One row of the long-format CSV: `concentration,time,response`.
#[derive(Debug, Deserialize)]
struct Record {
    concentration: f64,
    time: f64,
    response: f64,
}

/// Response curves of several antibody concentrations over the same
/// immobilized antigen. The first series is the reference concentration at
/// which the association rate is fitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignedData {
    series: Vec<Series>,
    /// Antigen concentration on the chip (µM)
    antigen_concentration: f64,
}

impl AlignedData {
    pub fn new(series: Vec<Series>, antigen_concentration: f64) -> anyhow::Result<Self> {
        let data = AlignedData { series, antigen_concentration };
        data.validate()?;
        Ok(data)
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.series.is_empty(), "at least one series is required");
        ensure!(
            self.antigen_concentration.is_finite() && self.antigen_concentration > 0.,
            "antigen concentration must be positive, found {}",
            self.antigen_concentration
        );
        for series in self.series.iter() {
            series.validate()?;
        }
        Ok(())
    }

    pub fn series(&self) -> &[Series] {
        &self.series
    }

    pub fn antigen_concentration(&self) -> f64 {
        self.antigen_concentration
    }

    pub fn reference_concentration(&self) -> f64 {
        self.series[0].concentration
    }

    pub fn concentrations(&self) -> Vec<f64> {
        self.series.iter().map(|s| s.concentration).collect()
    }

    pub fn nb_points(&self) -> usize {
        self.series.iter().map(|s| s.times.len()).sum()
    }

    pub fn load(
        path: &Path,
        antigen_concentration: Option<f64>,
        verbosity: u8,
    ) -> anyhow::Result<Self> {
        //! Load the data from a JSON file (serialized [`AlignedData`]) or
        //! from a long-format CSV with header `concentration,time,response`.
        //! The antigen concentration is required for CSV files and overrides
        //! the one stored in JSON files.
        if verbosity > 0 {
            println!("Loading experimental data from {:#?}", path);
        }
        let mut data = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                let data: AlignedData = serde_json::from_str(
                    &fs::read_to_string(path)
                        .with_context(|| format!("Cannot read data from {:#?}", path))?,
                )
                .with_context(|| format!("Cannot deserialize data from {:#?}", path))?;
                data
            }
            Some("csv") => {
                let antigen = antigen_concentration.with_context(|| {
                    format!("The antigen concentration is required to load {:#?}", path)
                })?;
                AlignedData::from_csv(path, antigen)?
            }
            _ => bail!("Extension of {:#?} not recognized, expected json or csv", path),
        };
        if let Some(antigen) = antigen_concentration {
            data.antigen_concentration = antigen;
        }
        data.validate().with_context(|| format!("Invalid data in {:#?}", path))?;
        if verbosity > 1 {
            println!("{:#?}", data.concentrations());
        }
        Ok(data)
    }

    fn from_csv(path: &Path, antigen_concentration: f64) -> anyhow::Result<Self> {
        //! Series appear in the order of their first row.
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Cannot read csv from {:#?}", path))?;
        let mut series: Vec<Series> = Vec::new();
        for record in reader.deserialize() {
            let record: Record =
                record.with_context(|| format!("Cannot parse row of {:#?}", path))?;
            match series.iter_mut().find(|s| s.concentration == record.concentration) {
                Some(s) => {
                    s.times.push(record.time);
                    s.responses.push(record.response);
                }
                None => series.push(Series {
                    concentration: record.concentration,
                    times: vec![record.time],
                    responses: vec![record.response],
                }),
            }
        }
        AlignedData::new(series, antigen_concentration)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let data = serde_json::to_string(self).with_context(|| "Cannot serialize the data")?;
        fs::write(path, data).with_context(|| format!("Cannot write to file {:#?}", path))
    }
}
