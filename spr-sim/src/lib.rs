//! Event-driven stochastic simulator of antigen occupancy in a
//! surface-plasmon-resonance flow cell.
//!
//! Every antigen is a particle diffusing in a periodic box and switching
//! between three species: free, bound by a monovalent antibody arm, and
//! crosslinked by a bivalent antibody bridging two antigens. Reaction times
//! are sampled with the next-reaction variant of the Gillespie algorithm:
//! each particle owns a pending event time stored in an indexed min-heap.
//!
//! # Simulation example
//! ```no_run
//! use spr_sim::ensemble::{Ensemble, Parallel};
//! use spr_sim::outputter::{Outputter, TotalBound};
//! use spr_sim::{CancelToken, ReactionRatesBuilder, RunConfig, RunOptionsBuilder, Seed};
//!
//! let rates = ReactionRatesBuilder::default()
//!     .kon(0.5)
//!     .koff(0.01)
//!     .konb(0.1)
//!     .reach(5.)
//!     .antigen_concentration(125.236)
//!     .build()
//!     .unwrap();
//! let times: Vec<f64> = (0..50).map(|i| i as f64 * 12.).collect();
//! let options = RunOptionsBuilder::default()
//!     .particles(100usize)
//!     .stop_time(600.)
//!     .observation_times(times.clone())
//!     .repeats(10usize)
//!     .build()
//!     .unwrap();
//! let config = RunConfig::new(options, rates.antigen_concentration).unwrap();
//!
//! let mut outputter = Outputter::from(TotalBound::new(&times));
//! Ensemble::new(&rates, &config, Seed::default(), Parallel::True)
//!     .run(&mut outputter, &CancelToken::default())
//!     .unwrap();
//! println!("{:?}", outputter.means());
//! ```
pub mod config;
pub mod ensemble;
pub mod error;
pub mod event;
pub mod outputter;
pub mod particle;
pub mod rate;
pub mod run;

use std::{
    fs,
    io::{self, BufWriter, Write},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};

#[doc(inline)]
pub use crate::config::{InitialPositions, RunConfig, RunOptions, RunOptionsBuilder};
#[doc(inline)]
pub use crate::error::{ConfigError, SimulationError};
#[doc(inline)]
pub use crate::rate::{ReactionRates, ReactionRatesBuilder};

#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

/// Number of particles of one species.
pub type NbParticles = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed(u64);

impl Seed {
    pub fn new(seed: u64) -> Self {
        Seed(seed)
    }

    pub fn get_seed(&self) -> &u64 {
        &self.0
    }
}

impl Default for Seed {
    fn default() -> Self {
        Seed(26u64)
    }
}

/// Cooperative cancellation flag shared between a driver and the runs it
/// launched. Runs poll it once per particle event.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub fn write2file<T: std::fmt::Display>(
    data: &[T],
    path: &Path,
    header: Option<&str>,
    endline: bool,
) -> io::Result<()> {
    //! Append `data` to `path` as comma-separated values with a precision of
    //! 4 decimals. Write NAN if the slice is empty.
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let f = fs::OpenOptions::new().append(true).create(true).open(path)?;
    let mut buffer = BufWriter::new(f);
    if let Some(h) = header {
        writeln!(buffer, "{}", h)?;
    }
    match data.split_first() {
        Some((first, rest)) => {
            write!(buffer, "{:.4}", first)?;
            for ele in rest {
                write!(buffer, ",{:.4}", ele)?;
            }
        }
        None => write!(buffer, "{}", f64::NAN)?,
    }
    if endline {
        writeln!(buffer)?;
    }
    buffer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write2file_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curves").join("mean.csv");
        write2file(&[1f64, 2.5], &path, Some("t0,t1"), true).unwrap();
        write2file(&[3f64, 4.], &path, None, true).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, "t0,t1\n1.0000,2.5000\n3.0000,4.0000\n");
    }

    #[test]
    fn write2file_empty_writes_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        write2file::<f64>(&[], &path, None, false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "NaN");
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::default();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
