//! Particles, their species and the spatial index used to find the
//! crosslinking partners of a bound particle.
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::event::{Handle, SimTime};
use crate::rate::KineticRate;

/// The state of an antigen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Species {
    /// No antibody bound
    Free,
    /// One arm of an antibody bound
    Bound,
    /// Bridged to a second antigen by a bivalent antibody
    Crosslinked,
}

/// One antigen of the simulation, identified by its [`Handle`] (its index in
/// the particle arena).
#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    pub species: Species,
    pub position: Vec<f64>,
    /// Total outgoing rate used when the pending event was scheduled
    pub rate: KineticRate,
    /// Time at which `position` was last advanced
    pub moved_at: SimTime,
}

impl Particle {
    pub fn free(position: Vec<f64>) -> Self {
        Particle { species: Species::Free, position, rate: 0., moved_at: 0. }
    }
}

/// A D-dimensional box of side `side` with periodic boundaries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeriodicBox {
    pub side: f64,
    pub dimension: usize,
}

impl PeriodicBox {
    pub fn wrap(&self, x: f64) -> f64 {
        let wrapped = x.rem_euclid(self.side);
        // rem_euclid can round up to `side` for tiny negative inputs
        if wrapped >= self.side {
            0.
        } else {
            wrapped
        }
    }

    pub fn distance2(&self, a: &[f64], b: &[f64]) -> f64 {
        //! Squared minimum-image distance.
        a.iter()
            .zip(b)
            .map(|(x, y)| {
                let d = x - y;
                let d = d - self.side * (d / self.side).round();
                d * d
            })
            .sum()
    }

    pub fn sample_uniformly(&self, rng: &mut impl Rng) -> Vec<f64> {
        (0..self.dimension).map(|_| rng.gen_range(0.0..self.side)).collect()
    }
}

/// Uniform grid of cells over the periodic box. Every cell is at least
/// `reach` wide so that all the particles within `reach` of a point lie in
/// the cell of the point or in one of its adjacent cells.
#[derive(Clone, Debug)]
pub struct CellList {
    domain: PeriodicBox,
    cells_per_axis: usize,
    cell_side: f64,
    cells: Vec<Vec<Handle>>,
    cell_of: Vec<usize>,
}

impl CellList {
    pub fn new(domain: PeriodicBox, reach: f64, positions: &[Vec<f64>]) -> Self {
        // cap the number of cells to about one per particle
        let max_per_axis = (positions.len() as f64)
            .powf(1. / domain.dimension as f64)
            .ceil()
            .max(1.) as usize;
        let cells_per_axis = if reach > 0. {
            ((domain.side / reach).floor() as usize).clamp(1, max_per_axis)
        } else {
            max_per_axis
        };
        let nb_cells = cells_per_axis.pow(domain.dimension as u32);
        let mut list = CellList {
            domain,
            cells_per_axis,
            cell_side: domain.side / cells_per_axis as f64,
            cells: vec![Vec::new(); nb_cells],
            cell_of: Vec::with_capacity(positions.len()),
        };
        for (handle, position) in positions.iter().enumerate() {
            let cell = list.cell_index(position);
            list.cells[cell].push(handle);
            list.cell_of.push(cell);
        }
        list
    }

    pub fn cell_index(&self, position: &[f64]) -> usize {
        position.iter().rev().fold(0, |idx, x| {
            let coord = ((x / self.cell_side) as usize).min(self.cells_per_axis - 1);
            idx * self.cells_per_axis + coord
        })
    }

    pub fn relocate(&mut self, handle: Handle, position: &[f64]) {
        //! Move `handle` to the cell containing `position`.
        let new = self.cell_index(position);
        let old = self.cell_of[handle];
        if new != old {
            if let Some(slot) = self.cells[old].iter().position(|&h| h == handle) {
                self.cells[old].swap_remove(slot);
            }
            self.cells[new].push(handle);
            self.cell_of[handle] = new;
        }
    }

    pub fn candidates(&self, position: &[f64]) -> Vec<Handle> {
        //! All the particles in the cell of `position` and in its adjacent
        //! cells, wrapping around the periodic boundaries.
        let m = self.cells_per_axis as isize;
        let centre: Vec<isize> = position
            .iter()
            .map(|x| ((x / self.cell_side) as isize).min(m - 1))
            .collect();
        let dimension = self.domain.dimension as u32;
        let mut neighbourhood: Vec<usize> = (0..3usize.pow(dimension))
            .map(|offset| {
                let mut rest = offset;
                centre.iter().rev().fold(0usize, |idx, c| {
                    let shift = (rest % 3) as isize - 1;
                    rest /= 3;
                    idx * self.cells_per_axis + (c + shift).rem_euclid(m) as usize
                })
            })
            .collect();
        neighbourhood.sort_unstable();
        neighbourhood.dedup();
        neighbourhood
            .into_iter()
            .flat_map(|cell| self.cells[cell].iter().copied())
            .collect()
    }
}
