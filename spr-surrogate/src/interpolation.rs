//! Multilinear interpolation over the five axes of the table.
use crate::SurrogateError;

pub const NB_AXES: usize = 5;

/// Piecewise-multilinear interpolant of a dense row-major table, the last
/// axis varying fastest. Exact at every node.
#[derive(Clone, Debug, PartialEq)]
pub struct Multilinear {
    shape: [usize; NB_AXES],
    strides: [usize; NB_AXES],
    table: Vec<f64>,
}

impl Multilinear {
    pub fn new(shape: [usize; NB_AXES], table: Vec<f64>) -> Result<Self, SurrogateError> {
        if shape.iter().any(|&n| n < 2) {
            return Err(SurrogateError::CorruptArtifact(format!(
                "every axis needs at least 2 nodes, found shape {:?}",
                shape
            )));
        }
        let expected: usize = shape.iter().product();
        if table.len() != expected {
            return Err(SurrogateError::CorruptArtifact(format!(
                "shape {:?} requires {} values, found {}",
                shape,
                expected,
                table.len()
            )));
        }
        let mut strides = [1; NB_AXES];
        for axis in (0..NB_AXES - 1).rev() {
            strides[axis] = strides[axis + 1] * shape[axis + 1];
        }
        Ok(Multilinear { shape, strides, table })
    }

    pub fn shape(&self) -> [usize; NB_AXES] {
        self.shape
    }

    pub fn table(&self) -> &[f64] {
        &self.table
    }

    pub fn at_node(&self, node: [usize; NB_AXES]) -> f64 {
        let offset: usize = node.iter().zip(self.strides).map(|(i, s)| i * s).sum();
        self.table[offset]
    }

    pub fn evaluate(&self, index: [f64; NB_AXES]) -> f64 {
        //! Interpolate at the fractional grid index `index`, clamped to the
        //! grid.
        let mut lower = [0usize; NB_AXES];
        let mut frac = [0f64; NB_AXES];
        for axis in 0..NB_AXES {
            let last = (self.shape[axis] - 1) as f64;
            let x = index[axis].clamp(0., last);
            // the last node is reached from the cell below it
            let cell = (x.floor() as usize).min(self.shape[axis] - 2);
            lower[axis] = cell;
            frac[axis] = x - cell as f64;
        }

        let mut value = 0.;
        for corner in 0..(1usize << NB_AXES) {
            let mut weight = 1.;
            let mut offset = 0;
            for axis in 0..NB_AXES {
                let upper = (corner >> axis) & 1;
                weight *= if upper == 1 { frac[axis] } else { 1. - frac[axis] };
                offset += (lower[axis] + upper) * self.strides[axis];
            }
            if weight != 0. {
                value += weight * self.table[offset];
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};

    #[derive(Clone, Debug)]
    struct Table {
        shape: [usize; NB_AXES],
        values: Vec<f64>,
    }

    impl Arbitrary for Table {
        fn arbitrary(g: &mut Gen) -> Self {
            let mut shape = [2; NB_AXES];
            for n in shape.iter_mut() {
                *n = 2 + usize::arbitrary(g) % 3;
            }
            let len: usize = shape.iter().product();
            let values = (0..len).map(|_| i16::arbitrary(g) as f64 / 8.).collect();
            Table { shape, values }
        }
    }

    #[quickcheck]
    fn reproduces_every_node(table: Table) -> bool {
        let interpolant = Multilinear::new(table.shape, table.values).unwrap();
        let shape = interpolant.shape();
        let total: usize = shape.iter().product();
        (0..total).all(|flat| {
            let mut rest = flat;
            let mut node = [0usize; NB_AXES];
            for axis in (0..NB_AXES).rev() {
                node[axis] = rest % shape[axis];
                rest /= shape[axis];
            }
            let index = node.map(|i| i as f64);
            interpolant.evaluate(index) == interpolant.at_node(node)
        })
    }

    #[test]
    fn exact_on_affine_functions() {
        let shape = [3, 2, 2, 4, 5];
        let f = |x: [f64; NB_AXES]| 1. + 2. * x[0] - x[1] + 0.5 * x[2] + 3. * x[3] - 0.25 * x[4];
        let mut table = Vec::new();
        for a in 0..3 {
            for b in 0..2 {
                for c in 0..2 {
                    for d in 0..4 {
                        for e in 0..5 {
                            table.push(f([a as f64, b as f64, c as f64, d as f64, e as f64]));
                        }
                    }
                }
            }
        }
        let interpolant = Multilinear::new(shape, table).unwrap();
        let x = [1.3, 0.25, 0.9, 2.6, 3.75];
        assert!((interpolant.evaluate(x) - f(x)).abs() < 1e-12);
    }

    #[test]
    fn wrong_table_size() {
        assert!(matches!(
            Multilinear::new([2; NB_AXES], vec![0.; 31]),
            Err(SurrogateError::CorruptArtifact(_))
        ));
    }
}
