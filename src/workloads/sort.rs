//! Double-precision sort, reported as a mismatch count

use crate::workload::{PayloadMode, Workload};
use rand::rngs::StdRng;
use rand::Rng;

/// Ascending sort of `len` distances.
///
/// A single corrupted comparison shifts whole runs of elements, so this
/// workload reports one count per dirty iteration instead of every index.
#[derive(Debug, Clone)]
pub struct Sort {
    len: usize,
}

impl Sort {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl Workload for Sort {
    type Input = f64;
    type Output = f64;

    fn instance(&self) -> String {
        format!("sort_{}", self.len)
    }

    fn input_len(&self) -> usize {
        self.len
    }

    fn output_len(&self) -> usize {
        self.len
    }

    fn payload_mode(&self) -> PayloadMode {
        PayloadMode::Summary
    }

    fn compute(&self, input: &[f64]) -> Vec<f64> {
        let mut out = input.to_vec();
        out.sort_unstable_by(|a, b| a.total_cmp(b));
        out
    }

    fn generate_input(&self, rng: &mut StdRng) -> Vec<f64> {
        // Euclidean distances of random points in a 1000-unit cube
        (0..self.len)
            .map(|_| {
                let (x, y, z): (f64, f64, f64) = (rng.gen(), rng.gen(), rng.gen());
                1000.0 * (x * x + y * y + z * z).sqrt()
            })
            .collect()
    }
}
