//! In-place LU decomposition (Doolittle, no pivoting)

use crate::workload::{IndexLayout, Workload};
use rand::rngs::StdRng;
use rand::Rng;

/// LU factorization of an `n x n` row-major matrix.
///
/// `L` (unit diagonal, implied) and `U` share the output buffer.
#[derive(Debug, Clone)]
pub struct Lud {
    n: usize,
}

impl Lud {
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl Workload for Lud {
    type Input = f64;
    type Output = f64;

    fn instance(&self) -> String {
        format!("lud_{}", self.n)
    }

    fn input_len(&self) -> usize {
        self.n * self.n
    }

    fn output_len(&self) -> usize {
        self.n * self.n
    }

    fn index_layout(&self) -> IndexLayout {
        IndexLayout::Grid { cols: self.n }
    }

    fn compute(&self, input: &[f64]) -> Vec<f64> {
        let n = self.n;
        let mut a = input.to_vec();

        for i in 0..n {
            for j in i..n {
                let mut sum = a[i * n + j];
                for k in 0..i {
                    sum -= a[i * n + k] * a[k * n + j];
                }
                a[i * n + j] = sum;
            }

            let pivot = a[i * n + i];
            for j in i + 1..n {
                let mut sum = a[j * n + i];
                for k in 0..i {
                    sum -= a[j * n + k] * a[k * n + i];
                }
                a[j * n + i] = sum / pivot;
            }
        }
        a
    }

    fn generate_input(&self, rng: &mut StdRng) -> Vec<f64> {
        // Diagonally dominant so no pivot vanishes
        let n = self.n;
        let mut a: Vec<f64> = (0..n * n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        for i in 0..n {
            a[i * n + i] += n as f64;
        }
        a
    }
}
