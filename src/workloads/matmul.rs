//! Dense single-precision matrix product

use crate::workload::{IndexLayout, Workload};
use rand::rngs::StdRng;
use rand::Rng;

/// `C = A * B` for `n x n` row-major matrices.
///
/// The input is `A` followed by `B`, stored in one resource.
#[derive(Debug, Clone)]
pub struct MatMul {
    n: usize,
}

impl MatMul {
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl Workload for MatMul {
    type Input = f32;
    type Output = f32;

    fn instance(&self) -> String {
        format!("matmul_{}", self.n)
    }

    fn input_len(&self) -> usize {
        2 * self.n * self.n
    }

    fn output_len(&self) -> usize {
        self.n * self.n
    }

    fn index_layout(&self) -> IndexLayout {
        IndexLayout::Grid { cols: self.n }
    }

    fn compute(&self, input: &[f32]) -> Vec<f32> {
        let n = self.n;
        let (a, b) = input.split_at(n * n);
        let mut c = vec![0.0f32; n * n];

        for i in 0..n {
            let row = &a[i * n..(i + 1) * n];
            for j in 0..n {
                let mut acc = 0.0f32;
                for (k, &aik) in row.iter().enumerate() {
                    acc += aik * b[k * n + j];
                }
                c[i * n + j] = acc;
            }
        }
        c
    }

    fn generate_input(&self, rng: &mut StdRng) -> Vec<f32> {
        (0..self.input_len()).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_against_identity_matrix() {
        let workload = MatMul::new(3);
        let a = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let eye = vec![1.0f32, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let input: Vec<f32> = a.iter().chain(eye.iter()).copied().collect();
        assert_eq!(workload.compute(&input), a);
    }

    #[test]
    fn test_small_product() {
        let workload = MatMul::new(2);
        // [1 2; 3 4] * [5 6; 7 8] = [19 22; 43 50]
        let input = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        assert_eq!(workload.compute(&input), vec![19.0, 22.0, 43.0, 50.0]);
    }
}
