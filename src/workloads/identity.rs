//! Identity kernel: output equals input

use crate::workload::Workload;
use rand::rngs::StdRng;
use rand::Rng;

/// Copies its `f64` input; the golden output is the input itself
#[derive(Debug, Clone)]
pub struct Identity {
    len: usize,
}

impl Identity {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl Workload for Identity {
    type Input = f64;
    type Output = f64;

    fn instance(&self) -> String {
        format!("identity_{}", self.len)
    }

    fn input_len(&self) -> usize {
        self.len
    }

    fn output_len(&self) -> usize {
        self.len
    }

    fn compute(&self, input: &[f64]) -> Vec<f64> {
        input.to_vec()
    }

    fn generate_input(&self, rng: &mut StdRng) -> Vec<f64> {
        (0..self.len).map(|_| rng.gen_range(-1.0e3..1.0e3)).collect()
    }
}
