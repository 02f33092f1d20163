//! Memory retention test: fill, dwell, read back

use crate::workload::{PayloadMode, Workload};
use rand::rngs::StdRng;
use std::hint::black_box;

/// Fills `len` bytes with a pattern, idles for `dwell` spins and returns the
/// buffer as read back.
///
/// The input is the single pattern byte. Mismatches carry the XOR syndrome so
/// the flipped bits are visible directly.
#[derive(Debug, Clone)]
pub struct Retention {
    len: usize,
    pattern: u8,
    dwell: usize,
}

impl Retention {
    pub fn new(len: usize, pattern: u8, dwell: usize) -> Self {
        Self { len, pattern, dwell }
    }
}

impl Workload for Retention {
    type Input = u8;
    type Output = u8;

    fn instance(&self) -> String {
        format!("retention_{}_{:02x}", self.len, self.pattern)
    }

    fn input_len(&self) -> usize {
        1
    }

    fn output_len(&self) -> usize {
        self.len
    }

    fn payload_mode(&self) -> PayloadMode {
        PayloadMode::Syndrome
    }

    fn compute(&self, input: &[u8]) -> Vec<u8> {
        let pattern = input.first().copied().unwrap_or(self.pattern);
        let buffer = black_box(vec![pattern; self.len]);
        for spin in 0..self.dwell {
            black_box(spin);
        }
        buffer.iter().map(|&b| black_box(b)).collect()
    }

    fn generate_input(&self, _rng: &mut StdRng) -> Vec<u8> {
        vec![self.pattern]
    }
}
