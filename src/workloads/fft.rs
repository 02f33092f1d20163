//! Radix-2 forward FFT of real single-precision samples

use crate::element::Complex32;
use crate::workload::Workload;
use rand::rngs::StdRng;
use rand::Rng;
use std::f64::consts::PI;

/// Sine/cosine waves mixed into generated samples
const WAVES: usize = 8;

/// Forward transform of `2^log2_len` real samples into complex bins
#[derive(Debug, Clone)]
pub struct Fft {
    log2_len: u32,
}

impl Fft {
    pub fn new(log2_len: u32) -> Self {
        Self { log2_len }
    }

    fn len(&self) -> usize {
        1 << self.log2_len
    }
}

fn reverse_bits(index: usize, bits: u32) -> usize {
    if bits == 0 {
        return 0;
    }
    index.reverse_bits() >> (usize::BITS - bits)
}

impl Workload for Fft {
    type Input = f32;
    type Output = Complex32;

    fn instance(&self) -> String {
        format!("fft_{}", self.len())
    }

    fn input_len(&self) -> usize {
        self.len()
    }

    fn output_len(&self) -> usize {
        self.len()
    }

    fn compute(&self, input: &[f32]) -> Vec<Complex32> {
        let n = self.len();
        let bits = self.log2_len;

        let mut re = vec![0.0f32; n];
        let mut im = vec![0.0f32; n];
        for (i, &sample) in input.iter().enumerate() {
            re[reverse_bits(i, bits)] = sample;
        }

        let mut block = 2;
        while block <= n {
            let half = block / 2;
            let step = -2.0 * PI / block as f64;
            for k in 0..half {
                let (sin, cos) = (step * k as f64).sin_cos();
                let (wr, wi) = (cos as f32, sin as f32);
                for start in (0..n).step_by(block) {
                    let a = start + k;
                    let b = a + half;
                    let tr = wr * re[b] - wi * im[b];
                    let ti = wr * im[b] + wi * re[b];
                    re[b] = re[a] - tr;
                    im[b] = im[a] - ti;
                    re[a] += tr;
                    im[a] += ti;
                }
            }
            block *= 2;
        }

        re.into_iter().zip(im).map(|(re, im)| Complex32::new(re, im)).collect()
    }

    fn generate_input(&self, rng: &mut StdRng) -> Vec<f32> {
        let waves: Vec<(f64, f64, bool)> = (0..WAVES)
            .map(|_| (rng.gen_range(0.0..1000.0), rng.gen_range(0.0..1000.0), rng.gen()))
            .collect();

        (0..self.len())
            .map(|i| {
                let t = i as f64;
                waves
                    .iter()
                    .map(|&(coeff, freq, use_cos)| {
                        if use_cos {
                            coeff * (freq * t).cos()
                        } else {
                            coeff * (freq * t).sin()
                        }
                    })
                    .sum::<f64>() as f32
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_gives_flat_spectrum() {
        let workload = Fft::new(3);
        let mut input = vec![0.0f32; 8];
        input[0] = 1.0;
        let out = workload.compute(&input);
        assert!(out.iter().all(|c| c.re == 1.0 && c.im == 0.0));
    }

    #[test]
    fn test_constant_signal_concentrates_in_dc() {
        let workload = Fft::new(4);
        let out = workload.compute(&[2.0f32; 16]);
        assert!((out[0].re - 32.0).abs() < 1e-4);
        for bin in &out[1..] {
            assert!(bin.re.abs() < 1e-4 && bin.im.abs() < 1e-4);
        }
    }

    #[test]
    fn test_bit_reversal() {
        assert_eq!(reverse_bits(1, 3), 4);
        assert_eq!(reverse_bits(6, 3), 3);
        assert_eq!(reverse_bits(0, 0), 0);
    }
}
