//! Pairwise particle potentials and forces over a 3-D box grid

use crate::element::FourVector;
use crate::workload::{InputPart, Workload};
use rand::rngs::StdRng;
use rand::Rng;

/// Particles held by every box
pub const PARTICLES_PER_BOX: usize = 100;

/// N-body interaction of particles in `boxes1d^3` boxes.
///
/// Every particle interacts with each particle of its home box and of the
/// up-to-26 adjacent boxes. Input is the position records (`v, x, y, z` per
/// particle) followed by one charge per particle.
#[derive(Debug, Clone)]
pub struct LavaMd {
    boxes1d: usize,
    alpha: f64,
}

impl LavaMd {
    pub fn new(boxes1d: usize, alpha: f64) -> Self {
        Self { boxes1d, alpha }
    }

    fn boxes(&self) -> usize {
        self.boxes1d * self.boxes1d * self.boxes1d
    }

    fn particles(&self) -> usize {
        self.boxes() * PARTICLES_PER_BOX
    }

    /// Home box first, then neighbors in z, y, x order
    fn interacting_boxes(&self, home: usize) -> Vec<usize> {
        let b = self.boxes1d as isize;
        let (z, y, x) = (
            (home / (self.boxes1d * self.boxes1d)) as isize,
            ((home / self.boxes1d) % self.boxes1d) as isize,
            (home % self.boxes1d) as isize,
        );

        let mut boxes = vec![home];
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if dz == 0 && dy == 0 && dx == 0 {
                        continue;
                    }
                    let (nz, ny, nx) = (z + dz, y + dy, x + dx);
                    if (0..b).contains(&nz) && (0..b).contains(&ny) && (0..b).contains(&nx) {
                        boxes.push((nz * b * b + ny * b + nx) as usize);
                    }
                }
            }
        }
        boxes
    }
}

fn position(rv: &[f64], i: usize) -> FourVector {
    FourVector {
        v: rv[4 * i],
        x: rv[4 * i + 1],
        y: rv[4 * i + 2],
        z: rv[4 * i + 3],
    }
}

impl Workload for LavaMd {
    type Input = f64;
    type Output = FourVector;

    fn instance(&self) -> String {
        format!("lavamd_{}", self.boxes1d)
    }

    fn input_len(&self) -> usize {
        5 * self.particles()
    }

    fn output_len(&self) -> usize {
        self.particles()
    }

    fn input_parts(&self) -> Vec<InputPart> {
        let instance = self.instance();
        vec![
            InputPart::new(format!("{}_distance.bin", instance), 4 * self.particles()),
            InputPart::new(format!("{}_charge.bin", instance), self.particles()),
        ]
    }

    fn compute(&self, input: &[f64]) -> Vec<FourVector> {
        let (rv, qv) = input.split_at(4 * self.particles());
        let a2 = 2.0 * self.alpha * self.alpha;
        let mut fv = vec![FourVector::default(); self.particles()];

        for home in 0..self.boxes() {
            let home_offset = home * PARTICLES_PER_BOX;
            for other in self.interacting_boxes(home) {
                let other_offset = other * PARTICLES_PER_BOX;

                for i in home_offset..home_offset + PARTICLES_PER_BOX {
                    let ri = position(rv, i);
                    let fi = &mut fv[i];
                    for j in other_offset..other_offset + PARTICLES_PER_BOX {
                        let rj = position(rv, j);
                        let dot = ri.x * rj.x + ri.y * rj.y + ri.z * rj.z;
                        let r2 = ri.v + rj.v - dot;
                        let vij = (-a2 * r2).exp();
                        let fs = 2.0 * vij;
                        let q = qv[j];

                        fi.v += q * vij;
                        fi.x += q * fs * (ri.x - rj.x);
                        fi.y += q * fs * (ri.y - rj.y);
                        fi.z += q * fs * (ri.z - rj.z);
                    }
                }
            }
        }
        fv
    }

    fn generate_input(&self, rng: &mut StdRng) -> Vec<f64> {
        // Tenths in (0, 1]
        (0..self.input_len())
            .map(|_| rng.gen_range(1..=10) as f64 / 10.0)
            .collect()
    }
}
