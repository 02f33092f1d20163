//! Transient thermal simulation of a chip floorplan

use crate::workload::{IndexLayout, InputPart, Workload};
use rand::rngs::StdRng;
use rand::Rng;

/// Maximum power density of the chip, W/m^2
const MAX_PD: f64 = 3.0e6;
/// Required precision, degrees
const PRECISION: f64 = 0.001;
const SPEC_HEAT_SI: f64 = 1.75e6;
const K_SI: f64 = 100.0;
/// Capacitance fitting factor
const FACTOR_CHIP: f64 = 0.5;

const T_CHIP: f64 = 0.0005;
const CHIP_HEIGHT: f64 = 0.016;
const CHIP_WIDTH: f64 = 0.016;
const AMB_TEMP: f64 = 80.0;

/// Explicit stencil over a `rows x cols` grid for `steps` time steps.
///
/// Input is the initial temperature grid followed by the power grid; the
/// output is the final temperature grid. Edges reuse the center cell for
/// missing neighbors.
#[derive(Debug, Clone)]
pub struct Hotspot {
    rows: usize,
    cols: usize,
    steps: usize,
}

#[derive(Debug, Clone, Copy)]
struct Coefficients {
    step_div_cap: f64,
    rx_1: f64,
    ry_1: f64,
    rz_1: f64,
}

impl Hotspot {
    pub fn new(rows: usize, cols: usize, steps: usize) -> Self {
        Self { rows, cols, steps }
    }

    fn cells(&self) -> usize {
        self.rows * self.cols
    }

    fn coefficients(&self) -> Coefficients {
        let grid_height = CHIP_HEIGHT / self.rows as f64;
        let grid_width = CHIP_WIDTH / self.cols as f64;

        let cap = FACTOR_CHIP * SPEC_HEAT_SI * T_CHIP * grid_width * grid_height;
        let rx = grid_width / (2.0 * K_SI * T_CHIP * grid_height);
        let ry = grid_height / (2.0 * K_SI * T_CHIP * grid_width);
        let rz = T_CHIP / (K_SI * grid_height * grid_width);

        let max_slope = MAX_PD / (FACTOR_CHIP * T_CHIP * SPEC_HEAT_SI);
        let step = PRECISION / max_slope / 1000.0;

        Coefficients {
            step_div_cap: step / cap,
            rx_1: 1.0 / rx,
            ry_1: 1.0 / ry,
            rz_1: 1.0 / rz,
        }
    }
}

impl Workload for Hotspot {
    type Input = f64;
    type Output = f64;

    fn instance(&self) -> String {
        format!("hotspot_{}x{}_{}", self.rows, self.cols, self.steps)
    }

    fn input_len(&self) -> usize {
        2 * self.cells()
    }

    fn output_len(&self) -> usize {
        self.cells()
    }

    fn index_layout(&self) -> IndexLayout {
        IndexLayout::Grid { cols: self.cols }
    }

    fn input_parts(&self) -> Vec<InputPart> {
        let instance = self.instance();
        vec![
            InputPart::new(format!("{}_temp.bin", instance), self.cells()),
            InputPart::new(format!("{}_power.bin", instance), self.cells()),
        ]
    }

    fn compute(&self, input: &[f64]) -> Vec<f64> {
        let (rows, cols) = (self.rows, self.cols);
        let (temp, power) = input.split_at(self.cells());
        let c = self.coefficients();

        let mut current = temp.to_vec();
        let mut next = vec![0.0f64; self.cells()];

        for _ in 0..self.steps {
            for r in 0..rows {
                for col in 0..cols {
                    let at = r * cols + col;
                    let center = current[at];
                    let north = if r > 0 { current[at - cols] } else { center };
                    let south = if r + 1 < rows { current[at + cols] } else { center };
                    let west = if col > 0 { current[at - 1] } else { center };
                    let east = if col + 1 < cols { current[at + 1] } else { center };

                    let delta = c.step_div_cap
                        * (power[at]
                            + (north + south - 2.0 * center) * c.ry_1
                            + (east + west - 2.0 * center) * c.rx_1
                            + (AMB_TEMP - center) * c.rz_1);
                    next[at] = center + delta;
                }
            }
            std::mem::swap(&mut current, &mut next);
        }
        current
    }

    fn generate_input(&self, rng: &mut StdRng) -> Vec<f64> {
        let cells = self.cells();
        let mut input = Vec::with_capacity(2 * cells);
        input.extend((0..cells).map(|_| rng.gen_range(323.0..343.0)));
        input.extend((0..cells).map(|_| rng.gen_range(0.0..1.0e-3)));
        input
    }
}
