//! Reference workloads and their configuration
//!
//! The kernels are interchangeable behind [`Workload`]; a [`WorkloadSpec`]
//! names one instance and [`WorkloadSpec::dispatch`] monomorphizes the
//! harness for it.

pub mod fft;
pub mod hotspot;
pub mod identity;
pub mod lavamd;
pub mod lud;
pub mod matmul;
pub mod retention;
pub mod sort;

use crate::workload::Workload;
use serde::{Deserialize, Serialize};

pub use fft::Fft;
pub use hotspot::Hotspot;
pub use identity::Identity;
pub use lavamd::LavaMd;
pub use lud::Lud;
pub use matmul::MatMul;
pub use retention::Retention;
pub use sort::Sort;

/// Workload selection as written in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkloadSpec {
    /// Copy input to output
    Identity {
        #[serde(default = "default_identity_len")]
        len: usize,
    },
    /// Dense `n x n` single-precision product
    Matmul {
        #[serde(default = "default_matmul_n")]
        n: usize,
    },
    /// Double-precision sort, count-only reporting
    Sort {
        #[serde(default = "default_sort_len")]
        len: usize,
    },
    /// In-place LU decomposition
    Lud {
        #[serde(default = "default_lud_n")]
        n: usize,
    },
    /// Transient thermal simulation
    Hotspot {
        #[serde(default = "default_hotspot_dim")]
        rows: usize,
        #[serde(default = "default_hotspot_dim")]
        cols: usize,
        #[serde(default = "default_hotspot_steps")]
        steps: usize,
    },
    /// Pairwise particle potentials and forces over a box grid
    Lavamd {
        #[serde(default = "default_lavamd_boxes")]
        boxes1d: usize,
        #[serde(default = "default_lavamd_alpha")]
        alpha: f64,
    },
    /// Radix-2 forward FFT of real samples
    Fft {
        #[serde(default = "default_fft_log2")]
        log2_len: u32,
    },
    /// Memory retention pattern test
    Retention {
        #[serde(default = "default_retention_len")]
        len: usize,
        #[serde(default = "default_retention_pattern")]
        pattern: u8,
        #[serde(default = "default_retention_dwell")]
        dwell: usize,
    },
}

// Default functions for serde
fn default_identity_len() -> usize {
    1024
}

fn default_matmul_n() -> usize {
    128
}

fn default_sort_len() -> usize {
    100_000
}

fn default_lud_n() -> usize {
    256
}

fn default_hotspot_dim() -> usize {
    256
}

fn default_hotspot_steps() -> usize {
    100
}

fn default_lavamd_boxes() -> usize {
    2
}

fn default_lavamd_alpha() -> f64 {
    0.5
}

fn default_fft_log2() -> u32 {
    16
}

fn default_retention_len() -> usize {
    32 * 1024
}

fn default_retention_pattern() -> u8 {
    0xA5
}

fn default_retention_dwell() -> usize {
    32 * 1024
}

/// Receives the concrete workload selected by a [`WorkloadSpec`]
pub trait WorkloadVisitor {
    /// Visitor result
    type Output;

    /// Called once with the concrete workload
    fn visit<W: Workload>(self, workload: W) -> Self::Output;
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        WorkloadSpec::Identity { len: default_identity_len() }
    }
}

impl WorkloadSpec {
    /// Every kind, with default parameters
    pub fn catalog() -> Vec<WorkloadSpec> {
        vec![
            WorkloadSpec::Identity { len: default_identity_len() },
            WorkloadSpec::Matmul { n: default_matmul_n() },
            WorkloadSpec::Sort { len: default_sort_len() },
            WorkloadSpec::Lud { n: default_lud_n() },
            WorkloadSpec::Hotspot {
                rows: default_hotspot_dim(),
                cols: default_hotspot_dim(),
                steps: default_hotspot_steps(),
            },
            WorkloadSpec::Lavamd {
                boxes1d: default_lavamd_boxes(),
                alpha: default_lavamd_alpha(),
            },
            WorkloadSpec::Fft { log2_len: default_fft_log2() },
            WorkloadSpec::Retention {
                len: default_retention_len(),
                pattern: default_retention_pattern(),
                dwell: default_retention_dwell(),
            },
        ]
    }

    /// Default parameters for a kind name
    pub fn from_kind(kind: &str) -> Option<WorkloadSpec> {
        Self::catalog().into_iter().find(|spec| spec.kind() == kind)
    }

    /// Kind name as used in configuration
    pub fn kind(&self) -> &'static str {
        match self {
            WorkloadSpec::Identity { .. } => "identity",
            WorkloadSpec::Matmul { .. } => "matmul",
            WorkloadSpec::Sort { .. } => "sort",
            WorkloadSpec::Lud { .. } => "lud",
            WorkloadSpec::Hotspot { .. } => "hotspot",
            WorkloadSpec::Lavamd { .. } => "lavamd",
            WorkloadSpec::Fft { .. } => "fft",
            WorkloadSpec::Retention { .. } => "retention",
        }
    }

    /// Output element count, `None` if it overflows `usize`
    pub fn output_elements(&self) -> Option<usize> {
        match *self {
            WorkloadSpec::Identity { len } | WorkloadSpec::Sort { len } => Some(len),
            WorkloadSpec::Matmul { n } | WorkloadSpec::Lud { n } => n.checked_mul(n),
            WorkloadSpec::Hotspot { rows, cols, .. } => rows.checked_mul(cols),
            WorkloadSpec::Lavamd { boxes1d, .. } => boxes1d
                .checked_mul(boxes1d)
                .and_then(|b| b.checked_mul(boxes1d))
                .and_then(|b| b.checked_mul(lavamd::PARTICLES_PER_BOX)),
            WorkloadSpec::Fft { log2_len } => 1usize.checked_shl(log2_len),
            WorkloadSpec::Retention { len, .. } => Some(len),
        }
    }

    /// Replace the primary size parameter
    pub fn resized(&self, size: usize) -> WorkloadSpec {
        let mut spec = self.clone();
        match &mut spec {
            WorkloadSpec::Identity { len } | WorkloadSpec::Sort { len } => *len = size,
            WorkloadSpec::Matmul { n } | WorkloadSpec::Lud { n } => *n = size,
            WorkloadSpec::Hotspot { rows, cols, .. } => {
                *rows = size;
                *cols = size;
            }
            WorkloadSpec::Lavamd { boxes1d, .. } => *boxes1d = size,
            WorkloadSpec::Fft { log2_len } => *log2_len = size as u32,
            WorkloadSpec::Retention { len, .. } => *len = size,
        }
        spec
    }

    /// Hand the concrete workload to `visitor`
    pub fn dispatch<V: WorkloadVisitor>(&self, visitor: V) -> V::Output {
        match *self {
            WorkloadSpec::Identity { len } => visitor.visit(Identity::new(len)),
            WorkloadSpec::Matmul { n } => visitor.visit(MatMul::new(n)),
            WorkloadSpec::Sort { len } => visitor.visit(Sort::new(len)),
            WorkloadSpec::Lud { n } => visitor.visit(Lud::new(n)),
            WorkloadSpec::Hotspot { rows, cols, steps } => visitor.visit(Hotspot::new(rows, cols, steps)),
            WorkloadSpec::Lavamd { boxes1d, alpha } => visitor.visit(LavaMd::new(boxes1d, alpha)),
            WorkloadSpec::Fft { log2_len } => visitor.visit(Fft::new(log2_len)),
            WorkloadSpec::Retention { len, pattern, dwell } => {
                visitor.visit(Retention::new(len, pattern, dwell))
            }
        }
    }
}
