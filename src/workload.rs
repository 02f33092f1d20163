//! Workload adapter contract
//!
//! A workload is an opaque kernel with fixed-size input and output buffers.
//! `compute` takes `&self` and returns a fresh output, so an iteration can
//! neither see nor leave behind another iteration's result.

use crate::element::Element;
use crate::protocol::MessageLayout;
use rand::rngs::StdRng;

/// How an element index is spelled on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexLayout {
    /// One word: the flat element index
    Flat,
    /// Two words: row then column of a row-major grid
    Grid {
        /// Row length
        cols: usize,
    },
}

impl IndexLayout {
    /// Words used by one encoded index
    pub fn words(&self) -> usize {
        match self {
            IndexLayout::Flat => 1,
            IndexLayout::Grid { .. } => 2,
        }
    }

    /// Append the encoded index. Output lengths are bounded to `u32::MAX`
    /// by [`crate::config::HarnessConfig::validate`].
    pub fn push_index(&self, index: usize, out: &mut Vec<u32>) {
        match *self {
            IndexLayout::Flat => out.push(index as u32),
            IndexLayout::Grid { cols } => {
                out.push((index / cols) as u32);
                out.push((index % cols) as u32);
            }
        }
    }

    /// Recover the flat index from encoded words
    pub fn flat_index(&self, words: &[u32]) -> usize {
        match *self {
            IndexLayout::Flat => words[0] as usize,
            IndexLayout::Grid { cols } => words[0] as usize * cols + words[1] as usize,
        }
    }
}

/// What the value words of a mismatch message carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadMode {
    /// Raw observed bit pattern
    Observed,
    /// Observed XOR expected, i.e. the flipped bits
    Syndrome,
    /// No per-element messages, one count message per dirty iteration
    Summary,
}

/// One named input resource and the number of elements it holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPart {
    /// Resource name in storage
    pub name: String,
    /// Element count
    pub len: usize,
}

impl InputPart {
    /// New part
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self { name: name.into(), len }
    }
}

/// Uniform wrapper around one computational kernel
pub trait Workload {
    /// Input element type
    type Input: Element;
    /// Output element type
    type Output: Element;

    /// Instance name including its size, e.g. `"lud_256"`
    fn instance(&self) -> String;

    /// Input elements, all parts concatenated
    fn input_len(&self) -> usize;

    /// Output elements
    fn output_len(&self) -> usize;

    /// Run the kernel. Must be deterministic for a fixed input.
    fn compute(&self, input: &[Self::Input]) -> Vec<Self::Output>;

    /// Deterministic input for offline golden generation
    fn generate_input(&self, rng: &mut StdRng) -> Vec<Self::Input>;

    /// Wire spelling of indices
    fn index_layout(&self) -> IndexLayout {
        IndexLayout::Flat
    }

    /// Wire payload of mismatch messages
    fn payload_mode(&self) -> PayloadMode {
        PayloadMode::Observed
    }

    /// Input resources in concatenation order
    fn input_parts(&self) -> Vec<InputPart> {
        vec![InputPart::new(format!("{}_input.bin", self.instance()), self.input_len())]
    }

    /// Golden resource name
    fn golden_resource(&self) -> String {
        format!("{}_gold.bin", self.instance())
    }

    /// Shape of this workload's diagnostic messages
    fn message_layout(&self) -> MessageLayout {
        MessageLayout::new(self.index_layout(), self.payload_mode(), Self::Output::WORDS)
    }
}
