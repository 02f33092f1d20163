//! Bit-exact comparison of a working output against the golden output

use crate::element::Element;
use crate::error::ConfigFault;

/// One element whose bit pattern differs from the golden output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MismatchRecord<T> {
    /// Position in the output sequence
    pub index: usize,
    /// Value produced this iteration
    pub observed: T,
    /// Golden value at the same position
    pub expected: T,
}

impl<T: Element> MismatchRecord<T> {
    /// Append the observed raw bits as words
    pub fn push_observed(&self, out: &mut Vec<u32>) {
        self.observed.push_words(out);
    }

    /// Append observed XOR expected, word by word
    pub fn push_syndrome(&self, out: &mut Vec<u32>) {
        let observed = self.observed.to_words();
        let expected = self.expected.to_words();
        out.extend(observed.iter().zip(expected.iter()).map(|(o, e)| o ^ e));
    }

    /// Number of flipped bits
    pub fn flipped_bits(&self) -> u32 {
        let mut syndrome = Vec::with_capacity(T::WORDS);
        self.push_syndrome(&mut syndrome);
        syndrome.iter().map(|w| w.count_ones()).sum()
    }
}

/// Result of comparing one iteration's output
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison<T> {
    /// Elements inspected
    pub total_elements: usize,
    /// Every mismatch, index ascending
    pub mismatches: Vec<MismatchRecord<T>>,
}

impl<T> Comparison<T> {
    /// No element differed
    pub fn matched(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Number of differing elements
    pub fn mismatched_elements(&self) -> usize {
        self.mismatches.len()
    }

    /// Lowest differing index
    pub fn first_mismatch_index(&self) -> Option<usize> {
        self.mismatches.first().map(|m| m.index)
    }
}

/// Compare every element by representation, never by value.
///
/// The scan never exits early, so the full mismatch set of the iteration is
/// returned. Differing lengths are a configuration fault, not a truncation.
pub fn compare<T: Element>(observed: &[T], golden: &[T]) -> Result<Comparison<T>, ConfigFault> {
    if observed.len() != golden.len() {
        return Err(ConfigFault::Shape {
            observed: observed.len(),
            golden: golden.len(),
        });
    }

    let mismatches = observed
        .iter()
        .zip(golden.iter())
        .enumerate()
        .filter(|(_, (out, gold))| !out.bits_eq(gold))
        .map(|(index, (out, gold))| MismatchRecord {
            index,
            observed: *out,
            expected: *gold,
        })
        .collect();

    Ok(Comparison {
        total_elements: golden.len(),
        mismatches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let golden = vec![1.0f64, 2.0, 3.0, 4.0];
        let result = compare(&golden.clone(), &golden).unwrap();
        assert!(result.matched());
        assert_eq!(result.total_elements, 4);
        assert_eq!(result.first_mismatch_index(), None);
    }

    #[test]
    fn test_every_mismatch_found_in_order() {
        let golden: Vec<u32> = (0..1000).collect();
        let mut observed = golden.clone();
        for &i in &[999usize, 0, 500, 3] {
            observed[i] ^= 0x8000_0000;
        }

        let result = compare(&observed, &golden).unwrap();
        let indices: Vec<usize> = result.mismatches.iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![0, 3, 500, 999]);
        assert_eq!(result.mismatched_elements(), 4);
        assert_eq!(result.mismatches[1].expected, 3);
        assert_eq!(result.mismatches[1].observed, 0x8000_0003);
    }

    #[test]
    fn test_value_equal_but_bits_differ() {
        let golden = vec![0.0f32, f32::from_bits(0x7FC0_0000)];
        let observed = vec![-0.0f32, f32::from_bits(0x7FC0_0002)];
        let result = compare(&observed, &golden).unwrap();
        assert_eq!(result.mismatched_elements(), 2);
    }

    #[test]
    fn test_size_mismatch_is_config_fault() {
        let err = compare(&[1u8, 2, 3], &[1u8, 2]).unwrap_err();
        assert_eq!(err, ConfigFault::Shape { observed: 3, golden: 2 });
    }

    #[test]
    fn test_syndrome_words() {
        let record = MismatchRecord {
            index: 7,
            observed: 0xA4u8,
            expected: 0xA5u8,
        };
        let mut words = Vec::new();
        record.push_syndrome(&mut words);
        assert_eq!(words, vec![0x01]);
        assert_eq!(record.flipped_bits(), 1);
    }
}
