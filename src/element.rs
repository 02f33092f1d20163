//! Fixed-width element types and their raw bit representation
//!
//! Everything the harness compares or transmits goes through [`Element`]:
//! decoding from the little-endian storage format, bit-exact equality, and
//! splitting into 32-bit diagnostic words (64-bit values high half first).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed-size value the harness can load, compare and report
pub trait Element: Copy + fmt::Debug + Send + Sync + 'static {
    /// Name recorded in golden manifests
    const TYPE_NAME: &'static str;
    /// Size in bytes of the storage encoding
    const BYTES: usize;
    /// Number of 32-bit words emitted for the raw bit pattern
    const WORDS: usize;

    /// Decode from exactly `Self::BYTES` little-endian bytes
    fn decode_le(bytes: &[u8]) -> Self;

    /// Append the little-endian storage encoding
    fn encode_le(&self, out: &mut Vec<u8>);

    /// Append the raw bit pattern as diagnostic words
    fn push_words(&self, out: &mut Vec<u32>);

    /// Representation-level equality (NaN payloads and signed zeros included)
    fn bits_eq(&self, other: &Self) -> bool;

    /// Flip one bit of the representation; `bit` wraps modulo the bit width
    fn flip_bit(self, bit: u32) -> Self;

    /// Raw bit pattern as a freshly allocated word vector
    fn to_words(&self) -> Vec<u32> {
        let mut words = Vec::with_capacity(Self::WORDS);
        self.push_words(&mut words);
        words
    }
}

fn push_raw_words(raw: u64, bytes: usize, out: &mut Vec<u32>) {
    if bytes == 8 {
        out.push((raw >> 32) as u32);
        out.push(raw as u32);
    } else {
        out.push(raw as u32);
    }
}

macro_rules! impl_scalar {
    ($ty:ty, $name:literal, $bytes:literal, $to_raw:expr, $from_raw:expr) => {
        impl Element for $ty {
            const TYPE_NAME: &'static str = $name;
            const BYTES: usize = $bytes;
            const WORDS: usize = if $bytes == 8 { 2 } else { 1 };

            fn decode_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; 8];
                buf[..$bytes].copy_from_slice(&bytes[..$bytes]);
                ($from_raw)(u64::from_le_bytes(buf))
            }

            fn encode_le(&self, out: &mut Vec<u8>) {
                let raw: u64 = ($to_raw)(*self);
                out.extend_from_slice(&raw.to_le_bytes()[..$bytes]);
            }

            fn push_words(&self, out: &mut Vec<u32>) {
                push_raw_words(($to_raw)(*self), $bytes, out);
            }

            fn bits_eq(&self, other: &Self) -> bool {
                let a: u64 = ($to_raw)(*self);
                let b: u64 = ($to_raw)(*other);
                a == b
            }

            fn flip_bit(self, bit: u32) -> Self {
                let raw: u64 = ($to_raw)(self);
                ($from_raw)(raw ^ (1u64 << (bit % ($bytes * 8))))
            }
        }
    };
}

impl_scalar!(u8, "u8", 1, |v: u8| v as u64, |r: u64| r as u8);
impl_scalar!(u32, "u32", 4, |v: u32| v as u64, |r: u64| r as u32);
impl_scalar!(i32, "i32", 4, |v: i32| v as u32 as u64, |r: u64| r as u32 as i32);
impl_scalar!(u64, "u64", 8, |v: u64| v, |r: u64| r);
impl_scalar!(f32, "f32", 4, |v: f32| v.to_bits() as u64, |r: u64| f32::from_bits(r as u32));
impl_scalar!(f64, "f64", 8, |v: f64| v.to_bits(), f64::from_bits);

/// Single-precision complex sample, real part first
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Complex32 {
    /// Real part
    pub re: f32,
    /// Imaginary part
    pub im: f32,
}

impl Complex32 {
    /// Build from parts
    pub fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }
}

impl Element for Complex32 {
    const TYPE_NAME: &'static str = "complex32";
    const BYTES: usize = 8;
    const WORDS: usize = 2;

    fn decode_le(bytes: &[u8]) -> Self {
        Self {
            re: f32::decode_le(&bytes[0..4]),
            im: f32::decode_le(&bytes[4..8]),
        }
    }

    fn encode_le(&self, out: &mut Vec<u8>) {
        self.re.encode_le(out);
        self.im.encode_le(out);
    }

    fn push_words(&self, out: &mut Vec<u32>) {
        self.re.push_words(out);
        self.im.push_words(out);
    }

    fn bits_eq(&self, other: &Self) -> bool {
        self.re.bits_eq(&other.re) && self.im.bits_eq(&other.im)
    }

    fn flip_bit(self, bit: u32) -> Self {
        let bit = bit % 64;
        if bit < 32 {
            Self { re: self.re.flip_bit(bit), ..self }
        } else {
            Self { im: self.im.flip_bit(bit - 32), ..self }
        }
    }
}

/// Potential plus 3-D vector, the per-particle record of the N-body workload
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FourVector {
    /// Potential
    pub v: f64,
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
    /// Z component
    pub z: f64,
}

impl FourVector {
    fn fields(&self) -> [f64; 4] {
        [self.v, self.x, self.y, self.z]
    }

    fn from_fields(f: [f64; 4]) -> Self {
        Self { v: f[0], x: f[1], y: f[2], z: f[3] }
    }
}

impl Element for FourVector {
    const TYPE_NAME: &'static str = "four_vector";
    const BYTES: usize = 32;
    const WORDS: usize = 8;

    fn decode_le(bytes: &[u8]) -> Self {
        let mut f = [0.0f64; 4];
        for (slot, chunk) in f.iter_mut().zip(bytes.chunks_exact(8)) {
            *slot = f64::decode_le(chunk);
        }
        Self::from_fields(f)
    }

    fn encode_le(&self, out: &mut Vec<u8>) {
        for field in self.fields() {
            field.encode_le(out);
        }
    }

    fn push_words(&self, out: &mut Vec<u32>) {
        for field in self.fields() {
            field.push_words(out);
        }
    }

    fn bits_eq(&self, other: &Self) -> bool {
        self.fields()
            .iter()
            .zip(other.fields().iter())
            .all(|(a, b)| a.bits_eq(b))
    }

    fn flip_bit(self, bit: u32) -> Self {
        let bit = bit % 256;
        let mut f = self.fields();
        let slot = (bit / 64) as usize;
        f[slot] = f[slot].flip_bit(bit % 64);
        Self::from_fields(f)
    }
}

/// Decode a little-endian byte buffer into elements.
///
/// Trailing bytes that do not form a whole element are ignored; callers check
/// the byte length first.
pub fn decode_slice<T: Element>(bytes: &[u8]) -> Vec<T> {
    bytes.chunks_exact(T::BYTES).map(T::decode_le).collect()
}

/// Encode elements into their little-endian storage format
pub fn encode_slice<T: Element>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::BYTES);
    for value in values {
        value.encode_le(&mut out);
    }
    out
}
