//! Diagnostic wire protocol
//!
//! Every message starts with a tagged status word. A dirty iteration opens
//! with `0xDD000000`, its further mismatches use `0xCC000000`, so consumers
//! can split the stream into iterations without any length prefix. Words are
//! transmitted little-endian.

use crate::error::{ConfigFault, Dataset};
use crate::workload::{IndexLayout, PayloadMode};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

/// Iteration matched the golden output
pub const STATUS_CLEAN: u32 = 0xAA00_0000;
/// First mismatch of an iteration (also the summary-mode dirty marker)
pub const STATUS_FIRST_MISMATCH: u32 = 0xDD00_0000;
/// Any later mismatch of the same iteration
pub const STATUS_NEXT_MISMATCH: u32 = 0xCC00_0000;
/// Per-iteration cap reached; followed by the count of unreported mismatches
pub const STATUS_TRUNCATED: u32 = 0xEE00_0000;

/// Reserved configuration fault words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u32)]
pub enum FaultCode {
    /// Storage root missing
    PartitionMissing = 0xFF10_0000,
    /// Storage root unusable
    MountFailed = 0xFF20_0000,
    /// Input open failed
    InputOpen = 0xFFF0_0000,
    /// Input read failed
    InputRead = 0xFFF1_0000,
    /// Input size wrong
    InputSize = 0xFFF2_0000,
    /// Input close failed
    InputClose = 0xFFF4_0000,
    /// Golden open failed
    GoldenOpen = 0xFFF5_0000,
    /// Golden read failed
    GoldenRead = 0xFFF6_0000,
    /// Golden size wrong
    GoldenSize = 0xFFF7_0000,
    /// Golden close failed
    GoldenClose = 0xFFF8_0000,
    /// Golden manifest mismatch
    GoldenIntegrity = 0xFFF9_0000,
    /// Output shape differs from golden at compare time
    OutputShape = 0xFFE0_0000,
}

impl FaultCode {
    const ALL: [FaultCode; 12] = [
        FaultCode::PartitionMissing,
        FaultCode::MountFailed,
        FaultCode::InputOpen,
        FaultCode::InputRead,
        FaultCode::InputSize,
        FaultCode::InputClose,
        FaultCode::GoldenOpen,
        FaultCode::GoldenRead,
        FaultCode::GoldenSize,
        FaultCode::GoldenClose,
        FaultCode::GoldenIntegrity,
        FaultCode::OutputShape,
    ];

    /// Status word on the wire
    pub fn word(self) -> u32 {
        self as u32
    }

    /// Parse a status word
    pub fn from_word(word: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|code| code.word() == word)
    }
}

impl From<&ConfigFault> for FaultCode {
    fn from(fault: &ConfigFault) -> Self {
        use Dataset::{Golden, Input};
        match fault {
            ConfigFault::PartitionMissing => FaultCode::PartitionMissing,
            ConfigFault::MountFailed => FaultCode::MountFailed,
            ConfigFault::Open(Input) => FaultCode::InputOpen,
            ConfigFault::Open(Golden) => FaultCode::GoldenOpen,
            ConfigFault::Read(Input) => FaultCode::InputRead,
            ConfigFault::Read(Golden) => FaultCode::GoldenRead,
            ConfigFault::Size { dataset: Input, .. } => FaultCode::InputSize,
            ConfigFault::Size { dataset: Golden, .. } => FaultCode::GoldenSize,
            ConfigFault::Close(Input) => FaultCode::InputClose,
            ConfigFault::Close(Golden) => FaultCode::GoldenClose,
            ConfigFault::Integrity(_) => FaultCode::GoldenIntegrity,
            ConfigFault::Shape { .. } => FaultCode::OutputShape,
        }
    }
}

/// Fixed-width diagnostic message: status word plus payload words
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticMessage {
    words: Vec<u32>,
}

impl DiagnosticMessage {
    /// Clean iteration
    pub fn clean() -> Self {
        Self { words: vec![STATUS_CLEAN] }
    }

    /// One mismatch; `body` holds the index words then the value words
    pub fn mismatch(first: bool, body: &[u32]) -> Self {
        let status = if first { STATUS_FIRST_MISMATCH } else { STATUS_NEXT_MISMATCH };
        let mut words = Vec::with_capacity(1 + body.len());
        words.push(status);
        words.extend_from_slice(body);
        Self { words }
    }

    /// Count-only report of a dirty iteration
    pub fn summary(count: u32) -> Self {
        Self { words: vec![STATUS_FIRST_MISMATCH, count] }
    }

    /// Cap reached; `suppressed` mismatches were not emitted
    pub fn truncated(suppressed: u32) -> Self {
        Self { words: vec![STATUS_TRUNCATED, suppressed] }
    }

    /// Configuration fault
    pub fn fault(code: FaultCode) -> Self {
        Self { words: vec![code.word()] }
    }

    /// All words, status first
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Wire bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.words.len() * 4);
        for word in &self.words {
            buf.put_u32_le(*word);
        }
        buf.freeze()
    }
}

/// Per-workload message shape, needed to walk a captured stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLayout {
    /// Index spelling
    pub index: IndexLayout,
    /// Payload kind
    pub payload: PayloadMode,
    /// Words per element value
    pub value_words: usize,
}

impl MessageLayout {
    /// New layout
    pub fn new(index: IndexLayout, payload: PayloadMode, value_words: usize) -> Self {
        Self { index, payload, value_words }
    }

    /// Words following a mismatch status word
    pub fn body_words(&self) -> usize {
        match self.payload {
            PayloadMode::Summary => 1,
            PayloadMode::Observed | PayloadMode::Syndrome => self.index.words() + self.value_words,
        }
    }
}

/// One mismatch recovered from the stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedMismatch {
    /// Flat element index
    pub index: usize,
    /// Value words as sent (observed bits or syndrome)
    pub value: Vec<u32>,
}

/// One iteration recovered from the stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DecodedIteration {
    /// Matched
    Clean,
    /// Per-element mismatches
    Dirty {
        /// Mismatches in emission order
        mismatches: Vec<DecodedMismatch>,
        /// Unreported mismatches, when the cap was hit
        truncated: Option<u32>,
        /// Group began with a continuation word (capture started mid-iteration)
        partial: bool,
    },
    /// Count-only dirty iteration
    Summary {
        /// Mismatch count
        count: u32,
    },
    /// Configuration fault word
    Fault(FaultCode),
}

/// Decoder output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodedStream {
    /// Iterations in stream order
    pub iterations: Vec<DecodedIteration>,
    /// Words that were not a recognizable status word and were skipped
    pub skipped_words: usize,
    /// Words of an incomplete final message
    pub trailing_words: usize,
}

/// Splits a captured word stream back into per-iteration groups.
///
/// The channel is lossy, so unknown words are skipped to resynchronise and a
/// continuation without a preceding first-mismatch word opens a partial group.
#[derive(Debug, Clone)]
pub struct StreamDecoder {
    layout: MessageLayout,
}

impl StreamDecoder {
    /// Decoder for one workload's layout
    pub fn new(layout: MessageLayout) -> Self {
        Self { layout }
    }

    /// Decode little-endian wire bytes; a trailing partial word counts as trailing
    pub fn decode_bytes(&self, bytes: &[u8]) -> DecodedStream {
        let mut buf = bytes;
        let mut words = Vec::with_capacity(bytes.len() / 4);
        while buf.remaining() >= 4 {
            words.push(buf.get_u32_le());
        }
        let mut stream = self.decode_words(&words);
        if buf.has_remaining() {
            stream.trailing_words += 1;
        }
        stream
    }

    /// Decode a word stream
    pub fn decode_words(&self, words: &[u32]) -> DecodedStream {
        let mut out = DecodedStream::default();
        let mut open: Option<DecodedIteration> = None;
        let body = self.layout.body_words();
        let mut pos = 0;

        while pos < words.len() {
            let status = words[pos];
            match status {
                STATUS_CLEAN => {
                    out.iterations.extend(open.take());
                    out.iterations.push(DecodedIteration::Clean);
                    pos += 1;
                }
                STATUS_FIRST_MISMATCH | STATUS_NEXT_MISMATCH => {
                    if pos + 1 + body > words.len() {
                        out.trailing_words = words.len() - pos;
                        break;
                    }
                    let payload = &words[pos + 1..pos + 1 + body];
                    pos += 1 + body;

                    if self.layout.payload == PayloadMode::Summary {
                        out.iterations.extend(open.take());
                        out.iterations.push(DecodedIteration::Summary { count: payload[0] });
                        continue;
                    }

                    let index_words = self.layout.index.words();
                    let mismatch = DecodedMismatch {
                        index: self.layout.index.flat_index(&payload[..index_words]),
                        value: payload[index_words..].to_vec(),
                    };

                    if status == STATUS_FIRST_MISMATCH {
                        out.iterations.extend(open.take());
                    }
                    match open.as_mut() {
                        Some(DecodedIteration::Dirty { mismatches, .. }) => mismatches.push(mismatch),
                        _ => {
                            open = Some(DecodedIteration::Dirty {
                                mismatches: vec![mismatch],
                                truncated: None,
                                partial: status == STATUS_NEXT_MISMATCH,
                            })
                        }
                    }
                }
                STATUS_TRUNCATED => {
                    if pos + 2 > words.len() {
                        out.trailing_words = words.len() - pos;
                        break;
                    }
                    let suppressed = words[pos + 1];
                    pos += 2;
                    match open.take() {
                        Some(DecodedIteration::Dirty { mismatches, partial, .. }) => {
                            out.iterations.push(DecodedIteration::Dirty {
                                mismatches,
                                truncated: Some(suppressed),
                                partial,
                            });
                        }
                        other => {
                            out.iterations.extend(other);
                            out.iterations.push(DecodedIteration::Dirty {
                                mismatches: Vec::new(),
                                truncated: Some(suppressed),
                                partial: true,
                            });
                        }
                    }
                }
                word => {
                    if let Some(code) = FaultCode::from_word(word) {
                        out.iterations.extend(open.take());
                        out.iterations.push(DecodedIteration::Fault(code));
                    } else {
                        out.skipped_words += 1;
                    }
                    pos += 1;
                }
            }
        }

        out.iterations.extend(open.take());
        out
    }
}
