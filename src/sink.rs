//! Diagnostic sink: the narrow, ordered, word-granular output channel

use crate::error::{HarnessError, Result};
use crate::protocol::DiagnosticMessage;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

/// Ordered, best-effort, word-granular channel
pub trait DiagnosticSink {
    /// Write leading words of `words`; returns how many were accepted.
    ///
    /// Accepting fewer than all words (including zero) is back-pressure; an
    /// error means nothing was accepted. Callers retry from the first word
    /// that was not accepted.
    fn write_words(&mut self, words: &[u32]) -> io::Result<usize>;

    /// Push buffered words to the carrier
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Box<S> {
    fn write_words(&mut self, words: &[u32]) -> io::Result<usize> {
        (**self).write_words(words)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Sink over any byte writer (serial device node, file, stdout)
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
    /// Bytes of the leading word already on the wire from a stalled call
    partial: usize,
}

impl<W: Write> WriterSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self { writer, partial: 0 }
    }

    /// Unwrap
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DiagnosticSink for WriterSink<W> {
    fn write_words(&mut self, words: &[u32]) -> io::Result<usize> {
        for (accepted, word) in words.iter().enumerate() {
            // A word counts as accepted only once all four bytes are out; a
            // short write resumes mid-word on the next call.
            let bytes = word.to_le_bytes();
            while self.partial < bytes.len() {
                let err = match self.writer.write(&bytes[self.partial..]) {
                    Ok(0) => io::Error::from(io::ErrorKind::WriteZero),
                    Ok(n) => {
                        self.partial += n;
                        continue;
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => e,
                };
                return if accepted == 0 { Err(err) } else { Ok(accepted) };
            }
            self.partial = 0;
        }
        Ok(words.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Shared in-memory sink; clones observe the same word log
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    words: Arc<Mutex<Vec<u32>>>,
}

impl MemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far
    pub fn words(&self) -> Vec<u32> {
        self.words.lock().clone()
    }

    /// Drain the log
    pub fn take(&self) -> Vec<u32> {
        std::mem::take(&mut *self.words.lock())
    }
}

impl DiagnosticSink for MemorySink {
    fn write_words(&mut self, words: &[u32]) -> io::Result<usize> {
        self.words.lock().extend_from_slice(words);
        Ok(words.len())
    }
}

/// Block-and-retry policy for a busy or failing sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// First backoff
    pub initial_backoff: Duration,
    /// Backoff ceiling; doubling stops here
    pub max_backoff: Duration,
    /// Give up after this many failed attempts; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

/// Sink wrapper that delivers whole messages in order, never dropping one
#[derive(Debug)]
pub struct RetryingSink<S> {
    inner: S,
    policy: RetryPolicy,
    retries: u64,
}

impl<S: DiagnosticSink> RetryingSink<S> {
    /// Wrap a sink
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy, retries: 0 }
    }

    /// Failed or short writes so far
    pub fn retries(&self) -> u64 {
        self.retries
    }

    /// Deliver one message, blocking until every word is accepted
    pub fn send(&mut self, message: &DiagnosticMessage) -> Result<()> {
        let words = message.words();
        let mut offset = 0;
        let mut backoff = self.policy.initial_backoff;
        let mut failures: u32 = 0;

        while offset < words.len() {
            let outcome = self.inner.write_words(&words[offset..]);
            let stalled = match outcome {
                Ok(0) => Some(io::Error::from(io::ErrorKind::WouldBlock)),
                Ok(n) => {
                    offset += n;
                    backoff = self.policy.initial_backoff;
                    failures = 0;
                    None
                }
                Err(e) => Some(e),
            };

            if let Some(err) = stalled {
                failures += 1;
                self.retries += 1;
                if failures == 1 {
                    tracing::warn!("Diagnostic sink stalled ({}), retrying", err);
                } else {
                    tracing::debug!("Diagnostic sink retry {} ({})", failures, err);
                }
                if let Some(max) = self.policy.max_attempts {
                    if failures >= max {
                        return Err(HarnessError::SinkUnavailable { attempts: failures, source: err });
                    }
                }
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(self.policy.max_backoff);
            }
        }

        Ok(())
    }

    /// Flush the wrapped sink, retrying like [`RetryingSink::send`]
    pub fn flush(&mut self) -> Result<()> {
        let mut backoff = self.policy.initial_backoff;
        let mut failures: u32 = 0;
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) => {
                    failures += 1;
                    self.retries += 1;
                    if let Some(max) = self.policy.max_attempts {
                        if failures >= max {
                            return Err(HarnessError::SinkUnavailable { attempts: failures, source: err });
                        }
                    }
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(self.policy.max_backoff);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::STATUS_CLEAN;

    /// Accepts one word per call and refuses every other call
    struct FlakySink {
        calls: usize,
        log: MemorySink,
    }

    impl DiagnosticSink for FlakySink {
        fn write_words(&mut self, words: &[u32]) -> io::Result<usize> {
            self.calls += 1;
            if self.calls % 2 == 1 {
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            self.log.write_words(&words[..1])
        }
    }

    /// Byte writer that takes at most `chunk` bytes per call and blocks on
    /// every second call
    struct TrickleWriter {
        out: Arc<Mutex<Vec<u8>>>,
        chunk: usize,
        calls: usize,
    }

    impl Write for TrickleWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            let n = buf.len().min(self.chunk);
            self.out.lock().extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct DeadSink;

    impl DiagnosticSink for DeadSink {
        fn write_words(&mut self, _words: &[u32]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    fn fast_policy(max_attempts: Option<u32>) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_micros(1),
            max_backoff: Duration::from_micros(10),
            max_attempts,
        }
    }

    #[test]
    fn test_writer_sink_little_endian() {
        let mut sink = WriterSink::new(Vec::new());
        assert_eq!(sink.write_words(&[STATUS_CLEAN, 1]).unwrap(), 2);
        assert_eq!(sink.into_inner(), vec![0, 0, 0, 0xAA, 1, 0, 0, 0]);
    }

    #[test]
    fn test_retry_preserves_order_and_completeness() {
        let log = MemorySink::new();
        let mut sink = RetryingSink::new(FlakySink { calls: 0, log: log.clone() }, fast_policy(None));
        let message = DiagnosticMessage::mismatch(true, &[5, 6, 7]);
        sink.send(&message).unwrap();
        assert_eq!(log.words(), message.words().to_vec());
        assert_eq!(sink.retries(), 4);
    }

    #[test]
    fn test_short_writes_keep_word_alignment() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let writer = TrickleWriter { out: out.clone(), chunk: 2, calls: 0 };
        let mut sink = RetryingSink::new(WriterSink::new(writer), fast_policy(None));
        sink.send(&DiagnosticMessage::clean()).unwrap();
        let message = DiagnosticMessage::mismatch(false, &[0x0102_0304, 9]);
        sink.send(&message).unwrap();

        let expected: Vec<u8> = [STATUS_CLEAN]
            .iter()
            .chain(message.words())
            .flat_map(|w| w.to_le_bytes())
            .collect();
        assert_eq!(*out.lock(), expected);
    }

    #[test]
    fn test_bounded_retry_gives_up() {
        let mut sink = RetryingSink::new(DeadSink, fast_policy(Some(3)));
        let err = sink.send(&DiagnosticMessage::clean()).unwrap_err();
        assert!(matches!(err, HarnessError::SinkUnavailable { attempts: 3, .. }));
    }

    #[test]
    fn test_memory_sink_clones_share_log() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.write_words(&[1, 2, 3]).unwrap();
        assert_eq!(sink.take(), vec![1, 2, 3]);
        assert!(sink.words().is_empty());
    }
}
