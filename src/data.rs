//! # TestData: the per-execution draw context
//!
//! A `TestData` is created for every single execution of a test function. It
//! owns the byte source for that execution (wrapped in a [`Recorder`] so the
//! bytes actually consumed are always known), the hard ceiling on how many
//! bytes may be consumed, and the [`SpanTracker`] that brackets each
//! strategy-level draw.
//!
//! When the execution is over, [`TestData::finish`] freezes everything into a
//! [`TestResult`]: the buffer, the outcome, the spans and raw blocks, and any
//! notes the test attached. Test results are what the shrinker and the
//! failure tracker reason about; they never look at generated values.
//!
//! ## Simplicity order
//!
//! Buffers are compared by length first and then lexicographically as
//! unsigned bytes. [`sort_key`] gives the key for that order and
//! [`is_simpler`] the strict comparison used everywhere a candidate is
//! weighed against a current best.

use std::fmt;

use crate::distributions::Hint;
use crate::error::DrawError;
use crate::failure::Signature;
use crate::source::{ByteSource, RandomSource, Recorder, ReplaySource};
use crate::spans::{Span, SpanTracker};
use crate::strategy::Strategy;

/// The outcome of one execution.
///
/// Variants are declared from least to most interesting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    /// The buffer ran out or the size ceiling was hit.
    Overrun,
    /// A draw or an assumption rejected the execution.
    Invalid,
    /// The test ran to completion and passed.
    Valid,
    /// The test failed with the given signature.
    Interesting(Signature),
}

impl Status {
    pub fn is_interesting(&self) -> bool {
        matches!(self, Status::Interesting(_))
    }

    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Status::Interesting(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Overrun => write!(f, "overrun"),
            Status::Invalid => write!(f, "invalid"),
            Status::Valid => write!(f, "pass"),
            Status::Interesting(s) => write!(f, "fail({})", s),
        }
    }
}

/// The byte range returned by one raw `draw_bytes` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
    pub start: usize,
    pub end: usize,
}

impl Block {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Key for the simplicity order: shorter first, then lexicographically smaller.
pub fn sort_key(buffer: &[u8]) -> (usize, &[u8]) {
    (buffer.len(), buffer)
}

/// True if `candidate` is strictly simpler than `current`.
pub fn is_simpler(candidate: &[u8], current: &[u8]) -> bool {
    sort_key(candidate) < sort_key(current)
}

/// Everything recorded about one finished execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    /// Exactly the bytes consumed, in draw order.
    pub buffer: Vec<u8>,
    pub status: Status,
    pub spans: Vec<Span>,
    pub blocks: Vec<Block>,
    pub notes: Vec<String>,
    /// The failure message, for interesting results.
    pub message: Option<String>,
}

impl TestResult {
    pub fn signature(&self) -> Option<&Signature> {
        self.status.signature()
    }

    pub fn block_bytes(&self, block: &Block) -> &[u8] {
        &self.buffer[block.start..block.end]
    }

    pub fn span_bytes(&self, span: &Span) -> &[u8] {
        &self.buffer[span.start..span.end]
    }
}

/// The draw context handed to strategies and test functions.
pub struct TestData {
    source: Recorder<Box<dyn ByteSource>>,
    max_length: usize,
    spans: SpanTracker,
    blocks: Vec<Block>,
    notes: Vec<String>,
}

impl fmt::Debug for TestData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestData")
            .field("index", &self.index())
            .field("max_length", &self.max_length)
            .field("blocks", &self.blocks.len())
            .finish()
    }
}

impl TestData {
    pub fn new(source: Box<dyn ByteSource>, max_length: usize) -> Self {
        TestData {
            source: Recorder::new(source),
            max_length,
            spans: SpanTracker::new(),
            blocks: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// A context that replays `buffer`.
    pub fn for_buffer(buffer: impl Into<Vec<u8>>, max_length: usize) -> Self {
        TestData::new(Box::new(ReplaySource::new(buffer)), max_length)
    }

    /// A context that generates fresh bytes from a ChaCha stream seeded with `seed`.
    pub fn generating(seed: u64, max_length: usize) -> Self {
        TestData::new(Box::new(RandomSource::from_seed(seed)), max_length)
    }

    /// Number of bytes consumed so far.
    pub fn index(&self) -> usize {
        self.source.len()
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Draws exactly `n` raw bytes.
    ///
    /// Fails with `DrawError::Overrun` without consuming anything if the draw
    /// would cross the size ceiling or the source is exhausted.
    pub fn draw_bytes(&mut self, n: usize, hint: Option<&Hint>) -> Result<Vec<u8>, DrawError> {
        let start = self.index();
        if start + n > self.max_length {
            return Err(DrawError::Overrun);
        }
        let bytes = self.source.draw(n, hint)?;
        self.blocks.push(Block {
            start,
            end: start + n,
        });
        Ok(bytes)
    }

    /// Draws a value from `strategy`, bracketed in its own span.
    pub fn draw<S: Strategy + ?Sized>(&mut self, strategy: &S) -> Result<S::Value, DrawError> {
        self.start_span(strategy.label());
        let result = strategy.draw(self);
        self.stop_span(result.is_err());
        result
    }

    pub fn start_span(&mut self, label: &'static str) {
        let at = self.index();
        self.spans.start(label, at);
    }

    /// Renames the innermost open span, for draws that only learn what they
    /// were after consuming bytes (e.g. the final "no more elements" coin).
    pub fn relabel_span(&mut self, label: &'static str) {
        self.spans.relabel(label);
    }

    pub fn stop_span(&mut self, discard: bool) {
        let at = self.index();
        self.spans.stop(at, discard);
    }

    /// Attaches a line of context to the eventual report.
    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn finish(self, status: Status, message: Option<String>) -> TestResult {
        let end = self.index();
        TestResult {
            spans: self.spans.finish(end),
            buffer: self.source.into_record(),
            status,
            blocks: self.blocks,
            notes: self.notes,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spans::is_laminar;

    #[test]
    fn replay_records_consumed_prefix_only() {
        let mut data = TestData::for_buffer(vec![1, 2, 3, 4, 5], 64);
        assert_eq!(data.draw_bytes(2, None).unwrap(), vec![1, 2]);
        assert_eq!(data.draw_bytes(1, None).unwrap(), vec![3]);
        let result = data.finish(Status::Valid, None);
        assert_eq!(result.buffer, vec![1, 2, 3]);
        assert_eq!(
            result.blocks,
            vec![Block { start: 0, end: 2 }, Block { start: 2, end: 3 }]
        );
    }

    #[test]
    fn ceiling_overruns_without_consuming() {
        let mut data = TestData::for_buffer(vec![0; 10], 3);
        assert!(data.draw_bytes(2, None).is_ok());
        assert_eq!(data.draw_bytes(2, None), Err(DrawError::Overrun));
        assert_eq!(data.index(), 2);
        assert_eq!(data.draw_bytes(1, None).unwrap(), vec![0]);
    }

    #[test]
    fn generating_context_never_exceeds_ceiling() {
        let mut data = TestData::generating(1, 5);
        assert_eq!(data.draw_bytes(4, Some(&Hint::boundary())).unwrap().len(), 4);
        assert_eq!(data.draw_bytes(4, None), Err(DrawError::Overrun));
        assert_eq!(data.finish(Status::Overrun, None).buffer.len(), 4);
    }

    #[test]
    fn spans_left_open_are_closed_on_finish() {
        let mut data = TestData::for_buffer(vec![7, 7, 7], 64);
        data.start_span("outer");
        data.draw_bytes(1, None).unwrap();
        data.start_span("inner");
        data.draw_bytes(1, None).unwrap();
        data.stop_span(false);
        data.start_span("dangling");
        let result = data.finish(Status::Overrun, None);
        assert_eq!(result.spans.len(), 3);
        assert!(result.spans[0].discarded);
        assert!(!result.spans[1].discarded);
        assert!(is_laminar(&result.spans));
    }

    #[test]
    fn simplicity_order_is_length_then_lexicographic() {
        assert!(is_simpler(&[9], &[0, 0]));
        assert!(is_simpler(&[0, 1], &[1, 0]));
        assert!(!is_simpler(&[1, 0], &[1, 0]));
        assert!(!is_simpler(&[], &[]));
    }

    #[test]
    fn notes_travel_to_the_result() {
        let mut data = TestData::for_buffer(vec![], 8);
        data.note("x = 3");
        let result = data.finish(Status::Valid, None);
        assert_eq!(result.notes, vec!["x = 3".to_string()]);
    }
}
