//! Multi-failure coordination.
//!
//! [`FailureTracker`] keeps the simplest known failing result for every
//! failure signature seen during a run. Every interesting result the engine
//! sees, whether from generation or from any shrink track, goes through
//! [`FailureTracker::consider`], so a shrink that slips into a different bug
//! opens a new track instead of losing the original one.

use std::collections::{BTreeMap, BTreeSet};

use crate::data::{is_simpler, sort_key, TestResult};
use crate::failure::Signature;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consideration {
    /// Not a failure.
    Uninteresting,
    /// The first failure with this signature.
    New,
    /// Simpler than the previous best for its signature, which is returned.
    Improved { previous: TestResult },
    /// A failure no simpler than the current best.
    NotBetter,
}

#[derive(Debug, Clone, Default)]
pub struct FailureTracker {
    best: BTreeMap<Signature, TestResult>,
    shrunk: BTreeSet<Signature>,
}

impl FailureTracker {
    pub fn new() -> Self {
        FailureTracker::default()
    }

    pub fn consider(&mut self, result: &TestResult) -> Consideration {
        let Some(signature) = result.signature() else {
            return Consideration::Uninteresting;
        };
        match self.best.get(signature) {
            None => {
                self.best.insert(signature.clone(), result.clone());
                Consideration::New
            }
            Some(current) if is_simpler(&result.buffer, &current.buffer) => {
                // Improved from outside its own shrink, so it needs another go.
                self.shrunk.remove(signature);
                let previous = self
                    .best
                    .insert(signature.clone(), result.clone())
                    .unwrap_or_else(|| result.clone());
                Consideration::Improved { previous }
            }
            Some(_) => Consideration::NotBetter,
        }
    }

    pub fn get(&self, signature: &Signature) -> Option<&TestResult> {
        self.best.get(signature)
    }

    pub fn len(&self) -> usize {
        self.best.len()
    }

    pub fn is_empty(&self) -> bool {
        self.best.is_empty()
    }

    pub fn signatures(&self) -> impl Iterator<Item = &Signature> {
        self.best.keys()
    }

    /// The unshrunk track with the simplest current buffer, if any.
    pub fn next_unshrunk(&self) -> Option<Signature> {
        self.best
            .iter()
            .filter(|(signature, _)| !self.shrunk.contains(*signature))
            .min_by(|(_, a), (_, b)| sort_key(&a.buffer).cmp(&sort_key(&b.buffer)))
            .map(|(signature, _)| signature.clone())
    }

    pub fn mark_shrunk(&mut self, signature: &Signature) {
        self.shrunk.insert(signature.clone());
    }

    pub fn is_shrunk(&self, signature: &Signature) -> bool {
        self.shrunk.contains(signature)
    }

    /// Forgets a track, for failures that turned out not to reproduce.
    pub fn remove(&mut self, signature: &Signature) -> Option<TestResult> {
        self.shrunk.remove(signature);
        self.best.remove(signature)
    }

    /// Best results, simplest first.
    pub fn results(&self) -> Vec<&TestResult> {
        let mut results: Vec<&TestResult> = self.best.values().collect();
        results.sort_by(|a, b| sort_key(&a.buffer).cmp(&sort_key(&b.buffer)));
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Status;

    fn result(buffer: &[u8], status: Status) -> TestResult {
        TestResult {
            buffer: buffer.to_vec(),
            status,
            spans: Vec::new(),
            blocks: Vec::new(),
            notes: Vec::new(),
            message: None,
        }
    }

    fn failing(buffer: &[u8], location: &str) -> TestResult {
        result(buffer, Status::Interesting(Signature::new("assertion", location)))
    }

    #[test]
    fn passing_results_are_ignored() {
        let mut tracker = FailureTracker::new();
        assert_eq!(
            tracker.consider(&result(&[1], Status::Valid)),
            Consideration::Uninteresting
        );
        assert!(tracker.is_empty());
    }

    #[test]
    fn tracks_each_signature_separately() {
        let mut tracker = FailureTracker::new();
        assert_eq!(tracker.consider(&failing(&[5, 5], "a.rs:1")), Consideration::New);
        assert_eq!(tracker.consider(&failing(&[9, 9, 9], "b.rs:2")), Consideration::New);
        assert_eq!(tracker.len(), 2);

        match tracker.consider(&failing(&[1, 5], "a.rs:1")) {
            Consideration::Improved { previous } => assert_eq!(previous.buffer, vec![5, 5]),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            tracker.consider(&failing(&[9, 9], "a.rs:1")),
            Consideration::NotBetter
        );
        let b = Signature::new("assertion", "b.rs:2");
        assert_eq!(tracker.get(&b).map(|r| r.buffer.len()), Some(3));
    }

    #[test]
    fn improvement_reopens_a_shrunk_track() {
        let mut tracker = FailureTracker::new();
        let a = Signature::new("assertion", "a.rs:1");
        tracker.consider(&failing(&[5], "a.rs:1"));
        tracker.consider(&failing(&[7, 7], "b.rs:2"));
        assert_eq!(tracker.next_unshrunk(), Some(a.clone()));
        tracker.mark_shrunk(&a);
        assert_eq!(
            tracker.next_unshrunk(),
            Some(Signature::new("assertion", "b.rs:2"))
        );
        tracker.consider(&failing(&[4], "a.rs:1"));
        assert!(!tracker.is_shrunk(&a));
    }

    #[test]
    fn results_are_simplest_first() {
        let mut tracker = FailureTracker::new();
        tracker.consider(&failing(&[1, 1, 1], "a.rs:1"));
        tracker.consider(&failing(&[2], "b.rs:2"));
        let buffers: Vec<&[u8]> = tracker.results().iter().map(|r| r.buffer.as_slice()).collect();
        assert_eq!(buffers, vec![&[2][..], &[1, 1, 1][..]]);
    }
}
