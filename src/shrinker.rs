//! # Shrinker
//!
//! Given a failing [`TestResult`], the shrinker searches for a simpler buffer
//! (shorter, or equally long and lexicographically smaller) that still
//! satisfies a predicate, normally "fails with the same signature". It never
//! calls strategy code itself: every candidate is a byte buffer handed to an
//! [`Evaluator`], and the spans and blocks recorded on the current best
//! result are the only structural knowledge it uses.
//!
//! ## Passes
//!
//! Cheap passes run every round:
//!
//! - `remove_discarded`: delete every span a filter threw away.
//! - `adaptive_delete`: delete runs of consecutive blocks, probing the run
//!   length exponentially and then binary searching it.
//! - `delete_spans_largest_first`: delete whole spans, outermost first.
//! - `minimize_individual_blocks`: lower each block's integer value.
//! - `minimize_duplicated_blocks`: lower groups of identical blocks in lockstep.
//!
//! Once a round of cheap passes makes no progress, the expensive passes are
//! enabled for every following round:
//!
//! - `reorder_siblings`: sort, deduplicate and swap sibling spans.
//! - `lower_and_delete`: decrement one byte and delete a block after it.
//! - `delete_short_ranges`: delete every short byte range.
//!
//! The loop stops when a full round changes nothing, or when the evaluator
//! reports that the shrink budget is exhausted. Budget exhaustion is checked
//! between executions, never in the middle of one.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::mem;

use byteorder::{BigEndian, ByteOrder};
use log::debug;

use crate::data::{is_simpler, sort_key, Status, TestResult};
use crate::intminimize::minimize_integer;
use crate::spans::sibling_groups;

/// Returned by an [`Evaluator`] once it will execute nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetExhausted;

type Step<T = ()> = Result<T, BudgetExhausted>;

/// Runs candidate buffers through the test.
pub trait Evaluator {
    fn evaluate(&mut self, buffer: &[u8]) -> Step<TestResult>;
}

/// Longest byte range `delete_short_ranges` tries to remove.
const MAX_SHORT_RANGE: usize = 8;

/// Widest block read as a single integer.
const MAX_INTEGER_WIDTH: usize = 8;

pub struct Shrinker<'a, E, P> {
    evaluator: &'a mut E,
    predicate: P,
    target: TestResult,
    changes: u64,
    expensive_passes_enabled: bool,
}

impl<'a, E, P> Shrinker<'a, E, P>
where
    E: Evaluator,
    P: Fn(&TestResult) -> bool,
{
    /// `target` should satisfy `predicate`; the shrinker only ever moves to
    /// results that do.
    pub fn new(evaluator: &'a mut E, target: TestResult, predicate: P) -> Self {
        Shrinker {
            evaluator,
            predicate,
            target,
            changes: 0,
            expensive_passes_enabled: false,
        }
    }

    pub fn target(&self) -> &TestResult {
        &self.target
    }

    pub fn into_target(self) -> TestResult {
        self.target
    }

    /// Number of accepted improvements so far.
    pub fn changes(&self) -> u64 {
        self.changes
    }

    /// Shrinks until a fixed point or until the budget runs out. Returns
    /// `true` if the fixed point was reached.
    pub fn run(&mut self) -> bool {
        match self.run_passes() {
            Ok(()) => true,
            Err(BudgetExhausted) => {
                debug!(
                    "shrink budget exhausted after {} changes at {} bytes",
                    self.changes,
                    self.target.buffer.len()
                );
                false
            }
        }
    }

    fn run_passes(&mut self) -> Step {
        let mut prev = self.changes + 1;
        while prev != self.changes {
            prev = self.changes;
            self.pass("remove_discarded", Self::remove_discarded)?;
            self.pass("adaptive_delete", Self::adaptive_delete)?;
            self.pass("delete_spans_largest_first", Self::delete_spans_largest_first)?;
            self.pass("minimize_individual_blocks", Self::minimize_individual_blocks)?;
            self.pass("minimize_duplicated_blocks", Self::minimize_duplicated_blocks)?;
            if prev == self.changes {
                self.expensive_passes_enabled = true;
            }
            if !self.expensive_passes_enabled {
                continue;
            }
            self.pass("reorder_siblings", Self::reorder_siblings)?;
            self.pass("lower_and_delete", Self::lower_and_delete)?;
            self.pass("delete_short_ranges", Self::delete_short_ranges)?;
        }
        Ok(())
    }

    fn pass(&mut self, name: &str, pass: fn(&mut Self) -> Step) -> Step {
        let before = self.changes;
        let result = pass(self);
        debug!(
            "shrink pass {} made {} changes, now {} bytes",
            name,
            self.changes - before,
            self.target.buffer.len()
        );
        result
    }

    /// Runs `buffer` and adopts the result if it satisfies the predicate and
    /// is simpler than the current target.
    fn execute(&mut self, buffer: &[u8]) -> Step<(bool, TestResult)> {
        let result = self.evaluator.evaluate(buffer)?;
        let succeeded = (self.predicate)(&result);
        if succeeded && is_simpler(&result.buffer, &self.target.buffer) {
            self.changes += 1;
            self.target = result.clone();
        }
        Ok((succeeded, result))
    }

    /// Tries a candidate that is strictly simpler than the current target.
    /// Anything else is rejected without running it.
    fn incorporate(&mut self, buffer: &[u8]) -> Step<bool> {
        if !is_simpler(buffer, &self.target.buffer) {
            return Ok(false);
        }
        // A strict prefix of the consumed bytes can only overrun.
        if self.target.buffer.starts_with(buffer) {
            return Ok(false);
        }
        let (succeeded, _) = self.execute(buffer)?;
        Ok(succeeded)
    }

    fn remove_discarded(&mut self) -> Step {
        loop {
            let mut ranges = Vec::new();
            let mut covered = 0;
            for span in &self.target.spans {
                if span.discarded && !span.is_empty() && span.start >= covered {
                    ranges.push((span.start, span.end));
                    covered = span.end;
                }
            }
            if ranges.is_empty() {
                return Ok(());
            }
            let attempt = delete_ranges(&self.target.buffer, &ranges);
            if !self.incorporate(&attempt)? {
                return Ok(());
            }
        }
    }

    /// Attempts to delete `k` consecutive non-empty blocks of `target`
    /// starting at block `i`.
    fn try_delete_blocks(&mut self, target: &TestResult, i: usize, k: usize) -> Step<bool> {
        let ranges: Vec<(usize, usize)> = target.blocks[i..]
            .iter()
            .filter(|b| !b.is_empty())
            .take(k)
            .map(|b| (b.start, b.end))
            .collect();
        if ranges.len() < k {
            return Ok(false);
        }
        let attempt = delete_ranges(&target.buffer, &ranges);
        if attempt.len() >= self.target.buffer.len() {
            Ok(false)
        } else {
            self.incorporate(&attempt)
        }
    }

    fn adaptive_delete(&mut self) -> Step {
        let target = self.target.clone();
        let mut i = 0;
        while i < target.blocks.len() {
            // Look for a large k such that k blocks from here can be deleted
            // but k + 1 cannot, in O(log k) executions. Small deletions are
            // tried carefully first since nearly-minimal examples rarely
            // allow big ones.
            if self.try_delete_blocks(&target, i, 2)? {
                if self.try_delete_blocks(&target, i, 3)?
                    && self.try_delete_blocks(&target, i, 4)?
                {
                    let mut hi = 5;
                    while hi <= target.blocks.len() && self.try_delete_blocks(&target, i, hi)? {
                        hi *= 2;
                    }
                    let mut lo = 4;
                    while lo + 1 < hi {
                        let mid = lo + (hi - lo) / 2;
                        if self.try_delete_blocks(&target, i, mid)? {
                            lo = mid;
                        } else {
                            hi = mid;
                        }
                    }
                }
            } else {
                self.try_delete_blocks(&target, i, 1)?;
            }
            // We always tried one more deletion than succeeded, so the next
            // block is expected to be undeletable.
            i += 1;
        }
        Ok(())
    }

    fn delete_spans_largest_first(&mut self) -> Step {
        let mut i = 0;
        loop {
            let mut order: Vec<usize> = (0..self.target.spans.len())
                .filter(|&j| !self.target.spans[j].is_empty())
                .collect();
            order.sort_by_key(|&j| {
                let span = &self.target.spans[j];
                (Reverse(span.len()), span.start)
            });
            let Some(&j) = order.get(i) else {
                return Ok(());
            };
            let span = &self.target.spans[j];
            let attempt = delete_ranges(&self.target.buffer, &[(span.start, span.end)]);
            if !self.incorporate(&attempt)? {
                i += 1;
            }
        }
    }

    /// Lowers the big-endian integer at `buffer[start..start + width]` to
    /// `value`. If that makes the test consume fewer bytes without passing
    /// the predicate, also deletes that many bytes right after the range so
    /// that later draws line up with what they read before.
    fn try_lowering(&mut self, start: usize, width: usize, value: u64) -> Step<bool> {
        let end = start + width;
        if end > self.target.buffer.len() {
            return Ok(false);
        }
        if value >= BigEndian::read_uint(&self.target.buffer[start..end], width) {
            return Ok(false);
        }
        let mut attempt = self.target.buffer.clone();
        BigEndian::write_uint(&mut attempt[start..end], value, width);
        let (succeeded, result) = self.execute(&attempt)?;
        if succeeded {
            return Ok(true);
        }
        let lost = attempt.len().saturating_sub(result.buffer.len());
        if lost > 0 && result.status != Status::Overrun && end + lost <= attempt.len() {
            attempt.drain(end..end + lost);
            return self.incorporate(&attempt);
        }
        Ok(false)
    }

    fn minimize_individual_blocks(&mut self) -> Step {
        let mut i = 0;
        while i < self.target.blocks.len() {
            let block = self.target.blocks[i];
            let (start, width, count) = if block.len() <= MAX_INTEGER_WIDTH {
                (block.start, block.len(), 1)
            } else {
                (block.start, 1, block.len())
            };
            for offset in 0..count {
                let at = start + offset * width;
                if width == 0 || at + width > self.target.buffer.len() {
                    break;
                }
                let value = BigEndian::read_uint(&self.target.buffer[at..at + width], width);
                if value > 0 {
                    minimize_integer(value, |v| self.try_lowering(at, width, v))?;
                }
            }
            i += 1;
        }
        Ok(())
    }

    /// Groups of two or more blocks with identical nonzero contents,
    /// largest group first.
    fn duplicated_blocks(&self) -> Vec<Vec<usize>> {
        let mut duplicates: HashMap<&[u8], Vec<usize>> = HashMap::new();
        for (i, block) in self.target.blocks.iter().enumerate() {
            let bytes = self.target.block_bytes(block);
            let fits = !block.is_empty() && block.len() <= MAX_INTEGER_WIDTH;
            if fits && bytes.iter().any(|&b| b != 0) {
                duplicates.entry(bytes).or_default().push(i);
            }
        }
        let mut groups: Vec<Vec<usize>> = duplicates
            .into_values()
            .filter(|g| g.len() > 1)
            .collect();
        groups.sort_by_key(|g| (Reverse(g.len()), g[0]));
        groups
    }

    fn minimize_duplicated_blocks(&mut self) -> Step {
        let mut groups = self.duplicated_blocks();
        let mut i = 0;
        while i < groups.len() {
            let group = mem::take(&mut groups[i]);
            i += 1;
            let ranges: Vec<(usize, usize)> = group
                .iter()
                .filter_map(|&b| self.target.blocks.get(b))
                .map(|b| (b.start, b.end))
                .collect();
            let Some(&(start, end)) = ranges.first() else {
                continue;
            };
            let width = end - start;
            let value = BigEndian::read_uint(&self.target.buffer[start..end], width);

            let lowered = minimize_integer(value, |v| {
                if ranges.iter().any(|&(_, e)| e > self.target.buffer.len()) {
                    return Ok(false);
                }
                let mut attempt = self.target.buffer.clone();
                for &(s, e) in &ranges {
                    BigEndian::write_uint(&mut attempt[s..e], v, width);
                }
                self.incorporate(&attempt)
            })?;
            if lowered != value {
                groups = self.duplicated_blocks();
            }
        }
        Ok(())
    }

    fn reorder_siblings(&mut self) -> Step {
        let mut g = 0;
        loop {
            let groups = sibling_groups(&self.target.spans);
            let Some(group) = groups.get(g) else {
                return Ok(());
            };
            let ranges: Vec<(usize, usize)> = group
                .iter()
                .map(|&i| (self.target.spans[i].start, self.target.spans[i].end))
                .collect();
            if !self.try_reorder_group(&ranges)? {
                g += 1;
            }
        }
    }

    /// One improvement to a group of sibling spans: a full sort, deleting a
    /// repeated sibling, or swapping an adjacent out-of-order pair.
    fn try_reorder_group(&mut self, ranges: &[(usize, usize)]) -> Step<bool> {
        let contents: Vec<Vec<u8>> = ranges
            .iter()
            .map(|&(s, e)| self.target.buffer[s..e].to_vec())
            .collect();

        let mut sorted = contents.clone();
        sorted.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        if sorted != contents {
            let attempt = rearrange(&self.target.buffer, ranges, &sorted);
            if self.incorporate(&attempt)? {
                return Ok(true);
            }
        }

        for k in 1..contents.len() {
            if contents[..k].contains(&contents[k]) {
                let attempt = delete_ranges(&self.target.buffer, &[ranges[k]]);
                if self.incorporate(&attempt)? {
                    return Ok(true);
                }
            }
        }

        for k in 0..contents.len().saturating_sub(1) {
            if sort_key(&contents[k + 1]) < sort_key(&contents[k]) {
                let mut swapped = contents.clone();
                swapped.swap(k, k + 1);
                let attempt = rearrange(&self.target.buffer, ranges, &swapped);
                if self.incorporate(&attempt)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn lower_and_delete(&mut self) -> Step {
        let mut i = 0;
        while i < self.target.buffer.len() {
            if self.target.buffer[i] > 0 {
                let mut attempt = self.target.buffer.clone();
                attempt[i] -= 1;
                let (succeeded, result) = self.execute(&attempt)?;
                if !succeeded && result.buffer.len() < self.target.buffer.len() {
                    let blocks: Vec<(usize, usize)> = self
                        .target
                        .blocks
                        .iter()
                        .filter(|b| b.start > i && !b.is_empty())
                        .map(|b| (b.start, b.end))
                        .collect();
                    for range in blocks {
                        if range.1 > attempt.len() {
                            break;
                        }
                        let candidate = delete_ranges(&attempt, &[range]);
                        if self.incorporate(&candidate)? {
                            break;
                        }
                    }
                }
            }
            i += 1;
        }
        Ok(())
    }

    fn delete_short_ranges(&mut self) -> Step {
        let mut i = 0;
        while i < self.target.buffer.len() {
            let start_length = self.target.buffer.len();
            let mut j = i + 1;
            while j <= self.target.buffer.len() && j - i <= MAX_SHORT_RANGE {
                let attempt = delete_ranges(&self.target.buffer, &[(i, j)]);
                if !self.incorporate(&attempt)? {
                    j += 1;
                }
            }
            if start_length == self.target.buffer.len() {
                i += 1;
            }
        }
        Ok(())
    }
}

/// Removes disjoint `[start, end)` ranges, given in increasing order.
fn delete_ranges(buffer: &[u8], ranges: &[(usize, usize)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buffer.len());
    let mut at = 0;
    for &(start, end) in ranges {
        out.extend_from_slice(&buffer[at..start]);
        at = end;
    }
    out.extend_from_slice(&buffer[at..]);
    out
}

/// Replaces each of the disjoint, ordered `ranges` with the matching entry of
/// `contents`, keeping the bytes between them.
fn rearrange(buffer: &[u8], ranges: &[(usize, usize)], contents: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buffer.len());
    let mut at = 0;
    for (&(start, end), replacement) in ranges.iter().zip(contents) {
        out.extend_from_slice(&buffer[at..start]);
        out.extend_from_slice(replacement);
        at = end;
    }
    out.extend_from_slice(&buffer[at..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TestData;
    use crate::error::DrawError;
    use crate::failure::Signature;
    use crate::strategy::{integers, vecs};

    /// Replays buffers through a plain closure over `TestData`.
    struct FnEvaluator<F> {
        test: F,
        calls: usize,
        budget: usize,
    }

    impl<F> Evaluator for FnEvaluator<F>
    where
        F: Fn(&mut TestData) -> Result<bool, DrawError>,
    {
        fn evaluate(&mut self, buffer: &[u8]) -> Step<TestResult> {
            if self.calls >= self.budget {
                return Err(BudgetExhausted);
            }
            self.calls += 1;
            let mut data = TestData::for_buffer(buffer.to_vec(), 1024);
            let status = match (self.test)(&mut data) {
                Ok(true) => Status::Interesting(Signature::new("assertion", "test")),
                Ok(false) => Status::Valid,
                Err(DrawError::Overrun) => Status::Overrun,
                Err(DrawError::Invalid(_)) => Status::Invalid,
            };
            Ok(data.finish(status, None))
        }
    }

    fn shrink_with<F>(test: F, buffer: Vec<u8>, budget: usize) -> (TestResult, bool)
    where
        F: Fn(&mut TestData) -> Result<bool, DrawError>,
    {
        let mut evaluator = FnEvaluator {
            test,
            calls: 0,
            budget,
        };
        let initial = evaluator.evaluate(&buffer).unwrap();
        assert!(initial.status.is_interesting());
        let mut shrinker = Shrinker::new(&mut evaluator, initial, |r: &TestResult| {
            r.status.is_interesting()
        });
        let complete = shrinker.run();
        (shrinker.into_target(), complete)
    }

    #[test]
    fn shrinks_list_to_single_threshold_element() {
        let list = vecs(integers::<u8>(), 0, 20);
        let (result, complete) = shrink_with(
            |data| Ok(data.draw(&list)?.iter().any(|&x| x >= 100)),
            vec![1, 200, 1, 10, 1, 150, 1, 3, 0],
            10_000,
        );
        assert!(complete);
        assert_eq!(result.buffer, vec![1, 100, 0]);
    }

    #[test]
    fn couples_duplicated_blocks() {
        // Passes unless the two bytes are equal and nonzero, so they can only
        // shrink together.
        let pair = (integers::<u8>(), integers::<u8>());
        let (result, _) = shrink_with(
            |data| {
                let (a, b) = data.draw(&pair)?;
                Ok(a == b && a > 0)
            },
            vec![77, 77],
            10_000,
        );
        assert_eq!(result.buffer, vec![1, 1]);
    }

    #[test]
    fn recovers_bytes_lost_by_lowering_a_length() {
        // A length-prefixed list: lowering the length makes the tail unread,
        // and the bytes right after the length must go for the rest to align.
        let (result, _) = shrink_with(
            |data| {
                let n = data.draw_bytes(1, None)?[0];
                let xs = data.draw_bytes(n as usize, None)?;
                let last = data.draw_bytes(1, None)?[0];
                Ok(!xs.is_empty() && last == 9)
            },
            vec![3, 5, 5, 5, 9],
            10_000,
        );
        assert_eq!(result.buffer, vec![1, 0, 9]);
    }

    #[test]
    fn result_is_never_worse_than_input() {
        let list = vecs(integers::<u8>(), 0, 20);
        let input = vec![1, 7, 1, 8, 1, 9, 0];
        let (result, _) = shrink_with(
            |data| Ok(data.draw(&list)?.len() >= 2),
            input.clone(),
            10_000,
        );
        assert!(sort_key(&result.buffer) <= sort_key(&input));
        assert_eq!(result.buffer, vec![1, 0, 1, 0, 0]);
    }

    #[test]
    fn budget_exhaustion_keeps_best_so_far() {
        let list = vecs(integers::<u8>(), 0, 20);
        let input = vec![1, 7, 1, 8, 1, 9, 1, 10, 0];
        let (result, complete) = shrink_with(
            |data| Ok(data.draw(&list)?.len() >= 2),
            input.clone(),
            4,
        );
        assert!(!complete);
        assert!(sort_key(&result.buffer) <= sort_key(&input));
        assert!(result.status.is_interesting());
    }

    #[test]
    fn helpers_edit_ranges() {
        assert_eq!(delete_ranges(&[0, 1, 2, 3, 4], &[(0, 1), (3, 5)]), vec![1, 2]);
        assert_eq!(
            rearrange(&[9, 1, 2, 8, 3], &[(1, 3), (4, 5)], &[vec![3], vec![1, 2]]),
            vec![9, 3, 8, 1, 2]
        );
    }
}
