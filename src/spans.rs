//! Interval tracking.
//!
//! Every strategy-level draw is bracketed by `start`/`stop`, which records the
//! `[start, end)` range of buffer bytes it consumed together with its nesting
//! depth. Because brackets nest like a call stack, the recorded spans always
//! form a laminar family: two spans are either disjoint or one contains the
//! other. That is what lets the shrinker treat "delete this span" as "delete
//! this value".

use std::cmp::Reverse;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub label: &'static str,
    pub start: usize,
    pub end: usize,
    pub depth: usize,
    /// Index of the enclosing span in the same list, if any.
    pub parent: Option<usize>,
    /// Set for spans whose value was thrown away (a rejected filter attempt,
    /// or a draw cut short by the end of the execution).
    pub discarded: bool,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    fn disjoint(&self, other: &Span) -> bool {
        self.end <= other.start || other.end <= self.start
    }
}

#[derive(Debug, Clone)]
struct OpenSpan {
    label: &'static str,
    start: usize,
    end: Option<usize>,
    depth: usize,
    parent: Option<usize>,
    discarded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SpanTracker {
    spans: Vec<OpenSpan>,
    stack: Vec<usize>,
}

impl SpanTracker {
    pub fn new() -> Self {
        SpanTracker::default()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn start(&mut self, label: &'static str, at: usize) {
        let i = self.spans.len();
        self.spans.push(OpenSpan {
            label,
            start: at,
            end: None,
            depth: self.stack.len(),
            parent: self.stack.last().copied(),
            discarded: false,
        });
        self.stack.push(i);
    }

    /// Renames the innermost open span.
    pub fn relabel(&mut self, label: &'static str) {
        if let Some(&i) = self.stack.last() {
            self.spans[i].label = label;
        }
    }

    /// Closes the innermost open span. Returns false if none was open.
    pub fn stop(&mut self, at: usize, discard: bool) -> bool {
        match self.stack.pop() {
            Some(i) => {
                let span = &mut self.spans[i];
                span.end = Some(at);
                span.discarded |= discard;
                true
            }
            None => false,
        }
    }

    /// Closes anything still open at `at` (marking it discarded) and returns
    /// the spans in the order they were started.
    pub fn finish(mut self, at: usize) -> Vec<Span> {
        while self.stop(at, true) {}
        self.spans
            .into_iter()
            .map(|s| Span {
                label: s.label,
                start: s.start,
                end: s.end.unwrap_or(at),
                depth: s.depth,
                parent: s.parent,
                discarded: s.discarded,
            })
            .collect()
    }
}

/// True if no two spans partially overlap.
pub fn is_laminar(spans: &[Span]) -> bool {
    let mut ordered: Vec<&Span> = spans.iter().filter(|s| !s.is_empty()).collect();
    ordered.sort_by_key(|s| (s.start, Reverse(s.end)));

    let mut stack: Vec<&Span> = Vec::new();
    for span in ordered {
        while let Some(top) = stack.last() {
            if top.end <= span.start {
                stack.pop();
            } else {
                break;
            }
        }
        if let Some(top) = stack.last() {
            if !top.contains(span) && !top.disjoint(span) {
                return false;
            }
        }
        stack.push(span);
    }
    true
}

/// Groups of two or more non-empty sibling spans (same parent, same label),
/// each group in buffer order. These are the candidates for reordering and
/// deduplication, e.g. the elements of one list.
pub fn sibling_groups(spans: &[Span]) -> Vec<Vec<usize>> {
    let mut groups: BTreeMap<(Option<usize>, &'static str), Vec<usize>> = BTreeMap::new();
    for (i, span) in spans.iter().enumerate() {
        if !span.is_empty() && !span.discarded {
            groups.entry((span.parent, span.label)).or_default().push(i);
        }
    }
    groups
        .into_values()
        .filter(|g| g.len() > 1)
        .map(|mut g| {
            g.sort_by_key(|&i| spans[i].start);
            g
        })
        .collect()
}
