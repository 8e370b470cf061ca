//! # Engine: generation, shrinking and example reuse
//!
//! The [`Engine`] drives a test function through the phases of a run:
//!
//! 1. **Reuse**: replay every buffer stored under the test's key (topping up
//!    from the secondary corpus when the primary one is small). Stored
//!    buffers that no longer fail are deleted.
//! 2. **Generate**: if reuse found nothing, first try the all-zero buffer
//!    and then generate fresh examples from a seeded ChaCha stream. After
//!    the first failure, generation keeps looking for other failure
//!    signatures for a bounded number of extra calls. It always stops once
//!    enough valid examples have run or the attempt or time budget is spent.
//! 3. **Shrink**: every failure signature gets its own shrink track. All
//!    tracks share one execution budget; results found while shrinking one
//!    track are offered to every other track through the
//!    [`FailureTracker`], so a shrink that slips into a different bug opens
//!    a new track rather than replacing the original failure.
//!
//! Each distinct failure is replayed once before it is shrunk and once more
//! for the final report; a failure that does not reproduce is reported as
//! [`EngineError::Flaky`].
//!
//! ## Entry points
//!
//! - [`run_generation`] / [`run_generation_with_store`]: draw a value from a
//!   strategy and pass it to a test closure, for every example.
//! - [`shrink`]: shrink one known failing buffer.
//! - [`reproduce`]: replay a reproduction blob once.
//! - [`Engine`] itself, for tests that draw from [`TestData`] directly.
//!
//! ```no_run
//! use conjecture_kernel::engine::run_generation;
//! use conjecture_kernel::failure::ensure;
//! use conjecture_kernel::strategy::{integers, vecs};
//! use conjecture_kernel::RunnerConfig;
//!
//! let strategy = vecs(integers::<u8>(), 0, 10);
//! let report = run_generation(
//!     &strategy,
//!     |xs: Vec<u8>| ensure(xs.windows(2).all(|w| w[0] != w[1]), "adjacent duplicates"),
//!     &RunnerConfig::default(),
//! )?;
//! if let Some(failures) = report {
//!     for failure in &failures.failures {
//!         println!("{}", failure);
//!     }
//! }
//! # Ok::<(), conjecture_kernel::error::EngineError>(())
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::blob::{decode_versioned, encode_failure};
use crate::config::{Phase, RunnerConfig};
use crate::coordinator::{Consideration, FailureTracker};
use crate::data::{sort_key, Status, TestData, TestResult};
use crate::error::{DrawError, EngineError, EngineResult, StoreResult};
use crate::failure::{catch_test, Signature, TestError};
use crate::shrinker::{BudgetExhausted, Evaluator, Shrinker};
use crate::store::{ExampleStore, StoreKey};
use crate::strategy::Strategy;

/// Cached shrink results are dropped wholesale beyond this many entries.
const CACHE_LIMIT: usize = 20_000;

/// Executions generation keeps going for after the first failure.
const EXTRA_SEARCH_CALLS: u64 = 1000;

/// Executions generation keeps going for after any new failure signature,
/// unless the budget after the first one is already spent.
const MIN_SEARCH_AFTER_BUG: u64 = 100;

/// When, counted in executions, failure signatures were first seen.
#[derive(Debug, Default)]
struct FoundAt {
    signatures: usize,
    first: Option<u64>,
    last: u64,
}

impl FoundAt {
    fn update(&mut self, signatures: usize, calls: u64) {
        if signatures > self.signatures {
            self.signatures = signatures;
            self.first.get_or_insert(calls);
            self.last = calls;
        }
    }

    /// Once a failure is known, searching for others continues while the
    /// call count stays below both `first + EXTRA_SEARCH_CALLS` and twice
    /// the call count of the latest discovery.
    fn search_is_over(&self, calls: u64) -> bool {
        match self.first {
            None => false,
            Some(first) => {
                let doubling = (self.last * 2).max(self.last + MIN_SEARCH_AFTER_BUG);
                calls >= (first + EXTRA_SEARCH_CALLS).min(doubling)
            }
        }
    }
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub valid_examples: u64,
    pub invalid_examples: u64,
    pub overrun_examples: u64,
    pub interesting_examples: u64,
    /// Stored buffers replayed during reuse.
    pub reused_examples: u64,
    /// Executions charged to the shrink budget.
    pub shrink_calls: u64,
    /// Shrink candidates answered from the cache.
    pub cache_hits: u64,
    /// Accepted shrink improvements, over all tracks.
    pub shrink_improvements: u64,
    pub reuse_time: Duration,
    pub generate_time: Duration,
    pub shrink_time: Duration,
}

impl RunStats {
    pub fn total_examples(&self) -> u64 {
        self.valid_examples
            + self.invalid_examples
            + self.overrun_examples
            + self.interesting_examples
    }
}

/// The minimal reproducing case for one failure signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinimalFailure {
    pub signature: Signature,
    pub buffer: Vec<u8>,
    pub message: Option<String>,
    /// Notes attached while replaying the final buffer, typically the
    /// `Debug` form of the drawn value.
    pub notes: Vec<String>,
    /// `false` if the shrink budget ran out (or shrinking was disabled)
    /// before this failure reached a fixed point.
    pub shrink_complete: bool,
}

impl MinimalFailure {
    fn from_result(result: TestResult, shrink_complete: bool) -> Option<Self> {
        let signature = result.signature()?.clone();
        Some(MinimalFailure {
            signature,
            buffer: result.buffer,
            message: result.message,
            notes: result.notes,
            shrink_complete,
        })
    }

    /// A string that [`reproduce`] accepts to replay this failure.
    pub fn reproduction_blob(&self) -> String {
        encode_failure(&self.buffer)
    }
}

impl fmt::Display for MinimalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature)?;
        if let Some(message) = self.message.as_deref().filter(|m| !m.is_empty()) {
            write!(f, ": {}", message)?;
        }
        for note in &self.notes {
            write!(f, "\n    {}", note)?;
        }
        if !self.shrink_complete {
            write!(f, "\n    (shrinking did not finish; this example may not be minimal)")?;
        }
        write!(f, "\n    reproduce with blob {:?}", self.reproduction_blob())
    }
}

/// Every distinct failure a run found, simplest first.
#[derive(Debug, Clone)]
pub struct FailureSet {
    pub failures: Vec<MinimalFailure>,
    pub stats: RunStats,
}

impl FailureSet {
    pub fn get(&self, signature: &Signature) -> Option<&MinimalFailure> {
        self.failures.iter().find(|f| &f.signature == signature)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenerationEnd {
    FoundFailure,
    EnoughValid,
    AttemptsExhausted,
    TimedOut,
}

/// Runs a test function over generated, stored and shrunk buffers.
pub struct Engine<'s, F> {
    test: F,
    config: RunnerConfig,
    rng: ChaCha8Rng,
    store: Option<(&'s dyn ExampleStore, StoreKey)>,
    tracker: FailureTracker,
    stats: RunStats,
    cache: HashMap<Vec<u8>, TestResult>,
    shrink_deadline: Option<Instant>,
    incomplete: BTreeSet<Signature>,
}

impl<'s, F> Engine<'s, F>
where
    F: Fn(&mut TestData) -> Result<(), TestError>,
{
    pub fn new(test: F, config: RunnerConfig) -> Self {
        Engine {
            test,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            store: None,
            tracker: FailureTracker::new(),
            stats: RunStats::default(),
            cache: HashMap::new(),
            shrink_deadline: None,
            incomplete: BTreeSet::new(),
        }
    }

    /// Persists failures under `key` and replays what is already stored there.
    pub fn with_store(mut self, store: &'s dyn ExampleStore, key: StoreKey) -> Self {
        self.store = Some((store, key));
        self
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Runs every configured phase. `Ok(None)` means no failure was found
    /// and enough valid examples ran.
    pub fn run(mut self) -> EngineResult<Option<FailureSet>> {
        self.config.validate()?;
        debug!("starting run with {:?}", self.config);

        if self.config.has_phase(Phase::Reuse) {
            let start = Instant::now();
            self.reuse_examples();
            self.stats.reuse_time = start.elapsed();
        }

        let mut generation = None;
        if self.config.has_phase(Phase::Generate) && self.tracker.is_empty() {
            let start = Instant::now();
            generation = Some(self.generate_examples());
            self.stats.generate_time = start.elapsed();
        }

        if self.tracker.is_empty() {
            self.prune_secondary_corpus();
            return match generation {
                Some(end) => self.check_satisfied(end).map(|()| None),
                None => Ok(None),
            };
        }

        self.clear_secondary_key();

        if self.config.has_phase(Phase::Shrink) {
            let start = Instant::now();
            let shrunk = self.shrink_failures();
            self.stats.shrink_time = start.elapsed();
            shrunk?;
        } else {
            self.incomplete.extend(self.tracker.signatures().cloned());
        }

        let failures = self.report_failures()?;
        self.save_failures(&failures)?;
        self.prune_secondary_corpus();
        info!(
            "run finished with {} distinct failures after {} examples",
            failures.len(),
            self.stats.total_examples()
        );
        Ok(Some(FailureSet {
            failures,
            stats: self.stats,
        }))
    }

    /// Runs the test once on `data` and records the result.
    fn execute(&mut self, mut data: TestData) -> TestResult {
        let test = &self.test;
        let outcome = catch_test(|| test(&mut data));
        let (status, message) = match outcome {
            Ok(()) => (Status::Valid, None),
            Err(TestError::Draw(DrawError::Overrun)) => (Status::Overrun, None),
            Err(TestError::Draw(DrawError::Invalid(_))) => (Status::Invalid, None),
            Err(TestError::Failed(failure)) => {
                (Status::Interesting(failure.signature), Some(failure.message))
            }
        };
        let result = data.finish(status, message);

        match &result.status {
            Status::Valid => self.stats.valid_examples += 1,
            Status::Invalid => self.stats.invalid_examples += 1,
            Status::Overrun => self.stats.overrun_examples += 1,
            Status::Interesting(_) => self.stats.interesting_examples += 1,
        }
        self.record(&result);
        result
    }

    fn replay(&mut self, buffer: &[u8]) -> TestResult {
        let max = self.config.max_buffer_bytes;
        self.execute(TestData::for_buffer(buffer.to_vec(), max))
    }

    /// Offers a result to the failure tracker, keeping the store's primary
    /// corpus in step with the best buffer of each signature.
    fn record(&mut self, result: &TestResult) {
        match self.tracker.consider(result) {
            Consideration::New => {
                if let Some(signature) = result.signature() {
                    info!(
                        "found failure {} with a {} byte buffer",
                        signature,
                        result.buffer.len()
                    );
                }
                self.store_op("save", |store, key| store.save(key, &result.buffer));
            }
            Consideration::Improved { previous } => {
                self.store_op("save", |store, key| store.save(key, &result.buffer));
                self.store_op("move to secondary", |store, key| {
                    store.move_value(key, &key.secondary(), &previous.buffer)
                });
            }
            Consideration::NotBetter | Consideration::Uninteresting => (),
        }
    }

    /// Runs a store operation against the primary key. Store failures never
    /// abort a run in progress, so they are only logged here.
    fn store_op<G>(&self, what: &str, op: G)
    where
        G: FnOnce(&dyn ExampleStore, &StoreKey) -> StoreResult<()>,
    {
        if let Some((store, key)) = &self.store {
            if let Err(e) = op(*store, key) {
                warn!("example store {} failed for {}: {}", what, key.to_hex(), e);
            }
        }
    }

    fn fetch_sorted(&self, key: &StoreKey) -> Vec<Vec<u8>> {
        let Some((store, _)) = &self.store else {
            return Vec::new();
        };
        match store.fetch(key) {
            Ok(mut values) => {
                values.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
                values
            }
            Err(e) => {
                warn!("could not read stored examples for {}: {}", key.to_hex(), e);
                Vec::new()
            }
        }
    }

    fn reuse_examples(&mut self) {
        let Some((_, key)) = self.store.clone() else {
            return;
        };
        let secondary_key = key.secondary();
        let primary = self.fetch_sorted(&key);
        let desired = self.config.desired_reuse_size();
        let mut secondary = Vec::new();
        if primary.len() < desired {
            secondary = self.fetch_sorted(&secondary_key);
            secondary.truncate(desired - primary.len());
        }
        debug!(
            "reusing {} primary and {} secondary examples",
            primary.len(),
            secondary.len()
        );

        for buffer in &primary {
            let result = self.replay(buffer);
            self.stats.reused_examples += 1;
            let is_best = result
                .signature()
                .and_then(|s| self.tracker.get(s))
                .map_or(false, |best| &best.buffer == buffer);
            if is_best {
                continue;
            }
            if result.status.is_interesting() {
                self.store_op("move to secondary", |store, key| {
                    store.move_value(key, &key.secondary(), buffer)
                });
            } else {
                self.store_op("delete", |store, key| store.delete(key, buffer));
            }
        }

        for buffer in &secondary {
            let result = self.replay(buffer);
            self.stats.reused_examples += 1;
            if !result.status.is_interesting() {
                self.store_op("delete", |store, key| store.delete(&key.secondary(), buffer));
            }
        }

        info!(
            "reuse replayed {} examples and found {} failures",
            self.stats.reused_examples,
            self.tracker.len()
        );
    }

    fn generate_examples(&mut self) -> GenerationEnd {
        let max = self.config.max_buffer_bytes;
        let deadline = self.config.time_budget.map(|budget| Instant::now() + budget);

        let mut found = FoundAt::default();
        let zero = self.execute(TestData::for_buffer(vec![0; max], max));
        found.update(self.tracker.len(), self.stats.total_examples());
        if zero.status == Status::Overrun {
            warn!(
                "the simplest possible example needs more than max_buffer_bytes = {} bytes; \
                 most generated examples are likely to overrun",
                max
            );
        }

        let end = loop {
            let calls = self.stats.total_examples();
            if found.search_is_over(calls) {
                break GenerationEnd::FoundFailure;
            }
            if self.stats.valid_examples >= self.config.max_valid_examples {
                break GenerationEnd::EnoughValid;
            }
            if calls >= self.config.max_total_attempts {
                break GenerationEnd::AttemptsExhausted;
            }
            if deadline.map_or(false, |d| Instant::now() >= d) {
                break GenerationEnd::TimedOut;
            }
            let seed = self.rng.next_u64();
            self.execute(TestData::generating(seed, max));
            found.update(self.tracker.len(), self.stats.total_examples());
        };
        let end = if self.tracker.is_empty() {
            end
        } else {
            GenerationEnd::FoundFailure
        };

        info!(
            "generation ended ({:?}): {} valid, {} invalid, {} overrun, {} failing",
            end,
            self.stats.valid_examples,
            self.stats.invalid_examples,
            self.stats.overrun_examples,
            self.stats.interesting_examples
        );
        end
    }

    fn check_satisfied(&self, end: GenerationEnd) -> EngineResult<()> {
        let valid = self.stats.valid_examples;
        let required = self.config.min_valid_examples;
        if valid >= required {
            return Ok(());
        }
        match (end, self.config.time_budget) {
            (GenerationEnd::TimedOut, Some(budget)) => {
                warn!("time budget of {:?} ran out with only {} valid examples", budget, valid);
                Err(EngineError::Exhausted {
                    budget,
                    valid,
                    required,
                })
            }
            _ => Err(EngineError::Unsatisfiable {
                valid,
                attempts: self.stats.total_examples(),
                required,
            }),
        }
    }

    /// Replays secondary entries no larger than the worst current failure
    /// as free shrink candidates, then drops them from the secondary corpus.
    fn clear_secondary_key(&mut self) {
        let Some((_, key)) = self.store.clone() else {
            return;
        };
        let Some(worst) = self
            .tracker
            .results()
            .last()
            .map(|r| r.buffer.clone())
        else {
            return;
        };
        let secondary_key = key.secondary();
        let candidates: Vec<Vec<u8>> = self
            .fetch_sorted(&secondary_key)
            .into_iter()
            .filter(|b| sort_key(b) <= sort_key(&worst))
            .collect();
        if candidates.is_empty() {
            return;
        }
        debug!("replaying {} secondary examples", candidates.len());
        for buffer in &candidates {
            self.replay(buffer);
            self.store_op("delete", |store, key| store.delete(&key.secondary(), buffer));
        }
    }

    /// Keeps only the `max_secondary_corpus` simplest secondary entries.
    fn prune_secondary_corpus(&mut self) {
        let Some((_, key)) = self.store.clone() else {
            return;
        };
        let secondary = self.fetch_sorted(&key.secondary());
        let limit = self.config.max_secondary_corpus;
        if secondary.len() <= limit {
            return;
        }
        debug!("pruning secondary corpus from {} to {}", secondary.len(), limit);
        for buffer in &secondary[limit..] {
            self.store_op("prune", |store, key| store.delete(&key.secondary(), buffer));
        }
    }

    /// Replays `target` without the cache and fails if it no longer fails
    /// the same way.
    fn check_reproduces(&mut self, target: &TestResult) -> EngineResult<TestResult> {
        let expected = target.signature().cloned();
        let replayed = self.replay(&target.buffer);
        if replayed.signature().cloned() == expected {
            return Ok(replayed);
        }
        let signature = expected.unwrap_or_else(|| Signature::new("unknown", "unknown"));
        warn!(
            "flaky failure {}: replaying its buffer gave {}",
            signature, replayed.status
        );
        Err(EngineError::Flaky {
            signature,
            replayed: replayed.status.to_string(),
            buffer: target.buffer.clone(),
        })
    }

    fn shrink_budget_left(&self) -> bool {
        self.stats.shrink_calls < self.config.max_shrink_attempts
            && self.shrink_deadline.map_or(true, |d| Instant::now() < d)
    }

    fn shrink_failures(&mut self) -> EngineResult<()> {
        self.shrink_deadline = self
            .config
            .shrink_time_budget
            .map(|budget| Instant::now() + budget);

        while let Some(signature) = self.tracker.next_unshrunk() {
            self.tracker.mark_shrunk(&signature);
            let Some(target) = self.tracker.get(&signature).cloned() else {
                continue;
            };
            self.check_reproduces(&target)?;

            if !self.shrink_budget_left() {
                self.incomplete.insert(signature);
                continue;
            }
            debug!(
                "shrinking {} from {} bytes",
                signature,
                target.buffer.len()
            );

            let (complete, changes, size) = {
                let mut shrinker = Shrinker::new(&mut *self, target, |r: &TestResult| {
                    r.signature() == Some(&signature)
                });
                let complete = shrinker.run();
                (complete, shrinker.changes(), shrinker.target().buffer.len())
            };
            self.stats.shrink_improvements += changes;
            // Improvements made by this very shrink reopened the track.
            self.tracker.mark_shrunk(&signature);

            if complete {
                self.incomplete.remove(&signature);
                info!(
                    "shrunk {} to {} bytes with {} improvements",
                    signature, size, changes
                );
            } else {
                warn!(
                    "shrink budget exhausted while shrinking {}; reporting the best \
                     example found so far ({} bytes)",
                    signature, size
                );
                self.incomplete.insert(signature);
            }
        }
        Ok(())
    }

    /// Replays each best buffer once more for the report.
    fn report_failures(&mut self) -> EngineResult<Vec<MinimalFailure>> {
        let targets: Vec<TestResult> = self.tracker.results().into_iter().cloned().collect();
        let mut failures = Vec::with_capacity(targets.len());
        for target in targets {
            let replayed = self.check_reproduces(&target)?;
            let complete = replayed
                .signature()
                .map_or(false, |s| !self.incomplete.contains(s));
            failures.extend(MinimalFailure::from_result(replayed, complete));
        }
        Ok(failures)
    }

    /// Final minimal buffers are the one store write a run does not
    /// tolerate losing.
    fn save_failures(&self, failures: &[MinimalFailure]) -> EngineResult<()> {
        if let Some((store, key)) = &self.store {
            for failure in failures {
                store.save(key, &failure.buffer)?;
            }
        }
        Ok(())
    }
}

impl<'s, F> Evaluator for Engine<'s, F>
where
    F: Fn(&mut TestData) -> Result<(), TestError>,
{
    fn evaluate(&mut self, buffer: &[u8]) -> Result<TestResult, BudgetExhausted> {
        if let Some(cached) = self.cache.get(buffer) {
            self.stats.cache_hits += 1;
            return Ok(cached.clone());
        }
        if !self.shrink_budget_left() {
            return Err(BudgetExhausted);
        }
        self.stats.shrink_calls += 1;
        let result = self.replay(buffer);

        if self.cache.len() >= CACHE_LIMIT {
            self.cache.clear();
        }
        if result.buffer.as_slice() != buffer {
            self.cache.insert(result.buffer.clone(), result.clone());
        }
        self.cache.insert(buffer.to_vec(), result.clone());
        Ok(result)
    }
}

/// Adapts a test over values into a test over [`TestData`]: draw from
/// `strategy`, note the value, run `test` on it.
fn value_test<'a, S, F>(
    strategy: &'a S,
    test: F,
) -> impl Fn(&mut TestData) -> Result<(), TestError> + 'a
where
    S: Strategy,
    S::Value: fmt::Debug,
    F: Fn(S::Value) -> Result<(), TestError> + 'a,
{
    move |data: &mut TestData| {
        let value = data.draw(strategy)?;
        data.note(format!("{:?}", value));
        test(value)
    }
}

/// Generates values from `strategy` and runs `test` on each, shrinking any
/// failures found.
pub fn run_generation<S, F>(
    strategy: &S,
    test: F,
    config: &RunnerConfig,
) -> EngineResult<Option<FailureSet>>
where
    S: Strategy,
    S::Value: fmt::Debug,
    F: Fn(S::Value) -> Result<(), TestError>,
{
    Engine::new(value_test(strategy, test), config.clone()).run()
}

/// As [`run_generation`], replaying and persisting examples under `key`.
pub fn run_generation_with_store<S, F>(
    strategy: &S,
    test: F,
    config: &RunnerConfig,
    store: &dyn ExampleStore,
    key: &StoreKey,
) -> EngineResult<Option<FailureSet>>
where
    S: Strategy,
    S::Value: fmt::Debug,
    F: Fn(S::Value) -> Result<(), TestError>,
{
    Engine::new(value_test(strategy, test), config.clone())
        .with_store(store, key.clone())
        .run()
}

/// Shrinks a buffer known to fail with `signature`.
///
/// Fails with [`EngineError::Flaky`] if the buffer does not reproduce that
/// failure. Other failures met while shrinking are not reported.
pub fn shrink<S, F>(
    strategy: &S,
    test: F,
    buffer: &[u8],
    signature: &Signature,
    config: &RunnerConfig,
) -> EngineResult<MinimalFailure>
where
    S: Strategy,
    S::Value: fmt::Debug,
    F: Fn(S::Value) -> Result<(), TestError>,
{
    config.validate()?;
    let mut engine = Engine::new(value_test(strategy, test), config.clone());
    let initial = engine.replay(buffer);
    if initial.signature() != Some(signature) {
        return Err(EngineError::Flaky {
            signature: signature.clone(),
            replayed: initial.status.to_string(),
            buffer: buffer.to_vec(),
        });
    }
    let start = Instant::now();
    let shrunk = engine.shrink_failures();
    engine.stats.shrink_time = start.elapsed();
    shrunk?;

    let Some(best) = engine.tracker.get(signature).cloned() else {
        return Err(EngineError::Flaky {
            signature: signature.clone(),
            replayed: initial.status.to_string(),
            buffer: buffer.to_vec(),
        });
    };
    let replayed = engine.check_reproduces(&best)?;
    let complete = !engine.incomplete.contains(signature);
    MinimalFailure::from_result(replayed, complete).ok_or_else(|| EngineError::Flaky {
        signature: signature.clone(),
        replayed: Status::Valid.to_string(),
        buffer: best.buffer.clone(),
    })
}

/// Replays a reproduction blob printed by engine `version` once.
///
/// Returns the failure it reproduces, or `None` if the test now passes. The
/// result is not shrunk, so `shrink_complete` is `false`.
pub fn reproduce<S, F>(
    strategy: &S,
    test: F,
    version: &str,
    blob: &str,
    config: &RunnerConfig,
) -> EngineResult<Option<MinimalFailure>>
where
    S: Strategy,
    S::Value: fmt::Debug,
    F: Fn(S::Value) -> Result<(), TestError>,
{
    let buffer = decode_versioned(version, blob)?;
    let mut engine = Engine::new(value_test(strategy, test), config.clone());
    let result = engine.replay(&buffer);
    Ok(MinimalFailure::from_result(result, false))
}
