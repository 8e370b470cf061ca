//! # Engine Test Suite
//!
//! End-to-end runs through the public entry points: generation, shrinking,
//! multi-failure reporting, example reuse through both store backends, and
//! reproduction blobs.

use conjecture_kernel::blob::ENGINE_VERSION;
use conjecture_kernel::engine::{reproduce, run_generation, run_generation_with_store};
use conjecture_kernel::error::{BlobError, EngineError};
use conjecture_kernel::failure::{assume, ensure, Failure, Signature, PANIC};
use conjecture_kernel::store::{DirectoryStore, ExampleStore, InMemoryStore, StoreKey};
use conjecture_kernel::strategy::{integers, vecs, Strategy};
use conjecture_kernel::{Phase, RunnerConfig, TestError};

fn test_config() -> RunnerConfig {
    RunnerConfig {
        seed: 42,
        ..RunnerConfig::default()
    }
}

fn no_adjacent_duplicates(xs: Vec<u8>) -> Result<(), TestError> {
    ensure(
        xs.windows(2).all(|w| w[0] != w[1]),
        "adjacent elements are equal",
    )
}

/// Fails one way for large values and another way for medium ones.
fn two_bugs(x: u8) -> Result<(), TestError> {
    if x >= 128 {
        let table = [0u8; 4];
        let _ = table[x as usize];
    }
    if x >= 10 {
        return Err(Failure::with_signature(
            Signature::new("assertion", "two_bugs:medium"),
            format!("{} is too big", x),
        )
        .into());
    }
    Ok(())
}

// === GENERATION AND SHRINKING ===

#[test]
fn test_adjacent_duplicates_shrink_to_two_zeros() {
    let report = run_generation(
        &vecs(integers::<u8>(), 0, 10),
        no_adjacent_duplicates,
        &test_config(),
    )
    .unwrap()
    .expect("a duplicate pair should be found");

    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.buffer, vec![1, 0, 1, 0, 0]);
    assert_eq!(failure.notes, vec!["[0, 0]".to_string()]);
    assert!(failure.shrink_complete);
    assert!(report.stats.shrink_calls > 0);
}

#[test]
fn test_passing_property_returns_none() {
    let result = run_generation(
        &vecs(integers::<u8>(), 0, 10),
        |xs| ensure(xs.len() <= 10, "too long"),
        &test_config(),
    );
    assert!(matches!(result, Ok(None)));
}

#[test]
fn test_panics_are_failures() {
    let report = run_generation(
        &integers::<u8>(),
        |x| {
            assert!(x < 200, "x was {}", x);
            Ok(())
        },
        &test_config(),
    )
    .unwrap()
    .unwrap();
    let failure = &report.failures[0];
    assert_eq!(failure.signature.category, PANIC);
    assert_eq!(failure.buffer, vec![200]);
}

#[test]
fn test_filter_rejecting_everything_is_unsatisfiable() {
    let result = run_generation(
        &integers::<u8>().filter(|_| false),
        |_| Ok(()),
        &test_config(),
    );
    match result {
        Err(EngineError::Unsatisfiable { valid, required, .. }) => {
            assert_eq!(valid, 0);
            assert_eq!(required, 1);
        }
        other => panic!("expected unsatisfiable, got {:?}", other),
    }
}

#[test]
fn test_assume_counts_as_invalid() {
    let result = run_generation(
        &integers::<u8>(),
        |x| {
            assume(x % 2 == 0)?;
            ensure(x % 2 == 0, "odd value got through")
        },
        &test_config(),
    );
    assert!(matches!(result, Ok(None)));
}

// === MULTIPLE FAILURES ===

#[test]
fn test_stored_failures_with_different_signatures_are_all_reported() {
    let store = InMemoryStore::new();
    let key = StoreKey::from_identity(b"two_bugs");
    store.save(&key, &[200]).unwrap();
    store.save(&key, &[50]).unwrap();

    let report =
        run_generation_with_store(&integers::<u8>(), two_bugs, &test_config(), &store, &key)
            .unwrap()
            .unwrap();

    assert_eq!(report.failures.len(), 2);
    let medium = report
        .get(&Signature::new("assertion", "two_bugs:medium"))
        .expect("medium failure reported");
    assert_eq!(medium.buffer, vec![10]);
    let large = report
        .failures
        .iter()
        .find(|f| f.signature.category == PANIC)
        .expect("index failure reported");
    assert_eq!(large.buffer, vec![128]);

    let mut stored = store.fetch(&key).unwrap();
    stored.sort();
    assert_eq!(stored, vec![vec![10], vec![128]]);
}

#[test]
fn test_generation_alone_finds_both_bugs() {
    for seed in 0..5 {
        let config = RunnerConfig {
            seed,
            ..test_config()
        };
        let report = run_generation(&integers::<u8>(), two_bugs, &config)
            .unwrap()
            .expect("both bugs are easy to hit");

        assert_eq!(report.failures.len(), 2, "seed {}", seed);
        let medium = report
            .get(&Signature::new("assertion", "two_bugs:medium"))
            .expect("medium failure reported");
        assert_eq!(medium.buffer, vec![10]);
        let large = report
            .failures
            .iter()
            .find(|f| f.signature.category == PANIC)
            .expect("index failure reported");
        assert_eq!(large.buffer, vec![128]);
    }
}

#[test]
fn test_shrinking_into_another_bug_keeps_both() {
    let store = InMemoryStore::new();
    let key = StoreKey::from_identity(b"slippage");
    store.save(&key, &[255]).unwrap();

    let report =
        run_generation_with_store(&integers::<u8>(), two_bugs, &test_config(), &store, &key)
            .unwrap()
            .unwrap();

    let mut buffers: Vec<Vec<u8>> = report.failures.iter().map(|f| f.buffer.clone()).collect();
    buffers.sort();
    assert_eq!(buffers, vec![vec![10], vec![128]]);
}

// === EXAMPLE REUSE ===

#[test]
fn test_fixed_failure_is_deleted_from_memory_store() {
    let store = InMemoryStore::new();
    let key = StoreKey::from_identity(b"fixed");
    store.save(&key, &[1, 7, 1, 7, 0]).unwrap();

    let result = run_generation_with_store(
        &vecs(integers::<u8>(), 0, 10),
        |_| Ok(()),
        &test_config(),
        &store,
        &key,
    );
    assert!(matches!(result, Ok(None)));
    assert!(store.fetch(&key).unwrap().is_empty());
}

#[test]
fn test_fixed_failure_is_deleted_from_directory_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryStore::new(dir.path()).unwrap();
    let key = StoreKey::from_identity(b"fixed");
    store.save(&key, &[1, 7, 1, 7, 0]).unwrap();

    let result = run_generation_with_store(
        &vecs(integers::<u8>(), 0, 10),
        |_| Ok(()),
        &test_config(),
        &store,
        &key,
    );
    assert!(matches!(result, Ok(None)));
    assert!(store.fetch(&key).unwrap().is_empty());
}

#[test]
fn test_stored_failure_is_replayed_without_generation() {
    let store = InMemoryStore::new();
    let key = StoreKey::from_identity(b"replayed");
    store.save(&key, &[1, 3, 1, 3, 0]).unwrap();

    let config = RunnerConfig {
        phases: vec![Phase::Reuse, Phase::Shrink],
        ..test_config()
    };
    let report = run_generation_with_store(
        &vecs(integers::<u8>(), 0, 10),
        no_adjacent_duplicates,
        &config,
        &store,
        &key,
    )
    .unwrap()
    .unwrap();
    assert_eq!(report.failures[0].buffer, vec![1, 0, 1, 0, 0]);
    assert_eq!(report.stats.reused_examples, 1);
    assert_eq!(store.fetch(&key).unwrap(), vec![vec![1, 0, 1, 0, 0]]);
}

#[test]
fn test_second_run_starts_from_saved_minimum() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryStore::new(dir.path()).unwrap();
    let key = StoreKey::from_identity(b"second run");
    let strategy = vecs(integers::<u8>(), 0, 10);

    let run = || {
        run_generation_with_store(&strategy, no_adjacent_duplicates, &test_config(), &store, &key)
            .unwrap()
            .unwrap()
    };
    let first = run();
    let second = run();

    assert_eq!(first.failures[0].buffer, second.failures[0].buffer);
    // Earlier, larger failures sit in the secondary corpus and are replayed too.
    assert!(second.stats.reused_examples >= 1);
    assert_eq!(second.stats.valid_examples, 0);
}

#[test]
fn test_secondary_corpus_is_pruned() {
    let store = InMemoryStore::new();
    let key = StoreKey::from_identity(b"pruned");
    for i in 0..10u8 {
        store.save(&key.secondary(), &[i, i, i]).unwrap();
    }
    let config = RunnerConfig {
        max_secondary_corpus: 3,
        ..test_config()
    };
    let result = run_generation_with_store(&integers::<u8>(), |_| Ok(()), &config, &store, &key);
    assert!(matches!(result, Ok(None)));
    assert!(store.fetch(&key.secondary()).unwrap().len() <= 3);
}

// === REPRODUCTION BLOBS ===

#[test]
fn test_blob_reproduces_failure() {
    let strategy = vecs(integers::<u8>(), 0, 10);
    let report = run_generation(&strategy, no_adjacent_duplicates, &test_config())
        .unwrap()
        .unwrap();
    let blob = report.failures[0].reproduction_blob();
    assert_eq!(blob, "AAEAAQAA");

    let reproduced = reproduce(
        &strategy,
        no_adjacent_duplicates,
        ENGINE_VERSION,
        &blob,
        &test_config(),
    )
    .unwrap()
    .expect("blob still fails");
    assert_eq!(reproduced.signature, report.failures[0].signature);
    assert_eq!(reproduced.notes, vec!["[0, 0]".to_string()]);
}

#[test]
fn test_blob_for_passing_test_reproduces_nothing() {
    let strategy = vecs(integers::<u8>(), 0, 10);
    let reproduced =
        reproduce(&strategy, |_| Ok(()), ENGINE_VERSION, "AAEAAQAA", &test_config()).unwrap();
    assert!(reproduced.is_none());
}

#[test]
fn test_blob_from_other_version_is_refused() {
    let strategy = integers::<u8>();
    let result = reproduce(&strategy, |_| Ok(()), "0.0.0-elsewhere", "AAE=", &test_config());
    assert!(matches!(
        result,
        Err(EngineError::Blob(BlobError::VersionMismatch { .. }))
    ));
}

// === CONFIGURATION ===

#[test]
fn test_invalid_config_is_rejected_before_running() {
    let config = RunnerConfig {
        max_buffer_bytes: 0,
        ..test_config()
    };
    let result = run_generation(&integers::<u8>(), |_| Ok(()), &config);
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[test]
fn test_same_seed_gives_same_run() {
    let strategy = vecs(integers::<u8>(), 0, 10);
    let sum_is_small = |xs: Vec<u8>| ensure(xs.iter().map(|&x| x as u32).sum::<u32>() < 300, "sum");
    let a = run_generation(&strategy, sum_is_small, &test_config()).unwrap().unwrap();
    let b = run_generation(&strategy, sum_is_small, &test_config()).unwrap().unwrap();
    assert_eq!(a.failures, b.failures);
    assert_eq!(a.stats.valid_examples, b.stats.valid_examples);
}
