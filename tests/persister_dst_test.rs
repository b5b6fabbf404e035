//! Persister Deterministic Simulation Tests
//!
//! DST tests for RowPersister with multiple seeds.

use redis_row_stream::persister_dst::{
    run_persister_batch, summarize_persister_batch, PersisterDSTConfig, PersisterDSTHarness,
};

// =============================================================================
// Standard Configuration Tests - 100+ Seeds
// =============================================================================

#[test]
fn test_persister_dst_100_seeds_standard() {
    let results = run_persister_batch(0, 100, 500, PersisterDSTConfig::new);
    let summary = summarize_persister_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 100, "All 100 seeds should pass with standard config");
}

#[test]
fn test_persister_dst_100_seeds_hash_indexed() {
    let results = run_persister_batch(1000, 100, 500, PersisterDSTConfig::hash_indexed);
    let summary = summarize_persister_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 100, "All 100 seeds should pass with hash + index");
}

#[test]
fn test_persister_dst_100_seeds_high_churn() {
    let results = run_persister_batch(2000, 100, 500, PersisterDSTConfig::high_churn);
    let summary = summarize_persister_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 100, "All 100 seeds should pass with high churn");
}

// =============================================================================
// Stress Tests
// =============================================================================

#[test]
fn test_persister_dst_stress_5000_ops() {
    // No close/destroy so the persister stays open for the whole run
    let config = PersisterDSTConfig {
        close_prob: 0.0,
        destroy_prob: 0.0,
        ..PersisterDSTConfig::new(12345)
    };
    let mut harness = PersisterDSTHarness::new(config);
    harness.run(5000);
    let result = harness.result();
    println!("Stress 5000 ops: {}", result.summary());
    assert!(result.is_success(), "5000 ops should maintain invariants");
    assert_eq!(harness.persister().next_event_id(), result.accepted);
    assert!(result.accepted > 1000);
}

#[test]
fn test_persister_dst_terminal_is_sticky() {
    let config = PersisterDSTConfig {
        close_prob: 0.2,
        ..PersisterDSTConfig::new(7)
    };
    let mut harness = PersisterDSTHarness::new(config);
    harness.run(1000);
    let result = harness.result();
    assert!(result.is_success(), "{:?}", result.invariant_violations);
    assert!(harness.persister().is_ended());
    assert!(result.rejected_closed > 0);
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn test_persister_dst_same_seed_same_run() {
    let a = run_persister_batch(500, 10, 300, PersisterDSTConfig::high_churn);
    let b = run_persister_batch(500, 10, 300, PersisterDSTConfig::high_churn);
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.accepted, y.accepted, "seed {}", x.seed);
        assert_eq!(x.rejected_paused, y.rejected_paused, "seed {}", x.seed);
        assert_eq!(x.rejected_closed, y.rejected_closed, "seed {}", x.seed);
    }
}
