//! Simulated Store with Fault Injection
//!
//! Wraps another `KvStore` and fails writes with configured probabilities,
//! driven by a seeded RNG so a failing run can be replayed from its seed.

use super::{KvStore, StoreFuture};
use crate::error::StoreError;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// Configuration for simulated fault injection
#[derive(Debug, Clone)]
pub struct SimulatedStoreConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Probability of a SET failing
    pub set_string_fail_prob: f64,
    /// Probability of an HSET failing
    pub set_fields_fail_prob: f64,
    /// Probability of a ZINCRBY failing
    pub sorted_set_fail_prob: f64,
}

impl Default for SimulatedStoreConfig {
    fn default() -> Self {
        SimulatedStoreConfig {
            seed: 0,
            set_string_fail_prob: 0.01,  // 1%
            set_fields_fail_prob: 0.01,  // 1%
            sorted_set_fail_prob: 0.01,  // 1%
        }
    }
}

impl SimulatedStoreConfig {
    pub fn new(seed: u64) -> Self {
        SimulatedStoreConfig {
            seed,
            ..Default::default()
        }
    }

    /// High chaos configuration for stress testing
    pub fn high_chaos(seed: u64) -> Self {
        SimulatedStoreConfig {
            seed,
            set_string_fail_prob: 0.2,
            set_fields_fail_prob: 0.2,
            sorted_set_fail_prob: 0.2,
        }
    }

    /// Every write fails
    pub fn always_fail(seed: u64) -> Self {
        SimulatedStoreConfig {
            seed,
            set_string_fail_prob: 1.0,
            set_fields_fail_prob: 1.0,
            sorted_set_fail_prob: 1.0,
        }
    }

    /// No faults - for baseline testing
    pub fn no_faults(seed: u64) -> Self {
        SimulatedStoreConfig {
            seed,
            set_string_fail_prob: 0.0,
            set_fields_fail_prob: 0.0,
            sorted_set_fail_prob: 0.0,
        }
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedStoreStats {
    pub set_string_attempts: u64,
    pub set_string_failures: u64,
    pub set_fields_attempts: u64,
    pub set_fields_failures: u64,
    pub sorted_set_attempts: u64,
    pub sorted_set_failures: u64,
}

impl SimulatedStoreStats {
    pub fn total_failures(&self) -> u64 {
        self.set_string_failures + self.set_fields_failures + self.sorted_set_failures
    }
}

struct SimulatedStoreInner {
    rng: ChaCha8Rng,
    stats: SimulatedStoreStats,
}

/// Store wrapper that injects write failures
#[derive(Clone)]
pub struct SimulatedStore<S: KvStore> {
    inner_store: S,
    config: SimulatedStoreConfig,
    state: Arc<Mutex<SimulatedStoreInner>>,
}

#[derive(Clone, Copy)]
enum Op {
    SetString,
    SetFields,
    SortedSet,
}

impl<S: KvStore> SimulatedStore<S> {
    pub fn new(inner_store: S, config: SimulatedStoreConfig) -> Self {
        SimulatedStore {
            inner_store,
            state: Arc::new(Mutex::new(SimulatedStoreInner {
                rng: ChaCha8Rng::seed_from_u64(config.seed),
                stats: SimulatedStoreStats::default(),
            })),
            config,
        }
    }

    pub fn stats(&self) -> SimulatedStoreStats {
        self.state.lock().stats.clone()
    }

    pub fn inner(&self) -> &S {
        &self.inner_store
    }

    /// Roll the dice for one operation; `true` means inject a failure
    fn should_fail(&self, op: Op) -> bool {
        let mut state = self.state.lock();
        let prob = match op {
            Op::SetString => self.config.set_string_fail_prob,
            Op::SetFields => self.config.set_fields_fail_prob,
            Op::SortedSet => self.config.sorted_set_fail_prob,
        };
        let fail = state.rng.gen_bool(prob.clamp(0.0, 1.0));
        let stats = &mut state.stats;
        match op {
            Op::SetString => {
                stats.set_string_attempts += 1;
                stats.set_string_failures += fail as u64;
            }
            Op::SetFields => {
                stats.set_fields_attempts += 1;
                stats.set_fields_failures += fail as u64;
            }
            Op::SortedSet => {
                stats.sorted_set_attempts += 1;
                stats.sorted_set_failures += fail as u64;
            }
        }
        fail
    }
}

impl<S: KvStore> KvStore for SimulatedStore<S> {
    fn set_string<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a> {
        if self.should_fail(Op::SetString) {
            return Box::pin(async { Err(StoreError::Injected("SET".to_string())) });
        }
        self.inner_store.set_string(key, value)
    }

    fn set_fields<'a>(&'a self, key: &'a str, fields: &'a [(String, String)]) -> StoreFuture<'a> {
        if self.should_fail(Op::SetFields) {
            return Box::pin(async { Err(StoreError::Injected("HSET".to_string())) });
        }
        self.inner_store.set_fields(key, fields)
    }

    fn add_to_sorted_set<'a>(
        &'a self,
        key: &'a str,
        score: f64,
        member: &'a str,
    ) -> StoreFuture<'a> {
        if self.should_fail(Op::SortedSet) {
            return Box::pin(async { Err(StoreError::Injected("ZINCRBY".to_string())) });
        }
        self.inner_store.add_to_sorted_set(key, score, member)
    }
}
