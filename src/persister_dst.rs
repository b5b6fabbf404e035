//! Deterministic Simulation Testing for RowPersister
//!
//! VOPR-style harness that drives a persister with seeded random lifecycle
//! operations and checks it against a reference model after every step:
//! - keys are `<prefix>:0, 1, 2, ...` with no gaps or repeats
//! - paused and terminal persisters submit nothing
//! - terminal states are never left
//! - notifications match the transitions that actually happened

use crate::config::{PersisterConfig, Structure};
use crate::error::PersistError;
use crate::events::{drain_events, EventBus, LifecycleEvent};
use crate::persister::{Closeable, Flushable, Pausable, PersisterState, RowPersister, Writable};
use crate::record::Record;
use crate::writer::{detached_writer, WriteOp};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;

/// Configuration for persister DST
#[derive(Debug, Clone)]
pub struct PersisterDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    pub structure: Structure,
    /// Index the `A` field
    pub index: bool,
    /// Probability of pause / resume (each)
    pub pause_prob: f64,
    /// Probability of a graceful close
    pub close_prob: f64,
    /// Probability of destroy
    pub destroy_prob: f64,
    /// Probability of flush
    pub flush_prob: f64,
}

impl Default for PersisterDSTConfig {
    fn default() -> Self {
        PersisterDSTConfig {
            seed: 0,
            structure: Structure::String,
            index: false,
            pause_prob: 0.1,
            close_prob: 0.01,
            destroy_prob: 0.005,
            flush_prob: 0.05,
        }
    }
}

impl PersisterDSTConfig {
    pub fn new(seed: u64) -> Self {
        PersisterDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Hash structure with indexing on
    pub fn hash_indexed(seed: u64) -> Self {
        PersisterDSTConfig {
            seed,
            structure: Structure::Hash,
            index: true,
            ..Default::default()
        }
    }

    /// Lots of pausing and early termination
    pub fn high_churn(seed: u64) -> Self {
        PersisterDSTConfig {
            seed,
            pause_prob: 0.3,
            close_prob: 0.05,
            destroy_prob: 0.05,
            ..Default::default()
        }
    }
}

/// Operation type for logging
#[derive(Debug, Clone)]
pub enum PersisterOp {
    Accept { a: String },
    Pause,
    Resume,
    Flush,
    Close { with_record: bool },
    Destroy,
}

/// Result of a persister DST run
#[derive(Debug, Clone)]
pub struct PersisterDSTResult {
    pub seed: u64,
    pub total_operations: u64,
    pub accepted: u64,
    pub rejected_paused: u64,
    pub rejected_closed: u64,
    pub invariant_violations: Vec<String>,
    pub last_op: Option<PersisterOp>,
}

impl PersisterDSTResult {
    pub fn new(seed: u64) -> Self {
        PersisterDSTResult {
            seed,
            total_operations: 0,
            accepted: 0,
            rejected_paused: 0,
            rejected_closed: 0,
            invariant_violations: Vec::new(),
            last_op: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} ops (accepted:{}, paused:{}, closed:{}), {} violations",
            self.seed,
            self.total_operations,
            self.accepted,
            self.rejected_paused,
            self.rejected_closed,
            self.invariant_violations.len()
        )
    }
}

/// DST harness for RowPersister
pub struct PersisterDSTHarness {
    config: PersisterDSTConfig,
    rng: ChaCha8Rng,
    persister: RowPersister,
    queue: mpsc::UnboundedReceiver<WriteOp>,
    events: mpsc::UnboundedReceiver<LifecycleEvent>,
    result: PersisterDSTResult,
    /// Model state
    expected_state: PersisterState,
    expected_next_id: u64,
    expected_events: Vec<LifecycleEvent>,
}

const PREFIX: &str = "dst";

impl PersisterDSTHarness {
    pub fn new(config: PersisterDSTConfig) -> Self {
        let mut persister_config = PersisterConfig::new(PREFIX).with_structure(config.structure);
        if config.index {
            persister_config = persister_config.with_index(["A"]);
        }
        let (writer, queue) = detached_writer();
        let bus = EventBus::new();
        let events = bus.subscribe();

        PersisterDSTHarness {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            persister: RowPersister::with_writer(persister_config, writer, bus),
            queue,
            events,
            result: PersisterDSTResult::new(config.seed),
            config,
            expected_state: PersisterState::Open,
            expected_next_id: 0,
            expected_events: Vec::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(PersisterDSTConfig::new(seed))
    }

    fn random_record(&mut self) -> Record {
        // Empty A values must not be indexed
        let a = if self.rng.gen_bool(0.2) {
            String::new()
        } else {
            format!("word{}", self.rng.gen_range(0..20))
        };
        Record::from_pairs(&[("A", a.as_str()), ("B", "b"), ("C", "c")])
    }

    fn model_accept(&mut self, record: &Record, got: Result<bool, PersistError>) -> Result<(), String> {
        let expected = match self.expected_state {
            PersisterState::Ended | PersisterState::Destroyed => Err(PersistError::Closed),
            PersisterState::Paused => Ok(false),
            PersisterState::Open => Ok(true),
        };
        if got != expected {
            return Err(format!("accept returned {:?}, expected {:?}", got, expected));
        }
        match got {
            Ok(true) => {
                self.result.accepted += 1;
                let key = format!("{}:{}", PREFIX, self.expected_next_id);
                self.expected_next_id += 1;
                self.check_submitted(&key, record)
            }
            Ok(false) => {
                self.result.rejected_paused += 1;
                self.check_nothing_submitted()
            }
            Err(_) => {
                self.result.rejected_closed += 1;
                self.check_nothing_submitted()
            }
        }
    }

    fn check_submitted(&mut self, key: &str, record: &Record) -> Result<(), String> {
        let mut ops = Vec::new();
        while let Ok(op) = self.queue.try_recv() {
            ops.push(op);
        }
        let a_indexed = self.config.index && record.get("A").is_some_and(|a| !a.is_empty());
        let expected_len = 1 + a_indexed as usize;
        if ops.len() != expected_len {
            return Err(format!(
                "expected {} ops for {}, got {}",
                expected_len,
                key,
                ops.len()
            ));
        }
        if ops.iter().any(|op| op.key() != Some(key)) {
            return Err(format!("op keys {:?} != {}", ops.iter().map(WriteOp::key).collect::<Vec<_>>(), key));
        }
        match (&ops[0], self.config.structure) {
            (WriteOp::SetString { value, .. }, Structure::String) => {
                let decoded = Record::from_json(value).map_err(|e| e.to_string())?;
                if &decoded != record {
                    return Err(format!("stored string {} does not decode to record", value));
                }
            }
            (WriteOp::SetFields { fields, .. }, Structure::Hash) => {
                if fields != &record.to_fields() {
                    return Err(format!("stored fields {:?} differ from record", fields));
                }
            }
            (op, structure) => {
                return Err(format!("op {:?} does not match structure {}", op, structure))
            }
        }
        Ok(())
    }

    fn check_nothing_submitted(&mut self) -> Result<(), String> {
        match self.queue.try_recv() {
            Ok(op) => Err(format!("unexpected op submitted: {:?}", op)),
            Err(_) => Ok(()),
        }
    }

    fn run_single_op(&mut self) {
        let roll: f64 = self.rng.gen();
        let c = &self.config;
        let t_pause = c.pause_prob;
        let t_resume = t_pause + c.pause_prob;
        let t_flush = t_resume + c.flush_prob;
        let t_close = t_flush + c.close_prob;
        let t_destroy = t_close + c.destroy_prob;

        let outcome = if roll < t_pause {
            self.result.last_op = Some(PersisterOp::Pause);
            self.persister.pause();
            if self.expected_state == PersisterState::Open {
                self.expected_state = PersisterState::Paused;
                self.expected_events.push(LifecycleEvent::Paused);
            }
            Ok(())
        } else if roll < t_resume {
            self.result.last_op = Some(PersisterOp::Resume);
            self.persister.resume();
            if self.expected_state == PersisterState::Paused {
                self.expected_state = PersisterState::Open;
                self.expected_events.push(LifecycleEvent::Drain);
            }
            Ok(())
        } else if roll < t_flush {
            self.result.last_op = Some(PersisterOp::Flush);
            self.persister.flush();
            self.expected_events.push(LifecycleEvent::Flush);
            Ok(())
        } else if roll < t_close {
            let with_record = self.rng.gen_bool(0.5);
            self.result.last_op = Some(PersisterOp::Close { with_record });
            let record = with_record.then(|| self.random_record());
            let got = self.persister.close(record.as_ref());
            self.model_close(record.as_ref(), got)
        } else if roll < t_destroy {
            self.result.last_op = Some(PersisterOp::Destroy);
            self.persister.destroy();
            match self.expected_state {
                PersisterState::Open | PersisterState::Paused => {
                    self.expected_events.push(LifecycleEvent::Ended);
                    self.expected_events.push(LifecycleEvent::Closed);
                }
                PersisterState::Ended | PersisterState::Destroyed => {}
            }
            self.expected_state = PersisterState::Destroyed;
            Ok(())
        } else {
            let record = self.random_record();
            self.result.last_op = Some(PersisterOp::Accept {
                a: record.get("A").unwrap_or_default().to_string(),
            });
            let got = self.persister.accept(&record);
            self.model_accept(&record, got)
        };

        self.result.total_operations += 1;

        if let Err(violation) = outcome.and_then(|_| self.check_invariants()) {
            self.result.invariant_violations.push(format!(
                "Op #{}: {:?} - {}",
                self.result.total_operations, self.result.last_op, violation
            ));
        }
    }

    fn model_close(&mut self, record: Option<&Record>, got: Result<(), PersistError>) -> Result<(), String> {
        if got.is_err() {
            return Err(format!("close failed: {:?}", got));
        }
        if self.expected_state.is_terminal() {
            return self.check_nothing_submitted();
        }
        if let Some(record) = record {
            if self.expected_state == PersisterState::Open {
                let key = format!("{}:{}", PREFIX, self.expected_next_id);
                self.expected_next_id += 1;
                self.result.accepted += 1;
                self.check_submitted(&key, record)?;
            } else {
                self.check_nothing_submitted()?;
            }
        }
        self.expected_state = PersisterState::Ended;
        self.expected_events.push(LifecycleEvent::Ended);
        self.expected_events.push(LifecycleEvent::Closed);
        Ok(())
    }

    fn check_invariants(&mut self) -> Result<(), String> {
        // Invariant 1: state matches the model
        if self.persister.state() != self.expected_state {
            return Err(format!(
                "State mismatch: actual={:?}, expected={:?}",
                self.persister.state(),
                self.expected_state
            ));
        }

        // Invariant 2: event id never skips or repeats
        if self.persister.next_event_id() != self.expected_next_id {
            return Err(format!(
                "Event id mismatch: actual={}, expected={}",
                self.persister.next_event_id(),
                self.expected_next_id
            ));
        }

        // Invariant 3: derived flags agree with the state
        let terminal = self.expected_state.is_terminal();
        if self.persister.is_writable() == terminal || self.persister.is_ended() != terminal {
            return Err("writable/ended flags disagree with state".to_string());
        }
        if self.persister.is_paused() != (self.expected_state == PersisterState::Paused) {
            return Err("paused flag disagrees with state".to_string());
        }

        // Invariant 4: notifications match transitions
        let events = drain_events(&mut self.events);
        if events != self.expected_events {
            return Err(format!(
                "Events mismatch: actual={:?}, expected={:?}",
                events, self.expected_events
            ));
        }
        self.expected_events.clear();

        Ok(())
    }

    pub fn run(&mut self, operations: usize) {
        for _ in 0..operations {
            self.run_single_op();
            if !self.result.invariant_violations.is_empty() {
                break;
            }
        }
    }

    pub fn result(&self) -> &PersisterDSTResult {
        &self.result
    }

    pub fn persister(&self) -> &RowPersister {
        &self.persister
    }
}

/// Run a batch of DST tests
pub fn run_persister_batch(
    start_seed: u64,
    num_seeds: usize,
    ops_per_seed: usize,
    config_fn: fn(u64) -> PersisterDSTConfig,
) -> Vec<PersisterDSTResult> {
    (0..num_seeds)
        .map(|i| {
            let seed = start_seed + i as u64;
            let mut harness = PersisterDSTHarness::new(config_fn(seed));
            harness.run(ops_per_seed);
            harness.result().clone()
        })
        .collect()
}

/// Summarize batch results
pub fn summarize_persister_batch(results: &[PersisterDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed = total - passed;
    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();
    let total_accepted: u64 = results.iter().map(|r| r.accepted).sum();

    let mut summary = format!(
        "Persister DST Summary\n\
         =====================\n\
         Seeds: {} total, {} passed, {} failed\n\
         Total operations: {} ({} accepted)\n",
        total, passed, failed, total_ops, total_accepted
    );

    if failed > 0 {
        summary.push_str("\nFailed seeds:\n");
        for result in results.iter().filter(|r| !r.is_success()) {
            summary.push_str(&format!("  Seed {}: {}\n", result.seed, result.summary()));
            for violation in &result.invariant_violations {
                summary.push_str(&format!("    - {}\n", violation));
            }
        }
    }

    summary
}
