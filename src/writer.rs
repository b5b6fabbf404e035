//! Store Writer Actor
//!
//! The persister never waits on the store. It pushes `WriteOp`s onto an
//! unbounded queue and returns; this actor drains the queue in submission
//! order and executes each op against the store or the search index.
//!
//! ```text
//! RowPersister::accept ──► WriterHandle ──► StoreWriter ──► KvStore
//!                                                  └──────► IndexWriter
//! ```
//!
//! Failures never reach `accept`. They are counted in `WriterStats` and then
//! handled according to the `FailurePolicy`.

use crate::config::FailurePolicy;
use crate::error::{PersistError, StoreError};
use crate::events::{EventBus, LifecycleEvent};
use crate::index::IndexWriter;
use crate::store::KvStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Messages for the writer actor
#[derive(Debug)]
pub enum WriteOp {
    /// `SET key value`
    SetString { key: String, value: String },
    /// `HSET key f1 v1 ...`
    SetFields {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Index `text` under record `key`
    Index { text: String, key: String },
    /// Resolved once every op queued before it has run
    Barrier { ack: oneshot::Sender<()> },
    /// Stop after the ops queued before it
    Shutdown { ack: oneshot::Sender<()> },
}

impl WriteOp {
    /// Record key the op belongs to, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            WriteOp::SetString { key, .. }
            | WriteOp::SetFields { key, .. }
            | WriteOp::Index { key, .. } => Some(key),
            WriteOp::Barrier { .. } | WriteOp::Shutdown { .. } => None,
        }
    }
}

/// Counters shared between the handle and the actor
#[derive(Debug, Default)]
pub struct WriterStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of `WriterStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStatsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
}

impl WriterStatsSnapshot {
    /// Ops submitted but not yet finished
    pub fn in_flight(&self) -> u64 {
        self.submitted.saturating_sub(self.completed + self.failed)
    }
}

impl WriterStats {
    pub fn snapshot(&self) -> WriterStatsSnapshot {
        WriterStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Writer actor that owns the store and the index writer
pub struct StoreWriter<S: KvStore, I: IndexWriter> {
    store: S,
    index: Option<I>,
    rx: mpsc::UnboundedReceiver<WriteOp>,
    events: EventBus,
    policy: FailurePolicy,
    verbose: bool,
    stats: Arc<WriterStats>,
}

impl<S: KvStore, I: IndexWriter> StoreWriter<S, I> {
    /// Run the actor loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        while let Some(op) = self.rx.recv().await {
            match op {
                WriteOp::Barrier { ack } => {
                    let _ = ack.send(());
                }
                WriteOp::Shutdown { ack } => {
                    debug!("Store writer shutting down");
                    let _ = ack.send(());
                    return;
                }
                op => self.execute(op).await,
            }
        }
        debug!("Store writer queue closed");
    }

    async fn execute(&mut self, op: WriteOp) {
        let result = match &op {
            WriteOp::SetString { key, value } => self.store.set_string(key, value).await,
            WriteOp::SetFields { key, fields } => self.store.set_fields(key, fields).await,
            WriteOp::Index { text, key } => match &self.index {
                Some(index) => index.index_value(text, key).await,
                None => Ok(()),
            },
            WriteOp::Barrier { .. } | WriteOp::Shutdown { .. } => Ok(()),
        };

        match result {
            Ok(()) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                self.handle_failure(op.key().unwrap_or_default(), e);
            }
        }
    }

    fn handle_failure(&self, key: &str, error: StoreError) {
        match self.policy {
            FailurePolicy::Ignore => {}
            FailurePolicy::Log => self.log_failure(key, &error),
            FailurePolicy::Notify => {
                self.log_failure(key, &error);
                self.events.emit(LifecycleEvent::StoreFailed {
                    key: key.to_string(),
                    error: error.to_string(),
                });
            }
        }
    }

    fn log_failure(&self, key: &str, error: &StoreError) {
        if self.verbose {
            warn!("Store write failed for key {}: {}", key, error);
        } else {
            debug!("Store write failed for key {}: {}", key, error);
        }
    }
}

// ============================================================================
// WriterHandle - public interface for submitting work to the writer actor
// ============================================================================

/// Handle for sending ops to the writer actor
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::UnboundedSender<WriteOp>,
    stats: Arc<WriterStats>,
}

impl WriterHandle {
    /// Queue a store or index op without waiting for it
    pub fn submit(&self, op: WriteOp) -> Result<(), PersistError> {
        self.tx.send(op).map_err(|_| PersistError::NotWritable)?;
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Whether the actor has stopped taking ops
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait until every op submitted so far has run. Returns immediately if
    /// the actor is gone.
    pub async fn barrier(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(WriteOp::Barrier { ack }).is_ok() {
            let _ = done.await;
        }
    }

    /// Graceful shutdown: runs everything queued, then stops the actor
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(WriteOp::Shutdown { ack }).is_ok() {
            let _ = done.await;
        }
    }

    pub fn stats(&self) -> WriterStatsSnapshot {
        self.stats.snapshot()
    }
}

/// A handle whose queue is read directly instead of by an actor. Used by the
/// DST harness to inspect exactly what the persister submitted.
pub fn detached_writer() -> (WriterHandle, mpsc::UnboundedReceiver<WriteOp>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = WriterHandle {
        tx,
        stats: Arc::new(WriterStats::default()),
    };
    (handle, rx)
}

/// Spawn a writer actor and return its handle + join handle
pub fn spawn_writer<S: KvStore, I: IndexWriter>(
    store: S,
    index: Option<I>,
    events: EventBus,
    policy: FailurePolicy,
    verbose: bool,
) -> (WriterHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stats = Arc::new(WriterStats::default());

    let actor = StoreWriter {
        store,
        index,
        rx,
        events,
        policy,
        verbose,
        stats: stats.clone(),
    };
    if verbose {
        info!(
            "Store writer started (indexing {})",
            if actor.index.is_some() { "on" } else { "off" }
        );
    }

    let task = tokio::spawn(actor.run());
    (WriterHandle { tx, stats }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::drain_events;
    use crate::index::SearchIndex;
    use crate::store::{InMemoryStore, SimulatedStore, SimulatedStoreConfig};

    type MemIndex = SearchIndex<InMemoryStore>;

    fn set(key: &str, value: &str) -> WriteOp {
        WriteOp::SetString {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn test_ops_run_in_order() {
        let store = InMemoryStore::new();
        let (handle, task) = spawn_writer::<_, MemIndex>(
            store.clone(),
            None,
            EventBus::new(),
            FailurePolicy::Notify,
            false,
        );

        handle.submit(set("k", "first")).unwrap();
        handle.submit(set("k", "second")).unwrap();
        handle.barrier().await;
        assert_eq!(store.get_string("k"), Some("second".to_string()));

        let stats = handle.stats();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.in_flight(), 0);

        handle.shutdown().await;
        task.await.unwrap();
        assert!(handle.is_closed());
        assert_eq!(handle.submit(set("k", "late")), Err(PersistError::NotWritable));
    }

    #[tokio::test]
    async fn test_index_ops_go_to_index() {
        let store = InMemoryStore::new();
        let index = SearchIndex::new(store.clone(), "search");
        let (handle, _task) = spawn_writer(
            store.clone(),
            Some(index),
            EventBus::new(),
            FailurePolicy::Notify,
            false,
        );

        handle
            .submit(WriteOp::Index {
                text: "hello world".to_string(),
                key: "p:0".to_string(),
            })
            .unwrap();
        handle.barrier().await;
        assert!(store.get_sorted_set("search:word:hello").is_some());
    }

    #[tokio::test]
    async fn test_failures_notify_subscribers() {
        let store = SimulatedStore::new(InMemoryStore::new(), SimulatedStoreConfig::always_fail(3));
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let (handle, _task) =
            spawn_writer::<_, MemIndex>(store, None, events, FailurePolicy::Notify, true);

        handle.submit(set("p:0", "v")).unwrap();
        handle.barrier().await;

        assert_eq!(handle.stats().failed, 1);
        let got = drain_events(&mut rx);
        assert_eq!(got.len(), 1);
        assert!(matches!(&got[0], LifecycleEvent::StoreFailed { key, .. } if key == "p:0"));
    }

    #[tokio::test]
    async fn test_log_policy_does_not_emit() {
        let store = SimulatedStore::new(InMemoryStore::new(), SimulatedStoreConfig::always_fail(3));
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let (handle, _task) =
            spawn_writer::<_, MemIndex>(store, None, events, FailurePolicy::Log, false);

        handle.submit(set("p:0", "v")).unwrap();
        handle.barrier().await;

        assert_eq!(handle.stats().failed, 1);
        assert!(drain_events(&mut rx).is_empty());
    }

    #[test]
    fn test_detached_writer_exposes_queue() {
        let (handle, mut rx) = detached_writer();
        handle.submit(set("a:0", "v")).unwrap();
        let op = rx.try_recv().unwrap();
        assert_eq!(op.key(), Some("a:0"));
    }
}
