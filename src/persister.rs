//! Row Persister
//!
//! Terminal stage of a record pipeline. Each accepted record gets the key
//! `<key_prefix>:<event id>`, is written to the store in the configured
//! structure, and optionally has selected fields forwarded to the search
//! index. Writes are submitted to the store writer actor and never awaited.
//!
//! ## State machine
//!
//! ```text
//!            pause()                close()
//!   Open ◄──────────► Paused ─────────────► Ended
//!    │      resume()     │                    │
//!    │                   │ destroy()          │ destroy()
//!    └───────────────────┴──────► Destroyed ◄─┘
//! ```
//!
//! `Ended` and `Destroyed` are terminal: `accept` fails with
//! `PersistError::Closed` and lifecycle calls are no-ops.

use crate::config::{PersisterConfig, Structure};
use crate::error::PersistError;
use crate::events::{EventBus, LifecycleEvent};
use crate::index::{IndexWriter, SearchIndex};
use crate::record::Record;
use crate::store::KvStore;
use crate::writer::{spawn_writer, WriteOp, WriterHandle, WriterStatsSnapshot};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersisterState {
    Open,
    Paused,
    Ended,
    Destroyed,
}

impl PersisterState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PersisterState::Ended | PersisterState::Destroyed)
    }
}

/// Something records can be written to
pub trait Writable {
    /// Submit one record. `Ok(false)` means the sink is paused and did not
    /// take the record; the caller still owns it.
    fn accept(&mut self, record: &Record) -> Result<bool, PersistError>;
}

pub trait Closeable {
    /// Graceful end, optionally writing one last record first. The final
    /// record is dropped if the sink is paused or can no longer reach its
    /// writer; the sink ends either way. Encoding errors propagate and leave
    /// the sink open. No-op once ended or destroyed.
    fn close(&mut self, final_record: Option<&Record>) -> Result<(), PersistError>;
    /// Immediate end; in-flight writes are left to finish on their own
    fn destroy(&mut self);
}

pub trait Pausable {
    fn pause(&mut self);
    fn resume(&mut self);
}

pub trait Flushable {
    fn flush(&mut self);
}

pub struct RowPersister {
    config: PersisterConfig,
    state: PersisterState,
    next_event_id: u64,
    writer: WriterHandle,
    events: EventBus,
}

impl RowPersister {
    /// Spawn a store writer over `store` and build a persister on top of it.
    /// When indexing is enabled the search index lives in the same store.
    pub fn spawn<S>(config: PersisterConfig, store: S) -> (Self, JoinHandle<()>)
    where
        S: KvStore + Clone,
    {
        let index = config
            .index
            .then(|| SearchIndex::new(store.clone(), config.index_namespace.clone()));
        Self::spawn_with_index(config, store, index)
    }

    /// Spawn with a caller-supplied index writer
    pub fn spawn_with_index<S, I>(
        config: PersisterConfig,
        store: S,
        index: Option<I>,
    ) -> (Self, JoinHandle<()>)
    where
        S: KvStore,
        I: IndexWriter,
    {
        let events = EventBus::new();
        let index = if config.index { index } else { None };
        let (writer, task) = spawn_writer(
            store,
            index,
            events.clone(),
            config.failure_policy,
            config.verbose,
        );
        (Self::with_writer(config, writer, events), task)
    }

    /// Build on an existing writer handle and event bus
    pub fn with_writer(config: PersisterConfig, writer: WriterHandle, events: EventBus) -> Self {
        if config.verbose {
            info!(
                "RowPersister ready: prefix={} structure={} index={} fields={:?}",
                config.key_prefix, config.structure, config.index, config.indexed_fields
            );
        }
        RowPersister {
            config,
            state: PersisterState::Open,
            next_event_id: 0,
            writer,
            events,
        }
    }

    pub fn config(&self) -> &PersisterConfig {
        &self.config
    }

    pub fn state(&self) -> PersisterState {
        self.state
    }

    /// Event id the next accepted record will get
    pub fn next_event_id(&self) -> u64 {
        self.next_event_id
    }

    /// Key for a given event id
    pub fn key_for(&self, event_id: u64) -> String {
        format!("{}:{}", self.config.key_prefix, event_id)
    }

    pub fn is_writable(&self) -> bool {
        !self.state.is_terminal()
    }

    pub fn is_readable(&self) -> bool {
        !self.state.is_terminal()
    }

    pub fn is_paused(&self) -> bool {
        self.state == PersisterState::Paused
    }

    pub fn is_ended(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == PersisterState::Destroyed
    }

    /// Register for lifecycle events emitted from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> WriterStatsSnapshot {
        self.writer.stats()
    }

    /// Wait until every write submitted so far has completed or failed.
    /// This says nothing about durability on the server.
    pub async fn settle(&self) {
        self.writer.barrier().await
    }

    /// Settle, then stop the store writer
    pub async fn shutdown(&self) {
        self.writer.shutdown().await
    }

    fn encode(&self, key: &str, record: &Record) -> Result<WriteOp, PersistError> {
        Ok(match self.config.structure {
            Structure::String => WriteOp::SetString {
                key: key.to_string(),
                value: record
                    .to_json()
                    .map_err(|e| PersistError::Encode(e.to_string()))?,
            },
            Structure::Hash => WriteOp::SetFields {
                key: key.to_string(),
                fields: record.to_fields(),
            },
        })
    }

    fn submit_index_ops(&self, key: &str, record: &Record) -> Result<(), PersistError> {
        if !self.config.index {
            return Ok(());
        }
        for label in &self.config.indexed_fields {
            match record.get(label) {
                Some(value) if !value.is_empty() => {
                    self.writer.submit(WriteOp::Index {
                        text: value.to_string(),
                        key: key.to_string(),
                    })?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl Writable for RowPersister {
    fn accept(&mut self, record: &Record) -> Result<bool, PersistError> {
        if self.state.is_terminal() {
            return Err(PersistError::Closed);
        }
        if self.writer.is_closed() {
            return Err(PersistError::NotWritable);
        }
        if self.state == PersisterState::Paused {
            return Ok(false);
        }

        let key = self.key_for(self.next_event_id);
        let op = self.encode(&key, record)?;

        if self.config.verbose {
            info!("sending to store: key: {}, val: {:?}", key, record);
        } else {
            debug!("sending to store: key: {}", key);
        }

        self.writer.submit(op)?;
        self.submit_index_ops(&key, record)?;

        self.next_event_id += 1;
        Ok(true)
    }
}

impl Closeable for RowPersister {
    fn close(&mut self, final_record: Option<&Record>) -> Result<(), PersistError> {
        if !self.is_writable() {
            return Ok(());
        }
        if let Some(record) = final_record {
            match self.accept(record) {
                Ok(_) => {}
                Err(PersistError::NotWritable) => {
                    debug!("Final record dropped: store writer stopped");
                }
                Err(e) => return Err(e),
            }
        }

        self.state = PersisterState::Ended;
        self.events.emit(LifecycleEvent::Ended);
        self.events.emit(LifecycleEvent::Closed);
        Ok(())
    }

    fn destroy(&mut self) {
        match self.state {
            PersisterState::Destroyed => {}
            PersisterState::Ended => self.state = PersisterState::Destroyed,
            PersisterState::Open | PersisterState::Paused => {
                self.state = PersisterState::Destroyed;
                self.events.emit(LifecycleEvent::Ended);
                self.events.emit(LifecycleEvent::Closed);
            }
        }
    }
}

impl Pausable for RowPersister {
    fn pause(&mut self) {
        if self.state != PersisterState::Open {
            return;
        }
        self.state = PersisterState::Paused;
        self.events.emit(LifecycleEvent::Paused);
    }

    fn resume(&mut self) {
        if self.state != PersisterState::Paused {
            return;
        }
        self.state = PersisterState::Open;
        self.events.emit(LifecycleEvent::Drain);
    }
}

impl Flushable for RowPersister {
    fn flush(&mut self) {
        self.events.emit(LifecycleEvent::Flush);
    }
}

impl std::fmt::Debug for RowPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowPersister")
            .field("key_prefix", &self.config.key_prefix)
            .field("state", &self.state)
            .field("next_event_id", &self.next_event_id)
            .finish()
    }
}
