pub mod config;
pub mod error;
pub mod events;
pub mod index;
pub mod parser;
pub mod persister;
pub mod persister_dst;
pub mod record;
pub mod resp;
pub mod store;
pub mod writer;

pub use config::{FailurePolicy, PersisterConfig, StoreConfig, Structure};
pub use error::{ConfigError, ParseError, PersistError, StoreError};
pub use events::{EventBus, LifecycleEvent};
pub use index::{IndexWriter, SearchIndex};
pub use parser::{ParserConfig, RegexParser};
pub use persister::{Closeable, Flushable, Pausable, PersisterState, RowPersister, Writable};
pub use record::Record;
pub use store::{InMemoryStore, KvStore, RedisStore, SimulatedStore, SimulatedStoreConfig};
pub use writer::{WriteOp, WriterHandle, WriterStatsSnapshot};
