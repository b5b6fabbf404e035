use clap::Parser;
use redis_row_stream::config::{split_list, FailurePolicy, PersisterConfig, Structure};
use redis_row_stream::events::{drain_events, LifecycleEvent};
use redis_row_stream::parser::{ParserConfig, RegexParser, DEFAULT_DELIMITER};
use redis_row_stream::persister::{Closeable, Writable};
use redis_row_stream::{RedisStore, RowPersister};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Parse delimited text with a regex and write every row to Redis
#[derive(Debug, Parser)]
#[command(name = "redis-row-stream", version)]
struct Args {
    /// Input file (reads stdin when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// TOML persister config; takes the place of ROW_STREAM_* variables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Line pattern; capture group N fills label N
    #[arg(long, default_value = r"^([\S]+) ([\S]+) ([\S]+)")]
    regex: String,

    /// Comma-separated labels for the capture groups
    #[arg(long, default_value = "A,B,C")]
    labels: String,

    #[arg(long, default_value = DEFAULT_DELIMITER)]
    delimiter: String,

    #[arg(long)]
    key_prefix: Option<String>,

    /// `string` (JSON blob) or `hash`
    #[arg(long)]
    structure: Option<Structure>,

    /// Enable the search index
    #[arg(long)]
    index: bool,

    /// Comma-separated labels to index
    #[arg(long)]
    indexed_fields: Option<String>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// `ignore`, `log` or `notify`
    #[arg(long)]
    failure_policy: Option<FailurePolicy>,

    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn persister_config(&self) -> Result<PersisterConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => PersisterConfig::load(path)?,
            None => PersisterConfig::from_env()?,
        };
        if let Some(prefix) = &self.key_prefix {
            config.key_prefix = prefix.clone();
        }
        if let Some(structure) = self.structure {
            config.structure = structure;
        }
        if self.index {
            config.index = true;
        }
        if let Some(fields) = &self.indexed_fields {
            config.indexed_fields = split_list(fields);
        }
        if let Some(host) = &self.host {
            config.store.server_address = host.clone();
        }
        if let Some(port) = self.port {
            config.store.server_port = port;
        }
        if let Some(policy) = self.failure_policy {
            config.failure_policy = policy;
        }
        if self.verbose {
            config.verbose = true;
        }
        Ok(config.validated()?)
    }

    fn parser_config(&self) -> ParserConfig {
        ParserConfig {
            regex: self.regex.clone(),
            labels: split_list(&self.labels),
            delimiter: self.delimiter.clone(),
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_input(path: Option<&PathBuf>) -> std::io::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path),
        None => std::io::read_to_string(std::io::stdin()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose, args.log_json);

    let config = args.persister_config()?;
    let parser = RegexParser::new(&args.parser_config())?;
    let text = read_input(args.input.as_ref())?;

    let store = Arc::new(RedisStore::connect(&config.store).await?);

    let (mut persister, writer_task) = RowPersister::spawn(config, store);
    let mut events = persister.subscribe();

    let mut parsed = 0u64;
    for record in parser.parse_str(&text) {
        parsed += 1;
        if !persister.accept(&record)? {
            warn!("Row {} dropped: persister paused", parsed);
        }
    }
    persister.close(None)?;
    persister.settle().await;
    persister.shutdown().await;
    writer_task.await?;

    let failures = drain_events(&mut events)
        .into_iter()
        .filter(|e| matches!(e, LifecycleEvent::StoreFailed { .. }))
        .count();
    let stats = persister.stats();
    info!(
        "Done: {} rows parsed, {} keys written, {} ops submitted, {} completed, {} failed",
        parsed,
        persister.next_event_id(),
        stats.submitted,
        stats.completed,
        stats.failed
    );
    if failures > 0 {
        error!("{} store writes failed", failures);
    }

    Ok(())
}
