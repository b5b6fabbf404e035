//! Hot path benchmarks for the record write path.
//!
//! Run with: `cargo bench --bench hot_paths`
//! Compare baselines: `cargo bench --bench hot_paths -- --baseline main`
//!
//! Covers what runs once per record: parsing a line, encoding it, the
//! persister's accept, and the RESP command that goes on the wire.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use redis_row_stream::config::{PersisterConfig, Structure};
use redis_row_stream::events::EventBus;
use redis_row_stream::index::word_counts;
use redis_row_stream::parser::{ParserConfig, RegexParser, DEFAULT_DELIMITER};
use redis_row_stream::persister::Writable;
use redis_row_stream::resp::{RespCodec, RespValue};
use redis_row_stream::writer::detached_writer;
use redis_row_stream::{Record, RowPersister};

fn record_with_fields(n: usize) -> Record {
    (0..n)
        .map(|i| (format!("field{}", i), format!("value-{}", i)))
        .collect()
}

/// Benchmark RowPersister::accept with the queue drained every iteration
fn bench_accept(c: &mut Criterion) {
    let mut group = c.benchmark_group("accept");
    group.throughput(Throughput::Elements(1));

    for structure in [Structure::String, Structure::Hash] {
        let record = record_with_fields(8);
        group.bench_function(format!("{}", structure), |b| {
            let (writer, mut rx) = detached_writer();
            let config = PersisterConfig::new("bench").with_structure(structure);
            let mut persister = RowPersister::with_writer(config, writer, EventBus::new());
            b.iter(|| {
                let accepted = persister.accept(black_box(&record));
                while rx.try_recv().is_ok() {}
                accepted
            })
        });
    }

    let record = Record::from_pairs(&[
        ("host", "web-01"),
        ("message", "connection reset by peer while reading response header"),
    ]);
    group.bench_function("indexed", |b| {
        let (writer, mut rx) = detached_writer();
        let config = PersisterConfig::new("bench").with_index(["message"]);
        let mut persister = RowPersister::with_writer(config, writer, EventBus::new());
        b.iter(|| {
            let accepted = persister.accept(black_box(&record));
            while rx.try_recv().is_ok() {}
            accepted
        })
    });

    group.finish();
}

/// Benchmark record encodings
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for n in [3, 16, 64] {
        let record = record_with_fields(n);
        group.bench_function(format!("json_{}_fields", n), |b| {
            b.iter(|| black_box(&record).to_json())
        });
    }

    let text = "GET /index.html 200 connection reset by peer while reading the response";
    group.bench_function("word_counts", |b| b.iter(|| word_counts(black_box(text))));

    group.finish();
}

/// Benchmark line parsing
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    let parser = RegexParser::new(&ParserConfig {
        regex: r"^([\S]+) ([\S]+) ([\S]+)".to_string(),
        labels: vec!["A".to_string(), "B".to_string(), "C".to_string()],
        delimiter: DEFAULT_DELIMITER.to_string(),
    })
    .unwrap();

    group.throughput(Throughput::Elements(1));
    group.bench_function("line", |b| {
        b.iter(|| parser.parse_line(black_box("10.0.0.1 GET /index.html")))
    });

    let text: String = (0..1000)
        .map(|i| format!("{} {} {}\n", i, i * 2, i * 3))
        .collect();
    group.throughput(Throughput::Elements(1000));
    group.bench_function("text_1000_lines", |b| {
        b.iter(|| parser.parse_str(black_box(&text)).count())
    });

    group.finish();
}

/// Benchmark RESP command encoding
fn bench_resp(c: &mut Criterion) {
    let mut group = c.benchmark_group("resp_encode");
    group.throughput(Throughput::Elements(1));

    let json = record_with_fields(8).to_json().unwrap();
    let set = RespValue::command(["SET", "bench:12345", json.as_str()]);
    group.bench_function("set", |b| b.iter(|| RespCodec::encode(black_box(&set))));

    let mut hset_parts = vec!["HSET".to_string(), "bench:12345".to_string()];
    for (field, value) in record_with_fields(8).into_fields() {
        hset_parts.push(field);
        hset_parts.push(value);
    }
    let hset = RespValue::command(hset_parts);
    group.bench_function("hset_8_fields", |b| {
        b.iter(|| RespCodec::encode(black_box(&hset)))
    });

    group.finish();
}

criterion_group!(benches, bench_accept, bench_encode, bench_parse, bench_resp);
criterion_main!(benches);
