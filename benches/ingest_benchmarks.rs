//! Benchmark suite for the ingestion planning pipeline.
//!
//! Benchmarks cover:
//! - Logical plan derivation per ingest mode
//! - Plan rendering (logical plan → vendor SQL) per sink
//! - Full pipeline (derive → render)
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use milestoner::clock::FixedClock;
use milestoner::ingest::{
    batch_metadata_dataset, plan, Auditing, Deduplication, DeleteIndicator, IngestMode,
    MergeStrategy, PlannerOptions, TransactionMilestoning, ValidityDerivation,
    ValidityMilestoning,
};
use milestoner::schema::{DataType, Dataset, Datasets, Field};
use milestoner::sink::{transpile, AnsiSink, PostgresSink, RelationalSink, SnowflakeSink};

// ---------------------------------------------------------------------------
// Fixture datasets
// ---------------------------------------------------------------------------

fn main_dataset() -> Dataset {
    Dataset::new(
        "orders",
        vec![
            Field::primary_key("order_id", DataType::BigInt).unwrap(),
            Field::primary_key("line_no", DataType::Int).unwrap(),
            Field::new("quantity", DataType::Int).unwrap(),
            Field::new("amount", DataType::Decimal {
                precision: 18,
                scale: 2,
            })
            .unwrap(),
            Field::new("digest", DataType::VarChar(Some(64))).unwrap(),
            Field::required("batch_in", DataType::BigInt).unwrap(),
            Field::required("batch_out", DataType::BigInt).unwrap(),
        ],
    )
    .unwrap()
}

fn bitemporal_main_dataset() -> Dataset {
    Dataset::new(
        "orders",
        vec![
            Field::primary_key("order_id", DataType::BigInt).unwrap(),
            Field::new("amount", DataType::Decimal {
                precision: 18,
                scale: 2,
            })
            .unwrap(),
            Field::new("digest", DataType::VarChar(Some(64))).unwrap(),
            Field::required("batch_in", DataType::BigInt).unwrap(),
            Field::required("batch_out", DataType::BigInt).unwrap(),
            Field::required("valid_from", DataType::Timestamp).unwrap(),
            Field::required("valid_through", DataType::Timestamp).unwrap(),
        ],
    )
    .unwrap()
}

fn staging_dataset() -> Dataset {
    Dataset::new(
        "orders_staging",
        vec![
            Field::primary_key("order_id", DataType::BigInt).unwrap(),
            Field::primary_key("line_no", DataType::Int).unwrap(),
            Field::new("quantity", DataType::Int).unwrap(),
            Field::new("amount", DataType::Decimal {
                precision: 18,
                scale: 2,
            })
            .unwrap(),
            Field::new("digest", DataType::VarChar(Some(64))).unwrap(),
            Field::new("is_deleted", DataType::VarChar(Some(1))).unwrap(),
        ],
    )
    .unwrap()
}

fn bitemporal_staging_dataset() -> Dataset {
    Dataset::new(
        "orders_staging",
        vec![
            Field::primary_key("order_id", DataType::BigInt).unwrap(),
            Field::new("amount", DataType::Decimal {
                precision: 18,
                scale: 2,
            })
            .unwrap(),
            Field::new("digest", DataType::VarChar(Some(64))).unwrap(),
            Field::required("event_time", DataType::Timestamp).unwrap(),
        ],
    )
    .unwrap()
}

fn batch_milestoning() -> TransactionMilestoning {
    TransactionMilestoning::BatchId {
        in_column: "batch_in".into(),
        out_column: "batch_out".into(),
    }
}

fn modes() -> Vec<(&'static str, IngestMode, Datasets)> {
    let unitemporal = Datasets::new(main_dataset(), staging_dataset())
        .with_metadata(batch_metadata_dataset("batch_ledger"));
    let bitemporal = Datasets::new(bitemporal_main_dataset(), bitemporal_staging_dataset())
        .with_metadata(batch_metadata_dataset("batch_ledger"));
    let nontemporal_main = Dataset::new(
        "orders",
        vec![
            Field::primary_key("order_id", DataType::BigInt).unwrap(),
            Field::new("amount", DataType::Decimal {
                precision: 18,
                scale: 2,
            })
            .unwrap(),
            Field::new("loaded_at", DataType::Timestamp).unwrap(),
        ],
    )
    .unwrap();
    let nontemporal_staging = Dataset::new(
        "orders_staging",
        vec![
            Field::primary_key("order_id", DataType::BigInt).unwrap(),
            Field::new("amount", DataType::Decimal {
                precision: 18,
                scale: 2,
            })
            .unwrap(),
        ],
    )
    .unwrap();

    vec![
        (
            "nontemporal",
            IngestMode::Nontemporal {
                auditing: Auditing::DateTime {
                    field: "loaded_at".into(),
                },
            },
            Datasets::new(nontemporal_main, nontemporal_staging),
        ),
        (
            "unitemporal_snapshot",
            IngestMode::UnitemporalSnapshot {
                transaction: batch_milestoning(),
                partitioning: None,
                empty_handling: milestoner::ingest::EmptyDatasetHandling::NoOp,
                digest_field: Some("digest".into()),
            },
            unitemporal.clone(),
        ),
        (
            "unitemporal_delta",
            IngestMode::UnitemporalDelta {
                transaction: batch_milestoning(),
                digest_field: "digest".into(),
                merge: MergeStrategy {
                    deduplication: Deduplication::AnyVersion,
                    delete_indicator: Some(DeleteIndicator {
                        field: "is_deleted".into(),
                        delete_values: vec!["Y".into()],
                    }),
                },
            },
            unitemporal,
        ),
        (
            "bitemporal_delta",
            IngestMode::BitemporalDelta {
                transaction: batch_milestoning(),
                validity: ValidityMilestoning {
                    start_column: "valid_from".into(),
                    end_column: "valid_through".into(),
                    derivation: ValidityDerivation::SourceSpecifiesFromOnly {
                        from_field: "event_time".into(),
                    },
                },
                digest_field: "digest".into(),
                merge: MergeStrategy::default(),
            },
            bitemporal,
        ),
    ]
}

fn options() -> PlannerOptions {
    let mut options = PlannerOptions::new();
    options.collect_statistics = true;
    options
}

// ---------------------------------------------------------------------------
// Benchmark groups
// ---------------------------------------------------------------------------

fn bench_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planning");
    let clock = FixedClock::at("2024-06-01T12:00:00Z");
    let options = options();

    for (name, mode, datasets) in &modes() {
        group.bench_with_input(BenchmarkId::new("derive", name), mode, |b, mode| {
            b.iter(|| plan(black_box(mode), datasets, &options, &clock).unwrap());
        });
    }

    group.finish();
}

fn bench_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("rendering");
    let clock = FixedClock::at("2024-06-01T12:00:00Z");
    let options = options();

    let (_, mode, datasets) = modes().into_iter().nth(2).unwrap();
    let logical = plan(&mode, &datasets, &options, &clock).unwrap();

    let sinks: Vec<(&str, Box<dyn RelationalSink>)> = vec![
        ("ansi", Box::new(AnsiSink)),
        ("postgres", Box::new(PostgresSink)),
        ("snowflake", Box::new(SnowflakeSink)),
    ];

    for (name, sink) in &sinks {
        group.bench_with_input(BenchmarkId::new("render", name), &logical, |b, logical| {
            b.iter(|| transpile(black_box(logical), sink.as_ref()).unwrap());
        });
    }

    group.finish();
}

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pipeline");
    let clock = FixedClock::at("2024-06-01T12:00:00Z");
    let options = options();

    for (name, mode, datasets) in &modes() {
        group.bench_with_input(
            BenchmarkId::new("derive_and_render", name),
            mode,
            |b, mode| {
                b.iter(|| {
                    let logical = plan(black_box(mode), datasets, &options, &clock).unwrap();
                    transpile(&logical, &PostgresSink).unwrap()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_planning, bench_rendering, bench_full_pipeline);
criterion_main!(benches);
