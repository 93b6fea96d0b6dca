//! Milestoning planner: `(IngestMode, Datasets, PlannerOptions, Clock)`
//! to an ordered `LogicalPlan`.
//!
//! The planner validates everything up front and fails fast with a typed
//! `IngestMode` error; once derivation starts no error path remains, so a
//! partial plan can never escape.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::clock::Clock;
use crate::error::{IngestError, Result};
use crate::ingest::mode::{
    CaseConversion, DataSplits, Deduplication, IngestMode, MergeStrategy, PlannerOptions,
    TransactionMilestoning, ValidityDerivation, ValidityMilestoning,
};
use crate::ingest::{delta, nontemporal, snapshot};
use crate::plan::{
    Assignment, BinaryOperator, InsertSource, Literal, LogicalPlan, Operation, SelectItem,
    Selection, Source, StatementTag, TabularValues, Value,
};
use crate::schema::{DataType, Dataset, Datasets, Field};
use crate::sink::Capability;

/// Sentinel batch id marking an open row.
pub const INFINITE_BATCH_ID: i64 = 999_999_999;

/// Sentinel timestamp marking an open row / open validity window.
pub const INFINITE_TIMESTAMP: &str = "9999-12-31 23:59:59";

/// Alias the main dataset is referenced under in generated statements.
pub(crate) const SINK_ALIAS: &str = "sink";
/// Alias the (possibly deduplicated) staging source is referenced under.
pub(crate) const STAGE_ALIAS: &str = "stage";

/// Metadata ledger columns.
pub(crate) const LEDGER_TABLE_COLUMN: &str = "table_name";
pub(crate) const LEDGER_BATCH_COLUMN: &str = "batch_id";
pub(crate) const LEDGER_TIMESTAMP_COLUMN: &str = "ingest_timestamp";

/// Canonical schema of the batch-id ledger dataset.
pub fn batch_metadata_dataset(name: impl Into<String>) -> Dataset {
    let schema = vec![
        Field::required(LEDGER_TABLE_COLUMN, DataType::VarChar(Some(255)))
            .expect("static ledger schema"),
        Field::required(LEDGER_BATCH_COLUMN, DataType::BigInt).expect("static ledger schema"),
        Field::required(LEDGER_TIMESTAMP_COLUMN, DataType::Timestamp)
            .expect("static ledger schema"),
    ];
    Dataset::new(name, schema).expect("static ledger schema")
}

/// Ledger column name as it appears in the metadata schema. The ledger
/// columns are validated present up to case, so a converted dataset
/// resolves to its converted spelling.
fn ledger_column(metadata: &Dataset, canonical: &str) -> String {
    metadata
        .schema
        .iter()
        .find(|f| f.name.eq_ignore_ascii_case(canonical))
        .map(|f| f.name.clone())
        .unwrap_or_else(|| canonical.to_string())
}

/// The `maxBatchId` ledger accessor of the metadata dataset, as a
/// `Selection` the caller can run through any sink.
pub fn max_batch_id_selection(metadata: &Dataset, main_name: &str) -> Selection {
    let ledger = metadata.reference().clone().with_alias("ledger");
    Selection::from_dataset(ledger)
        .with_fields(vec![SelectItem::plain(Value::function(
            "COALESCE",
            vec![
                Value::function(
                    "MAX",
                    vec![Value::field(
                        "ledger",
                        ledger_column(metadata, LEDGER_BATCH_COLUMN),
                    )],
                ),
                Value::int(0),
            ],
        ))])
        .with_filter(Some(Value::eq(
            Value::field("ledger", ledger_column(metadata, LEDGER_TABLE_COLUMN)),
            Value::string(main_name),
        )))
}

/// Plan a bulk CSV load into a staging dataset.
pub fn plan_staging_load(dataset: &Dataset, locator: &str) -> Result<LogicalPlan> {
    let mut plan = LogicalPlan::new();
    plan.push(
        Operation::Create {
            dataset: dataset.clone(),
            if_not_exists: true,
        },
        StatementTag::Ddl,
    );
    plan.push(
        Operation::LoadCsv {
            target: dataset.reference().clone(),
            fields: dataset.schema.iter().map(|f| f.name.clone()).collect(),
            locator: locator.to_string(),
        },
        StatementTag::Load,
    );
    Ok(plan)
}

/// Plan a table introspection query.
pub fn plan_show_tables(group: Option<&str>) -> LogicalPlan {
    let mut plan = LogicalPlan::new();
    plan.push(
        Operation::Show(crate::plan::ShowKind::Tables {
            group: group.map(|g| g.to_string()),
            like: None,
        }),
        StatementTag::Query,
    );
    plan
}

/// Shared state of one planning call.
pub(crate) struct PlanContext {
    pub main: Dataset,
    pub staging: Dataset,
    pub metadata: Option<Dataset>,
    pub now: NaiveDateTime,
    pub capabilities: HashSet<Capability>,
    /// Predicate applied to every staging read of the current split,
    /// parameterized over the alias the staging table is scanned under.
    pub split: Option<(String, i64, i64)>,
}

impl PlanContext {
    /// Natural key columns: declared primary keys minus milestoning columns.
    pub fn key_columns(&self, txn: &TransactionMilestoning) -> Vec<String> {
        let milestoned: Vec<&str> = txn.columns();
        self.main
            .primary_keys()
            .into_iter()
            .filter(|f| !milestoned.contains(&f.name.as_str()))
            .map(|f| f.name.clone())
            .collect()
    }

    /// Main columns carrying business data: everything except the
    /// transaction and validity milestoning columns.
    pub fn data_columns(
        &self,
        txn: &TransactionMilestoning,
        validity: Option<&ValidityMilestoning>,
    ) -> Vec<String> {
        let mut excluded: Vec<&str> = txn.columns();
        if let Some(v) = validity {
            excluded.push(&v.start_column);
            excluded.push(&v.end_column);
        }
        self.main
            .schema
            .iter()
            .filter(|f| !excluded.contains(&f.name.as_str()))
            .map(|f| f.name.clone())
            .collect()
    }

    /// `inner.k = outer.k` conjunction over the natural key, plus the
    /// validity-start pairing for bitemporal modes.
    pub fn key_match(
        &self,
        txn: &TransactionMilestoning,
        validity: Option<&ValidityMilestoning>,
        sink_alias: &str,
        stage_alias: &str,
    ) -> Value {
        let mut terms: Vec<Value> = self
            .key_columns(txn)
            .into_iter()
            .map(|k| {
                Value::eq(
                    Value::field(sink_alias, k.clone()),
                    Value::field(stage_alias, k),
                )
            })
            .collect();
        if let Some(v) = validity {
            terms.push(Value::eq(
                Value::field(sink_alias, v.start_column.clone()),
                Value::field(stage_alias, v.derivation.from_field()),
            ));
        }
        Value::and_all(terms).expect("key columns validated non-empty")
    }

    /// Predicate marking a main row as currently open.
    pub fn open_row(&self, alias: &str, txn: &TransactionMilestoning) -> Value {
        match txn {
            TransactionMilestoning::BatchId { out_column, .. } => Value::eq(
                Value::field(alias, out_column.clone()),
                Value::int(INFINITE_BATCH_ID),
            ),
            TransactionMilestoning::DateTime { out_column, .. } => Value::eq(
                Value::field(alias, out_column.clone()),
                Value::Literal(Literal::DateTime(infinite_timestamp())),
            ),
            TransactionMilestoning::BatchIdAndDateTime {
                batch_out_column, ..
            } => Value::eq(
                Value::field(alias, batch_out_column.clone()),
                Value::int(INFINITE_BATCH_ID),
            ),
        }
    }

    /// Scalar expression for the next batch id: a subquery over the
    /// metadata ledger, evaluated by the sink at execution time.
    pub fn next_batch_id(&self) -> Value {
        let metadata = self
            .metadata
            .as_ref()
            .expect("batch-id milestoning validated to carry a metadata dataset");
        let ledger = metadata.reference().clone().with_alias("ledger");
        let max_plus_one = Value::binary(
            Value::function(
                "COALESCE",
                vec![
                    Value::function(
                        "MAX",
                        vec![Value::field(
                            "ledger",
                            ledger_column(metadata, LEDGER_BATCH_COLUMN),
                        )],
                    ),
                    Value::int(0),
                ],
            ),
            BinaryOperator::Plus,
            Value::int(1),
        );
        Value::Select(Box::new(
            Selection::from_dataset(ledger)
                .with_fields(vec![SelectItem::plain(max_plus_one)])
                .with_filter(Some(Value::eq(
                    Value::field("ledger", ledger_column(metadata, LEDGER_TABLE_COLUMN)),
                    Value::string(self.main.name.clone()),
                ))),
        ))
    }

    /// Assignments closing an open row at the current batch/instant.
    pub fn close_assignments(&self, txn: &TransactionMilestoning) -> Vec<Assignment> {
        match txn {
            TransactionMilestoning::BatchId { out_column, .. } => {
                vec![Assignment::new(out_column.clone(), self.next_batch_id())]
            }
            TransactionMilestoning::DateTime { out_column, .. } => vec![Assignment::new(
                out_column.clone(),
                Value::Literal(Literal::DateTime(self.now)),
            )],
            TransactionMilestoning::BatchIdAndDateTime {
                batch_out_column,
                time_out_column,
                ..
            } => vec![
                Assignment::new(batch_out_column.clone(), self.next_batch_id()),
                Assignment::new(
                    time_out_column.clone(),
                    Value::Literal(Literal::DateTime(self.now)),
                ),
            ],
        }
    }

    /// Column/value pairs opening a new row.
    pub fn open_columns(&self, txn: &TransactionMilestoning) -> Vec<(String, Value)> {
        match txn {
            TransactionMilestoning::BatchId {
                in_column,
                out_column,
            } => vec![
                (in_column.clone(), self.next_batch_id()),
                (out_column.clone(), Value::int(INFINITE_BATCH_ID)),
            ],
            TransactionMilestoning::DateTime {
                in_column,
                out_column,
            } => vec![
                (
                    in_column.clone(),
                    Value::Literal(Literal::DateTime(self.now)),
                ),
                (
                    out_column.clone(),
                    Value::Literal(Literal::DateTime(infinite_timestamp())),
                ),
            ],
            TransactionMilestoning::BatchIdAndDateTime {
                batch_in_column,
                batch_out_column,
                time_in_column,
                time_out_column,
            } => vec![
                (batch_in_column.clone(), self.next_batch_id()),
                (batch_out_column.clone(), Value::int(INFINITE_BATCH_ID)),
                (
                    time_in_column.clone(),
                    Value::Literal(Literal::DateTime(self.now)),
                ),
                (
                    time_out_column.clone(),
                    Value::Literal(Literal::DateTime(infinite_timestamp())),
                ),
            ],
        }
    }

    /// Split-range predicate over the given staging alias.
    pub fn split_filter(&self, alias: &str) -> Option<Value> {
        self.split.as_ref().map(|(field, lo, hi)| {
            Value::binary(
                Value::binary(
                    Value::field(alias, field.clone()),
                    BinaryOperator::GtEq,
                    Value::int(*lo),
                ),
                BinaryOperator::And,
                Value::binary(
                    Value::field(alias, field.clone()),
                    BinaryOperator::LtEq,
                    Value::int(*hi),
                ),
            )
        })
    }

    /// The staging source, wrapped in deduplication and split filtering.
    /// Always referenced under `STAGE_ALIAS`.
    pub fn stage_view(&self, dedup: Option<&Deduplication>) -> Source {
        let raw = self.staging.reference().clone();
        let split = self.split_filter("src");
        match (dedup, &split) {
            (None, None) | (Some(Deduplication::AllVersions), None) => {
                Source::Dataset(raw.with_alias(STAGE_ALIAS))
            }
            (Some(Deduplication::AnyVersion), _) => Source::Select {
                query: Box::new(
                    Selection::from_dataset(raw.with_alias("src"))
                        .with_distinct(true)
                        .with_fields(vec![SelectItem::plain(Value::All)])
                        .with_filter(split),
                ),
                alias: STAGE_ALIAS.to_string(),
            },
            (Some(Deduplication::MaxVersion { version_field }), _) => {
                let later_filter = Value::and_all(
                    self.staging_key_equality("later", "src")
                        .into_iter()
                        .chain(std::iter::once(Value::binary(
                            Value::field("later", version_field.clone()),
                            BinaryOperator::Gt,
                            Value::field("src", version_field.clone()),
                        )))
                        .chain(self.split_filter("later"))
                        .collect(),
                );
                let later = Selection::from_dataset(
                    self.staging.reference().clone().with_alias("later"),
                )
                .with_fields(vec![SelectItem::plain(Value::int(1))])
                .with_filter(later_filter);
                let filter = Value::and_all(
                    std::iter::once(Value::not_exists(later))
                        .chain(split)
                        .collect(),
                );
                Source::Select {
                    query: Box::new(
                        Selection::from_dataset(raw.with_alias("src"))
                            .with_fields(vec![SelectItem::plain(Value::All)])
                            .with_filter(filter),
                    ),
                    alias: STAGE_ALIAS.to_string(),
                }
            }
            (None, Some(_)) | (Some(Deduplication::AllVersions), Some(_)) => Source::Select {
                query: Box::new(
                    Selection::from_dataset(raw.with_alias("src"))
                        .with_fields(vec![SelectItem::plain(Value::All)])
                        .with_filter(split),
                ),
                alias: STAGE_ALIAS.to_string(),
            },
        }
    }

    /// Primary-key equality terms between two staging aliases, used by
    /// max-version deduplication.
    fn staging_key_equality(&self, left: &str, right: &str) -> Vec<Value> {
        self.main
            .primary_keys()
            .into_iter()
            .filter(|f| self.staging.has_field(&f.name))
            .map(|f| {
                Value::eq(
                    Value::field(left, f.name.clone()),
                    Value::field(right, f.name.clone()),
                )
            })
            .collect()
    }

    /// `EXISTS (SELECT 1 FROM <stage view> WHERE terms...)`.
    pub fn exists_in_staging(
        &self,
        dedup: Option<&Deduplication>,
        terms: Vec<Value>,
    ) -> Value {
        Value::exists(
            Selection {
                distinct: false,
                fields: vec![SelectItem::plain(Value::int(1))],
                from: vec![self.stage_view(dedup)],
                filter: Value::and_all(terms),
            },
        )
    }
}

pub(crate) fn infinite_timestamp() -> NaiveDateTime {
    NaiveDateTime::parse_from_str(INFINITE_TIMESTAMP, "%Y-%m-%d %H:%M:%S")
        .expect("static sentinel timestamp")
}

/// Derive the logical plan for one ingest invocation.
pub fn plan(
    mode: &IngestMode,
    datasets: &Datasets,
    options: &PlannerOptions,
    clock: &dyn Clock,
) -> Result<LogicalPlan> {
    validate(mode, datasets, options)?;

    let conv = options.case_conversion;
    let mode = convert_mode_case(mode, conv);
    let main = convert_dataset_case(&datasets.main, conv)?.aliased(SINK_ALIAS);
    let staging = convert_dataset_case(&datasets.staging, conv)?.aliased(STAGE_ALIAS);
    let metadata = match &datasets.metadata {
        Some(m) => Some(convert_dataset_case(m, conv)?),
        None => None,
    };

    let mut ctx = PlanContext {
        main,
        staging,
        metadata,
        // One clock read per planning call; every date-time column pair in
        // the plan is stamped from this instant.
        now: clock.now().naive_utc(),
        capabilities: options.capabilities.clone(),
        split: None,
    };

    let mut plan = LogicalPlan::new();

    if options.create_datasets {
        plan.push(
            Operation::Create {
                dataset: ctx.main.clone(),
                if_not_exists: true,
            },
            StatementTag::Ddl,
        );
        if let Some(metadata) = &ctx.metadata {
            if transaction_of(&mode).map(|t| t.uses_batch_id()).unwrap_or(false) {
                plan.push(
                    Operation::Create {
                        dataset: metadata.clone(),
                        if_not_exists: true,
                    },
                    StatementTag::Ddl,
                );
            }
        }
    }

    let splits: Vec<Option<(i64, i64)>> = match &options.data_splits {
        Some(ds) => ds.ranges.iter().map(|r| Some(*r)).collect(),
        None => vec![None],
    };
    let split_field = options.data_splits.as_ref().map(|ds| conv.apply(&ds.field));

    for range in splits {
        ctx.split = range.map(|(lo, hi)| {
            (
                split_field.clone().expect("split field set with ranges"),
                lo,
                hi,
            )
        });

        if options.collect_statistics {
            push_staged_count(&ctx, &mode, &mut plan);
        }

        match &mode {
            IngestMode::Nontemporal { auditing } => {
                nontemporal::plan_nontemporal(&ctx, auditing, &mut plan)?;
            }
            IngestMode::UnitemporalSnapshot {
                transaction,
                partitioning,
                empty_handling,
                digest_field,
            } => {
                snapshot::plan_snapshot(
                    &ctx,
                    transaction,
                    None,
                    partitioning.as_ref(),
                    *empty_handling,
                    digest_field.as_deref(),
                    &mut plan,
                )?;
            }
            IngestMode::UnitemporalDelta {
                transaction,
                digest_field,
                merge,
            } => {
                delta::plan_delta(&ctx, transaction, None, digest_field, merge, &mut plan)?;
            }
            IngestMode::BitemporalSnapshot {
                transaction,
                validity,
                partitioning,
                empty_handling,
                digest_field,
            } => {
                snapshot::plan_snapshot(
                    &ctx,
                    transaction,
                    Some(validity),
                    partitioning.as_ref(),
                    *empty_handling,
                    digest_field.as_deref(),
                    &mut plan,
                )?;
            }
            IngestMode::BitemporalDelta {
                transaction,
                validity,
                digest_field,
                merge,
            } => {
                delta::plan_delta(
                    &ctx,
                    transaction,
                    Some(validity),
                    digest_field,
                    merge,
                    &mut plan,
                )?;
            }
        }

        // Ledger append last, so the next split (or next ingest) derives
        // the following batch id.
        if transaction_of(&mode).map(|t| t.uses_batch_id()).unwrap_or(false) {
            push_ledger_append(&ctx, &mut plan)?;
        }
    }

    debug!(
        mode = mode.name(),
        steps = plan.len(),
        "derived logical plan"
    );
    Ok(plan)
}

fn transaction_of(mode: &IngestMode) -> Option<&TransactionMilestoning> {
    match mode {
        IngestMode::Nontemporal { .. } => None,
        IngestMode::UnitemporalSnapshot { transaction, .. }
        | IngestMode::UnitemporalDelta { transaction, .. }
        | IngestMode::BitemporalSnapshot { transaction, .. }
        | IngestMode::BitemporalDelta { transaction, .. } => Some(transaction),
    }
}

fn dedup_of(mode: &IngestMode) -> Option<&Deduplication> {
    match mode {
        IngestMode::UnitemporalDelta { merge, .. } | IngestMode::BitemporalDelta { merge, .. } => {
            Some(&merge.deduplication)
        }
        _ => None,
    }
}

fn push_staged_count(ctx: &PlanContext, mode: &IngestMode, plan: &mut LogicalPlan) {
    let selection = Selection {
        distinct: false,
        fields: vec![SelectItem::plain(Value::function(
            "COUNT",
            vec![Value::All],
        ))],
        from: vec![ctx.stage_view(dedup_of(mode))],
        filter: None,
    };
    plan.push(Operation::Select(selection), StatementTag::StagedCount);
}

fn push_ledger_append(ctx: &PlanContext, plan: &mut LogicalPlan) -> Result<()> {
    let metadata = ctx
        .metadata
        .as_ref()
        .expect("ledger append only planned for batch-id milestoning");
    let fields = vec![
        ledger_column(metadata, LEDGER_TABLE_COLUMN),
        ledger_column(metadata, LEDGER_BATCH_COLUMN),
        ledger_column(metadata, LEDGER_TIMESTAMP_COLUMN),
    ];
    let values = TabularValues::new(
        fields.clone(),
        vec![vec![
            Value::string(ctx.main.name.clone()),
            ctx.next_batch_id(),
            Value::Literal(Literal::DateTime(ctx.now)),
        ]],
    )?;
    plan.push(
        Operation::insert(
            metadata.reference().clone(),
            fields,
            InsertSource::Values(values),
        )?,
        StatementTag::Metadata,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(mode: &IngestMode, datasets: &Datasets, options: &PlannerOptions) -> Result<()> {
    if let Some(txn) = transaction_of(mode) {
        for column in txn.columns() {
            if !datasets.main.has_field(column) {
                return Err(IngestError::ingest_mode(format!(
                    "milestoning column {:?} is absent from main dataset {:?}",
                    column, datasets.main.name
                )));
            }
        }
        if txn.uses_batch_id() {
            let metadata = datasets.metadata.as_ref().ok_or_else(|| {
                IngestError::ingest_mode(
                    "batch-id milestoning requires a metadata ledger dataset".to_string(),
                )
            })?;
            for column in [
                LEDGER_TABLE_COLUMN,
                LEDGER_BATCH_COLUMN,
                LEDGER_TIMESTAMP_COLUMN,
            ] {
                // Up-to-case match, the ledger may itself be declared in
                // a converted spelling.
                if !metadata
                    .schema
                    .iter()
                    .any(|f| f.name.eq_ignore_ascii_case(column))
                {
                    return Err(IngestError::ingest_mode(format!(
                        "metadata ledger {:?} is missing column {:?}",
                        metadata.name, column
                    )));
                }
            }
        }

        // Every milestoned mode needs a natural key.
        let milestoned: Vec<&str> = txn.columns();
        let keys: Vec<&Field> = datasets
            .main
            .primary_keys()
            .into_iter()
            .filter(|f| !milestoned.contains(&f.name.as_str()))
            .collect();
        if keys.is_empty() {
            return Err(IngestError::ingest_mode(format!(
                "main dataset {:?} declares no primary key columns",
                datasets.main.name
            )));
        }
        for key in &keys {
            if !datasets.staging.has_field(&key.name) {
                return Err(IngestError::ingest_mode(format!(
                    "key column {:?} is absent from staging dataset {:?}",
                    key.name, datasets.staging.name
                )));
            }
        }
    }

    match mode {
        IngestMode::UnitemporalDelta {
            digest_field, merge, ..
        }
        | IngestMode::BitemporalDelta {
            digest_field, merge, ..
        } => {
            validate_digest(datasets, Some(digest_field))?;
            validate_merge_strategy(datasets, merge, options)?;
        }
        IngestMode::UnitemporalSnapshot {
            digest_field,
            partitioning,
            ..
        }
        | IngestMode::BitemporalSnapshot {
            digest_field,
            partitioning,
            ..
        } => {
            validate_digest(datasets, digest_field.as_deref())?;
            if let Some(partitioning) = partitioning {
                validate_partitioning(datasets, partitioning)?;
            }
        }
        IngestMode::Nontemporal { auditing } => {
            if let crate::ingest::mode::Auditing::DateTime { field } = auditing {
                if !datasets.main.has_field(field) {
                    return Err(IngestError::ingest_mode(format!(
                        "audit column {:?} is absent from main dataset {:?}",
                        field, datasets.main.name
                    )));
                }
            }
        }
    }

    if let Some(validity) = validity_of(mode) {
        validate_validity(datasets, validity)?;
    }

    // Every main data column must be fed from staging.
    let excluded = excluded_columns(mode);
    for field in &datasets.main.schema {
        if excluded.contains(&field.name.as_str()) {
            continue;
        }
        if !datasets.staging.has_field(&field.name) {
            return Err(IngestError::ingest_mode(format!(
                "main column {:?} has no counterpart in staging dataset {:?}",
                field.name, datasets.staging.name
            )));
        }
    }

    if let Some(splits) = &options.data_splits {
        validate_data_splits(datasets, splits)?;
    }

    Ok(())
}

fn validity_of(mode: &IngestMode) -> Option<&ValidityMilestoning> {
    match mode {
        IngestMode::BitemporalSnapshot { validity, .. }
        | IngestMode::BitemporalDelta { validity, .. } => Some(validity),
        _ => None,
    }
}

/// Main columns not expected to appear in staging.
fn excluded_columns(mode: &IngestMode) -> Vec<&str> {
    let mut excluded = transaction_of(mode).map(|t| t.columns()).unwrap_or_default();
    if let Some(v) = validity_of(mode) {
        excluded.push(&v.start_column);
        excluded.push(&v.end_column);
    }
    if let IngestMode::Nontemporal {
        auditing: crate::ingest::mode::Auditing::DateTime { field },
    } = mode
    {
        excluded.push(field);
    }
    excluded
}

fn validate_digest(datasets: &Datasets, digest_field: Option<&str>) -> Result<()> {
    if let Some(digest) = digest_field {
        for (role, ds) in [("main", &datasets.main), ("staging", &datasets.staging)] {
            if !ds.has_field(digest) {
                return Err(IngestError::ingest_mode(format!(
                    "digest column {:?} is absent from {} dataset {:?}",
                    digest, role, ds.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_merge_strategy(
    datasets: &Datasets,
    merge: &MergeStrategy,
    options: &PlannerOptions,
) -> Result<()> {
    match &merge.deduplication {
        Deduplication::AnyVersion => {}
        Deduplication::MaxVersion { version_field } => {
            let field = datasets.staging.field(version_field).ok_or_else(|| {
                IngestError::ingest_mode(format!(
                    "version column {:?} is absent from staging dataset {:?}",
                    version_field, datasets.staging.name
                ))
            })?;
            if !field.data_type.is_comparable() {
                return Err(IngestError::ingest_mode(format!(
                    "version column {:?} has non-comparable type {:?}",
                    version_field, field.data_type
                )));
            }
        }
        Deduplication::AllVersions => {
            if options.data_splits.is_none() {
                return Err(IngestError::ingest_mode(
                    "all-versions deduplication requires data splits".to_string(),
                ));
            }
        }
    }
    if let Some(indicator) = &merge.delete_indicator {
        if !datasets.staging.has_field(&indicator.field) {
            return Err(IngestError::ingest_mode(format!(
                "delete indicator column {:?} is absent from staging dataset {:?}",
                indicator.field, datasets.staging.name
            )));
        }
        if indicator.delete_values.is_empty() {
            return Err(IngestError::ingest_mode(
                "delete indicator declares no delete values".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_partitioning(
    datasets: &Datasets,
    partitioning: &crate::ingest::mode::Partitioning,
) -> Result<()> {
    if partitioning.fields.is_empty() {
        return Err(IngestError::ingest_mode(
            "partitioning declares no fields".to_string(),
        ));
    }
    for field in &partitioning.fields {
        let declared = datasets.main.field(field).ok_or_else(|| {
            IngestError::ingest_mode(format!(
                "partition column {:?} is absent from main dataset {:?}",
                field, datasets.main.name
            ))
        })?;
        if !declared.data_type.is_comparable() {
            return Err(IngestError::ingest_mode(format!(
                "partition column {:?} has non-comparable type {:?}",
                field, declared.data_type
            )));
        }
        if !datasets.staging.has_field(field) {
            return Err(IngestError::ingest_mode(format!(
                "partition column {:?} is absent from staging dataset {:?}",
                field, datasets.staging.name
            )));
        }
    }
    Ok(())
}

fn validate_validity(datasets: &Datasets, validity: &ValidityMilestoning) -> Result<()> {
    for column in [&validity.start_column, &validity.end_column] {
        if !datasets.main.has_field(column) {
            return Err(IngestError::ingest_mode(format!(
                "validity column {:?} is absent from main dataset {:?}",
                column, datasets.main.name
            )));
        }
    }
    match &validity.derivation {
        ValidityDerivation::SourceSpecifiesFromAndThrough {
            from_field,
            through_field,
        } => {
            for field in [from_field, through_field] {
                if !datasets.staging.has_field(field) {
                    return Err(IngestError::ingest_mode(format!(
                        "validity source column {:?} is absent from staging dataset {:?}",
                        field, datasets.staging.name
                    )));
                }
            }
        }
        ValidityDerivation::SourceSpecifiesFromOnly { from_field } => {
            if !datasets.staging.has_field(from_field) {
                return Err(IngestError::ingest_mode(format!(
                    "validity source column {:?} is absent from staging dataset {:?}",
                    from_field, datasets.staging.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_data_splits(datasets: &Datasets, splits: &DataSplits) -> Result<()> {
    if !datasets.staging.has_field(&splits.field) {
        return Err(IngestError::ingest_mode(format!(
            "data split column {:?} is absent from staging dataset {:?}",
            splits.field, datasets.staging.name
        )));
    }
    if splits.ranges.is_empty() {
        return Err(IngestError::ingest_mode(
            "data splits declare no ranges".to_string(),
        ));
    }
    let mut previous_hi: Option<i64> = None;
    for (lo, hi) in &splits.ranges {
        if lo > hi {
            return Err(IngestError::ingest_mode(format!(
                "data split range ({}, {}) is inverted",
                lo, hi
            )));
        }
        if let Some(prev) = previous_hi {
            if *lo <= prev {
                return Err(IngestError::ingest_mode(format!(
                    "data split range ({}, {}) overlaps or precedes an earlier range",
                    lo, hi
                )));
            }
        }
        previous_hi = Some(*hi);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Case conversion
// ---------------------------------------------------------------------------

fn convert_dataset_case(dataset: &Dataset, conv: CaseConversion) -> Result<Dataset> {
    if conv == CaseConversion::None {
        return Ok(dataset.clone());
    }
    let schema = dataset
        .schema
        .iter()
        .map(|f| {
            let mut field = f.clone();
            field.name = conv.apply(&f.name);
            field
        })
        .collect();
    Dataset::qualified(
        conv.apply(&dataset.name),
        dataset.database.as_deref().map(|d| conv.apply(d)),
        dataset.group.as_deref().map(|g| conv.apply(g)),
        schema,
    )
}

fn convert_mode_case(mode: &IngestMode, conv: CaseConversion) -> IngestMode {
    if conv == CaseConversion::None {
        return mode.clone();
    }
    let txn = |t: &TransactionMilestoning| match t {
        TransactionMilestoning::BatchId {
            in_column,
            out_column,
        } => TransactionMilestoning::BatchId {
            in_column: conv.apply(in_column),
            out_column: conv.apply(out_column),
        },
        TransactionMilestoning::DateTime {
            in_column,
            out_column,
        } => TransactionMilestoning::DateTime {
            in_column: conv.apply(in_column),
            out_column: conv.apply(out_column),
        },
        TransactionMilestoning::BatchIdAndDateTime {
            batch_in_column,
            batch_out_column,
            time_in_column,
            time_out_column,
        } => TransactionMilestoning::BatchIdAndDateTime {
            batch_in_column: conv.apply(batch_in_column),
            batch_out_column: conv.apply(batch_out_column),
            time_in_column: conv.apply(time_in_column),
            time_out_column: conv.apply(time_out_column),
        },
    };
    let validity = |v: &ValidityMilestoning| ValidityMilestoning {
        start_column: conv.apply(&v.start_column),
        end_column: conv.apply(&v.end_column),
        derivation: match &v.derivation {
            ValidityDerivation::SourceSpecifiesFromAndThrough {
                from_field,
                through_field,
            } => ValidityDerivation::SourceSpecifiesFromAndThrough {
                from_field: conv.apply(from_field),
                through_field: conv.apply(through_field),
            },
            ValidityDerivation::SourceSpecifiesFromOnly { from_field } => {
                ValidityDerivation::SourceSpecifiesFromOnly {
                    from_field: conv.apply(from_field),
                }
            }
        },
    };
    let merge = |m: &MergeStrategy| MergeStrategy {
        deduplication: match &m.deduplication {
            Deduplication::AnyVersion => Deduplication::AnyVersion,
            Deduplication::MaxVersion { version_field } => Deduplication::MaxVersion {
                version_field: conv.apply(version_field),
            },
            Deduplication::AllVersions => Deduplication::AllVersions,
        },
        delete_indicator: m.delete_indicator.as_ref().map(|d| {
            crate::ingest::mode::DeleteIndicator {
                field: conv.apply(&d.field),
                delete_values: d.delete_values.clone(),
            }
        }),
    };
    match mode {
        IngestMode::Nontemporal { auditing } => IngestMode::Nontemporal {
            auditing: match auditing {
                crate::ingest::mode::Auditing::None => crate::ingest::mode::Auditing::None,
                crate::ingest::mode::Auditing::DateTime { field } => {
                    crate::ingest::mode::Auditing::DateTime {
                        field: conv.apply(field),
                    }
                }
            },
        },
        IngestMode::UnitemporalSnapshot {
            transaction,
            partitioning,
            empty_handling,
            digest_field,
        } => IngestMode::UnitemporalSnapshot {
            transaction: txn(transaction),
            partitioning: partitioning.as_ref().map(|p| {
                crate::ingest::mode::Partitioning {
                    fields: p.fields.iter().map(|f| conv.apply(f)).collect(),
                }
            }),
            empty_handling: *empty_handling,
            digest_field: digest_field.as_deref().map(|d| conv.apply(d)),
        },
        IngestMode::UnitemporalDelta {
            transaction,
            digest_field,
            merge: m,
        } => IngestMode::UnitemporalDelta {
            transaction: txn(transaction),
            digest_field: conv.apply(digest_field),
            merge: merge(m),
        },
        IngestMode::BitemporalSnapshot {
            transaction,
            validity: v,
            partitioning,
            empty_handling,
            digest_field,
        } => IngestMode::BitemporalSnapshot {
            transaction: txn(transaction),
            validity: validity(v),
            partitioning: partitioning.as_ref().map(|p| {
                crate::ingest::mode::Partitioning {
                    fields: p.fields.iter().map(|f| conv.apply(f)).collect(),
                }
            }),
            empty_handling: *empty_handling,
            digest_field: digest_field.as_deref().map(|d| conv.apply(d)),
        },
        IngestMode::BitemporalDelta {
            transaction,
            validity: v,
            digest_field,
            merge: m,
        } => IngestMode::BitemporalDelta {
            transaction: txn(transaction),
            validity: validity(v),
            digest_field: conv.apply(digest_field),
            merge: merge(m),
        },
    }
}
