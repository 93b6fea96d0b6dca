//! Snapshot milestoning: staging is the complete replacement set,
//! optionally scoped to partitions. Used by `UnitemporalSnapshot` and
//! `BitemporalSnapshot`.

use crate::error::Result;
use crate::ingest::mode::{
    EmptyDatasetHandling, Partitioning, TransactionMilestoning, ValidityMilestoning,
};
use crate::ingest::planner::{PlanContext, SINK_ALIAS, STAGE_ALIAS};
use crate::plan::{
    BinaryOperator, InsertSource, LogicalPlan, Operation, SelectItem, Selection, StatementTag,
    Value,
};

#[allow(clippy::too_many_arguments)]
pub(crate) fn plan_snapshot(
    ctx: &PlanContext,
    txn: &TransactionMilestoning,
    validity: Option<&ValidityMilestoning>,
    partitioning: Option<&Partitioning>,
    empty_handling: EmptyDatasetHandling,
    digest: Option<&str>,
    plan: &mut LogicalPlan,
) -> Result<()> {
    push_close(ctx, txn, validity, partitioning, empty_handling, digest, plan)?;
    push_insert(ctx, txn, validity, digest, plan)?;
    Ok(())
}

/// Close every open main row not re-asserted by staging: absent keys
/// always, changed keys when a digest column tracks content.
#[allow(clippy::too_many_arguments)]
fn push_close(
    ctx: &PlanContext,
    txn: &TransactionMilestoning,
    validity: Option<&ValidityMilestoning>,
    partitioning: Option<&Partitioning>,
    empty_handling: EmptyDatasetHandling,
    digest: Option<&str>,
    plan: &mut LogicalPlan,
) -> Result<()> {
    let key = ctx.key_match(txn, validity, SINK_ALIAS, STAGE_ALIAS);

    let absent = Value::Not(Box::new(ctx.exists_in_staging(None, vec![key.clone()])));
    let stale = match digest {
        Some(digest) => {
            let changed = ctx.exists_in_staging(
                None,
                vec![
                    key,
                    Value::not_eq(
                        Value::field(SINK_ALIAS, digest),
                        Value::field(STAGE_ALIAS, digest),
                    ),
                ],
            );
            Value::binary(absent, BinaryOperator::Or, changed)
        }
        None => absent,
    };

    let mut terms = vec![ctx.open_row(SINK_ALIAS, txn), stale];
    match partitioning {
        Some(partitioning) => {
            // Only keys within a partition present in staging are eligible
            // for closure; an empty partition closes nothing.
            let partition_terms = partitioning
                .fields
                .iter()
                .map(|f| {
                    Value::eq(
                        Value::field(STAGE_ALIAS, f.clone()),
                        Value::field(SINK_ALIAS, f.clone()),
                    )
                })
                .collect();
            terms.push(ctx.exists_in_staging(None, partition_terms));
        }
        None => {
            if empty_handling == EmptyDatasetHandling::NoOp {
                // Guard against closing the whole table on an empty batch.
                terms.push(ctx.exists_in_staging(None, vec![]));
            }
        }
    }

    plan.push(
        Operation::update(
            ctx.main.reference().clone(),
            ctx.close_assignments(txn),
            Value::and_all(terms),
        )?,
        StatementTag::Close,
    );
    Ok(())
}

/// Insert every staging row without an open, unchanged counterpart.
fn push_insert(
    ctx: &PlanContext,
    txn: &TransactionMilestoning,
    validity: Option<&ValidityMilestoning>,
    digest: Option<&str>,
    plan: &mut LogicalPlan,
) -> Result<()> {
    let data_columns = ctx.data_columns(txn, validity);

    let mut fields: Vec<String> = data_columns.clone();
    let mut projection: Vec<SelectItem> = data_columns
        .iter()
        .map(|c| SelectItem::plain(Value::field(STAGE_ALIAS, c.clone())))
        .collect();

    if let Some(v) = validity {
        fields.push(v.start_column.clone());
        fields.push(v.end_column.clone());
        projection.push(SelectItem::plain(Value::field(
            STAGE_ALIAS,
            v.derivation.from_field(),
        )));
        // Snapshot sources must carry both validity boundaries; the
        // planner validated the derivation accordingly.
        projection.push(SelectItem::plain(match &v.derivation {
            crate::ingest::mode::ValidityDerivation::SourceSpecifiesFromAndThrough {
                through_field,
                ..
            } => Value::field(STAGE_ALIAS, through_field.clone()),
            crate::ingest::mode::ValidityDerivation::SourceSpecifiesFromOnly { .. } => {
                // Open-ended window re-asserted on every snapshot.
                Value::Literal(crate::plan::Literal::DateTime(
                    crate::ingest::planner::infinite_timestamp(),
                ))
            }
        }));
    }

    for (column, value) in ctx.open_columns(txn) {
        fields.push(column);
        projection.push(SelectItem::plain(value));
    }

    let mut open_terms = vec![
        ctx.open_row(SINK_ALIAS, txn),
        ctx.key_match(txn, validity, SINK_ALIAS, STAGE_ALIAS),
    ];
    if let Some(digest) = digest {
        open_terms.push(Value::eq(
            Value::field(SINK_ALIAS, digest),
            Value::field(STAGE_ALIAS, digest),
        ));
    }
    let already_open = Selection::from_dataset(ctx.main.reference().clone())
        .with_fields(vec![SelectItem::plain(Value::int(1))])
        .with_filter(Value::and_all(open_terms));

    let selection = Selection {
        distinct: false,
        fields: projection,
        from: vec![ctx.stage_view(None)],
        filter: Some(Value::not_exists(already_open)),
    };

    plan.push(
        Operation::insert(
            ctx.main.reference().clone(),
            fields,
            InsertSource::Select(selection),
        )?,
        StatementTag::Insert,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::ingest::mode::{IngestMode, PlannerOptions};
    use crate::ingest::planner;
    use crate::schema::{DataType, Dataset, Datasets, Field};

    fn main_dataset() -> Dataset {
        Dataset::new(
            "position",
            vec![
                Field::primary_key("account", DataType::VarChar(Some(32))).unwrap(),
                Field::primary_key("product", DataType::VarChar(Some(32))).unwrap(),
                Field::new("quantity", DataType::Double).unwrap(),
                Field::new("digest", DataType::VarChar(Some(64))).unwrap(),
                Field::new("batch_in", DataType::BigInt).unwrap(),
                Field::new("batch_out", DataType::BigInt).unwrap(),
            ],
        )
        .unwrap()
    }

    fn staging_dataset() -> Dataset {
        Dataset::new(
            "position_staging",
            vec![
                Field::primary_key("account", DataType::VarChar(Some(32))).unwrap(),
                Field::primary_key("product", DataType::VarChar(Some(32))).unwrap(),
                Field::new("quantity", DataType::Double).unwrap(),
                Field::new("digest", DataType::VarChar(Some(64))).unwrap(),
            ],
        )
        .unwrap()
    }

    fn snapshot_mode(
        partitioning: Option<Partitioning>,
        empty_handling: EmptyDatasetHandling,
    ) -> IngestMode {
        IngestMode::UnitemporalSnapshot {
            transaction: TransactionMilestoning::BatchId {
                in_column: "batch_in".into(),
                out_column: "batch_out".into(),
            },
            partitioning,
            empty_handling,
            digest_field: Some("digest".into()),
        }
    }

    fn plan_for(mode: &IngestMode) -> LogicalPlan {
        let datasets = Datasets::new(main_dataset(), staging_dataset())
            .with_metadata(planner::batch_metadata_dataset("batch_ledger"));
        let mut opts = PlannerOptions::new();
        opts.create_datasets = false;
        planner::plan(
            mode,
            &datasets,
            &opts,
            &FixedClock::at("2024-06-01T12:00:00Z"),
        )
        .unwrap()
    }

    #[test]
    fn test_snapshot_shape() {
        let plan = plan_for(&snapshot_mode(None, EmptyDatasetHandling::NoOp));
        let tags: Vec<StatementTag> = plan.steps.iter().map(|s| s.tag).collect();
        assert_eq!(
            tags,
            vec![
                StatementTag::Close,
                StatementTag::Insert,
                StatementTag::Metadata
            ]
        );
    }

    #[test]
    fn test_noop_empty_handling_guards_close() {
        let plan = plan_for(&snapshot_mode(None, EmptyDatasetHandling::NoOp));
        let close = format!("{:?}", plan.steps[0].op);
        // Three staging subqueries: absence check, changed check, guard.
        assert_eq!(close.matches("position_staging").count(), 3);
    }

    #[test]
    fn test_close_all_drops_the_guard() {
        let plan = plan_for(&snapshot_mode(None, EmptyDatasetHandling::CloseAll));
        let close = format!("{:?}", plan.steps[0].op);
        assert_eq!(close.matches("position_staging").count(), 2);
    }

    #[test]
    fn test_partitioning_correlates_on_partition_columns() {
        let plan = plan_for(&snapshot_mode(
            Some(Partitioning {
                fields: vec!["account".into()],
            }),
            EmptyDatasetHandling::NoOp,
        ));
        let close = format!("{:?}", plan.steps[0].op);
        // Partition correlate replaces the global emptiness guard.
        assert_eq!(close.matches("position_staging").count(), 3);
    }

    #[test]
    fn test_partition_column_must_exist() {
        let mode = snapshot_mode(
            Some(Partitioning {
                fields: vec!["region".into()],
            }),
            EmptyDatasetHandling::NoOp,
        );
        let datasets = Datasets::new(main_dataset(), staging_dataset())
            .with_metadata(planner::batch_metadata_dataset("batch_ledger"));
        let mut opts = PlannerOptions::new();
        opts.create_datasets = false;
        let err = planner::plan(
            &mode,
            &datasets,
            &opts,
            &FixedClock::at("2024-06-01T12:00:00Z"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn test_create_datasets_prepends_ddl() {
        let datasets = Datasets::new(main_dataset(), staging_dataset())
            .with_metadata(planner::batch_metadata_dataset("batch_ledger"));
        let opts = PlannerOptions::new();
        let plan = planner::plan(
            &snapshot_mode(None, EmptyDatasetHandling::NoOp),
            &datasets,
            &opts,
            &FixedClock::at("2024-06-01T12:00:00Z"),
        )
        .unwrap();
        assert_eq!(plan.steps[0].tag, StatementTag::Ddl);
        assert_eq!(plan.steps[1].tag, StatementTag::Ddl);
        assert!(matches!(plan.steps[0].op, Operation::Create { .. }));
    }

    #[test]
    fn test_collect_statistics_prepends_staged_count() {
        let datasets = Datasets::new(main_dataset(), staging_dataset())
            .with_metadata(planner::batch_metadata_dataset("batch_ledger"));
        let mut opts = PlannerOptions::new();
        opts.create_datasets = false;
        opts.collect_statistics = true;
        let plan = planner::plan(
            &snapshot_mode(None, EmptyDatasetHandling::NoOp),
            &datasets,
            &opts,
            &FixedClock::at("2024-06-01T12:00:00Z"),
        )
        .unwrap();
        assert_eq!(plan.steps[0].tag, StatementTag::StagedCount);
        assert!(matches!(plan.steps[0].op, Operation::Select(_)));
    }

    #[test]
    fn test_datetime_milestoning_needs_no_ledger() {
        let main = Dataset::new(
            "position",
            vec![
                Field::primary_key("account", DataType::VarChar(Some(32))).unwrap(),
                Field::new("quantity", DataType::Double).unwrap(),
                Field::new("digest", DataType::VarChar(Some(64))).unwrap(),
                Field::new("in_ts", DataType::Timestamp).unwrap(),
                Field::new("out_ts", DataType::Timestamp).unwrap(),
            ],
        )
        .unwrap();
        let staging = Dataset::new(
            "position_staging",
            vec![
                Field::primary_key("account", DataType::VarChar(Some(32))).unwrap(),
                Field::new("quantity", DataType::Double).unwrap(),
                Field::new("digest", DataType::VarChar(Some(64))).unwrap(),
            ],
        )
        .unwrap();
        let mode = IngestMode::UnitemporalSnapshot {
            transaction: TransactionMilestoning::DateTime {
                in_column: "in_ts".into(),
                out_column: "out_ts".into(),
            },
            partitioning: None,
            empty_handling: EmptyDatasetHandling::NoOp,
            digest_field: Some("digest".into()),
        };
        let mut opts = PlannerOptions::new();
        opts.create_datasets = false;
        let plan = planner::plan(
            &mode,
            &Datasets::new(main, staging),
            &opts,
            &FixedClock::at("2024-06-01T12:00:00Z"),
        )
        .unwrap();
        // No metadata ledger step.
        let tags: Vec<StatementTag> = plan.steps.iter().map(|s| s.tag).collect();
        assert_eq!(tags, vec![StatementTag::Close, StatementTag::Insert]);
        // The close stamps the fixed clock instant.
        let close = format!("{:?}", plan.steps[0].op);
        assert!(close.contains("2024-06-01T12:00:00"));
    }
}
