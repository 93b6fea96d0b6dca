//! Delta milestoning: close changed rows, open new versions, honor
//! delete indicators. Used by `UnitemporalDelta` and `BitemporalDelta`.

use crate::error::Result;
use crate::ingest::mode::{MergeStrategy, TransactionMilestoning, ValidityMilestoning};
use crate::ingest::planner::{infinite_timestamp, PlanContext, SINK_ALIAS, STAGE_ALIAS};
use crate::plan::{
    BinaryOperator, InsertSource, Literal, LogicalPlan, MatchedClause, Operation, SelectItem,
    Selection, StatementTag, Value,
};
use crate::ingest::mode::ValidityDerivation;
use crate::sink::Capability;

pub(crate) fn plan_delta(
    ctx: &PlanContext,
    txn: &TransactionMilestoning,
    validity: Option<&ValidityMilestoning>,
    digest: &str,
    merge: &MergeStrategy,
    plan: &mut LogicalPlan,
) -> Result<()> {
    if ctx.capabilities.contains(&Capability::Merge) {
        push_merge_close(ctx, txn, validity, digest, merge, plan)?;
    } else {
        push_update_close(ctx, txn, validity, digest, merge, plan)?;
    }
    push_insert(ctx, txn, validity, digest, merge, plan)?;
    Ok(())
}

/// Digest inequality between the open main row and its staging match.
fn digest_differs(digest: &str) -> Value {
    Value::not_eq(
        Value::field(SINK_ALIAS, digest),
        Value::field(STAGE_ALIAS, digest),
    )
}

/// Staging row flagged for deletion.
fn delete_flagged(merge: &MergeStrategy) -> Option<Value> {
    merge.delete_indicator.as_ref().map(|ind| Value::InList {
        value: Box::new(Value::field(STAGE_ALIAS, ind.field.clone())),
        list: ind
            .delete_values
            .iter()
            .map(|v| Literal::String(v.clone()))
            .collect(),
        negated: false,
    })
}

/// Close step rendered as paired UPDATEs: changed rows, then (if a delete
/// indicator is configured) delete-flagged rows without reinsertion.
fn push_update_close(
    ctx: &PlanContext,
    txn: &TransactionMilestoning,
    validity: Option<&ValidityMilestoning>,
    digest: &str,
    merge: &MergeStrategy,
    plan: &mut LogicalPlan,
) -> Result<()> {
    let dedup = Some(&merge.deduplication);
    let key = ctx.key_match(txn, validity, SINK_ALIAS, STAGE_ALIAS);

    // A row that is both changed and delete-flagged belongs to the
    // terminate statement, so the changed predicate excludes the flag.
    let mut changed_terms = vec![key.clone(), digest_differs(digest)];
    if let Some(flag) = delete_flagged(merge) {
        changed_terms.push(Value::Not(Box::new(flag)));
    }
    let changed = ctx.exists_in_staging(dedup, changed_terms);
    let close_filter = Value::and_all(vec![ctx.open_row(SINK_ALIAS, txn), changed]);
    plan.push(
        Operation::update(
            ctx.main.reference().clone(),
            ctx.close_assignments(txn),
            close_filter,
        )?,
        StatementTag::Close,
    );

    if let Some(flag) = delete_flagged(merge) {
        let deleted = ctx.exists_in_staging(dedup, vec![key, flag]);
        let terminate_filter = Value::and_all(vec![ctx.open_row(SINK_ALIAS, txn), deleted]);
        plan.push(
            Operation::update(
                ctx.main.reference().clone(),
                ctx.close_assignments(txn),
                terminate_filter,
            )?,
            StatementTag::Terminate,
        );
    }
    Ok(())
}

/// Close step rendered as one MERGE when the sink supports it: the
/// changed and delete-flagged cases become separate matched clauses.
fn push_merge_close(
    ctx: &PlanContext,
    txn: &TransactionMilestoning,
    validity: Option<&ValidityMilestoning>,
    digest: &str,
    merge: &MergeStrategy,
    plan: &mut LogicalPlan,
) -> Result<()> {
    let on = Value::and_all(vec![
        ctx.key_match(txn, validity, SINK_ALIAS, STAGE_ALIAS),
        ctx.open_row(SINK_ALIAS, txn),
    ])
    .expect("two terms");

    // Matched clauses apply first-match-wins, so the delete clause goes
    // ahead of the changed-digest clause.
    let mut when_matched = Vec::new();
    if let Some(flag) = delete_flagged(merge) {
        when_matched.push(MatchedClause {
            condition: Some(flag),
            assignments: ctx.close_assignments(txn),
        });
    }
    when_matched.push(MatchedClause {
        condition: Some(digest_differs(digest)),
        assignments: ctx.close_assignments(txn),
    });

    plan.push(
        Operation::merge(
            ctx.main.reference().clone(),
            ctx.stage_view(Some(&merge.deduplication)),
            on,
            when_matched,
            None,
        )?,
        StatementTag::Close,
    );
    Ok(())
}

/// Insert step: every staging row that is new or changed, with the
/// milestoning columns stamped open.
fn push_insert(
    ctx: &PlanContext,
    txn: &TransactionMilestoning,
    validity: Option<&ValidityMilestoning>,
    digest: &str,
    merge: &MergeStrategy,
    plan: &mut LogicalPlan,
) -> Result<()> {
    let dedup = Some(&merge.deduplication);
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
        projection.push(SelectItem::plain(validity_end_value(ctx, v)));
    }

    for (column, value) in ctx.open_columns(txn) {
        fields.push(column);
        projection.push(SelectItem::plain(value));
    }

    // An open main row with an equal digest short-circuits the insert:
    // re-ingesting unchanged content is a no-op.
    let unchanged_open = Selection::from_dataset(ctx.main.reference().clone())
        .with_fields(vec![SelectItem::plain(Value::int(1))])
        .with_filter(Value::and_all(vec![
            ctx.open_row(SINK_ALIAS, txn),
            ctx.key_match(txn, validity, SINK_ALIAS, STAGE_ALIAS),
            Value::eq(
                Value::field(SINK_ALIAS, digest),
                Value::field(STAGE_ALIAS, digest),
            ),
        ]));
    let mut filter_terms = vec![Value::not_exists(unchanged_open)];
    if let Some(flag) = delete_flagged(merge) {
        filter_terms.push(Value::Not(Box::new(flag)));
    }

    let selection = Selection {
        distinct: false,
        fields: projection,
        from: vec![ctx.stage_view(dedup)],
        filter: Value::and_all(filter_terms),
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

/// Validity-window end for an inserted row: supplied directly, or derived
/// as the next "from" for the same key (open-ended until superseded).
fn validity_end_value(ctx: &PlanContext, validity: &ValidityMilestoning) -> Value {
    match &validity.derivation {
        ValidityDerivation::SourceSpecifiesFromAndThrough { through_field, .. } => {
            Value::field(STAGE_ALIAS, through_field.clone())
        }
        ValidityDerivation::SourceSpecifiesFromOnly { from_field } => {
            let mut terms: Vec<Value> = ctx
                .main
                .primary_keys()
                .into_iter()
                .filter(|f| ctx.staging.has_field(&f.name))
                .map(|f| {
                    Value::eq(
                        Value::field("later", f.name.clone()),
                        Value::field(STAGE_ALIAS, f.name.clone()),
                    )
                })
                .collect();
            terms.push(Value::binary(
                Value::field("later", from_field.clone()),
                BinaryOperator::Gt,
                Value::field(STAGE_ALIAS, from_field.clone()),
            ));
            if let Some(split) = ctx.split_filter("later") {
                terms.push(split);
            }
            let next_from = Selection::from_dataset(
                ctx.staging.reference().clone().with_alias("later"),
            )
            .with_fields(vec![SelectItem::plain(Value::function(
                "MIN",
                vec![Value::field("later", from_field.clone())],
            ))])
            .with_filter(Value::and_all(terms));
            Value::function(
                "COALESCE",
                vec![
                    Value::Select(Box::new(next_from)),
                    Value::Literal(Literal::DateTime(infinite_timestamp())),
                ],
            )
        }
    }
}

// Close/terminate assignments touch only transaction-time columns and the
// insert projection writes validity columns from staging; the two temporal
// dimensions never share an assignment.
