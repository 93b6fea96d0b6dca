//! Nontemporal loading: a plain append of staging into main, optionally
//! stamping an audit timestamp column.

use crate::error::Result;
use crate::ingest::mode::Auditing;
use crate::ingest::planner::{PlanContext, STAGE_ALIAS};
use crate::plan::{
    InsertSource, Literal, LogicalPlan, Operation, SelectItem, Selection, StatementTag, Value,
};

pub(crate) fn plan_nontemporal(
    ctx: &PlanContext,
    auditing: &Auditing,
    plan: &mut LogicalPlan,
) -> Result<()> {
    let audit_field = match auditing {
        Auditing::None => None,
        Auditing::DateTime { field } => Some(field.as_str()),
    };

    let mut fields: Vec<String> = Vec::new();
    let mut projection: Vec<SelectItem> = Vec::new();
    for field in &ctx.main.schema {
        if Some(field.name.as_str()) == audit_field {
            continue;
        }
        fields.push(field.name.clone());
        projection.push(SelectItem::plain(Value::field(
            STAGE_ALIAS,
            field.name.clone(),
        )));
    }
    if let Some(audit) = audit_field {
        fields.push(audit.to_string());
        projection.push(SelectItem::plain(Value::Literal(Literal::DateTime(
            ctx.now,
        ))));
    }

    let selection = Selection {
        distinct: false,
        fields: projection,
        from: vec![ctx.stage_view(None)],
        filter: None,
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
