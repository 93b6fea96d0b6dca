//! Logical plan → SQL transpiler.
//!
//! Pure functions from plan nodes to dialect text. Every identifier goes
//! through the sink's quoting; every operand of a binary operator is
//! parenthesized so generated predicates never depend on precedence.

use crate::error::{IngestError, Result};
use crate::plan::{
    Assignment, BinaryOperator, InsertSource, Literal, LogicalPlan, MatchedClause,
    NotMatchedClause, Operation, Selection, Source, Value,
};
use crate::schema::{Dataset, DatasetReference, Field};
use crate::sink::{escape_string, Capability, RelationalSink, SqlPlan, SqlStatement};

/// Lower a logical plan to an ordered list of dialect statements.
pub fn transpile(plan: &LogicalPlan, sink: &dyn RelationalSink) -> Result<SqlPlan> {
    let mut statements = Vec::with_capacity(plan.len());
    for step in &plan.steps {
        statements.push(SqlStatement {
            sql: render_operation(&step.op, sink)?,
            tag: step.tag,
        });
    }
    Ok(SqlPlan { statements })
}

fn render_operation(op: &Operation, sink: &dyn RelationalSink) -> Result<String> {
    match op {
        Operation::Create {
            dataset,
            if_not_exists,
        } => render_create(dataset, *if_not_exists, sink),
        Operation::Insert {
            target,
            fields,
            source,
        } => render_insert(target, fields, source, sink),
        Operation::Update {
            target,
            assignments,
            filter,
        } => render_update(target, assignments, filter.as_ref(), sink),
        Operation::Delete { target, filter } => render_delete(target, filter.as_ref(), sink),
        Operation::Merge {
            target,
            source,
            on,
            when_matched,
            when_not_matched,
        } => {
            if !sink.supports(Capability::Merge) {
                return Err(IngestError::UnsupportedOperation {
                    sink: sink.name().to_string(),
                    node: "Merge",
                });
            }
            render_merge(target, source, on, when_matched, when_not_matched, sink)
        }
        Operation::Select(selection) => render_selection(selection, sink),
        Operation::Show(kind) => Ok(sink.render_show(kind)),
        Operation::LoadCsv {
            target,
            fields,
            locator,
        } => {
            if !sink.supports(Capability::LoadCsv) {
                return Err(IngestError::UnsupportedOperation {
                    sink: sink.name().to_string(),
                    node: "LoadCsv",
                });
            }
            let quoted: Vec<String> = fields.iter().map(|f| sink.quote_identifier(f)).collect();
            sink.render_load_csv(&render_table(target, false, sink), &quoted, locator)
        }
    }
}

fn render_create(dataset: &Dataset, if_not_exists: bool, sink: &dyn RelationalSink) -> Result<String> {
    let mut columns = Vec::with_capacity(dataset.schema.len() + 1);
    for field in &dataset.schema {
        columns.push(render_column(field, sink)?);
    }
    let pks: Vec<String> = dataset
        .primary_keys()
        .iter()
        .map(|f| sink.quote_identifier(&f.name))
        .collect();
    if !pks.is_empty() {
        columns.push(format!("PRIMARY KEY ({})", pks.join(", ")));
    }
    Ok(format!(
        "CREATE TABLE {}{} ({})",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        render_table(dataset.reference(), false, sink),
        columns.join(", ")
    ))
}

fn render_column(field: &Field, sink: &dyn RelationalSink) -> Result<String> {
    let mut s = format!(
        "{} {}",
        sink.quote_identifier(&field.name),
        sink.type_literal(&field.data_type)?
    );
    if field.identity {
        s.push_str(" GENERATED BY DEFAULT AS IDENTITY");
    }
    if !field.nullable {
        s.push_str(" NOT NULL");
    }
    if field.unique {
        s.push_str(" UNIQUE");
    }
    if let Some(default) = &field.default_value {
        s.push_str(&format!(" DEFAULT {}", default));
    }
    Ok(s)
}

fn render_insert(
    target: &DatasetReference,
    fields: &[String],
    source: &InsertSource,
    sink: &dyn RelationalSink,
) -> Result<String> {
    let columns: Vec<String> = fields.iter().map(|f| sink.quote_identifier(f)).collect();
    let source_sql = match source {
        InsertSource::Values(values) => {
            let rows: Vec<String> = values
                .rows
                .iter()
                .map(|row| {
                    let cells: Vec<String> =
                        row.iter().map(|v| render_value(v, sink)).collect::<Result<_>>()?;
                    Ok(format!("({})", cells.join(", ")))
                })
                .collect::<Result<_>>()?;
            format!("VALUES {}", rows.join(", "))
        }
        InsertSource::Select(selection) => render_selection(selection, sink)?,
    };
    Ok(format!(
        "INSERT INTO {} ({}) {}",
        render_table(target, false, sink),
        columns.join(", "),
        source_sql
    ))
}

fn render_update(
    target: &DatasetReference,
    assignments: &[Assignment],
    filter: Option<&Value>,
    sink: &dyn RelationalSink,
) -> Result<String> {
    let sets: Vec<String> = assignments
        .iter()
        .map(|a| {
            Ok(format!(
                "{} = {}",
                sink.quote_identifier(&a.column),
                render_value(&a.value, sink)?
            ))
        })
        .collect::<Result<_>>()?;
    let mut sql = format!(
        "UPDATE {} SET {}",
        render_table(target, true, sink),
        sets.join(", ")
    );
    if let Some(filter) = filter {
        sql.push_str(&format!(" WHERE {}", render_value(filter, sink)?));
    }
    Ok(sql)
}

fn render_delete(
    target: &DatasetReference,
    filter: Option<&Value>,
    sink: &dyn RelationalSink,
) -> Result<String> {
    let mut sql = format!("DELETE FROM {}", render_table(target, true, sink));
    if let Some(filter) = filter {
        sql.push_str(&format!(" WHERE {}", render_value(filter, sink)?));
    }
    Ok(sql)
}

fn render_merge(
    target: &DatasetReference,
    source: &Source,
    on: &Value,
    when_matched: &[MatchedClause],
    when_not_matched: &Option<NotMatchedClause>,
    sink: &dyn RelationalSink,
) -> Result<String> {
    let mut sql = format!(
        "MERGE INTO {} USING {} ON {}",
        render_table(target, true, sink),
        render_source(source, sink)?,
        render_value(on, sink)?
    );
    for clause in when_matched {
        let condition = match &clause.condition {
            Some(c) => format!(" AND {}", render_value(c, sink)?),
            None => String::new(),
        };
        let sets: Vec<String> = clause
            .assignments
            .iter()
            .map(|a| {
                Ok(format!(
                    "{} = {}",
                    sink.quote_identifier(&a.column),
                    render_value(&a.value, sink)?
                ))
            })
            .collect::<Result<_>>()?;
        sql.push_str(&format!(
            " WHEN MATCHED{} THEN UPDATE SET {}",
            condition,
            sets.join(", ")
        ));
    }
    if let Some(nm) = when_not_matched {
        let columns: Vec<String> = nm.fields.iter().map(|f| sink.quote_identifier(f)).collect();
        let values: Vec<String> = nm
            .values
            .iter()
            .map(|v| render_value(v, sink))
            .collect::<Result<_>>()?;
        sql.push_str(&format!(
            " WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
            columns.join(", "),
            values.join(", ")
        ));
    }
    Ok(sql)
}

fn render_selection(selection: &Selection, sink: &dyn RelationalSink) -> Result<String> {
    let mut sql = String::from("SELECT ");
    if selection.distinct {
        sql.push_str("DISTINCT ");
    }
    if selection.fields.is_empty() {
        sql.push('*');
    } else {
        let items: Vec<String> = selection
            .fields
            .iter()
            .map(|item| {
                let value = render_value(&item.value, sink)?;
                Ok(match &item.alias {
                    Some(alias) => format!("{} AS {}", value, sink.quote_identifier(alias)),
                    None => value,
                })
            })
            .collect::<Result<_>>()?;
        sql.push_str(&items.join(", "));
    }
    if !selection.from.is_empty() {
        let sources: Vec<String> = selection
            .from
            .iter()
            .map(|s| render_source(s, sink))
            .collect::<Result<_>>()?;
        sql.push_str(&format!(" FROM {}", sources.join(", ")));
    }
    if let Some(filter) = &selection.filter {
        sql.push_str(&format!(" WHERE {}", render_value(filter, sink)?));
    }
    Ok(sql)
}

fn render_source(source: &Source, sink: &dyn RelationalSink) -> Result<String> {
    match source {
        Source::Dataset(reference) => Ok(render_table(reference, true, sink)),
        Source::Select { query, alias } => Ok(format!(
            "({}) AS {}",
            render_selection(query, sink)?,
            sink.quote_identifier(alias)
        )),
    }
}

fn render_table(
    reference: &DatasetReference,
    with_alias: bool,
    sink: &dyn RelationalSink,
) -> String {
    let mut parts = Vec::with_capacity(3);
    if let Some(db) = &reference.database {
        parts.push(sink.quote_identifier(db));
    }
    if let Some(group) = &reference.group {
        parts.push(sink.quote_identifier(group));
    }
    parts.push(sink.quote_identifier(&reference.name));
    let mut sql = parts.join(".");
    if with_alias && reference.alias != reference.name {
        sql.push_str(&format!(" AS {}", sink.quote_identifier(&reference.alias)));
    }
    sql
}

fn render_value(value: &Value, sink: &dyn RelationalSink) -> Result<String> {
    Ok(match value {
        Value::Field { dataset, name } => match dataset {
            Some(alias) => format!(
                "{}.{}",
                sink.quote_identifier(alias),
                sink.quote_identifier(name)
            ),
            None => sink.quote_identifier(name),
        },
        Value::Literal(lit) => render_literal(lit, sink),
        Value::BinaryOp { left, op, right } => format!(
            "({} {} {})",
            render_value(left, sink)?,
            render_operator(*op),
            render_value(right, sink)?
        ),
        Value::Not(inner) => format!("NOT ({})", render_value(inner, sink)?),
        Value::Function { name, args } => {
            let args: Vec<String> = args
                .iter()
                .map(|a| render_value(a, sink))
                .collect::<Result<_>>()?;
            format!("{}({})", name, args.join(", "))
        }
        Value::Case {
            when_clauses,
            else_clause,
        } => {
            let mut s = String::from("CASE");
            for (when, then) in when_clauses {
                s.push_str(&format!(
                    " WHEN {} THEN {}",
                    render_value(when, sink)?,
                    render_value(then, sink)?
                ));
            }
            if let Some(else_value) = else_clause {
                s.push_str(&format!(" ELSE {}", render_value(else_value, sink)?));
            }
            s.push_str(" END");
            s
        }
        Value::Select(query) => format!("({})", render_selection(query, sink)?),
        Value::Exists { query, negated } => format!(
            "{}EXISTS ({})",
            if *negated { "NOT " } else { "" },
            render_selection(query, sink)?
        ),
        Value::InList {
            value,
            list,
            negated,
        } => {
            let items: Vec<String> = list.iter().map(|l| render_literal(l, sink)).collect();
            format!(
                "{} {}IN ({})",
                render_value(value, sink)?,
                if *negated { "NOT " } else { "" },
                items.join(", ")
            )
        }
        Value::All => "*".to_string(),
    })
}

fn render_operator(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Eq => "=",
        BinaryOperator::NotEq => "<>",
        BinaryOperator::Lt => "<",
        BinaryOperator::LtEq => "<=",
        BinaryOperator::Gt => ">",
        BinaryOperator::GtEq => ">=",
        BinaryOperator::And => "AND",
        BinaryOperator::Or => "OR",
        BinaryOperator::Plus => "+",
        BinaryOperator::Minus => "-",
    }
}

fn render_literal(lit: &Literal, sink: &dyn RelationalSink) -> String {
    match lit {
        Literal::Null => "NULL".to_string(),
        Literal::Boolean(true) => "TRUE".to_string(),
        Literal::Boolean(false) => "FALSE".to_string(),
        Literal::Integer(i) => i.to_string(),
        Literal::Float(f) => format!("{}", f),
        Literal::String(s) => format!("'{}'", escape_string(s)),
        Literal::DateTime(ts) => sink.timestamp_literal(ts),
    }
}
